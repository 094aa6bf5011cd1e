// File: src/runtime/machine.rs
//
// Executes a lowered chunk on a nexting stack.
//
// A unit runs instructions from some position until it suspends for good:
// it gives up, resumes someone else, fails, or is aborted while waiting on
// a NEXT. Each instruction is wrapped the same way:
//
//   abstain guard -> chance guard -> body -> trapdoor
//
// The trapdoor runs even when a guard skipped the body.

use futures::future::FutureExt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::ast::{Expr, LValue, Label};
use crate::bytecode::{Chunk, Instruction, Op};
use crate::errors::{ErrorCode, IckError, SourceLocation};
use crate::runtime::context::{Ctx, ExecutionContext};
use crate::runtime::eval::{evaluate, subscripts};
use crate::runtime::linkage::Linkage;
use crate::runtime::nexting::{Fault, NextingStack, Outcome, UnitFuture};

/// Current abstention of every slot in a chunk; true means abstained.
#[derive(Debug)]
pub struct AbstainMap {
    slots: Vec<AtomicBool>,
}

impl AbstainMap {
    pub fn new(defaults: &[bool]) -> Self {
        AbstainMap { slots: defaults.iter().map(|&d| AtomicBool::new(d)).collect() }
    }

    pub fn is_abstained(&self, slot: usize) -> bool {
        self.slots.get(slot).map_or(false, |s| s.load(Ordering::Relaxed))
    }

    pub fn set(&self, slot: usize, abstained: bool) {
        if let Some(s) = self.slots.get(slot) {
            s.store(abstained, Ordering::Relaxed);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// What the loop does once a body has run
enum Flow {
    Continue,
    Next { label: Label, entry: usize },
    External(Label),
    Resume(NonZeroUsize),
    GiveUp,
}

#[derive(Clone)]
pub struct Machine {
    chunk: Arc<Chunk>,
    abstain: Arc<AbstainMap>,
    linkage: Arc<Linkage>,
    stack: Arc<NextingStack<Ctx>>,
}

impl Machine {
    pub fn new(
        chunk: Arc<Chunk>,
        abstain: Arc<AbstainMap>,
        linkage: Arc<Linkage>,
        stack: Arc<NextingStack<Ctx>>,
    ) -> Self {
        Machine { chunk, abstain, linkage, stack }
    }

    /// A machine with fresh abstain state taken from the chunk's defaults
    pub fn load(chunk: Chunk, linkage: Arc<Linkage>, stack: Arc<NextingStack<Ctx>>) -> Self {
        let abstain = Arc::new(AbstainMap::new(&chunk.abstain_defaults));
        Self::new(Arc::new(chunk), abstain, linkage, stack)
    }

    pub fn chunk(&self) -> &Chunk {
        &self.chunk
    }

    pub fn abstain_map(&self) -> &AbstainMap {
        &self.abstain
    }

    /// Run the chunk from its first statement until it gives up or fails.
    pub async fn run(self, ctx: Ctx) -> Result<Ctx, Fault<Ctx>> {
        let stack = Arc::clone(&self.stack);
        stack.run(ctx, move |ctx| self.unit(ctx, 0)).await
    }

    /// NEXT into `label` on the shared stack, as a linked component would.
    pub async fn enter(&self, label: Label, ctx: Ctx) -> Result<Outcome<Ctx>, Fault<Ctx>> {
        let Some(entry) = self.chunk.entry(label) else {
            return Err(Fault::with_baton(
                IckError::runtime(ErrorCode::E129, label.to_string()),
                ctx,
            ));
        };
        let callee = self.clone();
        self.stack.next(label, ctx, move |ctx| callee.unit(ctx, entry)).await
    }

    pub fn unit(self, ctx: Ctx, pc: usize) -> UnitFuture<Ctx> {
        async move { self.execute(ctx, pc).await }.boxed()
    }

    async fn execute(self, mut ctx: Ctx, mut pc: usize) -> Result<(), Fault<Ctx>> {
        loop {
            let Some(insn) = self.chunk.instructions.get(pc) else {
                let error = IckError::runtime(ErrorCode::E633, "").with_note(format!(
                    "after statement {} of {}",
                    pc,
                    self.chunk.name
                ));
                return Err(Fault::with_baton(error, ctx));
            };
            let location = SourceLocation::with_file(insn.line, 1, self.chunk.name.clone());

            let flow = if self.admits(insn, ctx.as_mut()) {
                trace!(chunk = %self.chunk.name, pc, line = insn.line, "{}", insn.op);
                match self.perform(&insn.op, ctx.as_mut()) {
                    Ok(flow) => flow,
                    Err(error) => return Err(Fault::with_baton(error.or_at(location), ctx)),
                }
            } else {
                trace!(chunk = %self.chunk.name, pc, line = insn.line, "skipped");
                Flow::Continue
            };

            match flow {
                Flow::Continue => {}
                Flow::Next { label, entry } => {
                    let callee = self.clone();
                    let outcome = self
                        .stack
                        .next(label, ctx, move |ctx| callee.unit(ctx, entry))
                        .await
                        .map_err(|f| f.map_error(|e| e.or_at(location)))?;
                    match outcome {
                        Outcome::Resumed(back) => ctx = back,
                        Outcome::Aborted => return Ok(()),
                    }
                }
                Flow::External(label) => {
                    let Some(component) = self.linkage.resolve(label) else {
                        let error = IckError::runtime(ErrorCode::E129, label.to_string()).at(location);
                        return Err(Fault::with_baton(error, ctx));
                    };
                    debug!(%label, component = component.name(), "NEXT into linked component");
                    let outcome = component
                        .call(label, ctx, Arc::clone(&self.stack))
                        .await
                        .map_err(|f| f.map_error(|e| e.or_at(location)))?;
                    match outcome {
                        Outcome::Resumed(back) => ctx = back,
                        Outcome::Aborted => return Ok(()),
                    }
                }
                Flow::Resume(depth) => {
                    return self.stack.resume(depth, ctx).map_err(|f| f.map_error(|e| e.or_at(location)));
                }
                Flow::GiveUp => {
                    self.stack.give_up(ctx);
                    return Ok(());
                }
            }

            pc = self.fall_through(pc, ctx.as_mut());
        }
    }

    fn admits(&self, insn: &Instruction, ctx: &mut dyn ExecutionContext) -> bool {
        if insn.guard.abstain_slot.map_or(false, |slot| self.abstain.is_abstained(slot)) {
            return false;
        }
        ctx.chance(insn.guard.percent)
    }

    /// Where control goes after `pc`: through its trapdoor if a live COME FROM
    /// is aimed at it, else to the next statement. A COME FROM reached this
    /// way may itself be the target of another.
    fn fall_through(&self, mut pc: usize, ctx: &mut dyn ExecutionContext) -> usize {
        while let Some(trapdoor) = self.chunk.instructions.get(pc).and_then(|i| i.trapdoor) {
            let abstained = trapdoor.abstain_slot.map_or(false, |slot| self.abstain.is_abstained(slot));
            if abstained || !ctx.chance(trapdoor.percent) {
                break;
            }
            debug!(from = pc, to = trapdoor.come_from, "COME FROM");
            pc = trapdoor.come_from;
        }
        pc + 1
    }

    fn perform(&self, op: &Op, ctx: &mut dyn ExecutionContext) -> Result<Flow, IckError> {
        match op {
            Op::Assign { target, expr } => {
                let value = evaluate(expr, ctx)?;
                match target {
                    LValue::Scalar(var) => ctx.write(*var, value.bits)?,
                    LValue::Element { array, subscripts: subs } => {
                        let index = subscripts(subs, ctx)?;
                        ctx.write_element(*array, &index, value.bits)?;
                    }
                }
            }
            Op::Redimension { array, dimensions } => {
                let dimensions = subscripts(dimensions, ctx)?;
                ctx.redimension(*array, &dimensions)?;
            }
            Op::Next { label, entry } => return Ok(Flow::Next { label: *label, entry: *entry }),
            Op::NextExternal { label } => return Ok(Flow::External(*label)),
            Op::Lost { label } => {
                return Err(IckError::runtime(ErrorCode::E129, format!("({})", label)));
            }
            Op::Resume(depth) => {
                let depth = evaluate(depth, ctx)?.bits as usize;
                return Ok(NonZeroUsize::new(depth).map_or(Flow::Continue, Flow::Resume));
            }
            Op::Forget(depth) => {
                let depth = evaluate(depth, ctx)?.bits as usize;
                self.stack.forget(depth);
            }
            Op::Abstain { slots } => slots.iter().for_each(|&slot| self.abstain.set(slot, true)),
            Op::Reinstate { slots } => slots.iter().for_each(|&slot| self.abstain.set(slot, false)),
            Op::Unresolved { label } => {
                return Err(IckError::runtime(ErrorCode::E139, format!("({})", label)));
            }
            Op::Stash(vars) => {
                for var in vars {
                    ctx.stash(*var)?;
                }
            }
            Op::Retrieve(vars) => {
                for var in vars {
                    ctx.retrieve(*var)?;
                }
            }
            Op::Ignore(vars) => vars.iter().for_each(|var| ctx.ignore(*var)),
            Op::Remember(vars) => vars.iter().for_each(|var| ctx.remember(*var)),
            Op::ReadOut(items) => {
                for item in items {
                    match item {
                        Expr::Array(array) => ctx.read_out_array(*array)?,
                        other => {
                            let value = evaluate(other, ctx)?;
                            ctx.read_out(value.bits)?;
                        }
                    }
                }
            }
            Op::WriteIn(vars) => {
                for var in vars {
                    ctx.write_in(*var)?;
                }
            }
            Op::GiveUp => return Ok(Flow::GiveUp),
            Op::ComeFrom => {}
            Op::Splat { text } => return Err(IckError::runtime(ErrorCode::E000, text.clone())),
        }
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::parser::parse_source;
    use crate::runtime::context::{SharedOutput, Store};
    use std::io::Cursor;

    fn machine(source: &str) -> Machine {
        let chunk = Compiler::new("machine")
            .with_politeness(false)
            .compile(parse_source(source))
            .unwrap();
        Machine::load(chunk, Arc::new(Linkage::new()), Arc::new(NextingStack::new(80)))
    }

    fn context() -> (Ctx, SharedOutput) {
        let out = SharedOutput::new();
        let store = Store::new(Cursor::new(Vec::new()), out.clone()).with_seed(7);
        (Box::new(store), out)
    }

    #[test]
    fn test_abstain_map() {
        let map = AbstainMap::new(&[false, true]);
        assert!(!map.is_abstained(0));
        assert!(map.is_abstained(1));
        map.set(0, true);
        map.set(1, false);
        assert!(map.is_abstained(0));
        assert!(!map.is_abstained(1));
        // out of range slots are never abstained
        assert!(!map.is_abstained(9));
        assert_eq!(map.len(), 2);
    }

    #[tokio::test]
    async fn test_runs_to_give_up() {
        let (ctx, out) = context();
        let result = machine("DO .1 <- #3\nDO READ OUT .1\nDO GIVE UP").run(ctx).await;
        assert!(result.is_ok());
        assert_eq!(out.contents(), "3\n");
    }

    #[tokio::test]
    async fn test_next_and_resume() {
        let (ctx, out) = context();
        let source = "DO (10) NEXT\n\
                      DO READ OUT #2\n\
                      DO GIVE UP\n\
                      (10) DO READ OUT #1\n\
                      DO RESUME #1";
        machine(source).run(ctx).await.map_err(|f| f.error).unwrap();
        assert_eq!(out.contents(), "1\n2\n");
    }

    #[tokio::test]
    async fn test_abstain_state_is_shared_with_clones() {
        let (ctx, out) = context();
        let m = machine("DO ABSTAIN FROM (1)\n(1) DO READ OUT #1\nDO GIVE UP");
        let probe = m.clone();
        assert!(!probe.abstain_map().is_abstained(0));
        m.run(ctx).await.map_err(|f| f.error).unwrap();
        assert!(probe.abstain_map().is_abstained(0));
        assert_eq!(out.contents(), "");
    }

    #[tokio::test]
    async fn test_falling_off_the_end() {
        let (ctx, _) = context();
        let fault = machine("DO .1 <- #1").run(ctx).await.err().unwrap();
        assert_eq!(fault.error.code, ErrorCode::E633);
        assert!(fault.baton.is_some());
    }

    #[tokio::test]
    async fn test_enter_unknown_label() {
        let (ctx, _) = context();
        let m = machine("(1) DO GIVE UP");
        let fault = m.enter(Label::new(2).unwrap(), ctx).await.err().unwrap();
        assert_eq!(fault.error.code, ErrorCode::E129);
    }
}
