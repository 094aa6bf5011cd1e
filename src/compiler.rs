// File: src/compiler.rs
//
// Control-flow compiler for INTERCAL.
// Runs the analysis passes over a parsed program and lowers every statement
// into one `Instruction` of a `Chunk`:
//
// 1. label and gerund indexing (`Program::index`)
// 2. politeness check
// 3. abstain-slot assignment
// 4. COME FROM linking
// 5. lowering, then optional constant folding

use std::collections::HashSet;
use tracing::{debug, warn};

use crate::ast::{AbstainTarget, Calculation, Label, Statement, StatementKind};
use crate::bytecode::{Chunk, Guard, Instruction, Op, Trapdoor};
use crate::config::Options;
use crate::errors::{ErrorCode, IckError};
use crate::optimizer::Optimizer;
use crate::program::Program;

const MINIMUM_POLITENESS: u32 = 20;
const MAXIMUM_POLITENESS: u32 = 34;

/// Compiler settings plus the labels exported by linked components
pub struct Compiler {
    name: String,
    externals: HashSet<Label>,
    optimize: bool,
    politeness: bool,
    public_labels: Option<HashSet<u32>>,
}

impl Compiler {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            externals: HashSet::new(),
            optimize: true,
            politeness: true,
            public_labels: None,
        }
    }

    pub fn from_options(name: impl Into<String>, options: &Options) -> Self {
        Self::new(name)
            .with_optimization(options.optimize)
            .with_politeness(options.politeness)
            .with_public_labels(options.public_labels.as_deref())
    }

    /// Labels that NEXT may reach in linked components
    pub fn with_externals(mut self, labels: impl IntoIterator<Item = Label>) -> Self {
        self.externals.extend(labels);
        self
    }

    pub fn with_optimization(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn with_politeness(mut self, politeness: bool) -> Self {
        self.politeness = politeness;
        self
    }

    pub fn with_public_labels(mut self, labels: Option<&[u32]>) -> Self {
        self.public_labels = labels.map(|l| l.iter().copied().collect());
        self
    }

    /// Passes 1 to 4: everything short of lowering
    pub fn analyze(&self, statements: Vec<Statement>) -> Result<Program, IckError> {
        let mut program = Program::index(statements)?;
        if self.politeness {
            check_politeness(&program)?;
        }
        let slots = assign_abstain_slots(&mut program);
        link_come_froms(&mut program)?;
        debug!(name = %self.name, statements = program.len(), slots, "analyzed program");
        Ok(program)
    }

    /// Compile a list of statements into a chunk
    pub fn compile(&self, statements: Vec<Statement>) -> Result<Chunk, IckError> {
        let program = self.analyze(statements)?;
        let mut chunk = self.lower(&program);

        if self.optimize {
            let mut optimizer = Optimizer::new();
            optimizer.optimize(&mut chunk);
            debug!(
                name = %self.name,
                folded = optimizer.stats.constants_folded,
                visited = optimizer.stats.expressions_visited,
                "optimized chunk"
            );
        }

        Ok(chunk)
    }

    /// Pass 5: one instruction per statement, indices preserved
    pub fn lower(&self, program: &Program) -> Chunk {
        let mut chunk = Chunk::new(self.name.clone());

        for statement in program.statements() {
            if statement.abstain_slot.is_some() {
                chunk.abstain_defaults.push(!statement.enabled);
            }
        }

        for statement in program.statements() {
            let op = self.lower_op(program, statement);
            // COME FROM does its work at the trapdoor; its own guard never matters
            let guard = match statement.kind {
                StatementKind::ComeFrom { .. } => Guard::default(),
                _ => Guard { abstain_slot: statement.abstain_slot, percent: statement.percent },
            };
            let trapdoor = statement.trapdoor.and_then(|origin| program.get(origin)).map(|come_from| {
                Trapdoor {
                    come_from: come_from.index,
                    abstain_slot: come_from.abstain_slot,
                    percent: come_from.percent,
                }
            });
            chunk.emit(Instruction {
                op,
                guard,
                trapdoor,
                label: statement.label.and_then(Label::new),
                line: statement.location.line,
            });
        }

        chunk.exports = program
            .labels()
            .into_iter()
            .map(|(label, _)| label)
            .filter(|label| {
                self.public_labels
                    .as_ref()
                    .map_or(true, |public| public.contains(&(label.value() as u32)))
            })
            .collect();

        chunk
    }

    fn lower_op(&self, program: &Program, statement: &Statement) -> Op {
        match &statement.kind {
            StatementKind::Calculate(Calculation::Assign { target, expr }) => Op::Assign {
                target: target.clone(),
                expr: expr.clone(),
            },
            StatementKind::Calculate(Calculation::Redimension { array, dimensions }) => {
                Op::Redimension { array: *array, dimensions: dimensions.clone() }
            }
            StatementKind::Next { target } => self.lower_next(program, statement, *target),
            StatementKind::Resume { depth } => Op::Resume(depth.clone()),
            StatementKind::Forget { depth } => Op::Forget(depth.clone()),
            StatementKind::Abstain { target } => match abstain_slots(program, target) {
                Ok(slots) => Op::Abstain { slots },
                Err(label) => Op::Unresolved { label },
            },
            StatementKind::Reinstate { target } => match abstain_slots(program, target) {
                Ok(slots) => Op::Reinstate { slots },
                Err(label) => Op::Unresolved { label },
            },
            StatementKind::Stash(vars) => Op::Stash(vars.clone()),
            StatementKind::Retrieve(vars) => Op::Retrieve(vars.clone()),
            StatementKind::Ignore(vars) => Op::Ignore(vars.clone()),
            StatementKind::Remember(vars) => Op::Remember(vars.clone()),
            StatementKind::ReadOut(items) => Op::ReadOut(items.clone()),
            StatementKind::WriteIn(vars) => Op::WriteIn(vars.clone()),
            StatementKind::GiveUp => Op::GiveUp,
            StatementKind::ComeFrom { .. } => Op::ComeFrom,
            StatementKind::Malformed => {
                if statement.enabled {
                    warn!(line = statement.location.line, "splatted statement: {}", statement.text);
                }
                Op::Splat { text: statement.text.clone() }
            }
        }
    }

    fn lower_next(&self, program: &Program, statement: &Statement, target: u32) -> Op {
        if let Some(label) = Label::new(target) {
            if let Some(entry) = program.position(label) {
                return Op::Next { label, entry };
            }
            if self.externals.contains(&label) {
                return Op::NextExternal { label };
            }
        }
        warn!(
            line = statement.location.line,
            "{} {} ({})",
            ErrorCode::E129,
            ErrorCode::E129.message(),
            target
        );
        Op::Lost { label: target }
    }
}

/// Slots touched by an ABSTAIN/REINSTATE target. A missing label is
/// returned as the error so it can fail only if executed.
fn abstain_slots(program: &Program, target: &AbstainTarget) -> Result<Vec<usize>, u32> {
    match target {
        AbstainTarget::Label(raw) => {
            let position = program.resolve(*raw).ok_or(*raw)?;
            Ok(program.get(position).and_then(|s| s.abstain_slot).into_iter().collect())
        }
        AbstainTarget::Gerunds(gerunds) => Ok(gerunds
            .iter()
            .flat_map(|g| program.members(*g))
            .filter_map(|&index| program.get(index).and_then(|s| s.abstain_slot))
            .collect()),
    }
}

/// Programs of more than three statements must say PLEASE often, but not too often.
pub fn check_politeness(program: &Program) -> Result<(), IckError> {
    if program.len() <= 3 {
        return Ok(());
    }
    let politeness = program.politeness();
    let note = format!("{}% of statements say PLEASE", politeness);
    if politeness < MINIMUM_POLITENESS {
        Err(IckError::compile(ErrorCode::E079, "")
            .with_note(note)
            .with_help("say PLEASE more often".to_string()))
    } else if politeness > MAXIMUM_POLITENESS {
        Err(IckError::compile(ErrorCode::E099, "")
            .with_note(note)
            .with_help("say PLEASE less often".to_string()))
    } else {
        Ok(())
    }
}

/// Give a slot to every statement that can ever be disabled: those
/// written with NOT, those named by an ABSTAIN, and members of an
/// abstained gerund. Slots follow program order. Returns the slot count.
pub fn assign_abstain_slots(program: &mut Program) -> usize {
    let mut labels = HashSet::new();
    let mut gerunds = HashSet::new();
    for statement in program.statements() {
        if let StatementKind::Abstain { target } = &statement.kind {
            match target {
                AbstainTarget::Label(raw) => {
                    labels.insert(*raw);
                }
                AbstainTarget::Gerunds(list) => gerunds.extend(list.iter().copied()),
            }
        }
    }

    let mut next = 0;
    for statement in program.statements_mut() {
        let named = statement.label.map_or(false, |label| labels.contains(&label));
        let classed = statement.kind.gerund().map_or(false, |g| gerunds.contains(&g));
        if !statement.enabled || named || classed {
            statement.abstain_slot = Some(next);
            next += 1;
        }
    }
    next
}

/// Point each COME FROM's target at it. Unknown targets (E444) and
/// targets already claimed by another COME FROM (E555) are fatal.
pub fn link_come_froms(program: &mut Program) -> Result<(), IckError> {
    let come_froms: Vec<(usize, u32)> = program
        .statements()
        .iter()
        .filter_map(|s| match s.kind {
            StatementKind::ComeFrom { target } => Some((s.index, target)),
            _ => None,
        })
        .collect();

    for (origin, target) in come_froms {
        let (location, text) = match program.get(origin) {
            Some(s) => (s.location.clone(), s.text.clone()),
            None => continue,
        };
        let position = program.resolve(target).ok_or_else(|| {
            IckError::compile(ErrorCode::E444, format!("({})", target))
                .at(location.clone())
                .with_source(text.clone())
        })?;
        let Some(statement) = program.get_mut(position) else {
            continue;
        };
        if let Some(existing) = statement.trapdoor {
            return Err(IckError::compile(ErrorCode::E555, format!("({})", target))
                .at(location)
                .with_source(text)
                .with_note(format!("statement {} already comes from ({})", existing + 1, target)));
        }
        statement.trapdoor = Some(origin);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn compiler() -> Compiler {
        Compiler::new("test").with_politeness(false)
    }

    fn analyze(source: &str) -> Result<Program, IckError> {
        compiler().analyze(parse_source(source))
    }

    fn compile(source: &str) -> Chunk {
        compiler().compile(parse_source(source)).unwrap()
    }

    #[test]
    fn test_slots_follow_program_order() {
        let program = analyze(
            "DO ABSTAIN FROM (20)\n\
             DO .1 <- #1\n\
             DON'T GIVE UP\n\
             (20) DO READ OUT .1\n\
             DO ABSTAIN FROM CALCULATING\n\
             DO GIVE UP",
        )
        .unwrap();
        let slots: Vec<Option<usize>> =
            program.statements().iter().map(|s| s.abstain_slot).collect();
        assert_eq!(slots, vec![None, Some(0), Some(1), Some(2), None, None]);
    }

    #[test]
    fn test_reinstate_alone_assigns_nothing() {
        let program = analyze("(1) DO .1 <- #1\nDO REINSTATE (1)\nDO GIVE UP").unwrap();
        assert!(program.statements().iter().all(|s| s.abstain_slot.is_none()));
    }

    #[test]
    fn test_come_from_links_trapdoor() {
        let program = analyze("(10) DO .1 <- #1\nDO COME FROM (10)\nDO GIVE UP").unwrap();
        assert_eq!(program.get(0).and_then(|s| s.trapdoor), Some(1));
    }

    #[test]
    fn test_come_from_missing_label() {
        let err = analyze("DO COME FROM (99)").unwrap_err();
        assert_eq!(err.code, ErrorCode::E444);
        assert!(err.message.contains("(99)"));
    }

    #[test]
    fn test_two_come_froms_same_target() {
        let err =
            analyze("(1) DO GIVE UP\nDO COME FROM (1)\nDO COME FROM (1)").unwrap_err();
        assert_eq!(err.code, ErrorCode::E555);
        assert_eq!(err.location.map(|l| l.line), Some(3));
    }

    #[test]
    fn test_unresolved_abstain_is_deferred() {
        let chunk = compile("DO ABSTAIN FROM (5)\nDO REINSTATE (6)\nDO GIVE UP");
        assert_eq!(chunk.instructions[0].op, Op::Unresolved { label: 5 });
        assert_eq!(chunk.instructions[1].op, Op::Unresolved { label: 6 });
    }

    #[test]
    fn test_next_resolution() {
        let external = Label::new(1000).unwrap();
        let chunk = compiler()
            .with_externals([external])
            .compile(parse_source("(1) DO (1) NEXT\nDO (1000) NEXT\nDO (2000) NEXT"))
            .unwrap();
        assert_eq!(
            chunk.instructions[0].op,
            Op::Next { label: Label::new(1).unwrap(), entry: 0 }
        );
        assert_eq!(chunk.instructions[1].op, Op::NextExternal { label: external });
        assert_eq!(chunk.instructions[2].op, Op::Lost { label: 2000 });
    }

    #[test]
    fn test_lowered_guards_and_trapdoor() {
        let chunk = compile(
            "DO ABSTAIN FROM COMING FROM\n\
             (10) DO %30 READ OUT #1\n\
             DO COME FROM (10)\n\
             DO GIVE UP",
        );
        let target = &chunk.instructions[1];
        assert_eq!(target.guard, Guard { abstain_slot: None, percent: 30 });
        assert_eq!(
            target.trapdoor,
            Some(Trapdoor { come_from: 2, abstain_slot: Some(0), percent: 100 })
        );
        assert_eq!(chunk.instructions[2].guard, Guard::default());
        assert_eq!(chunk.abstain_defaults, vec![false]);
        assert_eq!(chunk.instructions[0].op, Op::Abstain { slots: vec![0] });
    }

    #[test]
    fn test_splat_keeps_text() {
        let chunk = compile("DO .1 <- WHATEVER\nDO GIVE UP");
        assert_eq!(chunk.instructions[0].op, Op::Splat { text: "DO .1 <- WHATEVER".to_string() });
    }

    #[test]
    fn test_politeness_bounds() {
        let rude = "DO GIVE UP\nDO GIVE UP\nDO GIVE UP\nDO GIVE UP";
        let err = Compiler::new("rude").compile(parse_source(rude)).unwrap_err();
        assert_eq!(err.code, ErrorCode::E079);
        assert_eq!(err.help.as_deref(), Some("say PLEASE more often"));

        let grovel = "PLEASE GIVE UP\nPLEASE GIVE UP\nDO GIVE UP\nDO GIVE UP";
        let err = Compiler::new("grovel").compile(parse_source(grovel)).unwrap_err();
        assert_eq!(err.code, ErrorCode::E099);

        let fine = "PLEASE GIVE UP\nDO GIVE UP\nDO GIVE UP\nDO GIVE UP";
        assert!(Compiler::new("fine").compile(parse_source(fine)).is_ok());

        assert!(Compiler::new("short").compile(parse_source("DO GIVE UP")).is_ok());
    }

    #[test]
    fn test_public_labels_filter_exports() {
        let source = "(1) DO RESUME #1\n(2) DO RESUME #1\n(3) DO RESUME #1";
        let chunk = compiler().compile(parse_source(source)).unwrap();
        assert_eq!(chunk.exports.len(), 3);
        let chunk = compiler()
            .with_public_labels(Some(&[2]))
            .compile(parse_source(source))
            .unwrap();
        assert_eq!(chunk.exports, vec![Label::new(2).unwrap()]);
    }

    #[test]
    fn test_constant_depth_is_folded() {
        let chunk = compile("DO RESUME '#1$#0'~#2\nDO GIVE UP");
        assert_eq!(chunk.instructions[0].op, Op::Resume(crate::ast::Expr::constant(1)));
    }
}
