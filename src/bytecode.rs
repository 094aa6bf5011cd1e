// File: src/bytecode.rs
//
// The lowered form produced by the compiler and executed by the runtime.
// One instruction per source statement, so statement indices, abstain
// slots and trapdoor targets all refer to the same positions.

use std::collections::HashMap;
use std::fmt;

use crate::ast::{Expr, LValue, Label, Variable};

/// Lowered statement bodies
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Evaluate and store
    Assign { target: LValue, expr: Expr },

    /// Re-dimension an array; previous contents are discarded
    Redimension { array: Variable, dimensions: Vec<Expr> },

    /// NEXT to a label in this chunk
    Next { label: Label, entry: usize },

    /// NEXT to a label exported by a linked component
    NextExternal { label: Label },

    /// NEXT to a label that resolves nowhere; fails with E129 when executed
    Lost { label: u32 },

    /// RESUME by the evaluated depth
    Resume(Expr),

    /// FORGET by the evaluated depth
    Forget(Expr),

    /// Disable every listed abstain slot
    Abstain { slots: Vec<usize> },

    /// Enable every listed abstain slot
    Reinstate { slots: Vec<usize> },

    /// ABSTAIN/REINSTATE naming a missing label; fails with E139 when executed
    Unresolved { label: u32 },

    Stash(Vec<Variable>),
    Retrieve(Vec<Variable>),
    Ignore(Vec<Variable>),
    Remember(Vec<Variable>),
    ReadOut(Vec<Expr>),
    WriteIn(Vec<Variable>),

    GiveUp,

    /// COME FROM does nothing where it stands
    ComeFrom,

    /// A statement that failed to parse; fails with E000 when executed
    Splat { text: String },
}

/// The per-statement guards checked before the body runs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Guard {
    pub abstain_slot: Option<usize>,
    pub percent: u8,
}

impl Default for Guard {
    fn default() -> Self {
        Self { abstain_slot: None, percent: 100 }
    }
}

/// Link from a statement to the COME FROM aimed at it, carrying the
/// COME FROM's own abstain slot and chance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trapdoor {
    pub come_from: usize,
    pub abstain_slot: Option<usize>,
    pub percent: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: Op,
    pub guard: Guard,
    pub trapdoor: Option<Trapdoor>,
    pub label: Option<Label>,
    pub line: usize,
}

/// A compiled program or library
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub name: String,

    pub instructions: Vec<Instruction>,

    /// Initial state of each abstain slot (true = abstained)
    pub abstain_defaults: Vec<bool>,

    /// Every local label and the instruction it starts at
    pub entry_points: HashMap<Label, usize>,

    /// Labels other components may NEXT to
    pub exports: Vec<Label>,
}

impl Chunk {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: Vec::new(),
            abstain_defaults: Vec::new(),
            entry_points: HashMap::new(),
            exports: Vec::new(),
        }
    }

    /// Emit an instruction and return its index
    pub fn emit(&mut self, instruction: Instruction) -> usize {
        let index = self.instructions.len();
        if let Some(label) = instruction.label {
            self.entry_points.insert(label, index);
        }
        self.instructions.push(instruction);
        index
    }

    pub fn entry(&self, label: Label) -> Option<usize> {
        self.entry_points.get(&label).copied()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items.iter().map(|item| item.to_string()).collect::<Vec<_>>().join(" + ")
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Op::Assign { target: LValue::Scalar(var), expr } => write!(f, "ASSIGN {} <- {}", var, expr),
            Op::Assign { target: LValue::Element { array, subscripts }, expr } => {
                write!(f, "ASSIGN {} SUB", array)?;
                for sub in subscripts {
                    write!(f, " {}", sub)?;
                }
                write!(f, " <- {}", expr)
            }
            Op::Redimension { array, dimensions } => {
                let dims: Vec<String> = dimensions.iter().map(|d| d.to_string()).collect();
                write!(f, "REDIM {} <- {}", array, dims.join(" BY "))
            }
            Op::Next { label, entry } => write!(f, "NEXT {} @{}", label, entry),
            Op::NextExternal { label } => write!(f, "NEXT {} (linked)", label),
            Op::Lost { label } => write!(f, "NEXT ({}) (lost)", label),
            Op::Resume(depth) => write!(f, "RESUME {}", depth),
            Op::Forget(depth) => write!(f, "FORGET {}", depth),
            Op::Abstain { slots } => write!(f, "ABSTAIN slots {:?}", slots),
            Op::Reinstate { slots } => write!(f, "REINSTATE slots {:?}", slots),
            Op::Unresolved { label } => write!(f, "ABSTAIN/REINSTATE ({}) (unresolved)", label),
            Op::Stash(vars) => write!(f, "STASH {}", join(vars)),
            Op::Retrieve(vars) => write!(f, "RETRIEVE {}", join(vars)),
            Op::Ignore(vars) => write!(f, "IGNORE {}", join(vars)),
            Op::Remember(vars) => write!(f, "REMEMBER {}", join(vars)),
            Op::ReadOut(exprs) => write!(f, "READ OUT {}", join(exprs)),
            Op::WriteIn(vars) => write!(f, "WRITE IN {}", join(vars)),
            Op::GiveUp => write!(f, "GIVE UP"),
            Op::ComeFrom => write!(f, "COME FROM"),
            Op::Splat { text } => write!(f, "* {}", text),
        }
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "== {} ({} statements, {} abstain slots) ==", self.name, self.len(), self.abstain_defaults.len())?;
        for (index, insn) in self.instructions.iter().enumerate() {
            let label = insn.label.map(|l| l.to_string()).unwrap_or_default();
            write!(f, "{:4} {:>7} ", index, label)?;
            if let Some(slot) = insn.guard.abstain_slot {
                let initial = if self.abstain_defaults.get(slot).copied().unwrap_or(false) {
                    "off"
                } else {
                    "on"
                };
                write!(f, "[slot {} {}] ", slot, initial)?;
            }
            if insn.guard.percent < 100 {
                write!(f, "%{} ", insn.guard.percent)?;
            }
            write!(f, "{}", insn.op)?;
            if let Some(trapdoor) = insn.trapdoor {
                write!(f, "  => COME FROM @{}", trapdoor.come_from)?;
            }
            writeln!(f)?;
        }
        if !self.exports.is_empty() {
            writeln!(f, "exports: {}", join(&self.exports))?;
        }
        Ok(())
    }
}
