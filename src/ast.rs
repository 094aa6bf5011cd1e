// File: src/ast.rs
//
// Abstract Syntax Tree (AST) definitions for INTERCAL programs.
// A program is an ordered list of statements. Each statement carries the
// metadata the control-flow passes need: label, NOT qualifier, percent
// chance, and the abstain slot and trapdoor filled in during compilation.

use std::fmt;

use crate::errors::SourceLocation;

/// A statement label, always within 1..=65535.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(u16);

impl Label {
    /// Validate a raw label as written in the source.
    pub fn new(raw: u32) -> Option<Self> {
        match u16::try_from(raw) {
            Ok(0) | Err(_) => None,
            Ok(value) => Some(Label(value)),
        }
    }

    pub fn value(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({})", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKind {
    /// `.n`, 16-bit scalar
    Spot,
    /// `:n`, 32-bit scalar
    TwoSpot,
    /// `,n`, array of 16-bit values
    Tail,
    /// `;n`, array of 32-bit values
    Hybrid,
}

impl VarKind {
    pub fn sigil(self) -> char {
        match self {
            VarKind::Spot => '.',
            VarKind::TwoSpot => ':',
            VarKind::Tail => ',',
            VarKind::Hybrid => ';',
        }
    }

    pub fn is_array(self) -> bool {
        matches!(self, VarKind::Tail | VarKind::Hybrid)
    }

    /// Whether values stored under this kind are limited to 16 bits.
    pub fn is_short(self) -> bool {
        matches!(self, VarKind::Spot | VarKind::Tail)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Variable {
    pub kind: VarKind,
    pub number: u16,
}

impl Variable {
    pub fn new(kind: VarKind, number: u16) -> Self {
        Self { kind, number }
    }

    pub fn spot(number: u16) -> Self {
        Self::new(VarKind::Spot, number)
    }

    pub fn two_spot(number: u16) -> Self {
        Self::new(VarKind::TwoSpot, number)
    }

    pub fn tail(number: u16) -> Self {
        Self::new(VarKind::Tail, number)
    }

    pub fn hybrid(number: u16) -> Self {
        Self::new(VarKind::Hybrid, number)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.kind.sigil(), self.number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    And,
    Or,
    Xor,
}

impl UnaryOp {
    pub fn symbol(self) -> char {
        match self {
            UnaryOp::And => '&',
            UnaryOp::Or => 'V',
            UnaryOp::Xor => '?',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `#n`. Folded constants may be 32 bits wide.
    Constant { value: u32, wide: bool },
    Var(Variable),
    Element { array: Variable, subscripts: Vec<Expr> },
    /// An unsubscripted array, only meaningful to READ OUT
    Array(Variable),
    Unary { op: UnaryOp, operand: Box<Expr> },
    Mingle(Box<Expr>, Box<Expr>),
    Select(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn constant(value: u16) -> Self {
        Expr::Constant { value: value as u32, wide: false }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Constant { value, .. } => write!(f, "#{}", value),
            Expr::Var(var) | Expr::Array(var) => write!(f, "{}", var),
            Expr::Element { array, subscripts } => {
                write!(f, "{} SUB", array)?;
                for sub in subscripts {
                    write!(f, " {}", sub)?;
                }
                Ok(())
            }
            Expr::Unary { op, operand } => write!(f, "'{}{}'", op.symbol(), operand),
            Expr::Mingle(l, r) => write!(f, "'{}${}'", l, r),
            Expr::Select(l, r) => write!(f, "'{}~{}'", l, r),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LValue {
    Scalar(Variable),
    Element { array: Variable, subscripts: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Calculation {
    Assign { target: LValue, expr: Expr },
    Redimension { array: Variable, dimensions: Vec<Expr> },
}

/// Statement classes that can be abstained from or reinstated as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gerund {
    Calculating,
    Nexting,
    Resuming,
    Forgetting,
    Abstaining,
    Reinstating,
    Stashing,
    Retrieving,
    Ignoring,
    Remembering,
    ReadingOut,
    WritingIn,
    ComingFrom,
}

impl Gerund {
    /// Map a single-word gerund. READING OUT, WRITING IN and COMING FROM
    /// are recognised by their first word and completed by the parser.
    pub fn from_word(word: &str) -> Option<Self> {
        Some(match word {
            "CALCULATING" => Gerund::Calculating,
            "NEXTING" => Gerund::Nexting,
            "RESUMING" => Gerund::Resuming,
            "FORGETTING" => Gerund::Forgetting,
            "ABSTAINING" => Gerund::Abstaining,
            "REINSTATING" => Gerund::Reinstating,
            "STASHING" => Gerund::Stashing,
            "RETRIEVING" => Gerund::Retrieving,
            "IGNORING" => Gerund::Ignoring,
            "REMEMBERING" => Gerund::Remembering,
            "READING" => Gerund::ReadingOut,
            "WRITING" => Gerund::WritingIn,
            "COMING" => Gerund::ComingFrom,
            _ => return None,
        })
    }

    /// Second word required after the first, if any.
    pub fn continuation(self) -> Option<&'static str> {
        match self {
            Gerund::ReadingOut => Some("OUT"),
            Gerund::WritingIn => Some("IN"),
            Gerund::ComingFrom => Some("FROM"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AbstainTarget {
    Label(u32),
    Gerunds(Vec<Gerund>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Calculate(Calculation),
    Next { target: u32 },
    Resume { depth: Expr },
    Forget { depth: Expr },
    Abstain { target: AbstainTarget },
    Reinstate { target: AbstainTarget },
    Stash(Vec<Variable>),
    Retrieve(Vec<Variable>),
    Ignore(Vec<Variable>),
    Remember(Vec<Variable>),
    ReadOut(Vec<Expr>),
    WriteIn(Vec<Variable>),
    GiveUp,
    ComeFrom { target: u32 },
    Malformed,
}

impl StatementKind {
    /// GIVE UP and splatted statements belong to no class.
    pub fn gerund(&self) -> Option<Gerund> {
        match self {
            StatementKind::Calculate(_) => Some(Gerund::Calculating),
            StatementKind::Next { .. } => Some(Gerund::Nexting),
            StatementKind::Resume { .. } => Some(Gerund::Resuming),
            StatementKind::Forget { .. } => Some(Gerund::Forgetting),
            StatementKind::Abstain { .. } => Some(Gerund::Abstaining),
            StatementKind::Reinstate { .. } => Some(Gerund::Reinstating),
            StatementKind::Stash(_) => Some(Gerund::Stashing),
            StatementKind::Retrieve(_) => Some(Gerund::Retrieving),
            StatementKind::Ignore(_) => Some(Gerund::Ignoring),
            StatementKind::Remember(_) => Some(Gerund::Remembering),
            StatementKind::ReadOut(_) => Some(Gerund::ReadingOut),
            StatementKind::WriteIn(_) => Some(Gerund::WritingIn),
            StatementKind::ComeFrom { .. } => Some(Gerund::ComingFrom),
            StatementKind::GiveUp | StatementKind::Malformed => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    /// Zero-based position in program order
    pub index: usize,
    pub location: SourceLocation,
    /// Raw label as written; range checking happens during indexing
    pub label: Option<u32>,
    /// False when the statement carries a NOT qualifier
    pub enabled: bool,
    pub please: bool,
    /// Execution chance, 0..=100
    pub percent: u8,
    pub abstain_slot: Option<usize>,
    /// Index of the COME FROM statement aimed at this one
    pub trapdoor: Option<usize>,
    pub text: String,
}

impl Statement {
    pub fn new(kind: StatementKind, index: usize, location: SourceLocation) -> Self {
        Self {
            kind,
            index,
            location,
            label: None,
            enabled: true,
            please: false,
            percent: 100,
            abstain_slot: None,
            trapdoor: None,
            text: String::new(),
        }
    }

    pub fn is_splatted(&self) -> bool {
        matches!(self.kind, StatementKind::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_range() {
        assert!(Label::new(0).is_none());
        assert!(Label::new(65536).is_none());
        assert_eq!(Label::new(65535).map(Label::value), Some(65535));
        assert_eq!(Label::new(10).map(|l| l.to_string()), Some("(10)".to_string()));
    }

    #[test]
    fn test_give_up_has_no_gerund() {
        assert_eq!(StatementKind::GiveUp.gerund(), None);
        assert_eq!(
            StatementKind::ComeFrom { target: 1 }.gerund(),
            Some(Gerund::ComingFrom)
        );
    }

    #[test]
    fn test_gerund_words() {
        assert_eq!(Gerund::from_word("READING"), Some(Gerund::ReadingOut));
        assert_eq!(Gerund::ReadingOut.continuation(), Some("OUT"));
        assert_eq!(Gerund::Nexting.continuation(), None);
        assert_eq!(Gerund::from_word("GIVING"), None);
    }

    #[test]
    fn test_expr_display() {
        let expr = Expr::Mingle(
            Box::new(Expr::Var(Variable::spot(1))),
            Box::new(Expr::constant(3)),
        );
        assert_eq!(expr.to_string(), "'.1$#3'");
    }
}
