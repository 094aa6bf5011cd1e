// File: src/program.rs
//
// The Program model: statements in program order plus the two lookup
// tables the compiler works from (label -> statement, gerund -> members).
// Built once by `Program::index`; after that only the compiler's own
// passes touch abstain slots and trapdoors.

use std::collections::HashMap;

use crate::ast::{Gerund, Label, Statement};
use crate::errors::{ErrorCode, IckError};

#[derive(Debug, Clone)]
pub struct Program {
    statements: Vec<Statement>,
    labels: HashMap<Label, usize>,
    gerunds: HashMap<Gerund, Vec<usize>>,
}

impl Program {
    /// Label and gerund indexing. Rejects out-of-range and duplicate labels.
    pub fn index(mut statements: Vec<Statement>) -> Result<Self, IckError> {
        let mut labels = HashMap::new();
        let mut gerunds: HashMap<Gerund, Vec<usize>> = HashMap::new();

        for (position, statement) in statements.iter_mut().enumerate() {
            statement.index = position;

            if let Some(raw) = statement.label {
                let label = Label::new(raw).ok_or_else(|| {
                    IckError::compile(ErrorCode::E197, format!("({})", raw))
                        .at(statement.location.clone())
                        .with_source(statement.text.clone())
                })?;
                if let Some(previous) = labels.insert(label, position) {
                    return Err(IckError::compile(ErrorCode::E182, label.to_string())
                        .at(statement.location.clone())
                        .with_source(statement.text.clone())
                        .with_note(format!("first defined by statement {}", previous + 1)));
                }
            }

            if let Some(gerund) = statement.kind.gerund() {
                gerunds.entry(gerund).or_default().push(position);
            }
        }

        Ok(Program { statements, labels, gerunds })
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Statement> {
        self.statements.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Statement> {
        self.statements.get_mut(index)
    }

    pub(crate) fn statements_mut(&mut self) -> &mut [Statement] {
        &mut self.statements
    }

    /// Position of the statement carrying `label`, if local.
    pub fn position(&self, label: Label) -> Option<usize> {
        self.labels.get(&label).copied()
    }

    /// Like `position`, for a label as written (possibly out of range).
    pub fn resolve(&self, raw: u32) -> Option<usize> {
        Label::new(raw).and_then(|label| self.position(label))
    }

    pub fn lookup(&self, label: Label) -> Option<&Statement> {
        self.position(label).and_then(|index| self.get(index))
    }

    pub fn members(&self, gerund: Gerund) -> &[usize] {
        self.gerunds.get(&gerund).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All labels with their statement positions, in program order.
    pub fn labels(&self) -> Vec<(Label, usize)> {
        let mut labels: Vec<(Label, usize)> =
            self.labels.iter().map(|(label, index)| (*label, *index)).collect();
        labels.sort_by_key(|(_, index)| *index);
        labels
    }

    /// Percentage of statements that say PLEASE.
    pub fn politeness(&self) -> u32 {
        if self.statements.is_empty() {
            return 0;
        }
        let please = self.statements.iter().filter(|s| s.please).count();
        (please * 100 / self.statements.len()) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    #[test]
    fn test_index_builds_tables() {
        let program = Program::index(parse_source(
            "(1) DO .1 <- #1\nDO (1) NEXT\n(2) PLEASE READ OUT .1\nDO .2 <- #2",
        ))
        .unwrap();
        assert_eq!(program.position(Label::new(2).unwrap()), Some(2));
        assert_eq!(program.resolve(70000), None);
        assert_eq!(program.members(Gerund::Calculating), &[0, 3]);
        assert_eq!(program.members(Gerund::Nexting), &[1]);
        assert!(program.members(Gerund::Forgetting).is_empty());
        assert_eq!(program.politeness(), 25);
    }

    #[test]
    fn test_duplicate_label() {
        let err = Program::index(parse_source("(7) DO GIVE UP\n(7) DO GIVE UP")).unwrap_err();
        assert_eq!(err.code, ErrorCode::E182);
        assert_eq!(err.location.map(|l| l.line), Some(2));
    }

    #[test]
    fn test_label_out_of_range() {
        let err = Program::index(parse_source("(65536) DO GIVE UP")).unwrap_err();
        assert_eq!(err.code, ErrorCode::E197);
        let err = Program::index(parse_source("(0) DO GIVE UP")).unwrap_err();
        assert_eq!(err.code, ErrorCode::E197);
    }

    #[test]
    fn test_splatted_statements_keep_labels() {
        let program = Program::index(parse_source("(3) DO SOMETHING ODD\nDO GIVE UP")).unwrap();
        let stmt = program.lookup(Label::new(3).unwrap()).unwrap();
        assert!(stmt.is_splatted());
    }
}
