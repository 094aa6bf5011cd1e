// File: src/parser.rs
//
// Recursive descent parser for INTERCAL.
// Transforms a sequence of tokens into an ordered list of statements.
//
// Each statement is a header (optional label, DO / PLEASE, NOT, %chance)
// followed by a body. Anything the parser cannot make sense of becomes a
// Malformed ("splatted") statement: it keeps its label and header so it
// can still be jumped to, abstained from and echoed in the E000 message,
// and parsing resumes at the next statement start.
//
// Expressions have no precedence; binary operators group to the right.
// Sparks (') and rabbit ears (") open a group in operand position and
// close one in operator position.

use crate::ast::{
    AbstainTarget, Calculation, Expr, Gerund, LValue, Statement, StatementKind, UnaryOp,
    VarKind, Variable,
};
use crate::errors::SourceLocation;
use crate::lexer::{tokenize, Token, TokenKind};

/// Parser maintains position in token stream and builds statements in program order
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    source: String,
}

/// Tokenize and parse a whole program.
pub fn parse_source(source: &str) -> Vec<Statement> {
    Parser::new(tokenize(source), source).parse()
}

fn apply_unary(op: Option<UnaryOp>, expr: Expr) -> Expr {
    match op {
        Some(op) => Expr::Unary { op, operand: Box::new(expr) },
        None => expr,
    }
}

fn sigil_kind(c: char) -> Option<VarKind> {
    match c {
        '.' => Some(VarKind::Spot),
        ':' => Some(VarKind::TwoSpot),
        ',' => Some(VarKind::Tail),
        ';' => Some(VarKind::Hybrid),
        _ => None,
    }
}

impl Parser {
    /// Creates a new parser; `source` is kept to recover each statement's text
    pub fn new(mut tokens: Vec<Token>, source: &str) -> Self {
        if !matches!(tokens.last(), Some(Token { kind: TokenKind::Eof, .. })) {
            let (line, column) = tokens.last().map(|t| (t.line, t.column)).unwrap_or((1, 1));
            tokens.push(Token { kind: TokenKind::Eof, line, column, offset: source.len() });
        }
        Parser { tokens, pos: 0, source: source.to_string() }
    }

    /// Peek at the current token without consuming it
    fn peek(&self) -> &TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + ahead)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn peek_word(&self) -> Option<&str> {
        match self.peek() {
            TokenKind::Word(w) => Some(w.as_str()),
            _ => None,
        }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    /// Consume and return the current token, then advance to the next
    fn advance(&mut self) -> &TokenKind {
        let tok = self.tokens.get(self.pos).map(|t| &t.kind).unwrap_or(&TokenKind::Eof);
        self.pos += 1;
        tok
    }

    fn expect_word(&mut self, word: &str) -> Option<()> {
        if self.peek_word() == Some(word) {
            self.advance();
            Some(())
        } else {
            None
        }
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn is_prefix(kind: &TokenKind) -> bool {
        matches!(kind, TokenKind::Word(w) if w == "DO" || w == "PLEASE")
    }

    /// DO / PLEASE, or a label immediately followed by one of them
    fn at_statement_start(&self) -> bool {
        match self.peek() {
            TokenKind::Label(_) => Self::is_prefix(self.peek_at(1)),
            other => Self::is_prefix(other),
        }
    }

    /// Parse the entire token stream into a vector of statements
    pub fn parse(&mut self) -> Vec<Statement> {
        let mut statements = Vec::new();
        while !self.at_eof() {
            let statement = self.parse_statement(statements.len());
            statements.push(statement);
        }
        statements
    }

    fn parse_statement(&mut self, index: usize) -> Statement {
        let start = self.pos;
        let (line, column, offset) = {
            let tok = self.current();
            (tok.line, tok.column, tok.offset)
        };
        let mut statement =
            Statement::new(StatementKind::Malformed, index, SourceLocation::new(line, column));

        let body = match self.parse_header(&mut statement) {
            Some(()) => self.parse_body(),
            None => None,
        };
        // A body must end exactly where the next statement begins.
        let complete = body.filter(|_| self.at_eof() || self.at_statement_start());

        match complete {
            Some(kind) => statement.kind = kind,
            None => self.recover(start),
        }

        let end = self.current().offset;
        statement.text = self.source.get(offset..end).unwrap_or("").trim().to_string();
        statement
    }

    /// Skip to the next statement start, always making progress.
    fn recover(&mut self, start: usize) {
        if self.pos == start {
            self.advance();
        }
        while !self.at_eof() && !self.at_statement_start() {
            self.advance();
        }
    }

    fn parse_header(&mut self, statement: &mut Statement) -> Option<()> {
        if let TokenKind::Label(label) = *self.peek() {
            statement.label = Some(label);
            self.advance();
        }

        let mut identified = false;
        loop {
            match self.peek() {
                TokenKind::Word(w) if w == "DO" => {
                    identified = true;
                }
                TokenKind::Word(w) if w == "PLEASE" => {
                    identified = true;
                    statement.please = true;
                }
                TokenKind::Word(w) if identified && w == "NOT" => {
                    statement.enabled = false;
                }
                TokenKind::Word(w) if identified && w.starts_with("NOT") => {
                    // PLEASE NOTE ...: disabled, and never a valid body
                    statement.enabled = false;
                    return None;
                }
                TokenKind::Punctuation('%') if identified => {
                    self.advance();
                    match *self.peek() {
                        TokenKind::Number(n) if n <= 100 => statement.percent = n as u8,
                        _ => return None,
                    }
                }
                _ => break,
            }
            self.advance();
        }

        identified.then_some(())
    }

    fn parse_body(&mut self) -> Option<StatementKind> {
        match self.peek().clone() {
            TokenKind::Label(target) => {
                self.advance();
                self.expect_word("NEXT")?;
                Some(StatementKind::Next { target })
            }
            TokenKind::Punctuation('.' | ':' | ',' | ';') => self.parse_calculation(),
            TokenKind::Word(word) => {
                self.advance();
                match word.as_str() {
                    "RESUME" => Some(StatementKind::Resume { depth: self.parse_expr(None)? }),
                    "FORGET" => Some(StatementKind::Forget { depth: self.parse_expr(None)? }),
                    "ABSTAIN" => {
                        self.expect_word("FROM")?;
                        Some(StatementKind::Abstain { target: self.parse_target()? })
                    }
                    "REINSTATE" => Some(StatementKind::Reinstate { target: self.parse_target()? }),
                    "STASH" => Some(StatementKind::Stash(self.parse_variable_list()?)),
                    "RETRIEVE" => Some(StatementKind::Retrieve(self.parse_variable_list()?)),
                    "IGNORE" => Some(StatementKind::Ignore(self.parse_variable_list()?)),
                    "REMEMBER" => Some(StatementKind::Remember(self.parse_variable_list()?)),
                    "READ" => {
                        self.expect_word("OUT")?;
                        let mut items = vec![self.parse_expr(None)?];
                        while matches!(self.peek(), TokenKind::Punctuation('+')) {
                            self.advance();
                            items.push(self.parse_expr(None)?);
                        }
                        Some(StatementKind::ReadOut(items))
                    }
                    "WRITE" => {
                        self.expect_word("IN")?;
                        Some(StatementKind::WriteIn(self.parse_variable_list()?))
                    }
                    "GIVE" => {
                        self.expect_word("UP")?;
                        Some(StatementKind::GiveUp)
                    }
                    "COME" => {
                        self.expect_word("FROM")?;
                        match *self.advance() {
                            TokenKind::Label(target) => Some(StatementKind::ComeFrom { target }),
                            _ => None,
                        }
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn parse_calculation(&mut self) -> Option<StatementKind> {
        let var = self.parse_variable()?;
        let subscripts = if self.peek_word() == Some("SUB") {
            self.advance();
            Some(self.parse_subscripts(None)?)
        } else {
            None
        };

        if !matches!(self.advance(), TokenKind::Gets) {
            return None;
        }
        let expr = self.parse_expr(None)?;

        let calculation = match subscripts {
            Some(subscripts) if var.kind.is_array() => Calculation::Assign {
                target: LValue::Element { array: var, subscripts },
                expr,
            },
            Some(_) => return None,
            None if var.kind.is_array() => {
                let mut dimensions = vec![expr];
                while self.peek_word() == Some("BY") {
                    self.advance();
                    dimensions.push(self.parse_expr(None)?);
                }
                Calculation::Redimension { array: var, dimensions }
            }
            None => Calculation::Assign { target: LValue::Scalar(var), expr },
        };
        Some(StatementKind::Calculate(calculation))
    }

    fn parse_target(&mut self) -> Option<AbstainTarget> {
        if let TokenKind::Label(label) = *self.peek() {
            self.advance();
            return Some(AbstainTarget::Label(label));
        }
        let mut gerunds = vec![self.parse_gerund()?];
        while matches!(self.peek(), TokenKind::Punctuation('+')) {
            self.advance();
            gerunds.push(self.parse_gerund()?);
        }
        Some(AbstainTarget::Gerunds(gerunds))
    }

    fn parse_gerund(&mut self) -> Option<Gerund> {
        let gerund = Gerund::from_word(self.peek_word()?)?;
        self.advance();
        if let Some(next) = gerund.continuation() {
            self.expect_word(next)?;
        }
        Some(gerund)
    }

    fn parse_number(&mut self) -> Option<u16> {
        match *self.advance() {
            TokenKind::Number(n) => u16::try_from(n).ok(),
            _ => None,
        }
    }

    fn parse_variable(&mut self) -> Option<Variable> {
        let kind = match *self.advance() {
            TokenKind::Punctuation(c) => sigil_kind(c)?,
            _ => return None,
        };
        match self.parse_number()? {
            0 => None,
            number => Some(Variable::new(kind, number)),
        }
    }

    fn parse_variable_list(&mut self) -> Option<Vec<Variable>> {
        let mut vars = vec![self.parse_variable()?];
        while matches!(self.peek(), TokenKind::Punctuation('+')) {
            self.advance();
            vars.push(self.parse_variable()?);
        }
        Some(vars)
    }

    fn parse_unary(&mut self) -> Option<UnaryOp> {
        let op = match self.peek() {
            TokenKind::Operator('&') => UnaryOp::And,
            TokenKind::Operator('V') => UnaryOp::Or,
            TokenKind::Operator('?') => UnaryOp::Xor,
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    /// `closer` is the quote that would end the enclosing group, if any.
    fn parse_expr(&mut self, closer: Option<char>) -> Option<Expr> {
        let left = self.parse_operand(closer)?;
        match self.peek() {
            TokenKind::Operator('$') => {
                self.advance();
                let right = self.parse_expr(closer)?;
                Some(Expr::Mingle(Box::new(left), Box::new(right)))
            }
            TokenKind::Operator('~') => {
                self.advance();
                let right = self.parse_expr(closer)?;
                Some(Expr::Select(Box::new(left), Box::new(right)))
            }
            _ => Some(left),
        }
    }

    fn parse_operand(&mut self, closer: Option<char>) -> Option<Expr> {
        match *self.advance() {
            TokenKind::Punctuation('#') => {
                let op = self.parse_unary();
                let value = self.parse_number()?;
                Some(apply_unary(op, Expr::constant(value)))
            }
            TokenKind::Punctuation(quote @ ('\'' | '"')) => {
                let op = self.parse_unary();
                let inner = self.parse_expr(Some(quote))?;
                match *self.advance() {
                    TokenKind::Punctuation(c) if c == quote => Some(apply_unary(op, inner)),
                    _ => None,
                }
            }
            TokenKind::Punctuation(sigil) => {
                let kind = sigil_kind(sigil)?;
                let op = self.parse_unary();
                let number = match self.parse_number()? {
                    0 => return None,
                    n => n,
                };
                let var = Variable::new(kind, number);
                let base = if !kind.is_array() {
                    Expr::Var(var)
                } else if self.peek_word() == Some("SUB") {
                    self.advance();
                    Expr::Element { array: var, subscripts: self.parse_subscripts(closer)? }
                } else {
                    Expr::Array(var)
                };
                Some(apply_unary(op, base))
            }
            _ => None,
        }
    }

    fn starts_operand(&self, closer: Option<char>) -> bool {
        match *self.peek() {
            TokenKind::Punctuation('#' | '.' | ':' | ',' | ';') => true,
            TokenKind::Punctuation(quote @ ('\'' | '"')) => Some(quote) != closer,
            _ => false,
        }
    }

    fn parse_subscripts(&mut self, closer: Option<char>) -> Option<Vec<Expr>> {
        let mut subscripts = vec![self.parse_expr(closer)?];
        while self.starts_operand(closer) {
            subscripts.push(self.parse_expr(closer)?);
        }
        Some(subscripts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(source: &str) -> Statement {
        let mut statements = parse_source(source);
        assert_eq!(statements.len(), 1, "expected one statement in {:?}", source);
        statements.remove(0)
    }

    #[test]
    fn test_header_fields() {
        let stmt = single("(10) PLEASE DON'T %50 GIVE UP");
        assert_eq!(stmt.label, Some(10));
        assert!(stmt.please);
        assert!(!stmt.enabled);
        assert_eq!(stmt.percent, 50);
        assert_eq!(stmt.kind, StatementKind::GiveUp);
        assert_eq!(stmt.text, "(10) PLEASE DON'T %50 GIVE UP");
    }

    #[test]
    fn test_next_and_come_from() {
        let statements = parse_source("DO (20) NEXT\n(20) DO COME FROM (10)");
        assert_eq!(statements[0].kind, StatementKind::Next { target: 20 });
        assert_eq!(statements[1].kind, StatementKind::ComeFrom { target: 10 });
        assert_eq!(statements[1].index, 1);
        assert_eq!(statements[1].location.line, 2);
    }

    #[test]
    fn test_nested_sparks() {
        let stmt = single("DO .1 <- '#1$'#2~#3''");
        let expected = Expr::Mingle(
            Box::new(Expr::constant(1)),
            Box::new(Expr::Select(Box::new(Expr::constant(2)), Box::new(Expr::constant(3)))),
        );
        assert_eq!(
            stmt.kind,
            StatementKind::Calculate(Calculation::Assign {
                target: LValue::Scalar(Variable::spot(1)),
                expr: expected
            })
        );
    }

    #[test]
    fn test_unary_inside_variable() {
        let stmt = single("DO .2 <- .V1");
        match stmt.kind {
            StatementKind::Calculate(Calculation::Assign { expr, .. }) => assert_eq!(
                expr,
                Expr::Unary { op: UnaryOp::Or, operand: Box::new(Expr::Var(Variable::spot(1))) }
            ),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_redimension_and_element() {
        let statements = parse_source("DO ,1 <- #2 BY #3\nDO ,1 SUB #1 #2 <- #7");
        assert!(matches!(
            &statements[0].kind,
            StatementKind::Calculate(Calculation::Redimension { dimensions, .. }) if dimensions.len() == 2
        ));
        assert!(matches!(
            &statements[1].kind,
            StatementKind::Calculate(Calculation::Assign { target: LValue::Element { subscripts, .. }, .. })
                if subscripts.len() == 2
        ));
    }

    #[test]
    fn test_gerund_list() {
        let stmt = single("DO ABSTAIN FROM READING OUT + COMING FROM + NEXTING");
        assert_eq!(
            stmt.kind,
            StatementKind::Abstain {
                target: AbstainTarget::Gerunds(vec![
                    Gerund::ReadingOut,
                    Gerund::ComingFrom,
                    Gerund::Nexting
                ])
            }
        );
    }

    #[test]
    fn test_comment_idiom_is_disabled_splat() {
        let statements = parse_source("PLEASE NOTE THIS IS SILLY\nDO GIVE UP");
        assert_eq!(statements.len(), 2);
        assert!(statements[0].is_splatted());
        assert!(!statements[0].enabled);
        assert_eq!(statements[0].text, "PLEASE NOTE THIS IS SILLY");
        assert_eq!(statements[1].kind, StatementKind::GiveUp);
    }

    #[test]
    fn test_garbage_recovers_at_labelled_statement() {
        let statements = parse_source("DO FLY TO THE MOON (5) DO GIVE UP");
        assert_eq!(statements.len(), 2);
        assert!(statements[0].is_splatted());
        assert!(statements[0].enabled);
        assert_eq!(statements[1].label, Some(5));
    }

    #[test]
    fn test_out_of_range_constant_splats() {
        assert!(single("DO .1 <- #65536").is_splatted());
        assert!(single("DO %101 GIVE UP").is_splatted());
    }

    #[test]
    fn test_leading_junk_is_its_own_statement() {
        let statements = parse_source("HELLO DO GIVE UP");
        assert_eq!(statements.len(), 2);
        assert!(statements[0].is_splatted());
        assert_eq!(statements[0].text, "HELLO");
    }
}
