// File: src/lexer.rs
//
// Lexical analyzer (tokenizer) for INTERCAL source.
// Converts source text into a stream of tokens for the parser.
//
// Supports:
// - Words (DO, PLEASE, NEXT, READ, OUT, gerunds, ...), upper-cased
// - N'T contractions: DON'T becomes DO NOT
// - Labels written as (digits), and bare numbers
// - The assignment arrow <-
// - Operators: $ (or ¢) mingle, ~ select, & V ? unary
// - Punctuation: . : , ; # ' " + % and anything else unrecognised
// - ! as shorthand for spark-spot ('.)

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Word(String),
    Label(u32),
    Number(u32),
    Gets,
    Operator(char),
    Punctuation(char),
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
    /// Byte offset of the token's first character
    pub offset: usize,
}

impl Token {
    pub fn is_word(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Word(w) if w == word)
    }
}

fn parse_digits(digits: &str) -> u32 {
    // Oversized numbers saturate; the parser rejects them with the right error.
    digits.parse().unwrap_or(u32::MAX)
}

/// Tokenizes INTERCAL source code into a vector of tokens.
///
/// Processes the input character by character. Whitespace is insignificant
/// apart from separating words. The token stream always ends with `Eof`.
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();
    let mut line = 1;
    let mut col = 1;

    while let Some(&(offset, c)) = chars.peek() {
        match c {
            '\n' => {
                chars.next();
                line += 1;
                col = 1;
            }
            c if c.is_whitespace() => {
                chars.next();
                col += 1;
            }
            '0'..='9' => {
                let start_col = col;
                let mut digits = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if ch.is_ascii_digit() {
                        digits.push(ch);
                        chars.next();
                        col += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Number(parse_digits(&digits)),
                    line,
                    column: start_col,
                    offset,
                });
            }
            '(' => {
                // A label only if the parenthesis holds nothing but digits.
                let start_col = col;
                let rest = &source[offset + 1..];
                let digits: String = rest.chars().take_while(|ch| ch.is_ascii_digit()).collect();
                if !digits.is_empty() && rest[digits.len()..].starts_with(')') {
                    for _ in 0..digits.len() + 2 {
                        chars.next();
                    }
                    col += digits.len() + 2;
                    tokens.push(Token {
                        kind: TokenKind::Label(parse_digits(&digits)),
                        line,
                        column: start_col,
                        offset,
                    });
                } else {
                    chars.next();
                    col += 1;
                    tokens.push(Token {
                        kind: TokenKind::Punctuation('('),
                        line,
                        column: start_col,
                        offset,
                    });
                }
            }
            'a'..='z' | 'A'..='Z' => {
                let start_col = col;
                let mut word = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if ch.is_ascii_alphabetic() {
                        word.push(ch.to_ascii_uppercase());
                        chars.next();
                        col += 1;
                    } else {
                        break;
                    }
                }

                // N'T contraction: DON'T -> DO NOT, a lone N'T -> NOT
                let rest = &source[offset + word.len()..];
                if word.ends_with('N') && (rest.starts_with("'T") || rest.starts_with("'t")) {
                    chars.next();
                    chars.next();
                    col += 2;
                    word.pop();
                    if !word.is_empty() {
                        tokens.push(Token {
                            kind: TokenKind::Word(word),
                            line,
                            column: start_col,
                            offset,
                        });
                    }
                    tokens.push(Token {
                        kind: TokenKind::Word("NOT".to_string()),
                        line,
                        column: start_col,
                        offset,
                    });
                    continue;
                }

                let kind = if word == "V" {
                    TokenKind::Operator('V')
                } else {
                    TokenKind::Word(word)
                };
                tokens.push(Token {
                    kind,
                    line,
                    column: start_col,
                    offset,
                });
            }
            '<' => {
                chars.next();
                col += 1;
                if matches!(chars.peek(), Some(&(_, '-'))) {
                    chars.next();
                    col += 1;
                    tokens.push(Token {
                        kind: TokenKind::Gets,
                        line,
                        column: col - 2,
                        offset,
                    });
                } else {
                    tokens.push(Token {
                        kind: TokenKind::Punctuation('<'),
                        line,
                        column: col - 1,
                        offset,
                    });
                }
            }
            '!' => {
                chars.next();
                tokens.push(Token {
                    kind: TokenKind::Punctuation('\''),
                    line,
                    column: col,
                    offset,
                });
                tokens.push(Token {
                    kind: TokenKind::Punctuation('.'),
                    line,
                    column: col,
                    offset,
                });
                col += 1;
            }
            '$' | '¢' | '~' | '&' | '?' => {
                chars.next();
                let op = if c == '¢' { '$' } else { c };
                tokens.push(Token {
                    kind: TokenKind::Operator(op),
                    line,
                    column: col,
                    offset,
                });
                col += 1;
            }
            _ => {
                chars.next();
                tokens.push(Token {
                    kind: TokenKind::Punctuation(c),
                    line,
                    column: col,
                    offset,
                });
                col += 1;
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        line,
        column: col,
        offset: source.len(),
    });

    tokens
}
