// File: src/errors.rs
//
// Error handling and reporting for the comefrom compiler and runtime.
// Every failure carries one of the traditional INTERCAL error codes, an
// optional source location, and (for runtime failures) the labels that
// were on the nexting stack when the program died.

use colored::Colorize;
use std::fmt;

/// Source location information for tracking where a statement appears in a file
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
    pub file: Option<String>,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column, file: None }
    }

    pub fn with_file(line: usize, column: usize, file: String) -> Self {
        Self { line, column, file: Some(file) }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(ref file) = self.file {
            write!(f, "{}:{}:{}", file, self.line, self.column)
        } else {
            write!(f, "{}:{}", self.line, self.column)
        }
    }
}

/// Which phase produced the error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Compile,
    Runtime,
    Io,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::Compile => write!(f, "Compile Error"),
            ErrorKind::Runtime => write!(f, "Runtime Error"),
            ErrorKind::Io => write!(f, "I/O Error"),
            ErrorKind::Config => write!(f, "Config Error"),
        }
    }
}

/// The traditional error catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    E000,
    E017,
    E079,
    E099,
    E123,
    E129,
    E139,
    E182,
    E197,
    E200,
    E240,
    E241,
    E275,
    E436,
    E444,
    E533,
    E555,
    E562,
    E579,
    E632,
    E633,
    E777,
    E778,
    E998,
    E1999,
    E2001,
}

impl ErrorCode {
    pub fn number(&self) -> u32 {
        match self {
            ErrorCode::E000 => 0,
            ErrorCode::E017 => 17,
            ErrorCode::E079 => 79,
            ErrorCode::E099 => 99,
            ErrorCode::E123 => 123,
            ErrorCode::E129 => 129,
            ErrorCode::E139 => 139,
            ErrorCode::E182 => 182,
            ErrorCode::E197 => 197,
            ErrorCode::E200 => 200,
            ErrorCode::E240 => 240,
            ErrorCode::E241 => 241,
            ErrorCode::E275 => 275,
            ErrorCode::E436 => 436,
            ErrorCode::E444 => 444,
            ErrorCode::E533 => 533,
            ErrorCode::E555 => 555,
            ErrorCode::E562 => 562,
            ErrorCode::E579 => 579,
            ErrorCode::E632 => 632,
            ErrorCode::E633 => 633,
            ErrorCode::E777 => 777,
            ErrorCode::E778 => 778,
            ErrorCode::E998 => 998,
            ErrorCode::E1999 => 1999,
            ErrorCode::E2001 => 2001,
        }
    }

    /// The canned message. E000 has none: it echoes the offending statement.
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::E000 => "",
            ErrorCode::E017 => "DO YOU EXPECT ME TO FIGURE THIS OUT?",
            ErrorCode::E079 => "PROGRAMMER IS INSUFFICIENTLY POLITE",
            ErrorCode::E099 => "PROGRAMMER IS OVERLY POLITE",
            ErrorCode::E123 => "PROGRAM HAS DISAPPEARED INTO THE BLACK LAGOON",
            ErrorCode::E129 => "PROGRAM HAS GOTTEN LOST ON THE WAY TO",
            ErrorCode::E139 => "I WASN'T PLANNING TO GO THERE ANYWAY",
            ErrorCode::E182 => "YOU MUST LIKE THIS LABEL A LOT!",
            ErrorCode::E197 => "SO!  65535 LABELS AREN'T ENOUGH FOR YOU?",
            ErrorCode::E200 => "NOTHING VENTURED, NOTHING GAINED",
            ErrorCode::E240 => "ERROR HANDLER PRINTED SNIDE REMARK",
            ErrorCode::E241 => "VARIABLES MAY NOT BE STORED IN WEST HYPERSPACE",
            ErrorCode::E275 => "DON'T BYTE OFF MORE THAN YOU CAN CHEW",
            ErrorCode::E436 => "THROW STICK BEFORE RETRIEVING!",
            ErrorCode::E444 => "IT CAME FROM BEYOND SPACE",
            ErrorCode::E533 => "YOU WANT MAYBE WE SHOULD IMPLEMENT 64-BIT VARIABLES?",
            ErrorCode::E555 => "FLOW DIAGRAM IS EXCESSIVELY CONNECTED",
            ErrorCode::E562 => "I DO NOT COMPUTE",
            ErrorCode::E579 => "WHAT BASE AND/OR LANGUAGE INCLUDES",
            ErrorCode::E632 => "THE NEXT STACK RUPTURES.  ALL DIE.  OH, THE EMBARRASSMENT!",
            ErrorCode::E633 => "PROGRAM FELL OFF THE EDGE ON THE WAY TO THE NEW WORLD",
            ErrorCode::E777 => "A SOURCE IS A SOURCE, OF COURSE, OF COURSE",
            ErrorCode::E778 => "UNEXPLAINED COMPILER BUG",
            ErrorCode::E998 => "EXCUSE ME, YOU MUST HAVE ME CONFUSED WITH SOME OTHER COMPILER",
            ErrorCode::E1999 => "DOUBLE OR SINGLE PRECISION OVERFLOW",
            ErrorCode::E2001 => "DON'T GET MUCH CALL FOR THOSE ROUND THESE PARTS",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "E{:03}", self.number())
    }
}

/// A structured error with location information
#[derive(Debug, Clone)]
pub struct IckError {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub message: String,
    pub location: Option<SourceLocation>,
    pub source_line: Option<String>,
    /// Labels on the nexting stack at the time of failure, most recently nexted first.
    pub trace: Vec<u16>,
    pub help: Option<String>,
    pub note: Option<String>,
}

impl IckError {
    pub fn new(kind: ErrorKind, code: ErrorCode, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let message = match (code.message(), detail.is_empty()) {
            ("", _) => detail,
            (canned, true) => canned.to_string(),
            (canned, false) => format!("{} {}", canned, detail),
        };
        Self {
            kind,
            code,
            message,
            location: None,
            source_line: None,
            trace: Vec::new(),
            help: None,
            note: None,
        }
    }

    /// Create a compile-time error
    pub fn compile(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Compile, code, detail)
    }

    /// Create a runtime error
    pub fn runtime(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Runtime, code, detail)
    }

    pub fn io(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, code, detail)
    }

    pub fn config(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, ErrorCode::E2001, detail)
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Attach a location unless one is already present.
    pub fn or_at(self, location: SourceLocation) -> Self {
        if self.location.is_some() {
            self
        } else {
            self.at(location)
        }
    }

    /// Name the file an already-located error came from.
    pub fn in_file(mut self, file: &str) -> Self {
        if let Some(location) = self.location.as_mut() {
            location.file.get_or_insert_with(|| file.to_string());
        }
        self
    }

    pub fn with_source(mut self, source_line: String) -> Self {
        self.source_line = Some(source_line);
        self
    }

    pub fn with_trace(mut self, trace: Vec<u16>) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.note = Some(note);
        self
    }
}

impl fmt::Display for IckError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let header = format!("{}", self.code);
        writeln!(f, "{} {}", header.red().bold(), self.message.bold())?;

        if let Some(ref location) = self.location {
            let location_str = format!("  --> {} ({})", location, self.kind);
            writeln!(f, "{}", location_str.bright_blue())?;
        }

        if let Some(ref source) = self.source_line {
            writeln!(f, "   {} {}", "|".bright_blue(), source)?;
        }

        for label in &self.trace {
            writeln!(f, "   at ({})", label)?;
        }

        if let Some(ref help) = self.help {
            writeln!(
                f,
                "   {} {}",
                "=".bright_yellow(),
                format!("help: {}", help).bright_yellow()
            )?;
        }

        if let Some(ref note) = self.note {
            writeln!(f, "   {} {}", "=".bright_cyan(), format!("note: {}", note).bright_cyan())?;
        }

        Ok(())
    }
}

impl std::error::Error for IckError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canned_message_with_detail() {
        let err = IckError::runtime(ErrorCode::E129, "(1234)");
        assert_eq!(err.message, "PROGRAM HAS GOTTEN LOST ON THE WAY TO (1234)");
        assert_eq!(err.kind, ErrorKind::Runtime);
    }

    #[test]
    fn test_splat_echoes_statement() {
        let err = IckError::runtime(ErrorCode::E000, "DO SOMETHING SILLY");
        assert_eq!(err.message, "DO SOMETHING SILLY");
        assert_eq!(err.code.to_string(), "E000");
    }

    #[test]
    fn test_code_display_is_zero_padded() {
        assert_eq!(ErrorCode::E017.to_string(), "E017");
        assert_eq!(ErrorCode::E1999.to_string(), "E1999");
    }

    #[test]
    fn test_display_lists_trace() {
        colored::control::set_override(false);
        let err = IckError::runtime(ErrorCode::E632, "")
            .at(SourceLocation::new(3, 1))
            .with_trace(vec![20, 10]);
        let rendered = err.to_string();
        assert!(rendered.contains("E632 THE NEXT STACK RUPTURES"));
        assert!(rendered.contains("at (20)\n   at (10)"));
    }

    #[test]
    fn test_or_at_keeps_first_location() {
        let err = IckError::runtime(ErrorCode::E200, "")
            .at(SourceLocation::new(1, 1))
            .or_at(SourceLocation::new(9, 9));
        assert_eq!(err.location, Some(SourceLocation::new(1, 1)));
    }
}
