//! The seam between the session and the code it runs.
//!
//! A session never interprets code itself; it hands the source and its
//! namespace to an [`Evaluator`]. The default evaluator is
//! [`ScriptEvaluator`](crate::script::ScriptEvaluator). Submitted code runs
//! with the full privileges of the server process: there is no sandbox
//! beyond what the evaluator's language chooses not to expose.

use std::fmt;

use crate::namespace::Namespace;

/// Evaluates source text against a persistent namespace.
pub trait Evaluator: Send {
    /// Run `source`, mutating `namespace` in place.
    ///
    /// Must not panic on bad input: failures are reported in the returned
    /// [`Evaluation`]. Side effects performed before a failure are kept.
    fn evaluate(&mut self, source: &str, namespace: &mut Namespace) -> Evaluation;
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// Captured standard output, including output printed before an error.
    pub stdout: String,
    /// The error the code raised, if any.
    pub error: Option<EvalError>,
}

/// Category of a raised error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Name,
    Type,
    Value,
    ZeroDivision,
    Key,
    Index,
    Overflow,
    ReservedName,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Syntax => "SyntaxError",
            Self::Name => "NameError",
            Self::Type => "TypeError",
            Self::Value => "ValueError",
            Self::ZeroDivision => "ZeroDivisionError",
            Self::Key => "KeyError",
            Self::Index => "IndexError",
            Self::Overflow => "OverflowError",
            Self::ReservedName => "ReservedNameError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error raised by submitted code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}{}", line.map(|l| format!(" (line {l})")).unwrap_or_default())]
pub struct EvalError {
    pub kind: ErrorKind,
    pub message: String,
    /// 1-based source line, when known.
    pub line: Option<usize>,
}

impl EvalError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
        }
    }

    /// Attach a line number unless a more precise one is already set.
    pub fn at_line(mut self, line: usize) -> Self {
        self.line.get_or_insert(line);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_type_message_and_line() {
        let err = EvalError::new(ErrorKind::ZeroDivision, "division by zero").at_line(3);
        assert_eq!(err.to_string(), "ZeroDivisionError: division by zero (line 3)");
    }

    #[test]
    fn test_at_line_keeps_innermost() {
        let err = EvalError::new(ErrorKind::Name, "x").at_line(4).at_line(1);
        assert_eq!(err.line, Some(4));
    }
}
