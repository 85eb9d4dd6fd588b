use std::fmt::{self, Display};

use crate::script::token::Token;

/// Result type alias for operations that can produce a runtime error.
pub type RunResult<T> = Result<T, RunError>;

/// Runtime error raised by the evaluator.
///
/// Two kinds exist, mirroring the engine's recovery policy:
///
/// * [`RunError::Typed`] — a typed-operation failure (bad operand types,
///   out-of-range index, absent dictionary key, malformed stdlib argument).
///   Recoverable at an expression boundary: a failing cell shows an error
///   while its neighbours stay computable.
/// * [`RunError::Fatal`] — a control-flow violation (missing return,
///   unmatched break/continue, call to a non-function, arity mismatch,
///   read-before-write). Not recoverable; the embedder reports and stops
///   the current entry point.
///
/// Both carry a human-readable message that accumulates source positions as
/// it propagates: each operator that forwards an error appends its own token
/// position first (and gives an attached debugger a chance to inspect the
/// live stack).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    Typed(String),
    Fatal(String),
}

impl RunError {
    /// Creates a typed-operation error with the given message.
    pub fn typed(message: impl Into<String>) -> Self {
        Self::Typed(message.into())
    }

    /// Creates a fatal error with the given message.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    /// Creates a typed-operation error annotated with a source position.
    pub fn typed_at(message: &str, token: &Token) -> Self {
        Self::Typed(annotate(message, token))
    }

    /// Creates a fatal error annotated with a source position.
    pub fn fatal_at(message: &str, token: &Token) -> Self {
        Self::Fatal(annotate(message, token))
    }

    /// Returns the message carried by this error.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Typed(message) | Self::Fatal(message) => message,
        }
    }

    /// Returns a copy of this error with the message re-annotated at `token`.
    ///
    /// The error kind is preserved: annotation never upgrades a typed error
    /// to fatal or vice versa.
    #[must_use]
    pub fn annotated(&self, token: &Token) -> Self {
        match self {
            Self::Typed(message) => Self::Typed(annotate(message, token)),
            Self::Fatal(message) => Self::Fatal(annotate(message, token)),
        }
    }

    /// True for the recoverable, typed-operation kind.
    #[must_use]
    pub fn is_typed(&self) -> bool {
        matches!(self, Self::Typed(_))
    }
}

impl Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for RunError {}

/// Appends a token position to a message, one level of context per frame of
/// propagation.
#[must_use]
pub fn annotate(message: &str, token: &Token) -> String {
    format!(
        "{message}\n\tFrom file {} on line {} at {}",
        token.source_name, token.line_number, token.line_location
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::token::{Lexeme, Token};

    fn token() -> Token {
        Token::new(Lexeme::Identifier, "x", "test.tab", 3, 7)
    }

    #[test]
    fn annotation_appends_position() {
        let err = RunError::typed_at("Error adding non-Numerics.", &token());
        assert_eq!(
            err.message(),
            "Error adding non-Numerics.\n\tFrom file test.tab on line 3 at 7"
        );
    }

    #[test]
    fn annotation_preserves_kind() {
        let fatal = RunError::fatal("Function failed to return a value");
        assert!(!fatal.annotated(&token()).is_typed());
        let typed = RunError::typed("Error indexing non-Collection.");
        assert!(typed.annotated(&token()).is_typed());
    }
}
