//! Error types for synhl

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, HighlightError>;

/// Which resource budget a line ran out of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceLimit {
    /// Too many nested regions were open at once
    StackDepth(usize),
    /// Too many matching steps were taken on a single line
    StepBudget(usize),
}

impl std::fmt::Display for ResourceLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceLimit::StackDepth(limit) => write!(f, "scope stack depth exceeded {}", limit),
            ResourceLimit::StepBudget(limit) => write!(f, "line exceeded {} matching steps", limit),
        }
    }
}

/// Engine error types
#[derive(Error, Debug)]
pub enum HighlightError {
    #[error("Unknown language: {0}")]
    UnknownLanguage(String),

    #[error("Language name already registered: {0}")]
    DuplicateName(String),

    #[error("Failed to compile grammar {language}: {reason}")]
    GrammarCompileError { language: String, reason: String },

    #[error("Unresolved include {reference} in grammar {grammar}")]
    UnresolvedInclude { grammar: String, reference: String },

    #[error("Resource limit: {0}")]
    ResourceLimit(ResourceLimit),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid theme: {0}")]
    InvalidTheme(String),

    #[error("Highlighting cancelled at line {line}")]
    Cancelled { line: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

impl HighlightError {
    /// Whether the caller should fall back to plain text rather than fail
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, HighlightError::InvalidInput(_) | HighlightError::Io(_))
    }
}
