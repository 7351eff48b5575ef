//! synhl - grammar-driven syntax highlighting
//!
//! Grammars are sets of regex rules with nested begin/end regions, written
//! in TOML. Text is tokenized line by line into scope paths, and a theme
//! maps each path to a style.
//!
//! ```no_run
//! let engine = synhl::Engine::new();
//! let result = engine.highlight("rust", "fn main() {}").unwrap();
//! for (start, end, token) in result.spans() {
//!     println!("{}..{} {:?}", start, end, token.style);
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod syntax;
pub mod terminal;

pub use config::{ColorMode, EngineConfig};
pub use engine::{Engine, Highlighted, HighlightedLine, StyledToken};
pub use error::{HighlightError, ResourceLimit, Result};
pub use syntax::{Color, DocumentHighlighter, LineStateCache, Limits, Scope, ScopeStack, Style};
