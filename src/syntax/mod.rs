//! Grammar-driven syntax highlighting
//!
//! This module provides:
//! - TOML grammar and theme sources
//! - Compiled grammars and the registry that links them
//! - The line tokenizer and its carried scope stack
//! - Theme mapping from scope paths to styles
//! - Per-document line state caching

mod style;
mod scope;
mod rules;
mod source;
mod grammar;
mod registry;
mod tokenizer;
mod theme;
mod cache;
pub mod builtin;

pub use style::{Color, Style};
pub use scope::{Scope, ScopeStack};
pub use rules::{GrammarId, IncludeRef, Rule, RuleId, RuleRef};
pub use source::{GrammarSource, RuleSource, StyleSource, ThemeRuleSource, ThemeSource};
pub use grammar::Grammar;
pub use registry::{GrammarRegistry, IncludeTarget};
pub use tokenizer::{Limits, LineTokens, Token, Tokenizer};
pub use theme::{Selector, Specificity, ThemeMapper, ThemeRule};
pub use cache::{DocumentHighlighter, LineStateCache};
