//! Built-in grammars and theme
//!
//! The sources are TOML files compiled into the binary, in the same format
//! users load from a grammar directory.

use crate::error::{HighlightError, Result};
use crate::syntax::source::{GrammarSource, ThemeSource};
use crate::syntax::style::Style;
use crate::syntax::theme::ThemeMapper;

/// Bundled grammar sources, in registration order
///
/// Grammars that embed others (cpp, html, markdown) only need their
/// targets registered by the time they are used, not before them.
const GRAMMARS: &[(&str, &str)] = &[
    ("rust", include_str!("rust.toml")),
    ("c", include_str!("c.toml")),
    ("cpp", include_str!("cpp.toml")),
    ("python", include_str!("python.toml")),
    ("javascript", include_str!("javascript.toml")),
    ("json", include_str!("json.toml")),
    ("toml", include_str!("toml.toml")),
    ("html", include_str!("html.toml")),
    ("markdown", include_str!("markdown.toml")),
];

const THEME: &str = include_str!("theme.toml");

/// Parse every bundled grammar
pub fn grammar_sources() -> Vec<Result<GrammarSource>> {
    GRAMMARS
        .iter()
        .map(|(name, text)| {
            GrammarSource::from_toml(text).map_err(|e| HighlightError::GrammarCompileError {
                language: name.to_string(),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Source of the bundled theme
pub fn theme_source() -> Result<ThemeSource> {
    ThemeSource::from_toml(THEME)
}

/// The bundled theme, or an empty one if it fails to build
pub fn default_theme() -> ThemeMapper {
    match theme_source().and_then(|source| ThemeMapper::build(&source)) {
        Ok(theme) => theme,
        Err(e) => {
            tracing::warn!("Bundled theme unusable, highlighting without styles: {}", e);
            ThemeMapper::from_rules("plain", Style::default(), Vec::new())
        }
    }
}
