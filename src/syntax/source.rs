//! TOML sources for grammars and themes
//!
//! These are the persisted, uncompiled forms. A grammar looks like:
//!
//! ```toml
//! name = "c"
//! aliases = ["h"]
//! scope = "source.c"
//!
//! [[patterns]]
//! begin = '/\*'
//! end = '\*/'
//! scope = "comment.block.c"
//!
//! [[patterns]]
//! include = "#keywords"
//!
//! [repository.keywords]
//! match = '\b(if|else|while)\b'
//! scope = "keyword.control.c"
//! ```
//!
//! and a theme:
//!
//! ```toml
//! name = "default"
//!
//! [[rules]]
//! scope = "comment"
//! foreground = "#6a9955"
//! italic = true
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{HighlightError, Result};

/// Uncompiled grammar
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrammarSource {
    pub name: String,
    pub scope: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// File extensions, without the dot
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<RuleSource>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub repository: BTreeMap<String, RuleSource>,
}

/// Uncompiled rule
///
/// Which fields are set decides the kind: `include`, `match`, or
/// `begin` + `end`. An entry with only `patterns` is a group whose rules
/// are spliced into the surrounding list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSource {
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub match_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub apply_end_last: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub captures: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub begin_captures: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub end_captures: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<RuleSource>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl GrammarSource {
    /// Parse a grammar from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Serialize back to TOML text
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| HighlightError::InvalidInput(e.to_string()))
    }
}

/// Uncompiled theme
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThemeSource {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<StyleSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<ThemeRuleSource>,
}

/// Style attributes as written in a theme file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StyleSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreground: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underline: Option<bool>,
}

/// One theme rule: a selector plus the style it applies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThemeRuleSource {
    /// Space-separated segments; commas separate alternative selectors
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreground: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underline: Option<bool>,
}

impl ThemeRuleSource {
    pub fn style(&self) -> StyleSource {
        StyleSource {
            foreground: self.foreground.clone(),
            background: self.background.clone(),
            bold: self.bold,
            italic: self.italic,
            underline: self.underline,
        }
    }
}

impl ThemeSource {
    /// Parse a theme from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Serialize back to TOML text
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| HighlightError::InvalidInput(e.to_string()))
    }
}
