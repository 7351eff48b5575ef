//! Theme rules and scope-to-style resolution
//!
//! A selector is an ordered list of scope patterns, e.g. `source.rust string`.
//! It matches a token when its last segment matches some scope of the token's
//! path (the innermost such scope is used) and the earlier segments match
//! outer scopes in the same relative order, gaps allowed.
//!
//! When several rules match, each style attribute comes from the most
//! specific rule that sets it. Specificity compares, in order:
//! 1. the number of selector segments,
//! 2. how exactly the last segment matched (more dotted components first,
//!    an exact match beating a prefix match),
//! 3. how deep in the path the last segment matched,
//! 4. declaration order, later rules winning.

use std::collections::{BTreeSet, HashMap};

use super::scope::Scope;
use super::source::{StyleSource, ThemeSource};
use super::style::{Color, Style};
use crate::error::{HighlightError, Result};

/// How well one selector segment matched one scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Exactness {
    /// Dotted components the segment spelled out (`*` spells none)
    components: usize,
    exact: bool,
}

/// Ranking of a matching rule; greater is more specific
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Specificity {
    segments: usize,
    exactness: Exactness,
    depth: usize,
    order: usize,
}

/// Ordered scope patterns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    segments: Vec<String>,
}

impl Selector {
    /// Parse one selector (no commas)
    pub fn parse(text: &str) -> Option<Self> {
        let segments: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        if segments.is_empty() {
            None
        } else {
            Some(Self { segments })
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Key used to bucket rules: first component of the last segment
    fn key(&self) -> Option<&str> {
        match self.segments.last().map(String::as_str) {
            Some("*") | None => None,
            Some(last) => last.split('.').next(),
        }
    }

    /// Rank this selector against a scope path (outermost first)
    fn matches(&self, path: &[Scope], order: usize) -> Option<Specificity> {
        let (last, outer) = self.segments.split_last()?;

        let (depth, exactness) = path
            .iter()
            .enumerate()
            .rev()
            .find_map(|(i, scope)| segment_match(last, scope.as_str()).map(|e| (i, e)))?;

        let mut remaining = &path[..depth];
        for segment in outer.iter().rev() {
            let i = remaining
                .iter()
                .rposition(|scope| segment_match(segment, scope.as_str()).is_some())?;
            remaining = &remaining[..i];
        }

        Some(Specificity {
            segments: self.segments.len(),
            exactness,
            depth,
            order,
        })
    }
}

/// `string` matches `string` and `string.quoted`, but not `strings`
fn segment_match(segment: &str, scope: &str) -> Option<Exactness> {
    if segment == "*" {
        return Some(Exactness {
            components: 0,
            exact: false,
        });
    }
    let components = segment.split('.').count();
    if scope == segment {
        Some(Exactness {
            components,
            exact: true,
        })
    } else if scope.starts_with(segment) && scope.as_bytes().get(segment.len()) == Some(&b'.') {
        Some(Exactness {
            components,
            exact: false,
        })
    } else {
        None
    }
}

/// A compiled theme rule
#[derive(Debug, Clone)]
pub struct ThemeRule {
    pub selector: Selector,
    pub style: Style,
    /// Declaration index; alternatives of one source rule share it
    pub order: usize,
}

impl ThemeRule {
    /// Specificity of this rule for a scope path, if it matches
    pub fn specificity(&self, path: &[Scope]) -> Option<Specificity> {
        self.selector.matches(path, self.order)
    }
}

/// Compiled theme: maps scope paths to styles
///
/// Immutable once built; lookups take `&self` and keep no cache, so a
/// mapper can be shared freely between threads.
#[derive(Debug, Clone)]
pub struct ThemeMapper {
    name: String,
    default: Style,
    rules: Vec<ThemeRule>,
    /// First component of a rule's last segment -> rule indices
    by_key: HashMap<String, Vec<usize>>,
    /// Rules whose last segment is `*`
    wildcard: Vec<usize>,
}

impl ThemeMapper {
    /// Compile a theme source
    pub fn build(source: &ThemeSource) -> Result<Self> {
        let default = match &source.default {
            Some(style) => compile_style(style)?,
            None => Style::default(),
        };

        let mut rules = Vec::new();
        for (order, rule) in source.rules.iter().enumerate() {
            let style = compile_style(&rule.style())?;
            let mut any = false;
            for alternative in rule.scope.split(',') {
                if let Some(selector) = Selector::parse(alternative) {
                    rules.push(ThemeRule {
                        selector,
                        style,
                        order,
                    });
                    any = true;
                }
            }
            if !any {
                return Err(HighlightError::InvalidTheme(format!(
                    "rule {} has an empty scope selector",
                    order
                )));
            }
        }

        Ok(Self::from_rules(&source.name, default, rules))
    }

    /// Assemble a mapper from already compiled rules
    pub fn from_rules(name: &str, default: Style, rules: Vec<ThemeRule>) -> Self {
        let mut by_key: HashMap<String, Vec<usize>> = HashMap::new();
        let mut wildcard = Vec::new();
        for (i, rule) in rules.iter().enumerate() {
            match rule.selector.key() {
                Some(key) => by_key.entry(key.to_string()).or_default().push(i),
                None => wildcard.push(i),
            }
        }

        tracing::debug!("Compiled theme {} ({} selectors)", name, rules.len());

        Self {
            name: name.to_string(),
            default,
            rules,
            by_key,
            wildcard,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Style used when no rule sets an attribute
    pub fn default_style(&self) -> Style {
        self.default
    }

    /// Resolve the style for a scope path (outermost first)
    pub fn style_for(&self, path: &[Scope]) -> Style {
        let mut candidates: BTreeSet<usize> = self.wildcard.iter().copied().collect();
        for scope in path {
            if let Some(first) = scope.components().next() {
                if let Some(indices) = self.by_key.get(first) {
                    candidates.extend(indices);
                }
            }
        }

        let mut ranked: Vec<(Specificity, &ThemeRule)> = candidates
            .into_iter()
            .filter_map(|i| {
                let rule = &self.rules[i];
                rule.specificity(path).map(|s| (s, rule))
            })
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0));

        let mut style = Style::default();
        for (_, rule) in ranked {
            style = style.or(rule.style);
            if style.is_complete() {
                break;
            }
        }
        style.or(self.default)
    }
}

fn compile_style(source: &StyleSource) -> Result<Style> {
    let color = |value: &Option<String>| -> Result<Option<Color>> {
        value
            .as_deref()
            .map(|v| v.parse::<Color>().map_err(HighlightError::InvalidTheme))
            .transpose()
    };
    Ok(Style {
        foreground: color(&source.foreground)?,
        background: color(&source.background)?,
        bold: source.bold,
        italic: source.italic,
        underline: source.underline,
    })
}
