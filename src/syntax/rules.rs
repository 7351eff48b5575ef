//! Compiled grammar rules
//!
//! A grammar's rules live in an arena and refer to each other by `RuleId`.
//! Rules in other grammars are reached through `Include`, which is resolved
//! by name at tokenize time, so cyclic grammars never need to be expanded.

use std::str::FromStr;
use std::sync::Arc;

use regex::Regex;

use super::scope::Scope;

/// Index of a grammar inside its registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GrammarId(pub(crate) usize);

/// Index of a rule inside its grammar's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub(crate) usize);

/// A rule anywhere in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleRef {
    pub grammar: GrammarId,
    pub rule: RuleId,
}

/// A match found in a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSpan {
    pub start: usize,
    pub end: usize,
    /// Byte ranges of every capture group; index 0 is the whole match
    pub groups: Vec<Option<(usize, usize)>>,
}

impl MatchSpan {
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn group(&self, index: usize) -> Option<(usize, usize)> {
        self.groups.get(index).copied().flatten()
    }
}

/// Search `pattern` in `line` starting at byte `pos`
///
/// The whole line is the haystack, so `^`, `$` and `\b` see the real
/// line boundaries even when `pos` is in the middle.
pub fn search(pattern: &Regex, line: &str, pos: usize) -> Option<MatchSpan> {
    if pos > line.len() {
        return None;
    }
    let caps = pattern.captures_at(line, pos)?;
    let whole = caps.get(0)?;
    Some(MatchSpan {
        start: whole.start(),
        end: whole.end(),
        groups: caps.iter().map(|m| m.map(|m| (m.start(), m.end()))).collect(),
    })
}

/// Scopes assigned to capture groups, sorted by group index
#[derive(Debug, Clone, Default)]
pub struct CaptureScopes(Vec<(usize, Scope)>);

impl CaptureScopes {
    pub fn new(mut captures: Vec<(usize, Scope)>) -> Self {
        captures.sort_by_key(|(group, _)| *group);
        Self(captures)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(usize, Scope)> {
        self.0.iter()
    }
}

/// End pattern of a begin/end region
#[derive(Debug, Clone)]
pub enum EndPattern {
    /// Plain pattern, compiled once
    Fixed(Arc<Regex>),
    /// Pattern with `\1`..`\9` back-references into the begin match.
    /// `fallback` is the template compiled with empty groups.
    Backrefs { template: String, fallback: Arc<Regex> },
}

impl EndPattern {
    /// Build from source; back-references are detected and validated
    pub fn compile(source: &str) -> Result<Self, regex::Error> {
        if has_backrefs(source) {
            let fallback = Regex::new(&substitute_backrefs(source, |_| String::new()))?;
            Ok(EndPattern::Backrefs {
                template: source.to_string(),
                fallback: Arc::new(fallback),
            })
        } else {
            Ok(EndPattern::Fixed(Arc::new(Regex::new(source)?)))
        }
    }

    /// The concrete end regex for a region opened by `begin` on `line`
    pub fn resolve(&self, line: &str, begin: &MatchSpan) -> Arc<Regex> {
        match self {
            EndPattern::Fixed(regex) => Arc::clone(regex),
            EndPattern::Backrefs { template, fallback } => {
                let resolved = substitute_backrefs(template, |group| {
                    begin
                        .group(group)
                        .map(|(s, e)| regex::escape(&line[s..e]))
                        .unwrap_or_default()
                });
                Regex::new(&resolved)
                    .map(Arc::new)
                    .unwrap_or_else(|_| Arc::clone(fallback))
            }
        }
    }
}

fn has_backrefs(pattern: &str) -> bool {
    let mut found = false;
    substitute_backrefs(pattern, |_| {
        found = true;
        String::new()
    });
    found
}

/// Replace each `\N` (N in 1..=9) using `group`, leaving other escapes alone
fn substitute_backrefs(pattern: &str, mut group: impl FnMut(usize) -> String) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(d @ '1'..='9') => out.push_str(&group(d as usize - '0' as usize)),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Target of an `include` rule
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IncludeRef {
    /// `$self`: the root rules of the grammar containing the include
    SelfGrammar,
    /// `$base`: the root rules of the grammar being highlighted
    Base,
    /// `#key`: a repository entry of the grammar containing the include
    Local(String),
    /// `name`: the root rules of another grammar (name, alias or scope)
    Grammar(String),
    /// `name#key`: a repository entry of another grammar
    GrammarKey(String, String),
}

impl FromStr for IncludeRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "" => Err("empty include".to_string()),
            "$self" | "self" => Ok(IncludeRef::SelfGrammar),
            "$base" | "base" => Ok(IncludeRef::Base),
            _ => match s.split_once('#') {
                Some(("", key)) if !key.is_empty() => Ok(IncludeRef::Local(key.to_string())),
                Some((name, key)) if !name.is_empty() && !key.is_empty() => {
                    Ok(IncludeRef::GrammarKey(name.to_string(), key.to_string()))
                }
                Some(_) => Err(format!("malformed include: {}", s)),
                None => Ok(IncludeRef::Grammar(s.to_string())),
            },
        }
    }
}

impl std::fmt::Display for IncludeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncludeRef::SelfGrammar => f.write_str("$self"),
            IncludeRef::Base => f.write_str("$base"),
            IncludeRef::Local(key) => write!(f, "#{}", key),
            IncludeRef::Grammar(name) => f.write_str(name),
            IncludeRef::GrammarKey(name, key) => write!(f, "{}#{}", name, key),
        }
    }
}

/// A begin/end region rule
#[derive(Debug, Clone)]
pub struct BeginEnd {
    pub begin: Regex,
    pub end: EndPattern,
    pub scope: Option<Scope>,
    pub content_scope: Option<Scope>,
    pub begin_captures: CaptureScopes,
    pub end_captures: CaptureScopes,
    /// Rules that apply inside the region, and only there
    pub patterns: Vec<RuleId>,
    /// Let content rules win ties against the end pattern
    pub apply_end_last: bool,
}

/// A compiled rule
#[derive(Debug, Clone)]
pub enum Rule {
    /// Single-line pattern
    Match {
        pattern: Regex,
        scope: Option<Scope>,
        captures: CaptureScopes,
    },
    /// Region that may span lines
    BeginEnd(BeginEnd),
    /// Splice in the rules another reference points to
    Include(IncludeRef),
}
