//! Compiled grammars
//!
//! A `Grammar` is the immutable, compiled form of a `GrammarSource`: its
//! rules live in an arena, the root rule list and repository entries hold
//! ids into it, and includes stay unresolved until tokenize time.

use std::collections::HashMap;

use regex::Regex;

use super::rules::{BeginEnd, CaptureScopes, EndPattern, IncludeRef, Rule, RuleId};
use super::scope::Scope;
use super::source::{GrammarSource, RuleSource};
use crate::error::{HighlightError, Result};

/// A complete, compiled language grammar
#[derive(Debug)]
pub struct Grammar {
    /// Canonical language name (e.g., "rust")
    pub name: String,
    /// Other names the language is looked up by
    pub aliases: Vec<String>,
    /// File extensions (lowercase, no dot)
    pub extensions: Vec<String>,
    /// Root scope given to text no rule classifies
    pub scope: Scope,
    patterns: Vec<RuleId>,
    repository: HashMap<String, Vec<RuleId>>,
    rules: Vec<Rule>,
}

impl Grammar {
    /// Compile a grammar source
    ///
    /// Fails with `GrammarCompileError` on the first invalid pattern or
    /// malformed rule.
    pub fn compile(source: &GrammarSource) -> Result<Self> {
        if source.name.trim().is_empty() {
            return Err(HighlightError::GrammarCompileError {
                language: source.name.clone(),
                reason: "grammar has no name".to_string(),
            });
        }
        if source.scope.trim().is_empty() {
            return Err(HighlightError::GrammarCompileError {
                language: source.name.clone(),
                reason: "grammar has no root scope".to_string(),
            });
        }

        let mut compiler = Compiler {
            language: &source.name,
            rules: Vec::new(),
        };
        let patterns = compiler.compile_list(&source.patterns, "patterns")?;
        let mut repository = HashMap::new();
        for (key, rule) in &source.repository {
            let ids = compiler.compile_rule(rule, &format!("repository.{}", key))?;
            repository.insert(key.clone(), ids);
        }

        Ok(Self {
            name: source.name.trim().to_string(),
            aliases: source.aliases.iter().map(|a| a.trim().to_string()).collect(),
            extensions: source
                .extensions
                .iter()
                .map(|e| e.trim().trim_start_matches('.').to_lowercase())
                .collect(),
            scope: Scope::new(&source.scope),
            patterns,
            repository,
            rules: compiler.rules,
        })
    }

    /// Root rules, in declaration order
    pub fn patterns(&self) -> &[RuleId] {
        &self.patterns
    }

    /// Rules stored under a repository key
    pub fn repository(&self, key: &str) -> Option<&[RuleId]> {
        self.repository.get(key).map(Vec::as_slice)
    }

    /// Repository entry together with its stored key
    pub fn repository_entry(&self, key: &str) -> Option<(&str, &[RuleId])> {
        self.repository
            .get_key_value(key)
            .map(|(k, rules)| (k.as_str(), rules.as_slice()))
    }

    /// Look up a rule by id
    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.0]
    }

    /// Canonical name followed by aliases
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    /// Every include reference in the grammar
    pub fn includes(&self) -> impl Iterator<Item = &IncludeRef> {
        self.rules.iter().filter_map(|rule| match rule {
            Rule::Include(reference) => Some(reference),
            _ => None,
        })
    }
}

/// Builds the rule arena for one grammar
struct Compiler<'a> {
    language: &'a str,
    rules: Vec<Rule>,
}

impl Compiler<'_> {
    fn error(&self, path: &str, reason: impl std::fmt::Display) -> HighlightError {
        HighlightError::GrammarCompileError {
            language: self.language.to_string(),
            reason: format!("{}: {}", path, reason),
        }
    }

    fn compile_list(&mut self, sources: &[RuleSource], path: &str) -> Result<Vec<RuleId>> {
        let mut ids = Vec::with_capacity(sources.len());
        for (i, source) in sources.iter().enumerate() {
            ids.extend(self.compile_rule(source, &format!("{}[{}]", path, i))?);
        }
        Ok(ids)
    }

    /// Compile one source entry; a bare `patterns` group yields several ids
    fn compile_rule(&mut self, source: &RuleSource, path: &str) -> Result<Vec<RuleId>> {
        let rule = if let Some(include) = &source.include {
            let reference = include
                .parse::<IncludeRef>()
                .map_err(|reason| self.error(path, reason))?;
            Rule::Include(reference)
        } else if let Some(pattern) = &source.match_ {
            Rule::Match {
                pattern: self.regex(pattern, path)?,
                scope: scope(&source.scope),
                captures: self.captures(&source.captures, path)?,
            }
        } else if let Some(begin) = &source.begin {
            let Some(end) = &source.end else {
                return Err(self.error(path, "begin without end"));
            };
            let end = EndPattern::compile(end).map_err(|e| self.error(path, e))?;
            let patterns = self.compile_list(&source.patterns, &format!("{}.patterns", path))?;
            // `captures` is shorthand for both delimiters
            let begin_captures = if source.begin_captures.is_empty() {
                &source.captures
            } else {
                &source.begin_captures
            };
            let end_captures = if source.end_captures.is_empty() {
                &source.captures
            } else {
                &source.end_captures
            };
            Rule::BeginEnd(BeginEnd {
                begin: self.regex(begin, path)?,
                end,
                scope: scope(&source.scope),
                content_scope: scope(&source.content_scope),
                begin_captures: self.captures(begin_captures, path)?,
                end_captures: self.captures(end_captures, path)?,
                patterns,
                apply_end_last: source.apply_end_last,
            })
        } else if source.end.is_some() {
            return Err(self.error(path, "end without begin"));
        } else if !source.patterns.is_empty() {
            return self.compile_list(&source.patterns, &format!("{}.patterns", path));
        } else {
            return Err(self.error(path, "rule has no match, begin/end, include or patterns"));
        };

        let id = RuleId(self.rules.len());
        self.rules.push(rule);
        Ok(vec![id])
    }

    fn regex(&self, pattern: &str, path: &str) -> Result<Regex> {
        Regex::new(pattern).map_err(|e| self.error(path, e))
    }

    fn captures(
        &self,
        captures: &std::collections::BTreeMap<String, String>,
        path: &str,
    ) -> Result<CaptureScopes> {
        let mut out = Vec::with_capacity(captures.len());
        for (group, name) in captures {
            let index = group
                .trim()
                .parse::<usize>()
                .map_err(|_| self.error(path, format!("capture key {:?} is not a group number", group)))?;
            if !name.trim().is_empty() {
                out.push((index, Scope::new(name)));
            }
        }
        Ok(CaptureScopes::new(out))
    }
}

fn scope(name: &Option<String>) -> Option<Scope> {
    name.as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(Scope::new)
}
