//! Per-document highlighting cache
//!
//! `LineStateCache` remembers the scope stack leaving each line so an edit
//! only re-tokenizes from the edited line down. `DocumentHighlighter` drives
//! it for one document.

use crate::engine::{Engine, StyledToken};
use crate::error::{HighlightError, Result};

use super::rules::GrammarId;
use super::scope::ScopeStack;

/// State leaving each line of one document
///
/// Belongs to a single document and is not shared between threads.
#[derive(Debug, Clone, Default)]
pub struct LineStateCache {
    states: Vec<Option<ScopeStack>>,
}

impl LineStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// State at the end of `line`, if known
    pub fn get(&self, line: usize) -> Option<&ScopeStack> {
        self.states.get(line).and_then(Option::as_ref)
    }

    /// Record the state at the end of `line`
    pub fn put(&mut self, line: usize, state: ScopeStack) {
        if self.states.len() <= line {
            self.states.resize(line + 1, None);
        }
        self.states[line] = Some(state);
    }

    /// Forget `line` and everything after it
    pub fn invalidate_from(&mut self, line: usize) {
        self.states.truncate(line);
    }

    /// Number of leading lines whose state is known
    pub fn valid_prefix(&self) -> usize {
        self.states.iter().take_while(|s| s.is_some()).count()
    }
}

/// Incremental highlighting of one document
///
/// Call `edit` with the first changed line after every change, then
/// `highlight` with the current lines. Only lines from the first edit on
/// are tokenized again.
#[derive(Debug)]
pub struct DocumentHighlighter<'e> {
    engine: &'e Engine,
    grammar: GrammarId,
    cache: LineStateCache,
    /// Styled tokens for the valid prefix of the document
    lines: Vec<Vec<StyledToken>>,
    /// Recoverable problems, with their line index
    issues: Vec<(usize, HighlightError)>,
}

impl<'e> DocumentHighlighter<'e> {
    pub fn new(engine: &'e Engine, language: &str) -> Result<Self> {
        Ok(Self {
            engine,
            grammar: engine.resolve(language)?,
            cache: LineStateCache::new(),
            lines: Vec::new(),
            issues: Vec::new(),
        })
    }

    /// Mark `line` and everything below it as changed
    pub fn edit(&mut self, line: usize) {
        self.cache.invalidate_from(line);
        self.lines.truncate(line);
        self.issues.retain(|(i, _)| *i < line);
    }

    /// Bring the document up to date; returns how many lines were tokenized
    pub fn highlight(&mut self, lines: &[&str]) -> usize {
        if lines.len() < self.lines.len() {
            self.edit(lines.len());
        }

        let first = self.lines.len().min(self.cache.valid_prefix());
        if first < self.lines.len() {
            self.edit(first);
        }

        let mut tokenizer = self.engine.tokenizer();
        let mut state = match first {
            0 => tokenizer.initial_state(self.grammar),
            n => match self.cache.get(n - 1) {
                Some(state) => state.clone(),
                None => tokenizer.initial_state(self.grammar),
            },
        };

        for (index, line) in lines.iter().enumerate().skip(first) {
            let result = tokenizer.tokenize_line(line, &state);
            self.lines.push(self.engine.style_tokens(&result.tokens));
            self.issues.extend(result.issues.into_iter().map(|e| (index, e)));
            self.cache.put(index, result.state.clone());
            state = result.state;
        }

        lines.len() - first
    }

    /// Styled tokens of every highlighted line
    pub fn lines(&self) -> &[Vec<StyledToken>] {
        &self.lines
    }

    pub fn line(&self, index: usize) -> Option<&[StyledToken]> {
        self.lines.get(index).map(Vec::as_slice)
    }

    pub fn issues(&self) -> &[(usize, HighlightError)] {
        &self.issues
    }

    pub fn cache(&self) -> &LineStateCache {
        &self.cache
    }
}
