//! Scopes and the scope stack carried between lines
//!
//! A `Scope` is a dotted classification label such as `comment.block.rust`.
//! The `ScopeStack` records which begin/end regions are open at the end of a
//! line; it is the only state the tokenizer threads from one line to the next.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use super::rules::{GrammarId, RuleRef};

/// A dotted scope name, cheap to clone
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Scope(Arc<str>);

impl Scope {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name.trim()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate the dot-separated components (`string`, `quoted`, `double`)
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Scope {
    fn from(name: &str) -> Self {
        Scope::new(name)
    }
}

/// One open begin/end region
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    /// The BeginEnd rule that opened this region
    pub rule: RuleRef,
    /// Scope applied to the delimiters and the content
    pub scope: Option<Scope>,
    /// Scope applied to the content only
    pub content_scope: Option<Scope>,
    /// End pattern, with back-references already resolved
    pub end: Arc<Regex>,
    /// Set when the region was entered by a zero-width match at this
    /// position of the current line
    pub entered_at: Option<usize>,
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.rule == other.rule
            && self.scope == other.scope
            && self.content_scope == other.content_scope
            && self.end.as_str() == other.end.as_str()
    }
}

impl Eq for Frame {}

/// The nesting of open regions at a line boundary
///
/// Cloned (never shared) between highlighting calls. Pushes happen on
/// region begin and pops on region end; the root grammar scope is never
/// popped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeStack {
    grammar: GrammarId,
    root: Scope,
    frames: Vec<Frame>,
}

impl ScopeStack {
    /// Create the empty stack for the start of a document
    pub fn new(grammar: GrammarId, root: Scope) -> Self {
        Self {
            grammar,
            root,
            frames: Vec::new(),
        }
    }

    /// Grammar the document is highlighted with
    pub fn grammar(&self) -> GrammarId {
        self.grammar
    }

    pub fn root(&self) -> &Scope {
        &self.root
    }

    /// Number of open regions
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// True when no region is open
    pub fn is_root(&self) -> bool {
        self.frames.is_empty()
    }

    /// Full scope path, outermost first, as seen by content at the top
    pub fn scopes(&self) -> Vec<Scope> {
        self.content_scopes()
    }

    pub(crate) fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub(crate) fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Close the innermost region; the root is never popped
    pub(crate) fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// Drop regions beyond `depth`
    pub(crate) fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth);
    }

    /// Forget per-line positions before a new line starts
    pub(crate) fn reset_line_positions(&mut self) {
        for frame in &mut self.frames {
            frame.entered_at = None;
        }
    }

    /// Scopes for text inside the innermost region
    pub(crate) fn content_scopes(&self) -> Vec<Scope> {
        let mut scopes = Vec::with_capacity(1 + self.frames.len() * 2);
        scopes.push(self.root.clone());
        for frame in &self.frames {
            scopes.extend(frame.scope.iter().cloned());
            scopes.extend(frame.content_scope.iter().cloned());
        }
        scopes
    }

    /// Scopes for the delimiters of the innermost region
    pub(crate) fn name_scopes(&self) -> Vec<Scope> {
        let Some((last, outer)) = self.frames.split_last() else {
            return vec![self.root.clone()];
        };
        let mut scopes = vec![self.root.clone()];
        for frame in outer {
            scopes.extend(frame.scope.iter().cloned());
            scopes.extend(frame.content_scope.iter().cloned());
        }
        scopes.extend(last.scope.iter().cloned());
        scopes
    }
}
