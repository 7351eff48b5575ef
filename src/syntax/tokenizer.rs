//! Line tokenizer
//!
//! Tokenizing is a fold over the lines of a document:
//! `(entering ScopeStack, line text) -> (tokens, exiting ScopeStack)`.
//! A line's output depends only on its text and the previous line's exiting
//! stack, which is what makes per-line caching sound.
//!
//! At each position every rule visible in the innermost region (plus that
//! region's end pattern) is searched from the current position. The match
//! with the smallest start wins; ties go to the rule declared first, with
//! the end pattern counting as declared before the content rules unless the
//! region asks for `apply_end_last`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use regex::Regex;

use super::registry::GrammarRegistry;
use super::rules::{search, BeginEnd, CaptureScopes, GrammarId, MatchSpan, Rule, RuleRef};
use super::scope::{Frame, Scope, ScopeStack};
use crate::error::{HighlightError, ResourceLimit};

/// Budgets that bound the work done on adversarial input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of simultaneously open regions
    pub max_stack_depth: usize,
    /// Maximum number of matching steps on one line
    pub max_steps_per_line: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_stack_depth: 128,
            max_steps_per_line: 100_000,
        }
    }
}

/// A classified run of one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Byte offset where this token starts (inclusive)
    pub start: usize,
    /// Byte offset where this token ends (exclusive)
    pub end: usize,
    /// Scope path, outermost first
    pub scopes: Vec<Scope>,
}

impl Token {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The innermost scope
    pub fn scope(&self) -> Option<&Scope> {
        self.scopes.last()
    }
}

/// Result of tokenizing a single line
#[derive(Debug)]
pub struct LineTokens {
    /// Contiguous tokens covering the whole line
    pub tokens: Vec<Token>,
    /// State at end of line (for next line)
    pub state: ScopeStack,
    /// Recoverable problems met on this line
    pub issues: Vec<HighlightError>,
}

/// Produces contiguous tokens: each token starts where the last one ended
#[derive(Debug, Default)]
struct TokenAccumulator {
    tokens: Vec<Token>,
    last_end: usize,
}

impl TokenAccumulator {
    /// Emit `[last_end, end)` under `scopes`; empty runs are skipped
    fn produce(&mut self, end: usize, scopes: &[Scope]) {
        if end <= self.last_end {
            return;
        }
        self.tokens.push(Token {
            start: self.last_end,
            end,
            scopes: scopes.to_vec(),
        });
        self.last_end = end;
    }

    /// Emit the tokens of a match, splitting it along its capture groups
    ///
    /// Capture groups nest, so open captures are kept on a stack and closed
    /// as later captures start past their end.
    fn produce_match(&mut self, m: &MatchSpan, captures: &CaptureScopes, scopes: &[Scope]) {
        let mut spans: Vec<(usize, usize, usize, &Scope)> = captures
            .iter()
            .filter_map(|(group, scope)| {
                let (start, end) = m.group(*group)?;
                (start < end).then_some((start, end, *group, scope))
            })
            .collect();
        spans.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)).then(a.2.cmp(&b.2)));

        let mut open: Vec<(usize, Vec<Scope>)> = Vec::new();
        for (start, end, _, scope) in spans {
            while let Some((close, inner)) = open.last() {
                if *close > start {
                    break;
                }
                self.produce(*close, inner);
                open.pop();
            }
            let parent = open.last().map(|(_, s)| s.as_slice()).unwrap_or(scopes);
            self.produce(start, parent);
            let mut inner = parent.to_vec();
            inner.push(scope.clone());
            open.push((end, inner));
        }
        while let Some((close, inner)) = open.pop() {
            self.produce(close, &inner);
        }
        self.produce(m.end, scopes);
    }
}

/// What won the search at the current position
enum Found {
    End(MatchSpan),
    Rule(RuleRef, MatchSpan),
}

impl Found {
    fn span(&self) -> &MatchSpan {
        match self {
            Found::End(m) | Found::Rule(_, m) => m,
        }
    }
}

/// Identifies the list of rules active in a region
type ContextKey = (GrammarId, Option<RuleRef>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum MemoKey {
    Rule(RuleRef),
    /// End pattern of the region open at this depth
    End(usize),
}

/// Search results already known on the current line
///
/// Positions only move forward within a line, so a match starting at or
/// after the current position is still the leftmost one, and a miss stays
/// a miss. Each pattern is searched again only once the position passes
/// its last match.
#[derive(Debug, Default)]
struct SearchMemo {
    results: HashMap<MemoKey, Option<MatchSpan>>,
    searches: usize,
}

impl SearchMemo {
    fn search(&mut self, key: MemoKey, pattern: &Regex, line: &str, pos: usize) -> Option<MatchSpan> {
        if let Some(known) = self.results.get(&key) {
            if known.as_ref().map_or(true, |m| m.start >= pos) {
                return known.clone();
            }
        }
        self.searches += 1;
        let found = search(pattern, line, pos);
        self.results.insert(key, found.clone());
        found
    }

    /// A new region opened at `depth`; its end pattern has not been searched
    fn forget_end(&mut self, depth: usize) {
        self.results.remove(&MemoKey::End(depth));
    }
}

/// Tokenizes lines against a registry
///
/// Holds only a memo of flattened rule lists and the set of problems
/// already reported, so one instance can serve a whole document.
pub struct Tokenizer<'r> {
    registry: &'r GrammarRegistry,
    limits: Limits,
    pattern_sets: HashMap<ContextKey, Arc<Vec<RuleRef>>>,
    pending: Vec<HighlightError>,
    reported: HashSet<String>,
    searches: usize,
}

impl<'r> Tokenizer<'r> {
    pub fn new(registry: &'r GrammarRegistry, limits: Limits) -> Self {
        Self {
            registry,
            limits,
            pattern_sets: HashMap::new(),
            pending: Vec::new(),
            reported: HashSet::new(),
            searches: 0,
        }
    }

    /// The state before the first line of a document
    pub fn initial_state(&self, grammar: GrammarId) -> ScopeStack {
        ScopeStack::new(grammar, self.registry.grammar(grammar).scope.clone())
    }

    /// Regex searches run so far, across all lines
    pub fn searches(&self) -> usize {
        self.searches
    }

    /// Tokenize one line (without its line terminator)
    pub fn tokenize_line(&mut self, line: &str, entering: &ScopeStack) -> LineTokens {
        let mut stack = entering.clone();
        stack.reset_line_positions();
        if stack.depth() > self.limits.max_stack_depth {
            stack.truncate(self.limits.max_stack_depth);
            self.report(ResourceLimit::StackDepth(self.limits.max_stack_depth));
        }

        let mut acc = TokenAccumulator::default();
        let mut memo = SearchMemo::default();
        let mut pos = 0;
        let mut steps = 0;

        loop {
            steps += 1;
            if steps > self.limits.max_steps_per_line {
                self.report(ResourceLimit::StepBudget(self.limits.max_steps_per_line));
                acc.produce(line.len(), std::slice::from_ref(stack.root()));
                break;
            }

            let Some(found) = self.find_next(&mut memo, line, pos, &stack) else {
                break;
            };
            let start = found.span().start;
            acc.produce(start, &stack.content_scopes());

            match found {
                Found::End(m) => {
                    let name_scopes = stack.name_scopes();
                    let Some(frame) = stack.pop() else {
                        break;
                    };
                    if let Some(be) = self.begin_end(frame.rule) {
                        acc.produce_match(&m, &be.end_captures, &name_scopes);
                    }
                    // Entered and left at the same spot without consuming anything
                    if m.is_empty() && frame.entered_at == Some(m.start) {
                        match next_char(line, m.start) {
                            Some(next) => pos = next,
                            None => break,
                        }
                    } else {
                        pos = m.end;
                    }
                }
                Found::Rule(rule_ref, m) => match self.registry.grammar(rule_ref.grammar).rule(rule_ref.rule) {
                    Rule::Match { scope, captures, .. } => {
                        let mut scopes = stack.content_scopes();
                        scopes.extend(scope.iter().cloned());
                        acc.produce_match(&m, captures, &scopes);
                        if m.is_empty() {
                            match next_char(line, m.start) {
                                Some(next) => pos = next,
                                None => break,
                            }
                        } else {
                            pos = m.end;
                        }
                    }
                    Rule::BeginEnd(be) => {
                        let recursing = m.is_empty()
                            && stack
                                .top()
                                .is_some_and(|top| top.rule == rule_ref && top.entered_at == Some(m.start));
                        if recursing {
                            match next_char(line, m.start) {
                                Some(next) => pos = next,
                                None => break,
                            }
                            continue;
                        }
                        if stack.depth() >= self.limits.max_stack_depth {
                            self.report(ResourceLimit::StackDepth(self.limits.max_stack_depth));
                            acc.produce(line.len(), std::slice::from_ref(stack.root()));
                            break;
                        }

                        let mut name_scopes = stack.content_scopes();
                        name_scopes.extend(be.scope.iter().cloned());
                        acc.produce_match(&m, &be.begin_captures, &name_scopes);
                        memo.forget_end(stack.depth() + 1);
                        stack.push(Frame {
                            rule: rule_ref,
                            scope: be.scope.clone(),
                            content_scope: be.content_scope.clone(),
                            end: be.end.resolve(line, &m),
                            entered_at: m.is_empty().then_some(m.start),
                        });
                        pos = m.end;
                    }
                    Rule::Include(_) => {
                        // Pattern sets only ever hold Match and BeginEnd rules
                        pos = m.end.max(next_char(line, m.start).unwrap_or(line.len()));
                    }
                },
            }
        }

        acc.produce(line.len(), &stack.content_scopes());
        self.searches += memo.searches;
        tracing::trace!("{} bytes, {} steps, {} searches", line.len(), steps, memo.searches);

        LineTokens {
            tokens: acc.tokens,
            state: stack,
            issues: std::mem::take(&mut self.pending),
        }
    }

    /// Tokenize every line of `text`, starting from an empty stack
    pub fn tokenize_document(&mut self, grammar: GrammarId, text: &str) -> Vec<LineTokens> {
        let mut state = self.initial_state(grammar);
        let mut lines = Vec::new();
        for line in text.split('\n') {
            let result = self.tokenize_line(line, &state);
            state = result.state.clone();
            lines.push(result);
        }
        lines
    }

    fn begin_end(&self, rule: RuleRef) -> Option<&'r BeginEnd> {
        match self.registry.grammar(rule.grammar).rule(rule.rule) {
            Rule::BeginEnd(be) => Some(be),
            _ => None,
        }
    }

    /// Search every candidate of the current context from `pos`
    fn find_next(&mut self, memo: &mut SearchMemo, line: &str, pos: usize, stack: &ScopeStack) -> Option<Found> {
        let candidates = self.pattern_set(stack);
        let depth = stack.depth();
        let end = stack.top().map(|frame| {
            let last = self.begin_end(frame.rule).is_some_and(|be| be.apply_end_last);
            (Arc::clone(&frame.end), last)
        });

        let mut best: Option<Found> = None;
        let consider = |best: &mut Option<Found>, found: Found| {
            if best.as_ref().map_or(true, |b| found.span().start < b.span().start) {
                *best = Some(found);
            }
        };

        if let Some((end, false)) = &end {
            if let Some(m) = memo.search(MemoKey::End(depth), end, line, pos) {
                consider(&mut best, Found::End(m));
            }
        }
        for rule_ref in candidates.iter() {
            if best.as_ref().is_some_and(|b| b.span().start == pos) {
                break;
            }
            let pattern = match self.registry.grammar(rule_ref.grammar).rule(rule_ref.rule) {
                Rule::Match { pattern, .. } => pattern,
                Rule::BeginEnd(be) => &be.begin,
                Rule::Include(_) => continue,
            };
            if let Some(m) = memo.search(MemoKey::Rule(*rule_ref), pattern, line, pos) {
                consider(&mut best, Found::Rule(*rule_ref, m));
            }
        }
        if let Some((end, true)) = &end {
            if let Some(m) = memo.search(MemoKey::End(depth), end, line, pos) {
                consider(&mut best, Found::End(m));
            }
        }

        best
    }

    /// Rules visible in the innermost region, with includes flattened
    fn pattern_set(&mut self, stack: &ScopeStack) -> Arc<Vec<RuleRef>> {
        let base = stack.grammar();
        let key = (base, stack.top().map(|frame| frame.rule));
        if let Some(set) = self.pattern_sets.get(&key) {
            return Arc::clone(set);
        }

        let (owner, rules) = match key.1 {
            Some(rule) => (
                rule.grammar,
                self.begin_end(rule).map(|be| be.patterns.as_slice()).unwrap_or(&[]),
            ),
            None => (base, self.registry.grammar(base).patterns()),
        };

        let mut out = Vec::new();
        let mut visited = HashSet::new();
        if key.1.is_none() {
            visited.insert((base, None));
        }
        let mut failures = Vec::new();
        collect_rules(self.registry, owner, base, rules, &mut out, &mut visited, &mut failures);
        for failure in failures {
            self.report_error(failure);
        }

        let set = Arc::new(out);
        self.pattern_sets.insert(key, Arc::clone(&set));
        set
    }

    fn report(&mut self, limit: ResourceLimit) {
        tracing::warn!("{}", limit);
        self.pending.push(HighlightError::ResourceLimit(limit));
    }

    /// Queue a problem for the current line, once per tokenizer
    fn report_error(&mut self, error: HighlightError) {
        if self.reported.insert(error.to_string()) {
            tracing::warn!("{}", error);
            self.pending.push(error);
        }
    }
}

/// Flatten `rules` of grammar `owner`, expanding includes depth-first
///
/// `visited` holds every include target already expanded into this list,
/// so a cycle of includes is cut instead of looping.
fn collect_rules<'a>(
    registry: &'a GrammarRegistry,
    owner: GrammarId,
    base: GrammarId,
    rules: &'a [super::rules::RuleId],
    out: &mut Vec<RuleRef>,
    visited: &mut HashSet<(GrammarId, Option<&'a str>)>,
    failures: &mut Vec<HighlightError>,
) {
    for &rule in rules {
        match registry.grammar(owner).rule(rule) {
            Rule::Include(reference) => match registry.resolve_include(owner, base, reference) {
                Ok(target) => {
                    if visited.insert((target.grammar, target.key)) {
                        collect_rules(registry, target.grammar, base, target.rules, out, visited, failures);
                    }
                }
                Err(e) => failures.push(e),
            },
            Rule::Match { .. } | Rule::BeginEnd(_) => out.push(RuleRef { grammar: owner, rule }),
        }
    }
}

/// Byte offset of the character after `pos`, if any
fn next_char(line: &str, pos: usize) -> Option<usize> {
    line[pos..].chars().next().map(|c| pos + c.len_utf8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::grammar::Grammar;
    use crate::syntax::source::GrammarSource;

    fn registry(sources: &[&str]) -> GrammarRegistry {
        let mut registry = GrammarRegistry::new();
        for text in sources {
            let grammar = Grammar::compile(&GrammarSource::from_toml(text).unwrap()).unwrap();
            registry.register(grammar).unwrap();
        }
        registry
    }

    fn spans(tokens: &[Token]) -> Vec<(usize, usize, &str)> {
        tokens
            .iter()
            .map(|t| (t.start, t.end, t.scope().map(|s| s.as_str()).unwrap_or("")))
            .collect()
    }

    fn scope_names(stack: &ScopeStack) -> Vec<String> {
        stack.scopes().iter().map(|s| s.to_string()).collect()
    }

    const BLOCK: &str = r#"
name = "block"
scope = "source.block"

[[patterns]]
begin = '/\*'
end = '\*/'
scope = "comment.block"
"#;

    #[test]
    fn test_block_comment_across_lines() {
        let registry = registry(&[BLOCK]);
        let mut tokenizer = Tokenizer::new(&registry, Limits::default());
        let state = tokenizer.initial_state(GrammarId(0));

        let first = tokenizer.tokenize_line("a/*b", &state);
        assert_eq!(
            spans(&first.tokens),
            vec![(0, 1, "source.block"), (1, 3, "comment.block"), (3, 4, "comment.block")]
        );
        assert_eq!(scope_names(&first.state), vec!["source.block", "comment.block"]);

        let second = tokenizer.tokenize_line("c*/d", &first.state);
        assert_eq!(
            spans(&second.tokens),
            vec![(0, 1, "comment.block"), (1, 3, "comment.block"), (3, 4, "source.block")]
        );
        assert_eq!(scope_names(&second.state), vec!["source.block"]);
        assert!(second.issues.is_empty());
    }

    #[test]
    fn test_captures_split_match() {
        let registry = registry(&[r#"
name = "caps"
scope = "source.caps"

[[patterns]]
match = '(fn)\s+(\w+)'
scope = "meta.function"
captures = { "1" = "keyword.fn", "2" = "entity.name" }
"#]);
        let mut tokenizer = Tokenizer::new(&registry, Limits::default());
        let state = tokenizer.initial_state(GrammarId(0));
        let line = tokenizer.tokenize_line("x fn main()", &state);

        assert_eq!(
            spans(&line.tokens),
            vec![
                (0, 2, "source.caps"),
                (2, 4, "keyword.fn"),
                (4, 5, "meta.function"),
                (5, 9, "entity.name"),
                (9, 11, "source.caps"),
            ]
        );
        assert_eq!(
            line.tokens[1].scopes.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            vec!["source.caps", "meta.function", "keyword.fn"]
        );
    }

    #[test]
    fn test_nested_captures() {
        let registry = registry(&[r#"
name = "nest"
scope = "source.nest"

[[patterns]]
match = '((a)b)c'
captures = { "1" = "outer", "2" = "inner" }
"#]);
        let mut tokenizer = Tokenizer::new(&registry, Limits::default());
        let state = tokenizer.initial_state(GrammarId(0));
        let line = tokenizer.tokenize_line("abc", &state);
        assert_eq!(spans(&line.tokens), vec![(0, 1, "inner"), (1, 2, "outer"), (2, 3, "source.nest")]);
    }

    #[test]
    fn test_earliest_match_wins_then_declaration_order() {
        let registry = registry(&[r#"
name = "order"
scope = "source.order"

[[patterns]]
match = 'bc'
scope = "late"

[[patterns]]
match = 'ab'
scope = "early"

[[patterns]]
match = 'abc'
scope = "shadowed"
"#]);
        let mut tokenizer = Tokenizer::new(&registry, Limits::default());
        let state = tokenizer.initial_state(GrammarId(0));
        let line = tokenizer.tokenize_line("abc", &state);
        assert_eq!(spans(&line.tokens), vec![(0, 2, "early"), (2, 3, "source.order")]);
    }

    #[test]
    fn test_content_rules_only_inside_region() {
        let registry = registry(&[r#"
name = "str"
scope = "source.str"

[[patterns]]
begin = '"'
end = '"'
scope = "string"
patterns = [{ match = '\\.', scope = "escape" }]
"#]);
        let mut tokenizer = Tokenizer::new(&registry, Limits::default());
        let state = tokenizer.initial_state(GrammarId(0));
        let line = tokenizer.tokenize_line(r#"\n"a\"b""#, &state);
        assert_eq!(
            spans(&line.tokens),
            vec![
                (0, 2, "source.str"),
                (2, 3, "string"),
                (3, 4, "string"),
                (4, 6, "escape"),
                (6, 7, "string"),
                (7, 8, "string"),
            ]
        );
        assert!(line.state.is_root());
    }

    #[test]
    fn test_content_scope_excludes_delimiters() {
        let registry = registry(&[r#"
name = "cs"
scope = "source.cs"

[[patterns]]
begin = '\{'
end = '\}'
scope = "meta.block"
content_scope = "meta.body"
"#]);
        let mut tokenizer = Tokenizer::new(&registry, Limits::default());
        let state = tokenizer.initial_state(GrammarId(0));
        let line = tokenizer.tokenize_line("{x}", &state);
        assert_eq!(spans(&line.tokens), vec![(0, 1, "meta.block"), (1, 2, "meta.body"), (2, 3, "meta.block")]);
    }

    #[test]
    fn test_zero_width_match_terminates() {
        let registry = registry(&[r#"
name = "empty"
scope = "source.empty"

[[patterns]]
match = 'x*'
scope = "xs"
"#]);
        let mut tokenizer = Tokenizer::new(&registry, Limits::default());
        let state = tokenizer.initial_state(GrammarId(0));
        let line = tokenizer.tokenize_line("ab xx é", &state);
        let covered: usize = line.tokens.iter().map(Token::len).sum();
        assert_eq!(covered, "ab xx é".len());
        assert!(line.tokens.iter().any(|t| (t.start, t.end) == (3, 5)));
        assert!(line.issues.is_empty());
    }

    #[test]
    fn test_zero_width_region_terminates() {
        let registry = registry(&[r#"
name = "zw"
scope = "source.zw"

[[patterns]]
begin = ''
end = ''
scope = "meta.nothing"
"#]);
        let mut tokenizer = Tokenizer::new(&registry, Limits::default());
        let state = tokenizer.initial_state(GrammarId(0));
        let line = tokenizer.tokenize_line("abc", &state);
        let covered: usize = line.tokens.iter().map(Token::len).sum();
        assert_eq!(covered, 3);
    }

    #[test]
    fn test_self_recursion_and_depth_limit() {
        let registry = registry(&[r#"
name = "parens"
scope = "source.parens"

[[patterns]]
begin = '\('
end = '\)'
scope = "meta.group"
patterns = [{ include = "$self" }]
"#]);
        let limits = Limits {
            max_stack_depth: 3,
            ..Limits::default()
        };
        let mut tokenizer = Tokenizer::new(&registry, limits);
        let state = tokenizer.initial_state(GrammarId(0));

        let balanced = tokenizer.tokenize_line("((a))", &state);
        assert!(balanced.state.is_root());
        assert_eq!(balanced.tokens[2].scopes.len(), 3);

        let deep = tokenizer.tokenize_line("((((x", &state);
        assert_eq!(deep.state.depth(), 3);
        assert_eq!(deep.issues.len(), 1);
        assert!(matches!(
            deep.issues[0],
            HighlightError::ResourceLimit(ResourceLimit::StackDepth(3))
        ));
        let last = deep.tokens.last().unwrap();
        assert_eq!((last.start, last.end), (3, 5));
        assert_eq!(last.scopes.len(), 1);
    }

    #[test]
    fn test_entering_stack_deeper_than_limit_is_truncated() {
        let registry = registry(&[r#"
name = "parens"
scope = "source.parens"

[[patterns]]
begin = '\('
end = '\)'
scope = "meta.group"
patterns = [{ include = "$self" }]
"#]);
        let mut roomy = Tokenizer::new(&registry, Limits::default());
        let state = roomy.initial_state(GrammarId(0));
        let deep = roomy.tokenize_line("(((((", &state);
        assert_eq!(deep.state.depth(), 5);
        assert!(deep.issues.is_empty());

        let limits = Limits {
            max_stack_depth: 2,
            ..Limits::default()
        };
        let mut tight = Tokenizer::new(&registry, limits);
        let line = tight.tokenize_line("x", &deep.state);
        assert_eq!(line.state.depth(), 2);
        assert!(matches!(
            line.issues.as_slice(),
            [HighlightError::ResourceLimit(ResourceLimit::StackDepth(2))]
        ));
        assert_eq!(spans(&line.tokens), vec![(0, 1, "meta.group")]);
        assert_eq!(line.tokens[0].scopes.len(), 3);
    }

    #[test]
    fn test_long_line_searches_grow_linearly() {
        let registry = registry(&[r#"
name = "ops"
scope = "source.ops"

[[patterns]]
match = '\bfn\b'
scope = "keyword"

[[patterns]]
match = '\d+'
scope = "number"

[[patterns]]
begin = '"'
end = '"'
scope = "string"

[[patterns]]
match = '[=+;]'
scope = "operator"
"#]);
        let mut tokenizer = Tokenizer::new(&registry, Limits::default());
        let state = tokenizer.initial_state(GrammarId(0));
        let repeats = 2000;
        let text = "x = a + b; \"s\" ".repeat(repeats);
        let line = tokenizer.tokenize_line(&text, &state);

        assert!(line.issues.is_empty());
        assert!(line.state.is_root());
        assert_eq!(line.tokens.last().map(|t| t.end), Some(text.len()));
        let operators = line.tokens.iter().filter(|t| t.scope().map(|s| s.as_str()) == Some("operator")).count();
        assert_eq!(operators, 3 * repeats);
        // About one search per match; rescanning every rule at every step
        // would be several times that
        assert!(tokenizer.searches() < 6 * repeats, "{} searches", tokenizer.searches());
    }

    #[test]
    fn test_step_budget() {
        let registry = registry(&[r#"
name = "chars"
scope = "source.chars"

[[patterns]]
match = '.'
scope = "char"
"#]);
        let limits = Limits {
            max_steps_per_line: 4,
            ..Limits::default()
        };
        let mut tokenizer = Tokenizer::new(&registry, limits);
        let state = tokenizer.initial_state(GrammarId(0));
        let line = tokenizer.tokenize_line("abcdefgh", &state);
        assert_eq!(
            spans(&line.tokens),
            vec![(0, 1, "char"), (1, 2, "char"), (2, 3, "char"), (3, 4, "char"), (4, 8, "source.chars")]
        );
        assert!(matches!(
            line.issues.as_slice(),
            [HighlightError::ResourceLimit(ResourceLimit::StepBudget(4))]
        ));
    }

    #[test]
    fn test_unresolved_include_is_skipped() {
        let registry = registry(&[r##"
name = "partial"
scope = "source.partial"

[[patterns]]
include = "#missing"

[[patterns]]
match = '\d+'
scope = "number"
"##]);
        let mut tokenizer = Tokenizer::new(&registry, Limits::default());
        let state = tokenizer.initial_state(GrammarId(0));
        let line = tokenizer.tokenize_line("a 12", &state);
        assert_eq!(spans(&line.tokens), vec![(0, 2, "source.partial"), (2, 4, "number")]);
        assert_eq!(line.issues.len(), 1);

        // Reported once per tokenizer
        let again = tokenizer.tokenize_line("a 12", &state);
        assert!(again.issues.is_empty());
    }

    #[test]
    fn test_include_cycle_is_cut() {
        let registry = registry(&[r##"
name = "cycle"
scope = "source.cycle"

[[patterns]]
include = "#a"

[repository.a]
patterns = [{ include = "#b" }, { match = 'a', scope = "letter.a" }]

[repository.b]
patterns = [{ include = "#a" }, { include = "$self" }, { match = 'b', scope = "letter.b" }]
"##]);
        let mut tokenizer = Tokenizer::new(&registry, Limits::default());
        let state = tokenizer.initial_state(GrammarId(0));
        let line = tokenizer.tokenize_line("ab", &state);
        assert_eq!(spans(&line.tokens), vec![(0, 1, "letter.a"), (1, 2, "letter.b")]);
    }

    #[test]
    fn test_embedded_grammar() {
        let registry = registry(&[
            r#"
name = "inner"
scope = "source.inner"

[[patterns]]
match = '\bvar\b'
scope = "keyword.inner"
"#,
            r#"
name = "outer"
scope = "text.outer"

[[patterns]]
begin = '<s>'
end = '</s>'
scope = "meta.embedded"
patterns = [{ include = "inner" }]
"#,
        ]);
        let mut tokenizer = Tokenizer::new(&registry, Limits::default());
        let state = tokenizer.initial_state(GrammarId(1));
        let line = tokenizer.tokenize_line("var<s>var</s>", &state);
        assert_eq!(
            spans(&line.tokens),
            vec![
                (0, 3, "text.outer"),
                (3, 6, "meta.embedded"),
                (6, 9, "keyword.inner"),
                (9, 13, "meta.embedded"),
            ]
        );
        assert_eq!(
            line.tokens[2].scopes.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            vec!["text.outer", "meta.embedded", "keyword.inner"]
        );
    }

    #[test]
    fn test_end_backreference() {
        let registry = registry(&[r##"
name = "raw"
scope = "source.raw"

[[patterns]]
begin = 'r(#*)"'
end = '"\1'
scope = "string.raw"
"##]);
        let mut tokenizer = Tokenizer::new(&registry, Limits::default());
        let state = tokenizer.initial_state(GrammarId(0));
        let first = tokenizer.tokenize_line(r###"r#"a"b"###, &state);
        assert!(!first.state.is_root());
        let second = tokenizer.tokenize_line(r###"c"# d"###, &first.state);
        assert!(second.state.is_root());
        assert_eq!(spans(&second.tokens).last(), Some(&(3, 5, "source.raw")));
    }

    #[test]
    fn test_apply_end_last() {
        let source = |last: bool| {
            format!(
                r#"
name = "endlast"
scope = "source.endlast"

[[patterns]]
begin = '<'
end = '>'
scope = "tag"
apply_end_last = {}
patterns = [{{ match = '>>', scope = "shift" }}]
"#,
                last
            )
        };

        let text = source(false);
        let first = registry(&[text.as_str()]);
        let mut tokenizer = Tokenizer::new(&first, Limits::default());
        let state = tokenizer.initial_state(GrammarId(0));
        let line = tokenizer.tokenize_line("<a>>", &state);
        assert!(line.tokens.iter().all(|t| t.scope().map(|s| s.as_str()) != Some("shift")));

        let text = source(true);
        let last = registry(&[text.as_str()]);
        let mut tokenizer = Tokenizer::new(&last, Limits::default());
        let state = tokenizer.initial_state(GrammarId(0));
        let line = tokenizer.tokenize_line("<a>>", &state);
        assert!(line.tokens.iter().any(|t| t.scope().map(|s| s.as_str()) == Some("shift")));
        assert!(!line.state.is_root());
    }

    #[test]
    fn test_line_end_region() {
        let registry = registry(&[r#"
name = "lc"
scope = "source.lc"

[[patterns]]
begin = '//'
end = '$'
scope = "comment.line"
"#]);
        let mut tokenizer = Tokenizer::new(&registry, Limits::default());
        let state = tokenizer.initial_state(GrammarId(0));
        let line = tokenizer.tokenize_line("x // y", &state);
        assert_eq!(spans(&line.tokens), vec![(0, 2, "source.lc"), (2, 4, "comment.line"), (4, 6, "comment.line")]);
        assert!(line.state.is_root());

        let empty = tokenizer.tokenize_line("//", &state);
        assert!(empty.state.is_root());
    }

    #[test]
    fn test_document_fold_matches_line_by_line() {
        let registry = registry(&[BLOCK]);
        let mut tokenizer = Tokenizer::new(&registry, Limits::default());
        let text = "a /* b\nc\nd */ e\n/* f */";
        let whole = tokenizer.tokenize_document(GrammarId(0), text);

        let mut state = tokenizer.initial_state(GrammarId(0));
        for (line, expected) in text.split('\n').zip(&whole) {
            let result = tokenizer.tokenize_line(line, &state);
            assert_eq!(result.tokens, expected.tokens);
            state = result.state;
        }
        assert!(state.is_root());
    }

    #[test]
    fn test_empty_line_has_no_tokens() {
        let registry = registry(&[BLOCK]);
        let mut tokenizer = Tokenizer::new(&registry, Limits::default());
        let state = tokenizer.initial_state(GrammarId(0));
        let line = tokenizer.tokenize_line("", &state);
        assert!(line.tokens.is_empty());
    }
}
