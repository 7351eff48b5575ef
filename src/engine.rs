//! The highlighting engine
//!
//! An `Engine` owns a grammar registry and a theme mapper, both immutable
//! after construction. It keeps no per-document state, so one engine can
//! serve concurrent `highlight` calls from many threads.

use std::fs;
use std::path::Path;

use crate::config::EngineConfig;
use crate::error::{HighlightError, Result};
use crate::syntax::builtin;
use crate::syntax::{
    Grammar, GrammarId, GrammarRegistry, GrammarSource, Limits, Scope, Style, ThemeMapper, ThemeSource,
    Token, Tokenizer,
};

/// A token with its resolved style
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledToken {
    /// Byte offset within the line (inclusive)
    pub start: usize,
    /// Byte offset within the line (exclusive)
    pub end: usize,
    pub style: Style,
    /// Scope path, outermost first
    pub scopes: Vec<Scope>,
}

impl StyledToken {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Highlighting of one line
#[derive(Debug)]
pub struct HighlightedLine {
    /// Byte offset of the line within the document
    pub offset: usize,
    /// Tokens covering the line exactly, in order
    pub tokens: Vec<StyledToken>,
    /// Recoverable problems met on this line
    pub issues: Vec<HighlightError>,
}

/// Highlighting of a whole document
#[derive(Debug)]
pub struct Highlighted {
    /// Canonical name of the language used
    pub language: String,
    /// One entry per `\n`-separated line
    pub lines: Vec<HighlightedLine>,
}

impl Highlighted {
    /// All recoverable problems, with their line index
    pub fn issues(&self) -> impl Iterator<Item = (usize, &HighlightError)> {
        self.lines
            .iter()
            .enumerate()
            .flat_map(|(i, line)| line.issues.iter().map(move |e| (i, e)))
    }

    /// Every token with document-absolute offsets
    pub fn spans(&self) -> impl Iterator<Item = (usize, usize, &StyledToken)> {
        self.lines.iter().flat_map(|line| {
            line.tokens
                .iter()
                .map(move |t| (line.offset + t.start, line.offset + t.end, t))
        })
    }
}

/// Grammar registry + theme behind a small highlighting API
#[derive(Debug)]
pub struct Engine {
    registry: GrammarRegistry,
    theme: ThemeMapper,
    limits: Limits,
    compile_errors: Vec<HighlightError>,
}

impl Engine {
    /// Engine with the bundled grammars and theme
    pub fn new() -> Self {
        Self::with_theme(builtin::grammar_sources(), builtin::default_theme(), Limits::default())
    }

    /// Compile grammar and theme sources
    ///
    /// Only an invalid theme fails construction. A grammar that does not
    /// compile is logged, recorded in `compile_errors`, and left out.
    pub fn construct(
        grammars: impl IntoIterator<Item = Result<GrammarSource>>,
        theme: &ThemeSource,
        limits: Limits,
    ) -> Result<Self> {
        let theme = ThemeMapper::build(theme)?;
        Ok(Self::with_theme(grammars, theme, limits))
    }

    /// Compile grammar sources against an already compiled theme
    pub fn with_theme(
        grammars: impl IntoIterator<Item = Result<GrammarSource>>,
        theme: ThemeMapper,
        limits: Limits,
    ) -> Self {
        let mut registry = GrammarRegistry::new();
        let mut compile_errors = Vec::new();

        for source in grammars {
            let registered = source
                .and_then(|source| Grammar::compile(&source))
                .and_then(|grammar| registry.register(grammar));
            if let Err(e) = registered {
                tracing::warn!("Skipping grammar: {}", e);
                compile_errors.push(e);
            }
        }

        for e in registry.unresolved_includes() {
            tracing::warn!("{}", e);
        }
        tracing::debug!(
            "Engine ready: {} languages, theme {}",
            registry.len(),
            theme.name()
        );

        Self {
            registry,
            theme,
            limits,
            compile_errors,
        }
    }

    /// Bundled grammars plus those in `config.grammar_dir`, and the
    /// configured theme (bundled theme if none)
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let mut grammars = builtin::grammar_sources();
        if let Some(dir) = &config.grammar_dir {
            grammars.extend(load_grammar_dir(dir)?);
        }

        let theme = match &config.theme {
            Some(path) => ThemeMapper::build(&ThemeSource::from_toml(&fs::read_to_string(path)?)?)?,
            None => builtin::default_theme(),
        };

        Ok(Self::with_theme(grammars, theme, config.limits()))
    }

    /// Highlight `text` as `language` (name or alias)
    ///
    /// Fails only with `UnknownLanguage`; callers should then show the text
    /// unhighlighted. Problems inside the text never fail the call.
    pub fn highlight(&self, language: &str, text: &str) -> Result<Highlighted> {
        self.highlight_with_cancel(language, text, || false)
    }

    /// Like `highlight`, checking `cancelled` before every line
    pub fn highlight_with_cancel(
        &self,
        language: &str,
        text: &str,
        cancelled: impl Fn() -> bool,
    ) -> Result<Highlighted> {
        let grammar = self.registry.resolve(language)?;
        let mut tokenizer = self.tokenizer();
        let mut state = tokenizer.initial_state(grammar);
        let mut lines = Vec::new();
        let mut offset = 0;

        for (index, line) in text.split('\n').enumerate() {
            if cancelled() {
                return Err(HighlightError::Cancelled { line: index });
            }
            let result = tokenizer.tokenize_line(line, &state);
            lines.push(HighlightedLine {
                offset,
                tokens: self.style_tokens(&result.tokens),
                issues: result.issues,
            });
            state = result.state;
            offset += line.len() + 1;
        }

        Ok(Highlighted {
            language: self.registry.grammar(grammar).name.clone(),
            lines,
        })
    }

    /// Highlight raw bytes, rejecting input that is not UTF-8
    pub fn highlight_bytes(&self, language: &str, bytes: &[u8]) -> Result<Highlighted> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| HighlightError::InvalidInput(format!("text is not UTF-8: {}", e)))?;
        self.highlight(language, text)
    }

    /// Canonical names of every language that compiled, in load order
    pub fn supported_languages(&self) -> Vec<&str> {
        self.registry.list_languages()
    }

    /// Grammars that failed to load
    pub fn compile_errors(&self) -> &[HighlightError] {
        &self.compile_errors
    }

    /// Language for a file name, by extension
    pub fn detect_language(&self, path: &Path) -> Option<&str> {
        self.registry
            .detect(path)
            .map(|id| self.registry.grammar(id).name.as_str())
    }

    pub fn resolve(&self, language: &str) -> Result<GrammarId> {
        self.registry.resolve(language)
    }

    pub fn registry(&self) -> &GrammarRegistry {
        &self.registry
    }

    pub fn theme(&self) -> &ThemeMapper {
        &self.theme
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// A fresh tokenizer over this engine's grammars
    pub fn tokenizer(&self) -> Tokenizer<'_> {
        Tokenizer::new(&self.registry, self.limits)
    }

    /// Resolve each token's style through the theme
    pub fn style_tokens(&self, tokens: &[Token]) -> Vec<StyledToken> {
        tokens
            .iter()
            .map(|t| StyledToken {
                start: t.start,
                end: t.end,
                style: self.theme.style_for(&t.scopes),
                scopes: t.scopes.clone(),
            })
            .collect()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Read every `*.toml` grammar in `dir`, sorted by file name
///
/// Files that fail to parse come back as errors so that the engine can
/// report them per language.
fn load_grammar_dir(dir: &Path) -> Result<Vec<Result<GrammarSource>>> {
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();

    Ok(paths
        .into_iter()
        .map(|path| {
            let text = fs::read_to_string(&path)?;
            GrammarSource::from_toml(&text).map_err(|e| HighlightError::GrammarCompileError {
                language: path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                reason: e.to_string(),
            })
        })
        .collect())
}
