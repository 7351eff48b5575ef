//! Grammar registry
//!
//! Owns every compiled grammar of an engine, answers name and alias
//! lookups, and resolves `include` references between grammars. It acts as
//! the shared node table for the rule graph: rules never point at other
//! grammars directly, only by name through the registry.

use std::collections::HashMap;
use std::path::Path;

use super::grammar::Grammar;
use super::rules::{GrammarId, IncludeRef, RuleId};
use crate::error::{HighlightError, Result};

/// Where an include reference points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncludeTarget<'a> {
    pub grammar: GrammarId,
    /// Repository key, or `None` for the grammar's root rules
    pub key: Option<&'a str>,
    pub rules: &'a [RuleId],
}

/// The set of loaded grammars
#[derive(Debug, Default)]
pub struct GrammarRegistry {
    grammars: Vec<Grammar>,
    /// Lowercased name or alias -> grammar
    by_name: HashMap<String, GrammarId>,
    /// Root scope name -> grammar
    by_scope: HashMap<String, GrammarId>,
    /// File extension -> grammar, first registration wins
    by_extension: HashMap<String, GrammarId>,
}

impl GrammarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a grammar
    ///
    /// Fails with `DuplicateName` if its name or any alias is taken; nothing
    /// is registered in that case.
    pub fn register(&mut self, grammar: Grammar) -> Result<GrammarId> {
        let mut keys: Vec<String> = Vec::new();
        for name in grammar.names() {
            let key = name.to_lowercase();
            if self.by_name.contains_key(&key) || keys.contains(&key) {
                return Err(HighlightError::DuplicateName(name.to_string()));
            }
            keys.push(key);
        }

        let id = GrammarId(self.grammars.len());
        for key in keys {
            self.by_name.insert(key, id);
        }
        self.by_scope
            .entry(grammar.scope.as_str().to_string())
            .or_insert(id);
        for ext in &grammar.extensions {
            self.by_extension.entry(ext.clone()).or_insert(id);
        }
        self.grammars.push(grammar);
        Ok(id)
    }

    /// Find a grammar by name or alias (case-insensitive)
    pub fn resolve(&self, name: &str) -> Result<GrammarId> {
        self.by_name
            .get(&name.trim().to_lowercase())
            .copied()
            .ok_or_else(|| HighlightError::UnknownLanguage(name.to_string()))
    }

    /// Detect a grammar from a file name's extension
    pub fn detect(&self, path: &Path) -> Option<GrammarId> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        self.by_extension.get(&ext).copied()
    }

    /// Find a grammar by name, alias, or root scope name
    fn lookup(&self, name: &str) -> Option<GrammarId> {
        self.resolve(name)
            .ok()
            .or_else(|| self.by_scope.get(name).copied())
    }

    pub fn grammar(&self, id: GrammarId) -> &Grammar {
        &self.grammars[id.0]
    }

    /// Canonical names in registration order
    pub fn list_languages(&self) -> Vec<&str> {
        self.grammars.iter().map(|g| g.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.grammars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grammars.is_empty()
    }

    /// Resolve an include found in grammar `from` while highlighting `base`
    pub fn resolve_include(
        &self,
        from: GrammarId,
        base: GrammarId,
        reference: &IncludeRef,
    ) -> Result<IncludeTarget<'_>> {
        let target = match reference {
            IncludeRef::SelfGrammar => Some(self.root_target(from)),
            IncludeRef::Base => Some(self.root_target(base)),
            IncludeRef::Local(key) => self.entry_target(from, key),
            IncludeRef::Grammar(name) => self.lookup(name).map(|id| self.root_target(id)),
            IncludeRef::GrammarKey(name, key) => {
                self.lookup(name).and_then(|id| self.entry_target(id, key))
            }
        };

        target.ok_or_else(|| HighlightError::UnresolvedInclude {
            grammar: self.grammar(from).name.clone(),
            reference: reference.to_string(),
        })
    }

    fn root_target(&self, id: GrammarId) -> IncludeTarget<'_> {
        IncludeTarget {
            grammar: id,
            key: None,
            rules: self.grammar(id).patterns(),
        }
    }

    fn entry_target(&self, id: GrammarId, key: &str) -> Option<IncludeTarget<'_>> {
        let (key, rules) = self.grammar(id).repository_entry(key)?;
        Some(IncludeTarget {
            grammar: id,
            key: Some(key),
            rules,
        })
    }

    /// Check every include of every grammar, returning the failures
    pub fn unresolved_includes(&self) -> Vec<HighlightError> {
        let mut errors = Vec::new();
        for (i, grammar) in self.grammars.iter().enumerate() {
            let id = GrammarId(i);
            for reference in grammar.includes() {
                // `$base` depends on the document's grammar, so it always resolves
                if let Err(e) = self.resolve_include(id, id, reference) {
                    errors.push(e);
                }
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::source::GrammarSource;

    fn grammar(name: &str, aliases: &[&str], body: &str) -> Grammar {
        let mut text = format!("name = \"{}\"\nscope = \"source.{}\"\n", name, name);
        if !aliases.is_empty() {
            let quoted: Vec<String> = aliases.iter().map(|a| format!("\"{}\"", a)).collect();
            text.push_str(&format!("aliases = [{}]\n", quoted.join(", ")));
        }
        text.push_str(body);
        Grammar::compile(&GrammarSource::from_toml(&text).unwrap()).unwrap()
    }

    fn sample_registry() -> GrammarRegistry {
        let mut registry = GrammarRegistry::new();
        registry
            .register(grammar(
                "c",
                &["h"],
                "[[patterns]]\ninclude = \"#comments\"\n\n[repository.comments]\nmatch = '//.*'\nscope = \"comment.line.c\"\n",
            ))
            .unwrap();
        registry
            .register(grammar(
                "cpp",
                &["c++"],
                "[[patterns]]\ninclude = \"c\"\n\n[[patterns]]\ninclude = \"source.c#comments\"\n",
            ))
            .unwrap();
        registry
    }

    #[test]
    fn test_resolve_names_and_aliases() {
        let registry = sample_registry();
        assert_eq!(registry.resolve("c").unwrap(), GrammarId(0));
        assert_eq!(registry.resolve("H").unwrap(), GrammarId(0));
        assert_eq!(registry.resolve("C++").unwrap(), GrammarId(1));
        assert!(matches!(
            registry.resolve("cobol"),
            Err(HighlightError::UnknownLanguage(name)) if name == "cobol"
        ));
    }

    #[test]
    fn test_list_languages_in_insertion_order() {
        let registry = sample_registry();
        assert_eq!(registry.list_languages(), vec!["c", "cpp"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_detect_by_extension() {
        let mut registry = GrammarRegistry::new();
        let mut source = GrammarSource::from_toml("name = \"c\"\nscope = \"source.c\"\n").unwrap();
        source.extensions = vec!["c".into(), ".H".into()];
        let id = registry.register(Grammar::compile(&source).unwrap()).unwrap();

        assert_eq!(registry.detect(Path::new("main.c")), Some(id));
        assert_eq!(registry.detect(Path::new("include/util.h")), Some(id));
        assert_eq!(registry.detect(Path::new("main.rs")), None);
        assert_eq!(registry.detect(Path::new("Makefile")), None);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = sample_registry();
        let err = registry.register(grammar("other", &["cpp"], "")).unwrap_err();
        assert!(matches!(err, HighlightError::DuplicateName(name) if name == "cpp"));
        // Nothing from the rejected grammar was registered
        assert!(registry.resolve("other").is_err());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_resolve_includes() {
        let registry = sample_registry();
        let c = GrammarId(0);
        let cpp = GrammarId(1);

        let target = registry.resolve_include(cpp, cpp, &IncludeRef::Grammar("c".into())).unwrap();
        assert_eq!(target.grammar, c);
        assert_eq!(target.key, None);

        let target = registry
            .resolve_include(cpp, cpp, &IncludeRef::GrammarKey("source.c".into(), "comments".into()))
            .unwrap();
        assert_eq!(target.grammar, c);
        assert_eq!(target.key, Some("comments"));

        let target = registry.resolve_include(c, cpp, &IncludeRef::Base).unwrap();
        assert_eq!(target.grammar, cpp);

        let target = registry.resolve_include(c, cpp, &IncludeRef::SelfGrammar).unwrap();
        assert_eq!(target.grammar, c);
    }

    #[test]
    fn test_unresolved_include() {
        let mut registry = sample_registry();
        registry
            .register(grammar("bad", &[], "[[patterns]]\ninclude = \"#nowhere\"\n"))
            .unwrap();

        let errors = registry.unresolved_includes();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            HighlightError::UnresolvedInclude { grammar, reference }
                if grammar == "bad" && reference == "#nowhere"
        ));
    }
}
