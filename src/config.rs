//! Configuration file support
//!
//! Loads settings from ~/.synhl.conf (or %USERPROFILE%\.synhl.conf on Windows)
//!
//! Format: simple key=value pairs, one per line
//! Lines starting with # are comments
//!
//! Example:
//! ```text
//! # synhl configuration
//! max-stack-depth = 256
//! max-steps-per-line = 200000
//! grammar-dir = /home/me/.config/synhl/grammars
//! theme = /home/me/.config/synhl/dark.toml
//! color = auto
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::syntax::Limits;

/// When the CLI should emit ANSI colors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    /// Only when stdout is a terminal
    Auto,
    Always,
    Never,
}

/// Configuration settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Deepest allowed nesting of open regions
    pub max_stack_depth: usize,
    /// Matching steps allowed on one line
    pub max_steps_per_line: usize,
    /// Extra grammar files (`*.toml`) to load after the bundled ones
    pub grammar_dir: Option<PathBuf>,
    /// Theme file replacing the bundled theme
    pub theme: Option<PathBuf>,
    pub color: ColorMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            max_stack_depth: limits.max_stack_depth,
            max_steps_per_line: limits.max_steps_per_line,
            grammar_dir: None,
            theme: None,
            color: ColorMode::Auto,
        }
    }
}

impl EngineConfig {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        #[cfg(windows)]
        {
            std::env::var("USERPROFILE")
                .ok()
                .map(|home| PathBuf::from(home).join(".synhl.conf"))
        }

        #[cfg(not(windows))]
        {
            std::env::var("HOME")
                .ok()
                .map(|home| PathBuf::from(home).join(".synhl.conf"))
        }
    }

    /// Load configuration from the default location
    ///
    /// A missing or unreadable file gives the defaults.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Self {
        let mut config = Self::default();
        match fs::read_to_string(path) {
            Ok(contents) => config.apply(&Self::parse(&contents)),
            Err(e) => tracing::debug!("No config at {}: {}", path.display(), e),
        }
        config
    }

    /// Tokenizer limits from these settings
    pub fn limits(&self) -> Limits {
        Limits {
            max_stack_depth: self.max_stack_depth,
            max_steps_per_line: self.max_steps_per_line,
        }
    }

    /// Parse config file contents into key-value pairs
    fn parse(contents: &str) -> HashMap<String, String> {
        let mut settings = HashMap::new();

        for line in contents.lines() {
            let line = line.trim();

            // Skip empty lines and comments
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim().to_lowercase();
                let value = value.trim().to_string();
                settings.insert(key, value);
            } else {
                tracing::warn!("Ignoring config line without '=': {}", line);
            }
        }

        settings
    }

    /// Apply settings from parsed config
    fn apply(&mut self, settings: &HashMap<String, String>) {
        if let Some(value) = settings.get("max-stack-depth") {
            match value.parse::<usize>() {
                Ok(n) => self.max_stack_depth = n.clamp(4, 4096),
                Err(_) => tracing::warn!("Invalid max-stack-depth: {}", value),
            }
        }

        if let Some(value) = settings.get("max-steps-per-line") {
            match value.parse::<usize>() {
                Ok(n) => self.max_steps_per_line = n.clamp(1_000, 10_000_000),
                Err(_) => tracing::warn!("Invalid max-steps-per-line: {}", value),
            }
        }

        if let Some(value) = settings.get("grammar-dir") {
            self.grammar_dir = non_empty_path(value);
        }

        if let Some(value) = settings.get("theme") {
            self.theme = non_empty_path(value);
        }

        if let Some(value) = settings.get("color") {
            self.color = parse_color_mode(value);
        }
    }
}

fn non_empty_path(value: &str) -> Option<PathBuf> {
    (!value.is_empty()).then(|| PathBuf::from(value))
}

/// Parse a color mode; booleans are accepted as always/never
fn parse_color_mode(s: &str) -> ColorMode {
    match s.to_lowercase().as_str() {
        "auto" => ColorMode::Auto,
        "always" => ColorMode::Always,
        "never" => ColorMode::Never,
        other if parse_bool(other) => ColorMode::Always,
        _ => ColorMode::Never,
    }
}

/// Parse a boolean value from string
fn parse_bool(s: &str) -> bool {
    let s = s.to_lowercase();
    matches!(s.as_str(), "true" | "yes" | "on" | "1")
}
