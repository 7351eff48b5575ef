//! synhl - highlight source files in the terminal

use std::env;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;

use synhl::config::{ColorMode, EngineConfig};
use synhl::terminal::{self, AnsiWriter};
use synhl::{logging, Engine, HighlightError, Result};

/// Parsed command line
#[derive(Debug, Default)]
struct Options {
    language: Option<String>,
    config: Option<PathBuf>,
    color: Option<ColorMode>,
    list: bool,
    file: Option<PathBuf>,
}

fn main() {
    logging::init();
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(options) = parse_args(&args)? else {
        return Ok(());
    };

    let mut config = match &options.config {
        Some(path) => EngineConfig::load_from(path),
        None => EngineConfig::load(),
    };
    if let Some(color) = options.color {
        config.color = color;
    }

    let engine = Engine::from_config(&config)?;

    if options.list {
        for name in engine.supported_languages() {
            println!("{}", name);
        }
        return Ok(());
    }

    let bytes = match &options.file {
        Some(path) => fs::read(path)?,
        None => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf)?;
            buf
        }
    };

    // Binary or otherwise non-UTF-8 input goes through untouched
    let Ok(text) = std::str::from_utf8(&bytes) else {
        tracing::warn!("Input is not UTF-8, writing it unhighlighted");
        io::stdout().write_all(&bytes)?;
        return Ok(());
    };

    let color = match config.color {
        ColorMode::Auto => terminal::stdout_is_terminal(),
        ColorMode::Always => true,
        ColorMode::Never => false,
    };
    let mut writer = AnsiWriter::new(io::BufWriter::new(io::stdout().lock()), color);

    let language = options
        .language
        .clone()
        .or_else(|| {
            options
                .file
                .as_deref()
                .and_then(|path| engine.detect_language(path))
                .map(str::to_string)
        });

    let Some(language) = language else {
        return writer.write_plain(text);
    };

    match engine.highlight(&language, text) {
        Ok(highlighted) => {
            for (line, issue) in highlighted.issues() {
                tracing::debug!("line {}: {}", line + 1, issue);
            }
            writer.write_highlighted(text, &highlighted)
        }
        Err(HighlightError::UnknownLanguage(name)) => {
            tracing::warn!("Unknown language {}, writing text unhighlighted", name);
            writer.write_plain(text)
        }
        Err(e) => Err(e),
    }
}

/// Parse arguments; `None` means the invocation is already handled
fn parse_args(args: &[String]) -> Result<Option<Options>> {
    let mut options = Options::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                return Ok(None);
            }
            "--version" | "-V" => {
                print_version();
                return Ok(None);
            }
            "--list" => options.list = true,
            "--lang" | "-l" => options.language = Some(value(&mut iter, arg)?),
            "--config" => options.config = Some(PathBuf::from(value(&mut iter, arg)?)),
            "--color" => {
                options.color = Some(match value(&mut iter, arg)?.as_str() {
                    "auto" => ColorMode::Auto,
                    "always" => ColorMode::Always,
                    "never" => ColorMode::Never,
                    other => {
                        return Err(HighlightError::InvalidInput(format!(
                            "--color expects auto, always or never, got {}",
                            other
                        )))
                    }
                })
            }
            "--no-color" => options.color = Some(ColorMode::Never),
            "-" => options.file = None,
            other if other.starts_with('-') => {
                return Err(HighlightError::InvalidInput(format!("unknown option {}", other)));
            }
            other => {
                if options.file.is_some() {
                    return Err(HighlightError::InvalidInput("only one file can be given".to_string()));
                }
                options.file = Some(PathBuf::from(other));
            }
        }
    }

    Ok(Some(options))
}

fn value<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str) -> Result<String> {
    iter.next()
        .cloned()
        .ok_or_else(|| HighlightError::InvalidInput(format!("{} needs a value", flag)))
}

fn print_usage() {
    println!("synhl {} - grammar-driven syntax highlighter", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage: synhl [OPTIONS] [FILE]");
    println!();
    println!("Reads FILE (or stdin) and writes it to stdout with ANSI colors.");
    println!();
    println!("Options:");
    println!("  -l, --lang NAME    Language name or alias (default: from file extension)");
    println!("      --list         List supported languages");
    println!("      --config PATH  Config file (default: ~/.synhl.conf)");
    println!("      --color WHEN   auto, always or never");
    println!("      --no-color     Same as --color never");
    println!("  -h, --help         Show this help message");
    println!("  -V, --version      Show version information");
    println!();
    println!("Set RUST_LOG=debug for diagnostics on stderr.");
}

fn print_version() {
    println!("synhl {}", env!("CARGO_PKG_VERSION"));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        let options = parse_args(&args(&["--lang", "rust", "--no-color", "main.txt"]))
            .unwrap()
            .unwrap();
        assert_eq!(options.language.as_deref(), Some("rust"));
        assert_eq!(options.color, Some(ColorMode::Never));
        assert_eq!(options.file, Some(PathBuf::from("main.txt")));
        assert!(!options.list);
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(matches!(parse_args(&args(&["--lang"])), Err(HighlightError::InvalidInput(_))));
        assert!(matches!(parse_args(&args(&["--bogus"])), Err(HighlightError::InvalidInput(_))));
        assert!(matches!(parse_args(&args(&["--color", "sometimes"])), Err(HighlightError::InvalidInput(_))));
        assert!(matches!(parse_args(&args(&["a", "b"])), Err(HighlightError::InvalidInput(_))));
    }

    #[test]
    fn test_stdin_by_default() {
        let options = parse_args(&args(&["--list"])).unwrap().unwrap();
        assert!(options.list);
        assert!(options.file.is_none());
    }
}
