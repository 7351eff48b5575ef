//! Style types for highlighted text
//!
//! A `Style` is what the theme assigns to a token. Every attribute is
//! optional so that several theme rules can contribute to one token.

use std::str::FromStr;

/// Text colors: the ANSI 16-color palette plus 24-bit RGB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    BrightBlack,
    BrightRed,
    BrightGreen,
    BrightYellow,
    BrightBlue,
    BrightMagenta,
    BrightCyan,
    BrightWhite,
    Rgb { r: u8, g: u8, b: u8 },
}

const NAMED_COLORS: &[(&str, Color)] = &[
    ("black", Color::Black),
    ("red", Color::Red),
    ("green", Color::Green),
    ("yellow", Color::Yellow),
    ("blue", Color::Blue),
    ("magenta", Color::Magenta),
    ("cyan", Color::Cyan),
    ("white", Color::White),
    ("bright-black", Color::BrightBlack),
    ("bright-red", Color::BrightRed),
    ("bright-green", Color::BrightGreen),
    ("bright-yellow", Color::BrightYellow),
    ("bright-blue", Color::BrightBlue),
    ("bright-magenta", Color::BrightMagenta),
    ("bright-cyan", Color::BrightCyan),
    ("bright-white", Color::BrightWhite),
];

impl FromStr for Color {
    type Err = String;

    /// Parse `#rgb`, `#rrggbb` or a named color (`red`, `bright-black`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix('#') {
            return parse_hex(hex).ok_or_else(|| format!("invalid hex color: {}", s));
        }

        let name = s.to_lowercase().replace('_', "-");
        NAMED_COLORS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, c)| *c)
            .ok_or_else(|| format!("unknown color: {}", s))
    }
}

fn parse_hex(hex: &str) -> Option<Color> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        3 => {
            let digit = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|d| d * 17);
            Some(Color::Rgb { r: digit(0)?, g: digit(1)?, b: digit(2)? })
        }
        6 => {
            let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
            Some(Color::Rgb { r: byte(0)?, g: byte(2)?, b: byte(4)? })
        }
        _ => None,
    }
}

/// Text style attributes; `None` means "not set by any theme rule"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Style {
    pub foreground: Option<Color>,
    pub background: Option<Color>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub underline: Option<bool>,
}

impl Style {
    /// Fill every attribute still unset here from `other`
    pub fn or(self, other: Style) -> Self {
        Self {
            foreground: self.foreground.or(other.foreground),
            background: self.background.or(other.background),
            bold: self.bold.or(other.bold),
            italic: self.italic.or(other.italic),
            underline: self.underline.or(other.underline),
        }
    }

    /// Check if this is the default (no styling)
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// True once every attribute has been decided
    pub(crate) fn is_complete(&self) -> bool {
        self.foreground.is_some()
            && self.background.is_some()
            && self.bold.is_some()
            && self.italic.is_some()
            && self.underline.is_some()
    }
}
