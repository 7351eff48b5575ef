//! ANSI terminal output using crossterm

use std::io::{self, IsTerminal, Write};

use crossterm::{
    queue,
    style::{self, Attribute, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
};

use crate::engine::Highlighted;
use crate::error::Result;
use crate::syntax::{Color, Style};

/// Whether stdout is attached to a terminal
pub fn stdout_is_terminal() -> bool {
    io::stdout().is_terminal()
}

/// Writes highlighted text as ANSI escape sequences
pub struct AnsiWriter<W: Write> {
    out: W,
    /// Emit escapes; when false the text is written unchanged
    color: bool,
}

impl<W: Write> AnsiWriter<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self { out, color }
    }

    /// Write `text` styled by `highlighted`, which must come from `text`
    pub fn write_highlighted(&mut self, text: &str, highlighted: &Highlighted) -> Result<()> {
        for (i, line) in highlighted.lines.iter().enumerate() {
            if i > 0 {
                queue!(self.out, Print('\n'))?;
            }
            for token in &line.tokens {
                if let Some(slice) = text.get(line.offset + token.start..line.offset + token.end) {
                    self.write_styled(slice, &token.style)?;
                }
            }
        }
        self.flush()
    }

    /// Write text with no styling
    pub fn write_plain(&mut self, text: &str) -> Result<()> {
        queue!(self.out, Print(text))?;
        self.flush()
    }

    fn write_styled(&mut self, text: &str, style: &Style) -> Result<()> {
        if !self.color || style.is_default() {
            queue!(self.out, Print(text))?;
            return Ok(());
        }

        if let Some(fg) = style.foreground {
            queue!(self.out, SetForegroundColor(to_crossterm(fg)))?;
        }
        if let Some(bg) = style.background {
            queue!(self.out, SetBackgroundColor(to_crossterm(bg)))?;
        }
        if style.bold == Some(true) {
            queue!(self.out, SetAttribute(Attribute::Bold))?;
        }
        if style.italic == Some(true) {
            queue!(self.out, SetAttribute(Attribute::Italic))?;
        }
        if style.underline == Some(true) {
            queue!(self.out, SetAttribute(Attribute::Underlined))?;
        }
        queue!(self.out, Print(text), SetAttribute(Attribute::Reset), ResetColor)?;
        Ok(())
    }

    /// Flush output buffer
    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Map a theme color onto crossterm's palette
fn to_crossterm(color: Color) -> style::Color {
    match color {
        Color::Black => style::Color::Black,
        Color::Red => style::Color::DarkRed,
        Color::Green => style::Color::DarkGreen,
        Color::Yellow => style::Color::DarkYellow,
        Color::Blue => style::Color::DarkBlue,
        Color::Magenta => style::Color::DarkMagenta,
        Color::Cyan => style::Color::DarkCyan,
        Color::White => style::Color::Grey,
        Color::BrightBlack => style::Color::DarkGrey,
        Color::BrightRed => style::Color::Red,
        Color::BrightGreen => style::Color::Green,
        Color::BrightYellow => style::Color::Yellow,
        Color::BrightBlue => style::Color::Blue,
        Color::BrightMagenta => style::Color::Magenta,
        Color::BrightCyan => style::Color::Cyan,
        Color::BrightWhite => style::Color::White,
        Color::Rgb { r, g, b } => style::Color::Rgb { r, g, b },
    }
}
