//! Redraw-capable output sinks.

use crossterm::{
    cursor, queue,
    terminal::{Clear, ClearType},
};
use std::io::{self, Write};

/// A line-oriented sink with a single saved anchor position.
pub trait Display {
    /// Remember the current position as the anchor.
    fn save_anchor(&mut self) -> io::Result<()>;

    /// Move back to the last saved anchor.
    fn restore_anchor(&mut self) -> io::Result<()>;

    /// Write `line` over the current line and move to the next one.
    fn write_line(&mut self, line: &str) -> io::Result<()>;

    /// Blank the current line and move to the next one.
    fn write_blank(&mut self) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    fn write_lines(&mut self, lines: &[String]) -> io::Result<()> {
        for line in lines {
            self.write_line(line)?;
        }
        Ok(())
    }

    fn write_blanks(&mut self, count: usize) -> io::Result<()> {
        for _ in 0..count {
            self.write_blank()?;
        }
        Ok(())
    }
}

/// ANSI terminal sink; the anchor is the terminal's saved cursor (DECSC/DECRC).
pub struct TerminalDisplay<W: Write> {
    out: W,
}

impl TerminalDisplay<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalDisplay<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Display for TerminalDisplay<W> {
    fn save_anchor(&mut self) -> io::Result<()> {
        queue!(self.out, cursor::SavePosition)
    }

    fn restore_anchor(&mut self) -> io::Result<()> {
        queue!(self.out, cursor::RestorePosition)
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        write!(self.out, "{}", line)?;
        queue!(self.out, Clear(ClearType::UntilNewLine))?;
        writeln!(self.out)
    }

    fn write_blank(&mut self) -> io::Result<()> {
        queue!(self.out, Clear(ClearType::CurrentLine))?;
        writeln!(self.out)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// In-memory screen that applies display operations the way a terminal
/// would, so the final picture of a run can be inspected.
#[derive(Debug, Default, Clone)]
pub struct VirtualScreen {
    lines: Vec<String>,
    row: usize,
    anchor: usize,
    flushes: usize,
}

impl VirtualScreen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current screen contents, top to bottom.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Current contents with trailing blank rows dropped.
    pub fn text(&self) -> Vec<&str> {
        let end = self
            .lines
            .iter()
            .rposition(|l| !l.is_empty())
            .map_or(0, |i| i + 1);
        self.lines[..end].iter().map(String::as_str).collect()
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }

    fn put(&mut self, line: &str) {
        if self.row >= self.lines.len() {
            self.lines.resize(self.row + 1, String::new());
        }
        self.lines[self.row] = line.to_string();
        self.row += 1;
    }
}

impl Display for VirtualScreen {
    fn save_anchor(&mut self) -> io::Result<()> {
        self.anchor = self.row;
        Ok(())
    }

    fn restore_anchor(&mut self) -> io::Result<()> {
        self.row = self.anchor;
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.put(line);
        Ok(())
    }

    fn write_blank(&mut self) -> io::Result<()> {
        self.put("");
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_escape_sequences() {
        let mut display = TerminalDisplay::new(Vec::new());
        display.save_anchor().unwrap();
        display.write_line("hello").unwrap();
        display.restore_anchor().unwrap();
        display.write_blank().unwrap();
        display.flush().unwrap();

        let out = String::from_utf8(display.into_inner()).unwrap();
        assert_eq!(out, "\x1b7hello\x1b[K\n\x1b8\x1b[2K\n");
    }

    #[test]
    fn test_virtual_screen_overwrites_at_anchor() {
        let mut screen = VirtualScreen::new();
        screen.write_line("header").unwrap();
        screen.save_anchor().unwrap();
        screen.write_line("first").unwrap();
        screen.write_line("tail").unwrap();

        screen.restore_anchor().unwrap();
        screen.write_line("second").unwrap();

        assert_eq!(screen.text(), vec!["header", "second", "tail"]);
        assert_eq!(screen.row(), 2);
    }

    #[test]
    fn test_virtual_screen_blanks() {
        let mut screen = VirtualScreen::new();
        screen.write_line("a").unwrap();
        screen.write_blanks(2).unwrap();
        screen.write_line("b").unwrap();
        assert_eq!(screen.text(), vec!["a", "", "", "b"]);

        screen.restore_anchor().unwrap();
        screen.write_blank().unwrap();
        assert_eq!(screen.text(), vec!["", "", "", "b"]);
    }
}
