use crate::converter::AsciiFrame;
use crate::Result;
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute, queue,
    style::{Color, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
    Command,
};
use log::debug;
use std::io::{stdout, Stdout, Write};

/// Worst-case bytes for one true-color cell: `ESC[38;2;255;255;255m` + glyph + `ESC[0m`
const COLOR_CELL_BYTES: usize = 19 + 4 + 4;

/// One rendered frame: rows joined by line breaks, colour escapes inline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    text: String,
    rows: u32,
    cols: u32,
}

impl TextBlock {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn lines(&self) -> std::str::Lines<'_> {
        self.text.lines()
    }
}

/// Terminal renderer for ASCII frames
pub struct Renderer<W: Write = Stdout> {
    out: W,
    use_colors: bool,
    initialized: bool,
}

impl Renderer<Stdout> {
    /// Renderer writing to standard output
    pub fn stdout(use_colors: bool) -> Self {
        Self::new(stdout(), use_colors)
    }
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W, use_colors: bool) -> Self {
        Self {
            out,
            use_colors,
            initialized: false,
        }
    }

    /// Hide the cursor and clear the screen before playback
    pub fn init(&mut self) -> Result<()> {
        execute!(self.out, Hide, Clear(ClearType::All))?;
        self.initialized = true;
        debug!("Terminal initialized for rendering");
        Ok(())
    }

    /// Restore terminal to normal state
    pub fn cleanup(&mut self) -> Result<()> {
        execute!(self.out, ResetColor, Show)?;
        self.initialized = false;
        debug!("Terminal restored to normal state");
        Ok(())
    }

    pub fn uses_colors(&self) -> bool {
        self.use_colors
    }

    /// Assemble a frame into a text block in one pre-sized buffer
    pub fn render(&self, frame: &AsciiFrame) -> Result<TextBlock> {
        let cols = frame.width as usize;
        let rows = frame.height as usize;
        let colors = if self.use_colors { frame.fg_colors.as_deref() } else { None };

        let cell_bytes = if colors.is_some() { COLOR_CELL_BYTES } else { 4 };
        let mut text = String::with_capacity(rows * (cols * cell_bytes + 1));

        for (y, row) in frame.characters.chunks(cols.max(1)).take(rows).enumerate() {
            if y > 0 {
                text.push('\n');
            }
            for (x, &glyph) in row.iter().enumerate() {
                match colors.and_then(|c| c.get(y * cols + x)) {
                    Some(&(r, g, b)) => {
                        SetForegroundColor(Color::Rgb { r, g, b }).write_ansi(&mut text)?;
                        text.push(glyph);
                        ResetColor.write_ansi(&mut text)?;
                    }
                    None => text.push(glyph),
                }
            }
        }

        Ok(TextBlock {
            text,
            rows: frame.height,
            cols: frame.width,
        })
    }

    /// Home the cursor, clear the screen and print the whole block
    pub fn present(&mut self, block: &TextBlock) -> Result<()> {
        queue!(self.out, MoveTo(0, 0), Clear(ClearType::FromCursorDown))?;
        self.out.write_all(block.as_str().as_bytes())?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }
}

impl<W: Write> Drop for Renderer<W> {
    fn drop(&mut self) {
        // Ensure terminal is restored on drop
        if self.initialized {
            let _ = self.cleanup();
        }
    }
}
