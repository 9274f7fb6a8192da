//! Message Rendering
//!
//! Turns decoded frames and session notices into terminal output. Messages
//! are wrapped to three quarters of the terminal width; own messages and
//! others' messages get different markers so the conversation reads as two
//! columns of bubbles.

use crate::editor::LineEditor;
use crate::events::ChatEvent;
use crossterm::{
    cursor, queue,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{self, ClearType},
};
use parley_protocol::{FrameKind, ImageData, MessageFrame};
use std::io::{self, Write};
use tracing::debug;

/// Width used when the terminal size is unknown
pub const FALLBACK_WIDTH: usize = 80;

/// How to present one message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderFlags {
    /// Sent by this client
    pub own: bool,
    /// Sender differs from the previous message's
    pub print_name: bool,
    /// Groups are off, so show the sender's group next to the name
    pub show_group: bool,
    /// Payload is UTF-8
    pub utf8: bool,
    /// Wrap anywhere instead of at word boundaries
    pub ignore_break: bool,
}

fn is_blank(unit: &[u8]) -> bool {
    unit == b" " || unit == b"\t"
}

/// Split into display cells: one byte each, or one code point in UTF-8 mode
fn cells(text: &[u8], utf8: bool) -> Vec<&[u8]> {
    let mut out = Vec::with_capacity(text.len());
    let mut start = 0;
    while start < text.len() {
        let mut end = start + 1;
        if utf8 {
            while end < text.len() && text[end] & 0xC0 == 0x80 {
                end += 1;
            }
        }
        out.push(&text[start..end]);
        start = end;
    }
    out
}

/// Wrap `text` into rows of at most `width` cells
///
/// Unless `ignore_break` is set, a word of up to a third of the width that
/// would straddle a row end moves to the next row, and blanks at the start
/// of a wrapped row are dropped.
pub fn wrap_text(text: &[u8], width: usize, utf8: bool, ignore_break: bool) -> Vec<Vec<u8>> {
    let width = width.max(1);
    let mut rows = Vec::new();
    let mut row: Vec<&[u8]> = Vec::new();
    let mut soft_break = false;

    for cell in cells(text, utf8) {
        if cell == b"\n" {
            rows.push(row.concat());
            row.clear();
            soft_break = false;
            continue;
        }

        let blank = is_blank(cell);
        if row.len() == width {
            let mut carry = Vec::new();
            if !ignore_break && !blank {
                let word = row.iter().rev().take_while(|c| !is_blank(c)).count();
                if word < row.len() && word <= width / 3 {
                    carry = row.split_off(row.len() - word);
                }
            }
            rows.push(row.concat());
            row = carry;
            soft_break = true;
        }

        if blank && soft_break && row.is_empty() && !ignore_break {
            continue;
        }
        soft_break = false;
        row.push(cell);
    }

    if !row.is_empty() || rows.is_empty() {
        rows.push(row.concat());
    }
    rows
}

/// Sender line shown above a run of messages from someone else
pub fn sender_label(frame: &MessageFrame, flags: RenderFlags) -> Option<String> {
    if !flags.print_name || flags.own {
        return None;
    }
    Some(match (&frame.group, flags.show_group) {
        (Some(group), true) => format!("{}@{}:", frame.name, group),
        _ => format!("{}:", frame.name),
    })
}

fn image_label(image: &ImageData) -> String {
    format!("[image {}x{}]", image.width(), image.height())
}

/// Message body rows for a given terminal width
fn body_rows(frame: &MessageFrame, flags: RenderFlags, width: usize) -> Vec<Vec<u8>> {
    let message_width = (width * 3 / 4).max(1);
    match &frame.kind {
        FrameKind::Plain(text) => wrap_text(text, message_width, flags.utf8, flags.ignore_break),
        FrameKind::Image(image) => vec![image_label(image).into_bytes()],
        other => vec![other.name().as_bytes().to_vec()],
    }
}

fn row_marker(own: bool, first: bool, utf8: bool) -> &'static str {
    match (own, first, utf8) {
        (true, true, true) => "◢ ",
        (true, true, false) => "_ ",
        (false, true, true) => "◥ ",
        (false, true, false) => "* ",
        (_, false, _) => "  ",
    }
}

/// Output surface for a chat session
pub trait Renderer {
    /// Show one message
    fn render_frame(&mut self, frame: &MessageFrame, flags: RenderFlags) -> io::Result<()>;

    /// Show a one-line notice
    fn render_status(&mut self, text: &str) -> io::Result<()>;

    /// Redraw the input line
    fn render_prompt(&mut self, editor: &LineEditor) -> io::Result<()>;

    /// Show whatever the session reported
    fn render_event(&mut self, event: &ChatEvent) -> io::Result<()> {
        match event {
            ChatEvent::Message { frame, flags } => self.render_frame(frame, *flags),
            ChatEvent::Dropped { .. } => {
                debug!("{}", event);
                Ok(())
            }
            other => self.render_status(&other.to_string()),
        }
    }
}

/// Uncolored line output, for pipes and tests
pub struct PlainRenderer<W: Write> {
    out: W,
    width: usize,
}

impl<W: Write> PlainRenderer<W> {
    pub fn new(out: W, width: usize) -> Self {
        Self { out, width }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Renderer for PlainRenderer<W> {
    fn render_frame(&mut self, frame: &MessageFrame, flags: RenderFlags) -> io::Result<()> {
        if flags.print_name {
            writeln!(self.out)?;
        }
        if let Some(label) = sender_label(frame, flags) {
            writeln!(self.out, "{}", label)?;
        }
        for (i, row) in body_rows(frame, flags, self.width).iter().enumerate() {
            self.out.write_all(row_marker(flags.own, i == 0, flags.utf8).as_bytes())?;
            self.out.write_all(row)?;
            writeln!(self.out)?;
        }
        self.out.flush()
    }

    fn render_status(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "-- {}", text)?;
        self.out.flush()
    }

    fn render_prompt(&mut self, editor: &LineEditor) -> io::Result<()> {
        self.out.write_all(b"> ")?;
        self.out.write_all(editor.as_bytes())?;
        writeln!(self.out)?;
        self.out.flush()
    }
}

/// Colored output for a terminal in raw mode
pub struct TerminalRenderer<W: Write> {
    out: W,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn width() -> usize {
        terminal::size()
            .map(|(cols, _)| cols as usize)
            .unwrap_or(FALLBACK_WIDTH)
    }

    fn clear_line(&mut self) -> io::Result<()> {
        queue!(self.out, cursor::MoveToColumn(0), terminal::Clear(ClearType::CurrentLine))
    }

    /// Draw an image with half blocks, two pixel rows per text row
    fn render_image(&mut self, image: &ImageData, own: bool) -> io::Result<()> {
        let max_cols = (Self::width() * 3 / 4).max(1) as u32;
        let step = image.width().div_ceil(max_cols).max(1);
        let indent = if own { "  " } else { "   " };

        let mut y = 0;
        while y < image.height() {
            queue!(self.out, Print(indent))?;
            let mut x = 0;
            while x < image.width() {
                let [tr, tg, tb] = image.pixel(x, y).unwrap_or_default();
                let [br, bg, bb] = image.pixel(x, y + step).unwrap_or_default();
                queue!(
                    self.out,
                    SetForegroundColor(Color::Rgb { r: tr, g: tg, b: tb }),
                    SetBackgroundColor(Color::Rgb { r: br, g: bg, b: bb }),
                    Print('▀')
                )?;
                x += step;
            }
            queue!(self.out, ResetColor, Print("\r\n"))?;
            y += step * 2;
        }
        Ok(())
    }
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    fn render_frame(&mut self, frame: &MessageFrame, flags: RenderFlags) -> io::Result<()> {
        self.clear_line()?;
        if flags.print_name {
            queue!(self.out, Print("\r\n"))?;
        }
        if let Some(label) = sender_label(frame, flags) {
            queue!(self.out, Print(label), Print("\r\n"))?;
        }

        if let FrameKind::Image(image) = &frame.kind {
            if flags.utf8 {
                self.render_image(image, flags.own)?;
                return self.out.flush();
            }
        }

        let (fg, bg, accent) = if flags.own {
            (Color::White, Color::Blue, Color::Blue)
        } else {
            (Color::Black, Color::Green, Color::Green)
        };
        let rows = body_rows(frame, flags, Self::width());
        let row_width = rows.iter().map(|r| cells(r, flags.utf8).len()).max().unwrap_or(0);

        for (i, row) in rows.iter().enumerate() {
            let pad = row_width - cells(row, flags.utf8).len();
            queue!(
                self.out,
                SetForegroundColor(accent),
                Print(row_marker(flags.own, i == 0, flags.utf8)),
                SetForegroundColor(fg),
                SetBackgroundColor(bg),
                Print(String::from_utf8_lossy(row)),
                Print(" ".repeat(pad)),
                ResetColor,
                Print("\r\n")
            )?;
        }
        self.out.flush()
    }

    fn render_status(&mut self, text: &str) -> io::Result<()> {
        self.clear_line()?;
        queue!(
            self.out,
            SetForegroundColor(Color::DarkGrey),
            Print(text),
            ResetColor,
            Print("\r\n")
        )?;
        self.out.flush()
    }

    fn render_prompt(&mut self, editor: &LineEditor) -> io::Result<()> {
        self.clear_line()?;
        queue!(
            self.out,
            Print("> "),
            Print(String::from_utf8_lossy(editor.as_bytes())),
            cursor::MoveToColumn(2 + editor.display_cursor() as u16)
        )?;
        self.out.flush()
    }
}
