//! Line Editor
//!
//! The input line being composed. Works on raw bytes so that non-UTF-8
//! terminals still get a usable line; in UTF-8 mode cursor movement and
//! deletion step over whole characters.

/// Input line with a byte cursor
#[derive(Debug, Clone, Default)]
pub struct LineEditor {
    buffer: Vec<u8>,
    cursor: usize,
    utf8: bool,
}

fn is_continuation(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}

impl LineEditor {
    /// Create an empty line
    pub fn new(utf8: bool) -> Self {
        Self {
            buffer: Vec::new(),
            cursor: 0,
            utf8,
        }
    }

    /// Insert a character at the cursor; tab becomes a space
    pub fn insert_char(&mut self, c: char) {
        let c = if c == '\t' { ' ' } else { c };
        if self.utf8 {
            let mut encoded = [0u8; 4];
            self.insert_bytes(c.encode_utf8(&mut encoded).as_bytes());
        } else {
            // Latin-1 style: one byte per character
            let byte = u8::try_from(u32::from(c)).unwrap_or(b'?');
            self.insert_bytes(&[byte]);
        }
    }

    fn insert_bytes(&mut self, bytes: &[u8]) {
        self.buffer.splice(self.cursor..self.cursor, bytes.iter().copied());
        self.cursor += bytes.len();
    }

    fn prev_boundary(&self) -> usize {
        let mut pos = self.cursor.saturating_sub(1);
        if self.utf8 {
            while pos > 0 && is_continuation(self.buffer[pos]) {
                pos -= 1;
            }
        }
        pos
    }

    fn next_boundary(&self) -> usize {
        let mut pos = (self.cursor + 1).min(self.buffer.len());
        if self.utf8 {
            while pos < self.buffer.len() && is_continuation(self.buffer[pos]) {
                pos += 1;
            }
        }
        pos
    }

    /// Delete the character before the cursor; false at line start
    pub fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        let start = self.prev_boundary();
        self.buffer.drain(start..self.cursor);
        self.cursor = start;
        true
    }

    pub fn left(&mut self) {
        if self.cursor > 0 {
            self.cursor = self.prev_boundary();
        }
    }

    pub fn right(&mut self) {
        if self.cursor < self.buffer.len() {
            self.cursor = self.next_boundary();
        }
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.buffer.len();
    }

    /// Byte offset of the cursor
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Current contents
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Characters before the cursor, as the terminal sees them
    pub fn display_cursor(&self) -> usize {
        let before = &self.buffer[..self.cursor];
        if self.utf8 {
            before.iter().filter(|b| !is_continuation(**b)).count()
        } else {
            before.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Take the finished line and reset
    pub fn take_line(&mut self) -> Vec<u8> {
        self.cursor = 0;
        std::mem::take(&mut self.buffer)
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
    }
}
