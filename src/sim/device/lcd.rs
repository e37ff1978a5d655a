use crate::sim::bus::AccessSize;

use super::{MmDevice, Peripherals};

/// Number of characters on the display (two lines of 16).
pub const LCD_TEXT_LEN: usize = 32;

/// A 2x16 character display.
///
/// Registers (offsets from the device base):
/// - `0`: instruction. `0x01` clears the display, `0x80` moves the cursor to
///   the first line, `0xC0` to the second.
/// - `4`: data. Writes one character at the cursor and advances it.
///
/// When mapped to the board, every change to the text is pushed to the board's screen.
#[derive(Debug)]
pub struct Lcd {
    text: [u8; LCD_TEXT_LEN],
    cursor: usize,
    mapped: bool,
}

impl Lcd {
    /// Creates a blank, unmapped display.
    pub fn new() -> Self {
        Self { text: [0; LCD_TEXT_LEN], cursor: 0, mapped: false }
    }

    /// Maps this display to the board's screen.
    pub fn map_to_board(&mut self) {
        self.mapped = true;
    }

    /// The current text buffer.
    pub fn text(&self) -> &[u8; LCD_TEXT_LEN] {
        &self.text
    }

    fn notify(&self, io: &mut Peripherals) {
        if self.mapped {
            io.board.update_lcd_text(&self.text);
        }
    }
}
impl Default for Lcd {
    fn default() -> Self {
        Self::new()
    }
}

impl MmDevice for Lcd {
    fn mm_read(&mut self, _offset: u32, _size: AccessSize, _io: &mut Peripherals) -> u32 {
        0
    }

    fn mm_write(&mut self, offset: u32, _size: AccessSize, data: u32, io: &mut Peripherals) {
        match (offset, data) {
            (0, 0x01) => {
                self.text = [0; LCD_TEXT_LEN];
                self.cursor = 0;
                self.notify(io);
            },
            (0, 0x80) => self.cursor = 0,
            (0, 0xC0) => self.cursor = LCD_TEXT_LEN / 2,
            (4, _) => {
                self.text[self.cursor] = data as u8;
                self.cursor = (self.cursor + 1) % LCD_TEXT_LEN;
                self.notify(io);
            },
            _ => {}
        }
    }

    fn mm_reset(&mut self, _io: &mut Peripherals) {
        self.text = [0; LCD_TEXT_LEN];
        self.cursor = 0;
    }
}
