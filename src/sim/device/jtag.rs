use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::sim::bus::AccessSize;

use super::{lock, ConsoleId, IrqLine, MmDevice, Peripherals};

/// Free space always reported for the write FIFO.
const WRITE_SPACE: u32 = 64;

#[derive(Debug, Default)]
struct ReadSide {
    fifo: VecDeque<u8>,
    re: bool,
    ri: bool,
    ac: bool,
}

/// A JTAG UART, the debug console channel.
///
/// Registers (offsets from the device base):
/// - `0`: data. A read pops one byte and reports `RVALID` (bit 15) and the number of
///   bytes still waiting (bits 16..=21, saturating at 63). A write sends the low byte
///   to the mapped console.
/// - `4`: control. `RE` bit 0, `WE` bit 1, `RI` bit 8, `WI` bit 9, `AC` bit 10,
///   write FIFO space in bits 16 and up.
#[derive(Debug)]
pub struct Jtag {
    rd: Arc<Mutex<ReadSide>>,
    irq: IrqLine,
    console: Option<ConsoleId>,

    we: bool,
    wi: bool,
}

impl Jtag {
    /// Creates a JTAG UART, not yet mapped to a console.
    pub fn new(irq: IrqLine) -> Self {
        Self {
            rd: Default::default(),
            irq,
            console: None,
            we: false,
            wi: false,
        }
    }

    /// Maps this device's output to a console.
    pub fn set_console(&mut self, console: ConsoleId) {
        self.console = Some(console);
    }

    /// The console this device is mapped to.
    pub fn console(&self) -> Option<ConsoleId> {
        self.console
    }

    /// Creates a handle for pushing input into this device.
    pub fn input(&self) -> JtagInput {
        JtagInput { rd: Arc::clone(&self.rd), irq: self.irq.clone() }
    }
}

impl MmDevice for Jtag {
    fn mm_read(&mut self, offset: u32, _size: AccessSize, _io: &mut Peripherals) -> u32 {
        match offset {
            0 => {
                let mut rd = lock(&self.rd);
                let Some(b) = rd.fifo.pop_front() else { return 0 };

                let remaining = rd.fifo.len().min(63) as u32;
                rd.ri = false;
                self.irq.deassert();

                u32::from(b) | 1 << 15 | remaining << 16
            },
            4 => {
                let rd = lock(&self.rd);
                u32::from(rd.re)
                    | u32::from(self.we) << 1
                    | u32::from(rd.ri) << 8
                    | u32::from(self.wi) << 9
                    | u32::from(rd.ac) << 10
                    | WRITE_SPACE << 16
            },
            _ => 0
        }
    }

    fn mm_write(&mut self, offset: u32, _size: AccessSize, data: u32, io: &mut Peripherals) {
        match offset {
            0 => {
                if let Some(id) = self.console {
                    io.console(id).push(data as u8);
                }
                self.wi = false;
                self.irq.deassert();
            },
            4 => {
                let mut rd = lock(&self.rd);
                rd.re = data & 0x1 != 0;

                if data & 0x2 != 0 {
                    self.we = true;
                    self.wi = true;
                    self.irq.assert();
                    rd.ac = true;
                } else {
                    self.we = false;
                    self.wi = false;
                    self.irq.deassert();
                }

                if data & 0x400 != 0 {
                    rd.ac = false;
                }
            },
            _ => {}
        }
    }

    fn mm_reset(&mut self, _io: &mut Peripherals) {
        *lock(&self.rd) = ReadSide::default();
        self.we = false;
        self.wi = false;
    }
}

/// Handle for pushing host input into a [`Jtag`].
#[derive(Debug, Clone)]
pub struct JtagInput {
    rd: Arc<Mutex<ReadSide>>,
    irq: IrqLine,
}
impl JtagInput {
    /// Appends `text` to the read FIFO.
    pub fn send_input(&self, text: &[u8]) {
        let mut rd = lock(&self.rd);
        rd.fifo.extend(text);

        if rd.re {
            rd.ri = true;
            self.irq.assert();
        }
        rd.ac = true;
    }
}
