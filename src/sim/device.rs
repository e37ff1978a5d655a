//! Memory-mapped devices attached to the system bus.
//!
//! Every device implements [`MmDevice`], which receives accesses relative to the device's
//! base address. The closed set of device kinds is gathered in the [`Device`] enum,
//! which is what the bus stores.
//!
//! This module provides the devices:
//! - [`Sdram`]: Byte-addressable RAM.
//! - [`Timer`]: Interval timer with optional snapshot registers.
//! - [`Uart`]: Serial port with a one-byte receive register and an input FIFO.
//! - [`Jtag`]: Debug console channel that reports its input FIFO fill level.
//! - [`Pio`]: Parallel IO port, mirroring a board device group.
//! - [`Lcd`]: 2x16 character display.
//!
//! Devices never own their external attachments (console buffers, the board).
//! Those are held in [`Peripherals`] and referenced by handle; the bus passes
//! the peripherals into each access.
//!
//! Interrupts are raised through [`IrqLine`]s, which all share the system's
//! [`IrqLines`] pending word.

mod sdram;
mod timer;
mod uart;
mod jtag;
mod pio;
mod lcd;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

pub use sdram::Sdram;
pub use timer::{Timer, TimerConfig};
pub use uart::{Uart, UartInput};
pub use jtag::{Jtag, JtagInput};
pub use pio::{Pio, PioDirection};
pub use lcd::{Lcd, LCD_TEXT_LEN};

use super::board::Board;
use super::bus::AccessSize;

/// A device that can be accessed through the system bus.
pub trait MmDevice: Send + 'static {
    /// Reads the register at `offset` bytes past the device's base address.
    fn mm_read(&mut self, offset: u32, size: AccessSize, io: &mut Peripherals) -> u32;

    /// Writes the register at `offset` bytes past the device's base address.
    fn mm_write(&mut self, offset: u32, size: AccessSize, data: u32, io: &mut Peripherals);

    /// Resets the device.
    fn mm_reset(&mut self, io: &mut Peripherals);
}

/// The pending interrupt request word shared by every device and CPU of a system.
///
/// Bit `n` is set while IRQ `n` is asserted.
#[derive(Debug, Clone, Default)]
pub struct IrqLines(Arc<AtomicU32>);
impl IrqLines {
    /// Creates a new set of lines with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }
    /// Asserts IRQ `n`. IRQ numbers above 31 are ignored.
    pub fn assert(&self, n: u32) {
        if let Some(bit) = 1u32.checked_shl(n) {
            self.0.fetch_or(bit, Ordering::SeqCst);
        }
    }
    /// Deasserts IRQ `n`. IRQ numbers above 31 are ignored.
    pub fn deassert(&self, n: u32) {
        if let Some(bit) = 1u32.checked_shl(n) {
            self.0.fetch_and(!bit, Ordering::SeqCst);
        }
    }
    /// The currently pending IRQs.
    pub fn pending(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
    /// Deasserts all IRQs.
    pub fn clear(&self) {
        self.0.store(0, Ordering::SeqCst);
    }
    /// Creates a device's view of one line (or of no line, if the device has no IRQ).
    pub fn line(&self, irq: Option<u32>) -> IrqLine {
        IrqLine { lines: self.clone(), irq }
    }
}

/// A device's interrupt line.
///
/// A device configured without an IRQ gets a line that does nothing.
#[derive(Debug, Clone, Default)]
pub struct IrqLine {
    lines: IrqLines,
    irq: Option<u32>
}
impl IrqLine {
    /// Asserts this line.
    pub fn assert(&self) {
        if let Some(n) = self.irq {
            self.lines.assert(n);
        }
    }
    /// Deasserts this line.
    pub fn deassert(&self) {
        if let Some(n) = self.irq {
            self.lines.deassert(n);
        }
    }
    /// The IRQ number, if the device has one.
    pub fn irq(&self) -> Option<u32> {
        self.irq
    }
}

/// One of the fixed console channels a serial device can be mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsoleId {
    /// The JTAG debug console.
    Jtag,
    /// The first UART console.
    Uart0,
    /// The second UART console.
    Uart1,
}
impl ConsoleId {
    /// Parses a `Map` identifier (`JTAG`, `UART0`, `UART1`).
    pub fn from_identifier(s: &str) -> Option<Self> {
        match s {
            "JTAG"  => Some(Self::Jtag),
            "UART0" => Some(Self::Uart0),
            "UART1" => Some(Self::Uart1),
            _ => None
        }
    }
    fn index(self) -> usize {
        match self {
            ConsoleId::Jtag  => 0,
            ConsoleId::Uart0 => 1,
            ConsoleId::Uart1 => 2,
        }
    }
}

/// Character sink for a console channel.
///
/// Bytes written by the program accumulate in a buffer the host can read or drain.
#[derive(Debug, Clone, Default)]
pub struct Console {
    buffer: Arc<RwLock<Vec<u8>>>
}
impl Console {
    /// Gets a reference to the internal buffer of this console.
    pub fn get_buffer(&self) -> &Arc<RwLock<Vec<u8>>> {
        &self.buffer
    }
    /// Removes and returns everything written so far.
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.buffer.write().unwrap_or_else(PoisonError::into_inner))
    }
    fn push(&self, byte: u8) {
        self.buffer.write().unwrap_or_else(PoisonError::into_inner).push(byte);
    }
}

/// External attachments that devices write into: the console channels and the board.
#[derive(Debug, Default)]
pub struct Peripherals {
    consoles: [Console; 3],
    /// The board model (LCD screen and device groups).
    pub board: Board,
}
impl Peripherals {
    /// The console for the given channel.
    pub fn console(&self, id: ConsoleId) -> &Console {
        &self.consoles[id.index()]
    }
}

/// Kind tag of a device, used to check `Map` bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    #[allow(missing_docs)]
    Sdram,
    #[allow(missing_docs)]
    Timer,
    #[allow(missing_docs)]
    Uart,
    #[allow(missing_docs)]
    Jtag,
    #[allow(missing_docs)]
    Pio,
    #[allow(missing_docs)]
    Lcd,
}
impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Sdram => f.write_str("SDRAM"),
            DeviceKind::Timer => f.write_str("timer"),
            DeviceKind::Uart  => f.write_str("UART"),
            DeviceKind::Jtag  => f.write_str("JTAG UART"),
            DeviceKind::Pio   => f.write_str("PIO"),
            DeviceKind::Lcd   => f.write_str("LCD"),
        }
    }
}

/// Any device that can sit on the bus.
#[derive(Debug)]
pub enum Device {
    #[allow(missing_docs)]
    Sdram(Sdram),
    #[allow(missing_docs)]
    Timer(Timer),
    #[allow(missing_docs)]
    Uart(Uart),
    #[allow(missing_docs)]
    Jtag(Jtag),
    #[allow(missing_docs)]
    Pio(Pio),
    #[allow(missing_docs)]
    Lcd(Lcd),
}
impl Device {
    /// The kind tag of this device.
    pub fn kind(&self) -> DeviceKind {
        match self {
            Device::Sdram(_) => DeviceKind::Sdram,
            Device::Timer(_) => DeviceKind::Timer,
            Device::Uart(_)  => DeviceKind::Uart,
            Device::Jtag(_)  => DeviceKind::Jtag,
            Device::Pio(_)   => DeviceKind::Pio,
            Device::Lcd(_)   => DeviceKind::Lcd,
        }
    }
}
impl MmDevice for Device {
    fn mm_read(&mut self, offset: u32, size: AccessSize, io: &mut Peripherals) -> u32 {
        match self {
            Device::Sdram(d) => d.mm_read(offset, size, io),
            Device::Timer(d) => d.mm_read(offset, size, io),
            Device::Uart(d)  => d.mm_read(offset, size, io),
            Device::Jtag(d)  => d.mm_read(offset, size, io),
            Device::Pio(d)   => d.mm_read(offset, size, io),
            Device::Lcd(d)   => d.mm_read(offset, size, io),
        }
    }

    fn mm_write(&mut self, offset: u32, size: AccessSize, data: u32, io: &mut Peripherals) {
        match self {
            Device::Sdram(d) => d.mm_write(offset, size, data, io),
            Device::Timer(d) => d.mm_write(offset, size, data, io),
            Device::Uart(d)  => d.mm_write(offset, size, data, io),
            Device::Jtag(d)  => d.mm_write(offset, size, data, io),
            Device::Pio(d)   => d.mm_write(offset, size, data, io),
            Device::Lcd(d)   => d.mm_write(offset, size, data, io),
        }
    }

    fn mm_reset(&mut self, io: &mut Peripherals) {
        match self {
            Device::Sdram(d) => d.mm_reset(io),
            Device::Timer(d) => d.mm_reset(io),
            Device::Uart(d)  => d.mm_reset(io),
            Device::Jtag(d)  => d.mm_reset(io),
            Device::Pio(d)   => d.mm_reset(io),
            Device::Lcd(d)   => d.mm_reset(io),
        }
    }
}
macro_rules! device_from {
    ($($name:ident),+) => {
        $(
            impl From<$name> for Device {
                fn from(value: $name) -> Self {
                    Device::$name(value)
                }
            }
        )+
    }
}
device_from!(Sdram, Timer, Uart, Jtag, Pio, Lcd);

/// A handle that injects input bytes into a serial device from any thread.
///
/// Obtained from [`crate::sim::System::input_port`].
#[derive(Debug, Clone)]
pub enum InputPort {
    #[allow(missing_docs)]
    Uart(UartInput),
    #[allow(missing_docs)]
    Jtag(JtagInput),
}
impl InputPort {
    /// Appends `text` to the device's input FIFO.
    pub fn send_input(&self, text: &[u8]) {
        match self {
            InputPort::Uart(p) => p.send_input(text),
            InputPort::Jtag(p) => p.send_input(text),
        }
    }
}

/// Locks a device's shared state, recovering it if another thread panicked while holding it.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
