use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::sim::bus::AccessSize;

use super::{lock, ConsoleId, IrqLine, MmDevice, Peripherals};

#[derive(Debug, Default)]
struct RxState {
    rxd: u8,
    rxr: bool,
    irrdy: bool,
    fifo: VecDeque<u8>,
}

/// A serial port.
///
/// Registers (offsets from the device base):
/// - `0`: receive data. Reading returns the held byte and pulls the next one from the input FIFO.
/// - `4`: transmit data. Writing sends the low byte to the mapped console.
/// - `8`: status. `TRDY` in bit 6, `RRDY` in bit 7.
/// - `12`: control. `ITRDY` in bit 6, `IRRDY` in bit 7.
///
/// The receive side is shared with [`UartInput`] handles, so the host can push
/// input while the simulation thread reads it.
#[derive(Debug)]
pub struct Uart {
    rx: Arc<Mutex<RxState>>,
    irq: IrqLine,
    console: Option<ConsoleId>,

    itrdy: bool,
    txr: bool,
    txd: u8,
}

impl Uart {
    /// Creates a serial port, not yet mapped to a console.
    pub fn new(irq: IrqLine) -> Self {
        Self {
            rx: Default::default(),
            irq,
            console: None,
            itrdy: false,
            txr: true,
            txd: 0,
        }
    }

    /// Maps this port's output to a console.
    pub fn set_console(&mut self, console: ConsoleId) {
        self.console = Some(console);
    }

    /// The console this port is mapped to.
    pub fn console(&self) -> Option<ConsoleId> {
        self.console
    }

    /// Creates a handle for pushing input into this port.
    pub fn input(&self) -> UartInput {
        UartInput { rx: Arc::clone(&self.rx), irq: self.irq.clone() }
    }
}

impl MmDevice for Uart {
    fn mm_read(&mut self, offset: u32, _size: AccessSize, _io: &mut Peripherals) -> u32 {
        match offset {
            0 => {
                let mut rx = lock(&self.rx);
                let data = rx.rxd;

                match rx.fifo.pop_front() {
                    Some(b) => {
                        rx.rxd = b;
                        rx.rxr = true;
                    },
                    None => {
                        rx.rxd = 0;
                        rx.rxr = false;
                    }
                }

                if rx.irrdy && !rx.rxr {
                    self.irq.deassert();
                }
                u32::from(data)
            },
            8 => {
                let rxr = lock(&self.rx).rxr;
                u32::from(self.txr) << 6 | u32::from(rxr) << 7
            },
            12 => {
                let irrdy = lock(&self.rx).irrdy;
                u32::from(self.itrdy) << 6 | u32::from(irrdy) << 7
            },
            _ => 0
        }
    }

    fn mm_write(&mut self, offset: u32, _size: AccessSize, data: u32, io: &mut Peripherals) {
        match offset {
            4 => {
                self.txd = data as u8;
                if let Some(id) = self.console {
                    io.console(id).push(self.txd);
                }
                if self.itrdy {
                    self.irq.deassert();
                }
            },
            12 => {
                self.itrdy = data & 0x40 != 0;
                match self.itrdy {
                    true  => self.irq.assert(),
                    false => self.irq.deassert(),
                }
                lock(&self.rx).irrdy = data & 0x80 != 0;
            },
            _ => {}
        }
    }

    fn mm_reset(&mut self, _io: &mut Peripherals) {
        *lock(&self.rx) = RxState::default();
        self.itrdy = false;
        self.txr = true;
        self.txd = 0;
    }
}

/// Handle for pushing host input into a [`Uart`].
#[derive(Debug, Clone)]
pub struct UartInput {
    rx: Arc<Mutex<RxState>>,
    irq: IrqLine,
}
impl UartInput {
    /// Appends `text` to the port's input FIFO.
    ///
    /// If the receive register is empty, the first byte moves into it immediately.
    /// A byte already waiting in the receive register is never overwritten.
    pub fn send_input(&self, text: &[u8]) {
        if text.is_empty() { return; }

        let mut rx = lock(&self.rx);
        rx.fifo.extend(text);

        if !rx.rxr {
            if let Some(b) = rx.fifo.pop_front() {
                rx.rxd = b;
                rx.rxr = true;
            }
        }
        if rx.irrdy {
            self.irq.assert();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::sim::device::IrqLines;

    use super::*;

    const IRQ: u32 = 4;

    fn uart() -> (Uart, IrqLines, Peripherals) {
        let lines = IrqLines::new();
        let mut uart = Uart::new(lines.line(Some(IRQ)));
        uart.set_console(ConsoleId::Uart0);
        (uart, lines, Peripherals::default())
    }

    fn rrdy(uart: &mut Uart, io: &mut Peripherals) -> bool {
        uart.mm_read(8, AccessSize::Word, io) & 0x80 != 0
    }

    #[test]
    fn test_input_read_order() {
        let (mut uart, _, mut io) = uart();
        assert!(!rrdy(&mut uart, &mut io));

        uart.input().send_input(b"AB");
        assert!(rrdy(&mut uart, &mut io));
        assert_eq!(uart.mm_read(0, AccessSize::Word, &mut io), u32::from(b'A'));
        assert!(rrdy(&mut uart, &mut io));
        assert_eq!(uart.mm_read(0, AccessSize::Word, &mut io), u32::from(b'B'));
        assert!(!rrdy(&mut uart, &mut io));
        assert_eq!(uart.mm_read(0, AccessSize::Word, &mut io), 0);
    }

    #[test]
    fn test_pending_byte_kept() {
        let (mut uart, _, mut io) = uart();
        let input = uart.input();
        input.send_input(b"x");
        input.send_input(b"yz");
        input.send_input(b"");

        let read: Vec<_> = (0..3)
            .map(|_| uart.mm_read(0, AccessSize::Word, &mut io) as u8)
            .collect();
        assert_eq!(read, b"xyz");
    }

    #[test]
    fn test_receive_interrupt() {
        let (mut uart, lines, mut io) = uart();
        uart.mm_write(12, AccessSize::Word, 0x80, &mut io);
        assert_eq!(uart.mm_read(12, AccessSize::Word, &mut io), 0x80);
        assert_eq!(lines.pending(), 0);

        uart.input().send_input(b"q");
        assert_eq!(lines.pending(), 1 << IRQ);
        uart.mm_read(0, AccessSize::Word, &mut io);
        assert_eq!(lines.pending(), 0);
    }

    #[test]
    fn test_transmit() {
        let (mut uart, lines, mut io) = uart();
        assert_eq!(uart.mm_read(8, AccessSize::Word, &mut io), 0x40);

        uart.mm_write(12, AccessSize::Word, 0x40, &mut io);
        assert_eq!(lines.pending(), 1 << IRQ);
        uart.mm_write(4, AccessSize::Word, u32::from(b'h'), &mut io);
        assert_eq!(lines.pending(), 0);
        uart.mm_write(4, AccessSize::Word, 0x100 | u32::from(b'i'), &mut io);

        assert_eq!(io.console(ConsoleId::Uart0).take(), b"hi");
    }
}
