use crate::sim::bus::AccessSize;

use super::{IrqLine, MmDevice, Peripherals};

/// Configuration-time parameters of an interval timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimerConfig {
    /// The reset period, in clock ticks.
    pub period: u32,
    /// Whether the period registers ignore writes.
    pub fixed_period: bool,
    /// Whether the STOP control bit is ignored and the timer re-arms after every timeout.
    pub always_run: bool,
    /// Whether the snapshot registers exist.
    pub has_snapshot: bool,
}

/// An interval timer.
///
/// Registers (offsets from the device base):
/// - `0`: status. `TO` in bit 0, `RUN` in bit 1. Any write clears `TO`.
/// - `4`: control. `ITO` in bit 0, `CONT` in bit 1, `START` in bit 2, `STOP` in bit 3.
/// - `8`, `12`: low and high halves of the period.
/// - `16`, `20`: low and high halves of the counter snapshot. Writing either takes a snapshot.
///
/// Once started, a timer with period `P` times out on the `P + 1`-th tick.
#[derive(Debug)]
pub struct Timer {
    config: TimerConfig,
    irq: IrqLine,

    // ---- REGISTERS ----
    period: u32,
    counter: u32,
    snapshot: u32,
    counting: bool,
    to: bool,
    run: bool,
    ito: bool,
    cont: bool,
}

impl Timer {
    /// Creates a timer. It starts in its reset state.
    pub fn new(config: TimerConfig, irq: IrqLine) -> Self {
        Self {
            config,
            irq,
            period: config.period,
            counter: config.period,
            snapshot: 0,
            counting: false,
            to: false,
            run: false,
            ito: false,
            cont: false,
        }
    }

    /// Whether the timer is currently counting down.
    pub fn is_counting(&self) -> bool {
        self.counting
    }

    /// The current period.
    pub fn period(&self) -> u32 {
        self.period
    }

    /// Advances the timer by one clock tick.
    pub fn on_clock(&mut self) {
        if !self.counting { return; }

        if self.counter == 0 {
            if self.ito {
                self.irq.assert();
            }
            self.counter = self.period;
            self.to = true;
            self.run = false;
            self.counting = false;

            if self.config.always_run || self.cont {
                self.run = true;
                self.counting = true;
            }
        } else {
            self.counter -= 1;
        }
    }
}

impl MmDevice for Timer {
    fn mm_read(&mut self, offset: u32, _size: AccessSize, _io: &mut Peripherals) -> u32 {
        match offset {
            0  => u32::from(self.to) | u32::from(self.run) << 1,
            4  => u32::from(self.ito) | u32::from(self.cont) << 1,
            8  => self.period & 0xFFFF,
            12 => self.period >> 16,
            16 if self.config.has_snapshot => self.snapshot & 0xFFFF,
            20 if self.config.has_snapshot => self.snapshot >> 16,
            _  => 0
        }
    }

    fn mm_write(&mut self, offset: u32, _size: AccessSize, data: u32, _io: &mut Peripherals) {
        match offset {
            0 => {
                self.to = false;
                self.irq.deassert();
            },
            4 => {
                self.ito = data & 0x1 != 0;
                if !self.ito {
                    self.irq.deassert();
                }
                self.cont = data & 0x2 != 0;

                if data & 0x4 != 0 {
                    self.run = true;
                    self.counting = true;
                }
                if data & 0x8 != 0 && !self.config.always_run {
                    self.run = false;
                    self.counting = false;
                }
            },
            8 | 12 => {
                self.counting = false;
                if !self.config.fixed_period {
                    self.period = match offset {
                        8 => (self.period & 0xFFFF_0000) | (data & 0xFFFF),
                        _ => (self.period & 0x0000_FFFF) | (data & 0xFFFF) << 16,
                    };
                }
                self.counter = self.period;
            },
            16 | 20 => if self.config.has_snapshot {
                self.snapshot = self.counter;
            },
            _ => {}
        }
    }

    fn mm_reset(&mut self, _io: &mut Peripherals) {
        self.snapshot = 0;
        self.to = false;
        self.run = false;
        self.ito = false;
        self.cont = false;
        self.period = self.config.period;
        self.counting = false;
        self.counter = self.period;
    }
}

#[cfg(test)]
mod tests {
    use crate::sim::device::IrqLines;

    use super::*;

    const IRQ: u32 = 2;

    fn timer(config: TimerConfig) -> (Timer, IrqLines, Peripherals) {
        let lines = IrqLines::new();
        let timer = Timer::new(config, lines.line(Some(IRQ)));
        (timer, lines, Peripherals::default())
    }

    #[test]
    fn test_timeout_after_period_plus_one() {
        let (mut t, lines, mut io) = timer(TimerConfig { period: 5, ..Default::default() });

        // ITO | START
        t.mm_write(4, AccessSize::Word, 0b0101, &mut io);
        for _ in 0..5 {
            t.on_clock();
            assert_eq!(t.mm_read(0, AccessSize::Word, &mut io) & 1, 0);
        }
        t.on_clock();
        assert_eq!(t.mm_read(0, AccessSize::Word, &mut io), 0b01);
        assert_eq!(lines.pending(), 1 << IRQ);
        assert!(!t.is_counting());

        // one-shot: no further timeouts
        t.mm_write(0, AccessSize::Word, 0, &mut io);
        assert_eq!(lines.pending(), 0);
        for _ in 0..20 { t.on_clock(); }
        assert_eq!(t.mm_read(0, AccessSize::Word, &mut io), 0);
        assert_eq!(lines.pending(), 0);
    }

    #[test]
    fn test_continuous() {
        let (mut t, lines, mut io) = timer(TimerConfig { period: 3, ..Default::default() });

        // ITO | CONT | START
        t.mm_write(4, AccessSize::Word, 0b0111, &mut io);
        let mut timeouts = vec![];
        for tick in 1..=12 {
            t.on_clock();
            if t.mm_read(0, AccessSize::Word, &mut io) & 1 != 0 {
                timeouts.push(tick);
                t.mm_write(0, AccessSize::Word, 0, &mut io);
            }
        }
        assert_eq!(timeouts, [4, 8, 12]);
        assert_eq!(t.mm_read(0, AccessSize::Word, &mut io), 0b10);
        assert_eq!(lines.pending(), 0);
    }

    #[test]
    fn test_stop_and_always_run() {
        let (mut t, _, mut io) = timer(TimerConfig { period: 10, ..Default::default() });
        t.mm_write(4, AccessSize::Word, 0b0100, &mut io);
        t.mm_write(4, AccessSize::Word, 0b1000, &mut io);
        assert!(!t.is_counting());

        let (mut t, _, mut io) = timer(TimerConfig { period: 10, always_run: true, ..Default::default() });
        t.mm_write(4, AccessSize::Word, 0b0100, &mut io);
        t.mm_write(4, AccessSize::Word, 0b1000, &mut io);
        assert!(t.is_counting());
    }

    #[test]
    fn test_period_registers() {
        let (mut t, _, mut io) = timer(TimerConfig { period: 0x0001_0002, ..Default::default() });
        t.mm_write(4, AccessSize::Word, 0b0100, &mut io);

        t.mm_write(8, AccessSize::Word, 0xABCD_1234, &mut io);
        assert!(!t.is_counting());
        t.mm_write(12, AccessSize::Word, 0x0000_0007, &mut io);
        assert_eq!(t.period(), 0x0007_1234);
        assert_eq!(t.mm_read(8, AccessSize::Word, &mut io), 0x1234);
        assert_eq!(t.mm_read(12, AccessSize::Word, &mut io), 0x0007);

        t.mm_reset(&mut io);
        assert_eq!(t.period(), 0x0001_0002);

        let (mut fixed, _, mut io) = timer(TimerConfig { period: 9, fixed_period: true, ..Default::default() });
        fixed.mm_write(8, AccessSize::Word, 1, &mut io);
        assert_eq!(fixed.period(), 9);
    }

    #[test]
    fn test_snapshot() {
        let (mut t, _, mut io) = timer(TimerConfig { period: 100, has_snapshot: true, ..Default::default() });
        t.mm_write(4, AccessSize::Word, 0b0100, &mut io);
        for _ in 0..10 { t.on_clock(); }
        t.mm_write(16, AccessSize::Word, 0, &mut io);
        assert_eq!(t.mm_read(16, AccessSize::Word, &mut io), 90);
        assert_eq!(t.mm_read(20, AccessSize::Word, &mut io), 0);

        let (mut t, _, mut io) = timer(TimerConfig { period: 100, ..Default::default() });
        t.mm_write(16, AccessSize::Word, 0, &mut io);
        assert_eq!(t.mm_read(16, AccessSize::Word, &mut io), 0);
    }
}
