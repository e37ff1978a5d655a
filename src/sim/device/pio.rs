use std::str::FromStr;

use crate::sim::board::GroupId;
use crate::sim::bus::AccessSize;

use super::{IrqLine, MmDevice, Peripherals};

/// Direction of a parallel IO port (and of the board device group it mirrors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PioDirection {
    /// Data flows from the board into the program (buttons, switches).
    In,
    /// Data flows from the program out to the board (LEDs).
    Out,
}
impl FromStr for PioDirection {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in"  => Ok(Self::In),
            "out" => Ok(Self::Out),
            _ => Err(())
        }
    }
}
impl std::fmt::Display for PioDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PioDirection::In  => f.write_str("in"),
            PioDirection::Out => f.write_str("out"),
        }
    }
}

/// A parallel IO port.
///
/// Registers (offsets from the device base):
/// - `0`: data. Readable on `in` ports, writable on `out` ports.
/// - `4`: direction (not implemented, reads 0).
/// - `8`: interrupt mask.
/// - `12`: edge capture. Any write clears it.
#[derive(Debug)]
pub struct Pio {
    direction: PioDirection,
    irq: IrqLine,
    group: Option<GroupId>,

    data: u32,
    irq_mask: u32,
    edge_capture: u32,
}

impl Pio {
    /// Creates a port that is not yet bound to a board device group.
    pub fn new(direction: PioDirection, irq: IrqLine) -> Self {
        Self {
            direction,
            irq,
            group: None,
            data: 0,
            irq_mask: 0,
            edge_capture: 0,
        }
    }

    /// The direction of this port.
    pub fn direction(&self) -> PioDirection {
        self.direction
    }

    /// Binds this port to a board device group.
    pub fn set_group(&mut self, group: GroupId) {
        self.group = Some(group);
    }

    /// The board device group this port is bound to.
    pub fn group(&self) -> Option<GroupId> {
        self.group
    }

    /// Reports that an input on the board changed.
    ///
    /// `data` is the group's new value, and `bit` is the position of the device that changed.
    pub fn update_data(&mut self, data: u32, bit: u32) {
        let Some(mask) = 1u32.checked_shl(bit) else { return };

        self.data = data;
        self.edge_capture |= mask;
        if self.irq_mask & mask != 0 {
            self.irq.assert();
        }
    }
}

impl MmDevice for Pio {
    fn mm_read(&mut self, offset: u32, _size: AccessSize, _io: &mut Peripherals) -> u32 {
        match offset {
            0 if self.direction == PioDirection::In => self.data,
            8  => self.irq_mask,
            12 => self.edge_capture,
            _  => 0
        }
    }

    fn mm_write(&mut self, offset: u32, _size: AccessSize, data: u32, io: &mut Peripherals) {
        match offset {
            0 if self.direction == PioDirection::Out => {
                self.data = data;
                if let Some(g) = self.group {
                    io.board.set_group_data(g, data);
                }
            },
            8 => self.irq_mask = data,
            12 => {
                self.edge_capture = 0;
                self.irq.deassert();
            },
            _ => {}
        }
    }

    fn mm_reset(&mut self, io: &mut Peripherals) {
        self.data = 0;
        self.irq_mask = 0;
        self.edge_capture = 0;

        if let Some(g) = self.group {
            if io.board.group(g).is_some_and(|g| g.direction() == PioDirection::In) {
                self.data = io.board.group_data(g);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::sim::board::BoardDeviceKind;
    use crate::sim::device::IrqLines;

    use super::*;

    const IRQ: u32 = 7;

    #[test]
    fn test_edge_capture() {
        let lines = IrqLines::new();
        let mut io = Peripherals::default();
        let mut pio = Pio::new(PioDirection::In, lines.line(Some(IRQ)));

        pio.update_data(0b0100, 2);
        assert_eq!(pio.mm_read(0, AccessSize::Word, &mut io), 0b0100);
        assert_eq!(pio.mm_read(12, AccessSize::Word, &mut io), 0b0100);
        assert_eq!(lines.pending(), 0);

        pio.mm_write(8, AccessSize::Word, 0b0010, &mut io);
        pio.update_data(0b0110, 1);
        assert_eq!(pio.mm_read(12, AccessSize::Word, &mut io), 0b0110);
        assert_eq!(lines.pending(), 1 << IRQ);

        pio.mm_write(12, AccessSize::Word, 0, &mut io);
        assert_eq!(pio.mm_read(12, AccessSize::Word, &mut io), 0);
        assert_eq!(lines.pending(), 0);
    }

    #[test]
    fn test_direction() {
        let mut io = Peripherals::default();
        let g = io.board.add_group("LEDS", PioDirection::Out);
        io.board.add_device(g, BoardDeviceKind::Led, 0);
        io.board.add_device(g, BoardDeviceKind::Led, 3);

        let mut pio = Pio::new(PioDirection::Out, IrqLine::default());
        pio.set_group(g);
        pio.mm_write(0, AccessSize::Word, 0b1001, &mut io);
        assert_eq!(pio.mm_read(0, AccessSize::Word, &mut io), 0);

        let values: Vec<_> = io.board.group(g)
            .into_iter()
            .flat_map(|g| g.devices())
            .map(|d| d.value())
            .collect();
        assert_eq!(values, [1, 1]);
    }

    #[test]
    fn test_reset_loads_group() {
        let mut io = Peripherals::default();
        let g = io.board.add_group("KEYS", PioDirection::In);
        io.board.add_device(g, BoardDeviceKind::Push, 1);
        io.board.add_device(g, BoardDeviceKind::Toggle, 2);

        let mut pio = Pio::new(PioDirection::In, IrqLine::default());
        pio.set_group(g);
        pio.mm_reset(&mut io);
        assert_eq!(pio.mm_read(0, AccessSize::Word, &mut io), 0b010);
    }
}
