//! Reading system description (`.sdf`) files.
//!
//! A system description lists the CPUs and memory-mapped devices of a system,
//! the board it is attached to, and how devices map onto the board and consoles:
//!
//! ```text
//! AddCPU "cpu0", 0x0, 0x20, 50000000
//! AddSDRAM "sdram", 0x0, 0x800000
//! AddJTAG "jtag_uart", 0x10001000, 8, 1
//! AddTimer "timer", 0x10002000, 32, 50000000, 1, "ms", 0, 0, 1, 0
//! AddPIO "leds", 0x10000000, 16, "out"
//! ImportBoard "boards/de2.board"
//! Map "jtag_uart", "JTAG"
//! Map "leds", "LEDR"
//! ```
//!
//! [`parse_sdf`] only validates and decodes commands. Building the system from
//! them (and resolving `Map` commands) is done by [`System::load_sdf_with`].
//!
//! [`System::load_sdf_with`]: crate::sim::System::load_sdf_with

use crate::sim::device::{PioDirection, TimerConfig};

use super::{parse_rows, ConfigErr, ParsedRow};

/// A decoded system description command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdfCommand {
    /// `AddCPU "name", reset, exception, freq`
    Cpu {
        /// Device name.
        name: String,
        /// Reset address.
        reset_addr: u32,
        /// Exception address.
        exception_addr: u32,
        /// Clock frequency in Hz.
        freq: u32,
    },
    /// `AddSDRAM "name", base, span`
    Sdram {
        /// Device name.
        name: String,
        /// Base address.
        base: u32,
        /// Size in bytes.
        span: u32,
    },
    /// `AddUART "name", base, span[, irq]`
    Uart {
        /// Device name.
        name: String,
        /// Base address.
        base: u32,
        /// Size in bytes.
        span: u32,
        /// Interrupt line.
        irq: Option<u32>,
    },
    /// `AddJTAG "name", base, span[, irq]`
    Jtag {
        /// Device name.
        name: String,
        /// Base address.
        base: u32,
        /// Size in bytes.
        span: u32,
        /// Interrupt line.
        irq: Option<u32>,
    },
    /// `AddLCD "name", base, span`
    Lcd {
        /// Device name.
        name: String,
        /// Base address.
        base: u32,
        /// Size in bytes.
        span: u32,
    },
    /// `AddTimer "name", base, span, freq, period, unit, fixed, always_run, snapshot[, irq]`
    Timer {
        /// Device name.
        name: String,
        /// Base address.
        base: u32,
        /// Size in bytes.
        span: u32,
        /// Timer configuration, with the period converted to ticks.
        config: TimerConfig,
        /// Interrupt line.
        irq: Option<u32>,
    },
    /// `AddPIO "name", base, span, "in"|"out"[, irq]`
    Pio {
        /// Device name.
        name: String,
        /// Base address.
        base: u32,
        /// Size in bytes.
        span: u32,
        /// Port direction.
        direction: PioDirection,
        /// Interrupt line.
        irq: Option<u32>,
    },
    /// `ImportBoard "path"`
    ImportBoard(String),
    /// `Map "device", "identifier"`
    Map {
        /// Name of the device to bind.
        device: String,
        /// A console (`JTAG`, `UART0`, `UART1`), the board's LCD name, or a board device group name.
        identifier: String,
    },
}

/// Decodes a system description file.
///
/// Unknown commands are skipped.
pub fn parse_sdf(src: &str) -> Result<Vec<SdfCommand>, ConfigErr> {
    let mut commands = vec![];

    for row in parse_rows(src)? {
        let cmd = match &*row.keyword {
            "AddCPU"      => parse_cpu(&row),
            "AddSDRAM"    => parse_region(&row).map(|(name, base, span)| SdfCommand::Sdram { name, base, span }),
            "AddUART"     => parse_irq_region(&row).map(|(name, base, span, irq)| SdfCommand::Uart { name, base, span, irq }),
            "AddJTAG"     => parse_irq_region(&row).map(|(name, base, span, irq)| SdfCommand::Jtag { name, base, span, irq }),
            "AddLCD"      => parse_region(&row).map(|(name, base, span)| SdfCommand::Lcd { name, base, span }),
            "AddTimer"    => parse_timer(&row),
            "AddPIO"      => parse_pio(&row),
            "ImportBoard" => parse_import(&row),
            "Map"         => parse_map(&row),
            kw => {
                log::warn!("line {}: ignoring unknown command {kw}", row.line);
                continue;
            }
        };

        commands.push(cmd.ok_or_else(|| ConfigErr::Command(row.keyword.clone()))?);
    }

    Ok(commands)
}

fn parse_cpu(row: &ParsedRow) -> Option<SdfCommand> {
    if !row.args_match("snnn") { return None; }

    Some(SdfCommand::Cpu {
        name: row.str(0)?.to_string(),
        reset_addr: row.num(1)?,
        exception_addr: row.num(2)?,
        freq: row.num(3)?,
    })
}

fn parse_region(row: &ParsedRow) -> Option<(String, u32, u32)> {
    if !row.args_match("snn") { return None; }
    Some((row.str(0)?.to_string(), row.num(1)?, row.num(2)?))
}

fn parse_irq_region(row: &ParsedRow) -> Option<(String, u32, u32, Option<u32>)> {
    if !row.args_match("snnn?") { return None; }
    Some((row.str(0)?.to_string(), row.num(1)?, row.num(2)?, row.num(3)))
}

fn parse_timer(row: &ParsedRow) -> Option<SdfCommand> {
    if !row.args_match("snnnnsnnnn?") { return None; }

    let freq = row.num(3)?;
    let period = row.num(4)?;
    let ticks_per_unit = match row.str(5)? {
        "ms" => freq / 1_000,
        "us" => freq / 1_000_000,
        _ => return None,
    };

    Some(SdfCommand::Timer {
        name: row.str(0)?.to_string(),
        base: row.num(1)?,
        span: row.num(2)?,
        config: TimerConfig {
            period: period.wrapping_mul(ticks_per_unit),
            fixed_period: row.num(6)? != 0,
            always_run: row.num(7)? != 0,
            has_snapshot: row.num(8)? != 0,
        },
        irq: row.num(9),
    })
}

fn parse_pio(row: &ParsedRow) -> Option<SdfCommand> {
    if !row.args_match("snnsn?") { return None; }

    Some(SdfCommand::Pio {
        name: row.str(0)?.to_string(),
        base: row.num(1)?,
        span: row.num(2)?,
        direction: row.str(3)?.parse().ok()?,
        irq: row.num(4),
    })
}

fn parse_import(row: &ParsedRow) -> Option<SdfCommand> {
    if !row.args_match("s") { return None; }
    Some(SdfCommand::ImportBoard(row.str(0)?.replace('\\', "/")))
}

fn parse_map(row: &ParsedRow) -> Option<SdfCommand> {
    if !row.args_match("ss") { return None; }

    Some(SdfCommand::Map {
        device: row.str(0)?.to_string(),
        identifier: row.str(1)?.to_string(),
    })
}
