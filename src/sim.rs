//! Simulating a Nios II system.
//!
//! This module is focused on executing programs on a configured system (i.e., [`System`]).
//!
//! This module consists of:
//! - [`System`]: The CPUs, the bus with its devices, the board, and the debugger state.
//! - [`cpu`]: The module handling instruction execution.
//! - [`bus`]: The module routing memory accesses to devices.
//! - [`device`]: The module holding every memory-mapped device.
//! - [`board`]: The module modeling the development board (LEDs, buttons, display).
//! - [`debug`]: The module handling breakpoints and stepping modes.
//! - [`mem`]: The module handling registers and RAM initialization.
//! - [`runner`]: The module running a system on a background thread.
//!
//! # Usage
//!
//! A system is configured from a system description (`.sdf`), and then a program
//! (an ELF executable) is loaded into it:
//!
//! ```
//! use niisim::sim::System;
//!
//! let sdf = r#"
//! AddCPU "cpu0", 0x0, 0x20, 50000000
//! AddSDRAM "sdram", 0x0, 0x10000
//! AddJTAG "jtag_uart", 0x10001000, 8
//! Map "jtag_uart", "JTAG"
//! "#;
//!
//! let mut sys = System::new(Default::default());
//! // this description imports no board, so the board reader is never called
//! sys.load_sdf_with(sdf, |_| Err(std::io::ErrorKind::NotFound.into())).unwrap();
//! assert!(sys.is_address_valid(0x1000_1004));
//! assert!(!sys.is_address_valid(0x1000_1008));
//! ```
//!
//! Afterwards, [`System::load_elf`] places the program's segments into RAM and points the
//! first CPU at its entry point. [`System::step`] runs one clock cycle.
//!
//! ## Debugging
//!
//! Breakpoints and the stepping mode live in a [`SteppingController`] shared by every CPU.
//! Address breakpoints are set with [`System::add_breakpoint`], and source-line breakpoints
//! (resolved through the program's debug info) with [`System::add_source_breakpoint`].
//! When a CPU halts, [`System::step`] reports the halting address; stepping again resumes.

pub mod mem;
pub mod debug;
pub mod device;
pub mod bus;
pub mod board;
pub mod cpu;
pub mod runner;

use crate::config::board::parse_board;
use crate::config::sdf::{parse_sdf, SdfCommand};
use crate::config::ConfigErr;
use crate::dbginfo::{DebugInfo, SourcePoint};
use crate::loader::{LoadErr, Program};

use self::board::{BoardAction, BoardDeviceId};
use self::bus::{Bus, DeviceId};
use self::cpu::{ClockOutcome, Cpu};
use self::debug::{DebugMode, SteppingController};
use self::device::{ConsoleId, Device, InputPort, IrqLines, Jtag, Lcd, Pio, Sdram, Timer, Uart};
use self::mem::MemInitStrategy;

/// Errors raised while executing an instruction.
///
/// `pc` is the address of the faulting instruction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimErr {
    /// A load from an address not aligned to its width.
    #[error("Misaligned memory address 0x{addr:08X}. Unable to read {bits} bit data.\nPC: 0x{pc:08X}")]
    MisalignedRead {
        #[allow(missing_docs)]
        addr: u32,
        #[allow(missing_docs)]
        bits: u32,
        #[allow(missing_docs)]
        pc: u32
    },
    /// A store to an address not aligned to its width.
    #[error("Misaligned memory address 0x{addr:08X}. Unable to write {bits} bit data 0x{data:X}.\nPC: 0x{pc:08X}")]
    MisalignedWrite {
        #[allow(missing_docs)]
        addr: u32,
        #[allow(missing_docs)]
        bits: u32,
        #[allow(missing_docs)]
        data: u32,
        #[allow(missing_docs)]
        pc: u32
    },
    /// A load (or instruction fetch) from an address no device is mapped at.
    #[error("Invalid memory address 0x{addr:08X}. Unable to read {bits} bit data.\nPC: 0x{pc:08X}")]
    InvalidRead {
        #[allow(missing_docs)]
        addr: u32,
        #[allow(missing_docs)]
        bits: u32,
        #[allow(missing_docs)]
        pc: u32
    },
    /// A store to an address no device is mapped at.
    #[error("Invalid memory address 0x{addr:08X}. Unable to write {bits} bit data 0x{data:X}.\nPC: 0x{pc:08X}")]
    InvalidWrite {
        #[allow(missing_docs)]
        addr: u32,
        #[allow(missing_docs)]
        bits: u32,
        #[allow(missing_docs)]
        data: u32,
        #[allow(missing_docs)]
        pc: u32
    },
}

/// Errors raised by [`System`] commands.
#[derive(Debug, thiserror::Error)]
pub enum SystemErr {
    /// The system description or board file could not be applied.
    #[error(transparent)]
    Config(#[from] ConfigErr),
    /// The executable could not be loaded.
    #[error(transparent)]
    Load(#[from] LoadErr),
    /// A program was loaded before any system description.
    #[error("Unable to load an .elf file before the system description file (.sdf) has been loaded!")]
    NotConfigured,
    /// A file could not be read.
    #[error("Could not open '{path}': {source}")]
    Io {
        /// The path that was opened.
        path: String,
        /// The underlying error.
        source: std::io::Error
    },
}

/// Configuration flags for [`System`].
///
/// These only take effect the next time a system description or program is loaded.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct SimFlags {
    /// The contents of RAM devices before any program is loaded.
    ///
    /// By default, this is [`MemInitStrategy::Zeroed`].
    pub mem_init: MemInitStrategy,

    /// Whether to start recording a bus trace every time a program is loaded.
    ///
    /// The trace can be read with [`Bus::take_trace`].
    ///
    /// By default, this flag is `false`.
    pub trace: bool,
}

/// A configured system: its CPUs, bus, devices, board, and debugger state.
#[derive(Debug)]
pub struct System {
    cpus: Vec<Cpu>,

    /// The system bus, along with every device and the board.
    pub bus: Bus,
    irq: IrqLines,

    /// Breakpoints and the stepping mode.
    pub debug: SteppingController,
    debug_info: DebugInfo,
    disassembly: String,

    clk: u64,
    /// The CPU to clock next. Only nonzero while a CPU other than the first is halted.
    next_cpu: usize,

    sdf_loaded: bool,
    elf_loaded: bool,

    /// The flags for the system.
    pub flags: SimFlags,
}
impl System where System: Send {}

impl System {
    /// Creates an empty, unconfigured system.
    pub fn new(flags: SimFlags) -> Self {
        Self {
            cpus: vec![],
            bus: Bus::new(),
            irq: IrqLines::new(),
            debug: SteppingController::new(),
            debug_info: DebugInfo::default(),
            disassembly: String::new(),
            clk: 0,
            next_cpu: 0,
            sdf_loaded: false,
            elf_loaded: false,
            flags,
        }
    }

    /// Whether a system description has been loaded successfully.
    pub fn is_configured(&self) -> bool {
        self.sdf_loaded
    }
    /// Whether a program has been loaded successfully.
    pub fn is_loaded(&self) -> bool {
        self.sdf_loaded && self.elf_loaded
    }

    /// The number of clock cycles since the last reset.
    pub fn clk(&self) -> u64 {
        self.clk
    }

    /// All CPUs, in configuration order.
    pub fn cpus(&self) -> &[Cpu] {
        &self.cpus
    }
    /// Gets a CPU.
    pub fn cpu(&self, i: usize) -> Option<&Cpu> {
        self.cpus.get(i)
    }
    /// Gets a CPU mutably (e.g., to edit its registers).
    pub fn cpu_mut(&mut self, i: usize) -> Option<&mut Cpu> {
        self.cpus.get_mut(i)
    }

    /// The debug info of the loaded program.
    pub fn debug_info(&self) -> &DebugInfo {
        &self.debug_info
    }
    /// Disassembly of the loaded program's code sections.
    pub fn disassembly(&self) -> &str {
        &self.disassembly
    }

    /// Runs one clock cycle: one instruction on every CPU, then one tick on every timer.
    ///
    /// If a CPU halts at a breakpoint, the cycle stops there and this returns the
    /// halting address. The next call resumes the cycle at that CPU, running the
    /// instruction it halted at.
    ///
    /// If an instruction fails, the cycle stops there as well. The failing CPU's PC
    /// is left at the faulting instruction.
    pub fn step(&mut self) -> Result<Option<u32>, SimErr> {
        let Self { cpus, bus, debug, next_cpu, clk, .. } = self;

        while let Some(cpu) = cpus.get_mut(*next_cpu) {
            if let ClockOutcome::Break(addr) = cpu.on_clock(bus, debug)? {
                return Ok(Some(addr));
            }
            *next_cpu += 1;
        }
        *next_cpu = 0;

        bus.tick_timers();
        *clk += 1;
        Ok(None)
    }

    /// Resets every CPU and device, and the clock.
    ///
    /// RAM is restored to the program image it was loaded with.
    /// Breakpoints are kept.
    pub fn reset(&mut self) {
        for cpu in &mut self.cpus {
            cpu.reset();
        }
        self.irq.clear();
        self.bus.reset();
        self.debug.reset_depth();
        self.clk = 0;
        self.next_cpu = 0;
    }

    /// Asserts an IRQ line on every CPU.
    pub fn assert_irq(&self, irq: u32) {
        self.irq.assert(irq);
    }
    /// Deasserts an IRQ line on every CPU.
    pub fn deassert_irq(&self, irq: u32) {
        self.irq.deassert(irq);
    }

    /// Whether any device is mapped at `addr`.
    pub fn is_address_valid(&self, addr: u32) -> bool {
        self.bus.is_valid(addr)
    }

    /// Adds a reference to a breakpoint at `addr`.
    pub fn add_breakpoint(&mut self, addr: u32) -> bool {
        self.debug.add_breakpoint(addr)
    }
    /// Removes a reference to a breakpoint at `addr`.
    pub fn remove_breakpoint(&mut self, addr: u32) -> bool {
        self.debug.remove_breakpoint(addr)
    }
    /// Selects the stepping mode the next steps run under.
    pub fn resume(&mut self, mode: DebugMode) {
        self.debug.resume(mode);
    }

    /// Sets breakpoints at a source line, through the program's debug info.
    ///
    /// The line moves down to the first line with code. Returns every source point
    /// that now halts, with its address (see [`DebugInfo::matching_breakpoints`]).
    pub fn add_source_breakpoint(&mut self, file: usize, line: u32) -> Vec<(SourcePoint, u32)> {
        let matches = self.debug_info.matching_breakpoints(file, line);
        if let Some(&(_, addr)) = matches.first() {
            self.debug.add_breakpoint(addr);
        }
        matches
    }
    /// Removes breakpoints set by [`System::add_source_breakpoint`] with the same arguments.
    pub fn remove_source_breakpoint(&mut self, file: usize, line: u32) -> Vec<(SourcePoint, u32)> {
        let matches = self.debug_info.matching_breakpoints(file, line);
        if let Some(&(_, addr)) = matches.first() {
            self.debug.remove_breakpoint(addr);
        }
        matches
    }

    /// Replaces the system's configuration with a system description.
    ///
    /// Board files named by `ImportBoard` are read through `read_board`.
    ///
    /// The previous configuration and program are discarded first, so if this fails,
    /// the system is left unconfigured.
    pub fn load_sdf_with(
        &mut self,
        src: &str,
        mut read_board: impl FnMut(&str) -> std::io::Result<String>
    ) -> Result<(), SystemErr> {
        self.clear();

        for cmd in parse_sdf(src)? {
            self.apply(cmd, &mut read_board)?;
        }

        self.sdf_loaded = true;
        self.reset();
        log::info!("system loaded: {} CPUs, {} devices", self.cpus.len(), self.bus.regions().count());
        Ok(())
    }

    /// Replaces the system's configuration with a system description file.
    ///
    /// Board file paths are opened as written (relative to the working directory).
    pub fn load_sdf_file(&mut self, path: impl AsRef<std::path::Path>) -> Result<(), SystemErr> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path)
            .map_err(|source| SystemErr::Io { path: path.display().to_string(), source })?;

        self.load_sdf_with(&src, |p: &str| std::fs::read_to_string(p))
    }

    fn clear(&mut self) {
        self.cpus.clear();
        self.bus.clear();
        self.bus.io.board = Default::default();
        self.irq.clear();
        self.debug = SteppingController::new();
        self.debug_info = DebugInfo::default();
        self.disassembly.clear();
        self.clk = 0;
        self.next_cpu = 0;
        self.sdf_loaded = false;
        self.elf_loaded = false;
    }

    fn apply(&mut self, cmd: SdfCommand, read_board: &mut impl FnMut(&str) -> std::io::Result<String>) -> Result<(), ConfigErr> {
        match cmd {
            SdfCommand::Cpu { name, reset_addr, exception_addr, freq } => {
                log::debug!("CPU {name}: reset {reset_addr:#010x}, exception {exception_addr:#010x}, {freq} Hz");
                self.cpus.push(Cpu::new(&name, reset_addr, exception_addr, freq, self.irq.clone()));
            },
            SdfCommand::Sdram { name, base, span } => {
                self.add_device(&name, base, span, Sdram::new(span, self.flags.mem_init));
            },
            SdfCommand::Uart { name, base, span, irq } => {
                self.add_device(&name, base, span, Uart::new(self.irq.line(irq)));
            },
            SdfCommand::Jtag { name, base, span, irq } => {
                self.add_device(&name, base, span, Jtag::new(self.irq.line(irq)));
            },
            SdfCommand::Lcd { name, base, span } => {
                self.add_device(&name, base, span, Lcd::new());
            },
            SdfCommand::Timer { name, base, span, config, irq } => {
                self.add_device(&name, base, span, Timer::new(config, self.irq.line(irq)));
            },
            SdfCommand::Pio { name, base, span, direction, irq } => {
                self.add_device(&name, base, span, Pio::new(direction, self.irq.line(irq)));
            },
            SdfCommand::ImportBoard(path) => {
                let src = read_board(&path).map_err(|e| {
                    log::debug!("could not read board file {path}: {e}");
                    ConfigErr::BoardNotFound(path.clone())
                })?;
                self.bus.io.board = parse_board(&src, &path)?;
                log::debug!("board {} imported from {path}", self.bus.io.board.name());
            },
            SdfCommand::Map { device, identifier } => {
                self.map(&device, &identifier)
                    .ok_or_else(|| ConfigErr::Command("Map".to_string()))?;
                log::debug!("mapped {device} to {identifier}");
            },
        }
        Ok(())
    }

    fn add_device(&mut self, name: &str, base: u32, span: u32, device: impl Into<Device>) -> DeviceId {
        let device = device.into();
        log::debug!("{} {name} at {base:#010x}, {span} bytes", device.kind());
        self.bus.add_region(name, base, span, device)
    }

    /// Binds the device named `name` to a console, the board's display, or a board device group.
    fn map(&mut self, name: &str, identifier: &str) -> Option<()> {
        let console = ConsoleId::from_identifier(identifier);
        let is_lcd = self.bus.io.board.lcd_name() == Some(identifier);
        let named: Vec<_> = self.bus.regions()
            .filter(|(_, r)| r.name() == name)
            .map(|(id, _)| id)
            .collect();

        for &id in &named {
            let Some(region) = self.bus.region_mut(id) else { continue };
            match (&mut region.device, console) {
                (Device::Jtag(jtag), Some(ConsoleId::Jtag)) => {
                    jtag.set_console(ConsoleId::Jtag);
                    return Some(());
                },
                (Device::Uart(uart), Some(c @ (ConsoleId::Uart0 | ConsoleId::Uart1))) => {
                    uart.set_console(c);
                    return Some(());
                },
                (Device::Lcd(lcd), _) if is_lcd => {
                    lcd.map_to_board();
                    return Some(());
                },
                _ => {}
            }
        }

        let board = &self.bus.io.board;
        let group = board.find_group(identifier)?;
        let direction = board.group(group)?.direction();

        let pio = named.into_iter().find(|&id| {
            matches!(self.bus.region(id).map(|r| &r.device), Some(Device::Pio(p)) if p.direction() == direction)
        })?;
        if let Some(Device::Pio(p)) = self.bus.region_mut(pio).map(|r| &mut r.device) {
            p.set_group(group);
        }
        self.bus.io.board.bind_pio(group, pio);
        Some(())
    }

    /// Loads an ELF executable into the system's RAM.
    ///
    /// Every segment must fit inside a single RAM device. If any doesn't, nothing is written.
    /// On success, the first CPU's PC is set to the entry point, the debug info is rebuilt,
    /// and all breakpoints are cleared.
    pub fn load_elf(&mut self, data: &[u8]) -> Result<(), SystemErr> {
        if !self.sdf_loaded {
            return Err(SystemErr::NotConfigured);
        }

        self.elf_loaded = false;
        self.bus.stop_trace();

        let program = Program::parse(data)?;
        let mut placements = Vec::with_capacity(program.segments.len());
        for seg in &program.segments {
            let (addr, size) = (u64::from(seg.addr), u64::from(seg.memsz()));
            let ram = self.bus.regions().find(|(_, r)| {
                let (base, span) = (u64::from(r.base()), u64::from(r.span()));
                matches!(r.device, Device::Sdram(_)) && addr >= base && addr + size < base + span
            });

            match ram {
                Some((id, r)) => placements.push((id, seg.addr - r.base(), &seg.data)),
                None => return Err(LoadErr::Unplaced { size: seg.memsz(), addr: seg.addr }.into()),
            }
        }

        for (_, r) in self.bus.regions_mut() {
            if let Device::Sdram(ram) = &mut r.device {
                ram.clear_init();
            }
        }
        for (id, offset, bytes) in placements {
            if let Some(Device::Sdram(ram)) = self.bus.region_mut(id).map(|r| &mut r.device) {
                ram.load(offset, bytes);
            }
        }

        if let Some(cpu) = self.cpus.first_mut() {
            cpu.set_pc(program.entry);
        }
        self.debug_info = DebugInfo::build(data);
        self.debug.clear_breakpoints();
        self.debug.set_source_boundaries(self.debug_info.addresses().iter().copied());
        self.disassembly = program.disassembly().to_string();

        if self.flags.trace {
            self.bus.start_trace();
        }
        self.elf_loaded = true;
        log::info!("program loaded: entry {:#010x}, {} segments", program.entry, program.segments.len());
        Ok(())
    }

    /// Loads an ELF executable file into the system's RAM. See [`System::load_elf`].
    pub fn load_elf_file(&mut self, path: impl AsRef<std::path::Path>) -> Result<(), SystemErr> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|source| SystemErr::Io { path: path.display().to_string(), source })?;

        self.load_elf(&data)
    }

    /// Gets a handle for sending input to the device mapped to a console.
    ///
    /// The handle stays valid until the system is reconfigured, and can be used from any thread.
    pub fn input_port(&self, console: ConsoleId) -> Option<InputPort> {
        self.bus.regions().find_map(|(_, r)| match &r.device {
            Device::Jtag(j) if j.console() == Some(console) => Some(InputPort::Jtag(j.input())),
            Device::Uart(u) if u.console() == Some(console) => Some(InputPort::Uart(u.input())),
            _ => None
        })
    }
    /// Sends input to the device mapped to the JTAG console.
    ///
    /// Returns `false` if no device is mapped to it.
    pub fn send_input_to_jtag(&self, text: &[u8]) -> bool {
        self.send_input(ConsoleId::Jtag, text)
    }
    /// Sends input to the device mapped to the first UART console.
    ///
    /// Returns `false` if no device is mapped to it.
    pub fn send_input_to_uart0(&self, text: &[u8]) -> bool {
        self.send_input(ConsoleId::Uart0, text)
    }
    /// Sends input to the device mapped to the second UART console.
    ///
    /// Returns `false` if no device is mapped to it.
    pub fn send_input_to_uart1(&self, text: &[u8]) -> bool {
        self.send_input(ConsoleId::Uart1, text)
    }
    fn send_input(&self, console: ConsoleId, text: &[u8]) -> bool {
        self.input_port(console)
            .map(|p| p.send_input(text))
            .is_some()
    }

    /// Applies a user action to a board input device, notifying the port bound to its group.
    pub fn update_board_input(&mut self, id: BoardDeviceId, action: BoardAction) {
        let Some(change) = self.bus.io.board.apply(id, action) else { return };
        let Some(pio) = change.pio else { return };

        if let Some(Device::Pio(p)) = self.bus.region_mut(pio).map(|r| &mut r.device) {
            p.update_data(change.data, change.bit);
        }
    }
}
impl Default for System {
    fn default() -> Self {
        Self::new(Default::default())
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use crate::isa::{op, Instr};
    use crate::loader::tests::image;

    use super::bus::{Access, AccessSize};
    use super::*;

    const SDF: &str = r#"
AddCPU "cpu0", 0x0, 0x20, 50000000
AddSDRAM "sdram", 0x0, 0x10000
AddJTAG "jtag_uart", 0x10001000, 8, 1
AddUART "uart", 0x10001010, 16
AddPIO "keys", 0x10000050, 16, "in", 2
AddPIO "leds", 0x10000000, 16, "out"
AddLCD "lcd", 0x10003050, 16
AddTimer "timer", 0x10002000, 32, 50000000, 1, "ms", 0, 0, 1, 0
ImportBoard "de2.board"
Map "jtag_uart", "JTAG"
Map "uart", "UART1"
Map "keys", "KEY"
Map "leds", "LEDR"
Map "lcd", "lcd"
"#;

    const BOARD: &str = r#"
SetName "DE2"
AddDeviceGroup "KEY", "in"
AddDevice "PUSH", "KEY", 1, "key.png", 0, 0
AddDeviceGroup "LEDR", "out"
AddDevice "LED", "LEDR", 0, "led.png", 0, 0
AddLCD "lcd", 0, 0
"#;

    const JTAG_DATA: u32 = 0x1000_1000;
    const KEYS_DATA: u32 = 0x1000_0050;

    fn read_board(path: &str) -> io::Result<String> {
        match path {
            "de2.board" => Ok(BOARD.to_string()),
            _ => Err(io::Error::from(io::ErrorKind::NotFound)),
        }
    }

    fn configured(sdf: &str) -> System {
        let mut sys = System::default();
        sys.load_sdf_with(sdf, read_board).unwrap();
        sys
    }

    /// Writes "hi" to the JTAG console, then loops forever.
    fn hello() -> Vec<u8> {
        [
            Instr::encode_i(op::ORHI, 0, 2, 0x1000),    // 0x00
            Instr::encode_i(op::ORI, 2, 2, 0x1000),     // 0x04
            Instr::encode_i(op::ADDI, 0, 3, 0x68),      // 0x08
            Instr::encode_i(op::STWIO, 2, 3, 0),        // 0x0C
            Instr::encode_i(op::ADDI, 0, 3, 0x69),      // 0x10
            Instr::encode_i(op::STWIO, 2, 3, 0),        // 0x14
            Instr::encode_i(op::BR, 0, 0, 0xFFFC),      // 0x18
        ].iter()
            .flat_map(|w| w.to_le_bytes())
            .collect()
    }

    fn loaded() -> System {
        let mut sys = configured(SDF);
        let code = hello();
        sys.load_elf(&image(0, &[(0, &code[..], code.len() as u32)])).unwrap();
        sys
    }

    #[test]
    fn test_load_sdf() {
        let sys = configured(SDF);
        assert!(sys.is_configured());
        assert!(!sys.is_loaded());
        assert_eq!(sys.cpus().len(), 1);
        assert_eq!(sys.cpu(0).map(Cpu::freq), Some(50_000_000));
        assert_eq!(sys.bus.regions().count(), 7);

        assert!(sys.input_port(ConsoleId::Jtag).is_some());
        assert!(sys.input_port(ConsoleId::Uart1).is_some());
        assert!(sys.input_port(ConsoleId::Uart0).is_none());
        assert_eq!(sys.bus.io.board.name(), "DE2");
    }

    #[test]
    fn test_map_binds_pio() {
        let mut sys = configured(SDF);

        // keys reload their data from the board on reset: the released button reads 1
        assert_eq!(sys.bus.read(KEYS_DATA, AccessSize::Word, Access::Io), 0b10);

        let key = sys.bus.io.board.find_group("KEY").unwrap();
        assert_eq!(sys.bus.io.board.group(key).and_then(|g| g.pio()), sys.bus.find_by_name("keys"));

        let leds = sys.bus.io.board.find_group("LEDR").unwrap();
        sys.bus.write(0x1000_0000, AccessSize::Word, 1, Access::Io);
        let led = sys.bus.io.board.group(leds).map(|g| g.devices()[0].value());
        assert_eq!(led, Some(1));
    }

    #[test]
    fn test_map_failures() {
        let mut sys = System::default();
        let bad_direction = SDF.replace(r#"Map "keys", "KEY""#, r#"Map "keys", "LEDR""#);
        let err = sys.load_sdf_with(&bad_direction, read_board).unwrap_err();
        assert!(matches!(err, SystemErr::Config(ConfigErr::Command(ref c)) if c == "Map"));
        assert_eq!(err.to_string(), "Error while parsing 'Map'");
        assert!(!sys.is_configured());

        let wrong_console = SDF.replace(r#"Map "uart", "UART1""#, r#"Map "uart", "JTAG""#);
        assert!(sys.load_sdf_with(&wrong_console, read_board).is_err());

        let missing_board = SDF.replace("de2.board", "de1.board");
        let err = sys.load_sdf_with(&missing_board, read_board).unwrap_err();
        assert_eq!(err.to_string(), "The board file 'de1.board' does not exist!");
    }

    #[test]
    fn test_elf_before_sdf() {
        let mut sys = System::default();
        let err = sys.load_elf(&image(0, &[])).unwrap_err();
        assert_eq!(err.to_string(), "Unable to load an .elf file before the system description file (.sdf) has been loaded!");
    }

    #[test]
    fn test_run_program() {
        let mut sys = loaded();
        assert!(sys.is_loaded());

        for _ in 0..6 {
            assert_eq!(sys.step(), Ok(None));
        }
        assert_eq!(sys.clk(), 6);
        assert_eq!(sys.cpu(0).map(|c| c.reg(2)), Some(JTAG_DATA));
        assert_eq!(sys.bus.io.console(ConsoleId::Jtag).take(), b"hi");

        // the loop at the end never leaves
        for _ in 0..3 {
            assert_eq!(sys.step(), Ok(None));
        }
        assert_eq!(sys.cpu(0).map(Cpu::pc), Some(0x18));
        assert!(sys.disassembly().is_empty());
    }

    #[test]
    fn test_breakpoints() {
        let mut sys = loaded();
        assert!(sys.add_breakpoint(0x08));

        assert_eq!(sys.step(), Ok(None));
        assert_eq!(sys.step(), Ok(None));
        assert_eq!(sys.step(), Ok(Some(0x08)));
        assert_eq!(sys.clk(), 2);

        // resuming runs the instruction it halted at
        assert_eq!(sys.step(), Ok(None));
        assert_eq!(sys.cpu(0).map(|c| c.reg(3)), Some(0x68));

        sys.resume(DebugMode::StepInstruction);
        assert_eq!(sys.step(), Ok(Some(0x0C)));
        assert!(sys.remove_breakpoint(0x08));
    }

    #[test]
    fn test_reset_restores_image() {
        let mut sys = loaded();
        sys.step().unwrap();
        sys.bus.write(0x00, AccessSize::Word, 0xFFFF_FFFF, Access::Data);

        sys.reset();
        assert_eq!(sys.bus.read(0x00, AccessSize::Word, Access::Data), Instr::encode_i(op::ORHI, 0, 2, 0x1000));
        assert_eq!(sys.cpu(0).map(Cpu::pc), Some(0));
        assert_eq!(sys.cpu(0).map(|c| c.reg(2)), Some(0));
        assert_eq!(sys.clk(), 0);
    }

    #[test]
    fn test_unplaced_segment() {
        let mut sys = loaded();
        let code = hello();

        // a segment running up to the very end of the RAM does not fit
        let err = sys.load_elf(&image(0, &[(0x100, &code[..], 0x10000 - 0x100)])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "A segment of size 65280 bytes with base address 0x00000100 could not be placed in any SDRAM devices!"
        );
        let err = sys.load_elf(&image(0, &[(0, &code[..], code.len() as u32), (0x1000_1000, &code[..], 8)])).unwrap_err();
        assert!(matches!(err, SystemErr::Load(LoadErr::Unplaced { addr: 0x1000_1000, .. })));

        // nothing was written
        assert_eq!(sys.bus.read(0x100, AccessSize::Word, Access::Data), 0);
        assert!(!sys.is_loaded());
    }

    #[test]
    fn test_irq_lines() {
        let sys = configured(SDF);
        sys.assert_irq(5);
        assert_eq!(sys.irq.pending(), 1 << 5);
        sys.deassert_irq(5);
        assert_eq!(sys.irq.pending(), 0);
    }

    #[test]
    fn test_board_input() {
        let mut sys = configured(SDF);
        // enable the key's interrupt
        sys.bus.write(KEYS_DATA + 8, AccessSize::Word, 0b10, Access::Io);

        let key = sys.bus.io.board.find_group("KEY").unwrap();
        let button = sys.bus.io.board.device_ids(key).next().unwrap();
        sys.update_board_input(button, BoardAction::Press);
        assert_eq!(sys.bus.read(KEYS_DATA, AccessSize::Word, Access::Io), 0);
        assert_eq!(sys.bus.read(KEYS_DATA + 12, AccessSize::Word, Access::Io), 0b10);
        assert_eq!(sys.irq.pending(), 1 << 2);

        // output devices ignore input
        let leds = sys.bus.io.board.find_group("LEDR").unwrap();
        let led = sys.bus.io.board.device_ids(leds).next().unwrap();
        sys.update_board_input(led, BoardAction::Press);
        assert_eq!(sys.bus.read(0x1000_0000, AccessSize::Word, Access::Io), 0);
    }

    #[test]
    fn test_send_input() {
        let sys = configured(SDF);
        assert!(sys.send_input_to_jtag(b"ok"));
        assert!(sys.send_input_to_uart1(b"x"));
        assert!(!sys.send_input_to_uart0(b"x"));
    }
}
