//! A Nios II instruction-set simulator.
//!
//! This simulates a system of Nios II CPUs sharing a bus of memory-mapped devices
//! (SDRAM, JTAG and serial consoles, parallel I/O, timers, a character LCD),
//! along with a stepping debugger that understands source lines.
//!
//! # Usage
//!
//! A system is built from a system description (`.sdf`) file, which names its CPUs and
//! devices, and optionally imports a board (`.board`) file describing the buttons,
//! switches, and lights wired to those devices:
//! ```
//! use niisim::sim::System;
//!
//! let sdf = r#"
//! AddCPU "cpu0", 0x0, 0x20, 50000000
//! AddSDRAM "sdram", 0x0, 0x10000
//! AddJTAG "jtag_uart", 0x10001000, 8, 1
//! Map "jtag_uart", "JTAG"
//! "#;
//!
//! let mut sys = System::default();
//! sys.load_sdf_with(sdf, |path| std::fs::read_to_string(path)).unwrap();
//! assert!(sys.is_configured());
//! ```
//!
//! Once configured, a program can be loaded from an executable image and stepped:
//! ```no_run
//! # use niisim::sim::System;
//! # let mut sys = System::default();
//! # sys.load_sdf_file("de2.sdf").unwrap();
//! sys.load_elf_file("program.elf").unwrap();
//! while let Ok(None) = sys.step() {}
//! ```
//!
//! To run a system in the background, see [`sim::runner`].
//! To map addresses back to source lines, see [`dbginfo`].
#![warn(missing_docs)]

pub mod isa;
pub mod sim;
pub mod loader;
pub mod dbginfo;
pub mod config;
