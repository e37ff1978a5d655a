//! The CPU core.
//!
//! [`Cpu::on_clock`] runs one instruction cycle:
//! 1. If interrupts are enabled (`status.PIE`) and an enabled IRQ is pending,
//!    take the interrupt and stop there. Nothing is fetched this cycle.
//! 2. Check the PC points at a mapped address. If not, the cycle fails with [`SimErr`].
//! 3. Ask the [`SteppingController`] whether to halt at the PC. If so, report
//!    [`ClockOutcome::Break`]. The next cycle at the same PC runs the instruction.
//! 4. Fetch, advance the PC by 4, then execute.
//!
//! Two kinds of failure exist:
//! - Memory faults (misaligned or unmapped loads and stores) are host-level: the PC is
//!   rewound to the faulting instruction and a [`SimErr`] is returned.
//! - Everything else the ISA has no behavior for (unaligned jump targets, `trap`,
//!   `break`, custom instructions, unknown encodings) is taken as an exception, which
//!   the program handles at its exception address.

use crate::isa::{ctl, op, opx, reg, sign_extend, Instr};

use super::bus::{Access, AccessSize, Bus};
use super::debug::SteppingController;
use super::device::IrqLines;
use super::mem::{CtlRegFile, RegFile};
use super::SimErr;

/// What happened during a [`Cpu::on_clock`] cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOutcome {
    /// An instruction was executed.
    Executed,
    /// A pending interrupt was taken instead of fetching.
    Interrupted,
    /// Execution halted before fetching the instruction at the given address.
    Break(u32),
}

/// A processor core.
#[derive(Debug)]
pub struct Cpu {
    name: String,
    reset_addr: u32,
    exception_addr: u32,
    freq: u32,
    irq: IrqLines,

    // ---- PROCESSOR STATE ----
    reg_file: RegFile,
    ctl: CtlRegFile,
    pc: u32,

    /// Address the CPU last halted at.
    /// The breakpoint check is skipped once when resuming here.
    resume_at: Option<u32>,
}

impl Cpu {
    /// Creates a core. Its PC starts at `reset_addr`.
    pub fn new(name: &str, reset_addr: u32, exception_addr: u32, freq: u32, irq: IrqLines) -> Self {
        Self {
            name: name.to_string(),
            reset_addr,
            exception_addr,
            freq,
            irq,
            reg_file: RegFile::new(),
            ctl: CtlRegFile::default(),
            pc: reset_addr,
            resume_at: None,
        }
    }

    /// The configured name.
    pub fn name(&self) -> &str {
        &self.name
    }
    /// Address the PC is set to on reset.
    pub fn reset_addr(&self) -> u32 {
        self.reset_addr
    }
    /// Address exceptions and interrupts jump to.
    pub fn exception_addr(&self) -> u32 {
        self.exception_addr
    }
    /// The configured clock frequency, in Hz.
    pub fn freq(&self) -> u32 {
        self.freq
    }

    /// Clears every register and moves the PC to the reset address.
    pub fn reset(&mut self) {
        self.reg_file.clear();
        self.ctl.clear();
        self.pc = self.reset_addr;
        self.resume_at = None;
    }

    /// The general purpose registers.
    pub fn regs(&self) -> &RegFile {
        &self.reg_file
    }
    /// Reads a general purpose register.
    pub fn reg(&self, r: usize) -> u32 {
        self.reg_file[r]
    }
    /// Writes a general purpose register. Writes to `r0` are ignored.
    pub fn set_reg(&mut self, r: usize, data: u32) {
        self.reg_file.set(r, data);
    }

    /// The pending IRQs that are also enabled.
    pub fn ipending(&self) -> u32 {
        self.irq.pending() & self.ctl.get(ctl::IENABLE)
    }
    /// Reads a control register. `ipending` is computed from the IRQ lines and `ienable`.
    pub fn ctl(&self, r: usize) -> u32 {
        match r & 0x1F {
            ctl::IPENDING => self.ipending(),
            r => self.ctl.get(r),
        }
    }
    /// Writes a control register. Writes to `ipending` are ignored.
    pub fn set_ctl(&mut self, r: usize, data: u32) {
        self.ctl.set(r, data);
    }

    /// The program counter.
    pub fn pc(&self) -> u32 {
        self.pc
    }
    /// Sets the program counter.
    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
    }

    /// Runs one instruction cycle.
    pub fn on_clock(&mut self, bus: &mut Bus, debug: &mut SteppingController) -> Result<ClockOutcome, SimErr> {
        if self.ctl.get(ctl::STATUS) & ctl::STATUS_PIE != 0 && self.ipending() != 0 {
            self.resume_at = None;
            self.issue_exception(self.pc.wrapping_add(4));
            return Ok(ClockOutcome::Interrupted);
        }

        if !bus.is_valid(self.pc) {
            return Err(SimErr::InvalidRead { addr: self.pc, bits: 32, pc: self.pc });
        }

        if self.resume_at.take() != Some(self.pc) && debug.should_halt(self.pc) {
            self.resume_at = Some(self.pc);
            return Ok(ClockOutcome::Break(self.pc));
        }

        let word = bus.read(self.pc, AccessSize::Word, Access::Fetch);
        self.pc = self.pc.wrapping_add(4);

        let instr = Instr::decode(word);
        match instr.is_r_type() {
            true  => self.execute_r(instr, debug),
            false => self.execute_i(instr, bus, debug)?,
        }
        Ok(ClockOutcome::Executed)
    }

    /// Saves `status`, disables interrupts, and jumps to the exception address.
    ///
    /// `ret` is saved in `ea`.
    pub fn issue_exception(&mut self, ret: u32) {
        let status = self.ctl.get(ctl::STATUS);
        self.ctl.set(ctl::ESTATUS, status);
        self.ctl.set(ctl::STATUS, status & !ctl::STATUS_PIE);
        self.reg_file.set(reg::EA, ret);
        self.pc = self.exception_addr;
    }

    /// Raises an exception for an instruction with no defined behavior.
    /// `ea` points at the instruction itself.
    fn unimplemented(&mut self) {
        self.issue_exception(self.pc.wrapping_sub(4));
    }

    /// Jumps to `addr` if it is word aligned, raising an exception otherwise.
    ///
    /// Returns whether the jump happened.
    fn jump(&mut self, addr: u32) -> bool {
        if addr & 0x3 != 0 {
            self.issue_exception(self.pc);
            return false;
        }
        self.pc = addr;
        true
    }

    fn call(&mut self, addr: u32, debug: &mut SteppingController) {
        if addr & 0x3 != 0 {
            self.issue_exception(self.pc);
            return;
        }
        self.reg_file.set(reg::RA, self.pc);
        debug.enter();
        self.pc = addr;
    }

    fn execute_r(&mut self, i: Instr, debug: &mut SteppingController) {
        let a = self.reg_file[usize::from(i.ra)];
        let b = self.reg_file[usize::from(i.rb)];
        let rc = usize::from(i.rc);
        let imm5 = u32::from(i.imm5);

        match i.opx {
            opx::AND => self.reg_file.set(rc, a & b),
            opx::OR  => self.reg_file.set(rc, a | b),
            opx::XOR => self.reg_file.set(rc, a ^ b),
            opx::NOR => self.reg_file.set(rc, !(a | b)),
            opx::ADD => self.reg_file.set(rc, a.wrapping_add(b)),
            opx::SUB => self.reg_file.set(rc, a.wrapping_sub(b)),

            opx::MUL    => self.reg_file.set(rc, a.wrapping_mul(b)),
            opx::MULXSS => self.reg_file.set(rc, ((i64::from(a as i32) * i64::from(b as i32)) >> 32) as u32),
            opx::MULXSU => self.reg_file.set(rc, ((i64::from(a as i32) * i64::from(b)) >> 32) as u32),
            opx::MULXUU => self.reg_file.set(rc, ((u64::from(a) * u64::from(b)) >> 32) as u32),
            // division by zero leaves rC alone
            opx::DIV  => if b != 0 {
                self.reg_file.set(rc, (a as i32).wrapping_div(b as i32) as u32);
            },
            opx::DIVU => if b != 0 {
                self.reg_file.set(rc, a / b);
            },

            opx::CMPGE  => self.reg_file.set(rc, u32::from(a as i32 >= b as i32)),
            opx::CMPLT  => self.reg_file.set(rc, u32::from((a as i32) < b as i32)),
            opx::CMPGEU => self.reg_file.set(rc, u32::from(a >= b)),
            opx::CMPLTU => self.reg_file.set(rc, u32::from(a < b)),
            opx::CMPNE  => self.reg_file.set(rc, u32::from(a != b)),
            opx::CMPEQ  => self.reg_file.set(rc, u32::from(a == b)),

            opx::ROL  => self.reg_file.set(rc, a.rotate_left(b & 0x1F)),
            opx::ROR  => self.reg_file.set(rc, a.rotate_right(b & 0x1F)),
            opx::ROLI => self.reg_file.set(rc, a.rotate_left(imm5)),
            opx::SLL  => self.reg_file.set(rc, a << (b & 0x1F)),
            opx::SLLI => self.reg_file.set(rc, a << imm5),
            opx::SRL  => self.reg_file.set(rc, a >> (b & 0x1F)),
            opx::SRLI => self.reg_file.set(rc, a >> imm5),
            opx::SRA  => self.reg_file.set(rc, ((a as i32) >> (b & 0x1F)) as u32),
            opx::SRAI => self.reg_file.set(rc, ((a as i32) >> imm5) as u32),

            opx::CALLR => self.call(a, debug),
            opx::JMP => { self.jump(a); },
            opx::RET => {
                if self.jump(self.reg_file[reg::RA]) {
                    debug.ret();
                }
            },
            opx::ERET => {
                self.ctl.set(ctl::STATUS, self.ctl.get(ctl::ESTATUS));
                self.jump(self.reg_file[reg::EA]);
            },
            opx::BRET => {},

            opx::RDCTL  => self.reg_file.set(rc, self.ctl(usize::from(i.imm5))),
            opx::WRCTL  => self.ctl.set(usize::from(i.imm5), a),
            opx::NEXTPC => self.reg_file.set(rc, self.pc),

            // no caches or pipeline to act on
            opx::FLUSHI | opx::INITI | opx::FLUSHP | opx::SYNC => {},

            _ => self.unimplemented(),
        }
    }

    fn execute_i(&mut self, i: Instr, bus: &mut Bus, debug: &mut SteppingController) -> Result<(), SimErr> {
        let a = self.reg_file[usize::from(i.ra)];
        let b = self.reg_file[usize::from(i.rb)];
        let rb = usize::from(i.rb);
        let uimm = u32::from(i.imm16);
        let simm = i.simm16() as u32;

        match i.op {
            op::LDB   | op::LDBU   => self.load(i, AccessSize::Byte, i.op == op::LDB, Access::Data, bus)?,
            op::LDH   | op::LDHU   => self.load(i, AccessSize::Half, i.op == op::LDH, Access::Data, bus)?,
            op::LDW                => self.load(i, AccessSize::Word, false, Access::Data, bus)?,
            op::LDBIO | op::LDBUIO => self.load(i, AccessSize::Byte, i.op == op::LDBIO, Access::Io, bus)?,
            op::LDHIO | op::LDHUIO => self.load(i, AccessSize::Half, i.op == op::LDHIO, Access::Io, bus)?,
            op::LDWIO              => self.load(i, AccessSize::Word, false, Access::Io, bus)?,
            op::STB   => self.store(i, AccessSize::Byte, Access::Data, bus)?,
            op::STH   => self.store(i, AccessSize::Half, Access::Data, bus)?,
            op::STW   => self.store(i, AccessSize::Word, Access::Data, bus)?,
            op::STBIO => self.store(i, AccessSize::Byte, Access::Io, bus)?,
            op::STHIO => self.store(i, AccessSize::Half, Access::Io, bus)?,
            op::STWIO => self.store(i, AccessSize::Word, Access::Io, bus)?,

            op::ANDI  => self.reg_file.set(rb, a & uimm),
            op::ORI   => self.reg_file.set(rb, a | uimm),
            op::XORI  => self.reg_file.set(rb, a ^ uimm),
            op::ANDHI => self.reg_file.set(rb, a & (uimm << 16)),
            op::ORHI  => self.reg_file.set(rb, a | (uimm << 16)),
            op::XORHI => self.reg_file.set(rb, a ^ (uimm << 16)),
            op::ADDI  => self.reg_file.set(rb, a.wrapping_add(simm)),
            op::MULI  => self.reg_file.set(rb, a.wrapping_mul(simm)),

            op::CMPGEI  => self.reg_file.set(rb, u32::from(a as i32 >= simm as i32)),
            op::CMPLTI  => self.reg_file.set(rb, u32::from((a as i32) < simm as i32)),
            op::CMPGEUI => self.reg_file.set(rb, u32::from(a >= uimm)),
            op::CMPLTUI => self.reg_file.set(rb, u32::from(a < simm)),
            op::CMPNEI  => self.reg_file.set(rb, u32::from(a != simm)),
            op::CMPEQI  => self.reg_file.set(rb, u32::from(a == simm)),

            op::CALL => self.call((self.pc & 0xF000_0000) | (i.imm26 << 2), debug),
            op::JMPI => { self.jump((self.pc & 0xF000_0000) | (i.imm26 << 2)); },
            op::BR | op::BEQ | op::BNE | op::BGE | op::BLT | op::BGEU | op::BLTU => {
                let target = self.pc.wrapping_add(simm);
                let taken = match i.op {
                    op::BEQ  => a == b,
                    op::BNE  => a != b,
                    op::BGE  => a as i32 >= b as i32,
                    op::BLT  => (a as i32) < b as i32,
                    op::BGEU => a >= b,
                    op::BLTU => a < b,
                    _ => true,
                };

                // the target is checked even if the branch is not taken
                if target & 0x3 != 0 {
                    self.issue_exception(self.pc);
                } else if taken {
                    self.pc = target;
                }
            },

            op::INITDA | op::INITD | op::FLUSHDA | op::FLUSHD => {},

            _ => self.unimplemented(),
        }
        Ok(())
    }

    fn effective_addr(&self, i: Instr) -> u32 {
        self.reg_file[usize::from(i.ra)].wrapping_add(i.simm16() as u32)
    }

    fn load(&mut self, i: Instr, size: AccessSize, signed: bool, access: Access, bus: &mut Bus) -> Result<(), SimErr> {
        let addr = self.effective_addr(i);
        let bits = size.bits();

        if !size.is_aligned(addr) {
            self.pc = self.pc.wrapping_sub(4);
            return Err(SimErr::MisalignedRead { addr, bits, pc: self.pc });
        }
        if !bus.is_valid(addr) {
            self.pc = self.pc.wrapping_sub(4);
            return Err(SimErr::InvalidRead { addr, bits, pc: self.pc });
        }

        let data = bus.read(addr, size, access);
        let data = match signed {
            true  => sign_extend(data, bits),
            false => data,
        };
        self.reg_file.set(usize::from(i.rb), data);
        Ok(())
    }

    fn store(&mut self, i: Instr, size: AccessSize, access: Access, bus: &mut Bus) -> Result<(), SimErr> {
        let addr = self.effective_addr(i);
        let bits = size.bits();
        let data = self.reg_file[usize::from(i.rb)] & size.mask();

        if !size.is_aligned(addr) {
            self.pc = self.pc.wrapping_sub(4);
            return Err(SimErr::MisalignedWrite { addr, bits, data, pc: self.pc });
        }
        if !bus.is_valid(addr) {
            self.pc = self.pc.wrapping_sub(4);
            return Err(SimErr::InvalidWrite { addr, bits, data, pc: self.pc });
        }

        bus.write(addr, size, data, access);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::sim::device::Sdram;
    use crate::sim::mem::MemInitStrategy;

    use super::*;

    const RAM_SPAN: u32 = 0x1000;
    const EXC: u32 = 0x20;
    /// `add r0, r0, r0`
    const NOP: u32 = 0x0001_883A;

    struct Harness {
        cpu: Cpu,
        bus: Bus,
        debug: SteppingController,
        irq: IrqLines,
    }
    impl Harness {
        fn new(program: &[u32]) -> Self {
            let irq = IrqLines::new();
            let mut bus = Bus::new();
            let mut ram = Sdram::new(RAM_SPAN, MemInitStrategy::Zeroed);
            let bytes: Vec<u8> = program.iter().flat_map(|w| w.to_le_bytes()).collect();
            ram.load(0x100, &bytes);
            bus.add_region("ram", 0, RAM_SPAN, ram);

            let cpu = Cpu::new("cpu0", 0x100, EXC, 50_000_000, irq.clone());
            Self { cpu, bus, debug: SteppingController::new(), irq }
        }
        fn clock(&mut self) -> Result<ClockOutcome, SimErr> {
            self.cpu.on_clock(&mut self.bus, &mut self.debug)
        }
        fn run(&mut self, n: usize) {
            for _ in 0..n {
                assert_eq!(self.clock(), Ok(ClockOutcome::Executed));
            }
        }
    }

    fn i(op: u8, ra: usize, rb: usize, imm16: u16) -> u32 {
        Instr::encode_i(op, ra as u8, rb as u8, imm16)
    }
    fn r(opx: u8, ra: usize, rb: usize, rc: usize) -> u32 {
        Instr::encode_r(opx, ra as u8, rb as u8, rc as u8, 0)
    }
    fn r5(opx: u8, ra: usize, rc: usize, imm5: u8) -> u32 {
        Instr::encode_r(opx, ra as u8, 0, rc as u8, imm5)
    }

    #[test]
    fn test_alu() {
        let mut h = Harness::new(&[
            i(op::ADDI, 0, 2, 0xFFFF),      // r2 = -1
            i(op::ORHI, 0, 3, 0x8000),      // r3 = 0x80000000
            r(opx::ADD, 2, 3, 4),           // r4 = 0x7FFFFFFF
            i(op::ANDI, 2, 5, 0x8001),      // r5 = 0x8001 (zero extended)
            r5(opx::SRAI, 3, 6, 4),         // r6 = 0xF8000000
            r5(opx::SRLI, 3, 7, 4),         // r7 = 0x08000000
            r5(opx::ROLI, 3, 8, 1),         // r8 = 1
            r(opx::NOR, 0, 0, 9),           // r9 = !0
            i(op::ADDI, 0, 0, 5),           // r0 stays 0
        ]);
        h.run(9);
        assert_eq!(h.cpu.reg(2), 0xFFFF_FFFF);
        assert_eq!(h.cpu.reg(3), 0x8000_0000);
        assert_eq!(h.cpu.reg(4), 0x7FFF_FFFF);
        assert_eq!(h.cpu.reg(5), 0x8001);
        assert_eq!(h.cpu.reg(6), 0xF800_0000);
        assert_eq!(h.cpu.reg(7), 0x0800_0000);
        assert_eq!(h.cpu.reg(8), 1);
        assert_eq!(h.cpu.reg(9), 0xFFFF_FFFF);
        assert_eq!(h.cpu.reg(0), 0);
    }

    #[test]
    fn test_multiply_high() {
        let mut h = Harness::new(&[
            r(opx::MULXSS, 2, 3, 4),
            r(opx::MULXSU, 2, 3, 5),
            r(opx::MULXUU, 2, 3, 6),
            r(opx::MUL,    2, 3, 7),
        ]);
        h.cpu.set_reg(2, 0xFFFF_FFFE); // -2
        h.cpu.set_reg(3, 0x0000_0003);
        h.run(4);
        assert_eq!(h.cpu.reg(4), 0xFFFF_FFFF);
        assert_eq!(h.cpu.reg(5), 0xFFFF_FFFF);
        assert_eq!(h.cpu.reg(6), 0x0000_0002);
        assert_eq!(h.cpu.reg(7), 0xFFFF_FFFA);
    }

    #[test]
    fn test_divide() {
        let mut h = Harness::new(&[
            r(opx::DIV,  2, 3, 4),
            r(opx::DIVU, 2, 3, 5),
            r(opx::DIV,  2, 0, 6),
            r(opx::DIVU, 2, 0, 7),
            r(opx::DIV,  8, 9, 10),
        ]);
        h.cpu.set_reg(2, (-7i32) as u32);
        h.cpu.set_reg(3, 2);
        h.cpu.set_reg(6, 0xAAAA);
        h.cpu.set_reg(7, 0xBBBB);
        h.cpu.set_reg(8, i32::MIN as u32);
        h.cpu.set_reg(9, u32::MAX);
        h.run(5);
        assert_eq!(h.cpu.reg(4), (-3i32) as u32);
        assert_eq!(h.cpu.reg(5), 0x7FFF_FFFC);
        assert_eq!(h.cpu.reg(6), 0xAAAA);
        assert_eq!(h.cpu.reg(7), 0xBBBB);
        assert_eq!(h.cpu.reg(10), i32::MIN as u32);
    }

    #[test]
    fn test_compare_immediates() {
        let mut h = Harness::new(&[
            i(op::CMPGEI,  2, 3, 0xFFFF),   // -1 >= -1
            i(op::CMPGEUI, 2, 4, 0xFFFF),   // 0xFFFFFFFF >= 0xFFFF
            i(op::CMPLTI,  2, 5, 0x0000),   // -1 < 0
            i(op::CMPEQI,  2, 6, 0xFFFF),   // sign extended
            i(op::CMPNEI,  2, 7, 0xFFFF),
        ]);
        h.cpu.set_reg(2, u32::MAX);
        h.run(5);
        assert_eq!([3, 4, 5, 6, 7].map(|r| h.cpu.reg(r)), [1, 1, 1, 1, 0]);
    }

    #[test]
    fn test_load_store() {
        let mut h = Harness::new(&[
            i(op::STW, 0, 2, 0x800),
            i(op::LDB, 0, 3, 0x800),
            i(op::LDBU, 0, 4, 0x800),
            i(op::LDH, 0, 5, 0x802),
            i(op::STB, 0, 2, 0x810),
            i(op::LDWIO, 0, 6, 0x810),
        ]);
        h.cpu.set_reg(2, 0x8001_7F80);
        h.run(6);
        assert_eq!(h.cpu.reg(3), 0xFFFF_FF80);
        assert_eq!(h.cpu.reg(4), 0x80);
        assert_eq!(h.cpu.reg(5), 0xFFFF_8001);
        assert_eq!(h.cpu.reg(6), 0x80);
    }

    #[test]
    fn test_memory_faults() {
        let mut h = Harness::new(&[i(op::LDW, 0, 2, 0x802)]);
        let err = h.clock().unwrap_err();
        assert_eq!(err, SimErr::MisalignedRead { addr: 0x802, bits: 32, pc: 0x100 });
        assert_eq!(h.cpu.pc(), 0x100);
        assert_eq!(
            err.to_string(),
            "Misaligned memory address 0x00000802. Unable to read 32 bit data.\nPC: 0x00000100"
        );

        let mut h = Harness::new(&[i(op::STH, 0, 2, 0x7000)]);
        h.cpu.set_reg(2, 0x1234_5678);
        let err = h.clock().unwrap_err();
        assert_eq!(err, SimErr::InvalidWrite { addr: 0x7000, bits: 16, data: 0x5678, pc: 0x100 });
        assert_eq!(
            err.to_string(),
            "Invalid memory address 0x00007000. Unable to write 16 bit data 0x5678.\nPC: 0x00000100"
        );

        let mut h = Harness::new(&[]);
        h.cpu.set_pc(0x2000);
        assert_eq!(h.clock(), Err(SimErr::InvalidRead { addr: 0x2000, bits: 32, pc: 0x2000 }));
    }

    #[test]
    fn test_call_and_return() {
        let mut h = Harness::new(&[
            Instr::encode_j(op::CALL, 0x110 >> 2), // 0x100
            NOP,                                   // 0x104
            NOP,                                   // 0x108
            NOP,                                   // 0x10C
            r(opx::RET, reg::RA, 0, 0),            // 0x110
        ]);
        h.run(1);
        assert_eq!(h.cpu.pc(), 0x110);
        assert_eq!(h.cpu.reg(reg::RA), 0x104);
        assert_eq!(h.debug.depth(), 1);
        h.run(1);
        assert_eq!(h.cpu.pc(), 0x104);
        assert_eq!(h.debug.depth(), 0);
    }

    #[test]
    fn test_branches() {
        let mut h = Harness::new(&[
            i(op::BEQ, 2, 3, 0x0008),  // taken: 0x104 + 8
            NOP,
            NOP,
            i(op::BNE, 2, 3, 0xFFF0),  // not taken
            i(op::BLT, 2, 3, 0x0002),  // misaligned, not taken
        ]);
        h.run(1);
        assert_eq!(h.cpu.pc(), 0x10C);
        h.run(1);
        assert_eq!(h.cpu.pc(), 0x110);
        h.run(1);
        assert_eq!(h.cpu.pc(), EXC);
        assert_eq!(h.cpu.reg(reg::EA), 0x114);
    }

    #[test]
    fn test_unimplemented_exception() {
        let mut h = Harness::new(&[r(opx::TRAP, 0, 0, 0)]);
        h.cpu.set_ctl(ctl::STATUS, 1);
        h.run(1);
        assert_eq!(h.cpu.pc(), EXC);
        assert_eq!(h.cpu.reg(reg::EA), 0x100);
        assert_eq!(h.cpu.ctl(ctl::ESTATUS), 1);
        assert_eq!(h.cpu.ctl(ctl::STATUS), 0);
    }

    #[test]
    fn test_interrupt() {
        let mut h = Harness::new(&[NOP, NOP]);
        h.irq.assert(3);
        h.run(1);
        assert_eq!(h.cpu.ipending(), 0);

        // enabled but PIE clear
        h.cpu.set_ctl(ctl::IENABLE, 1 << 3);
        assert_eq!(h.cpu.ctl(ctl::IPENDING), 1 << 3);
        h.run(1);

        h.cpu.set_ctl(ctl::STATUS, ctl::STATUS_PIE);
        assert_eq!(h.clock(), Ok(ClockOutcome::Interrupted));
        assert_eq!(h.cpu.pc(), EXC);
        assert_eq!(h.cpu.reg(reg::EA), 0x10C);
        assert_eq!(h.cpu.ctl(ctl::STATUS) & ctl::STATUS_PIE, 0);

        h.irq.deassert(3);
        assert_eq!(h.cpu.ctl(ctl::IPENDING), 0);
    }

    #[test]
    fn test_eret_restores_status() {
        let mut h = Harness::new(&[r(opx::ERET, reg::EA, 0, 0)]);
        h.cpu.set_ctl(ctl::ESTATUS, 1);
        h.cpu.set_reg(reg::EA, 0x200);
        h.run(1);
        assert_eq!(h.cpu.pc(), 0x200);
        assert_eq!(h.cpu.ctl(ctl::STATUS), 1);
    }

    #[test]
    fn test_breakpoint_resume() {
        let mut h = Harness::new(&[NOP, NOP]);
        h.debug.add_breakpoint(0x100);
        assert_eq!(h.clock(), Ok(ClockOutcome::Break(0x100)));
        assert_eq!(h.clock(), Ok(ClockOutcome::Executed));
        assert_eq!(h.cpu.pc(), 0x104);
    }

    proptest! {
        #[test]
        fn prop_immediate_matches_register(a in any::<u32>(), imm in any::<u16>()) {
            let simm = i32::from(imm as i16) as u32;
            let pairs = [
                (op::ADDI, opx::ADD, simm),
                (op::ANDI, opx::AND, u32::from(imm)),
                (op::ORI, opx::OR, u32::from(imm)),
                (op::XORI, opx::XOR, u32::from(imm)),
                (op::MULI, opx::MUL, simm),
                (op::CMPLTI, opx::CMPLT, simm),
                (op::CMPGEI, opx::CMPGE, simm),
                (op::CMPGEUI, opx::CMPGEU, u32::from(imm)),
                (op::CMPEQI, opx::CMPEQ, simm),
            ];
            for (iop, ropx, b) in pairs {
                let mut h = Harness::new(&[i(iop, 2, 3, imm), r(ropx, 2, 4, 5)]);
                h.cpu.set_reg(2, a);
                h.cpu.set_reg(4, b);
                h.run(2);
                prop_assert_eq!(h.cpu.reg(3), h.cpu.reg(5));
            }
        }

        #[test]
        fn prop_ipending_is_masked(pending in any::<u32>(), enable in any::<u32>()) {
            let h = Harness::new(&[]);
            let mut cpu = h.cpu;
            for n in 0..32 {
                if pending & (1 << n) != 0 {
                    h.irq.assert(n);
                }
            }
            cpu.set_ctl(ctl::IENABLE, enable);
            cpu.set_ctl(ctl::IPENDING, !enable);
            prop_assert_eq!(cpu.ctl(ctl::IPENDING), pending & enable);
        }
    }
}
