//! Textual disassembly of instruction words.
//!
//! [`Disasm::new`] checks the field constraints of each encoding.
//! Words that do not form a canonical instruction produce `None`.
//!
//! ```
//! use niisim::isa::{Instr, op};
//! use niisim::isa::disasm::Disasm;
//!
//! let word = Instr::encode_i(op::LDW, 27, 2, 8);
//! let dis = Disasm::new(0x0, word).unwrap();
//! assert_eq!(dis.to_string(), "ldw r2, 8(sp)");
//! ```
use std::fmt::Write;

use super::{op, opx, Instr, CTL_NAMES, REG_NAMES};

const I_MNEMONICS: [Option<&str>; 64] = [
    Some("call"),    Some("jmpi"),   None,            Some("ldbu"),   Some("addi"),   Some("stb"),    Some("br"),     Some("ldb"),
    Some("cmpgei"),  None,           None,            Some("ldhu"),   Some("andi"),   Some("sth"),    Some("bge"),    Some("ldh"),
    Some("cmplti"),  None,           None,            Some("initda"), Some("ori"),    Some("stw"),    Some("blt"),    Some("ldw"),
    Some("cmpnei"),  None,           None,            Some("flushda"),Some("xori"),   None,           Some("bne"),    None,
    Some("cmpeqi"),  None,           None,            Some("ldbuio"), Some("muli"),   Some("stbio"),  Some("beq"),    Some("ldbio"),
    Some("cmpgeui"), None,           None,            Some("ldhuio"), Some("andhi"),  Some("sthio"),  Some("bgeu"),   Some("ldhio"),
    Some("cmpltui"), None,           Some("custom"),  Some("initd"),  Some("orhi"),   Some("stwio"),  Some("bltu"),   Some("ldwio"),
    Some("rdprs"),   None,           Some("R"),       Some("flushd"), Some("xorhi"),  None,           None,           None,
];

const R_MNEMONICS: [Option<&str>; 64] = [
    None,            Some("eret"),   Some("roli"),    Some("rol"),    Some("flushp"), Some("ret"),    Some("nor"),    Some("mulxuu"),
    Some("cmpge"),   Some("bret"),   None,            Some("ror"),    Some("flushi"), Some("jmp"),    Some("and"),    None,
    Some("cmplt"),   None,           Some("slli"),    Some("sll"),    Some("wrprs"),  None,           Some("or"),     Some("mulxsu"),
    Some("cmpne"),   None,           Some("srli"),    Some("srl"),    Some("nextpc"), Some("callr"),  Some("xor"),    Some("mulxss"),
    Some("cmpeq"),   None,           None,            None,           Some("divu"),   Some("div"),    Some("rdctl"),  Some("mul"),
    Some("cmpgeu"),  Some("initi"),  None,            None,           None,           Some("trap"),   Some("wrctl"),  None,
    Some("cmpltu"),  Some("add"),    None,            None,           Some("break"),  None,           Some("sync"),   None,
    None,            Some("sub"),    Some("srai"),    Some("sra"),    None,           None,           None,           None,
];

/// R-type instructions of the form `op rC, rA, rB`.
const R_ABC: &[u8] = &[
    opx::ROL, opx::NOR, opx::MULXUU, opx::CMPGE, opx::ROR, opx::AND, opx::CMPLT,
    opx::SLL, opx::OR, opx::MULXSU, opx::CMPNE, opx::SRL, opx::XOR, opx::MULXSS,
    opx::CMPEQ, opx::DIVU, opx::DIV, opx::MUL, opx::CMPGEU, opx::CMPLTU, opx::ADD,
    opx::SUB, opx::SRA,
];
/// R-type instructions of the form `op rC, rA, imm5`.
const R_AC_IMM5: &[u8] = &[opx::ROLI, opx::SLLI, opx::SRLI, opx::SRAI];
/// I-type loads and stores of the form `op rB, imm16(rA)`.
const I_MEM: &[u8] = &[
    op::LDBU, op::STB, op::LDB, op::LDHU, op::STH, op::LDH, op::STW, op::LDW,
    op::LDBUIO, op::STBIO, op::LDBIO, op::LDHUIO, op::STHIO, op::LDHIO, op::STWIO, op::LDWIO,
];

/// An instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// A general register.
    Reg(u8),
    /// A custom-instruction register.
    CustomReg(u8),
    /// A control register.
    Ctl(u8),
    /// A base register plus signed byte offset, written `off(reg)`.
    ByteOffset {
        /// The base register.
        base: u8,
        /// The offset.
        offset: i16,
    },
    /// An integer literal.
    Int(i32),
    /// An absolute address.
    Addr(u32),
}
impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Operand::Reg(r)       => f.write_str(REG_NAMES[usize::from(r & 0x1F)]),
            Operand::CustomReg(r) => write!(f, "c{r}"),
            Operand::Ctl(r)       => f.write_str(CTL_NAMES[usize::from(r & 0x1F)]),
            Operand::ByteOffset { base, offset } => write!(f, "{offset}({})", REG_NAMES[usize::from(base & 0x1F)]),
            Operand::Int(i)       => write!(f, "{i}"),
            Operand::Addr(a)      => write!(f, "{a:#x}"),
        }
    }
}

/// A disassembled instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disasm {
    /// The instruction mnemonic.
    pub mnemonic: &'static str,
    /// The operands, in assembly order.
    pub operands: Vec<Operand>,
}

impl Disasm {
    /// Disassembles `word`, located at address `pc`.
    ///
    /// Returns `None` if the word is not a canonical encoding.
    pub fn new(pc: u32, word: u32) -> Option<Self> {
        use Operand::*;

        let i = Instr::decode(word);
        let mnemonic = I_MNEMONICS[usize::from(i.op)]?;
        let simm = i.imm16 as i16;

        let operands = if i.is_r_type() {
            let mnemonic = R_MNEMONICS[usize::from(i.opx)]?;
            let ops = if R_ABC.contains(&i.opx) {
                if i.imm5 != 0 { return None; }
                vec![Reg(i.rc), Reg(i.ra), Reg(i.rb)]
            } else if R_AC_IMM5.contains(&i.opx) {
                if i.rb != 0 { return None; }
                vec![Reg(i.rc), Reg(i.ra), Int(i.imm5.into())]
            } else {
                match i.opx {
                    opx::ERET => {
                        if (i.ra, i.rb, i.rc, i.imm5) != (29, 30, 0, 0) { return None; }
                        vec![]
                    },
                    opx::FLUSHP | opx::SYNC => {
                        if (i.ra | i.rb | i.rc | i.imm5) != 0 { return None; }
                        vec![]
                    },
                    opx::RET => {
                        if i.ra != 31 || (i.rb | i.rc | i.imm5) != 0 { return None; }
                        vec![]
                    },
                    opx::BRET => {
                        if i.ra != 30 || (i.rb | i.rc | i.imm5) != 0 { return None; }
                        vec![]
                    },
                    opx::FLUSHI | opx::JMP | opx::INITI => {
                        if (i.rb | i.rc | i.imm5) != 0 { return None; }
                        vec![Reg(i.ra)]
                    },
                    opx::WRPRS => {
                        if (i.rb | i.imm5) != 0 { return None; }
                        vec![Reg(i.rc), Reg(i.ra)]
                    },
                    opx::NEXTPC => {
                        if (i.ra | i.rb | i.imm5) != 0 { return None; }
                        vec![Reg(i.rc)]
                    },
                    opx::CALLR => {
                        if (i.rb | i.imm5) != 0 || i.rc != 31 { return None; }
                        vec![Reg(i.ra)]
                    },
                    opx::RDCTL => {
                        if (i.ra | i.rb) != 0 { return None; }
                        vec![Reg(i.rc), Ctl(i.imm5)]
                    },
                    opx::WRCTL => {
                        if (i.rb | i.rc) != 0 { return None; }
                        vec![Ctl(i.imm5), Reg(i.ra)]
                    },
                    opx::TRAP | opx::BREAK => {
                        let link = if i.opx == opx::TRAP { 29 } else { 30 };
                        if (i.ra | i.rb) != 0 || i.rc != link { return None; }
                        match i.imm5 {
                            0 => vec![],
                            n => vec![Int(n.into())],
                        }
                    },
                    _ => return None,
                }
            };
            return Some(Self { mnemonic, operands: ops });
        } else if i.op == op::CALL || i.op == op::JMPI {
            vec![Addr((pc & 0xF000_0000) | (i.imm26 << 2))]
        } else if i.op == op::CUSTOM {
            let a = (word >> 16) & 1 != 0;
            let b = (word >> 15) & 1 != 0;
            let c = (word >> 14) & 1 != 0;
            let n = (word >> 6) & 0xFF;
            let pick = |is_gp: bool, r: u8| if is_gp { Reg(r) } else { CustomReg(r) };
            vec![Int(n as i32), pick(c, i.rc), pick(a, i.ra), pick(b, i.rb)]
        } else if i.op & 0x3 == 0 {
            vec![Reg(i.rb), Reg(i.ra), Int(simm.into())]
        } else if I_MEM.contains(&i.op) {
            vec![Reg(i.rb), ByteOffset { base: i.ra, offset: simm }]
        } else if i.op & 0x7 == 0x6 {
            let target = pc.wrapping_add(4).wrapping_add_signed(simm.into());
            if i.op == op::BR {
                if (i.ra | i.rb) != 0 { return None; }
                vec![Addr(target)]
            } else {
                vec![Reg(i.ra), Reg(i.rb), Addr(target)]
            }
        } else {
            if i.rb != 0 { return None; }
            vec![ByteOffset { base: i.ra, offset: simm }]
        };

        Some(Self { mnemonic, operands })
    }
}
impl std::fmt::Display for Disasm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic)?;
        for (i, operand) in self.operands.iter().enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            write!(f, "{operand}")?;
        }
        Ok(())
    }
}

/// Disassembles a run of words starting at `base`, one `addr: word mnemonic` line each.
///
/// Non-canonical words produce an empty mnemonic.
pub fn listing(base: u32, words: &[u32]) -> String {
    let mut out = String::new();
    for (i, &word) in words.iter().enumerate() {
        let addr = base.wrapping_add(4 * i as u32);
        let text = Disasm::new(addr, word).map(|d| d.to_string()).unwrap_or_default();
        // writing into a String cannot fail
        let _ = writeln!(out, "{addr:08x}: {word:08x} {text}");
    }
    out
}
