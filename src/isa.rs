//! Instruction encoding for the simulated CPU.
//!
//! Every 32-bit word decodes into an [`Instr`] record. There are three encoding shapes,
//! all sharing the low 6 bits as the opcode:
//!
//! ```text
//! I-type:  | rA:5 | rB:5 |         imm16:16          | op:6 |
//! R-type:  | rA:5 | rB:5 | rC:5 | opx:6 |   imm5:5   | op:6 |   (op == 0x3A)
//! J-type:  |               imm26:26                  | op:6 |
//! ```
//!
//! Decoding is total. Whether a record is a legal instruction is only decided
//! when the CPU executes it (see [`crate::sim::cpu`]).
//!
//! ```
//! use niisim::isa::{Instr, op};
//!
//! // addi r2, r0, -1
//! let word = Instr::encode_i(op::ADDI, 0, 2, 0xFFFF);
//! let instr = Instr::decode(word);
//! assert_eq!(instr.op, op::ADDI);
//! assert_eq!(instr.rb, 2);
//! assert_eq!(instr.simm16(), -1);
//! ```
pub mod disasm;

/// I-type and J-type opcodes (the `op` field).
pub mod op {
    #![allow(missing_docs)]

    pub const CALL: u8    = 0x00;
    pub const JMPI: u8    = 0x01;
    pub const LDBU: u8    = 0x03;
    pub const ADDI: u8    = 0x04;
    pub const STB: u8     = 0x05;
    pub const BR: u8      = 0x06;
    pub const LDB: u8     = 0x07;
    pub const CMPGEI: u8  = 0x08;
    pub const LDHU: u8    = 0x0B;
    pub const ANDI: u8    = 0x0C;
    pub const STH: u8     = 0x0D;
    pub const BGE: u8     = 0x0E;
    pub const LDH: u8     = 0x0F;
    pub const CMPLTI: u8  = 0x10;
    pub const INITDA: u8  = 0x13;
    pub const ORI: u8     = 0x14;
    pub const STW: u8     = 0x15;
    pub const BLT: u8     = 0x16;
    pub const LDW: u8     = 0x17;
    pub const CMPNEI: u8  = 0x18;
    pub const FLUSHDA: u8 = 0x1B;
    pub const XORI: u8    = 0x1C;
    pub const BNE: u8     = 0x1E;
    pub const CMPEQI: u8  = 0x20;
    pub const LDBUIO: u8  = 0x23;
    pub const MULI: u8    = 0x24;
    pub const STBIO: u8   = 0x25;
    pub const BEQ: u8     = 0x26;
    pub const LDBIO: u8   = 0x27;
    pub const CMPGEUI: u8 = 0x28;
    pub const LDHUIO: u8  = 0x2B;
    pub const ANDHI: u8   = 0x2C;
    pub const STHIO: u8   = 0x2D;
    pub const BGEU: u8    = 0x2E;
    pub const LDHIO: u8   = 0x2F;
    pub const CMPLTUI: u8 = 0x30;
    pub const CUSTOM: u8  = 0x32;
    pub const INITD: u8   = 0x33;
    pub const ORHI: u8    = 0x34;
    pub const STWIO: u8   = 0x35;
    pub const BLTU: u8    = 0x36;
    pub const LDWIO: u8   = 0x37;
    pub const RDPRS: u8   = 0x38;
    pub const R_TYPE: u8  = 0x3A;
    pub const FLUSHD: u8  = 0x3B;
    pub const XORHI: u8   = 0x3C;
}

/// R-type extended opcodes (the `opx` field, valid when `op == R_TYPE`).
pub mod opx {
    #![allow(missing_docs)]

    pub const ERET: u8   = 0x01;
    pub const ROLI: u8   = 0x02;
    pub const ROL: u8    = 0x03;
    pub const FLUSHP: u8 = 0x04;
    pub const RET: u8    = 0x05;
    pub const NOR: u8    = 0x06;
    pub const MULXUU: u8 = 0x07;
    pub const CMPGE: u8  = 0x08;
    pub const BRET: u8   = 0x09;
    pub const ROR: u8    = 0x0B;
    pub const FLUSHI: u8 = 0x0C;
    pub const JMP: u8    = 0x0D;
    pub const AND: u8    = 0x0E;
    pub const CMPLT: u8  = 0x10;
    pub const SLLI: u8   = 0x12;
    pub const SLL: u8    = 0x13;
    pub const WRPRS: u8  = 0x14;
    pub const OR: u8     = 0x16;
    pub const MULXSU: u8 = 0x17;
    pub const CMPNE: u8  = 0x18;
    pub const SRLI: u8   = 0x1A;
    pub const SRL: u8    = 0x1B;
    pub const NEXTPC: u8 = 0x1C;
    pub const CALLR: u8  = 0x1D;
    pub const XOR: u8    = 0x1E;
    pub const MULXSS: u8 = 0x1F;
    pub const CMPEQ: u8  = 0x20;
    pub const DIVU: u8   = 0x24;
    pub const DIV: u8    = 0x25;
    pub const RDCTL: u8  = 0x26;
    pub const MUL: u8    = 0x27;
    pub const CMPGEU: u8 = 0x28;
    pub const INITI: u8  = 0x29;
    pub const TRAP: u8   = 0x2D;
    pub const WRCTL: u8  = 0x2E;
    pub const CMPLTU: u8 = 0x30;
    pub const ADD: u8    = 0x31;
    pub const BREAK: u8  = 0x34;
    pub const SYNC: u8   = 0x36;
    pub const SUB: u8    = 0x39;
    pub const SRAI: u8   = 0x3A;
    pub const SRA: u8    = 0x3B;
}

/// Conventional general register numbers.
pub mod reg {
    #![allow(missing_docs)]

    pub const ZERO: usize = 0;
    pub const AT: usize = 1;
    pub const ET: usize = 24;
    pub const BT: usize = 25;
    pub const GP: usize = 26;
    pub const SP: usize = 27;
    pub const FP: usize = 28;
    /// Exception return address.
    pub const EA: usize = 29;
    /// Breakpoint return address.
    pub const BA: usize = 30;
    /// Call return address.
    pub const RA: usize = 31;
}

/// Control register numbers with defined behavior.
pub mod ctl {
    #![allow(missing_docs)]

    pub const STATUS: usize = 0;
    pub const ESTATUS: usize = 1;
    pub const BSTATUS: usize = 2;
    pub const IENABLE: usize = 3;
    /// Read-only; computed from the pending IRQ lines and `ienable`.
    pub const IPENDING: usize = 4;

    /// Processor interrupt-enable bit of `status`.
    pub const STATUS_PIE: u32 = 0x1;
}

/// ABI names of the general registers, indexed by register number.
pub const REG_NAMES: [&str; 32] = [
    "r0",  "at",  "r2",  "r3",  "r4",  "r5",  "r6",  "r7",
    "r8",  "r9",  "r10", "r11", "r12", "r13", "r14", "r15",
    "r16", "r17", "r18", "r19", "r20", "r21", "r22", "r23",
    "et",  "bt",  "gp",  "sp",  "fp",  "ea",  "ba",  "ra",
];

/// Names of the control registers, indexed by register number.
pub const CTL_NAMES: [&str; 32] = [
    "status",  "estatus", "bstatus", "ienable",
    "ipending", "cpuid",  "ctl6",    "exception",
    "pteaddr", "tlbacc",  "tlbmisc", "ctl11",
    "badaddr", "config",  "mpubase", "mpuacc",
    "ctl16",   "ctl17",   "ctl18",   "ctl19",
    "ctl20",   "ctl21",   "ctl22",   "ctl23",
    "ctl24",   "ctl25",   "ctl26",   "ctl27",
    "ctl28",   "ctl29",   "ctl30",   "ctl31",
];

/// A decoded instruction word.
///
/// All views of the word are extracted at once; which ones are meaningful
/// depends on the opcode. The record only lives for a single execute call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instr {
    /// Opcode, bits `[0:6]`.
    pub op: u8,
    /// R-type extended opcode, bits `[11:17]`.
    pub opx: u8,
    /// R-type 5-bit field, bits `[6:11]`.
    ///
    /// This holds shift amounts, control register indices, and trap/break codes.
    pub imm5: u8,
    /// 16-bit immediate, bits `[6:22]`.
    pub imm16: u16,
    /// 26-bit immediate, bits `[6:32]`.
    pub imm26: u32,
    /// Register A, bits `[27:32]`.
    pub ra: u8,
    /// Register B, bits `[22:27]`.
    pub rb: u8,
    /// Register C, bits `[17:22]`.
    pub rc: u8,
}

impl Instr {
    /// Decodes a 32-bit word.
    pub fn decode(word: u32) -> Self {
        Self {
            op:    (word & 0x3F) as u8,
            opx:   ((word >> 11) & 0x3F) as u8,
            imm5:  ((word >> 6) & 0x1F) as u8,
            imm16: ((word >> 6) & 0xFFFF) as u16,
            imm26: (word >> 6) & 0x3FF_FFFF,
            ra:    ((word >> 27) & 0x1F) as u8,
            rb:    ((word >> 22) & 0x1F) as u8,
            rc:    ((word >> 17) & 0x1F) as u8,
        }
    }

    /// The 16-bit immediate, sign-extended.
    pub fn simm16(&self) -> i32 {
        sign_extend(u32::from(self.imm16), 16) as i32
    }

    /// Whether this is an R-type instruction.
    pub fn is_r_type(&self) -> bool {
        self.op == op::R_TYPE
    }

    /// Encodes an I-type word.
    pub fn encode_i(op: u8, ra: u8, rb: u8, imm16: u16) -> u32 {
        (u32::from(ra & 0x1F) << 27)
            | (u32::from(rb & 0x1F) << 22)
            | (u32::from(imm16) << 6)
            | u32::from(op & 0x3F)
    }

    /// Encodes an R-type word.
    pub fn encode_r(opx: u8, ra: u8, rb: u8, rc: u8, imm5: u8) -> u32 {
        (u32::from(ra & 0x1F) << 27)
            | (u32::from(rb & 0x1F) << 22)
            | (u32::from(rc & 0x1F) << 17)
            | (u32::from(opx & 0x3F) << 11)
            | (u32::from(imm5 & 0x1F) << 6)
            | u32::from(op::R_TYPE)
    }

    /// Encodes a J-type word.
    pub fn encode_j(op: u8, imm26: u32) -> u32 {
        ((imm26 & 0x3FF_FFFF) << 6) | u32::from(op & 0x3F)
    }
}

/// Sign-extends the low `bits` bits of `value` to 32 bits.
///
/// `bits` is clamped to `1..=32`; with `bits == 32` this is the identity.
///
/// ```
/// use niisim::isa::sign_extend;
///
/// assert_eq!(sign_extend(0x8000, 16), 0xFFFF_8000);
/// assert_eq!(sign_extend(0x7FFF, 16), 0x0000_7FFF);
/// assert_eq!(sign_extend(0xDEAD_BEEF, 32), 0xDEAD_BEEF);
/// ```
pub fn sign_extend(value: u32, bits: u32) -> u32 {
    let shift = 32 - bits.clamp(1, 32);
    (((value << shift) as i32) >> shift) as u32
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_decode_fields() {
        // ra=31 rb=0 rc=0 opx=RET
        let instr = Instr::decode(0xF800_283A);
        assert!(instr.is_r_type());
        assert_eq!(instr.opx, opx::RET);
        assert_eq!(instr.ra, 31);
        assert_eq!(instr.rb, 0);
        assert_eq!(instr.rc, 0);

        // movhi-style orhi r2, r0, 0x1234
        let word = Instr::encode_i(op::ORHI, 0, 2, 0x1234);
        let instr = Instr::decode(word);
        assert_eq!(instr.op, op::ORHI);
        assert_eq!(instr.ra, 0);
        assert_eq!(instr.rb, 2);
        assert_eq!(instr.imm16, 0x1234);
        assert_eq!(instr.imm26, word >> 6);
    }

    #[test]
    fn test_decode_views_overlap() {
        // imm16, imm5 and the low part of imm26 all read from bit 6.
        let instr = Instr::decode(0xFFFF_FFC0);
        assert_eq!(instr.op, 0);
        assert_eq!(instr.imm5, 0x1F);
        assert_eq!(instr.imm16, 0xFFFF);
        assert_eq!(instr.imm26, 0x3FF_FFFF);
        assert_eq!(instr.opx, 0x3F);
    }

    #[test]
    fn test_sign_extend_edges() {
        assert_eq!(sign_extend(1, 1), 0xFFFF_FFFF);
        assert_eq!(sign_extend(0, 1), 0);
        assert_eq!(sign_extend(0x80, 8), 0xFFFF_FF80);
        assert_eq!(sign_extend(0x17F, 8), 0x7F);
        assert_eq!(sign_extend(0x1234_5678, 32), 0x1234_5678);
    }

    proptest! {
        #[test]
        fn prop_sign_extend_round_trip(bits in 1u32..=32, value in any::<u32>()) {
            let mask = if bits == 32 { u32::MAX } else { (1u32 << bits) - 1 };
            let v = value & mask;
            prop_assert_eq!(sign_extend(v, bits) & mask, v);
        }

        #[test]
        fn prop_sign_extend_32_is_identity(value in any::<u32>()) {
            prop_assert_eq!(sign_extend(value, 32), value);
        }
    }
}
