//! Reading executable images.
//!
//! [`Program::parse`] validates an ELF file as a 32-bit little-endian Nios II
//! executable, and extracts its loadable segments and entry point. Placing the
//! segments into memory is done by [`System::load_elf`].
//!
//! [`System::load_elf`]: crate::sim::System::load_elf

use elf::abi::{ET_EXEC, PT_LOAD};
use elf::endian::LittleEndian;
use elf::ElfBytes;

use crate::isa::disasm;

/// `e_machine` of Nios II executables.
pub const EM_NIOS2: u16 = 0x71;

const ELF_MAGIC: [u8; 4] = *b"\x7FELF";
const ELFCLASS32: u8 = 1;
const ELFDATA2LSB: u8 = 1;
const EV_CURRENT: u8 = 1;
const PHDR32_SIZE: u16 = 32;

/// Sections included in [`Program::disassembly`], in listing order.
const CODE_SECTIONS: [&str; 3] = [".entry", ".exceptions", ".text"];

/// Errors raised while loading an executable image.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadErr {
    /// The file does not start with the ELF magic, or is too short to hold a header.
    #[error("Invalid .elf file!")]
    InvalidElf,
    /// The file is not a 32-bit ELF file.
    #[error("Invalid file class! Must be 32bit.")]
    InvalidClass,
    /// The file is not little-endian.
    #[error("Invalid file encoding!")]
    InvalidEncoding,
    /// The identification or header version is not current.
    #[error("Invalid file version!")]
    InvalidVersion,
    /// The file is not an executable.
    #[error("Invalid file type! Must be an executable .elf file.")]
    InvalidType,
    /// The file is built for another architecture.
    #[error("Invalid machine! Must be Nios II.")]
    InvalidMachine,
    /// Program header entries are not the size of an ELF32 program header.
    #[error("Invalid program header size!")]
    InvalidPhdrSize,
    /// A program header is not a loadable segment.
    #[error("Invalid program header type!")]
    InvalidPhdrType,
    /// A segment does not fit inside any RAM device.
    #[error("A segment of size {size} bytes with base address 0x{addr:08X} could not be placed in any SDRAM devices!")]
    Unplaced {
        /// Segment size in memory.
        size: u32,
        /// Segment physical address.
        addr: u32
    },
    /// The header checks passed, but the tables behind them could not be read.
    #[error("Malformed .elf file: {0}")]
    Malformed(String),
}

/// A loadable segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Physical address the segment is loaded at.
    pub addr: u32,
    /// Bytes to load, already zero-extended to the segment's memory size.
    pub data: Vec<u8>,
}
impl Segment {
    /// The segment's size in memory.
    pub fn memsz(&self) -> u32 {
        self.data.len() as u32
    }
}

/// A validated executable image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    /// The entry point.
    pub entry: u32,
    /// Non-empty loadable segments, in file order.
    pub segments: Vec<Segment>,
    disassembly: String,
}

impl Program {
    /// Validates and reads an ELF image.
    pub fn parse(data: &[u8]) -> Result<Self, LoadErr> {
        check_header(data)?;

        let file = ElfBytes::<LittleEndian>::minimal_parse(data)
            .map_err(|e| LoadErr::Malformed(e.to_string()))?;
        let entry = file.ehdr.e_entry as u32;

        let mut segments = vec![];
        for phdr in file.segments().into_iter().flat_map(|t| t.iter()) {
            if phdr.p_type != PT_LOAD {
                return Err(LoadErr::InvalidPhdrType);
            }
            if phdr.p_memsz == 0 {
                continue;
            }

            let bytes = file.segment_data(&phdr).map_err(|e| LoadErr::Malformed(e.to_string()))?;
            let mut data = bytes.to_vec();
            data.resize(phdr.p_memsz as usize, 0);
            segments.push(Segment { addr: phdr.p_paddr as u32, data });
        }

        let mut disassembly = String::new();
        for name in CODE_SECTIONS {
            let Ok(Some(shdr)) = file.section_header_by_name(name) else { continue };
            let Ok((bytes, _)) = file.section_data(&shdr) else {
                log::warn!("could not read section {name}");
                continue;
            };

            let words: Vec<u32> = bytes.chunks_exact(4)
                .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
                .collect();
            disassembly.push_str(&disasm::listing(shdr.sh_addr as u32, &words));
        }

        log::debug!("read image: entry {entry:#010x}, {} segments", segments.len());
        Ok(Self { entry, segments, disassembly })
    }

    /// Listing of the code sections (`.entry`, `.exceptions`, `.text`), one `addr: word mnemonic` line per word.
    pub fn disassembly(&self) -> &str {
        &self.disassembly
    }
}

fn half(data: &[u8], offset: usize) -> Option<u16> {
    let b = data.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}
fn word(data: &[u8], offset: usize) -> Option<u32> {
    let b = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Checks the ELF header fields, in the order errors are reported.
fn check_header(data: &[u8]) -> Result<(), LoadErr> {
    // an ELF32 header is 52 bytes
    if data.len() < 52 || data[..4] != ELF_MAGIC {
        return Err(LoadErr::InvalidElf);
    }
    if data[4] != ELFCLASS32 {
        return Err(LoadErr::InvalidClass);
    }
    if data[5] != ELFDATA2LSB {
        return Err(LoadErr::InvalidEncoding);
    }

    let e_type = half(data, 16).ok_or(LoadErr::InvalidElf)?;
    let e_machine = half(data, 18).ok_or(LoadErr::InvalidElf)?;
    let e_version = word(data, 20).ok_or(LoadErr::InvalidElf)?;
    let e_phentsize = half(data, 42).ok_or(LoadErr::InvalidElf)?;
    let e_phnum = half(data, 44).ok_or(LoadErr::InvalidElf)?;

    if data[6] != EV_CURRENT || e_version != u32::from(EV_CURRENT) {
        return Err(LoadErr::InvalidVersion);
    }
    if e_type != ET_EXEC {
        return Err(LoadErr::InvalidType);
    }
    if e_machine != EM_NIOS2 {
        return Err(LoadErr::InvalidMachine);
    }
    if e_phnum != 0 && e_phentsize != PHDR32_SIZE {
        return Err(LoadErr::InvalidPhdrSize);
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::isa::{opx, Instr};

    use super::*;

    const EHDR_SIZE: usize = 52;

    /// Builds a minimal executable with one program header per `(paddr, bytes, memsz)`.
    pub(crate) fn image(entry: u32, segments: &[(u32, &[u8], u32)]) -> Vec<u8> {
        let phoff = EHDR_SIZE;
        let mut data_off = phoff + 32 * segments.len();

        let mut out = vec![];
        out.extend(ELF_MAGIC);
        out.extend([ELFCLASS32, ELFDATA2LSB, EV_CURRENT]);
        out.resize(16, 0);
        out.extend(ET_EXEC.to_le_bytes());
        out.extend(EM_NIOS2.to_le_bytes());
        out.extend(1u32.to_le_bytes());                     // e_version
        out.extend(entry.to_le_bytes());
        out.extend((phoff as u32).to_le_bytes());
        out.extend(0u32.to_le_bytes());                     // e_shoff
        out.extend(0u32.to_le_bytes());                     // e_flags
        out.extend((EHDR_SIZE as u16).to_le_bytes());
        out.extend(PHDR32_SIZE.to_le_bytes());
        out.extend((segments.len() as u16).to_le_bytes());
        out.extend(40u16.to_le_bytes());                    // e_shentsize
        out.extend(0u16.to_le_bytes());                     // e_shnum
        out.extend(0u16.to_le_bytes());                     // e_shstrndx

        for &(paddr, bytes, memsz) in segments {
            for field in [PT_LOAD, data_off as u32, paddr, paddr, bytes.len() as u32, memsz, 7, 4] {
                out.extend(field.to_le_bytes());
            }
            data_off += bytes.len();
        }
        for &(_, bytes, _) in segments {
            out.extend(bytes);
        }
        out
    }

    #[test]
    fn test_parse() {
        let code = Instr::encode_r(opx::ADD, 0, 0, 0, 0).to_le_bytes();
        let data = image(0x100, &[(0x100, &code[..], 8), (0x800, &[0u8; 0][..], 0), (0x400, &[1u8, 2][..], 2)]);
        let program = Program::parse(&data).unwrap();

        let mut padded = code.to_vec();
        padded.extend([0; 4]);

        assert_eq!(program.entry, 0x100);
        assert_eq!(program.segments, [
            Segment { addr: 0x100, data: padded },
            Segment { addr: 0x400, data: vec![1, 2] },
        ]);
        assert_eq!(program.segments[0].memsz(), 8);
        assert_eq!(program.disassembly(), "");
    }

    #[test]
    fn test_header_errors() {
        let good = image(0, &[(0, &[0u8; 4][..], 4)]);
        let patched = |offset: usize, bytes: &[u8]| {
            let mut data = good.clone();
            data[offset..offset + bytes.len()].copy_from_slice(bytes);
            Program::parse(&data).map(|_| ())
        };

        assert_eq!(Program::parse(b"\x7FELF"), Err(LoadErr::InvalidElf));
        assert_eq!(patched(0, b"\x7FELG"), Err(LoadErr::InvalidElf));
        assert_eq!(patched(4, &[2]), Err(LoadErr::InvalidClass));
        assert_eq!(patched(5, &[2]), Err(LoadErr::InvalidEncoding));
        assert_eq!(patched(6, &[0]), Err(LoadErr::InvalidVersion));
        assert_eq!(patched(20, &[2]), Err(LoadErr::InvalidVersion));
        assert_eq!(patched(16, &[1]), Err(LoadErr::InvalidType));
        assert_eq!(patched(18, &[0xF3]), Err(LoadErr::InvalidMachine));
        assert_eq!(patched(42, &[56]), Err(LoadErr::InvalidPhdrSize));
        // p_type of the first program header
        assert_eq!(patched(EHDR_SIZE, &[2]), Err(LoadErr::InvalidPhdrType));
        assert_eq!(patched(0, &ELF_MAGIC), Ok(()));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(LoadErr::InvalidMachine.to_string(), "Invalid machine! Must be Nios II.");
        assert_eq!(
            LoadErr::Unplaced { size: 64, addr: 0x0800_0000 }.to_string(),
            "A segment of size 64 bytes with base address 0x08000000 could not be placed in any SDRAM devices!"
        );
    }
}
