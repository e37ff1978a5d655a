//! Decoding the DWARF sections of an executable.
//!
//! Only what is needed for line mapping is decoded:
//! - each compilation unit's compilation directory (from `.debug_info`/`.debug_abbrev`/`.debug_str`),
//! - the unit's line-number program (from `.debug_line`), executed into a table of rows.
//!
//! Decoding is best-effort. Truncated or malformed data ends the current unit early
//! rather than failing the whole image.

use elf::endian::LittleEndian;
use elf::ElfBytes;

/// A row of the line-number matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRow {
    /// Instruction address.
    pub address: u32,
    /// 1-based index into the unit's file table.
    pub file: u32,
    /// 1-based source line.
    pub line: u32,
    /// Source column, 0 if unknown.
    pub column: u32,
    /// Whether the address begins a statement.
    pub is_stmt: bool,
    /// Whether the address begins a basic block.
    pub basic_block: bool,
    /// Whether this row marks the first address past a sequence.
    pub end_sequence: bool,
}

/// An entry of a line program's file table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// The file name.
    pub name: String,
    /// 1-based index into the include directory table, or 0 for the compilation directory.
    pub dir: usize,
}

/// A decoded line-number program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineTable {
    /// The include directory table.
    pub include_dirs: Vec<String>,
    /// The file table.
    pub files: Vec<FileEntry>,
    /// The line-number matrix, in program order.
    pub rows: Vec<LineRow>,
}

impl LineTable {
    /// Resolves a row's full source path against the compilation directory.
    pub fn source_path(&self, comp_dir: &str, row: &LineRow) -> Option<String> {
        let file = self.files.get(usize::try_from(row.file).ok()?.checked_sub(1)?)?;
        let dir = match file.dir {
            0 => "",
            n => self.include_dirs.get(n - 1)?,
        };
        Some(concat_path(comp_dir, dir, &file.name))
    }
}

/// A compilation unit with its line table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompUnit {
    /// The unit's name (usually the main source file).
    pub name: Option<String>,
    /// The directory the unit was compiled in.
    pub comp_dir: Option<String>,
    /// The unit's line-number program.
    pub lines: LineTable,
}

/// Little-endian cursor over a byte slice.
#[derive(Clone)]
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}
impl<'a> Reader<'a> {
    fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }
    fn bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        let out = self.data.get(self.pos..self.pos.checked_add(n)?)?;
        self.pos += n;
        Some(out)
    }
    fn u8(&mut self) -> Option<u8> {
        self.bytes(1).map(|b| b[0])
    }
    fn u16(&mut self) -> Option<u16> {
        self.bytes(2)?.try_into().ok().map(u16::from_le_bytes)
    }
    fn u32(&mut self) -> Option<u32> {
        self.bytes(4)?.try_into().ok().map(u32::from_le_bytes)
    }
    fn u64(&mut self) -> Option<u64> {
        self.bytes(8)?.try_into().ok().map(u64::from_le_bytes)
    }
    fn uleb(&mut self) -> Option<u64> {
        let mut result = 0u64;
        let mut shift = 0;
        loop {
            let byte = self.u8()?;
            if shift < 64 {
                result |= u64::from(byte & 0x7F) << shift;
            }
            shift += 7;
            if byte & 0x80 == 0 { return Some(result); }
        }
    }
    fn sleb(&mut self) -> Option<i64> {
        let mut result = 0i64;
        let mut shift = 0;
        loop {
            let byte = self.u8()?;
            if shift < 64 {
                result |= i64::from(byte & 0x7F) << shift;
            }
            shift += 7;
            if byte & 0x80 == 0 {
                if shift < 64 && byte & 0x40 != 0 {
                    result |= -1 << shift;
                }
                return Some(result);
            }
        }
    }
    fn cstr(&mut self) -> Option<&'a str> {
        let rest = self.data.get(self.pos..)?;
        let len = rest.iter().position(|&b| b == 0)?;
        self.pos += len + 1;
        std::str::from_utf8(&rest[..len]).ok()
    }
}

fn cstr_at(data: &[u8], offset: usize) -> Option<String> {
    Reader::new(data, offset).cstr().map(str::to_string)
}

// standard opcodes
const DW_LNS_COPY: u8 = 1;
const DW_LNS_ADVANCE_PC: u8 = 2;
const DW_LNS_ADVANCE_LINE: u8 = 3;
const DW_LNS_SET_FILE: u8 = 4;
const DW_LNS_SET_COLUMN: u8 = 5;
const DW_LNS_NEGATE_STMT: u8 = 6;
const DW_LNS_SET_BASIC_BLOCK: u8 = 7;
const DW_LNS_CONST_ADD_PC: u8 = 8;
const DW_LNS_FIXED_ADVANCE_PC: u8 = 9;

// extended opcodes
const DW_LNE_END_SEQUENCE: u8 = 1;
const DW_LNE_SET_ADDRESS: u8 = 2;
const DW_LNE_DEFINE_FILE: u8 = 3;

fn read_file_entry(r: &mut Reader<'_>, name: &str) -> Option<FileEntry> {
    let dir = r.uleb()?;
    r.uleb()?; // modification time
    r.uleb()?; // length
    Some(FileEntry { name: name.to_string(), dir: usize::try_from(dir).ok()? })
}

/// Decodes and runs the line-number program at `offset` in `.debug_line`.
///
/// Rows decoded before any malformed data are kept.
pub fn decode_line_program(debug_line: &[u8], offset: usize) -> LineTable {
    let mut table = LineTable::default();
    let _ = run_line_program(debug_line, offset, &mut table);
    table
}

fn run_line_program(data: &[u8], offset: usize, table: &mut LineTable) -> Option<()> {
    let mut r = Reader::new(data, offset);
    let unit_length = usize::try_from(r.u32()?).ok()?;
    let end = (offset + 4).saturating_add(unit_length).min(data.len());

    let version = r.u16()?;
    let header_length = usize::try_from(r.u32()?).ok()?;
    let program_start = r.pos + header_length;
    let min_inst_len = u32::from(r.u8()?);
    if version >= 4 {
        r.u8()?; // maximum operations per instruction
    }
    let default_is_stmt = r.u8()? != 0;
    let line_base = r.u8()? as i8;
    let line_range = r.u8()?;
    let opcode_base = r.u8()?;
    let std_lengths = r.bytes(usize::from(opcode_base.saturating_sub(1)))?;

    loop {
        let dir = r.cstr()?;
        if dir.is_empty() { break; }
        table.include_dirs.push(dir.to_string());
    }
    loop {
        let name = r.cstr()?;
        if name.is_empty() { break; }
        let entry = read_file_entry(&mut r, name)?;
        table.files.push(entry);
    }

    r.pos = program_start;
    let reset = LineRow {
        address: 0,
        file: 1,
        line: 1,
        column: 0,
        is_stmt: default_is_stmt,
        basic_block: false,
        end_sequence: false,
    };
    let mut state = reset;

    while r.pos < end {
        let opcode = r.u8()?;
        match opcode {
            0 => {
                let len = usize::try_from(r.uleb()?).ok()?;
                let next = r.pos.checked_add(len)?;
                match r.u8()? {
                    DW_LNE_END_SEQUENCE => {
                        state.end_sequence = true;
                        table.rows.push(state);
                        state = reset;
                    },
                    DW_LNE_SET_ADDRESS => state.address = r.u32()?,
                    DW_LNE_DEFINE_FILE => {
                        let name = r.cstr()?;
                        let entry = read_file_entry(&mut r, name)?;
                        table.files.push(entry);
                    },
                    _ => {},
                }
                r.pos = next;
            },
            op if op >= opcode_base => {
                if line_range == 0 { return None; }
                let adjusted = op - opcode_base;
                state.line = state.line.wrapping_add_signed(i32::from(line_base) + i32::from(adjusted % line_range));
                state.address = state.address.wrapping_add(u32::from(adjusted / line_range) * min_inst_len);
                table.rows.push(state);
                state.basic_block = false;
            },
            DW_LNS_COPY => {
                table.rows.push(state);
                state.basic_block = false;
            },
            DW_LNS_ADVANCE_PC => {
                let delta = r.uleb()? as u32;
                state.address = state.address.wrapping_add(delta.wrapping_mul(min_inst_len));
            },
            DW_LNS_ADVANCE_LINE => state.line = state.line.wrapping_add(r.sleb()? as u32),
            DW_LNS_SET_FILE     => state.file = r.uleb()? as u32,
            DW_LNS_SET_COLUMN   => state.column = r.uleb()? as u32,
            DW_LNS_NEGATE_STMT  => state.is_stmt = !state.is_stmt,
            DW_LNS_SET_BASIC_BLOCK => state.basic_block = true,
            DW_LNS_CONST_ADD_PC => {
                if line_range == 0 { return None; }
                let delta = u32::from((255 - opcode_base) / line_range);
                state.address = state.address.wrapping_add(delta * min_inst_len);
            },
            DW_LNS_FIXED_ADVANCE_PC => state.address = state.address.wrapping_add(u32::from(r.u16()?)),
            op => {
                // a standard opcode this reader doesn't know, skip its operands
                let nargs = std_lengths.get(usize::from(op) - 1).copied().unwrap_or(0);
                for _ in 0..nargs {
                    r.uleb()?;
                }
            },
        }
    }

    Some(())
}

const DW_AT_NAME: u64 = 0x03;
const DW_AT_STMT_LIST: u64 = 0x10;
const DW_AT_COMP_DIR: u64 = 0x1B;

/// The value of an attribute, as far as it matters here.
enum AttrValue<'a> {
    Num(u64),
    Str(&'a str),
    StrOffset(u64),
    Other,
}

/// Reads an attribute value of the given form.
///
/// Returns `None` on truncated data or an unknown form (which leaves the rest of the entry unreadable).
fn read_form<'a>(r: &mut Reader<'a>, form: u64, addr_size: u8) -> Option<AttrValue<'a>> {
    let value = match form {
        0x01 => match addr_size {  // addr
            8 => AttrValue::Num(r.u64()?),
            _ => AttrValue::Num(u64::from(r.u32()?)),
        },
        0x03 => { let n = r.u16()?; r.bytes(n.into())?; AttrValue::Other },  // block2
        0x04 => { let n = r.u32()?; r.bytes(usize::try_from(n).ok()?)?; AttrValue::Other },  // block4
        0x05 | 0x12 => AttrValue::Num(r.u16()?.into()),  // data2, ref2
        0x06 | 0x13 | 0x10 | 0x17 => AttrValue::Num(r.u32()?.into()),  // data4, ref4, ref_addr, sec_offset
        0x07 | 0x14 | 0x20 => AttrValue::Num(r.u64()?),  // data8, ref8, ref_sig8
        0x08 => AttrValue::Str(r.cstr()?),  // string
        0x09 | 0x18 => { let n = r.uleb()?; r.bytes(usize::try_from(n).ok()?)?; AttrValue::Other },  // block, exprloc
        0x0A => { let n = r.u8()?; r.bytes(n.into())?; AttrValue::Other },  // block1
        0x0B | 0x11 | 0x0C => AttrValue::Num(r.u8()?.into()),  // data1, ref1, flag
        0x0D => { r.sleb()?; AttrValue::Other },  // sdata
        0x0E => AttrValue::StrOffset(r.u32()?.into()),  // strp
        0x0F | 0x15 => AttrValue::Num(r.uleb()?),  // udata, ref_udata
        0x16 => {  // indirect
            let form = r.uleb()?;
            return read_form(r, form, addr_size);
        },
        0x19 => AttrValue::Other,  // flag_present
        _ => return None,
    };
    Some(value)
}

/// Finds the attribute specifications of the abbreviation `code` in the table at `offset`.
fn find_abbrev(abbrev: &[u8], offset: usize, code: u64) -> Option<Vec<(u64, u64)>> {
    let mut r = Reader::new(abbrev, offset);
    loop {
        let entry_code = r.uleb()?;
        if entry_code == 0 { return None; }
        r.uleb()?; // tag
        r.u8()?; // has children

        let mut specs = vec![];
        loop {
            let (name, form) = (r.uleb()?, r.uleb()?);
            if name == 0 && form == 0 { break; }
            specs.push((name, form));
        }
        if entry_code == code { return Some(specs); }
    }
}

/// The DWARF sections used for line mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct DwarfSections<'a> {
    /// `.debug_info`
    pub info: &'a [u8],
    /// `.debug_abbrev`
    pub abbrev: &'a [u8],
    /// `.debug_line`
    pub line: &'a [u8],
    /// `.debug_str`
    pub str: &'a [u8],
}

impl<'a> DwarfSections<'a> {
    /// Finds the DWARF sections of an ELF image.
    ///
    /// Missing sections are empty. Returns `None` if the section table can't be read.
    pub fn from_elf(data: &'a [u8]) -> Option<Self> {
        let file = ElfBytes::<LittleEndian>::minimal_parse(data).ok()?;
        let section = |name: &str| -> &'a [u8] {
            match file.section_header_by_name(name) {
                Ok(Some(shdr)) => file.section_data(&shdr).map(|(data, _)| data).unwrap_or_default(),
                _ => &[],
            }
        };

        Some(Self {
            info: section(".debug_info"),
            abbrev: section(".debug_abbrev"),
            line: section(".debug_line"),
            str: section(".debug_str"),
        })
    }

    /// Decodes every compilation unit header and its line program.
    pub fn compile_units(&self) -> Vec<CompUnit> {
        let mut units = vec![];
        let mut offset = 0;

        while offset < self.info.len() {
            let mut r = Reader::new(self.info, offset);
            let Some(length) = r.u32() else { break };
            let Some(next) = usize::try_from(length).ok().and_then(|l| (offset + 4).checked_add(l)) else { break };

            match self.compile_unit(r) {
                Some(unit) => units.push(unit),
                None => log::warn!("skipping unreadable compilation unit at .debug_info+{offset:#x}"),
            }
            offset = next;
        }

        units
    }

    fn compile_unit(&self, mut r: Reader<'a>) -> Option<CompUnit> {
        let version = r.u16()?;
        if !(2..=4).contains(&version) {
            log::debug!("unsupported DWARF version {version}");
            return None;
        }
        let abbrev_offset = usize::try_from(r.u32()?).ok()?;
        let addr_size = r.u8()?;

        let code = r.uleb()?;
        let mut unit = CompUnit::default();
        if code == 0 {
            return Some(unit);
        }

        let mut stmt_list = None;
        for (name, form) in find_abbrev(self.abbrev, abbrev_offset, code)? {
            let value = read_form(&mut r, form, addr_size)?;
            let string = match value {
                AttrValue::Str(s) => Some(s.to_string()),
                AttrValue::StrOffset(off) => cstr_at(self.str, usize::try_from(off).ok()?),
                _ => None,
            };

            match (name, value) {
                (DW_AT_STMT_LIST, AttrValue::Num(off)) => stmt_list = usize::try_from(off).ok(),
                (DW_AT_NAME, _) => unit.name = string,
                (DW_AT_COMP_DIR, _) => unit.comp_dir = string,
                _ => {},
            }
        }

        if let Some(off) = stmt_list {
            unit.lines = decode_line_program(self.line, off);
        }
        Some(unit)
    }
}

/// Joins a compilation directory, an include directory, and a file name.
///
/// Leading `..` components of a relative include directory remove components of
/// the compilation directory, and repeated slashes are collapsed.
///
/// ```
/// use niisim::dbginfo::read::concat_path;
///
/// assert_eq!(concat_path("/home/u/proj", "../bsp//HAL/inc", "io.h"), "/home/u/bsp/HAL/inc/io.h");
/// assert_eq!(concat_path("/home/u/proj", "/usr/include", "stdio.h"), "/usr/include/stdio.h");
/// assert_eq!(concat_path("/home/u/proj", "", "main.c"), "/home/u/proj/main.c");
/// ```
pub fn concat_path(comp_dir: &str, include_dir: &str, file: &str) -> String {
    let mut path = if file.starts_with('/') {
        String::new()
    } else if include_dir.starts_with('/') {
        format!("{include_dir}/")
    } else {
        let mut base = comp_dir.trim_end_matches(['/', '\\']);
        let mut rest = include_dir;
        while let Some(r) = rest.strip_prefix("../").or((rest == "..").then_some("")) {
            rest = r;
            base = base.rfind(['/', '\\']).map_or("", |i| &base[..i]);
        }

        let mut p = format!("{base}/");
        if !rest.is_empty() {
            p.push_str(rest);
            p.push('/');
        }
        p
    };
    path.push_str(file);

    while path.contains("//") {
        path = path.replace("//", "/");
    }
    path
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Assembles a DWARF 2 line program with one include directory (`inc`)
    /// and two files (`main.c` in the compilation directory, `util.h` in `inc`).
    pub(crate) fn line_program(program: &[u8]) -> Vec<u8> {
        let mut header = vec![];
        header.push(4);    // minimum instruction length
        header.push(1);    // default is_stmt
        header.push(-5i8 as u8); // line base
        header.push(14);   // line range
        header.push(13);   // opcode base
        header.extend([0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1]); // standard opcode lengths
        header.extend(b"inc\0\0");
        header.extend(b"main.c\0\0\0\0");
        header.extend(b"util.h\0\x01\0\0");
        header.push(0);

        let mut out = vec![];
        let unit_length = 2 + 4 + header.len() + program.len();
        out.extend((unit_length as u32).to_le_bytes());
        out.extend(2u16.to_le_bytes());
        out.extend((header.len() as u32).to_le_bytes());
        out.extend(header);
        out.extend(program);
        out
    }

    pub(crate) fn set_address(addr: u32) -> Vec<u8> {
        let mut v = vec![0, 5, DW_LNE_SET_ADDRESS];
        v.extend(addr.to_le_bytes());
        v
    }

    pub(crate) const END_SEQUENCE: [u8; 3] = [0, 1, DW_LNE_END_SEQUENCE];

    #[test]
    fn test_leb128() {
        let data = [0xE5, 0x8E, 0x26, 0x7F, 0x80, 0x7F];
        let mut r = Reader::new(&data, 0);
        assert_eq!(r.uleb(), Some(624485));
        assert_eq!(r.sleb(), Some(-1));
        assert_eq!(r.sleb(), Some(-128));
        assert_eq!(r.pos, data.len());
        assert_eq!(r.uleb(), None);
    }

    #[test]
    fn test_line_program() {
        let mut program = set_address(0x100);
        program.extend([DW_LNS_ADVANCE_LINE, 9]);  // line 10
        program.push(DW_LNS_COPY);
        // special opcode: address += 1 * 4, line += 2
        program.push(13 + 14 + 7);
        program.extend([DW_LNS_SET_FILE, 2]);
        program.extend([DW_LNS_CONST_ADD_PC]);     // address += 17 * 4
        program.push(DW_LNS_COPY);
        program.extend([DW_LNS_FIXED_ADVANCE_PC, 0x10, 0x00]);
        program.extend(END_SEQUENCE);

        let table = decode_line_program(&line_program(&program), 0);
        assert_eq!(table.include_dirs, ["inc"]);
        assert_eq!(table.files.len(), 2);
        assert_eq!(table.files[1], FileEntry { name: "util.h".into(), dir: 1 });

        let rows: Vec<_> = table.rows.iter()
            .map(|r| (r.address, r.file, r.line, r.end_sequence))
            .collect();
        assert_eq!(rows, [
            (0x100, 1, 10, false),
            (0x104, 1, 12, false),
            (0x148, 2, 12, false),
            (0x158, 2, 12, true),
        ]);

        let row = &table.rows[2];
        assert_eq!(table.source_path("/src", row).as_deref(), Some("/src/inc/util.h"));
    }

    #[test]
    fn test_truncated_program_keeps_rows() {
        let mut program = set_address(0x200);
        program.push(DW_LNS_COPY);
        let mut data = line_program(&program);
        // claim more program than there is, then end in the middle of an opcode
        data.extend([DW_LNS_ADVANCE_PC]);
        let len = data.len() as u32 + 16;
        data[..4].copy_from_slice(&len.to_le_bytes());

        let table = decode_line_program(&data, 0);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].address, 0x200);
    }

    #[test]
    fn test_concat_path() {
        assert_eq!(concat_path("/a/b/c", "../../d", "f.c"), "/a/d/f.c");
        assert_eq!(concat_path("/a/b/", "..", "f.c"), "/a/f.c");
        assert_eq!(concat_path("/", "", "f.c"), "/f.c");
        assert_eq!(concat_path("/a", "inc", "/abs/f.h"), "/abs/f.h");
        assert_eq!(concat_path("C:\\proj\\app", "../bsp", "f.c"), "C:\\proj/bsp/f.c");
    }

    #[test]
    fn test_compile_unit() {
        let line = line_program(&[]);

        // abbrev 1: compile_unit, no children, name:string, comp_dir:strp, stmt_list:data4
        let abbrev = [1, 0x11, 0, 0x03, 0x08, 0x1B, 0x0E, 0x10, 0x06, 0, 0, 0];
        let strs = b"xx\0/work\0";

        let mut die = vec![1];
        die.extend(b"main.c\0");
        die.extend(3u32.to_le_bytes());
        die.extend(0u32.to_le_bytes());

        let mut info = vec![];
        info.extend((7 + die.len() as u32).to_le_bytes());
        info.extend(2u16.to_le_bytes());
        info.extend(0u32.to_le_bytes());
        info.push(4);
        info.extend(die);

        let sections = DwarfSections { info: &info, abbrev: &abbrev, line: &line, str: strs };
        let units = sections.compile_units();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name.as_deref(), Some("main.c"));
        assert_eq!(units[0].comp_dir.as_deref(), Some("/work"));
        assert_eq!(units[0].lines.files.len(), 2);
    }
}
