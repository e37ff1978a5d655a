//! Mapping between instruction addresses and source lines.
//!
//! [`DebugInfo`] is built from the DWARF line tables of an executable (see [`read`])
//! in two passes:
//! 1. collect every distinct source path and every address with a line-table row,
//!    sorted so they can be binary searched;
//! 2. fill the source-to-address and address-to-source maps, keyed by index into
//!    those sorted collections.
//!
//! End-of-sequence rows are kept separately. They mark where a run of code with
//! line information ends, so address lookups don't attribute trailing code
//! (padding, library code without debug info) to the last known line.
//!
//! ```
//! use niisim::dbginfo::DebugInfo;
//!
//! // an executable without debug info has an empty index
//! let info = DebugInfo::default();
//! assert!(info.addr_to_source(0x100).is_empty());
//! assert_eq!(info.nearest_preceding_addr_with_source(0x100), None);
//! ```

pub mod read;

use std::collections::BTreeSet;

use self::read::{CompUnit, DwarfSections};

/// A source location, as an index into [`DebugInfo::source_files`] and a 1-based line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourcePoint {
    /// Index into [`DebugInfo::source_files`].
    pub file: usize,
    /// 1-based line number.
    pub line: u32,
}

/// Bidirectional index between addresses and source lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugInfo {
    source_files: Vec<String>,
    /// `source_to_addr[file][line - 1]` holds the addresses of that line.
    source_to_addr: Vec<Vec<Vec<u32>>>,
    addresses: Vec<u32>,
    /// `addr_to_source[i]` holds the source points of `addresses[i]`.
    addr_to_source: Vec<Vec<SourcePoint>>,
    end_of_sequence: Vec<u32>,
}

impl DebugInfo {
    /// Builds the index from an ELF image.
    ///
    /// An image without (readable) debug info produces an empty index.
    pub fn build(elf: &[u8]) -> Self {
        match DwarfSections::from_elf(elf) {
            Some(sections) => Self::from_units(&sections.compile_units()),
            None => {
                log::warn!("could not read section table, no debug info available");
                Self::default()
            }
        }
    }

    /// Builds the index from decoded compilation units.
    pub fn from_units(units: &[CompUnit]) -> Self {
        // Resolves every row of every unit to (path, row), skipping rows with bad file indices.
        let rows = || units.iter().flat_map(|u| {
            let comp_dir = u.comp_dir.as_deref().unwrap_or("");
            u.lines.rows.iter()
                .filter(|r| !r.end_sequence)
                .filter_map(move |r| Some((u.lines.source_path(comp_dir, r)?, r)))
        });

        let mut end_of_sequence: Vec<u32> = units.iter()
            .flat_map(|u| &u.lines.rows)
            .filter(|r| r.end_sequence)
            .map(|r| r.address)
            .collect();
        end_of_sequence.sort_unstable();

        // first pass
        let (files, addrs): (BTreeSet<_>, BTreeSet<_>) = rows()
            .map(|(path, r)| (path, r.address))
            .unzip();
        let source_files: Vec<String> = files.into_iter().collect();
        let addresses: Vec<u32> = addrs.into_iter().collect();

        // second pass
        let mut source_to_addr = vec![Vec::<Vec<u32>>::new(); source_files.len()];
        let mut addr_to_source = vec![Vec::<SourcePoint>::new(); addresses.len()];
        for (path, r) in rows() {
            let (Ok(file), Ok(addr_idx)) = (source_files.binary_search(&path), addresses.binary_search(&r.address)) else {
                continue;
            };
            let Some(line_idx) = (r.line as usize).checked_sub(1) else { continue };

            let lines = &mut source_to_addr[file];
            if lines.len() <= line_idx {
                lines.resize(line_idx + 1, vec![]);
            }
            if !lines[line_idx].contains(&r.address) {
                lines[line_idx].push(r.address);
            }

            let point = SourcePoint { file, line: r.line };
            if !addr_to_source[addr_idx].contains(&point) {
                addr_to_source[addr_idx].push(point);
            }
        }

        log::debug!("debug info: {} source files, {} addresses", source_files.len(), addresses.len());
        Self { source_files, source_to_addr, addresses, addr_to_source, end_of_sequence }
    }

    /// All source file paths, sorted.
    pub fn source_files(&self) -> &[String] {
        &self.source_files
    }

    /// Finds a source file's index.
    pub fn file_id(&self, path: &str) -> Option<usize> {
        self.source_files.iter().position(|f| f == path)
    }

    /// All addresses with source information, sorted.
    pub fn addresses(&self) -> &[u32] {
        &self.addresses
    }

    /// The source points at exactly `addr`. Empty if there are none.
    pub fn addr_to_source(&self, addr: u32) -> &[SourcePoint] {
        match self.addresses.binary_search(&addr) {
            Ok(i) => &self.addr_to_source[i],
            Err(_) => &[],
        }
    }

    /// The addresses of a source line. Empty if there are none.
    pub fn source_to_addr(&self, file: usize, line: u32) -> &[u32] {
        (line as usize).checked_sub(1)
            .and_then(|l| self.source_to_addr.get(file)?.get(l))
            .map_or(&[], Vec::as_slice)
    }

    /// The greatest address `<= addr` with source information, as long as no
    /// end-of-sequence boundary lies between it and `addr`.
    pub fn nearest_preceding_addr_with_source(&self, addr: u32) -> Option<u32> {
        let i = self.addresses.partition_point(|&a| a <= addr);
        let found = *self.addresses.get(i.checked_sub(1)?)?;

        let j = self.end_of_sequence.partition_point(|&a| a <= found);
        match self.end_of_sequence.get(j) {
            Some(&eos) if addr >= eos => None,
            _ => Some(found),
        }
    }

    /// Resolves a breakpoint request on a source line.
    ///
    /// The request moves down to the first line at or after `line` that has code.
    /// The result starts with that line and its first address, followed by every other
    /// source point that shares one of the line's addresses (and so would also halt there).
    pub fn matching_breakpoints(&self, file: usize, line: u32) -> Vec<(SourcePoint, u32)> {
        let mut out = vec![];
        let Some(lines) = self.source_to_addr.get(file) else { return out };
        let start = (line as usize).saturating_sub(1);

        let Some((idx, addrs)) = lines.iter()
            .enumerate()
            .skip(start)
            .find(|(_, a)| !a.is_empty())
        else {
            return out;
        };

        out.push((SourcePoint { file, line: idx as u32 + 1 }, addrs[0]));
        for &addr in addrs {
            for &point in self.addr_to_source(addr) {
                if !out.contains(&(point, addr)) {
                    out.push((point, addr));
                }
            }
        }
        out
    }
}
