//! Source file line tables.
//!
//! Each source file of the loaded image carries an ordered list of
//! `(line, code address)` records. The debugger uses them to translate a
//! line the user points at into the address of the first instruction
//! generated for it.

use crate::value::CodeAddr;
use log::warn;
use vmdbg_config::{LINE_RECORD_GROWTH, MAX_LINE_RECORDS};

/// A single line record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceLine {
    pub line: u32,
    pub addr: CodeAddr,
}

/// Result of a line lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineMatch {
    /// Address of the first instruction for the line
    pub addr: CodeAddr,

    /// The line actually matched; differs from the requested line when a
    /// non-exact lookup moved forward to the next executable line
    pub line: u32,
}

/// One source file of the image.
#[derive(Debug, Clone)]
pub struct SourceFileEntry {
    name: String,
    orig_index: usize,
    is_master: bool,
    lines: Vec<SourceLine>,
    max_lines: usize,
    dropped: usize,
}

impl SourceFileEntry {
    /// Creates an entry with the default line record ceiling.
    pub fn new<S: Into<String>>(name: S, orig_index: usize, is_master: bool) -> Self {
        Self::with_line_limit(name, orig_index, is_master, MAX_LINE_RECORDS)
    }

    /// Creates an entry that keeps at most `max_lines` line records.
    pub fn with_line_limit<S: Into<String>>(
        name: S,
        orig_index: usize,
        is_master: bool,
        max_lines: usize,
    ) -> Self {
        Self {
            name: name.into(),
            orig_index,
            is_master,
            lines: Vec::new(),
            max_lines,
            dropped: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index of the entry this one aliases; its own index for a master entry.
    pub fn orig_index(&self) -> usize {
        self.orig_index
    }

    pub fn is_master(&self) -> bool {
        self.is_master
    }

    pub fn lines(&self) -> &[SourceLine] {
        &self.lines
    }

    /// Number of records discarded because the ceiling was reached.
    pub fn dropped_lines(&self) -> usize {
        self.dropped
    }

    /// Appends a line record.
    ///
    /// Records must arrive in ascending line order. Storage grows in steps of
    /// [`LINE_RECORD_GROWTH`] records; once the ceiling is reached further
    /// records are dropped.
    pub fn add_line(&mut self, line: u32, addr: CodeAddr) {
        if self.lines.len() >= self.max_lines {
            if self.dropped == 0 {
                warn!(
                    "source file {}: line table full at {} records, dropping further lines",
                    self.name, self.max_lines
                );
            }
            self.dropped += 1;
            return;
        }

        if self.lines.len() == self.lines.capacity() {
            let step = LINE_RECORD_GROWTH.min(self.max_lines - self.lines.len());
            self.lines.reserve_exact(step);
        }
        self.lines.push(SourceLine { line, addr });
    }

    /// Finds the code address for a source line.
    ///
    /// With `exact` set only a record for exactly `line` matches. Otherwise
    /// the lookup moves forward to the next line that has code, or back to
    /// the last line of the file when `line` is past its end.
    pub fn find_code_address(&self, line: u32, exact: bool) -> Option<LineMatch> {
        let count = self.lines.len();
        if count == 0 {
            return None;
        }

        let mut lo = 0usize;
        let mut hi = count - 1;
        while lo <= hi {
            let cur = lo + (hi - lo) / 2;
            let rec = self.lines[cur];

            let found = if exact {
                rec.line == line
            } else if cur == 0 && line <= rec.line {
                true
            } else if cur == count - 1 && line >= rec.line {
                true
            } else {
                cur > 0 && self.lines[cur - 1].line < line && line <= rec.line
            };
            if found {
                return Some(LineMatch {
                    addr: rec.addr,
                    line: rec.line,
                });
            }

            if line < rec.line {
                hi = if cur == hi {
                    match hi.checked_sub(1) {
                        Some(h) => h,
                        None => break,
                    }
                } else {
                    cur
                };
            } else {
                lo = if cur == lo { cur + 1 } else { cur };
            }
        }

        None
    }
}

/// The source file list of the loaded image.
#[derive(Debug, Clone)]
pub struct SourceFileTable {
    entries: Vec<SourceFileEntry>,
    max_line_records: usize,
}

impl Default for SourceFileTable {
    fn default() -> Self {
        Self::new(MAX_LINE_RECORDS)
    }
}

impl SourceFileTable {
    /// Creates an empty table whose entries keep at most `max_line_records`.
    pub fn new(max_line_records: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_line_records,
        }
    }

    /// Appends an entry and returns it for line loading. The entry's index is
    /// its position in the table.
    pub fn add_entry<S: Into<String>>(
        &mut self,
        name: S,
        orig_index: usize,
        is_master: bool,
    ) -> &mut SourceFileEntry {
        let index = self.entries.len();
        self.entries.push(SourceFileEntry::with_line_limit(
            name,
            orig_index,
            is_master,
            self.max_line_records,
        ));
        &mut self.entries[index]
    }

    pub fn get(&self, index: usize) -> Option<&SourceFileEntry> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut SourceFileEntry> {
        self.entries.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry, keeping the backing storage for the next load.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceFileEntry> {
        self.entries.iter()
    }

    /// Finds an entry by exact name, returning its index.
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }
}

/// Gets the file name part of a path.
pub fn root_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn main_t() -> SourceFileEntry {
        let mut entry = SourceFileEntry::new("main.t", 0, true);
        entry.add_line(10, 0x100);
        entry.add_line(15, 0x140);
        entry.add_line(20, 0x180);
        entry
    }

    #[test]
    fn test_non_exact_moves_forward() {
        let entry = main_t();
        let m = entry.find_code_address(12, false).unwrap();
        assert_eq!(m.addr, 0x140);
        assert_eq!(m.line, 15);
    }

    #[test]
    fn test_first_and_last_line_fallbacks() {
        let entry = main_t();
        assert_eq!(
            entry.find_code_address(5, false),
            Some(LineMatch { addr: 0x100, line: 10 })
        );
        assert_eq!(
            entry.find_code_address(99, false),
            Some(LineMatch { addr: 0x180, line: 20 })
        );
    }

    #[test]
    fn test_exact_lookup() {
        let entry = main_t();
        assert_eq!(entry.find_code_address(20, true).map(|m| m.addr), Some(0x180));
        assert_eq!(entry.find_code_address(10, true).map(|m| m.addr), Some(0x100));
        assert_eq!(entry.find_code_address(12, true), None);
        assert_eq!(entry.find_code_address(1, true), None);
    }

    #[test]
    fn test_empty_entry_never_matches() {
        let entry = SourceFileEntry::new("empty.t", 0, true);
        assert_eq!(entry.find_code_address(1, false), None);
    }

    #[test]
    fn test_line_ceiling_drops_records() {
        let mut entry = SourceFileEntry::with_line_limit("big.t", 0, true, 2);
        entry.add_line(1, 0x10);
        entry.add_line(2, 0x20);
        entry.add_line(3, 0x30);
        assert_eq!(entry.lines().len(), 2);
        assert_eq!(entry.dropped_lines(), 1);
        assert_eq!(entry.find_code_address(3, true), None);
    }

    #[test]
    fn test_table_clear_and_lookup_by_name() {
        let mut table = SourceFileTable::default();
        table.add_entry("lib/a.t", 0, true).add_line(1, 0x10);
        table.add_entry("b.t", 1, true);
        assert_eq!(table.find_by_name("b.t"), Some(1));
        assert_eq!(table.get(0).unwrap().lines().len(), 1);

        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.find_by_name("b.t"), None);
    }

    #[test]
    fn test_root_name() {
        assert_eq!(root_name("lib/adv3/main.t"), "main.t");
        assert_eq!(root_name("c:\\games\\x.t"), "x.t");
        assert_eq!(root_name("plain.t"), "plain.t");
    }
}
