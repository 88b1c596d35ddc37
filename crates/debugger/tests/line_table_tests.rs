// Line and method lookups, checked against a linear scan.

use proptest::prelude::*;
use std::collections::BTreeSet;
use vmdbg_debugger::{LineMatch, MethodHeaderIndex, SourceFileEntry, SourceFileTable};

fn entry_with(lines: &[(u32, u32)]) -> SourceFileEntry {
    let mut entry = SourceFileEntry::new("main.t", 0, true);
    for &(line, addr) in lines {
        entry.add_line(line, addr);
    }
    entry
}

/// Line records with strictly ascending lines and arbitrary addresses.
fn line_records() -> impl Strategy<Value = Vec<(u32, u32)>> {
    (prop::collection::btree_set(1u32..500, 0..40), prop::collection::vec(any::<u32>(), 40)).prop_map(
        |(lines, addrs): (BTreeSet<u32>, Vec<u32>)| lines.into_iter().zip(addrs).collect(),
    )
}

proptest! {
    #[test]
    fn nearest_line_is_the_next_line_with_code(records in line_records(), probe in 0u32..520) {
        let entry = entry_with(&records);
        let expected = records
            .iter()
            .find(|(line, _)| *line >= probe)
            .or_else(|| records.last())
            .map(|&(line, addr)| LineMatch { addr, line });

        prop_assert_eq!(entry.find_code_address(probe, false), expected);
    }

    #[test]
    fn exact_lookup_matches_only_recorded_lines(records in line_records(), probe in 0u32..520) {
        let entry = entry_with(&records);
        let expected = records
            .iter()
            .find(|(line, _)| *line == probe)
            .map(|&(line, addr)| LineMatch { addr, line });

        prop_assert_eq!(entry.find_code_address(probe, true), expected);
        for &(line, addr) in &records {
            prop_assert_eq!(entry.find_code_address(line, true), Some(LineMatch { addr, line }));
        }
    }

    #[test]
    fn method_start_is_the_last_entry_at_or_before(
        starts in prop::collection::btree_set(1u32..100_000, 1..60),
        probe in 0u32..110_000,
    ) {
        let mut index = MethodHeaderIndex::new();
        index.alloc_method_header_list(starts.len());
        for &addr in &starts {
            index.push(addr);
        }

        let expected = starts.range(..=probe).next_back().copied();
        prop_assert_eq!(index.find_method_start(probe), expected);
    }
}

#[test]
fn test_lookup_in_main_source() {
    // line -> address for a file whose code was emitted out of order
    let records = [(3, 0x140), (5, 0x100), (6, 0x108), (9, 0x120), (12, 0x150)];
    let entry = entry_with(&records);

    assert_eq!(entry.find_code_address(5, true).map(|m| m.addr), Some(0x100));
    assert_eq!(entry.find_code_address(7, true), None);
    assert_eq!(
        entry.find_code_address(7, false),
        Some(LineMatch { addr: 0x120, line: 9 })
    );
    assert_eq!(entry.find_code_address(1, false).map(|m| m.line), Some(3));
    assert_eq!(entry.find_code_address(40, false).map(|m| m.line), Some(12));
}

#[test]
fn test_empty_file_has_no_lines() {
    let entry = entry_with(&[]);
    assert_eq!(entry.find_code_address(1, false), None);
    assert_eq!(entry.find_code_address(1, true), None);
}

#[test]
fn test_line_records_stop_at_the_ceiling() {
    let mut table = SourceFileTable::new(3);
    let entry = table.add_entry("big.t", 0, true);
    for line in 1..=5 {
        entry.add_line(line, line * 0x10);
    }
    assert_eq!(entry.lines().len(), 3);
    assert_eq!(entry.dropped_lines(), 2);
    assert_eq!(entry.find_code_address(9, false).map(|m| m.line), Some(3));
}

#[test]
fn test_included_files_alias_their_master() {
    let mut table = SourceFileTable::default();
    table.add_entry("lib/adv3.t", 0, true);
    table.add_entry("main.t", 1, true);
    table.add_entry("lib/adv3.t", 0, false);

    assert_eq!(table.len(), 3);
    assert_eq!(table.find_by_name("main.t"), Some(1));
    let alias = table.get(2).unwrap();
    assert!(!alias.is_master());
    assert_eq!(alias.orig_index(), 0);
    assert_eq!(vmdbg_debugger::source_file::root_name("lib/adv3.t"), "adv3.t");
}
