//! Method header index.
//!
//! Maps an arbitrary code address back to the entry point of the method
//! that contains it.

use crate::value::CodeAddr;

/// Sorted list of method entry addresses.
#[derive(Debug, Default, Clone)]
pub struct MethodHeaderIndex {
    entries: Vec<CodeAddr>,
}

impl MethodHeaderIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes room for `count` entries. Never shrinks the allocation.
    pub fn alloc_method_header_list(&mut self, count: usize) {
        if count > self.entries.capacity() {
            self.entries.reserve_exact(count - self.entries.len());
        }
    }

    /// Appends a method entry address. Entries must be added in ascending
    /// address order.
    pub fn push(&mut self, addr: CodeAddr) {
        self.entries.push(addr);
    }

    /// Replaces the index with `addrs`, sorted.
    pub fn load<I: IntoIterator<Item = CodeAddr>>(&mut self, addrs: I) {
        self.entries.clear();
        self.entries.extend(addrs);
        self.entries.sort_unstable();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// Finds the entry point of the method containing `addr`.
    pub fn find_method_start(&self, addr: CodeAddr) -> Option<CodeAddr> {
        let count = self.entries.len();
        if count == 0 {
            return None;
        }

        let mut lo = 0usize;
        let mut hi = count - 1;
        while lo <= hi {
            let cur = lo + (hi - lo) / 2;
            let start = self.entries[cur];
            let next = self.entries.get(cur + 1).copied().unwrap_or(CodeAddr::MAX);

            if addr >= start && addr < next {
                return Some(start);
            }

            if addr < start {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> MethodHeaderIndex {
        let mut idx = MethodHeaderIndex::new();
        idx.load([0x100, 0x180, 0x400]);
        idx
    }

    #[test]
    fn test_address_inside_method() {
        let idx = index();
        assert_eq!(idx.find_method_start(0x100), Some(0x100));
        assert_eq!(idx.find_method_start(0x17F), Some(0x100));
        assert_eq!(idx.find_method_start(0x180), Some(0x180));
        assert_eq!(idx.find_method_start(0x3FF), Some(0x180));
    }

    #[test]
    fn test_last_method_extends_to_end() {
        assert_eq!(index().find_method_start(0xFFFF_0000), Some(0x400));
    }

    #[test]
    fn test_address_before_first_method() {
        assert_eq!(index().find_method_start(0xFF), None);
        assert_eq!(MethodHeaderIndex::new().find_method_start(0x100), None);
    }

    #[test]
    fn test_alloc_never_shrinks() {
        let mut idx = MethodHeaderIndex::new();
        idx.alloc_method_header_list(64);
        let cap = idx.capacity();
        assert!(cap >= 64);
        idx.alloc_method_header_list(8);
        assert_eq!(idx.capacity(), cap);
    }
}
