use std::collections::BTreeMap;

use crate::page_table::PageNumber;

/// Reservations of contiguous virtual page ranges, one per admitted process
#[derive(Debug, Clone)]
pub struct VirtualSpace {
    total_pages: u64,
    /// start page -> length
    reserved: BTreeMap<PageNumber, u64>,
}

impl VirtualSpace {
    pub fn new(total_pages: u64) -> Self {
        VirtualSpace {
            total_pages,
            reserved: BTreeMap::new(),
        }
    }

    pub fn reserved_pages(&self) -> u64 {
        self.reserved.values().sum()
    }

    pub fn free_pages(&self) -> u64 {
        self.total_pages - self.reserved_pages()
    }

    /// Reserve `count` pages at the lowest start that fits (first fit)
    pub fn reserve(&mut self, count: u64) -> Option<PageNumber> {
        if count == 0 {
            return None;
        }
        let mut candidate = 0;
        for (&start, &len) in &self.reserved {
            if start - candidate >= count {
                break;
            }
            candidate = start + len;
        }
        if self.total_pages - candidate < count {
            return None;
        }
        self.reserved.insert(candidate, count);
        Some(candidate)
    }

    /// Release the range starting at `start`, returning its length
    pub fn release(&mut self, start: PageNumber) -> Option<u64> {
        self.reserved.remove(&start)
    }

    /// Free gaps as `(start, length)` in address order
    pub fn free_ranges(&self) -> Vec<(PageNumber, u64)> {
        let mut gaps = Vec::new();
        let mut cursor = 0;
        for (&start, &len) in &self.reserved {
            if start > cursor {
                gaps.push((cursor, start - cursor));
            }
            cursor = start + len;
        }
        if cursor < self.total_pages {
            gaps.push((cursor, self.total_pages - cursor));
        }
        gaps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_sequential() {
        let mut vs = VirtualSpace::new(16);
        assert_eq!(vs.reserve(4), Some(0));
        assert_eq!(vs.reserve(4), Some(4));
        assert_eq!(vs.reserved_pages(), 8);
        assert_eq!(vs.free_pages(), 8);
        assert_eq!(vs.free_ranges(), vec![(8, 8)]);
    }

    #[test]
    fn test_reserve_first_fit_reuses_gap() {
        let mut vs = VirtualSpace::new(16);
        vs.reserve(4);
        vs.reserve(4);
        vs.reserve(4);
        assert_eq!(vs.release(4), Some(4));

        // Too big for the gap: goes past the last reservation
        assert_eq!(vs.reserve(5), None);
        assert_eq!(vs.reserve(3), Some(4));
        assert_eq!(vs.free_ranges(), vec![(7, 1), (12, 4)]);
        assert_eq!(vs.reserve(4), Some(12));
        assert_eq!(vs.reserve(2), None);
        assert_eq!(vs.reserve(1), Some(7));
    }

    #[test]
    fn test_reserve_whole_space() {
        let mut vs = VirtualSpace::new(8);
        assert_eq!(vs.reserve(9), None);
        assert_eq!(vs.reserve(8), Some(0));
        assert_eq!(vs.reserve(1), None);
        assert_eq!(vs.release(0), Some(8));
        assert_eq!(vs.reserve(1), Some(0));
    }

    #[test]
    fn test_release_unknown() {
        let mut vs = VirtualSpace::new(8);
        vs.reserve(2);
        assert_eq!(vs.release(1), None);
        assert_eq!(vs.reserve(0), None);
    }
}
