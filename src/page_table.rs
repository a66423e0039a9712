//! Per-process page tables.
//!
//! Entries live from admission until the owning process terminates. Eviction
//! only flips an entry back to non-resident; it never removes it.

use std::collections::BTreeMap;
use std::ops::Range;

use bitflags::bitflags;

use crate::error::{Result, VmError};
use crate::memory::FrameNumber;
use crate::process::ProcessId;

pub type PageNumber = u64;

bitflags! {
    /// Status bits carried by every page-table entry
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PteFlags: u8 {
        /// Page currently occupies a frame
        const RESIDENT = 1 << 0;
        /// Page was accessed since the flag was last cleared
        const REFERENCED = 1 << 1;
    }
}

/// Arena-style handle for a page: owning process plus virtual page number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageKey {
    pub process: ProcessId,
    pub page: PageNumber,
}

impl PageKey {
    #[inline]
    pub fn new(process: ProcessId, page: PageNumber) -> Self {
        PageKey { process, page }
    }
}

impl std::fmt::Display for PageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}:{}", self.process, self.page)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTableEntry {
    pub process_id: ProcessId,
    pub virtual_page_number: PageNumber,
    flags: PteFlags,
    frame: Option<FrameNumber>,
    last_used_tick: u64,
    faults: u64,
}

impl PageTableEntry {
    fn new(process_id: ProcessId, virtual_page_number: PageNumber) -> Self {
        PageTableEntry {
            process_id,
            virtual_page_number,
            flags: PteFlags::empty(),
            frame: None,
            last_used_tick: 0,
            faults: 0,
        }
    }

    #[inline]
    pub fn key(&self) -> PageKey {
        PageKey::new(self.process_id, self.virtual_page_number)
    }

    #[inline]
    pub fn flags(&self) -> PteFlags {
        self.flags
    }

    #[inline]
    pub fn is_resident(&self) -> bool {
        self.flags.contains(PteFlags::RESIDENT)
    }

    /// Frame holding the page, if resident
    #[inline]
    pub fn frame_number(&self) -> Option<FrameNumber> {
        self.frame
    }

    #[inline]
    pub fn last_used_tick(&self) -> u64 {
        self.last_used_tick
    }

    #[inline]
    pub fn reference_flag(&self) -> bool {
        self.flags.contains(PteFlags::REFERENCED)
    }

    pub fn set_reference_flag(&mut self, value: bool) {
        self.flags.set(PteFlags::REFERENCED, value);
    }

    /// Record an access at `tick`: updates recency and sets the reference flag
    pub fn touch(&mut self, tick: u64) {
        self.last_used_tick = tick;
        self.flags.insert(PteFlags::REFERENCED);
    }

    /// Number of times this page was loaded on a fault
    #[inline]
    pub fn faults(&self) -> u64 {
        self.faults
    }
}

#[derive(Debug, Default)]
pub struct PageTable {
    tables: BTreeMap<ProcessId, BTreeMap<PageNumber, PageTableEntry>>,
}

impl PageTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create non-resident entries for `pages`. Pages already registered for
    /// the process are left untouched. Returns the number of new entries.
    pub fn register(&mut self, process_id: ProcessId, pages: Range<PageNumber>) -> usize {
        let table = self.tables.entry(process_id).or_default();
        let mut created = 0;
        for page in pages {
            table.entry(page).or_insert_with(|| {
                created += 1;
                PageTableEntry::new(process_id, page)
            });
        }
        created
    }

    pub fn lookup(&self, process_id: ProcessId, page: PageNumber) -> Result<&PageTableEntry> {
        self.tables
            .get(&process_id)
            .and_then(|table| table.get(&page))
            .ok_or(VmError::UnknownPage {
                process: process_id,
                page,
            })
    }

    pub fn lookup_mut(
        &mut self,
        process_id: ProcessId,
        page: PageNumber,
    ) -> Result<&mut PageTableEntry> {
        self.tables
            .get_mut(&process_id)
            .and_then(|table| table.get_mut(&page))
            .ok_or(VmError::UnknownPage {
                process: process_id,
                page,
            })
    }

    #[inline]
    pub fn get(&self, key: PageKey) -> Result<&PageTableEntry> {
        self.lookup(key.process, key.page)
    }

    #[inline]
    pub fn get_mut(&mut self, key: PageKey) -> Result<&mut PageTableEntry> {
        self.lookup_mut(key.process, key.page)
    }

    /// Transition `NonResident -> Resident` into `frame`
    pub fn mark_resident(&mut self, key: PageKey, frame: FrameNumber) -> Result<()> {
        let entry = self.get_mut(key)?;
        if entry.is_resident() {
            return Err(VmError::AlreadyResident {
                process: key.process,
                page: key.page,
            });
        }
        entry.flags.insert(PteFlags::RESIDENT);
        entry.frame = Some(frame);
        entry.faults += 1;
        Ok(())
    }

    /// Transition `Resident -> NonResident`, returning the frame it held
    pub fn mark_evicted(&mut self, key: PageKey) -> Result<FrameNumber> {
        let entry = self.get_mut(key)?;
        let frame = match entry.frame.take() {
            Some(frame) if entry.is_resident() => frame,
            _ => {
                return Err(VmError::NotResident {
                    process: key.process,
                    page: key.page,
                });
            }
        };
        // Eviction is a logical discard: the referenced bit goes with it
        entry.flags = PteFlags::empty();
        Ok(frame)
    }

    /// Remove every entry of a terminated process, returned in page order
    pub fn release_process(&mut self, process_id: ProcessId) -> Vec<PageTableEntry> {
        self.tables
            .remove(&process_id)
            .map(|table| table.into_values().collect())
            .unwrap_or_default()
    }

    /// Clear the reference flag of every entry
    pub fn clear_reference_flags(&mut self) {
        for entry in self.tables.values_mut().flat_map(|table| table.values_mut()) {
            entry.set_reference_flag(false);
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &PageTableEntry> {
        self.tables.values().flat_map(|table| table.values())
    }

    pub fn resident_entries(&self) -> impl Iterator<Item = &PageTableEntry> {
        self.entries().filter(|entry| entry.is_resident())
    }

    pub fn process_entries(&self, process_id: ProcessId) -> impl Iterator<Item = &PageTableEntry> {
        self.tables
            .get(&process_id)
            .into_iter()
            .flat_map(|table| table.values())
    }

    /// Total number of entries across all processes
    pub fn len(&self) -> usize {
        self.tables.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
