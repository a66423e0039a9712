//! Deterministic process model.
//!
//! A process is nothing more than a size and a pre-generated reference trace.
//! Because the whole trace is known up front, the optimal replacement
//! strategy can ask exactly when any page will be touched again.

use std::collections::HashMap;
use std::ops::Range;

use crate::error::{Result, VmError};
use crate::page_table::{PageKey, PageNumber};
use crate::replacement::{NextUse, ReferenceOracle};
use crate::translation::AddressLayout;

pub type ProcessId = u32;

/// Workload description handed in by a generator: size in bytes plus every
/// process-relative address the process will reference, in order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessSpec {
    pub size: u64,
    pub trace: Vec<u64>,
}

impl ProcessSpec {
    pub fn new(size: u64, trace: Vec<u64>) -> Self {
        ProcessSpec { size, trace }
    }
}

/// Immutable reference trace with a per-page index of positions
#[derive(Debug, Clone)]
pub struct ReferenceTrace {
    addresses: Vec<u64>,
    pages: Vec<PageNumber>,
    positions: HashMap<PageNumber, Vec<usize>>,
}

impl ReferenceTrace {
    /// Decompose every address once under `layout` and index positions by page
    pub fn new(addresses: Vec<u64>, layout: &AddressLayout) -> Result<Self> {
        let mut pages = Vec::with_capacity(addresses.len());
        let mut positions: HashMap<PageNumber, Vec<usize>> = HashMap::new();
        for (i, &addr) in addresses.iter().enumerate() {
            let va = layout.decompose(addr)?;
            pages.push(va.page);
            positions.entry(va.page).or_default().push(i);
        }
        Ok(ReferenceTrace {
            addresses,
            pages,
            positions,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    #[inline]
    pub fn address(&self, index: usize) -> Option<u64> {
        self.addresses.get(index).copied()
    }

    #[inline]
    pub fn page_at(&self, index: usize) -> Option<PageNumber> {
        self.pages.get(index).copied()
    }

    pub fn addresses(&self) -> &[u64] {
        &self.addresses
    }

    /// Highest address referenced, if any
    pub fn max_address(&self) -> Option<u64> {
        self.addresses.iter().copied().max()
    }

    pub fn distinct_pages(&self) -> usize {
        self.positions.len()
    }

    /// Smallest `j >= from` whose reference falls on `page`
    pub fn next_use_from(&self, page: PageNumber, from: usize) -> Option<usize> {
        let positions = self.positions.get(&page)?;
        let idx = positions.partition_point(|&pos| pos < from);
        positions.get(idx).copied()
    }

    /// Smallest `j > index` whose reference falls on `page`; `None` means never
    #[inline]
    pub fn next_use(&self, page: PageNumber, index: usize) -> Option<usize> {
        self.next_use_from(page, index.checked_add(1)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Pending,
    Active,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct Process {
    id: ProcessId,
    size: u64,
    page_count: u64,
    base_virtual_page: Option<PageNumber>,
    trace: ReferenceTrace,
    cursor: usize,
    state: ProcessState,
    faults: u64,
    admitted_at: Option<u64>,
}

impl Process {
    pub(crate) fn new(id: ProcessId, size: u64, page_count: u64, trace: ReferenceTrace) -> Self {
        Process {
            id,
            size,
            page_count,
            base_virtual_page: None,
            trace,
            cursor: 0,
            state: ProcessState::Pending,
            faults: 0,
            admitted_at: None,
        }
    }

    #[inline]
    pub fn id(&self) -> ProcessId {
        self.id
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn page_count(&self) -> u64 {
        self.page_count
    }

    /// First virtual page of the process, assigned at admission
    #[inline]
    pub fn base_virtual_page(&self) -> Option<PageNumber> {
        self.base_virtual_page
    }

    /// Global virtual pages owned by the process once admitted
    pub fn virtual_pages(&self) -> Option<Range<PageNumber>> {
        self.base_virtual_page
            .map(|base| base..base + self.page_count)
    }

    #[inline]
    pub fn trace(&self) -> &ReferenceTrace {
        &self.trace
    }

    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn state(&self) -> ProcessState {
        self.state
    }

    #[inline]
    pub fn faults(&self) -> u64 {
        self.faults
    }

    #[inline]
    pub fn admitted_at(&self) -> Option<u64> {
        self.admitted_at
    }

    /// Trace exhausted: every reference has been issued
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.trace.len()
    }

    pub(crate) fn admit(&mut self, base_virtual_page: PageNumber, tick: u64) {
        self.base_virtual_page = Some(base_virtual_page);
        self.admitted_at = Some(tick);
        self.state = ProcessState::Active;
    }

    pub(crate) fn terminate(&mut self) {
        self.state = ProcessState::Terminated;
    }

    pub(crate) fn advance(&mut self) {
        self.cursor += 1;
    }

    pub(crate) fn record_fault(&mut self) {
        self.faults += 1;
    }

    /// Relocate a process-relative page into the global virtual space
    #[inline]
    fn relocate(&self, local_page: PageNumber) -> Option<PageNumber> {
        self.base_virtual_page.map(|base| base + local_page)
    }

    /// Next reference as a global virtual address, `None` once the trace is
    /// exhausted or before admission
    pub fn next_virtual_address(&self, layout: &AddressLayout) -> Result<Option<u64>> {
        let Some(local) = self.trace.address(self.cursor) else {
            return Ok(None);
        };
        let va = layout.decompose(local)?;
        match self.relocate(va.page) {
            Some(page) => layout.compose(page, va.offset).map(Some),
            None => Ok(None),
        }
    }

    /// References remaining until the process next touches global `page`,
    /// counting the one at the cursor as zero
    pub fn references_until(&self, page: PageNumber) -> Option<usize> {
        let base = self.base_virtual_page?;
        let local = page.checked_sub(base).filter(|&p| p < self.page_count)?;
        self.trace
            .next_use_from(local, self.cursor)
            .map(|j| j - self.cursor)
    }
}

/// Read-only view over the active processes, lent to the optimal strategy
/// during victim selection.
///
/// Processes in slots before `serviced` have already issued this tick's
/// reference, so their next reference lands one tick later than the others.
#[derive(Debug, Clone, Copy)]
pub struct TraceOracle<'a> {
    processes: &'a [Process],
    serviced: usize,
}

impl<'a> TraceOracle<'a> {
    /// `processes` must be sorted by id, in service order
    pub fn new(processes: &'a [Process], serviced: usize) -> Self {
        TraceOracle {
            processes,
            serviced,
        }
    }
}

impl ReferenceOracle for TraceOracle<'_> {
    fn next_use(&self, key: PageKey) -> Option<NextUse> {
        let slot = self
            .processes
            .binary_search_by_key(&key.process, Process::id)
            .ok()?;
        let ahead = self.processes[slot].references_until(key.page)? as u64;
        let ticks_ahead = if slot < self.serviced { ahead + 1 } else { ahead };
        Some(NextUse { ticks_ahead, slot })
    }
}

/// Pages needed to hold `size` bytes
pub fn pages_for(size: u64, layout: &AddressLayout) -> u64 {
    size.div_ceil(layout.page_size())
}

/// Check a submission against the layout and build its trace.
///
/// Every address must fall inside `0..size` rounded up to whole pages.
pub(crate) fn validate_spec(
    spec: ProcessSpec,
    layout: &AddressLayout,
) -> Result<(u64, ReferenceTrace)> {
    if spec.size == 0 {
        return Err(VmError::InvalidConfig(
            "process size must be at least one byte".to_string(),
        ));
    }
    let page_count = pages_for(spec.size, layout);
    if page_count > layout.page_count() {
        return Err(VmError::CapacityExceeded {
            requested: page_count,
            capacity: layout.page_count(),
        });
    }

    let trace = ReferenceTrace::new(spec.trace, layout)?;
    let limit = page_count * layout.page_size();
    if let Some(addr) = trace.max_address().filter(|&addr| addr >= limit) {
        return Err(VmError::InvalidAddress {
            value: addr,
            detail: format!("outside the process's {} pages", page_count),
        });
    }
    Ok((page_count, trace))
}
