//! The operating-system side of the simulation.
//!
//! `MemoryManager` admits processes, drives the tick loop and resolves page
//! faults against a shared frame pool using whichever replacement strategy it
//! was built with. Everything runs on one logical thread; within a tick the
//! active processes are serviced in ascending id order.

use std::collections::{BTreeSet, VecDeque};

use log::{debug, info, trace, warn};

use crate::constants::*;
use crate::error::{Result, VmError};
use crate::memory::{FrameAllocator, FrameNumber};
use crate::page_table::{PageKey, PageNumber, PageTable, PageTableEntry};
use crate::process::{Process, ProcessId, ProcessSpec, ProcessState, TraceOracle, validate_spec};
use crate::replacement::{ReplacementStrategy, StrategyKind, VictimContext};
use crate::translation::AddressLayout;
use crate::virtual_space::VirtualSpace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationConfig {
    pub page_size_bits: u32,
    pub address_bits: u32,
    pub frame_count: usize,
    /// Cap on concurrently active processes
    pub max_active_processes: usize,
    pub strategy: StrategyKind,
    pub nur_reset_interval: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            page_size_bits: DEFAULT_PAGE_SIZE_BITS,
            address_bits: DEFAULT_ADDRESS_BITS,
            frame_count: DEFAULT_FRAME_COUNT,
            max_active_processes: DEFAULT_MAX_ACTIVE,
            strategy: StrategyKind::Lru,
            nur_reset_interval: DEFAULT_NUR_RESET_INTERVAL,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<AddressLayout> {
        let layout = AddressLayout::new(self.address_bits, self.page_size_bits)?;
        if self.frame_count == 0 {
            return Err(VmError::InvalidConfig("frame count must be positive".to_string()));
        }
        if self.max_active_processes == 0 {
            return Err(VmError::InvalidConfig(
                "at least one process must be allowed to run".to_string(),
            ));
        }
        if self.nur_reset_interval == 0 {
            return Err(VmError::InvalidConfig(
                "NUR reset interval must be positive".to_string(),
            ));
        }
        Ok(layout)
    }
}

/// Per-tick statistics for a reporting layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub tick: u64,
    pub faults: u64,
    pub evictions: u64,
    pub hits: u64,
    pub admitted: usize,
    pub retired: usize,
    pub active_count: usize,
    pub pending_count: usize,
    pub occupied_frames: usize,
}

/// Lifetime statistics of a terminated process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSummary {
    pub id: ProcessId,
    pub references: u64,
    pub faults: u64,
    pub admitted_at: u64,
    pub terminated_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub strategy: StrategyKind,
    pub ticks: u64,
    pub faults: u64,
    pub evictions: u64,
    pub hits: u64,
    pub processes: Vec<ProcessSummary>,
}

impl RunSummary {
    pub fn references(&self) -> u64 {
        self.faults + self.hits
    }

    /// Faults per reference, 0.0 for an empty run
    pub fn fault_rate(&self) -> f64 {
        match self.references() {
            0 => 0.0,
            n => self.faults as f64 / n as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Totals {
    faults: u64,
    evictions: u64,
    hits: u64,
}

/// Outcome of servicing one reference
enum Access {
    Hit,
    Fault { evicted: Option<PageKey> },
}

#[derive(Debug)]
pub struct MemoryManager {
    config: SimulationConfig,
    layout: AddressLayout,
    page_table: PageTable,
    frames: FrameAllocator,
    strategy: Box<dyn ReplacementStrategy>,
    virtual_space: VirtualSpace,
    pending: VecDeque<Process>,
    /// Sorted by id: this is the service order
    active: Vec<Process>,
    finished: Vec<ProcessSummary>,
    next_process_id: ProcessId,
    tick: u64,
    totals: Totals,
}

/// Build a simulation from its five knobs, using the default NUR reset interval
pub fn create_simulation(
    page_size_bits: u32,
    address_bits: u32,
    frame_count: usize,
    max_active_processes: usize,
    strategy: StrategyKind,
) -> Result<MemoryManager> {
    MemoryManager::new(SimulationConfig {
        page_size_bits,
        address_bits,
        frame_count,
        max_active_processes,
        strategy,
        ..SimulationConfig::default()
    })
}

impl MemoryManager {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        let layout = config.validate()?;
        debug!(
            "new simulation: {}-bit addresses, {}-byte pages, {} frames, strategy {}",
            layout.address_bits(),
            layout.page_size(),
            config.frame_count,
            config.strategy
        );
        Ok(MemoryManager {
            config,
            layout,
            page_table: PageTable::new(),
            frames: FrameAllocator::new(config.frame_count),
            strategy: config.strategy.build(config.nur_reset_interval),
            virtual_space: VirtualSpace::new(layout.page_count()),
            pending: VecDeque::new(),
            active: Vec::new(),
            finished: Vec::new(),
            next_process_id: 0,
            tick: 0,
            totals: Totals::default(),
        })
    }

    /// Queue a process. `trace` holds process-relative addresses in
    /// `0..size`; its length is the process lifetime in ticks.
    pub fn submit_process(&mut self, trace: Vec<u64>, size: u64) -> Result<ProcessId> {
        self.submit(ProcessSpec::new(size, trace))
    }

    pub fn submit(&mut self, spec: ProcessSpec) -> Result<ProcessId> {
        let size = spec.size;
        let (page_count, trace) = validate_spec(spec, &self.layout).inspect_err(|e| {
            warn!("rejected process of {} bytes: {}", size, e);
        })?;

        let id = self.next_process_id;
        self.next_process_id += 1;
        debug!(
            "queued process {} ({} bytes, {} pages, {} references over {} distinct pages)",
            id,
            size,
            page_count,
            trace.len(),
            trace.distinct_pages()
        );
        self.pending.push_back(Process::new(id, size, page_count, trace));
        Ok(id)
    }

    /// Queue every process in order, stopping at the first rejection
    pub fn submit_all<I>(&mut self, specs: I) -> Result<Vec<ProcessId>>
    where
        I: IntoIterator<Item = ProcessSpec>,
    {
        specs.into_iter().map(|spec| self.submit(spec)).collect()
    }

    /// Run one tick: admit, service every active process once, retire the
    /// finished ones
    pub fn advance_tick(&mut self) -> Result<TickReport> {
        self.tick += 1;
        let mut report = TickReport {
            tick: self.tick,
            ..TickReport::default()
        };

        report.admitted = self.admit()?;

        for slot in 0..self.active.len() {
            match self.service(slot)? {
                Some(Access::Hit) => report.hits += 1,
                Some(Access::Fault { evicted }) => {
                    report.faults += 1;
                    if evicted.is_some() {
                        report.evictions += 1;
                    }
                }
                None => {}
            }
        }

        report.retired = self.retire()?;
        self.strategy.end_tick(self.tick, &mut self.page_table);

        self.totals.faults += report.faults;
        self.totals.evictions += report.evictions;
        self.totals.hits += report.hits;

        report.active_count = self.active.len();
        report.pending_count = self.pending.len();
        report.occupied_frames = self.frames.occupied_count();
        Ok(report)
    }

    /// Step until every process has terminated or `max_ticks` more ticks ran
    pub fn run(&mut self, max_ticks: Option<u64>) -> Result<RunSummary> {
        let start = self.tick;
        while !self.is_finished() {
            if max_ticks.is_some_and(|budget| self.tick - start >= budget) {
                warn!(
                    "tick budget exhausted with {} active and {} pending processes",
                    self.active.len(),
                    self.pending.len()
                );
                break;
            }
            self.advance_tick()?;
        }
        info!(
            "{}: {} faults, {} evictions, {} hits over {} ticks",
            self.strategy.kind(),
            self.totals.faults,
            self.totals.evictions,
            self.totals.hits,
            self.tick
        );
        Ok(self.summary())
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            strategy: self.strategy.kind(),
            ticks: self.tick,
            faults: self.totals.faults,
            evictions: self.totals.evictions,
            hits: self.totals.hits,
            processes: self.finished.clone(),
        }
    }

    /// Admit pending processes in arrival order while slots and virtual space
    /// allow. A head that does not fit blocks the ones behind it.
    fn admit(&mut self) -> Result<usize> {
        let mut admitted = 0;
        while self.active.len() < self.config.max_active_processes {
            let Some(head) = self.pending.front() else {
                break;
            };
            let Some(base) = self.virtual_space.reserve(head.page_count()) else {
                trace!(
                    "tick {}: process {} needs {} contiguous pages ({} free, largest gap {})",
                    self.tick,
                    head.id(),
                    head.page_count(),
                    self.virtual_space.free_pages(),
                    self.virtual_space
                        .free_ranges()
                        .iter()
                        .map(|&(_, len)| len)
                        .max()
                        .unwrap_or(0)
                );
                break;
            };
            let Some(mut process) = self.pending.pop_front() else {
                break;
            };

            process.admit(base, self.tick);
            self.page_table
                .register(process.id(), base..base + process.page_count());
            debug!(
                "tick {}: admitted process {} at virtual pages {}..{}",
                self.tick,
                process.id(),
                base,
                base + process.page_count()
            );

            let at = self.active.partition_point(|p| p.id() < process.id());
            self.active.insert(at, process);
            admitted += 1;
        }
        Ok(admitted)
    }

    /// Issue the next reference of the process in `slot`
    fn service(&mut self, slot: usize) -> Result<Option<Access>> {
        let process = &self.active[slot];
        let Some(addr) = process.next_virtual_address(&self.layout)? else {
            return Ok(None);
        };
        let id = process.id();
        let va = self.layout.decompose(addr)?;
        let key = PageKey::new(id, va.page);

        let access = if self.page_table.get(key)?.is_resident() {
            let entry = self.page_table.get_mut(key)?;
            self.strategy.notify_access(entry, self.tick);
            trace!("tick {}: {} hit {}", self.tick, id, va);
            Access::Hit
        } else {
            let (frame, evicted) = self.resolve_fault(slot, key)?;
            self.active[slot].record_fault();
            match evicted {
                Some(victim) => debug!(
                    "tick {}: fault on {} ({}), evicted {} from frame {}",
                    self.tick, key, va, victim, frame
                ),
                None => debug!(
                    "tick {}: fault on {} ({}), loaded into free frame {}",
                    self.tick, key, va, frame
                ),
            }
            Access::Fault { evicted }
        };

        self.active[slot].advance();
        Ok(Some(access))
    }

    /// Load `key` into a frame, evicting a victim chosen by the strategy when
    /// the pool is full
    fn resolve_fault(
        &mut self,
        slot: usize,
        key: PageKey,
    ) -> Result<(FrameNumber, Option<PageKey>)> {
        let evicted = if self.frames.is_full() {
            Some(self.evict(slot)?)
        } else {
            None
        };
        let frame = self.frames.allocate(key).ok_or_else(|| {
            VmError::NoVictim(format!("no frame free for {} after eviction", key))
        })?;

        self.page_table.mark_resident(key, frame)?;
        let entry = self.page_table.get_mut(key)?;
        self.strategy.notify_access(entry, self.tick);
        Ok((frame, evicted))
    }

    /// Ask the strategy for a victim and free its frame. Returns the evicted page.
    fn evict(&mut self, slot: usize) -> Result<PageKey> {
        let oracle = TraceOracle::new(&self.active, slot);
        let ctx = if self.strategy.needs_oracle() {
            VictimContext::with_oracle(self.tick, &oracle)
        } else {
            VictimContext::new(self.tick)
        };
        let victim = self
            .strategy
            .select_victim(&self.frames, &mut self.page_table, &ctx)?;

        let owner = self.frames.free(victim)?;
        self.page_table.mark_evicted(owner)?;
        Ok(owner)
    }

    /// Terminate every process whose trace is exhausted
    fn retire(&mut self) -> Result<usize> {
        let (done, running): (Vec<Process>, Vec<Process>) = std::mem::take(&mut self.active)
            .into_iter()
            .partition(Process::is_exhausted);
        self.active = running;

        let retired = done.len();
        for mut process in done {
            let freed = self.release_process(process.id())?;
            if let Some(base) = process.base_virtual_page() {
                self.virtual_space.release(base);
            }
            process.terminate();
            info!(
                "tick {}: process {} terminated after {} references, {} faults ({} frames freed)",
                self.tick,
                process.id(),
                process.cursor(),
                process.faults(),
                freed
            );
            self.finished.push(ProcessSummary {
                id: process.id(),
                references: process.cursor() as u64,
                faults: process.faults(),
                admitted_at: process.admitted_at().unwrap_or(self.tick),
                terminated_at: self.tick,
            });
        }
        Ok(retired)
    }

    /// Drop all page-table entries of a process and free its frames.
    /// Returns the number of frames freed.
    fn release_process(&mut self, id: ProcessId) -> Result<usize> {
        let mut freed = 0;
        for entry in self.page_table.release_process(id) {
            if let Some(frame) = entry.frame_number() {
                self.frames.free(frame)?;
                freed += 1;
            }
        }
        Ok(freed)
    }

    #[inline]
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn is_finished(&self) -> bool {
        self.pending.is_empty() && self.active.is_empty()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn layout(&self) -> &AddressLayout {
        &self.layout
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    pub fn frames(&self) -> &FrameAllocator {
        &self.frames
    }

    #[inline]
    pub fn occupied_frames(&self) -> usize {
        self.frames.occupied_count()
    }

    #[inline]
    pub fn free_frames(&self) -> usize {
        self.frames.free_count()
    }

    /// Every resident page as `(process, virtual page)`
    pub fn resident_pages(&self) -> BTreeSet<(ProcessId, PageNumber)> {
        self.page_table
            .resident_entries()
            .map(|entry| (entry.process_id, entry.virtual_page_number))
            .collect()
    }

    /// Page-table entry of the page occupying `frame`
    pub fn frame_owner(&self, frame: FrameNumber) -> Option<&PageTableEntry> {
        let key = self.frames.occupant(frame)?;
        self.page_table.get(key).ok()
    }

    pub fn active_processes(&self) -> &[Process] {
        &self.active
    }

    pub fn pending_processes(&self) -> impl Iterator<Item = &Process> {
        self.pending.iter()
    }

    pub fn finished_processes(&self) -> &[ProcessSummary] {
        &self.finished
    }

    pub fn process_state(&self, id: ProcessId) -> Option<ProcessState> {
        if self.active.iter().any(|p| p.id() == id) {
            Some(ProcessState::Active)
        } else if self.pending.iter().any(|p| p.id() == id) {
            Some(ProcessState::Pending)
        } else if self.finished.iter().any(|p| p.id == id) {
            Some(ProcessState::Terminated)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(frames: usize, max_active: usize, strategy: StrategyKind) -> MemoryManager {
        create_simulation(4, 8, frames, max_active, strategy).unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(SimulationConfig::default().validate().is_ok());

        let bad = [
            SimulationConfig {
                frame_count: 0,
                ..Default::default()
            },
            SimulationConfig {
                max_active_processes: 0,
                ..Default::default()
            },
            SimulationConfig {
                nur_reset_interval: 0,
                ..Default::default()
            },
            SimulationConfig {
                page_size_bits: 16,
                address_bits: 16,
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(matches!(
                MemoryManager::new(config),
                Err(VmError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_submit_assigns_sequential_ids() {
        let mut vm = manager(2, 1, StrategyKind::Lru);
        assert_eq!(vm.submit_process(vec![0], 16).unwrap(), 0);
        assert_eq!(vm.submit_process(vec![0], 16).unwrap(), 1);
        assert_eq!(vm.process_state(1), Some(ProcessState::Pending));
        assert_eq!(vm.process_state(2), None);
    }

    #[test]
    fn test_submit_rejections_are_not_queued() {
        let mut vm = manager(2, 1, StrategyKind::Lru);
        assert!(matches!(
            vm.submit_process(vec![], 257),
            Err(VmError::CapacityExceeded { requested: 17, capacity: 16 })
        ));
        assert!(matches!(
            vm.submit_process(vec![0x20], 0x20),
            Err(VmError::InvalidAddress { value: 0x20, .. })
        ));
        assert!(vm.is_finished());
        // Rejected submissions do not consume ids
        assert_eq!(vm.submit_process(vec![0], 1).unwrap(), 0);
    }

    #[test]
    fn test_admission_registers_without_loading() {
        let mut vm = manager(2, 2, StrategyKind::Lru);
        vm.submit_process(vec![0x00, 0x00], 0x30).unwrap();
        vm.submit_process(vec![0x10, 0x10], 0x20).unwrap();

        let report = vm.advance_tick().unwrap();
        assert_eq!(report.admitted, 2);
        // Second process occupies the virtual pages after the first
        assert_eq!(vm.active_processes()[1].virtual_pages(), Some(3..5));
        assert_eq!(vm.page_table().len(), 5);
        // Only the two referenced pages were loaded
        assert_eq!(vm.resident_pages(), BTreeSet::from([(0, 0), (1, 4)]));
    }

    #[test]
    fn test_admission_cap_is_fifo() {
        let mut vm = manager(4, 1, StrategyKind::Lru);
        vm.submit_process(vec![0x00, 0x01], 16).unwrap();
        vm.submit_process(vec![0x00], 16).unwrap();

        let report = vm.advance_tick().unwrap();
        assert_eq!((report.active_count, report.pending_count), (1, 1));
        assert_eq!(vm.process_state(1), Some(ProcessState::Pending));

        let report = vm.advance_tick().unwrap();
        assert_eq!(report.retired, 1);
        assert_eq!(vm.process_state(0), Some(ProcessState::Terminated));

        let report = vm.advance_tick().unwrap();
        assert_eq!(report.admitted, 1);
        assert_eq!(report.retired, 1);
        assert!(vm.is_finished());
    }

    #[test]
    fn test_head_of_line_waits_for_virtual_space() {
        let mut vm = manager(2, 3, StrategyKind::Lru);
        // 12 of 16 virtual pages
        vm.submit_process(vec![0x00, 0x00], 12 * 16).unwrap();
        // 8 pages: cannot fit beside the first
        vm.submit_process(vec![0x00], 8 * 16).unwrap();
        // 1 page: would fit, but must not overtake
        vm.submit_process(vec![0x00], 16).unwrap();

        let report = vm.advance_tick().unwrap();
        assert_eq!(report.admitted, 1);
        assert_eq!(report.pending_count, 2);

        vm.advance_tick().unwrap();
        let report = vm.advance_tick().unwrap();
        assert_eq!(report.admitted, 2);
    }

    #[test]
    fn test_hit_and_fault_counts() {
        let mut vm = manager(2, 1, StrategyKind::Lru);
        vm.submit_process(vec![0x00, 0x10, 0x00, 0x20], 0x30).unwrap();

        let reports: Vec<TickReport> = (0..4).map(|_| vm.advance_tick().unwrap()).collect();
        let faults: Vec<u64> = reports.iter().map(|r| r.faults).collect();
        let evictions: Vec<u64> = reports.iter().map(|r| r.evictions).collect();
        assert_eq!(faults, vec![1, 1, 0, 1]);
        assert_eq!(evictions, vec![0, 0, 0, 1]);
        assert_eq!(reports[2].hits, 1);
        assert_eq!(reports[3].occupied_frames, 0);
        assert!(vm.is_finished());

        let summary = vm.summary();
        assert_eq!(summary.faults, 3);
        assert_eq!(summary.hits, 1);
        assert_eq!(summary.references(), 4);
        assert_eq!(summary.processes[0].faults, 3);
        assert_eq!(summary.processes[0].references, 4);
    }

    #[test]
    fn test_frame_owner_and_resident_pages() {
        let mut vm = manager(2, 1, StrategyKind::Lru);
        vm.submit_process(vec![0x10, 0x00, 0x10], 0x20).unwrap();
        vm.advance_tick().unwrap();
        vm.advance_tick().unwrap();

        assert_eq!(vm.frame_owner(0).unwrap().virtual_page_number, 1);
        assert_eq!(vm.frame_owner(1).unwrap().virtual_page_number, 0);
        assert!(vm.frame_owner(2).is_none());
        assert_eq!(vm.resident_pages(), BTreeSet::from([(0, 0), (0, 1)]));
        assert_eq!(vm.occupied_frames() + vm.free_frames(), 2);
    }

    #[test]
    fn test_eviction_only_when_pool_full() {
        let mut vm = manager(2, 1, StrategyKind::Lru);
        vm.submit_process(vec![0x00, 0x10, 0x20, 0x20], 0x30).unwrap();

        vm.advance_tick().unwrap();
        let report = vm.advance_tick().unwrap();
        assert_eq!((report.faults, report.evictions), (1, 0));
        assert_eq!(vm.free_frames(), 0);

        // Page 0 in frame 0 is least recent; page 2 takes its frame
        let report = vm.advance_tick().unwrap();
        assert_eq!((report.faults, report.evictions), (1, 1));
        assert_eq!(vm.frame_owner(0).unwrap().virtual_page_number, 2);
        assert!(!vm.page_table().lookup(0, 0).unwrap().is_resident());
    }

    #[test]
    fn test_empty_trace_retires_immediately() {
        let mut vm = manager(2, 1, StrategyKind::Lru);
        vm.submit_process(vec![], 16).unwrap();
        let report = vm.advance_tick().unwrap();
        assert_eq!((report.admitted, report.retired), (1, 1));
        assert_eq!(report.faults + report.hits, 0);
        assert!(vm.is_finished());
    }

    #[test]
    fn test_run_respects_budget() {
        let mut vm = manager(1, 1, StrategyKind::Mru);
        vm.submit_process(vec![0x00; 10], 16).unwrap();

        let summary = vm.run(Some(4)).unwrap();
        assert_eq!(summary.ticks, 4);
        assert!(!vm.is_finished());

        let summary = vm.run(None).unwrap();
        assert_eq!(summary.ticks, 10);
        assert_eq!(summary.faults, 1);
        assert_eq!(summary.hits, 9);
        assert!((summary.fault_rate() - 0.1).abs() < 1e-9);
    }
}
