//! Page replacement strategies.
//!
//! Every strategy honors the same fault contract and differs only in how it
//! picks a victim and what it records on each access. The manager chooses one
//! at construction time and never branches on which one it holds.

mod best;
mod lru;
mod mru;
mod nur;

use std::fmt;
use std::str::FromStr;

pub use best::Best;
pub use lru::Lru;
pub use mru::Mru;
pub use nur::Nur;

use crate::error::{Result, VmError};
use crate::memory::{FrameAllocator, FrameNumber};
use crate::page_table::{PageKey, PageTable, PageTableEntry};

/// Position of a page's next reference in the merged reference stream.
///
/// Orders first by ticks ahead, then by service slot within that tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NextUse {
    pub ticks_ahead: u64,
    pub slot: usize,
}

/// Future-knowledge capability. Only strategies that ask for it through
/// [`ReplacementStrategy::needs_oracle`] are handed one.
pub trait ReferenceOracle {
    /// `None` when the page is never referenced again
    fn next_use(&self, key: PageKey) -> Option<NextUse>;
}

/// Everything a strategy may consult besides the frame pool and page table
pub struct VictimContext<'a> {
    pub tick: u64,
    pub oracle: Option<&'a dyn ReferenceOracle>,
}

impl<'a> VictimContext<'a> {
    pub fn new(tick: u64) -> Self {
        VictimContext { tick, oracle: None }
    }

    pub fn with_oracle(tick: u64, oracle: &'a dyn ReferenceOracle) -> Self {
        VictimContext {
            tick,
            oracle: Some(oracle),
        }
    }
}

pub trait ReplacementStrategy: fmt::Debug {
    fn kind(&self) -> StrategyKind;

    /// Called on every hit and every page load
    fn notify_access(&mut self, entry: &mut PageTableEntry, tick: u64) {
        entry.touch(tick);
    }

    /// Pick the frame to evict. Only called when the pool is full; the
    /// returned frame is always occupied.
    fn select_victim(
        &mut self,
        frames: &FrameAllocator,
        table: &mut PageTable,
        ctx: &VictimContext<'_>,
    ) -> Result<FrameNumber>;

    /// Hook run once at the end of every tick
    fn end_tick(&mut self, _tick: u64, _table: &mut PageTable) {}

    fn needs_oracle(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Best,
    Lru,
    Mru,
    Nur,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::Best,
        StrategyKind::Lru,
        StrategyKind::Mru,
        StrategyKind::Nur,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Best => "best",
            StrategyKind::Lru => "lru",
            StrategyKind::Mru => "mru",
            StrategyKind::Nur => "nur",
        }
    }

    /// Instantiate the strategy. `nur_reset_interval` only matters for NUR.
    pub fn build(self, nur_reset_interval: u64) -> Box<dyn ReplacementStrategy> {
        match self {
            StrategyKind::Best => Box::new(Best::new()),
            StrategyKind::Lru => Box::new(Lru::new()),
            StrategyKind::Mru => Box::new(Mru::new()),
            StrategyKind::Nur => Box::new(Nur::new(nur_reset_interval)),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = VmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "best" | "opt" | "optimal" => Ok(StrategyKind::Best),
            "lru" => Ok(StrategyKind::Lru),
            "mru" => Ok(StrategyKind::Mru),
            "nur" | "nru" => Ok(StrategyKind::Nur),
            other => Err(VmError::InvalidConfig(format!(
                "unknown replacement strategy '{}'",
                other
            ))),
        }
    }
}

/// Resident entries in ascending frame order
pub(crate) fn resident_entries<'t>(
    frames: &FrameAllocator,
    table: &'t PageTable,
) -> Result<Vec<(FrameNumber, &'t PageTableEntry)>> {
    let resident = frames
        .occupied()
        .map(|(frame, key)| table.get(key).map(|entry| (frame, entry)))
        .collect::<Result<Vec<_>>>()?;
    if resident.is_empty() {
        return Err(VmError::NoVictim("no resident pages".to_string()));
    }
    Ok(resident)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Fill every frame with page `i` of process 0 and touch it at `ticks[i]`
    pub fn full_pool(ticks: &[u64]) -> (FrameAllocator, PageTable) {
        let mut frames = FrameAllocator::new(ticks.len());
        let mut table = PageTable::new();
        table.register(0, 0..ticks.len() as u64);
        for (page, &tick) in ticks.iter().enumerate() {
            let key = PageKey::new(0, page as u64);
            let frame = frames.allocate(key).unwrap();
            table.mark_resident(key, frame).unwrap();
            table.get_mut(key).unwrap().touch(tick);
        }
        (frames, table)
    }
}
