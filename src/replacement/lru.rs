use log::debug;

use super::{ReplacementStrategy, StrategyKind, VictimContext, resident_entries};
use crate::error::{Result, VmError};
use crate::memory::{FrameAllocator, FrameNumber};
use crate::page_table::PageTable;

/// Least recently used: evicts the page with the oldest `last_used_tick`
#[derive(Debug, Default)]
pub struct Lru;

impl Lru {
    pub fn new() -> Self {
        Lru
    }
}

impl ReplacementStrategy for Lru {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Lru
    }

    fn select_victim(
        &mut self,
        frames: &FrameAllocator,
        table: &mut PageTable,
        ctx: &VictimContext<'_>,
    ) -> Result<FrameNumber> {
        let resident = resident_entries(frames, table)?;
        // Entries arrive in frame order, so equal ticks resolve to the lowest frame
        let (frame, entry) = resident
            .iter()
            .min_by_key(|(frame, entry)| (entry.last_used_tick(), *frame))
            .copied()
            .ok_or_else(|| VmError::NoVictim("empty pool".to_string()))?;
        debug!(
            "tick {}: LRU picks frame {} ({}, last used {})",
            ctx.tick,
            frame,
            entry.key(),
            entry.last_used_tick()
        );
        Ok(frame)
    }
}
