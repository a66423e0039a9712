use std::cmp::Reverse;

use log::debug;

use super::{ReplacementStrategy, StrategyKind, VictimContext, resident_entries};
use crate::error::{Result, VmError};
use crate::memory::{FrameAllocator, FrameNumber};
use crate::page_table::PageTable;

/// Most recently used: evicts the page with the newest `last_used_tick`
#[derive(Debug, Default)]
pub struct Mru;

impl Mru {
    pub fn new() -> Self {
        Mru
    }
}

impl ReplacementStrategy for Mru {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Mru
    }

    fn select_victim(
        &mut self,
        frames: &FrameAllocator,
        table: &mut PageTable,
        ctx: &VictimContext<'_>,
    ) -> Result<FrameNumber> {
        let resident = resident_entries(frames, table)?;
        let (frame, entry) = resident
            .iter()
            .min_by_key(|(frame, entry)| (Reverse(entry.last_used_tick()), *frame))
            .copied()
            .ok_or_else(|| VmError::NoVictim("empty pool".to_string()))?;
        debug!(
            "tick {}: MRU picks frame {} ({}, last used {})",
            ctx.tick,
            frame,
            entry.key(),
            entry.last_used_tick()
        );
        Ok(frame)
    }
}
