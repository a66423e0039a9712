use std::cmp::Reverse;

use log::debug;

use super::{NextUse, ReplacementStrategy, StrategyKind, VictimContext, resident_entries};
use crate::error::{Result, VmError};
use crate::memory::{FrameAllocator, FrameNumber};
use crate::page_table::PageTable;

/// Belady's optimal policy: evicts the page whose next reference lies
/// furthest in the future, pages never referenced again first.
///
/// Needs a [`ReferenceOracle`](super::ReferenceOracle); the manager lends one
/// for the duration of each selection.
#[derive(Debug, Default)]
pub struct Best;

impl Best {
    pub fn new() -> Self {
        Best
    }
}

/// Sort key where "never again" outranks every finite distance
#[inline]
fn distance(next: Option<NextUse>) -> (bool, Option<NextUse>) {
    (next.is_none(), next)
}

impl ReplacementStrategy for Best {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Best
    }

    fn needs_oracle(&self) -> bool {
        true
    }

    fn select_victim(
        &mut self,
        frames: &FrameAllocator,
        table: &mut PageTable,
        ctx: &VictimContext<'_>,
    ) -> Result<FrameNumber> {
        let oracle = ctx.oracle.ok_or_else(|| {
            VmError::NoVictim("optimal replacement needs a reference oracle".to_string())
        })?;
        let resident = resident_entries(frames, table)?;

        let (frame, next) = resident
            .iter()
            .map(|(frame, entry)| (*frame, oracle.next_use(entry.key())))
            .min_by_key(|&(frame, next)| (Reverse(distance(next)), frame))
            .ok_or_else(|| VmError::NoVictim("empty pool".to_string()))?;
        match next {
            Some(next) => debug!(
                "tick {}: Best picks frame {} (next use in {} ticks)",
                ctx.tick, frame, next.ticks_ahead
            ),
            None => debug!("tick {}: Best picks frame {} (never used again)", ctx.tick, frame),
        }
        Ok(frame)
    }
}
