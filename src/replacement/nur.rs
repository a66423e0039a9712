use log::debug;

use super::{ReplacementStrategy, StrategyKind, VictimContext};
use crate::error::{Result, VmError};
use crate::memory::{FrameAllocator, FrameNumber};
use crate::page_table::PageTable;

/// Not used recently: a clock sweep over the frames looking for a clear
/// reference flag.
///
/// The sweep starts at the frame after the last one evicted and clears every
/// flag it passes. When every flag was set the first lap clears them all and
/// the second lap takes the starting frame. Independently, every
/// `reset_interval` ticks all reference flags are cleared.
#[derive(Debug)]
pub struct Nur {
    reset_interval: u64,
    last_evicted: Option<FrameNumber>,
}

impl Nur {
    pub fn new(reset_interval: u64) -> Self {
        Nur {
            reset_interval,
            last_evicted: None,
        }
    }

    /// Frame the next sweep starts from
    pub fn sweep_start(&self, capacity: usize) -> FrameNumber {
        match self.last_evicted {
            Some(frame) if capacity > 0 => (frame + 1) % capacity,
            _ => 0,
        }
    }
}

impl ReplacementStrategy for Nur {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Nur
    }

    fn select_victim(
        &mut self,
        frames: &FrameAllocator,
        table: &mut PageTable,
        ctx: &VictimContext<'_>,
    ) -> Result<FrameNumber> {
        let capacity = frames.capacity();
        let start = self.sweep_start(capacity);

        for step in 0..2 * capacity {
            let frame = (start + step) % capacity;
            let Some(key) = frames.occupant(frame) else {
                continue;
            };
            let entry = table.get_mut(key)?;
            if !entry.reference_flag() {
                debug!(
                    "tick {}: NUR picks frame {} ({}) after {} steps from frame {}",
                    ctx.tick, frame, key, step, start
                );
                self.last_evicted = Some(frame);
                return Ok(frame);
            }
            entry.set_reference_flag(false);
        }
        Err(VmError::NoVictim("no resident pages".to_string()))
    }

    fn end_tick(&mut self, tick: u64, table: &mut PageTable) {
        if self.reset_interval > 0 && tick % self.reset_interval == 0 {
            debug!("tick {}: NUR clears all reference flags", tick);
            table.clear_reference_flags();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_table::PageKey;
    use crate::replacement::test_support::full_pool;

    fn select(nur: &mut Nur, frames: &FrameAllocator, table: &mut PageTable) -> FrameNumber {
        nur.select_victim(frames, table, &VictimContext::new(0)).unwrap()
    }

    #[test]
    fn test_picks_first_clear_flag() {
        let (frames, mut table) = full_pool(&[1, 2, 3]);
        table.lookup_mut(0, 1).unwrap().set_reference_flag(false);

        let mut nur = Nur::new(8);
        assert_eq!(select(&mut nur, &frames, &mut table), 1);
        // Frame 0 was swept over and lost its flag
        assert!(!table.lookup(0, 0).unwrap().reference_flag());
        assert!(table.lookup(0, 2).unwrap().reference_flag());
    }

    #[test]
    fn test_all_flags_set_takes_sweep_start() {
        let (frames, mut table) = full_pool(&[1, 2, 3]);
        let mut nur = Nur::new(8);

        assert_eq!(select(&mut nur, &frames, &mut table), 0);
        assert!(table.entries().all(|e| !e.reference_flag()));
    }

    #[test]
    fn test_sweep_resumes_after_last_evicted() {
        let (frames, mut table) = full_pool(&[1, 2, 3]);
        let mut nur = Nur::new(8);
        assert_eq!(nur.sweep_start(3), 0);

        assert_eq!(select(&mut nur, &frames, &mut table), 0);
        assert_eq!(nur.sweep_start(3), 1);
        // Flags were all cleared by the first sweep, so the next victim is frame 1
        assert_eq!(select(&mut nur, &frames, &mut table), 1);
        assert_eq!(select(&mut nur, &frames, &mut table), 2);
        assert_eq!(nur.sweep_start(3), 0);
    }

    #[test]
    fn test_notify_sets_flag() {
        let (_frames, mut table) = full_pool(&[1]);
        table.clear_reference_flags();
        let mut nur = Nur::new(8);
        nur.notify_access(table.get_mut(PageKey::new(0, 0)).unwrap(), 5);
        assert!(table.lookup(0, 0).unwrap().reference_flag());
    }

    #[test]
    fn test_periodic_reset() {
        let (_frames, mut table) = full_pool(&[1, 2, 3]);
        let mut nur = Nur::new(2);

        nur.end_tick(3, &mut table);
        assert!(table.entries().all(|e| e.reference_flag()));

        nur.end_tick(4, &mut table);
        assert!(table.entries().all(|e| !e.reference_flag()));
    }

    #[test]
    fn test_empty_pool() {
        let frames = FrameAllocator::new(2);
        let mut table = PageTable::new();
        let mut nur = Nur::new(2);
        assert!(matches!(
            nur.select_victim(&frames, &mut table, &VictimContext::new(1)),
            Err(VmError::NoVictim(_))
        ));
    }
}
