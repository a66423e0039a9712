use std::collections::BTreeSet;

use crate::error::{Result, VmError};
use crate::page_table::PageKey;

pub type FrameNumber = usize;

/// Physical memory: a fixed pool of frames, each free or owned by one page
#[derive(Debug, Clone)]
pub struct FrameAllocator {
    /// Owner of each frame, indexed by frame number
    frames: Vec<Option<PageKey>>,
    free: BTreeSet<FrameNumber>,
}

impl FrameAllocator {
    /// Create a pool of `capacity` free frames
    pub fn new(capacity: usize) -> Self {
        FrameAllocator {
            frames: vec![None; capacity],
            free: (0..capacity).collect(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    #[inline]
    pub fn occupied_count(&self) -> usize {
        self.capacity() - self.free_count()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    /// Hand the lowest-numbered free frame to `owner`, or `None` if the pool is full
    pub fn allocate(&mut self, owner: PageKey) -> Option<FrameNumber> {
        let frame = self.free.pop_first()?;
        self.frames[frame] = Some(owner);
        Some(frame)
    }

    /// Return `frame` to the pool, yielding the page that owned it
    pub fn free(&mut self, frame: FrameNumber) -> Result<PageKey> {
        let capacity = self.capacity();
        let slot = self
            .frames
            .get_mut(frame)
            .ok_or(VmError::FrameOutOfRange { frame, capacity })?;
        let owner = slot.take().ok_or(VmError::DoubleFree(frame))?;
        self.free.insert(frame);
        Ok(owner)
    }

    /// Page currently occupying `frame`
    #[inline]
    pub fn occupant(&self, frame: FrameNumber) -> Option<PageKey> {
        self.frames.get(frame).copied().flatten()
    }

    /// Occupied frames and their owners in ascending frame order
    pub fn occupied(&self) -> impl Iterator<Item = (FrameNumber, PageKey)> + '_ {
        self.frames
            .iter()
            .enumerate()
            .filter_map(|(frame, owner)| owner.map(|key| (frame, key)))
    }
}
