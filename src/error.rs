//! Error kinds surfaced by the paging core.
//!
//! None of these describe a page fault: faults are ordinary control flow.
//! Every variant reports bad input or a broken bookkeeping invariant.

use thiserror::Error;

use crate::memory::FrameNumber;
use crate::page_table::PageNumber;
use crate::process::ProcessId;

pub type Result<T> = std::result::Result<T, VmError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    /// Address (or page/offset component) outside the configured layout.
    #[error("invalid address {value:#x}: {detail}")]
    InvalidAddress { value: u64, detail: String },

    /// Page-table lookup for a page the process never registered.
    #[error("process {process} has no page {page} registered")]
    UnknownPage { process: ProcessId, page: PageNumber },

    /// Frame returned to the pool while already free.
    #[error("frame {0} freed twice")]
    DoubleFree(FrameNumber),

    #[error("frame {frame} out of range (pool holds {capacity} frames)")]
    FrameOutOfRange { frame: FrameNumber, capacity: usize },

    #[error("page {page} of process {process} is already resident")]
    AlreadyResident { process: ProcessId, page: PageNumber },

    #[error("page {page} of process {process} is not resident")]
    NotResident { process: ProcessId, page: PageNumber },

    /// Frame pool full with nothing evictable, or a strategy lacking what it
    /// needs to choose.
    #[error("no victim available: {0}")]
    NoVictim(String),

    /// Process needs more pages than the address space can ever provide.
    #[error("process needs {requested} pages but only {capacity} exist")]
    CapacityExceeded { requested: u64, capacity: u64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
