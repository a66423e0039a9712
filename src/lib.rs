pub mod constants;
pub mod error;
pub mod io;
pub mod memory;
pub mod page_table;
pub mod process;
pub mod replacement;
pub mod translation;
pub mod virtual_space;
pub mod vm_manager;

// Re-export commonly used items for convenience
pub use error::{Result, VmError};
pub use memory::{FrameAllocator, FrameNumber};
pub use page_table::{PageKey, PageNumber, PageTable, PageTableEntry, PteFlags};
pub use process::{Process, ProcessId, ProcessSpec, ProcessState, ReferenceTrace};
pub use replacement::{ReplacementStrategy, StrategyKind};
pub use translation::{AddressLayout, VirtualAddress, compose, decompose};
pub use vm_manager::{
    MemoryManager, ProcessSummary, RunSummary, SimulationConfig, TickReport, create_simulation,
};
