pub const DEFAULT_PAGE_SIZE_BITS: u32 = 4;
pub const DEFAULT_ADDRESS_BITS: u32 = 16;

pub const DEFAULT_FRAME_COUNT: usize = 8;
pub const DEFAULT_MAX_ACTIVE: usize = 4;

// NUR clears every reference flag once per this many ticks
pub const DEFAULT_NUR_RESET_INTERVAL: u64 = 8;

pub const MAX_ADDRESS_BITS: u32 = 63;

/// Page size in bytes for a given number of offset bits
#[inline]
pub const fn page_size(page_size_bits: u32) -> u64 {
    1 << page_size_bits
}
