use crate::constants::{MAX_ADDRESS_BITS, page_size};
use crate::error::{Result, VmError};

/// Bit geometry of a virtual address space: total width and offset width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressLayout {
    address_bits: u32,
    page_size_bits: u32,
}

impl AddressLayout {
    pub fn new(address_bits: u32, page_size_bits: u32) -> Result<Self> {
        if address_bits == 0 || address_bits > MAX_ADDRESS_BITS {
            return Err(VmError::InvalidConfig(format!(
                "address width must be 1..={} bits, got {}",
                MAX_ADDRESS_BITS, address_bits
            )));
        }
        if page_size_bits >= address_bits {
            return Err(VmError::InvalidConfig(format!(
                "page size bits ({}) must be smaller than address bits ({})",
                page_size_bits, address_bits
            )));
        }
        Ok(AddressLayout {
            address_bits,
            page_size_bits,
        })
    }

    #[inline]
    pub fn address_bits(&self) -> u32 {
        self.address_bits
    }

    #[inline]
    pub fn page_size_bits(&self) -> u32 {
        self.page_size_bits
    }

    #[inline]
    pub fn page_size(&self) -> u64 {
        page_size(self.page_size_bits)
    }

    /// Highest address representable in `address_bits`
    #[inline]
    pub fn max_address(&self) -> u64 {
        (1u64 << self.address_bits) - 1
    }

    #[inline]
    pub fn offset_mask(&self) -> u64 {
        self.page_size() - 1
    }

    /// Mask covering the high (page number) bits of an address
    #[inline]
    pub fn page_mask(&self) -> u64 {
        self.max_address() ^ self.offset_mask()
    }

    /// Number of virtual pages in the whole address space
    #[inline]
    pub fn page_count(&self) -> u64 {
        1u64 << (self.address_bits - self.page_size_bits)
    }

    /// Split a raw address into page number and offset
    pub fn decompose(&self, addr: u64) -> Result<VirtualAddress> {
        let (page, offset) = decompose(addr, self.address_bits, self.page_size_bits)?;
        Ok(VirtualAddress {
            va: addr,
            page,
            offset,
        })
    }

    /// Rebuild an address from its components, rejecting components that
    /// do not fit this layout
    pub fn compose(&self, page: u64, offset: u64) -> Result<u64> {
        if page >= self.page_count() {
            return Err(VmError::InvalidAddress {
                value: page,
                detail: format!(
                    "page number exceeds {} page bits",
                    self.address_bits - self.page_size_bits
                ),
            });
        }
        compose(page, offset, self.page_size_bits)
    }
}

/// Represents the decomposed components of a virtual address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualAddress {
    pub va: u64,
    pub page: u64,
    pub offset: u64,
}

impl std::fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "VA({:#x}) = (page={}, offset={})",
            self.va, self.page, self.offset
        )
    }
}

/// Decompose `addr` into `(page, offset)` for an `bits`-wide address space
/// with `2^page_size_bits`-byte pages.
///
/// `page = (addr & page_mask) >> page_size_bits`, `offset = addr & offset_mask`.
pub fn decompose(addr: u64, bits: u32, page_size_bits: u32) -> Result<(u64, u64)> {
    if bits == 0 || bits > MAX_ADDRESS_BITS || page_size_bits >= bits {
        return Err(VmError::InvalidConfig(format!(
            "cannot split a {}-bit address with {} offset bits",
            bits, page_size_bits
        )));
    }
    let max_address = (1u64 << bits) - 1;
    if addr > max_address {
        return Err(VmError::InvalidAddress {
            value: addr,
            detail: format!("exceeds {}-bit address space (max {:#x})", bits, max_address),
        });
    }

    let offset_mask = page_size(page_size_bits) - 1;
    let page_mask = max_address ^ offset_mask;
    Ok(((addr & page_mask) >> page_size_bits, addr & offset_mask))
}

/// Inverse of [`decompose`]
pub fn compose(page: u64, offset: u64, page_size_bits: u32) -> Result<u64> {
    if page_size_bits > MAX_ADDRESS_BITS {
        return Err(VmError::InvalidConfig(format!(
            "page size bits ({}) exceed {}",
            page_size_bits, MAX_ADDRESS_BITS
        )));
    }
    if offset >= page_size(page_size_bits) {
        return Err(VmError::InvalidAddress {
            value: offset,
            detail: format!("offset exceeds {} offset bits", page_size_bits),
        });
    }
    if page_size_bits > 0 && page >> (u64::BITS - page_size_bits) != 0 {
        return Err(VmError::InvalidAddress {
            value: page,
            detail: "page number overflows a 64-bit address".to_string(),
        });
    }
    Ok((page << page_size_bits) | offset)
}
