//! Address space mapping between container addresses and region offsets.
//!
//! PE code is addressed by RVA inside a 32-bit space, so addresses are
//! reduced modulo 2^32 before lookup. ELF code uses the full 64-bit virtual
//! address space, which keeps binaries mapped above 4 GiB resolvable.

use serde::{Deserialize, Serialize};

use super::regions::ExecutableRegion;

/// Addressing scheme of the container being sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressDomain {
    /// Relative virtual addresses bounded to 32 bits (PE).
    Rva32,
    /// Full 64-bit virtual addresses (ELF).
    Va64,
}

impl AddressDomain {
    /// Bring an address into this domain.
    #[inline]
    pub fn normalize(self, address: u64) -> u64 {
        match self {
            AddressDomain::Rva32 => address & 0xFFFF_FFFF,
            AddressDomain::Va64 => address,
        }
    }
}

/// A resolved location: which region, and where inside its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub region: usize,
    pub offset: usize,
}

/// Containment lookup over a set of executable regions.
///
/// Regions may overlap and need not be sorted; the first region (in input
/// order) containing an address wins.
#[derive(Debug, Clone, Copy)]
pub struct AddressSpace<'r> {
    domain: AddressDomain,
    regions: &'r [ExecutableRegion],
}

impl<'r> AddressSpace<'r> {
    pub fn new(domain: AddressDomain, regions: &'r [ExecutableRegion]) -> Self {
        Self { domain, regions }
    }

    pub fn domain(&self) -> AddressDomain {
        self.domain
    }

    pub fn regions(&self) -> &'r [ExecutableRegion] {
        self.regions
    }

    /// Resolve `address` to a region index and byte offset, or `None` when it
    /// lies outside every region.
    pub fn resolve(&self, address: u64) -> Option<Location> {
        let address = self.domain.normalize(address);
        self.regions.iter().enumerate().find_map(|(region, r)| {
            let delta = address.checked_sub(r.base_address)?;
            let offset = usize::try_from(delta).ok()?;
            (offset < r.len()).then_some(Location { region, offset })
        })
    }

    /// True if `address` lies in some region.
    pub fn contains(&self, address: u64) -> bool {
        self.resolve(address).is_some()
    }
}
