// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Caller memory access.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::{collections::BTreeMap, fmt};
use tracing::debug;
use vspm_sys::{Abi, Layout, UserPtr};

/// Copies between kernel-owned storage and the address space of the caller.
///
/// Both directions fail with [`Error::Fault`] when any byte of the range is
/// not mapped.
pub trait UserMemory: Send + Sync {
    fn copy_from_user(&self, dst: &mut [u8], src: UserPtr) -> Result<()>;
    fn copy_to_user(&self, dst: UserPtr, src: &[u8]) -> Result<()>;
}

/// Reads one `T` laid out for `abi` at `ptr`.
pub fn read_layout<T: Layout>(mem: &dyn UserMemory, abi: Abi, ptr: UserPtr) -> Result<T> {
    let mut bytes = vec![0; T::size(abi)];
    mem.copy_from_user(&mut bytes, ptr)?;
    T::decode(abi, &bytes).ok_or(Error::Fault)
}

/// Writes `value` laid out for `abi` to `ptr`.
pub fn write_layout<T: Layout>(
    mem: &dyn UserMemory,
    abi: Abi,
    ptr: UserPtr,
    value: &T,
) -> Result<()> {
    mem.copy_to_user(ptr, &value.encode(abi))
}

const PAGE: u64 = 4096;
const BASE: u64 = 0x0001_0000;

struct Space {
    regions: BTreeMap<u64, Vec<u8>>,
    next: u64,
    reads: usize,
    fail_reads_after: Option<usize>,
}

impl Space {
    fn region(&self, addr: u64, len: usize) -> Option<(u64, usize)> {
        let (&start, bytes) = self.regions.range(..=addr).next_back()?;
        let offset = usize::try_from(addr - start).ok()?;
        (offset.checked_add(len)? <= bytes.len()).then_some((start, offset))
    }
}

/// In-process stand-in for a caller address space.
///
/// Regions are page aligned with an unmapped page between neighbours, so an
/// overrun faults instead of reading the next structure. Addresses stay below
/// 4 GiB, which keeps every mapping reachable by a compat caller.
pub struct SimulatedUserSpace {
    space: Mutex<Space>,
}

impl Default for SimulatedUserSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SimulatedUserSpace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let space = self.space.lock();
        f.debug_struct("SimulatedUserSpace")
            .field("regions", &space.regions.len())
            .field("next", &format_args!("{:#x}", space.next))
            .finish()
    }
}

impl SimulatedUserSpace {
    pub fn new() -> Self {
        Self {
            space: Mutex::new(Space {
                regions: BTreeMap::new(),
                next: BASE,
                reads: 0,
                fail_reads_after: None,
            }),
        }
    }

    /// Maps `len` zeroed bytes and returns their address.
    pub fn map(&self, len: usize) -> UserPtr {
        let mut space = self.space.lock();
        let addr = space.next;
        let pages = (len.max(1) as u64).div_ceil(PAGE);
        space.next += (pages + 1) * PAGE;
        space.regions.insert(addr, vec![0; len]);
        UserPtr(addr)
    }

    /// Maps a copy of `bytes`.
    pub fn place_bytes(&self, bytes: &[u8]) -> UserPtr {
        let ptr = self.map(bytes.len());
        if let Some(region) = self.space.lock().regions.get_mut(&ptr.get()) {
            region.copy_from_slice(bytes);
        }
        ptr
    }

    /// Maps `value` encoded for `abi`.
    pub fn place<T: Layout>(&self, abi: Abi, value: &T) -> UserPtr {
        self.place_bytes(&value.encode(abi))
    }

    pub fn read_bytes(&self, ptr: UserPtr, len: usize) -> Result<Vec<u8>> {
        let space = self.space.lock();
        let (start, offset) = space.region(ptr.get(), len).ok_or(Error::Fault)?;
        Ok(space.regions[&start][offset..offset + len].to_vec())
    }

    /// Reads back a structure, bypassing read fault injection.
    pub fn read_back<T: Layout>(&self, abi: Abi, ptr: UserPtr) -> Result<T> {
        let bytes = self.read_bytes(ptr, T::size(abi))?;
        T::decode(abi, &bytes).ok_or(Error::Fault)
    }

    /// Removes the mapping that starts at `ptr`.
    pub fn unmap(&self, ptr: UserPtr) -> bool {
        self.space.lock().regions.remove(&ptr.get()).is_some()
    }

    /// Makes every `copy_from_user` after the next `n` fail.
    pub fn fail_reads_after(&self, n: usize) {
        let mut space = self.space.lock();
        space.reads = 0;
        space.fail_reads_after = Some(n);
    }

    pub fn clear_faults(&self) {
        self.space.lock().fail_reads_after = None;
    }

    /// Number of `copy_from_user` calls since the last
    /// [`SimulatedUserSpace::reset_reads`] or fault arm.
    pub fn reads(&self) -> usize {
        self.space.lock().reads
    }

    pub fn reset_reads(&self) {
        self.space.lock().reads = 0;
    }
}

impl UserMemory for SimulatedUserSpace {
    fn copy_from_user(&self, dst: &mut [u8], src: UserPtr) -> Result<()> {
        let mut space = self.space.lock();
        space.reads += 1;
        if let Some(limit) = space.fail_reads_after {
            if space.reads > limit {
                debug!("injected read fault at {}", src);
                return Err(Error::Fault);
            }
        }
        let (start, offset) = space.region(src.get(), dst.len()).ok_or(Error::Fault)?;
        dst.copy_from_slice(&space.regions[&start][offset..offset + dst.len()]);
        Ok(())
    }

    fn copy_to_user(&self, dst: UserPtr, src: &[u8]) -> Result<()> {
        let mut space = self.space.lock();
        let (start, offset) = space.region(dst.get(), src.len()).ok_or(Error::Fault)?;
        if let Some(region) = space.regions.get_mut(&start) {
            region[offset..offset + src.len()].copy_from_slice(src);
        }
        Ok(())
    }
}
