// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! DMA-coherent scratch buffers.
//!
//! A [`ScopedBuffer`] owns one region of a [`CoherentAllocator`] and returns
//! it when dropped, so a region is released exactly once no matter which of
//! the aggregate, the completion record or an error path ends up holding it.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::{collections::BTreeMap, fmt, sync::Arc};
use tracing::{debug, error};
use vspm_sys::{
    vspm::{
        CLUT_MAX_ENTRIES, DL_MAX_ENTRIES, HGO_SIZE, HGT_SIZE, HISTOGRAM_ALIGN, TABLE_ENTRY_SIZE,
    },
    Addr,
};

/// One raw allocation as returned by the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoherentRegion {
    /// Address the hardware uses.
    pub device: Addr,
    /// Address software uses.
    pub kernel: Addr,
    pub len: usize,
}

/// Physically contiguous, DMA-visible memory.
pub trait CoherentAllocator: Send + Sync {
    /// Fails with [`Error::OutOfMemory`] when the pool cannot satisfy `len`.
    fn allocate(&self, len: usize) -> Result<CoherentRegion>;

    /// Returns a region obtained from [`CoherentAllocator::allocate`].
    fn release(&self, region: CoherentRegion);

    /// Reads from a kernel address inside a live region.
    fn read(&self, kernel: Addr, dst: &mut [u8]) -> Result<()>;

    /// Writes to a kernel address inside a live region.
    fn write(&self, kernel: Addr, src: &[u8]) -> Result<()>;
}

/// Sizing rule of a scratch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Compositor display list of `n` entries.
    DisplayList(u16),
    /// Source color lookup table of `n` entries.
    ColorTable(u16),
    /// HGO output.
    Histogram,
    /// HGT output.
    ToneHistogram,
}

impl BufferKind {
    /// Display list kind, or `None` when `entries` is outside 1..=16383.
    pub fn display_list(entries: u16) -> Option<Self> {
        (1..=DL_MAX_ENTRIES)
            .contains(&entries)
            .then_some(BufferKind::DisplayList(entries))
    }

    /// Color table kind, or `None` when `entries` is outside 1..=256.
    pub fn color_table(entries: u16) -> Option<Self> {
        (1..=CLUT_MAX_ENTRIES)
            .contains(&entries)
            .then_some(BufferKind::ColorTable(entries))
    }

    /// Usable length in bytes.
    pub fn len(self) -> usize {
        match self {
            BufferKind::DisplayList(n) | BufferKind::ColorTable(n) => {
                usize::from(n) * TABLE_ENTRY_SIZE
            }
            BufferKind::Histogram => HGO_SIZE,
            BufferKind::ToneHistogram => HGT_SIZE,
        }
    }

    /// Required alignment of the usable region.
    pub fn align(self) -> u64 {
        match self {
            BufferKind::Histogram | BufferKind::ToneHistogram => HISTOGRAM_ALIGN,
            _ => 1,
        }
    }

    fn is_valid(self) -> bool {
        match self {
            BufferKind::DisplayList(n) => Self::display_list(n).is_some(),
            BufferKind::ColorTable(n) => Self::color_table(n).is_some(),
            _ => true,
        }
    }
}

fn align_up(addr: Addr, align: u64) -> Option<Addr> {
    let mask = align - 1;
    addr.get().checked_add(mask).map(|v| Addr(v & !mask))
}

/// A coherent region owned by exactly one holder.
pub struct ScopedBuffer {
    pool: Arc<dyn CoherentAllocator>,
    raw: CoherentRegion,
    kind: BufferKind,
    device: Addr,
    kernel: Addr,
}

impl ScopedBuffer {
    /// Allocates a buffer of `kind`.
    ///
    /// Aligned kinds are over-allocated by `align - 1` bytes. The usable
    /// device and kernel addresses are each rounded up independently and the
    /// rounded region must still lie inside the raw allocation.
    pub fn allocate(pool: &Arc<dyn CoherentAllocator>, kind: BufferKind) -> Result<Self> {
        if !kind.is_valid() {
            return Err(Error::InvalidArgument);
        }
        let align = kind.align();
        let margin = usize::try_from(align - 1).map_err(|_| Error::InvalidArgument)?;
        let raw = pool.allocate(kind.len() + margin)?;

        // from here on the raw region is released by Drop
        let mut buffer = ScopedBuffer {
            pool: Arc::clone(pool),
            raw,
            kind,
            device: raw.device,
            kernel: raw.kernel,
        };
        buffer.device = align_up(raw.device, align).ok_or(Error::OutOfMemory)?;
        buffer.kernel = align_up(raw.kernel, align).ok_or(Error::OutOfMemory)?;

        let fits = |usable: Addr, start: Addr| {
            (usable.get() - start.get()) as usize + kind.len() <= raw.len
        };
        if !fits(buffer.device, raw.device) || !fits(buffer.kernel, raw.kernel) {
            error!(
                "{:?}: rounded region {} does not fit allocation {}+{}",
                kind, buffer.device, raw.device, raw.len
            );
            return Err(Error::OutOfMemory);
        }

        debug!(
            "allocated {:?} device={} kernel={} raw={}+{}",
            kind, buffer.device, buffer.kernel, raw.device, raw.len
        );
        Ok(buffer)
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    /// Usable device address.
    pub fn device(&self) -> Addr {
        self.device
    }

    /// Usable kernel address.
    pub fn kernel(&self) -> Addr {
        self.kernel
    }

    /// Usable length.
    pub fn len(&self) -> usize {
        self.kind.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The allocation as it will be released.
    pub fn raw(&self) -> CoherentRegion {
        self.raw
    }

    /// Fills the start of the usable region.
    pub fn write(&self, src: &[u8]) -> Result<()> {
        if src.len() > self.len() {
            return Err(Error::InvalidArgument);
        }
        self.pool.write(self.kernel, src)
    }

    /// Copies out the usable region.
    pub fn contents(&self) -> Result<Vec<u8>> {
        let mut out = vec![0; self.len()];
        self.pool.read(self.kernel, &mut out)?;
        Ok(out)
    }
}

impl PartialEq for ScopedBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.raw == other.raw
            && self.device == other.device
            && self.kernel == other.kernel
    }
}

impl fmt::Debug for ScopedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ScopedBuffer")
            .field("kind", &self.kind)
            .field("device", &self.device)
            .field("kernel", &self.kernel)
            .field("raw", &self.raw)
            .finish()
    }
}

impl Drop for ScopedBuffer {
    fn drop(&mut self) {
        self.pool.release(self.raw);
        debug!("released {:?} device={}", self.kind, self.raw.device);
    }
}

const DEVICE_BASE: u64 = 0x5800_0000;
const KERNEL_BASE: u64 = 0xffff_0000_4000_0000;

struct Pool {
    regions: BTreeMap<u64, (CoherentRegion, Vec<u8>)>,
    next_device: u64,
    next_kernel: u64,
    used: usize,
    allocations: usize,
    fail_after: Option<usize>,
}

/// Host memory posing as a coherent pool.
///
/// Addresses are handed out by bumping a device and a kernel cursor by the
/// request rounded to the granule. Two pools configured the same way produce
/// identical address sequences. With a granule below 256 the raw histogram
/// allocations come back unaligned, and the kernel cursor starts one granule
/// further than the device cursor so the two roundings differ.
pub struct HostCoherentPool {
    granule: u64,
    capacity: usize,
    pool: Mutex<Pool>,
}

impl HostCoherentPool {
    pub const DEFAULT_GRANULE: u64 = 4096;

    pub fn new(capacity: usize) -> Self {
        Self::with_granule(capacity, Self::DEFAULT_GRANULE)
    }

    /// `granule` must be a power of two.
    pub fn with_granule(capacity: usize, granule: u64) -> Self {
        let granule = granule.max(1).next_power_of_two();
        Self {
            granule,
            capacity,
            pool: Mutex::new(Pool {
                regions: BTreeMap::new(),
                next_device: DEVICE_BASE + granule,
                next_kernel: KERNEL_BASE + 2 * granule,
                used: 0,
                allocations: 0,
                fail_after: None,
            }),
        }
    }

    /// Makes every allocation after the next `n` fail.
    pub fn fail_after(&self, n: usize) {
        let mut pool = self.pool.lock();
        pool.allocations = 0;
        pool.fail_after = Some(n);
    }

    pub fn clear_faults(&self) {
        self.pool.lock().fail_after = None;
    }

    /// Number of regions not yet released.
    pub fn live_regions(&self) -> usize {
        self.pool.lock().regions.len()
    }

    /// Bytes held by live regions.
    pub fn live_bytes(&self) -> usize {
        self.pool.lock().used
    }

    fn locate(pool: &Pool, kernel: Addr, len: usize) -> Option<(u64, usize)> {
        let (&start, (region, _)) = pool.regions.range(..=kernel.get()).next_back()?;
        let offset = usize::try_from(kernel.get() - start).ok()?;
        (offset.checked_add(len)? <= region.len).then_some((start, offset))
    }
}

impl fmt::Debug for HostCoherentPool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HostCoherentPool")
            .field("granule", &self.granule)
            .field("capacity", &self.capacity)
            .field("live_regions", &self.live_regions())
            .finish()
    }
}

impl CoherentAllocator for HostCoherentPool {
    fn allocate(&self, len: usize) -> Result<CoherentRegion> {
        let mut pool = self.pool.lock();
        pool.allocations += 1;
        if let Some(limit) = pool.fail_after {
            if pool.allocations > limit {
                debug!("injected allocation failure for {} bytes", len);
                return Err(Error::OutOfMemory);
            }
        }
        if len == 0 || pool.used + len > self.capacity {
            return Err(Error::OutOfMemory);
        }

        let step = (len as u64).div_ceil(self.granule) * self.granule;
        let region = CoherentRegion {
            device: Addr(pool.next_device),
            kernel: Addr(pool.next_kernel),
            len,
        };
        pool.next_device += step;
        pool.next_kernel += step;
        pool.used += len;
        pool.regions.insert(region.kernel.get(), (region, vec![0; len]));
        Ok(region)
    }

    fn release(&self, region: CoherentRegion) {
        let mut pool = self.pool.lock();
        match pool.regions.remove(&region.kernel.get()) {
            Some((live, _)) if live == region => pool.used -= region.len,
            Some(live) => {
                error!("release of {:?} does not match live {:?}", region, live.0);
                pool.regions.insert(region.kernel.get(), live);
            }
            None => error!("release of unknown region {:?}", region),
        }
    }

    fn read(&self, kernel: Addr, dst: &mut [u8]) -> Result<()> {
        let pool = self.pool.lock();
        let (start, offset) = Self::locate(&pool, kernel, dst.len()).ok_or(Error::Fault)?;
        dst.copy_from_slice(&pool.regions[&start].1[offset..offset + dst.len()]);
        Ok(())
    }

    fn write(&self, kernel: Addr, src: &[u8]) -> Result<()> {
        let mut pool = self.pool.lock();
        let (start, offset) = Self::locate(&pool, kernel, src.len()).ok_or(Error::Fault)?;
        if let Some((_, bytes)) = pool.regions.get_mut(&start) {
            bytes[offset..offset + src.len()].copy_from_slice(src);
        }
        Ok(())
    }
}
