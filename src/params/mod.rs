// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # Parameter tree copier
//!
//! A job arrives as a tree of structures in caller memory, linked by
//! pointers. [`ParameterAggregate`] is the kernel-owned copy of that tree:
//! every reachable node is read, every followed link is cleared in the copy
//! and the child is attached to its parent as an owned `Option`. Table and
//! histogram addresses are rewritten to point at [`ScopedBuffer`]s the
//! aggregate owns.
//!
//! Native and compat callers go through the same walk; only the [`Abi`] used
//! to decode each node differs, so both produce identical aggregates for
//! equivalent input.
//!
//! On any failure the partially built tree is dropped before the error is
//! returned, which releases every buffer allocated by that call.

mod fdp;
mod vsp;

pub use fdp::{DeinterlaceJob, FprocNode, RefNode};
pub use vsp::{
    AlphaNode, BlendNode, ClutNode, CompositorJob, ControlNode, DestinationNode, HistogramNode,
    HistogramParams, SourceNode,
};

use crate::{
    coherent::{BufferKind, CoherentAllocator, ScopedBuffer},
    error::Result,
    user::{read_layout, UserMemory},
};
use std::{fmt, sync::Arc};
use tracing::{debug, error};
use vspm_sys::{
    vspm::{JOB_KIND_COMPOSITOR, JOB_KIND_DEINTERLACE},
    Abi, Layout, UserPtr,
};

/// Job kinds the interface knows how to marshal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Compositor,
    Deinterlace,
}

impl JobKind {
    pub fn from_raw(kind: u16) -> Option<Self> {
        match kind {
            JOB_KIND_COMPOSITOR => Some(JobKind::Compositor),
            JOB_KIND_DEINTERLACE => Some(JobKind::Deinterlace),
            _ => None,
        }
    }

    pub fn raw(self) -> u16 {
        match self {
            JobKind::Compositor => JOB_KIND_COMPOSITOR,
            JobKind::Deinterlace => JOB_KIND_DEINTERLACE,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobKind::Compositor => write!(f, "vsp"),
            JobKind::Deinterlace => write!(f, "fdp"),
        }
    }
}

/// Kernel-owned copy of one job's parameter tree.
#[derive(Debug, PartialEq)]
pub enum ParameterAggregate {
    Compositor(Box<CompositorJob>),
    Deinterlace(Box<DeinterlaceJob>),
}

impl ParameterAggregate {
    /// Copies a tree laid out for a 64-bit caller.
    pub fn copy_native(
        mem: &dyn UserMemory,
        pool: &Arc<dyn CoherentAllocator>,
        kind: JobKind,
        root: UserPtr,
    ) -> Result<Self> {
        Self::copy(mem, pool, Abi::Native, kind, root)
    }

    /// Copies a tree laid out for a 32-bit caller, widening every pointer
    /// and `long` on the way in.
    pub fn copy_compat(
        mem: &dyn UserMemory,
        pool: &Arc<dyn CoherentAllocator>,
        kind: JobKind,
        root: UserPtr,
    ) -> Result<Self> {
        Self::copy(mem, pool, Abi::Compat, kind, root)
    }

    pub fn copy(
        mem: &dyn UserMemory,
        pool: &Arc<dyn CoherentAllocator>,
        abi: Abi,
        kind: JobKind,
        root: UserPtr,
    ) -> Result<Self> {
        let copier = TreeCopier { mem, pool, abi };
        let aggregate = match kind {
            JobKind::Compositor => {
                ParameterAggregate::Compositor(Box::new(copier.compositor(root)?))
            }
            JobKind::Deinterlace => {
                ParameterAggregate::Deinterlace(Box::new(copier.deinterlace(root)?))
            }
        };
        debug!(
            "copied {} tree from {} ({}), {} buffers",
            kind,
            root,
            abi,
            aggregate.buffers().len()
        );
        Ok(aggregate)
    }

    pub fn kind(&self) -> JobKind {
        match self {
            ParameterAggregate::Compositor(_) => JobKind::Compositor,
            ParameterAggregate::Deinterlace(_) => JobKind::Deinterlace,
        }
    }

    pub fn as_compositor(&self) -> Option<&CompositorJob> {
        match self {
            ParameterAggregate::Compositor(job) => Some(job.as_ref()),
            ParameterAggregate::Deinterlace(_) => None,
        }
    }

    pub fn as_deinterlace(&self) -> Option<&DeinterlaceJob> {
        match self {
            ParameterAggregate::Deinterlace(job) => Some(job.as_ref()),
            ParameterAggregate::Compositor(_) => None,
        }
    }

    /// Every coherent buffer owned by this aggregate.
    pub fn buffers(&self) -> Vec<&ScopedBuffer> {
        match self {
            ParameterAggregate::Compositor(job) => job.buffers(),
            ParameterAggregate::Deinterlace(_) => Vec::new(),
        }
    }
}

/// One walk over a caller tree.
struct TreeCopier<'a> {
    mem: &'a dyn UserMemory,
    pool: &'a Arc<dyn CoherentAllocator>,
    abi: Abi,
}

impl TreeCopier<'_> {
    fn read<T: Layout>(&self, ptr: UserPtr) -> Result<T> {
        read_layout(self.mem, self.abi, ptr).map_err(|err| {
            error!("failed to copy {} from {}", T::NAME, ptr);
            err
        })
    }

    /// Reads the node behind `link` and clears the link.
    fn follow<T: Layout>(&self, link: &mut UserPtr) -> Result<Option<T>> {
        self.follow_with(link, |_, node| Ok(node))
    }

    /// Reads the node behind `link`, clears the link and lets `build` walk
    /// the node's own children.
    fn follow_with<T, N>(
        &self,
        link: &mut UserPtr,
        build: impl FnOnce(&Self, T) -> Result<N>,
    ) -> Result<Option<N>>
    where
        T: Layout,
    {
        if link.is_null() {
            return Ok(None);
        }
        let node = self.read::<T>(*link)?;
        *link = UserPtr::NULL;
        build(self, node).map(Some)
    }

    fn allocate(&self, kind: BufferKind) -> Result<ScopedBuffer> {
        ScopedBuffer::allocate(self.pool, kind).map_err(|err| {
            error!("failed to allocate {:?}: {}", kind, err);
            err
        })
    }
}
