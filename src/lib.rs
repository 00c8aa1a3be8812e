// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # EdgeFirst VSPM Interface Library
//!
//! Caller-facing side of the VSPM job manager, which drives the compositor
//! (VSP) and de-interlacer (FDP) engines. Applications hand over deeply
//! nested, pointer-linked parameter trees; this library copies them into
//! owned aggregates, supplies the DMA-coherent tables and histogram buffers
//! the hardware needs, submits the job and hands the completion back to a
//! blocking waiter.
//!
//! ## Features
//!
//! - **Tree marshalling**: [`params::ParameterAggregate`] copies compositor
//!   and de-interlace trees from native or 32-bit callers into owned nodes.
//! - **Scoped coherent buffers**: [`coherent::ScopedBuffer`] releases its
//!   region exactly once, on drop, whoever holds it.
//! - **Completion hand-off**: [`completion::CompletionQueue`] delivers
//!   results in completion order to one designated waiter.
//! - **Command dispatch**: [`session::Session`] implements INIT, QUIT, ENTRY,
//!   CANCEL, GET_STATUS and the waiter commands.
//!
//! The caller address space, the coherent pool and the job engine are
//! injected. [`user::SimulatedUserSpace`], [`coherent::HostCoherentPool`] and
//! [`loopback::LoopbackEngine`] implement them in-process.
//!
//! ## Example
//!
//! ```
//! use edgefirst_vspm::{
//!     coherent::HostCoherentPool, loopback::LoopbackEngine, session::Session,
//!     user::SimulatedUserSpace, HardwareContext,
//! };
//! use std::sync::Arc;
//! use vspm_sys::{
//!     vsp::VspStart,
//!     vspm::{EntryReq, VspmEntry, VspmInit, VspmJob, JOB_KIND_COMPOSITOR},
//!     Abi, ULong,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Arc::new(LoopbackEngine::default());
//! let context = HardwareContext::new(Arc::new(HostCoherentPool::new(1 << 20)), engine.clone());
//! let mem = Arc::new(SimulatedUserSpace::new());
//! let session = Session::open(context, mem.clone());
//!
//! let init = VspmInit { use_ch: ULong(1), kind: JOB_KIND_COMPOSITOR, ..Default::default() };
//! session.init(Abi::Native, mem.place(Abi::Native, &init))?;
//!
//! let start = mem.place(Abi::Native, &VspStart::default());
//! let job = mem.place(Abi::Native, &VspmJob { kind: JOB_KIND_COMPOSITOR, par: start });
//! let entry = VspmEntry {
//!     req: EntryReq { priority: 10, job_param: job, ..Default::default() },
//!     ..Default::default()
//! };
//! let rsp = session.entry(Abi::Native, mem.place(Abi::Native, &entry))?;
//! assert_eq!(rsp.ercd.0, 0);
//!
//! engine.complete_next(0);
//! let rsp = session.wait_for_completion(Abi::Native, mem.map(64))?;
//! assert_eq!(rsp.job_id, ULong(1));
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

pub mod coherent;
pub mod completion;
pub mod engine;
pub mod entry;
pub mod error;
pub mod loopback;
pub mod params;
pub mod session;
pub mod user;

pub use error::{Error, Result};

/// Hardware collaborators shared by every session.
#[derive(Clone)]
pub struct HardwareContext {
    pub allocator: Arc<dyn coherent::CoherentAllocator>,
    pub engine: Arc<dyn engine::JobEngine>,
}

impl HardwareContext {
    pub fn new(
        allocator: Arc<dyn coherent::CoherentAllocator>,
        engine: Arc<dyn engine::JobEngine>,
    ) -> Self {
        Self { allocator, engine }
    }
}
