// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Seam to the job manager that actually drives the hardware.

use crate::{entry::CompletionToken, error::ServiceError};
use std::fmt;
use vspm_sys::fdp::{FdpInit, FdpStatus};

pub type JobId = u64;

/// INIT request as it reaches the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitParams {
    /// Channel mask.
    pub use_ch: u64,
    pub mode: u16,
    /// Raw job kind.
    pub kind: u16,
    /// De-interlacer initialisation, when supplied.
    pub fdp: Option<FdpInit>,
}

/// Synchronous refusal of a job. The token comes back so the caller can
/// release the entry inline.
pub struct Rejected {
    pub error: ServiceError,
    pub token: CompletionToken,
}

impl fmt::Debug for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .field("correlation", &format_args!("{:#x}", self.token.correlation()))
            .finish()
    }
}

/// Job manager service.
pub trait JobEngine: Send + Sync {
    fn init(&self, params: &InitParams) -> Result<Box<dyn EngineHandle>, ServiceError>;
}

/// One initialised engine channel.
///
/// For every job accepted by [`EngineHandle::entry`] the engine either calls
/// [`CompletionToken::complete`] exactly once or drops the token when the job
/// is cancelled or discarded on quit.
pub trait EngineHandle: Send + Sync {
    fn entry(&self, priority: u8, token: CompletionToken) -> Result<JobId, Rejected>;
    fn cancel(&self, job_id: JobId) -> Result<(), ServiceError>;
    fn status(&self) -> Result<FdpStatus, ServiceError>;
    /// Shuts the channel down; pending jobs are dropped.
    fn quit(&self) -> Result<(), ServiceError>;
}
