// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Ownership of one submitted job.
//!
//! An [`Entry`] is built once the parameter tree has been copied. It lives in
//! a [`CompletionToken`] which is handed to the engine; the token is the only
//! owner from then on. Completing the token moves the result and the
//! surviving buffers into a [`CompletionRecord`]; dropping it instead
//! (synchronous rejection, cancellation, discard on quit) releases
//! everything without touching the completion queue.

use crate::{
    completion::{CompletionQueue, CompletionRecord},
    engine::JobId,
    params::{JobKind, ParameterAggregate},
};
use std::sync::Arc;
use tracing::debug;
use vspm_sys::{vspm::EntryReq, Addr};

/// Request metadata carried through to the completion record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryRequest {
    pub priority: u8,
    pub user_data: u64,
    pub cb_func: Addr,
}

impl From<&EntryReq> for EntryRequest {
    fn from(req: &EntryReq) -> Self {
        Self {
            priority: req.priority,
            user_data: req.user_data.0,
            cb_func: req.cb_func,
        }
    }
}

/// Job descriptor with its copied tree.
///
/// `params` is `None` when the caller supplied no tree or the kind is not one
/// the interface marshals; the engine decides whether to accept such a job.
#[derive(Debug, PartialEq)]
pub struct JobRequest {
    pub kind: u16,
    pub params: Option<ParameterAggregate>,
}

impl JobRequest {
    pub fn job_kind(&self) -> Option<JobKind> {
        JobKind::from_raw(self.kind)
    }
}

#[derive(Debug)]
struct Entry {
    request: EntryRequest,
    job: Option<JobRequest>,
    queue: Arc<CompletionQueue>,
}

/// Owns an in-flight entry on behalf of the engine.
#[derive(Debug)]
pub struct CompletionToken {
    entry: Option<Box<Entry>>,
}

impl CompletionToken {
    pub fn new(request: EntryRequest, job: Option<JobRequest>, queue: Arc<CompletionQueue>) -> Self {
        Self {
            entry: Some(Box::new(Entry {
                request,
                job,
                queue,
            })),
        }
    }

    /// Identity of the entry, stable while the token lives.
    pub fn correlation(&self) -> u64 {
        self.entry
            .as_deref()
            .map_or(0, |entry| entry as *const Entry as u64)
    }

    pub fn request(&self) -> EntryRequest {
        self.entry
            .as_ref()
            .map(|entry| entry.request)
            .unwrap_or_default()
    }

    pub fn job(&self) -> Option<&JobRequest> {
        self.entry.as_ref().and_then(|entry| entry.job.as_ref())
    }

    /// Records the job result on the session queue.
    ///
    /// The aggregate is released here, apart from the display list, color
    /// tables and histogram outputs, which move into the record.
    pub fn complete(mut self, job_id: JobId, result: i64) {
        let Some(entry) = self.entry.take() else {
            return;
        };
        let Entry {
            request,
            job,
            queue,
        } = *entry;

        let (tables, histograms) = match job.and_then(|job| job.params) {
            Some(ParameterAggregate::Compositor(job)) => (*job).into_outputs(),
            _ => Default::default(),
        };
        queue.push(CompletionRecord::new(
            job_id,
            result,
            request.user_data,
            request.cb_func,
            tables,
            histograms,
        ));
    }
}

impl Drop for CompletionToken {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            let buffers = entry
                .job
                .as_ref()
                .and_then(|job| job.params.as_ref())
                .map_or(0, |params| params.buffers().len());
            debug!(
                "entry {:#x} released without completion, {} buffers",
                &*entry as *const Entry as u64, buffers
            );
        }
    }
}
