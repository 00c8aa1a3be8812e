// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Hand-off of finished jobs from the engine's completion context to the
//! session's waiter thread.
//!
//! The producer side ([`CompletionQueue::push`]) never blocks beyond the
//! queue lock and never fails: if the record cannot be queued it is dropped,
//! releasing its buffers.
//!
//! The consumer side is a counting wake-up. Every push and every
//! [`CompletionQueue::stop`] adds one wake-up; a waiter that wakes to an
//! empty FIFO gets `None`, which the session reports as the sentinel
//! response. Only one waiter is designated at a time: each call to
//! [`CompletionQueue::wait`] takes a new generation and supersedes whoever
//! was waiting before, and the superseded waiter returns `None`.
//!
//! An interrupt only reaches a thread that is blocked when it is raised, and
//! a wake-up already available wins over it.

use crate::{
    coherent::ScopedBuffer,
    engine::JobId,
    error::{Error, Result},
    user::UserMemory,
};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use tracing::{debug, error, warn};
use vspm_sys::{
    vspm::{CbRsp, CB_RSP_NONE},
    Addr, Long, ULong, UserPtr,
};

/// Histogram result waiting to be delivered to the caller.
#[derive(Debug)]
pub struct HistogramOutput {
    buffer: ScopedBuffer,
    target: UserPtr,
}

impl HistogramOutput {
    pub fn new(buffer: ScopedBuffer, target: UserPtr) -> Self {
        Self { buffer, target }
    }

    pub fn buffer(&self) -> &ScopedBuffer {
        &self.buffer
    }

    /// Caller address the result is copied to; null means no delivery.
    pub fn target(&self) -> UserPtr {
        self.target
    }

    fn deliver(&self, mem: &dyn UserMemory) -> Result<()> {
        if self.target.is_null() {
            return Ok(());
        }
        let bytes = self.buffer.contents()?;
        mem.copy_to_user(self.target, &bytes)
    }
}

/// Result of one job, created in completion context.
#[derive(Debug)]
pub struct CompletionRecord {
    job_id: JobId,
    result: i64,
    user_data: u64,
    cb_func: Addr,
    tables: Vec<ScopedBuffer>,
    histograms: Vec<HistogramOutput>,
}

impl CompletionRecord {
    pub fn new(
        job_id: JobId,
        result: i64,
        user_data: u64,
        cb_func: Addr,
        tables: Vec<ScopedBuffer>,
        histograms: Vec<HistogramOutput>,
    ) -> Self {
        Self {
            job_id,
            result,
            user_data,
            cb_func,
            tables,
            histograms,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn result(&self) -> i64 {
        self.result
    }

    pub fn user_data(&self) -> u64 {
        self.user_data
    }

    pub fn cb_func(&self) -> Addr {
        self.cb_func
    }

    /// Display list and color tables inherited from the job.
    pub fn tables(&self) -> &[ScopedBuffer] {
        &self.tables
    }

    pub fn histograms(&self) -> &[HistogramOutput] {
        &self.histograms
    }

    pub fn response(&self) -> CbRsp {
        CbRsp {
            ercd: Long(0),
            cb_func: self.cb_func,
            job_id: ULong(self.job_id),
            result: Long(self.result),
            user_data: ULong(self.user_data),
        }
    }

    /// Copies histogram results out to the caller and releases every buffer.
    ///
    /// A failed copy is logged and does not affect the returned response.
    pub fn deliver(self, mem: &dyn UserMemory) -> CbRsp {
        for output in &self.histograms {
            if let Err(err) = output.deliver(mem) {
                warn!(
                    "job {}: failed to copy {:?} to {}: {}",
                    self.job_id,
                    output.buffer.kind(),
                    output.target,
                    err
                );
            }
        }
        self.response()
    }
}

/// WAIT_FOR_COMPLETION response when no record is available.
pub fn no_completion() -> CbRsp {
    CbRsp {
        ercd: Long(CB_RSP_NONE),
        ..Default::default()
    }
}

#[derive(Debug, Default)]
struct QueueState {
    records: VecDeque<CompletionRecord>,
    wakeups: usize,
    /// Generation of the parked waiter an interrupt was raised against.
    interrupted: Option<u64>,
    /// Threads blocked in `register_waiter`.
    registering: usize,
    register_interrupt: bool,
    next_generation: u64,
    designated: u64,
    parked: Option<u64>,
    waiting: usize,
}

impl QueueState {
    fn leave(&mut self, generation: u64) {
        self.waiting -= 1;
        if self.parked == Some(generation) {
            self.parked = None;
        }
        if self.interrupted == Some(generation) {
            self.interrupted = None;
        }
    }

    fn leave_registration(&mut self) {
        self.registering -= 1;
        if self.registering == 0 {
            self.register_interrupt = false;
        }
    }
}

/// FIFO of completion records shared by a session and its engine.
#[derive(Debug, Default)]
pub struct CompletionQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
    handoff: Condvar,
}

impl CompletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record and wakes the waiter.
    pub fn push(&self, record: CompletionRecord) {
        let mut state = self.state.lock();
        if state.records.try_reserve(1).is_err() {
            drop(state);
            error!("job {}: no memory to queue completion", record.job_id);
            return;
        }
        debug!("job {} completed with {}", record.job_id, record.result);
        state.records.push_back(record);
        state.wakeups += 1;
        drop(state);
        self.ready.notify_all();
    }

    /// Blocks until a wake-up is available.
    ///
    /// Returns the oldest record, or `None` when the wake-up found the FIFO
    /// empty or this waiter was superseded by a newer one.
    pub fn wait(&self) -> Result<Option<CompletionRecord>> {
        let mut state = self.state.lock();
        let generation = state.next_generation;
        state.next_generation += 1;
        state.designated = generation;
        state.waiting += 1;
        // a previous waiter, if any, must notice it was superseded
        self.ready.notify_all();

        loop {
            if state.designated != generation {
                state.leave(generation);
                drop(state);
                debug!("waiter {} superseded", generation);
                self.handoff.notify_all();
                return Ok(None);
            }
            if state.wakeups > 0 {
                state.wakeups -= 1;
                let record = state.records.pop_front();
                state.leave(generation);
                drop(state);
                self.handoff.notify_all();
                return Ok(record);
            }
            if state.interrupted == Some(generation) {
                state.leave(generation);
                drop(state);
                self.handoff.notify_all();
                return Err(Error::Interrupted);
            }
            state.parked = Some(generation);
            self.handoff.notify_all();
            self.ready.wait(&mut state);
        }
    }

    /// Blocks until the designated waiter is parked in [`wait`] and no
    /// superseded waiter is still running.
    ///
    /// [`wait`]: CompletionQueue::wait
    pub fn register_waiter(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.registering += 1;
        loop {
            if state.parked == Some(state.designated) && state.waiting == 1 {
                state.leave_registration();
                return Ok(());
            }
            if state.register_interrupt {
                state.leave_registration();
                return Err(Error::Interrupted);
            }
            self.handoff.wait(&mut state);
        }
    }

    /// Drops every queued record, releasing its buffers, and wakes the
    /// waiter with an empty result.
    pub fn stop(&self) {
        let drained = {
            let mut state = self.state.lock();
            state.wakeups = 1;
            std::mem::take(&mut state.records)
        };
        self.ready.notify_all();
        if !drained.is_empty() {
            debug!("discarded {} pending completions", drained.len());
        }
    }

    /// Aborts the currently blocked [`CompletionQueue::wait`] and any
    /// blocked [`CompletionQueue::register_waiter`] with
    /// [`Error::Interrupted`].
    ///
    /// Does nothing when no thread is blocked. A parked waiter that already
    /// has a wake-up available returns its record instead.
    pub fn interrupt(&self) {
        let mut state = self.state.lock();
        let parked = state.parked;
        if parked.is_none() && state.registering == 0 {
            debug!("interrupt with no blocked thread ignored");
            return;
        }
        if parked.is_some() {
            state.interrupted = parked;
        }
        if state.registering > 0 {
            state.register_interrupt = true;
        }
        drop(state);
        self.ready.notify_all();
        self.handoff.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a waiter is currently blocked.
    pub fn has_waiter(&self) -> bool {
        self.state.lock().parked.is_some()
    }
}
