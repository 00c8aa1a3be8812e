// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! In-process job engine.
//!
//! Jobs queue in priority order and are completed either by hand
//! ([`LoopbackEngine::start`], [`LoopbackEngine::complete`]) or by worker
//! threads after a configurable latency. Histogram outputs are filled with a
//! recognisable pattern before completion so delivery can be checked.

use crate::{
    coherent::ScopedBuffer,
    engine::{EngineHandle, InitParams, JobEngine, JobId, Rejected},
    entry::CompletionToken,
    error::ServiceError,
    params::{JobKind, ParameterAggregate},
};
use parking_lot::{Condvar, Mutex};
use std::{
    collections::VecDeque,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{debug, warn};
use vspm_sys::{fdp::FdpStatus, vspm::R_VSPM_OK, ULong};

/// Highest priority the engine accepts.
pub const PRIORITY_MAX: u8 = 126;
/// Lowest priority the engine accepts.
pub const PRIORITY_MIN: u8 = 1;

#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    /// Jobs that may wait per engine before entry reports a full queue.
    pub queue_depth: usize,
    /// Worker threads; zero leaves completion to the caller.
    pub workers: usize,
    /// Processing time of a worker job.
    pub latency: Duration,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            queue_depth: 32,
            workers: 0,
            latency: Duration::from_millis(5),
        }
    }
}

struct Job {
    id: JobId,
    handle: u64,
    priority: u8,
    token: CompletionToken,
}

#[derive(Default)]
struct EngineState {
    channels: u64,
    next_job: JobId,
    next_handle: u64,
    waiting: VecDeque<Job>,
    running: Vec<Job>,
    completed: u32,
    last_picid: u64,
    shutdown: bool,
}

impl EngineState {
    fn take(&mut self, id: JobId) -> Option<Job> {
        if let Some(pos) = self.waiting.iter().position(|job| job.id == id) {
            return self.waiting.remove(pos);
        }
        let pos = self.running.iter().position(|job| job.id == id)?;
        Some(self.running.remove(pos))
    }
}

struct Shared {
    config: LoopbackConfig,
    state: Mutex<EngineState>,
    work: Condvar,
}

impl Shared {
    fn finish(&self, job: Job, result: i64) {
        if let Some(params) = job.token.job().and_then(|job| job.params.as_ref()) {
            fill_histograms(job.id, params);
            if let Some(picid) = picture_id(params) {
                self.state.lock().last_picid = picid;
            }
        }
        debug!("loopback job {} finished with {}", job.id, result);
        job.token.complete(job.id, result);
        self.state.lock().completed += 1;
    }

    fn worker(&self) {
        loop {
            let (id, latency) = {
                let mut state = self.state.lock();
                loop {
                    if state.shutdown {
                        return;
                    }
                    if let Some(job) = state.waiting.pop_front() {
                        let id = job.id;
                        state.running.push(job);
                        break (id, self.config.latency * (1 + (id % 3) as u32));
                    }
                    self.work.wait(&mut state);
                }
            };
            thread::sleep(latency);
            // quit may have discarded the job meanwhile
            let job = self.state.lock().take(id);
            if let Some(job) = job {
                self.finish(job, R_VSPM_OK);
            }
        }
    }
}

fn fill_histograms(id: JobId, params: &ParameterAggregate) {
    let Some(job) = params.as_compositor() else {
        return;
    };
    for buffer in job.histograms() {
        if let Err(err) = buffer.write(&histogram_pattern(id, buffer)) {
            warn!("job {}: failed to fill {:?}: {}", id, buffer.kind(), err);
        }
    }
}

/// Content the engine writes into a histogram output of job `id`.
pub fn histogram_pattern(id: JobId, buffer: &ScopedBuffer) -> Vec<u8> {
    (0..buffer.len())
        .map(|i| (id as u8).wrapping_add(i as u8))
        .collect()
}

fn picture_id(params: &ParameterAggregate) -> Option<u64> {
    let fproc = params.as_deinterlace()?.fproc.as_ref()?;
    fproc.in_pic.as_ref().map(|pic| pic.picid.0)
}

/// Engine that completes jobs inside the process.
pub struct LoopbackEngine {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl LoopbackEngine {
    pub fn new(config: LoopbackConfig) -> Self {
        let shared = Arc::new(Shared {
            config,
            state: Mutex::new(EngineState {
                next_job: 1,
                next_handle: 1,
                ..Default::default()
            }),
            work: Condvar::new(),
        });
        let workers = (0..shared.config.workers)
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || shared.worker())
            })
            .collect();
        Self {
            shared,
            workers: Mutex::new(workers),
        }
    }

    /// Jobs accepted but not yet started.
    pub fn pending(&self) -> Vec<JobId> {
        let state = self.shared.state.lock();
        state.waiting.iter().map(|job| job.id).collect()
    }

    /// Jobs started but not yet completed.
    pub fn running(&self) -> Vec<JobId> {
        let state = self.shared.state.lock();
        state.running.iter().map(|job| job.id).collect()
    }

    /// Number of jobs completed so far.
    pub fn completed(&self) -> u32 {
        self.shared.state.lock().completed
    }

    /// Marks a waiting job as running, so it can no longer be cancelled.
    pub fn start(&self, id: JobId) -> bool {
        let mut state = self.shared.state.lock();
        let Some(pos) = state.waiting.iter().position(|job| job.id == id) else {
            return false;
        };
        if let Some(job) = state.waiting.remove(pos) {
            state.running.push(job);
        }
        true
    }

    /// Completes a waiting or running job with `result`.
    pub fn complete(&self, id: JobId, result: i64) -> bool {
        let job = self.shared.state.lock().take(id);
        match job {
            Some(job) => {
                self.shared.finish(job, result);
                true
            }
            None => false,
        }
    }

    /// Completes the oldest running job, or else the first waiting one.
    pub fn complete_next(&self, result: i64) -> Option<JobId> {
        let job = {
            let mut state = self.shared.state.lock();
            if state.running.is_empty() {
                state.waiting.pop_front()
            } else {
                Some(state.running.remove(0))
            }
        }?;
        let id = job.id;
        self.shared.finish(job, result);
        Some(id)
    }
}

impl Default for LoopbackEngine {
    fn default() -> Self {
        Self::new(LoopbackConfig::default())
    }
}

impl Drop for LoopbackEngine {
    fn drop(&mut self) {
        self.shared.state.lock().shutdown = true;
        self.shared.work.notify_all();
        for worker in self.workers.lock().drain(..) {
            if worker.join().is_err() {
                warn!("loopback worker panicked");
            }
        }
    }
}

impl JobEngine for LoopbackEngine {
    fn init(&self, params: &InitParams) -> Result<Box<dyn EngineHandle>, ServiceError> {
        let kind = JobKind::from_raw(params.kind).ok_or(ServiceError::Param)?;
        if params.use_ch == 0 {
            return Err(ServiceError::Param);
        }
        let mut state = self.shared.state.lock();
        if state.channels & params.use_ch != 0 {
            return Err(ServiceError::AlreadyUsed);
        }
        state.channels |= params.use_ch;
        let id = state.next_handle;
        state.next_handle += 1;
        debug!("loopback handle {} ({}) channels {:#x}", id, kind, params.use_ch);

        Ok(Box::new(LoopbackHandle {
            shared: Arc::clone(&self.shared),
            id,
            kind,
            channels: params.use_ch,
            open: Mutex::new(true),
        }))
    }
}

struct LoopbackHandle {
    shared: Arc<Shared>,
    id: u64,
    kind: JobKind,
    channels: u64,
    open: Mutex<bool>,
}

impl LoopbackHandle {
    fn check(&self, priority: u8, token: &CompletionToken) -> Result<(), ServiceError> {
        if !*self.open.lock() {
            return Err(ServiceError::Failed);
        }
        if !(PRIORITY_MIN..=PRIORITY_MAX).contains(&priority) {
            return Err(ServiceError::Param);
        }
        match token.job() {
            Some(job) if job.job_kind() == Some(self.kind) && job.params.is_some() => Ok(()),
            _ => Err(ServiceError::Param),
        }
    }
}

impl EngineHandle for LoopbackHandle {
    fn entry(&self, priority: u8, token: CompletionToken) -> Result<JobId, Rejected> {
        if let Err(error) = self.check(priority, &token) {
            return Err(Rejected { error, token });
        }

        let mut state = self.shared.state.lock();
        let queued = state
            .waiting
            .iter()
            .filter(|job| job.handle == self.id)
            .count();
        if queued >= self.shared.config.queue_depth {
            return Err(Rejected {
                error: ServiceError::QueueFull,
                token,
            });
        }

        let id = state.next_job;
        state.next_job += 1;
        let pos = state
            .waiting
            .iter()
            .position(|job| job.priority < priority)
            .unwrap_or(state.waiting.len());
        state.waiting.insert(
            pos,
            Job {
                id,
                handle: self.id,
                priority,
                token,
            },
        );
        drop(state);
        self.shared.work.notify_one();
        Ok(id)
    }

    fn cancel(&self, job_id: JobId) -> Result<(), ServiceError> {
        let job = {
            let mut state = self.shared.state.lock();
            if state
                .running
                .iter()
                .any(|job| job.id == job_id && job.handle == self.id)
            {
                return Err(ServiceError::Active);
            }
            let pos = state
                .waiting
                .iter()
                .position(|job| job.id == job_id && job.handle == self.id)
                .ok_or(ServiceError::NoEntry)?;
            state.waiting.remove(pos)
        };
        debug!("loopback job {} cancelled", job_id);
        drop(job);
        Ok(())
    }

    fn status(&self) -> Result<FdpStatus, ServiceError> {
        if self.kind != JobKind::Deinterlace {
            return Err(ServiceError::Param);
        }
        let state = self.shared.state.lock();
        Ok(FdpStatus {
            picid: ULong(state.last_picid),
            vcycle: state.completed,
            ..Default::default()
        })
    }

    fn quit(&self) -> Result<(), ServiceError> {
        let mut open = self.open.lock();
        if !*open {
            return Err(ServiceError::Failed);
        }
        *open = false;

        let discarded: Vec<Job> = {
            let mut state = self.shared.state.lock();
            state.channels &= !self.channels;
            let mut discarded = Vec::new();
            let waiting = std::mem::take(&mut state.waiting);
            for job in waiting {
                if job.handle == self.id {
                    discarded.push(job);
                } else {
                    state.waiting.push_back(job);
                }
            }
            let running = std::mem::take(&mut state.running);
            for job in running {
                if job.handle == self.id {
                    discarded.push(job);
                } else {
                    state.running.push(job);
                }
            }
            discarded
        };
        debug!(
            "loopback handle {} quit, {} jobs discarded",
            self.id,
            discarded.len()
        );
        Ok(())
    }
}

impl Drop for LoopbackHandle {
    fn drop(&mut self) {
        if *self.open.get_mut() {
            if let Err(err) = self.quit() {
                warn!("loopback handle {}: {}", self.id, err);
            }
        }
    }
}
