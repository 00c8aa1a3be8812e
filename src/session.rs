// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Per-handle command dispatch.
//!
//! A [`Session`] corresponds to one open handle on the interface. Commands
//! arrive either through [`Session::ioctl`] (native caller) or
//! [`Session::compat_ioctl`] (32-bit caller) with the caller address of the
//! command argument; both forks run the same handlers with a different
//! [`Abi`]. The typed methods are the same handlers and also return the value
//! written back to the caller.

use crate::{
    completion::{no_completion, CompletionQueue},
    engine::{EngineHandle, InitParams, Rejected},
    entry::{CompletionToken, EntryRequest, JobRequest},
    error::{Error, Result, ServiceError},
    params::{JobKind, ParameterAggregate},
    user::{read_layout, write_layout, UserMemory},
    HardwareContext,
};
use parking_lot::RwLock;
use std::{fmt, sync::Arc};
use tracing::{debug, error, warn};
use vspm_sys::{
    fdp::{FdpInit, FdpStatus},
    vspm::{
        CbRsp, EntryRsp, JobIdArg, VspmEntry, VspmInit, VspmJob, VspmStatus,
        JOB_KIND_DEINTERLACE, R_VSPM_OK,
    },
    Abi, Layout, Long, ULong, UserPtr,
};

/// Commands accepted by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Argument: `VspmInit`.
    Init,
    /// No argument.
    Quit,
    /// Argument: `VspmEntry`, response written back in place.
    Entry,
    /// Argument: `JobIdArg`.
    Cancel,
    /// Argument: `VspmStatus`.
    GetStatus,
    /// Argument: `CbRsp`, written.
    WaitForCompletion,
    /// No argument.
    RegisterWaiter,
    /// No argument.
    StopWaiting,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Command::Init => "INIT",
            Command::Quit => "QUIT",
            Command::Entry => "ENTRY",
            Command::Cancel => "CANCEL",
            Command::GetStatus => "GET_STATUS",
            Command::WaitForCompletion => "WAIT_FOR_COMPLETION",
            Command::RegisterWaiter => "REGISTER_AS_WAITER",
            Command::StopWaiting => "STOP_WAITING",
        };
        f.write_str(name)
    }
}

/// State of one open handle.
pub struct Session {
    context: HardwareContext,
    mem: Arc<dyn UserMemory>,
    handle: RwLock<Option<Box<dyn EngineHandle>>>,
    queue: Arc<CompletionQueue>,
}

impl Session {
    pub fn open(context: HardwareContext, mem: Arc<dyn UserMemory>) -> Self {
        Self {
            context,
            mem,
            handle: RwLock::new(None),
            queue: Arc::new(CompletionQueue::new()),
        }
    }

    pub fn queue(&self) -> &Arc<CompletionQueue> {
        &self.queue
    }

    /// Whether INIT has succeeded and QUIT has not run yet.
    pub fn is_initialized(&self) -> bool {
        self.handle.read().is_some()
    }

    /// Native command entry point.
    pub fn ioctl(&self, cmd: Command, arg: UserPtr) -> Result<()> {
        self.dispatch(Abi::Native, cmd, arg)
    }

    /// Entry point for 32-bit callers.
    pub fn compat_ioctl(&self, cmd: Command, arg: UserPtr) -> Result<()> {
        self.dispatch(Abi::Compat, cmd, arg)
    }

    fn dispatch(&self, abi: Abi, cmd: Command, arg: UserPtr) -> Result<()> {
        let result = match cmd {
            Command::Init => self.init(abi, arg).map(drop),
            Command::Quit => self.quit(),
            Command::Entry => self.entry(abi, arg).map(drop),
            Command::Cancel => self.cancel(abi, arg),
            Command::GetStatus => self.get_status(abi, arg).map(drop),
            Command::WaitForCompletion => self.wait_for_completion(abi, arg).map(drop),
            Command::RegisterWaiter => self.register_waiter(),
            Command::StopWaiting => self.stop_waiting(),
        };
        if let Err(err) = result {
            debug!("{} ({}) failed: {}", cmd, abi, err);
        }
        result
    }

    fn read<T: Layout>(&self, abi: Abi, ptr: UserPtr, cmd: Command) -> Result<T> {
        read_layout(&*self.mem, abi, ptr).map_err(|err| {
            error!("{}: failed to copy {} from caller", cmd, T::NAME);
            err
        })
    }

    /// Opens an engine channel for this session.
    pub fn init(&self, abi: Abi, arg: UserPtr) -> Result<InitParams> {
        let init: VspmInit = self.read(abi, arg, Command::Init)?;
        let fdp = if init.kind == JOB_KIND_DEINTERLACE && !init.par.is_null() {
            Some(self.read::<FdpInit>(abi, init.par, Command::Init)?)
        } else {
            None
        };
        let params = InitParams {
            use_ch: init.use_ch.0,
            mode: init.mode,
            kind: init.kind,
            fdp,
        };

        let mut handle = self.handle.write();
        if handle.is_some() {
            return Err(Error::AlreadyInUse);
        }
        let engine = self.context.engine.init(&params).map_err(|err| {
            error!("INIT: engine refused: {}", err);
            Error::from(err)
        })?;
        *handle = Some(engine);
        debug!("session initialised for kind {} channels {:#x}", params.kind, params.use_ch);
        Ok(params)
    }

    /// Closes the engine channel.
    pub fn quit(&self) -> Result<()> {
        let mut handle = self.handle.write();
        let engine = handle.as_ref().ok_or(Error::Fault)?;
        engine.quit().map_err(|err| {
            error!("QUIT: {}", err);
            Error::Fault
        })?;
        *handle = None;
        Ok(())
    }

    fn job_request(&self, abi: Abi, ptr: UserPtr) -> Result<JobRequest> {
        let job: VspmJob = self.read(abi, ptr, Command::Entry)?;
        let params = match JobKind::from_raw(job.kind) {
            Some(kind) if !job.par.is_null() => Some(ParameterAggregate::copy(
                &*self.mem,
                &self.context.allocator,
                abi,
                kind,
                job.par,
            )?),
            _ => None,
        };
        Ok(JobRequest {
            kind: job.kind,
            params,
        })
    }

    /// Copies the job tree and submits it.
    ///
    /// Marshalling failures are returned as errors and nothing is
    /// submitted. A refusal by the engine is not an error: it is reported
    /// through `ercd` of the returned (and written back) response.
    pub fn entry(&self, abi: Abi, arg: UserPtr) -> Result<EntryRsp> {
        let mut entry: VspmEntry = self.read(abi, arg, Command::Entry)?;
        let job = if entry.req.job_param.is_null() {
            None
        } else {
            Some(self.job_request(abi, entry.req.job_param)?)
        };

        let request = EntryRequest::from(&entry.req);
        let token = CompletionToken::new(request, job, Arc::clone(&self.queue));
        let outcome = match self.handle.read().as_ref() {
            Some(engine) => engine.entry(request.priority, token),
            None => Err(Rejected {
                error: ServiceError::Failed,
                token,
            }),
        };

        entry.rsp = match outcome {
            Ok(job_id) => EntryRsp {
                ercd: Long(R_VSPM_OK),
                job_id: ULong(job_id),
            },
            Err(Rejected { error, token }) => {
                debug!("ENTRY: engine rejected job: {}", error);
                drop(token);
                EntryRsp {
                    ercd: Long(error.code()),
                    job_id: ULong(0),
                }
            }
        };

        if let Err(err) = write_layout(&*self.mem, abi, arg, &entry) {
            warn!("ENTRY: failed to copy the result: {}", err);
        }
        Ok(entry.rsp)
    }

    /// Cancels a job that has not started yet.
    pub fn cancel(&self, abi: Abi, arg: UserPtr) -> Result<()> {
        let arg: JobIdArg = self.read(abi, arg, Command::Cancel)?;
        let handle = self.handle.read();
        let engine = handle.as_ref().ok_or(Error::Fault)?;
        engine.cancel(arg.job_id.0).map_err(Error::from)
    }

    /// Delivers the de-interlacer status to `VspmStatus::fdp`.
    pub fn get_status(&self, abi: Abi, arg: UserPtr) -> Result<FdpStatus> {
        let target: VspmStatus = self.read(abi, arg, Command::GetStatus)?;
        let status = {
            let handle = self.handle.read();
            let engine = handle.as_ref().ok_or(Error::Fault)?;
            engine.status().map_err(Error::from)?
        };
        write_layout(&*self.mem, abi, target.fdp, &status).map_err(|err| {
            error!("GET_STATUS: failed to copy to caller");
            err
        })?;
        Ok(status)
    }

    /// Blocks for the next completion and writes its response to `arg`.
    ///
    /// Histogram results are copied to their caller targets first; a failure
    /// there is logged only. A failure to write the response itself is
    /// [`Error::Fault`].
    pub fn wait_for_completion(&self, abi: Abi, arg: UserPtr) -> Result<CbRsp> {
        let rsp = match self.queue.wait()? {
            Some(record) => record.deliver(&*self.mem),
            None => no_completion(),
        };
        write_layout(&*self.mem, abi, arg, &rsp).map_err(|err| {
            error!("WAIT_FOR_COMPLETION: failed to copy the response");
            err
        })?;
        Ok(rsp)
    }

    /// Blocks until a waiter thread is parked in
    /// [`Session::wait_for_completion`].
    pub fn register_waiter(&self) -> Result<()> {
        self.queue.register_waiter()
    }

    /// Discards pending completions and releases the waiter.
    pub fn stop_waiting(&self) -> Result<()> {
        self.queue.stop();
        Ok(())
    }

    /// Signal delivery: interrupts the blocked wait, if any.
    pub fn interrupt(&self) {
        self.queue.interrupt();
    }

    /// Quits the engine channel if still open and drains the queue.
    ///
    /// Safe to call more than once; also runs on drop.
    pub fn close(&self) -> Result<()> {
        let handle = self.handle.write().take();
        let result = match handle {
            Some(engine) => engine.quit().map_err(|err| {
                error!("close: failed to quit engine: {}", err);
                Error::Fault
            }),
            None => Ok(()),
        };
        self.queue.stop();
        result
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("session close: {}", err);
        }
    }
}
