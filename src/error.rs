// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use thiserror::Error;
use vspm_sys::vspm::{
    R_VSPM_ALREADY_USED, R_VSPM_NG, R_VSPM_OK, R_VSPM_PARAERR, R_VSPM_QUE_FULL,
    VSPM_STATUS_ACTIVE, VSPM_STATUS_NO_ENTRY,
};

/// Errors returned to the caller of a session command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// Malformed request or an operation the job kind does not support.
    #[error("invalid argument")]
    InvalidArgument,
    /// Caller memory could not be read or written.
    #[error("bad address")]
    Fault,
    /// The coherent pool could not satisfy an allocation.
    #[error("out of coherent memory")]
    OutOfMemory,
    /// The job is already running and cannot be cancelled.
    #[error("job is active")]
    Busy,
    /// The engine does not know the job id.
    #[error("no such job")]
    NotFound,
    /// The engine channel or the session handle is already taken.
    #[error("already in use")]
    AlreadyInUse,
    /// A blocking wait was interrupted.
    #[error("interrupted")]
    Interrupted,
}

impl Error {
    /// Negated errno as an ioctl handler would return it.
    pub fn errno(self) -> i32 {
        -match self {
            Error::InvalidArgument => libc::EINVAL,
            Error::Fault => libc::EFAULT,
            Error::OutOfMemory => libc::ENOMEM,
            Error::Busy => libc::EBUSY,
            Error::NotFound => libc::ENOENT,
            Error::AlreadyInUse => libc::EBUSY,
            Error::Interrupted => libc::EINTR,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Non-success result code reported by the job engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("engine error")]
    Failed,
    #[error("engine rejected a parameter")]
    Param,
    #[error("engine queue is full")]
    QueueFull,
    #[error("engine channel already used")]
    AlreadyUsed,
    #[error("job is active")]
    Active,
    #[error("job not found")]
    NoEntry,
    #[error("engine returned {0}")]
    Other(i64),
}

impl ServiceError {
    pub fn code(self) -> i64 {
        match self {
            ServiceError::Failed => R_VSPM_NG,
            ServiceError::Param => R_VSPM_PARAERR,
            ServiceError::QueueFull => R_VSPM_QUE_FULL,
            ServiceError::AlreadyUsed => R_VSPM_ALREADY_USED,
            ServiceError::Active => VSPM_STATUS_ACTIVE,
            ServiceError::NoEntry => VSPM_STATUS_NO_ENTRY,
            ServiceError::Other(code) => code,
        }
    }

    /// Maps a raw engine code; `R_VSPM_OK` is not an error.
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            R_VSPM_OK => return None,
            R_VSPM_NG => ServiceError::Failed,
            R_VSPM_PARAERR => ServiceError::Param,
            R_VSPM_QUE_FULL => ServiceError::QueueFull,
            R_VSPM_ALREADY_USED => ServiceError::AlreadyUsed,
            VSPM_STATUS_ACTIVE => ServiceError::Active,
            VSPM_STATUS_NO_ENTRY => ServiceError::NoEntry,
            other => ServiceError::Other(other),
        })
    }
}

impl From<ServiceError> for Error {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Param => Error::InvalidArgument,
            ServiceError::AlreadyUsed => Error::AlreadyInUse,
            ServiceError::Active => Error::Busy,
            ServiceError::NoEntry => Error::NotFound,
            _ => Error::Fault,
        }
    }
}
