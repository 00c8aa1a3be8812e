// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_vspm::loopback::LoopbackConfig;
use std::time::Duration;
use vspm_sys::{
    vspm::{JOB_KIND_COMPOSITOR, JOB_KIND_DEINTERLACE},
    Abi,
};

/// Job kind submitted by the demo.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum Kind {
    /// VSP compositor jobs
    Compositor,
    /// FDP de-interlace jobs
    Deinterlace,
}

impl Kind {
    pub fn raw(self) -> u16 {
        match self {
            Kind::Compositor => JOB_KIND_COMPOSITOR,
            Kind::Deinterlace => JOB_KIND_DEINTERLACE,
        }
    }
}

/// Command-line arguments for the VSPM interface demo.
///
/// Runs a batch of jobs through a session backed by the in-process loopback
/// engine and coherent pool, with a dedicated waiter thread collecting the
/// completions. Arguments can be specified via command line or environment
/// variables.
///
/// # Example
///
/// ```bash
/// # Via command line
/// edgefirst-vspm --jobs 32 --histogram --compat
///
/// # Via environment variables
/// export JOBS=32
/// export HISTOGRAM=true
/// edgefirst-vspm
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Number of jobs to submit
    #[arg(short, long, env = "JOBS", default_value = "8")]
    pub jobs: u32,

    /// Job kind
    #[arg(long, env = "KIND", default_value = "compositor", value_enum)]
    pub kind: Kind,

    /// Submit through the 32-bit compatibility path
    #[arg(long, env = "COMPAT")]
    pub compat: bool,

    /// Display list entries per compositor job (0 disables)
    #[arg(long, env = "DL_ENTRIES", default_value = "128")]
    pub dl_entries: u16,

    /// Color lookup table entries per source (0 disables)
    #[arg(long, env = "CLUT_ENTRIES", default_value = "256")]
    pub clut_entries: u16,

    /// Input sources per compositor job (at most 5)
    #[arg(long, env = "SOURCES", default_value = "2")]
    pub sources: usize,

    /// Request HGO and HGT histogram outputs
    #[arg(long, env = "HISTOGRAM")]
    pub histogram: bool,

    /// Loopback engine worker threads
    #[arg(long, env = "WORKERS", default_value = "2")]
    pub workers: usize,

    /// Simulated job latency in milliseconds
    #[arg(long, env = "LATENCY", default_value = "5")]
    pub latency: u64,

    /// Coherent pool capacity in bytes
    #[arg(long, env = "POOL_SIZE", default_value = "4194304")]
    pub pool_size: usize,

    /// Coherent pool address granularity in bytes (power of two)
    #[arg(long, env = "POOL_GRANULE", default_value = "4096")]
    pub pool_granule: u64,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Forward logs to the systemd journal
    #[arg(long, env = "JOURNALD")]
    pub journald: bool,

    /// Enable Tracy profiler for performance analysis
    #[arg(long, env = "TRACY")]
    pub tracy: bool,
}

impl Args {
    pub fn abi(&self) -> Abi {
        if self.compat {
            Abi::Compat
        } else {
            Abi::Native
        }
    }

    pub fn loopback_config(&self) -> LoopbackConfig {
        LoopbackConfig {
            workers: self.workers.max(1),
            latency: Duration::from_millis(self.latency),
            ..Default::default()
        }
    }
}
