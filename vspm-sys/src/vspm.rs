// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Interface-level structures and constants shared by both job kinds.

use crate::{Addr, Long, ULong, UserPtr};

/// Compositor job kind (`VSPM_TYPE_VSP_AUTO`).
pub const JOB_KIND_COMPOSITOR: u16 = 1;
/// De-interlace job kind (`VSPM_TYPE_FDP_AUTO`).
pub const JOB_KIND_DEINTERLACE: u16 = 2;

/// Bytes per display-list or color-table entry.
pub const TABLE_ENTRY_SIZE: usize = 8;
/// Largest accepted display list, in entries.
pub const DL_MAX_ENTRIES: u16 = 16383;
/// Largest accepted color lookup table, in entries.
pub const CLUT_MAX_ENTRIES: u16 = 256;

/// Histogram (HGO) result size in bytes.
pub const HGO_SIZE: usize = 1088;
/// Tone histogram (HGT) result size in bytes.
pub const HGT_SIZE: usize = 800;
/// Alignment the engine requires for histogram output.
pub const HISTOGRAM_ALIGN: u64 = 256;

/// Engine result codes.
pub const R_VSPM_OK: i64 = 0;
pub const R_VSPM_NG: i64 = -1;
pub const R_VSPM_PARAERR: i64 = -2;
pub const R_VSPM_QUE_FULL: i64 = -3;
pub const R_VSPM_ALREADY_USED: i64 = -4;

/// Cancel outcome: job already running.
pub const VSPM_STATUS_ACTIVE: i64 = 2;
/// Cancel outcome: job id not known to the engine.
pub const VSPM_STATUS_NO_ENTRY: i64 = 4;

/// `ercd` delivered by WAIT_FOR_COMPLETION when no record is available.
pub const CB_RSP_NONE: i64 = -1;

layout! {
    /// Frame compression (FCP) companion information.
    pub struct FcpInfo {
        pub fcnl: u8,
        pub tlen: u8,
        pub pos_y: u16,
        pub pos_c: u16,
        pub stride_div16: u16,
        pub ba_anc_prev_y: Addr,
        pub ba_anc_cur_y: Addr,
        pub ba_anc_next_y: Addr,
        pub ba_anc_cur_c: Addr,
        pub ba_ref_prev_y: Addr,
        pub ba_ref_cur_y: Addr,
        pub ba_ref_next_y: Addr,
        pub ba_ref_cur_c: Addr,
    }
}

layout! {
    /// INIT argument.
    pub struct VspmInit {
        pub use_ch: ULong,
        pub mode: u16,
        pub kind: u16,
        /// Kind-specific block; [`crate::fdp::FdpInit`] for de-interlace,
        /// ignored for the compositor.
        pub par: UserPtr,
    }
}

layout! {
    /// Job descriptor referenced by an entry request.
    pub struct VspmJob {
        pub kind: u16,
        /// [`crate::vsp::VspStart`] or [`crate::fdp::FdpStart`].
        pub par: UserPtr,
    }
}

layout! {
    pub struct EntryReq {
        pub priority: u8,
        pub job_param: UserPtr,
        pub user_data: ULong,
        /// Caller callback address. Passed back untouched, never invoked.
        pub cb_func: Addr,
    }
}

layout! {
    pub struct EntryRsp {
        pub ercd: Long,
        pub job_id: ULong,
    }
}

layout! {
    /// ENTRY argument; `rsp` is written back on return.
    pub struct VspmEntry {
        pub req: EntryReq,
        pub rsp: EntryRsp,
    }
}

layout! {
    /// GET_STATUS argument.
    pub struct VspmStatus {
        pub fdp: UserPtr,
    }
}

layout! {
    /// WAIT_FOR_COMPLETION result.
    pub struct CbRsp {
        pub ercd: Long,
        pub cb_func: Addr,
        pub job_id: ULong,
        pub result: Long,
        pub user_data: ULong,
    }
}

layout! {
    /// CANCEL argument.
    pub struct JobIdArg {
        pub job_id: ULong,
    }
}
