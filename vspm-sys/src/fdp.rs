// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! De-interlacer (FDP) job parameters.

use crate::{Addr, ULong, UserPtr};

layout! {
    /// Root of a de-interlace job.
    pub struct FdpStart {
        pub fdpgo: u8,
        pub fproc_par: UserPtr,
    }
}

layout! {
    /// Frame-processing settings.
    pub struct FdpFproc {
        pub seq_par: UserPtr,
        pub in_pic: UserPtr,
        pub last_seq_indicator: u8,
        pub current_field: u8,
        pub interpolated_line: u8,
        pub out_format: u8,
        pub out_buf: UserPtr,
        pub ref_buf: UserPtr,
        pub fcp_par: UserPtr,
    }
}

layout! {
    /// Sequence settings. Same layout under both ABIs.
    pub struct FdpSeq {
        pub seq_mode: u8,
        pub telecine_mode: u8,
        pub in_width: u16,
        pub in_height: u16,
    }
}

layout! {
    /// Input picture.
    pub struct FdpPic {
        pub picid: ULong,
        pub chroma_format: u8,
        pub width: u16,
        pub height: u16,
        pub progressive_sequence: u8,
        pub progressive_frame: u8,
        pub picture_structure: u8,
        pub repeat_first_field: u8,
        pub top_field_first: u8,
    }
}

layout! {
    /// Image buffer (output or reference field).
    pub struct FdpImgbuf {
        pub addr: Addr,
        pub addr_c0: Addr,
        pub addr_c1: Addr,
        pub stride: u16,
        pub stride_c: u16,
    }
}

layout! {
    /// Reference fields around the current one.
    pub struct FdpRefbuf {
        pub next_buf: UserPtr,
        pub cur_buf: UserPtr,
        pub prev_buf: UserPtr,
    }
}

layout! {
    /// De-interlacer specific initialisation.
    pub struct FdpInit {
        pub hard_addr: [Addr; 2],
    }
}

layout! {
    /// De-interlacer status block returned by GET_STATUS.
    pub struct FdpStatus {
        pub picid: ULong,
        pub vcycle: u32,
        pub sensor: [u32; 18],
    }
}
