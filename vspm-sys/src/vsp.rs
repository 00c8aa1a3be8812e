// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Compositor (VSP) job parameters.
//!
//! The tree is rooted at [`VspStart`]. Every [`UserPtr`] field is an optional
//! link to a child structure; a null link means the unit is not used.

use crate::{Addr, ULong, UserPtr};

/// Number of read pixel formatters (input sources) a job may reference.
pub const SRC_COUNT: usize = 5;

/// Number of blend layers in the blend/ROP unit.
pub const BLEND_LAYERS: usize = 5;

layout! {
    /// Table descriptor used for display lists, color lookup tables and the
    /// LUT/CLU/DRC tables.
    pub struct VspDl {
        pub hard_addr: Addr,
        pub virt_addr: Addr,
        pub tbl_num: u16,
    }
}

layout! {
    /// Root of a compositor job.
    pub struct VspStart {
        pub rpf_num: u8,
        pub use_module: ULong,
        pub src_par: [UserPtr; SRC_COUNT],
        pub dst_par: UserPtr,
        pub ctrl_par: UserPtr,
        /// Display list. Entries are allocated by the interface, never
        /// copied from the caller.
        pub dl_par: VspDl,
    }
}

layout! {
    /// Input source (RPF) settings.
    pub struct VspSrc {
        pub addr: Addr,
        pub addr_c0: Addr,
        pub addr_c1: Addr,
        pub stride: u16,
        pub stride_c: u16,
        pub width: u16,
        pub height: u16,
        pub width_ex: u16,
        pub height_ex: u16,
        pub x_offset: u16,
        pub y_offset: u16,
        pub format: u16,
        pub swap: u16,
        pub x_position: u16,
        pub y_position: u16,
        pub pwd: u8,
        pub cipm: u8,
        pub cext: u8,
        pub csc: u8,
        pub iturbt: u8,
        pub clrcng: u8,
        pub vir: u8,
        pub vircolor: ULong,
        /// Color lookup table; `virt_addr` points at the caller's table.
        pub clut: UserPtr,
        pub alpha: UserPtr,
        pub connect: ULong,
    }
}

layout! {
    pub struct VspAlphaUnit {
        pub addr_a: Addr,
        pub stride_a: u16,
        pub swap: u16,
        pub asel: u8,
        pub aext: u8,
        pub anum0: u8,
        pub anum1: u8,
        pub afix: u8,
        pub irop: UserPtr,
        pub ckey: UserPtr,
        pub mult: UserPtr,
    }
}

layout! {
    /// Rotation-invariant raster operation.
    pub struct VspIropUnit {
        pub op_mode: u8,
        pub ref_sel: u8,
        pub bit_sel: u8,
        pub comp_color: ULong,
        pub irop_color0: ULong,
        pub irop_color1: ULong,
    }
}

layout! {
    /// Color key.
    pub struct VspCkeyUnit {
        pub mode: u8,
        pub color1: ULong,
        pub color2: ULong,
    }
}

layout! {
    /// Alpha multiply. Same layout under both ABIs.
    pub struct VspMultUnit {
        pub a_mmd: u8,
        pub p_mmd: u8,
        pub ratio: u8,
    }
}

layout! {
    /// Output (WPF) settings.
    pub struct VspDst {
        pub addr: Addr,
        pub addr_c0: Addr,
        pub addr_c1: Addr,
        pub stride: u16,
        pub stride_c: u16,
        pub width: u16,
        pub height: u16,
        pub x_offset: u16,
        pub y_offset: u16,
        pub format: u16,
        pub swap: u16,
        pub pxa: u8,
        pub pad: u8,
        pub x_coffset: u16,
        pub y_coffset: u16,
        pub csc: u8,
        pub iturbt: u8,
        pub clrcng: u8,
        pub cbrm: u8,
        pub abrm: u8,
        pub athres: u8,
        pub clmd: u8,
        pub dith: u8,
        pub rotation: u8,
        pub fcp: UserPtr,
    }
}

layout! {
    /// Processing-unit routing for the job.
    pub struct VspCtrl {
        pub sru: UserPtr,
        pub uds: UserPtr,
        pub lut: UserPtr,
        pub clu: UserPtr,
        pub hst: UserPtr,
        pub hsi: UserPtr,
        pub bru: UserPtr,
        pub hgo: UserPtr,
        pub hgt: UserPtr,
        pub shp: UserPtr,
        pub drc: UserPtr,
    }
}

layout! {
    /// Super-resolution.
    pub struct VspSru {
        pub mode: u8,
        pub param: u16,
        pub enscl: u16,
        pub fxa: u8,
        pub connect: ULong,
    }
}

layout! {
    /// Up/down scaler.
    pub struct VspUds {
        pub amd: u8,
        pub clip: u8,
        pub alpha: u8,
        pub complement: u8,
        pub athres0: u8,
        pub athres1: u8,
        pub anum0: u8,
        pub anum1: u8,
        pub anum2: u8,
        pub x_ratio: u16,
        pub y_ratio: u16,
        pub connect: ULong,
    }
}

layout! {
    /// 1D lookup table. The table addresses are hardware addresses and are
    /// passed through.
    pub struct VspLut {
        pub lut: VspDl,
        pub fxa: u8,
        pub connect: ULong,
    }
}

layout! {
    /// 3D cubic lookup table.
    pub struct VspClu {
        pub mode: u8,
        pub clu: VspDl,
        pub fxa: u8,
        pub connect: ULong,
    }
}

layout! {
    /// RGB to HSV conversion.
    pub struct VspHst {
        pub fxa: u8,
        pub connect: ULong,
    }
}

layout! {
    /// HSV to RGB conversion.
    pub struct VspHsi {
        pub fxa: u8,
        pub connect: ULong,
    }
}

layout! {
    /// Blend/ROP unit.
    pub struct VspBru {
        pub lay_order: ULong,
        pub adiv: u8,
        pub dither_unit: [UserPtr; BLEND_LAYERS],
        pub blend_virtual: UserPtr,
        /// Blend control for layers A to E.
        pub blend_unit: [UserPtr; BLEND_LAYERS],
        pub rop_unit: UserPtr,
        pub connect: ULong,
    }
}

layout! {
    pub struct VspBldDither {
        pub mode: u8,
        pub bpp: u8,
    }
}

layout! {
    /// Virtual canvas the blend layers are composed onto.
    pub struct VspBldVir {
        pub width: u16,
        pub height: u16,
        pub x_position: u16,
        pub y_position: u16,
        pub pwd: u8,
        pub color: ULong,
    }
}

layout! {
    pub struct VspBldCtrl {
        pub blend_formula: u8,
        pub blend_coefx: u8,
        pub blend_coefy: u8,
        pub aformula: u8,
        pub acoefx: u8,
        pub acoefy: u8,
        pub acoefx_fix: u8,
        pub acoefy_fix: u8,
    }
}

layout! {
    pub struct VspBldRop {
        pub crop: u8,
        pub arop: u8,
    }
}

layout! {
    /// Histogram generator.
    ///
    /// `virt_addr` is where the caller wants the 1088-byte result delivered;
    /// the interface substitutes its own coherent buffer for both addresses.
    pub struct VspHgo {
        pub hard_addr: Addr,
        pub virt_addr: Addr,
        pub width: u16,
        pub height: u16,
        pub x_offset: u16,
        pub y_offset: u16,
        pub binary_mode: u8,
        pub maxrgb_mode: u8,
        pub step_mode: u8,
        pub x_skip: u8,
        pub y_skip: u8,
        pub sampling: ULong,
    }
}

layout! {
    pub struct HgtArea {
        pub lower: u8,
        pub upper: u8,
    }
}

layout! {
    /// Hue (tone) histogram generator. Result is 800 bytes.
    pub struct VspHgt {
        pub hard_addr: Addr,
        pub virt_addr: Addr,
        pub width: u16,
        pub height: u16,
        pub x_offset: u16,
        pub y_offset: u16,
        pub x_skip: u8,
        pub y_skip: u8,
        pub area: [HgtArea; 6],
        pub sampling: ULong,
    }
}

layout! {
    /// Sharpness.
    pub struct VspShp {
        pub mode: u8,
        pub gain0: u16,
        pub limit0: u8,
        pub gain10: u16,
        pub limit10: u8,
        pub gain11: u16,
        pub limit11: u8,
        pub gain20: u16,
        pub limit20: u8,
        pub gain21: u16,
        pub limit21: u8,
        pub fxa: u8,
        pub connect: ULong,
    }
}

layout! {
    /// Dynamic range compression.
    pub struct VspDrc {
        pub drc: VspDl,
        pub fxa: u8,
        pub connect: ULong,
    }
}
