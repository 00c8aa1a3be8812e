// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

#![allow(dead_code)]

use edgefirst_vspm::{
    coherent::{BufferKind, CoherentAllocator, HostCoherentPool},
    engine::InitParams,
    loopback::{LoopbackConfig, LoopbackEngine},
    session::Session,
    user::SimulatedUserSpace,
    HardwareContext, Result,
};
use proptest::prelude::*;
use std::sync::Arc;
use vspm_sys::{
    fdp::{FdpFproc, FdpImgbuf, FdpPic, FdpRefbuf, FdpSeq, FdpStart},
    vsp::{
        HgtArea, VspAlphaUnit, VspBldCtrl, VspBldDither, VspBldRop, VspBldVir, VspBru, VspCkeyUnit,
        VspClu, VspCtrl, VspDl, VspDrc, VspDst, VspHgo, VspHgt, VspHsi, VspHst, VspIropUnit,
        VspLut, VspMultUnit, VspShp, VspSrc, VspSru, VspStart, VspUds, BLEND_LAYERS, SRC_COUNT,
    },
    vspm::{
        CbRsp, EntryReq, EntryRsp, FcpInfo, VspmEntry, VspmInit, VspmJob, CLUT_MAX_ENTRIES,
        DL_MAX_ENTRIES, HGO_SIZE, HGT_SIZE, TABLE_ENTRY_SIZE,
    },
    Abi, Addr, Layout, ULong, UserPtr,
};

pub const POOL_SIZE: usize = 16 << 20;

/// Bits of `ControlShape::units`, in `VspCtrl` field order.
pub const SRU: u16 = 1 << 0;
pub const UDS: u16 = 1 << 1;
pub const LUT: u16 = 1 << 2;
pub const CLU: u16 = 1 << 3;
pub const HST: u16 = 1 << 4;
pub const HSI: u16 = 1 << 5;
pub const BRU: u16 = 1 << 6;
pub const HGO: u16 = 1 << 7;
pub const HGT: u16 = 1 << 8;
pub const SHP: u16 = 1 << 9;
pub const DRC: u16 = 1 << 10;
pub const ALL_UNITS: u16 = (1 << 11) - 1;

/// Bits of `SourceShape::alpha`.
pub const IROP: u8 = 1 << 0;
pub const CKEY: u8 = 1 << 1;
pub const MULT: u8 = 1 << 2;

#[derive(Debug, Clone, Copy, Default)]
pub struct SourceShape {
    /// `tbl_num` of the color table, if the source has one.
    pub clut: Option<u16>,
    /// Whether the caller supplies the table contents.
    pub clut_table: bool,
    /// Alpha unit with its `IROP | CKEY | MULT` children.
    pub alpha: Option<u8>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ControlShape {
    pub units: u16,
    /// Blend children: bits 0-4 dither, 5 virtual canvas, 6-10 blend, 11 rop.
    pub blend: u16,
}

/// Which nodes of a compositor tree exist.
#[derive(Debug, Clone, Copy, Default)]
pub struct Shape {
    pub dl_entries: u16,
    pub sources: [Option<SourceShape>; SRC_COUNT],
    pub destination: Option<bool>,
    pub control: Option<ControlShape>,
}

impl Shape {
    /// Every node present, tables at their largest.
    pub fn full() -> Self {
        let source = SourceShape {
            clut: Some(CLUT_MAX_ENTRIES),
            clut_table: true,
            alpha: Some(IROP | CKEY | MULT),
        };
        Shape {
            dl_entries: 64,
            sources: [Some(source); SRC_COUNT],
            destination: Some(true),
            control: Some(ControlShape {
                units: ALL_UNITS,
                blend: (1 << 12) - 1,
            }),
        }
    }
}

/// A tree placed in caller memory and what copying it should yield.
#[derive(Debug, Default)]
pub struct Built {
    pub root: UserPtr,
    /// Coherent buffers the copy allocates.
    pub buffers: usize,
    /// Color table contents per source slot, when a table is allocated.
    pub clut_tables: [Option<Vec<u8>>; SRC_COUNT],
    pub hgo_target: Option<UserPtr>,
    pub hgt_target: Option<UserPtr>,
}

fn table_bytes(entries: u16, seed: usize) -> Vec<u8> {
    (0..usize::from(entries) * TABLE_ENTRY_SIZE)
        .map(|b| (b.wrapping_mul(7) + seed) as u8)
        .collect()
}

fn place_if<T: Layout>(mem: &SimulatedUserSpace, abi: Abi, present: bool, value: T) -> UserPtr {
    if present {
        mem.place(abi, &value)
    } else {
        UserPtr::NULL
    }
}

fn source(mem: &SimulatedUserSpace, abi: Abi, index: usize, shape: &SourceShape, built: &mut Built) -> UserPtr {
    let mut src = VspSrc {
        addr: Addr(0x7000_0000 + index as u64 * 0x10_0000),
        stride: 1280,
        width: 640,
        height: 480,
        format: 0x13,
        vircolor: ULong(0xff00_00ff),
        connect: ULong(0x1),
        ..Default::default()
    };

    if let Some(entries) = shape.clut {
        let table = table_bytes(entries, index);
        let virt_addr = if shape.clut_table && !table.is_empty() {
            Addr::from(mem.place_bytes(&table))
        } else {
            Addr::NULL
        };
        if BufferKind::color_table(entries).is_some() && !virt_addr.is_null() {
            built.buffers += 1;
            built.clut_tables[index] = Some(table);
        }
        let clut = VspDl {
            hard_addr: Addr(0xdead_0000),
            virt_addr,
            tbl_num: entries,
        };
        src.clut = mem.place(abi, &clut);
    }

    if let Some(bits) = shape.alpha {
        let alpha = VspAlphaUnit {
            addr_a: Addr(0x7400_0000),
            stride_a: 640,
            asel: 2,
            afix: 0x80,
            irop: place_if(
                mem,
                abi,
                bits & IROP != 0,
                VspIropUnit {
                    op_mode: 3,
                    comp_color: ULong(0x10),
                    ..Default::default()
                },
            ),
            ckey: place_if(
                mem,
                abi,
                bits & CKEY != 0,
                VspCkeyUnit {
                    mode: 1,
                    color1: ULong(0x00ff_00ff),
                    color2: ULong(0x0000_00ff),
                },
            ),
            mult: place_if(
                mem,
                abi,
                bits & MULT != 0,
                VspMultUnit {
                    a_mmd: 1,
                    p_mmd: 1,
                    ratio: 0x40,
                },
            ),
            ..Default::default()
        };
        src.alpha = mem.place(abi, &alpha);
    }

    mem.place(abi, &src)
}

fn blend(mem: &SimulatedUserSpace, abi: Abi, bits: u16) -> UserPtr {
    let mut bru = VspBru {
        lay_order: ULong(0x0001_2345),
        adiv: 1,
        connect: ULong(0x40),
        ..Default::default()
    };
    for (i, link) in bru.dither_unit.iter_mut().enumerate() {
        *link = place_if(
            mem,
            abi,
            bits & (1 << i) != 0,
            VspBldDither {
                mode: 1,
                bpp: i as u8,
            },
        );
    }
    bru.blend_virtual = place_if(
        mem,
        abi,
        bits & (1 << BLEND_LAYERS) != 0,
        VspBldVir {
            width: 1280,
            height: 720,
            color: ULong(0xff00_0000),
            ..Default::default()
        },
    );
    for (i, link) in bru.blend_unit.iter_mut().enumerate() {
        *link = place_if(
            mem,
            abi,
            bits & (1 << (BLEND_LAYERS + 1 + i)) != 0,
            VspBldCtrl {
                blend_formula: 1,
                blend_coefx: i as u8,
                ..Default::default()
            },
        );
    }
    bru.rop_unit = place_if(
        mem,
        abi,
        bits & (1 << 11) != 0,
        VspBldRop { crop: 3, arop: 4 },
    );
    mem.place(abi, &bru)
}

fn control(mem: &SimulatedUserSpace, abi: Abi, shape: &ControlShape, built: &mut Built) -> UserPtr {
    let units = shape.units;
    let table = VspDl {
        hard_addr: Addr(0x5000_0000),
        virt_addr: Addr(0x5000_1000),
        tbl_num: 17,
    };
    let mut ctrl = VspCtrl {
        sru: place_if(
            mem,
            abi,
            units & SRU != 0,
            VspSru {
                mode: 1,
                param: 0x10,
                ..Default::default()
            },
        ),
        uds: place_if(
            mem,
            abi,
            units & UDS != 0,
            VspUds {
                x_ratio: 0x2000,
                y_ratio: 0x2000,
                ..Default::default()
            },
        ),
        lut: place_if(
            mem,
            abi,
            units & LUT != 0,
            VspLut {
                lut: table,
                ..Default::default()
            },
        ),
        clu: place_if(
            mem,
            abi,
            units & CLU != 0,
            VspClu {
                mode: 2,
                clu: table,
                ..Default::default()
            },
        ),
        hst: place_if(mem, abi, units & HST != 0, VspHst::default()),
        hsi: place_if(mem, abi, units & HSI != 0, VspHsi::default()),
        shp: place_if(
            mem,
            abi,
            units & SHP != 0,
            VspShp {
                mode: 1,
                gain0: 0x100,
                ..Default::default()
            },
        ),
        drc: place_if(
            mem,
            abi,
            units & DRC != 0,
            VspDrc {
                drc: table,
                ..Default::default()
            },
        ),
        ..Default::default()
    };
    if units & BRU != 0 {
        ctrl.bru = blend(mem, abi, shape.blend);
    }
    if units & HGO != 0 {
        let target = mem.map(HGO_SIZE);
        let hgo = VspHgo {
            virt_addr: Addr::from(target),
            width: 640,
            height: 480,
            sampling: ULong(2),
            ..Default::default()
        };
        ctrl.hgo = mem.place(abi, &hgo);
        built.hgo_target = Some(target);
        built.buffers += 1;
    }
    if units & HGT != 0 {
        let target = mem.map(HGT_SIZE);
        let mut hgt = VspHgt {
            virt_addr: Addr::from(target),
            width: 640,
            height: 480,
            ..Default::default()
        };
        for (i, area) in hgt.area.iter_mut().enumerate() {
            *area = HgtArea {
                lower: 40 * i as u8,
                upper: 40 * i as u8 + 39,
            };
        }
        ctrl.hgt = mem.place(abi, &hgt);
        built.hgt_target = Some(target);
        built.buffers += 1;
    }
    mem.place(abi, &ctrl)
}

/// Places a compositor tree of `shape` into `mem`.
///
/// Every structure is smaller than a page, so the same shape produces the
/// same caller addresses for both ABIs.
pub fn compositor_tree(mem: &SimulatedUserSpace, abi: Abi, shape: &Shape) -> Built {
    let mut built = Built::default();
    let mut start = VspStart {
        rpf_num: shape.sources.iter().flatten().count() as u8,
        use_module: ULong(0x7),
        dl_par: VspDl {
            hard_addr: Addr(0x1234_0000),
            virt_addr: Addr(0x5678_0000),
            tbl_num: shape.dl_entries,
        },
        ..Default::default()
    };
    if BufferKind::display_list(shape.dl_entries).is_some() {
        built.buffers += 1;
    }

    for (index, source_shape) in shape.sources.iter().enumerate() {
        if let Some(source_shape) = source_shape {
            start.src_par[index] = source(mem, abi, index, source_shape, &mut built);
        }
    }

    if let Some(fcp) = shape.destination {
        let dst = VspDst {
            addr: Addr(0x7800_0000),
            stride: 2560,
            width: 1280,
            height: 720,
            format: 0x13,
            fcp: place_if(
                mem,
                abi,
                fcp,
                FcpInfo {
                    fcnl: 1,
                    tlen: 1,
                    ba_anc_cur_y: Addr(0x7900_0000),
                    ..Default::default()
                },
            ),
            ..Default::default()
        };
        start.dst_par = mem.place(abi, &dst);
    }

    if let Some(control_shape) = &shape.control {
        start.ctrl_par = control(mem, abi, control_shape, &mut built);
    }

    built.root = mem.place(abi, &start);
    built
}

fn image(base: u64) -> FdpImgbuf {
    FdpImgbuf {
        addr: Addr(base),
        addr_c0: Addr(base + 0x8_0000),
        addr_c1: Addr(base + 0xc_0000),
        stride: 1920,
        stride_c: 960,
    }
}

/// Places a complete de-interlace tree into `mem`.
pub fn deinterlace_tree(mem: &SimulatedUserSpace, abi: Abi, picid: u64) -> UserPtr {
    let refs = FdpRefbuf {
        next_buf: mem.place(abi, &image(0x6000_0000)),
        cur_buf: mem.place(abi, &image(0x6100_0000)),
        prev_buf: mem.place(abi, &image(0x6200_0000)),
    };
    let fproc = FdpFproc {
        seq_par: mem.place(
            abi,
            &FdpSeq {
                seq_mode: 1,
                telecine_mode: 0,
                in_width: 1920,
                in_height: 540,
            },
        ),
        in_pic: mem.place(
            abi,
            &FdpPic {
                picid: ULong(picid),
                chroma_format: 1,
                width: 1920,
                height: 540,
                ..Default::default()
            },
        ),
        current_field: 1,
        out_buf: mem.place(abi, &image(0x6800_0000)),
        ref_buf: mem.place(abi, &refs),
        fcp_par: mem.place(
            abi,
            &FcpInfo {
                fcnl: 1,
                ..Default::default()
            },
        ),
        ..Default::default()
    };
    mem.place(
        abi,
        &FdpStart {
            fdpgo: 1,
            fproc_par: mem.place(abi, &fproc),
        },
    )
}

pub fn pool(granule: u64) -> (Arc<HostCoherentPool>, Arc<dyn CoherentAllocator>) {
    let host = Arc::new(HostCoherentPool::with_granule(POOL_SIZE, granule));
    let pool: Arc<dyn CoherentAllocator> = host.clone();
    (host, pool)
}

/// A session wired to in-process collaborators.
pub struct Harness {
    pub host: Arc<HostCoherentPool>,
    pub engine: Arc<LoopbackEngine>,
    pub mem: Arc<SimulatedUserSpace>,
    pub session: Arc<Session>,
}

impl Harness {
    pub fn new(config: LoopbackConfig) -> Self {
        let host = Arc::new(HostCoherentPool::with_granule(POOL_SIZE, 64));
        let engine = Arc::new(LoopbackEngine::new(config));
        let mem = Arc::new(SimulatedUserSpace::new());
        let context = HardwareContext::new(host.clone(), engine.clone());
        let session = Arc::new(Session::open(context, mem.clone()));
        Self {
            host,
            engine,
            mem,
            session,
        }
    }

    /// A second session on the same collaborators.
    pub fn open(&self) -> Session {
        let context = HardwareContext::new(self.host.clone(), self.engine.clone());
        Session::open(context, self.mem.clone())
    }

    pub fn init_args(&self, abi: Abi, kind: u16, use_ch: u64) -> UserPtr {
        self.mem.place(
            abi,
            &VspmInit {
                use_ch: ULong(use_ch),
                kind,
                ..Default::default()
            },
        )
    }

    pub fn init(&self, abi: Abi, kind: u16) -> Result<InitParams> {
        self.session.init(abi, self.init_args(abi, kind, 0x1))
    }

    pub fn entry_args(&self, abi: Abi, kind: u16, root: UserPtr, priority: u8, user_data: u64) -> UserPtr {
        let job = self.mem.place(abi, &VspmJob { kind, par: root });
        self.mem.place(
            abi,
            &VspmEntry {
                req: EntryReq {
                    priority,
                    job_param: job,
                    user_data: ULong(user_data),
                    cb_func: Addr(0x0804_8000 + user_data),
                },
                ..Default::default()
            },
        )
    }

    pub fn submit(&self, abi: Abi, kind: u16, root: UserPtr, priority: u8, user_data: u64) -> Result<EntryRsp> {
        let arg = self.entry_args(abi, kind, root, priority, user_data);
        self.session.entry(abi, arg)
    }

    pub fn wait(&self, abi: Abi) -> Result<CbRsp> {
        let target = self.mem.map(CbRsp::size(abi));
        self.session.wait_for_completion(abi, target)
    }
}

pub fn source_strategy() -> impl Strategy<Value = SourceShape> {
    (
        prop::option::of(prop_oneof![
            Just(0u16),
            1u16..=CLUT_MAX_ENTRIES,
            Just(CLUT_MAX_ENTRIES + 1)
        ]),
        any::<bool>(),
        prop::option::of(0u8..8),
    )
        .prop_map(|(clut, clut_table, alpha)| SourceShape {
            clut,
            clut_table,
            alpha,
        })
}

pub fn control_strategy() -> impl Strategy<Value = ControlShape> {
    (0u16..=ALL_UNITS, 0u16..(1 << 12)).prop_map(|(units, blend)| ControlShape { units, blend })
}

pub fn shape_strategy() -> impl Strategy<Value = Shape> {
    (
        prop_oneof![
            Just(0u16),
            1u16..=64,
            Just(DL_MAX_ENTRIES),
            Just(DL_MAX_ENTRIES + 1)
        ],
        prop::array::uniform5(prop::option::of(source_strategy())),
        prop::option::of(any::<bool>()),
        prop::option::of(control_strategy()),
    )
        .prop_map(|(dl_entries, sources, destination, control)| Shape {
            dl_entries,
            sources,
            destination,
            control,
        })
}
