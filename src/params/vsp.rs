// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use super::TreeCopier;
use crate::{
    coherent::{BufferKind, ScopedBuffer},
    completion::HistogramOutput,
    error::Result,
};
use tracing::error;
use vspm_sys::{
    vsp::{
        VspAlphaUnit, VspBldCtrl, VspBldDither, VspBldRop, VspBldVir, VspBru, VspCkeyUnit, VspClu,
        VspCtrl, VspDl, VspDrc, VspDst, VspHgo, VspHgt, VspHsi, VspHst, VspIropUnit, VspLut,
        VspMultUnit, VspShp, VspSrc, VspSru, VspStart, VspUds, BLEND_LAYERS, SRC_COUNT,
    },
    vspm::FcpInfo,
    Addr, Layout, UserPtr,
};

/// Compositor job as owned by the interface.
#[derive(Debug, PartialEq)]
pub struct CompositorJob {
    /// Root parameters. `dl_par` points at [`CompositorJob::display_list`],
    /// or is cleared when no display list was allocated.
    pub start: VspStart,
    pub display_list: Option<ScopedBuffer>,
    pub sources: [Option<SourceNode>; SRC_COUNT],
    pub destination: Option<DestinationNode>,
    pub control: Option<ControlNode>,
}

#[derive(Debug, PartialEq)]
pub struct SourceNode {
    pub src: VspSrc,
    pub clut: Option<ClutNode>,
    pub alpha: Option<AlphaNode>,
}

/// Source color lookup table.
///
/// When the caller asked for 1 to 256 entries and supplied a table, `table`
/// holds a copy of it and `clut` points there.
#[derive(Debug, PartialEq)]
pub struct ClutNode {
    pub clut: VspDl,
    pub table: Option<ScopedBuffer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlphaNode {
    pub alpha: VspAlphaUnit,
    pub irop: Option<VspIropUnit>,
    pub ckey: Option<VspCkeyUnit>,
    pub mult: Option<VspMultUnit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestinationNode {
    pub dst: VspDst,
    pub fcp: Option<FcpInfo>,
}

#[derive(Debug, PartialEq)]
pub struct ControlNode {
    pub ctrl: VspCtrl,
    pub sru: Option<VspSru>,
    pub uds: Option<VspUds>,
    pub lut: Option<VspLut>,
    pub clu: Option<VspClu>,
    pub hst: Option<VspHst>,
    pub hsi: Option<VspHsi>,
    pub bru: Option<BlendNode>,
    pub hgo: Option<HistogramNode<VspHgo>>,
    pub hgt: Option<HistogramNode<VspHgt>>,
    pub shp: Option<VspShp>,
    pub drc: Option<VspDrc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendNode {
    pub bru: VspBru,
    pub dither: [Option<VspBldDither>; BLEND_LAYERS],
    pub virtual_canvas: Option<VspBldVir>,
    pub blend: [Option<VspBldCtrl>; BLEND_LAYERS],
    pub rop: Option<VspBldRop>,
}

/// Histogram generator with its output buffer.
///
/// Both addresses in `params` point at `output`; `user_target` is where the
/// result is delivered once the job completes (null for no delivery).
#[derive(Debug, PartialEq)]
pub struct HistogramNode<T> {
    pub params: T,
    pub output: ScopedBuffer,
    pub user_target: UserPtr,
}

/// Parameters of a histogram unit whose output the interface provides.
pub trait HistogramParams: Layout {
    const KIND: BufferKind;

    /// `(hard_addr, virt_addr)`.
    fn output_addresses(&mut self) -> (&mut Addr, &mut Addr);
}

impl HistogramParams for VspHgo {
    const KIND: BufferKind = BufferKind::Histogram;

    fn output_addresses(&mut self) -> (&mut Addr, &mut Addr) {
        (&mut self.hard_addr, &mut self.virt_addr)
    }
}

impl HistogramParams for VspHgt {
    const KIND: BufferKind = BufferKind::ToneHistogram;

    fn output_addresses(&mut self) -> (&mut Addr, &mut Addr) {
        (&mut self.hard_addr, &mut self.virt_addr)
    }
}

fn point_at(table: &mut VspDl, buffer: Option<&ScopedBuffer>) {
    match buffer {
        Some(buffer) => {
            table.hard_addr = buffer.device();
            table.virt_addr = buffer.kernel();
        }
        None => {
            table.hard_addr = Addr::NULL;
            table.virt_addr = Addr::NULL;
        }
    }
}

impl CompositorJob {
    /// Every coherent buffer owned by the job.
    pub fn buffers(&self) -> Vec<&ScopedBuffer> {
        let mut out: Vec<&ScopedBuffer> = self.display_list.iter().collect();
        for source in self.sources.iter().flatten() {
            out.extend(source.clut.as_ref().and_then(|c| c.table.as_ref()));
        }
        if let Some(control) = &self.control {
            out.extend(control.hgo.as_ref().map(|h| &h.output));
            out.extend(control.hgt.as_ref().map(|h| &h.output));
        }
        out
    }

    /// Histogram outputs, HGO first.
    pub fn histograms(&self) -> Vec<&ScopedBuffer> {
        self.control
            .iter()
            .flat_map(|c| {
                let hgo = c.hgo.as_ref().map(|h| &h.output);
                let hgt = c.hgt.as_ref().map(|h| &h.output);
                hgo.into_iter().chain(hgt)
            })
            .collect()
    }

    /// Splits off the buffers that outlive the job: tables to be released
    /// with the completion record, and histograms to be delivered first.
    pub(crate) fn into_outputs(self) -> (Vec<ScopedBuffer>, Vec<HistogramOutput>) {
        let mut tables: Vec<ScopedBuffer> = self.display_list.into_iter().collect();
        for source in self.sources.into_iter().flatten() {
            tables.extend(source.clut.and_then(|c| c.table));
        }

        let mut histograms = Vec::new();
        if let Some(control) = self.control {
            if let Some(hgo) = control.hgo {
                histograms.push(HistogramOutput::new(hgo.output, hgo.user_target));
            }
            if let Some(hgt) = control.hgt {
                histograms.push(HistogramOutput::new(hgt.output, hgt.user_target));
            }
        }
        (tables, histograms)
    }
}

impl TreeCopier<'_> {
    pub(super) fn compositor(&self, root: UserPtr) -> Result<CompositorJob> {
        let mut start: VspStart = self.read(root)?;

        let display_list = match BufferKind::display_list(start.dl_par.tbl_num) {
            Some(kind) => Some(self.allocate(kind)?),
            None => None,
        };
        point_at(&mut start.dl_par, display_list.as_ref());

        let mut sources: [Option<SourceNode>; SRC_COUNT] = Default::default();
        for (slot, link) in sources.iter_mut().zip(start.src_par.iter_mut()) {
            *slot = self.follow_with(link, Self::source)?;
        }
        let destination = self.follow_with(&mut start.dst_par, Self::destination)?;
        let control = self.follow_with(&mut start.ctrl_par, Self::control)?;

        Ok(CompositorJob {
            start,
            display_list,
            sources,
            destination,
            control,
        })
    }

    fn source(&self, mut src: VspSrc) -> Result<SourceNode> {
        let clut = self.follow_with(&mut src.clut, Self::clut)?;
        let alpha = self.follow_with(&mut src.alpha, Self::alpha)?;
        Ok(SourceNode { src, clut, alpha })
    }

    fn clut(&self, mut clut: VspDl) -> Result<ClutNode> {
        let table = match BufferKind::color_table(clut.tbl_num) {
            Some(kind) if !clut.virt_addr.is_null() => {
                let buffer = self.allocate(kind)?;
                let mut bytes = vec![0; buffer.len()];
                self.mem
                    .copy_from_user(&mut bytes, clut.virt_addr.into())
                    .map_err(|err| {
                        error!("failed to copy color table from {}", clut.virt_addr);
                        err
                    })?;
                buffer.write(&bytes)?;
                Some(buffer)
            }
            _ => None,
        };
        point_at(&mut clut, table.as_ref());
        Ok(ClutNode { clut, table })
    }

    fn alpha(&self, mut alpha: VspAlphaUnit) -> Result<AlphaNode> {
        let irop = self.follow(&mut alpha.irop)?;
        let ckey = self.follow(&mut alpha.ckey)?;
        let mult = self.follow(&mut alpha.mult)?;
        Ok(AlphaNode {
            alpha,
            irop,
            ckey,
            mult,
        })
    }

    fn destination(&self, mut dst: VspDst) -> Result<DestinationNode> {
        let fcp = self.follow(&mut dst.fcp)?;
        Ok(DestinationNode { dst, fcp })
    }

    fn control(&self, mut ctrl: VspCtrl) -> Result<ControlNode> {
        let sru = self.follow(&mut ctrl.sru)?;
        let uds = self.follow(&mut ctrl.uds)?;
        let lut = self.follow(&mut ctrl.lut)?;
        let clu = self.follow(&mut ctrl.clu)?;
        let hst = self.follow(&mut ctrl.hst)?;
        let hsi = self.follow(&mut ctrl.hsi)?;
        let bru = self.follow_with(&mut ctrl.bru, Self::blend)?;
        let hgo = self.follow_with(&mut ctrl.hgo, Self::histogram::<VspHgo>)?;
        let hgt = self.follow_with(&mut ctrl.hgt, Self::histogram::<VspHgt>)?;
        let shp = self.follow(&mut ctrl.shp)?;
        let drc = self.follow(&mut ctrl.drc)?;
        Ok(ControlNode {
            ctrl,
            sru,
            uds,
            lut,
            clu,
            hst,
            hsi,
            bru,
            hgo,
            hgt,
            shp,
            drc,
        })
    }

    fn blend(&self, mut bru: VspBru) -> Result<BlendNode> {
        let mut dither = [None; BLEND_LAYERS];
        for (slot, link) in dither.iter_mut().zip(bru.dither_unit.iter_mut()) {
            *slot = self.follow(link)?;
        }
        let virtual_canvas = self.follow(&mut bru.blend_virtual)?;
        let mut blend = [None; BLEND_LAYERS];
        for (slot, link) in blend.iter_mut().zip(bru.blend_unit.iter_mut()) {
            *slot = self.follow(link)?;
        }
        let rop = self.follow(&mut bru.rop_unit)?;
        Ok(BlendNode {
            bru,
            dither,
            virtual_canvas,
            blend,
            rop,
        })
    }

    fn histogram<T: HistogramParams>(&self, mut params: T) -> Result<HistogramNode<T>> {
        let output = self.allocate(T::KIND)?;
        let (hard_addr, virt_addr) = params.output_addresses();
        let user_target = UserPtr::from(*virt_addr);
        *hard_addr = output.device();
        *virt_addr = output.kernel();
        Ok(HistogramNode {
            params,
            output,
            user_target,
        })
    }
}
