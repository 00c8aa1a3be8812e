// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use super::TreeCopier;
use crate::error::Result;
use vspm_sys::{
    fdp::{FdpFproc, FdpImgbuf, FdpPic, FdpRefbuf, FdpSeq, FdpStart},
    vspm::FcpInfo,
    UserPtr,
};

/// De-interlace job as owned by the interface. Owns no coherent buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeinterlaceJob {
    pub start: FdpStart,
    pub fproc: Option<FprocNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FprocNode {
    pub fproc: FdpFproc,
    pub seq: Option<FdpSeq>,
    pub in_pic: Option<FdpPic>,
    pub out_buf: Option<FdpImgbuf>,
    pub ref_buf: Option<RefNode>,
    pub fcp: Option<FcpInfo>,
}

/// Reference fields; each one independently optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefNode {
    pub refs: FdpRefbuf,
    pub next: Option<FdpImgbuf>,
    pub cur: Option<FdpImgbuf>,
    pub prev: Option<FdpImgbuf>,
}

impl TreeCopier<'_> {
    pub(super) fn deinterlace(&self, root: UserPtr) -> Result<DeinterlaceJob> {
        let mut start: FdpStart = self.read(root)?;
        let fproc = self.follow_with(&mut start.fproc_par, Self::fproc)?;
        Ok(DeinterlaceJob { start, fproc })
    }

    fn fproc(&self, mut fproc: FdpFproc) -> Result<FprocNode> {
        let seq = self.follow(&mut fproc.seq_par)?;
        let in_pic = self.follow(&mut fproc.in_pic)?;
        let out_buf = self.follow(&mut fproc.out_buf)?;
        let ref_buf = self.follow_with(&mut fproc.ref_buf, Self::refs)?;
        let fcp = self.follow(&mut fproc.fcp_par)?;
        Ok(FprocNode {
            fproc,
            seq,
            in_pic,
            out_buf,
            ref_buf,
            fcp,
        })
    }

    fn refs(&self, mut refs: FdpRefbuf) -> Result<RefNode> {
        let next = self.follow(&mut refs.next_buf)?;
        let cur = self.follow(&mut refs.cur_buf)?;
        let prev = self.follow(&mut refs.prev_buf)?;
        Ok(RefNode {
            refs,
            next,
            cur,
            prev,
        })
    }
}
