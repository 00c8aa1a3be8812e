// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use args::{Args, Kind};
use clap::Parser;
use edgefirst_vspm::{
    coherent::HostCoherentPool,
    loopback::LoopbackEngine,
    session::{Command, Session},
    user::SimulatedUserSpace,
    HardwareContext,
};
use std::{
    error::Error,
    sync::{mpsc, Arc},
    thread,
    time::Instant,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, Layer};
use vspm_sys::{
    fdp::{FdpFproc, FdpImgbuf, FdpInit, FdpPic, FdpRefbuf, FdpSeq, FdpStart, FdpStatus},
    vsp::{
        VspAlphaUnit, VspBldCtrl, VspBldVir, VspBru, VspCkeyUnit, VspCtrl, VspDl, VspDst, VspHgo,
        VspHgt, VspSrc, VspStart, VspUds, SRC_COUNT,
    },
    vspm::{
        CbRsp, EntryReq, FcpInfo, VspmEntry, VspmInit, VspmJob, VspmStatus, CB_RSP_NONE,
        HGO_SIZE, HGT_SIZE, TABLE_ENTRY_SIZE,
    },
    Abi, Addr, Layout, ULong, UserPtr,
};

mod args;

/// Caller-side view of one submitted job.
struct Submission {
    root: UserPtr,
    histograms: Vec<(UserPtr, usize)>,
}

fn init_tracing(args: &Args) -> Result<(), Box<dyn Error>> {
    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let stdout = tracing_subscriber::fmt::layer().with_filter(level);
    let journald = if args.journald {
        Some(tracing_journald::layer()?.with_filter(level))
    } else {
        None
    };
    let tracy = if args.tracy {
        tracy_client::Client::start();
        Some(tracing_tracy::TracyLayer::default().with_filter(level))
    } else {
        None
    };

    let subscriber = tracing_subscriber::registry()
        .with(stdout)
        .with(journald)
        .with(tracy);
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}

fn compositor_tree(mem: &SimulatedUserSpace, abi: Abi, args: &Args, index: u32) -> Submission {
    let mut start = VspStart {
        rpf_num: args.sources.min(SRC_COUNT) as u8,
        use_module: ULong(0x1),
        dl_par: VspDl {
            tbl_num: args.dl_entries,
            ..Default::default()
        },
        ..Default::default()
    };

    for (i, slot) in start.src_par.iter_mut().take(args.sources).enumerate() {
        let table: Vec<u8> = (0..usize::from(args.clut_entries) * TABLE_ENTRY_SIZE)
            .map(|b| (b + i) as u8)
            .collect();
        let clut = VspDl {
            virt_addr: Addr::from(mem.place_bytes(&table)),
            tbl_num: args.clut_entries,
            ..Default::default()
        };
        let ckey = VspCkeyUnit {
            mode: 1,
            color1: ULong(0x00ff_00ff),
            color2: ULong(0x0000_00ff),
        };
        let alpha = VspAlphaUnit {
            asel: 1,
            afix: 0xff,
            ckey: mem.place(abi, &ckey),
            ..Default::default()
        };
        let src = VspSrc {
            addr: Addr(0x7000_0000 + u64::from(index) * 0x10_0000),
            stride: 1920 * 4,
            width: 1920,
            height: 1080,
            format: 0x13,
            clut: mem.place(abi, &clut),
            alpha: mem.place(abi, &alpha),
            connect: ULong(0x1),
            ..Default::default()
        };
        *slot = mem.place(abi, &src);
    }

    let fcp = FcpInfo {
        fcnl: 1,
        tlen: 2,
        ..Default::default()
    };
    let dst = VspDst {
        addr: Addr(0x7800_0000),
        stride: 1280 * 4,
        width: 1280,
        height: 720,
        format: 0x13,
        fcp: mem.place(abi, &fcp),
        ..Default::default()
    };
    start.dst_par = mem.place(abi, &dst);

    let mut bru = VspBru {
        lay_order: ULong(0x1234),
        blend_virtual: mem.place(
            abi,
            &VspBldVir {
                width: 1280,
                height: 720,
                ..Default::default()
            },
        ),
        ..Default::default()
    };
    bru.blend_unit[0] = mem.place(
        abi,
        &VspBldCtrl {
            blend_formula: 1,
            ..Default::default()
        },
    );
    let mut ctrl = VspCtrl {
        uds: mem.place(
            abi,
            &VspUds {
                x_ratio: 0x1800,
                y_ratio: 0x1800,
                ..Default::default()
            },
        ),
        bru: mem.place(abi, &bru),
        ..Default::default()
    };

    let mut histograms = Vec::new();
    if args.histogram {
        let hgo_target = mem.map(HGO_SIZE);
        let hgt_target = mem.map(HGT_SIZE);
        let hgo = VspHgo {
            virt_addr: Addr::from(hgo_target),
            width: 1280,
            height: 720,
            ..Default::default()
        };
        let hgt = VspHgt {
            virt_addr: Addr::from(hgt_target),
            width: 1280,
            height: 720,
            ..Default::default()
        };
        ctrl.hgo = mem.place(abi, &hgo);
        ctrl.hgt = mem.place(abi, &hgt);
        histograms.push((hgo_target, HGO_SIZE));
        histograms.push((hgt_target, HGT_SIZE));
    }
    start.ctrl_par = mem.place(abi, &ctrl);

    Submission {
        root: mem.place(abi, &start),
        histograms,
    }
}

fn deinterlace_tree(mem: &SimulatedUserSpace, abi: Abi, index: u32) -> Submission {
    let field = |base: u64| FdpImgbuf {
        addr: Addr(base),
        addr_c0: Addr(base + 0x8_0000),
        stride: 1920,
        stride_c: 1920,
        ..Default::default()
    };
    let refs = FdpRefbuf {
        next_buf: mem.place(abi, &field(0x6000_0000)),
        cur_buf: mem.place(abi, &field(0x6100_0000)),
        prev_buf: mem.place(abi, &field(0x6200_0000)),
    };
    let fproc = FdpFproc {
        seq_par: mem.place(
            abi,
            &FdpSeq {
                seq_mode: 1,
                in_width: 1920,
                in_height: 540,
                ..Default::default()
            },
        ),
        in_pic: mem.place(
            abi,
            &FdpPic {
                picid: ULong(u64::from(index)),
                width: 1920,
                height: 540,
                ..Default::default()
            },
        ),
        current_field: (index % 2) as u8,
        out_buf: mem.place(abi, &field(0x6800_0000)),
        ref_buf: mem.place(abi, &refs),
        ..Default::default()
    };
    let start = FdpStart {
        fdpgo: 1,
        fproc_par: mem.place(abi, &fproc),
    };
    Submission {
        root: mem.place(abi, &start),
        histograms: Vec::new(),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(&args)?;

    let abi = args.abi();
    info!(
        "VSPM interface demo: {} {:?} jobs ({})",
        args.jobs, args.kind, abi
    );

    let pool = Arc::new(HostCoherentPool::with_granule(
        args.pool_size,
        args.pool_granule,
    ));
    let engine = Arc::new(LoopbackEngine::new(args.loopback_config()));
    let mem = Arc::new(SimulatedUserSpace::new());
    let context = HardwareContext::new(pool.clone(), engine.clone());
    let session = Arc::new(Session::open(context, mem.clone()));

    let ioctl = |cmd: Command, arg: UserPtr| match abi {
        Abi::Native => session.ioctl(cmd, arg),
        Abi::Compat => session.compat_ioctl(cmd, arg),
    };

    let init = VspmInit {
        use_ch: ULong(0x1),
        kind: args.kind.raw(),
        par: match args.kind {
            Kind::Deinterlace => mem.place(abi, &FdpInit::default()),
            Kind::Compositor => UserPtr::NULL,
        },
        ..Default::default()
    };
    ioctl(Command::Init, mem.place(abi, &init))?;

    let (tx, rx) = mpsc::channel();
    let waiter = {
        let session = session.clone();
        let rsp_ptr = mem.map(CbRsp::size(abi));
        thread::spawn(move || loop {
            match session.wait_for_completion(abi, rsp_ptr) {
                Ok(rsp) if rsp.ercd.0 == CB_RSP_NONE => return,
                Ok(rsp) => {
                    if tx.send(rsp).is_err() {
                        return;
                    }
                }
                Err(err) => {
                    warn!("waiter: {}", err);
                    return;
                }
            }
        })
    };
    ioctl(Command::RegisterWaiter, UserPtr::NULL)?;
    debug!("waiter registered");

    let started = Instant::now();
    let mut submitted = Vec::new();
    for index in 0..args.jobs {
        let tree = match args.kind {
            Kind::Compositor => compositor_tree(&mem, abi, &args, index),
            Kind::Deinterlace => deinterlace_tree(&mem, abi, index),
        };
        let job = VspmJob {
            kind: args.kind.raw(),
            par: tree.root,
        };
        let entry = VspmEntry {
            req: EntryReq {
                priority: 1 + (index % 4) as u8,
                job_param: mem.place(abi, &job),
                user_data: ULong(u64::from(index)),
                ..Default::default()
            },
            ..Default::default()
        };
        let arg = mem.place(abi, &entry);
        ioctl(Command::Entry, arg)?;

        let rsp = mem.read_back::<VspmEntry>(abi, arg)?.rsp;
        if rsp.ercd.0 == 0 {
            debug!("job {} submitted as {}", index, rsp.job_id.0);
            submitted.push(tree);
        } else {
            warn!("job {} rejected with {}", index, rsp.ercd.0);
        }
    }

    for _ in 0..submitted.len() {
        let rsp = rx.recv()?;
        info!(
            "job {} (user data {}) completed with {}",
            rsp.job_id.0, rsp.user_data.0, rsp.result.0
        );
    }
    info!(
        "{} jobs completed in {:?}",
        submitted.len(),
        started.elapsed()
    );

    for tree in &submitted {
        for &(target, len) in &tree.histograms {
            let bytes = mem.read_bytes(target, len)?;
            debug!("histogram at {} starts {:02x?}", target, &bytes[..8]);
        }
    }

    ioctl(Command::StopWaiting, UserPtr::NULL)?;
    if waiter.join().is_err() {
        warn!("waiter thread panicked");
    }

    if args.kind == Kind::Deinterlace {
        let target = mem.map(FdpStatus::size(abi));
        ioctl(
            Command::GetStatus,
            mem.place(abi, &VspmStatus { fdp: target }),
        )?;
        let status = mem.read_back::<FdpStatus>(abi, target)?;
        info!(
            "de-interlacer picid {} after {} fields",
            status.picid.0, status.vcycle
        );
    }

    ioctl(Command::Quit, UserPtr::NULL)?;
    session.close()?;
    info!(
        "coherent pool: {} regions, {} bytes still allocated",
        pool.live_regions(),
        pool.live_bytes()
    );
    Ok(())
}
