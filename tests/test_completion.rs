// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod common;

use common::{compositor_tree, pool, Harness, Shape, HGO, HGT};
use edgefirst_vspm::{
    coherent::{BufferKind, ScopedBuffer},
    completion::{CompletionQueue, CompletionRecord},
    loopback::{histogram_pattern, LoopbackConfig},
    Error,
};
use std::{error::Error as StdError, sync::Arc, thread, time::Duration};
use vspm_sys::{
    vspm::{CB_RSP_NONE, HGO_SIZE, HGT_SIZE, JOB_KIND_COMPOSITOR},
    Abi, Addr, Long, ULong,
};

fn record(job_id: u64) -> CompletionRecord {
    CompletionRecord::new(job_id, 0, job_id * 10, Addr(0), Vec::new(), Vec::new())
}

fn histogram_shape() -> Shape {
    let mut shape = Shape::full();
    if let Some(control) = shape.control.as_mut() {
        control.units = HGO | HGT;
    }
    shape
}

#[test]
fn test_completion_order_is_callback_order() -> Result<(), Box<dyn StdError>> {
    let h = Harness::new(LoopbackConfig::default());
    h.init(Abi::Native, JOB_KIND_COMPOSITOR)?;

    let mut ids = Vec::new();
    for user_data in 0..3 {
        let built = compositor_tree(&h.mem, Abi::Native, &Shape::full());
        let rsp = h.submit(Abi::Native, JOB_KIND_COMPOSITOR, built.root, 10, user_data)?;
        assert_eq!(rsp.ercd, Long(0));
        ids.push(rsp.job_id.0);
    }

    for &id in [ids[2], ids[0], ids[1]].iter() {
        assert!(h.engine.complete(id, 0));
    }
    let order: Vec<u64> = (0..3)
        .map(|_| h.wait(Abi::Native).map(|rsp| rsp.job_id.0))
        .collect::<Result<_, _>>()?;
    assert_eq!(order, vec![ids[2], ids[0], ids[1]]);
    assert_eq!(h.host.live_regions(), 0);
    Ok(())
}

#[test]
fn test_completion_carries_request() -> Result<(), Box<dyn StdError>> {
    let h = Harness::new(LoopbackConfig::default());
    h.init(Abi::Native, JOB_KIND_COMPOSITOR)?;
    let built = compositor_tree(&h.mem, Abi::Native, &Shape::default());
    let rsp = h.submit(Abi::Native, JOB_KIND_COMPOSITOR, built.root, 20, 0x55)?;

    h.engine.complete(rsp.job_id.0, -7);
    let done = h.wait(Abi::Native)?;
    assert_eq!(done.ercd, Long(0));
    assert_eq!(done.job_id, rsp.job_id);
    assert_eq!(done.result, Long(-7));
    assert_eq!(done.user_data, ULong(0x55));
    assert_eq!(done.cb_func, Addr(0x0804_8055));
    Ok(())
}

#[test]
fn test_tables_live_until_delivery() -> Result<(), Box<dyn StdError>> {
    let h = Harness::new(LoopbackConfig::default());
    h.init(Abi::Native, JOB_KIND_COMPOSITOR)?;
    let built = compositor_tree(&h.mem, Abi::Native, &histogram_shape());
    h.submit(Abi::Native, JOB_KIND_COMPOSITOR, built.root, 10, 1)?;
    assert_eq!(h.host.live_regions(), built.buffers);

    h.engine.complete_next(0);
    // the record now owns the tables and histogram outputs
    assert_eq!(h.session.queue().len(), 1);
    assert_eq!(h.host.live_regions(), built.buffers);

    h.wait(Abi::Native)?;
    assert_eq!(h.host.live_regions(), 0);
    Ok(())
}

#[test]
fn test_histograms_are_delivered() -> Result<(), Box<dyn StdError>> {
    let h = Harness::new(LoopbackConfig::default());
    h.init(Abi::Native, JOB_KIND_COMPOSITOR)?;
    let built = compositor_tree(&h.mem, Abi::Native, &histogram_shape());
    let rsp = h.submit(Abi::Native, JOB_KIND_COMPOSITOR, built.root, 10, 1)?;

    h.engine.complete_next(0);
    h.wait(Abi::Native)?;

    let id = rsp.job_id.0 as u8;
    for (target, len) in [(built.hgo_target, HGO_SIZE), (built.hgt_target, HGT_SIZE)] {
        let target = target.ok_or("histogram target missing")?;
        let expected: Vec<u8> = (0..len).map(|i| id.wrapping_add(i as u8)).collect();
        assert_eq!(h.mem.read_bytes(target, len)?, expected);
    }
    Ok(())
}

#[test]
fn test_histogram_pattern_uses_low_id_byte() -> Result<(), Box<dyn StdError>> {
    let (_, pool) = pool(64);
    let buffer = ScopedBuffer::allocate(&pool, BufferKind::ToneHistogram)?;
    let pattern = histogram_pattern(0x1_0000_01fe, &buffer);
    assert_eq!(pattern.len(), HGT_SIZE);
    assert_eq!(&pattern[..4], &[0xfe, 0xff, 0x00, 0x01]);
    Ok(())
}

#[test]
fn test_histogram_copy_failure_still_completes() -> Result<(), Box<dyn StdError>> {
    let h = Harness::new(LoopbackConfig::default());
    h.init(Abi::Native, JOB_KIND_COMPOSITOR)?;
    let built = compositor_tree(&h.mem, Abi::Native, &histogram_shape());
    let rsp = h.submit(Abi::Native, JOB_KIND_COMPOSITOR, built.root, 10, 9)?;

    let hgo_target = built.hgo_target.ok_or("hgo target missing")?;
    assert!(h.mem.unmap(hgo_target));
    h.engine.complete_next(0);

    let done = h.wait(Abi::Native)?;
    assert_eq!(done.ercd, Long(0));
    assert_eq!(done.job_id, rsp.job_id);
    assert_eq!(done.user_data, ULong(9));
    assert_eq!(h.host.live_regions(), 0);

    // the other histogram was still delivered
    let hgt_target = built.hgt_target.ok_or("hgt target missing")?;
    assert!(h.mem.read_bytes(hgt_target, HGT_SIZE)?.iter().any(|&b| b != 0));
    Ok(())
}

#[test]
fn test_stop_discards_and_releases_waiter() -> Result<(), Box<dyn StdError>> {
    let h = Harness::new(LoopbackConfig::default());
    h.init(Abi::Native, JOB_KIND_COMPOSITOR)?;
    for user_data in 0..2 {
        let built = compositor_tree(&h.mem, Abi::Native, &Shape::full());
        h.submit(Abi::Native, JOB_KIND_COMPOSITOR, built.root, 10, user_data)?;
    }
    h.engine.complete_next(0);
    h.engine.complete_next(0);
    assert_eq!(h.session.queue().len(), 2);

    h.session.stop_waiting()?;
    assert!(h.session.queue().is_empty());
    assert_eq!(h.host.live_regions(), 0);

    let rsp = h.wait(Abi::Native)?;
    assert_eq!(rsp.ercd, Long(CB_RSP_NONE));
    assert_eq!(rsp.job_id, ULong(0));
    Ok(())
}

#[test]
fn test_stop_wakes_blocked_waiter() -> Result<(), Box<dyn StdError>> {
    let h = Harness::new(LoopbackConfig::default());
    h.init(Abi::Native, JOB_KIND_COMPOSITOR)?;

    let session = Arc::clone(&h.session);
    let target = h.mem.map(64);
    let waiter = thread::spawn(move || session.wait_for_completion(Abi::Native, target));

    h.session.register_waiter()?;
    assert!(h.session.queue().has_waiter());
    h.session.stop_waiting()?;

    let rsp = waiter.join().map_err(|_| "waiter panicked")??;
    assert_eq!(rsp.ercd, Long(CB_RSP_NONE));
    Ok(())
}

#[test]
fn test_waiter_receives_worker_completions() -> Result<(), Box<dyn StdError>> {
    let h = Harness::new(LoopbackConfig {
        workers: 2,
        latency: Duration::from_millis(1),
        ..Default::default()
    });
    h.init(Abi::Native, JOB_KIND_COMPOSITOR)?;

    let session = Arc::clone(&h.session);
    let target = h.mem.map(64);
    let waiter = thread::spawn(move || {
        let mut ids = Vec::new();
        loop {
            match session.wait_for_completion(Abi::Native, target) {
                Ok(rsp) if rsp.ercd.0 == CB_RSP_NONE => return Ok(ids),
                Ok(rsp) => ids.push(rsp.job_id.0),
                Err(err) => return Err(err),
            }
        }
    });
    h.session.register_waiter()?;

    let mut submitted = Vec::new();
    for user_data in 0..6 {
        let built = compositor_tree(&h.mem, Abi::Native, &Shape::full());
        let rsp = h.submit(Abi::Native, JOB_KIND_COMPOSITOR, built.root, 10, user_data)?;
        submitted.push(rsp.job_id.0);
    }
    while h.engine.completed() < 6 {
        thread::sleep(Duration::from_millis(1));
    }
    while !h.session.queue().is_empty() {
        thread::sleep(Duration::from_millis(1));
    }
    // the last record may still be in delivery
    h.session.register_waiter()?;
    h.session.stop_waiting()?;

    let mut received = waiter.join().map_err(|_| "waiter panicked")??;
    received.sort_unstable();
    assert_eq!(received, submitted);
    assert_eq!(h.host.live_regions(), 0);
    Ok(())
}

#[test]
fn test_interrupted_wait() -> Result<(), Box<dyn StdError>> {
    let h = Harness::new(LoopbackConfig::default());
    h.init(Abi::Native, JOB_KIND_COMPOSITOR)?;

    let session = Arc::clone(&h.session);
    let target = h.mem.map(64);
    let waiter = thread::spawn(move || session.wait_for_completion(Abi::Native, target));
    h.session.register_waiter()?;
    h.session.interrupt();

    let result = waiter.join().map_err(|_| "waiter panicked")?;
    assert_eq!(result, Err(Error::Interrupted));
    assert!(!h.session.queue().has_waiter());
    Ok(())
}

#[test]
fn test_interrupted_register() -> Result<(), Box<dyn StdError>> {
    let queue = Arc::new(CompletionQueue::new());
    let registrant = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.register_waiter())
    };
    // no waiter ever parks, so only the interrupt releases the registrant
    while !registrant.is_finished() {
        queue.interrupt();
        thread::sleep(Duration::from_millis(1));
    }
    let result = registrant.join().map_err(|_| "registrant panicked")?;
    assert_eq!(result, Err(Error::Interrupted));

    // the interrupt is consumed
    queue.push(record(1));
    assert_eq!(queue.wait().map(|r| r.map(|r| r.job_id())), Ok(Some(1)));
    Ok(())
}

#[test]
fn test_queued_record_wins_over_interrupt() {
    let queue = CompletionQueue::new();
    queue.push(record(1));
    queue.interrupt();
    assert_eq!(queue.wait().map(|r| r.map(|r| r.job_id())), Ok(Some(1)));
}

#[test]
fn test_interrupt_without_waiter_is_ignored() -> Result<(), Box<dyn StdError>> {
    let queue = Arc::new(CompletionQueue::new());
    queue.interrupt();
    queue.push(record(2));
    assert_eq!(queue.wait().map(|r| r.map(|r| r.job_id())), Ok(Some(2)));

    // a later blocking wait is not aborted either
    queue.interrupt();
    let waiter = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.wait().map(|r| r.map(|r| r.job_id())))
    };
    queue.register_waiter()?;
    queue.push(record(3));
    let delivered = waiter.join().map_err(|_| "waiter panicked")?;
    assert_eq!(delivered, Ok(Some(3)));
    Ok(())
}

#[test]
fn test_interrupted_wait_leaves_no_signal() -> Result<(), Box<dyn StdError>> {
    let queue = Arc::new(CompletionQueue::new());
    let waiter = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.wait().map(|r| r.map(|r| r.job_id())))
    };
    queue.register_waiter()?;
    queue.interrupt();
    let interrupted = waiter.join().map_err(|_| "waiter panicked")?;
    assert_eq!(interrupted, Err(Error::Interrupted));

    queue.push(record(4));
    assert_eq!(queue.wait().map(|r| r.map(|r| r.job_id())), Ok(Some(4)));
    Ok(())
}

#[test]
fn test_superseded_waiter_returns_empty() -> Result<(), Box<dyn StdError>> {
    let queue = Arc::new(CompletionQueue::new());

    let first = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.wait().map(|r| r.map(|r| r.job_id())))
    };
    queue.register_waiter()?;

    let second = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.wait().map(|r| r.map(|r| r.job_id())))
    };
    let superseded = first.join().map_err(|_| "waiter panicked")?;
    assert_eq!(superseded, Ok(None));

    queue.register_waiter()?;
    queue.push(record(42));
    let delivered = second.join().map_err(|_| "waiter panicked")?;
    assert_eq!(delivered, Ok(Some(42)));
    Ok(())
}

#[test]
fn test_queue_fifo_and_counting() {
    let queue = CompletionQueue::new();
    for id in 1..=3 {
        queue.push(record(id));
    }
    assert_eq!(queue.len(), 3);

    let ids: Vec<u64> = (0..3)
        .filter_map(|_| queue.wait().ok().flatten())
        .map(|r| r.job_id())
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(queue.is_empty());
}

#[test]
fn test_record_response() {
    let record = CompletionRecord::new(7, -3, 99, Addr(0x4000), Vec::new(), Vec::new());
    let rsp = record.response();
    assert_eq!(rsp.ercd, Long(0));
    assert_eq!(rsp.job_id, ULong(7));
    assert_eq!(rsp.result, Long(-3));
    assert_eq!(rsp.user_data, ULong(99));
    assert_eq!(rsp.cb_func, Addr(0x4000));
}
