// SPDX-License-Identifier: AGPL-3.0-only

//! Configuration errors, liveness failures and cancellation

use snax_driver::descriptor::DeviceDescriptor;
use snax_driver::device::RegisterMap;
use snax_driver::prelude::*;
use snax_driver::scheduler::TileRegions;
use std::time::{Duration, Instant};

#[test]
fn test_stuck_device_times_out_without_hanging() {
    let start = Instant::now();
    let err = SoftwareCluster::snax_default()
        .with_stuck_device(true)
        .run(
            &Dataset::snax_mac_reference(),
            MacMultiply,
            &PipelineConfig::new(4).with_wait(WaitPolicy::polls(2_000)),
        )
        .expect_err("stuck device must not complete");

    assert!(matches!(err, SnaxError::Timeout { polls: 2_000, .. }), "{err}");
    assert!(start.elapsed() < Duration::from_secs(30));
}

#[test]
fn test_deadline_bounds_wait() {
    let err = SoftwareCluster::snax_default()
        .with_stuck_device(true)
        .run_untiled(
            &Dataset::random(16, 3),
            AluOffload::new(AluMode::Add),
            WaitPolicy::unbounded().with_deadline(Duration::from_millis(50)),
        )
        .expect_err("deadline must fire");
    assert!(matches!(err, SnaxError::Timeout { .. }));
}

#[test]
fn test_single_buffering_hazard_rejected() {
    let err = SoftwareCluster::snax_default()
        .run(
            &Dataset::snax_mac_reference(),
            MacMultiply,
            &PipelineConfig::new(4).with_depth(BufferDepth::Single),
        )
        .expect_err("hazard");
    assert!(matches!(err, SnaxError::BufferHazard { .. }));
    assert!(err.is_configuration_error());
}

#[test]
fn test_scratchpad_overflow_rejected() {
    let small = ScratchpadAllocator::with_alignment(0x1000_0000, 1024, 8).expect("allocator");
    let cluster = SoftwareCluster::new(ClusterTopology::snax(), small);
    let err = cluster
        .run_untiled(&Dataset::random(256, 9), MacMultiply, WaitPolicy::default())
        .expect_err("3 KiB of operands in 1 KiB");
    assert!(matches!(
        err,
        SnaxError::ScratchpadOverflow { requested: 3072, capacity: 1024 }
    ));
}

#[test]
fn test_uneven_tiling_rejected() {
    let err = SoftwareCluster::snax_default()
        .run(&Dataset::snax_mac_reference(), MacMultiply, &PipelineConfig::new(6))
        .expect_err("6 does not divide 20");
    assert!(matches!(err, SnaxError::InvalidPlan { .. }));
}

#[test]
fn test_cancelled_run_leaves_every_unit() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = SoftwareCluster::snax_default()
        .with_cancel_token(cancel)
        .run(&Dataset::snax_mac_reference(), MacMultiply, &PipelineConfig::new(4))
        .expect_err("cancelled");
    assert!(matches!(err, SnaxError::Cancelled { iteration: 0 }));
}

#[test]
fn test_timeout_cancels_the_other_units() {
    let cancel = CancelToken::new();
    let start = Instant::now();
    let err = SoftwareCluster::snax_default()
        .with_stuck_device(true)
        .with_cancel_token(cancel.clone())
        .run(
            &Dataset::snax_mac_reference(),
            MacMultiply,
            &PipelineConfig::new(4).with_wait(WaitPolicy::polls(100)),
        )
        .expect_err("timeout");
    assert!(matches!(err, SnaxError::Timeout { .. }));
    assert!(start.elapsed() < Duration::from_secs(30));
    assert!(!cancel.is_cancelled(), "a unit failure must stay inside its run");
}

#[test]
fn test_cluster_runs_again_after_a_failed_run() {
    let cluster = SoftwareCluster::snax_default();
    let dataset = Dataset::snax_mac_reference();

    let err = cluster
        .run(&dataset, MacMultiply, &PipelineConfig::new(4).with_wait(WaitPolicy::polls(1)))
        .expect_err("one poll is shorter than the accelerator latency");
    assert!(matches!(err, SnaxError::Timeout { polls: 1, .. }), "{err}");

    let report = cluster
        .run(&dataset, MacMultiply, &PipelineConfig::new(4))
        .expect("second run");
    assert_eq!(report.output, dataset.golden);

    let untiled = cluster
        .clone()
        .run_untiled(&dataset, MacMultiply, WaitPolicy::default())
        .expect("clone runs too");
    assert!(untiled.verification.passed());
}

#[test]
fn test_external_cancel_stops_every_later_run() {
    let cancel = CancelToken::new();
    let cluster = SoftwareCluster::snax_default().with_cancel_token(cancel.clone());
    let dataset = Dataset::snax_mac_reference();
    cluster
        .run(&dataset, MacMultiply, &PipelineConfig::new(4))
        .expect("not cancelled yet");

    cancel.cancel();
    for _ in 0..2 {
        let err = cluster
            .run(&dataset, MacMultiply, &PipelineConfig::new(4))
            .expect_err("cancelled");
        assert!(matches!(err, SnaxError::Cancelled { iteration: 0 }));
    }
}

/// MAC kernel whose descriptor panics on one tile.
#[derive(Debug)]
struct PanicsOnTile(usize);

impl Offload for PanicsOnTile {
    fn name(&self) -> &'static str {
        "mac-panics"
    }

    fn register_map(&self) -> RegisterMap {
        MacMultiply.register_map()
    }

    fn descriptor(&self, tile: &TileRegions) -> snax_driver::Result<DeviceDescriptor> {
        assert_ne!(tile.index, self.0, "descriptor for tile {} refused", tile.index);
        MacMultiply.descriptor(tile)
    }

    fn reference(&self, a: u32, b: u32) -> u32 {
        MacMultiply.reference(a, b)
    }
}

#[test]
fn test_panicking_kernel_fails_the_run_without_hanging() {
    let start = Instant::now();
    let cluster = SoftwareCluster::snax_default();
    let err = cluster
        .run(&Dataset::snax_mac_reference(), PanicsOnTile(2), &PipelineConfig::new(4))
        .expect_err("panic must surface as an error");
    assert!(matches!(err, SnaxError::DeviceFault { .. }), "{err}");
    assert!(start.elapsed() < Duration::from_secs(30));

    cluster
        .run(&Dataset::snax_mac_reference(), MacMultiply, &PipelineConfig::new(4))
        .expect("cluster still usable");
}
