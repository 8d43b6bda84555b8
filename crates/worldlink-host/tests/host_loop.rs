//! Integration tests for the host update thread.
//!
//! Every test spawns a real `host-update` thread around a `MemoryWorld`
//! and talks to it only through `HostHandle`, the same way the network
//! side does.

use std::time::Duration;

use worldlink_host::{
    HOST_THREAD_NAME, HostConfig, HostError, HostHandle, HostLoop, HostThread, MemoryWorld,
    StructureBuilder, StructureRequest, WorldProbe,
};

// =========================================================================
// Helpers
// =========================================================================

fn fast_config() -> HostConfig {
    HostConfig {
        tick_rate_hz: 200,
        ..HostConfig::default()
    }
}

fn spawn(world: MemoryWorld, config: HostConfig) -> (HostHandle, HostThread, WorldProbe) {
    let probe = world.probe();
    let (handle, thread) = HostLoop::spawn(world, config).expect("spawn host loop");
    (handle, thread, probe)
}

fn request(size: i64) -> StructureRequest {
    StructureRequest {
        world: "world".into(),
        size,
        center: Some((0, 0)),
        clear: false,
    }
}

/// Number of writes the builder plans for a request, computed off-thread.
fn planned_writes(size: i64, clear: bool) -> usize {
    let b = StructureBuilder::new(100);
    let spec = b.centered("world", 0, 0, size).unwrap();
    b.plan(&spec, clear).writes.len()
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

async fn stop(handle: HostHandle, thread: HostThread) {
    handle.shutdown().await.unwrap();
    tokio::task::spawn_blocking(move || thread.join())
        .await
        .unwrap()
        .unwrap();
}

// =========================================================================
// Structure builds
// =========================================================================

#[tokio::test]
async fn test_build_reports_centroid_and_writes_on_host_thread_only() {
    let (handle, thread, probe) = spawn(MemoryWorld::new(), fast_config());

    let report = handle.build_structure(request(10)).await.unwrap();
    assert_eq!((report.center_x, report.center_y, report.center_z), (0, 101, 0));
    assert_eq!(report.size, 10);

    let expected = planned_writes(10, false);
    wait_until(|| probe.write_count() == expected).await;

    let threads = probe.writer_threads();
    assert_eq!(threads.len(), 1);
    assert!(threads.contains(HOST_THREAD_NAME));

    stop(handle, thread).await;
}

#[tokio::test]
async fn test_invalid_size_is_rejected_without_writes() {
    let (handle, thread, probe) = spawn(MemoryWorld::new(), fast_config());

    for size in [2, 101, 150, -1] {
        let err = handle.build_structure(request(size)).await.unwrap_err();
        assert_eq!(err, HostError::InvalidSize(size));
        assert_eq!(err.to_string(), "Invalid size. Must be between 3 and 100.");
    }

    // Give the loop a few ticks to do anything it might have queued.
    let ticks = probe.ticks();
    wait_until(|| probe.ticks() >= ticks + 3).await;
    assert_eq!(probe.write_count(), 0);

    stop(handle, thread).await;
}

#[tokio::test]
async fn test_unknown_world_fails_fast() {
    let (handle, thread, probe) = spawn(MemoryWorld::new(), fast_config());

    let err = handle
        .build_structure(StructureRequest {
            world: "nether".into(),
            ..request(10)
        })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "World not found: nether");

    let ticks = probe.ticks();
    wait_until(|| probe.ticks() >= ticks + 3).await;
    assert_eq!(probe.write_count(), 0);

    stop(handle, thread).await;
}

#[tokio::test]
async fn test_center_at_coordinate_limit_is_refused_and_loop_survives() {
    let (handle, thread, probe) = spawn(MemoryWorld::new(), fast_config());

    let err = handle
        .build_structure(StructureRequest {
            center: Some((i32::MAX, 0)),
            ..request(10)
        })
        .await
        .unwrap_err();
    assert!(matches!(err, HostError::OutOfBounds { .. }), "{err}");

    // The host thread is still serving requests.
    assert!(handle.is_running());
    handle.build_structure(request(5)).await.unwrap();
    wait_until(|| probe.write_count() == planned_writes(5, false)).await;

    stop(handle, thread).await;
}

#[tokio::test]
async fn test_missing_center_uses_world_spawn() {
    let world = MemoryWorld::new().with_world("market", (50, -20));
    let (handle, thread, _probe) = spawn(world, fast_config());

    let report = handle
        .build_structure(StructureRequest {
            world: "market".into(),
            size: 9,
            center: None,
            clear: false,
        })
        .await
        .unwrap();
    assert_eq!((report.center_x, report.center_z), (50, -20));

    stop(handle, thread).await;
}

#[tokio::test]
async fn test_write_budget_spreads_build_over_ticks() {
    let config = HostConfig {
        max_writes_per_tick: 5,
        ..fast_config()
    };
    let (handle, thread, probe) = spawn(MemoryWorld::new(), config);

    handle.build_structure(request(10)).await.unwrap();
    let expected = planned_writes(10, false);

    wait_until(|| probe.write_count() > 0).await;
    assert!(probe.write_count() < expected, "budget should defer writes");

    wait_until(|| probe.write_count() == expected).await;
    stop(handle, thread).await;
}

#[tokio::test]
async fn test_clear_adds_air_pass() {
    let (handle, thread, probe) = spawn(MemoryWorld::new(), fast_config());

    handle
        .build_structure(StructureRequest {
            clear: true,
            ..request(5)
        })
        .await
        .unwrap();

    let expected = planned_writes(5, true);
    wait_until(|| probe.write_count() == expected).await;

    stop(handle, thread).await;
}

#[tokio::test]
async fn test_shutdown_flushes_pending_writes() {
    let config = HostConfig {
        max_writes_per_tick: 1,
        ..fast_config()
    };
    let (handle, thread, probe) = spawn(MemoryWorld::new(), config);

    handle.build_structure(request(20)).await.unwrap();
    stop(handle.clone(), thread).await;

    assert_eq!(probe.write_count(), planned_writes(20, false));
    assert!(!handle.is_running());
    assert_eq!(handle.info().await.unwrap_err(), HostError::Unavailable);
}

// =========================================================================
// Commands, info, announcements
// =========================================================================

#[tokio::test]
async fn test_execute_command_runs_on_host_thread() {
    let world = MemoryWorld::new().rejecting("fly");
    let (handle, thread, probe) = spawn(world, fast_config());

    assert!(handle.execute_command("say hello").await.unwrap());
    assert!(!handle.execute_command("fly on").await.unwrap());

    assert_eq!(probe.commands(), vec!["say hello", "fly on"]);
    assert!(probe.writer_threads().contains(HOST_THREAD_NAME));

    stop(handle, thread).await;
}

#[tokio::test]
async fn test_info_and_announce() {
    let world = MemoryWorld::new().with_players(4, 40);
    let (handle, thread, probe) = spawn(world, fast_config());

    let info = handle.info().await.unwrap();
    assert_eq!(info.online_players, 4);
    assert_eq!(info.max_players, 40);

    handle.announce("market opens").await.unwrap();
    wait_until(|| probe.announcements() == vec!["market opens".to_string()]).await;

    stop(handle, thread).await;
}

#[tokio::test]
async fn test_loop_stops_when_all_handles_dropped() {
    let (handle, thread, _probe) = spawn(MemoryWorld::new(), fast_config());
    drop(handle);
    wait_until(|| thread.is_finished()).await;
    thread.join().unwrap();
}
