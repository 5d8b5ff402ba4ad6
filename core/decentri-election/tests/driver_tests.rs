mod common;

use common::{candidate, holder, timings};
use decentri_election::transport::mock::MemoryHub;
use decentri_election::{
    run_election, DeviceState, ElectionError, ElectionMachine, ElectionMessage, ElectionOutcome,
    ElectionTransport, HolderResponder,
};
use std::sync::Arc;
use std::time::Duration;

// ── Single device ──

#[tokio::test(start_paused = true)]
async fn without_transport_coordinates_immediately() {
    let mut machine = ElectionMachine::new();
    let outcome = run_election(&mut machine, None, candidate("device-a", 1), &timings())
        .await
        .unwrap();
    assert_eq!(outcome, ElectionOutcome::Coordinator);
    assert_eq!(machine.state(), DeviceState::Coordinator);
    machine.complete().unwrap();
    assert_eq!(machine.state(), DeviceState::Idle);
}

#[tokio::test(start_paused = true)]
async fn alone_on_segment_coordinates_after_discovery() {
    let hub = MemoryHub::new();
    let transport = hub.endpoint();
    let mut machine = ElectionMachine::new();
    let outcome = run_election(&mut machine, Some(&transport), candidate("device-a", 1), &timings())
        .await
        .unwrap();
    assert_eq!(outcome, ElectionOutcome::Coordinator);
    // Discover and Victory
    assert_eq!(transport.sent_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_discover_resolves_as_no_peers() {
    let hub = MemoryHub::new();
    let transport = hub.endpoint();
    transport.fail_next_sends(10);
    let mut machine = ElectionMachine::new();
    let outcome = run_election(&mut machine, Some(&transport), candidate("device-a", 1), &timings())
        .await
        .unwrap();
    assert_eq!(outcome, ElectionOutcome::Coordinator);
    assert_eq!(transport.sent_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn transient_send_failure_is_retried() {
    let hub = MemoryHub::new();
    let transport = hub.endpoint();
    let observer = hub.endpoint();
    transport.fail_next_sends(1);
    let mut machine = ElectionMachine::new();
    run_election(&mut machine, Some(&transport), candidate("device-a", 1), &timings())
        .await
        .unwrap();
    let first = observer.recv().await.unwrap();
    assert!(matches!(first, ElectionMessage::Discover(_)));
}

// ── Contention ──

#[tokio::test(start_paused = true)]
async fn two_devices_elect_one_coordinator() {
    let hub = MemoryHub::new();
    let ta = hub.endpoint();
    let tb = hub.endpoint();
    let mut ma = ElectionMachine::new();
    let mut mb = ElectionMachine::new();
    let t = timings();

    let (a, b) = tokio::join!(
        run_election(&mut ma, Some(&ta), candidate("device-a", 1), &t),
        run_election(&mut mb, Some(&tb), candidate("device-b", 2), &t),
    );

    assert!(matches!(
        a.unwrap(),
        ElectionOutcome::Follower { ref coordinator, .. } if coordinator == "device-b"
    ));
    assert_eq!(b.unwrap(), ElectionOutcome::Coordinator);
}

#[tokio::test(start_paused = true)]
async fn binding_holder_wins_over_greater_device_id() {
    let hub = MemoryHub::new();
    let ta = hub.endpoint();
    let tz = hub.endpoint();
    let mut ma = ElectionMachine::new();
    let mut mz = ElectionMachine::new();
    let t = timings();

    let (a, z) = tokio::join!(
        run_election(&mut ma, Some(&ta), holder("device-a", 1), &t),
        run_election(&mut mz, Some(&tz), candidate("device-z", 2), &t),
    );

    assert_eq!(a.unwrap(), ElectionOutcome::Coordinator);
    assert!(matches!(z.unwrap(), ElectionOutcome::Follower { .. }));
}

#[tokio::test(start_paused = true)]
async fn duplicate_device_abandons_election() {
    let hub = MemoryHub::new();
    let t1 = hub.endpoint();
    let t2 = hub.endpoint();
    let mut m1 = ElectionMachine::new();
    let mut m2 = ElectionMachine::new();
    let t = timings();

    let (r1, r2) = tokio::join!(
        run_election(&mut m1, Some(&t1), candidate("device-a", 1), &t),
        run_election(&mut m2, Some(&t2), candidate("device-a", 2), &t),
    );

    assert!(matches!(r1, Err(ElectionError::Abandoned(_))));
    assert!(matches!(r2, Err(ElectionError::Abandoned(_))));
    assert_eq!(m1.state(), DeviceState::Idle);
    assert_eq!(m2.state(), DeviceState::Idle);
}

#[tokio::test(start_paused = true)]
async fn late_joiner_follows_existing_coordinator() {
    let hub = MemoryHub::new();
    let early = hub.endpoint();
    let mut m_early = ElectionMachine::new();
    let t = timings();

    let outcome = run_election(&mut m_early, Some(&early), candidate("device-z", 1), &t)
        .await
        .unwrap();
    assert_eq!(outcome, ElectionOutcome::Coordinator);

    // The coordinator keeps answering while the late device runs.
    let late = hub.endpoint();
    let mut m_late = ElectionMachine::new();
    let responder = async {
        let msg = early.recv().await.unwrap();
        for reply in m_early.handle(&msg).unwrap() {
            early.broadcast(&reply).await.unwrap();
        }
    };
    let (late_outcome, ()) = tokio::join!(
        run_election(&mut m_late, Some(&late), candidate("device-a", 2), &t),
        responder,
    );
    assert!(matches!(late_outcome.unwrap(), ElectionOutcome::Follower { .. }));
}

// ── Holder responder ──

#[tokio::test(start_paused = true)]
async fn responder_defends_binding_after_election() {
    let hub = MemoryHub::new();
    let responder = HolderResponder::spawn(Arc::new(hub.endpoint()), holder("device-a", 1), timings());
    assert!(responder.is_running());
    assert_eq!(responder.token_id(), &common::token_id());

    let contender = hub.endpoint();
    let mut machine = ElectionMachine::new();
    let outcome = run_election(&mut machine, Some(&contender), candidate("device-z", 2), &timings())
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ElectionOutcome::Follower { ref coordinator, .. } if coordinator == "device-a"
    ));
    machine.complete().unwrap();

    drop(responder);
    let outcome = run_election(&mut machine, Some(&contender), candidate("device-z", 3), &timings())
        .await
        .unwrap();
    assert_eq!(outcome, ElectionOutcome::Coordinator);
}

// ── Cancellation ──

#[tokio::test(start_paused = true)]
async fn dropped_run_returns_machine_to_idle() {
    let hub = MemoryHub::new();
    let transport = hub.endpoint();
    let mut machine = ElectionMachine::new();
    let t = timings();

    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        run_election(&mut machine, Some(&transport), candidate("device-a", 1), &t),
    )
    .await;

    assert!(cancelled.is_err());
    assert_eq!(machine.state(), DeviceState::Idle);
}
