//! Transmit pacing against the radio's rolling quota.

use meshfwd_services::{Destination, Priority};
use meshfwdd::link::{MemoryMesh, TransmissionKind};

use crate::{busiest_window, config, eventually, online, WINDOW};

#[tokio::test(start_paused = true)]
async fn sends_are_paced_never_dropped() {
    let mesh = MemoryMesh::new();
    let two = online(&mesh, config(2, "Two")).await;

    let mut limited = config(1, "Alpha");
    limited.quota.messages_per_window = 3;
    limited.quota.window_ms = WINDOW.as_millis() as u64;
    let alpha = online(&mesh, limited).await;
    assert!(eventually(|| alpha.transport.directory().get("uid-2").is_some()).await);

    for i in 0..5 {
        alpha
            .transport
            .send(format!("m{i}").into_bytes(), Destination::users(["uid-2"]), Priority::Normal)
            .unwrap();
    }

    assert!(eventually(|| two.events.messages().len() == 5).await);
    let received: Vec<Vec<u8>> = two.events.messages().into_iter().map(|(_, m)| m).collect();
    let expected: Vec<Vec<u8>> = (0..5).map(|i| format!("m{i}").into_bytes()).collect();
    assert_eq!(received, expected);

    let log = mesh.transmissions_from(1);
    // One beacon plus five messages.
    assert_eq!(log.len(), 6);
    assert!(busiest_window(&log, WINDOW) <= 3);
    assert!(log[5].at - log[0].at >= WINDOW);
    assert_eq!(log[0].kind, TransmissionKind::Broadcast);
}
