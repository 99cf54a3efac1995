//! Setup failures, reconnects, and teardown.

use meshfwd_services::{Destination, Priority};
use meshfwdd::link::{MemoryMesh, TransmissionKind};
use meshfwdd::{ConnectionState, TransportError};

use crate::{broadcasts_from, config, eventually, node, online, settle, POLL, WINDOW};

#[tokio::test(start_paused = true)]
async fn rejected_identity_keeps_node_off_the_air() {
    let mesh = MemoryMesh::new();
    let alpha = node(&mesh, config(1, "Alpha"));
    alpha.link.reject_identity(true);

    alpha.transport.start().await.unwrap();
    alpha
        .transport
        .send(b"stuck".to_vec(), Destination::Broadcast, Priority::Normal)
        .unwrap();
    settle().await;

    assert!(!alpha.transport.is_ready());
    assert_eq!(alpha.transport.state(), ConnectionState::Disconnected);
    assert!(mesh.transmissions().is_empty());
    assert_eq!(alpha.transport.pending_messages(), 1);
}

#[tokio::test(start_paused = true)]
async fn queued_traffic_flushes_by_priority_after_reconnect() {
    let mesh = MemoryMesh::new();
    let alpha = online(&mesh, config(1, "Alpha")).await;
    let two = online(&mesh, config(2, "Two")).await;
    assert!(eventually(|| alpha.transport.directory().get("uid-2").is_some()).await);

    alpha.link.drop_connection();
    assert!(eventually(|| alpha.transport.state() == ConnectionState::Disconnected).await);

    let to_two = || Destination::users(["uid-2"]);
    alpha.transport.send(b"low".to_vec(), to_two(), Priority::Low).unwrap();
    alpha.transport.send(b"high".to_vec(), to_two(), Priority::High).unwrap();
    settle().await;
    assert!(two.events.messages().is_empty());
    assert_eq!(alpha.transport.pending_messages(), 2);

    let mark = mesh.transmissions_from(1).len();
    alpha.transport.start().await.unwrap();
    assert!(eventually(|| two.events.messages().len() == 2).await);

    let received: Vec<Vec<u8>> = two.events.messages().into_iter().map(|(_, m)| m).collect();
    assert_eq!(received, vec![b"high".to_vec(), b"low".to_vec()]);

    // The fresh initial beacon goes out before anything queued.
    let after = mesh.transmissions_from(1);
    assert_eq!(after[mark].kind, TransmissionKind::Broadcast);
    assert_eq!(&after[mark].frame[..], b"ATAKBCAST,1,uid-1,Alpha,1");
    assert_eq!(
        broadcasts_from(&mesh, 1)
            .iter()
            .filter(|b| b.ends_with(",1"))
            .count(),
        2
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_is_final() {
    let mesh = MemoryMesh::new();
    let alpha = online(&mesh, config(1, "Alpha")).await;
    let two = online(&mesh, config(2, "Two")).await;
    settle().await;
    let on_air = mesh.transmissions_from(1).len();

    alpha.transport.shutdown().await;

    assert!(!alpha.transport.is_ready());
    assert_eq!(alpha.transport.state(), ConnectionState::Disconnected);
    assert!(matches!(
        alpha
            .transport
            .send(b"late".to_vec(), Destination::users(["uid-2"]), Priority::High),
        Err(TransportError::Destroyed)
    ));
    assert!(matches!(alpha.transport.start().await, Err(TransportError::Destroyed)));
    assert!(matches!(
        alpha.transport.broadcast_discovery(),
        Err(TransportError::Destroyed)
    ));

    // A second shutdown is harmless.
    alpha.transport.shutdown().await;
    settle().await;
    assert_eq!(mesh.transmissions_from(1).len(), on_air);
    assert!(two.events.messages().is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_does_not_wait_out_the_quota() {
    let mesh = MemoryMesh::new();
    let two = online(&mesh, config(2, "Two")).await;

    let mut limited = config(1, "Alpha");
    limited.quota.messages_per_window = 2;
    limited.quota.window_ms = WINDOW.as_millis() as u64;
    let alpha = online(&mesh, limited).await;
    assert!(eventually(|| alpha.transport.directory().get("uid-2").is_some()).await);

    for text in ["one", "two", "three", "four"] {
        alpha
            .transport
            .send(text.as_bytes().to_vec(), Destination::users(["uid-2"]), Priority::Normal)
            .unwrap();
    }
    // Beacon plus "one" fill the window; "two" is waiting for a slot.
    assert!(eventually(|| two.events.messages().len() == 1).await);
    tokio::time::sleep(POLL * 3).await;

    let start = tokio::time::Instant::now();
    alpha.transport.shutdown().await;
    assert!(start.elapsed() <= POLL, "shutdown took {:?}", start.elapsed());
    assert_eq!(two.events.messages().len(), 1);
}
