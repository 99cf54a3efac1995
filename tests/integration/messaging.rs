//! Chunked delivery to groups and users.

use meshfwd_core::WireError;
use meshfwd_services::{Destination, Priority};
use meshfwdd::link::{MemoryMesh, TransmissionKind};
use meshfwdd::TransportError;

use crate::{config, eventually, online, settle};

#[tokio::test(start_paused = true)]
async fn long_group_message_arrives_whole() {
    let mesh = MemoryMesh::new();
    let alpha = online(&mesh, config(1, "Alpha")).await;
    let two = online(&mesh, config(2, "Two")).await;
    let three = online(&mesh, config(3, "Three")).await;
    let group = alpha.transport.create_group(vec![2, 3]).await.unwrap();

    let payload: Vec<u8> = (0..500u32).map(|i| (i % 251) as u8).collect();
    alpha
        .transport
        .send(payload.clone(), Destination::Group, Priority::Normal)
        .unwrap();

    for member in [&two, &three] {
        assert!(eventually(|| !member.events.messages().is_empty()).await);
        assert_eq!(member.events.messages(), vec![(1, payload.clone())]);
    }

    let chunks: Vec<_> = mesh
        .transmissions_from(1)
        .into_iter()
        .filter(|t| t.kind == TransmissionKind::Unicast { destination: group.group_id })
        .collect();
    assert_eq!(chunks.len(), 9);
    assert!(chunks.iter().all(|t| t.frame.len() <= 61));
    assert!(alpha.events.messages().is_empty());
}

#[tokio::test(start_paused = true)]
async fn user_messages_skip_unknown_uids() {
    let mesh = MemoryMesh::new();
    let alpha = online(&mesh, config(1, "Alpha")).await;
    let two = online(&mesh, config(2, "Two")).await;
    let three = online(&mesh, config(3, "Three")).await;
    assert!(eventually(|| alpha.transport.directory().len() == 2).await);

    alpha
        .transport
        .send(
            b"for two only".to_vec(),
            Destination::users(["nobody", "uid-2"]),
            Priority::High,
        )
        .unwrap();

    assert!(eventually(|| !two.events.messages().is_empty()).await);
    settle().await;
    assert_eq!(two.events.messages(), vec![(1, b"for two only".to_vec())]);
    assert!(three.events.messages().is_empty());

    let unicasts: Vec<_> = mesh
        .transmissions_from(1)
        .into_iter()
        .filter(|t| matches!(t.kind, TransmissionKind::Unicast { .. }))
        .map(|t| t.kind)
        .collect();
    assert_eq!(unicasts, vec![TransmissionKind::Unicast { destination: 2 }]);
}

#[tokio::test(start_paused = true)]
async fn oversized_payload_is_refused_up_front() {
    let mesh = MemoryMesh::new();
    let alpha = online(&mesh, config(1, "Alpha")).await;

    let err = alpha
        .transport
        .send(vec![7u8; 901], Destination::Group, Priority::Normal)
        .unwrap_err();
    assert!(matches!(
        err,
        TransportError::Wire(WireError::TooManyChunks { needed: 16, max: 15 })
    ));
    assert!(matches!(
        alpha
            .transport
            .send(Vec::new(), Destination::users(["uid-2"]), Priority::Normal),
        Err(TransportError::Wire(WireError::EmptyPayload))
    ));
    assert_eq!(alpha.transport.pending_messages(), 0);

    // Exactly fifteen chunks still fits.
    alpha
        .transport
        .send(vec![7u8; 900], Destination::Group, Priority::Normal)
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn group_message_without_group_is_dropped() {
    let mesh = MemoryMesh::new();
    let alpha = online(&mesh, config(1, "Alpha")).await;
    let on_air = mesh.transmissions().len();

    alpha
        .transport
        .send(b"nobody home".to_vec(), Destination::Group, Priority::Normal)
        .unwrap();
    settle().await;

    assert_eq!(alpha.transport.pending_messages(), 0);
    assert_eq!(mesh.transmissions().len(), on_air);
}

#[tokio::test(start_paused = true)]
async fn identical_messages_are_both_delivered() {
    let mesh = MemoryMesh::new();
    let alpha = online(&mesh, config(1, "Alpha")).await;
    let two = online(&mesh, config(2, "Two")).await;
    assert!(eventually(|| alpha.transport.directory().get("uid-2").is_some()).await);

    for _ in 0..2 {
        alpha
            .transport
            .send(b"ping".to_vec(), Destination::users(["uid-2"]), Priority::Normal)
            .unwrap();
    }

    assert!(eventually(|| two.events.messages().len() == 2).await);
    settle().await;
    assert_eq!(
        two.events.messages(),
        vec![(1, b"ping".to_vec()), (1, b"ping".to_vec())]
    );
}
