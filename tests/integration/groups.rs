//! Group creation and invitations.

use meshfwd_services::GroupTracker;
use meshfwdd::link::{MemoryMesh, TransmissionKind};
use meshfwdd::TransportError;

use crate::{config, eventually, node, online};

#[tokio::test(start_paused = true)]
async fn create_group_reaches_every_member() {
    let mesh = MemoryMesh::new();
    let alpha = online(&mesh, config(1, "Alpha")).await;
    let seven = online(&mesh, config(7, "Seven")).await;
    let eight = online(&mesh, config(8, "Eight")).await;

    let group = alpha.transport.create_group(vec![7, 8]).await.unwrap();
    assert_eq!(group.member_gids, vec![7, 8, 1]);

    let created: Vec<_> = mesh
        .transmissions_from(1)
        .into_iter()
        .filter_map(|t| match t.kind {
            TransmissionKind::CreateGroup { group_id, members } => Some((group_id, members)),
            _ => None,
        })
        .collect();
    assert_eq!(created, vec![(group.group_id, vec![7, 8, 1])]);
    assert_eq!(alpha.events.groups(), vec![(group.group_id, vec![7, 8, 1])]);

    for member in [&seven, &eight] {
        assert!(eventually(|| !member.events.groups().is_empty()).await);
        assert_eq!(member.events.groups(), vec![(group.group_id, vec![7, 8, 1])]);
        assert_eq!(
            member.transport.directory().current_group(),
            Some(group.clone())
        );
    }
}

#[tokio::test(start_paused = true)]
async fn add_to_group_invites_only_new_members() {
    let mesh = MemoryMesh::new();
    let alpha = online(&mesh, config(1, "Alpha")).await;
    let _seven = online(&mesh, config(7, "Seven")).await;
    let group = alpha.transport.create_group(vec![7]).await.unwrap();

    let nine = online(&mesh, config(9, "Nine")).await;
    let invited = alpha
        .transport
        .add_to_group(vec![7, 1, 9], &[9])
        .await
        .unwrap();
    assert_eq!(invited, 1);

    let invites: Vec<_> = mesh
        .transmissions_from(1)
        .into_iter()
        .filter(|t| matches!(t.kind, TransmissionKind::Invite { .. }))
        .map(|t| t.kind)
        .collect();
    assert_eq!(
        invites,
        vec![TransmissionKind::Invite {
            group_id: group.group_id,
            member: 9
        }]
    );
    assert_eq!(mesh.group_members(group.group_id), Some(vec![7, 1, 9]));
    assert!(eventually(|| !nine.events.groups().is_empty()).await);
    assert_eq!(nine.events.groups()[0].0, group.group_id);
}

#[tokio::test(start_paused = true)]
async fn group_operations_need_a_ready_radio() {
    let mesh = MemoryMesh::new();
    let idle = node(&mesh, config(1, "Alpha"));

    let err = idle.transport.create_group(vec![2]).await.unwrap_err();
    assert!(matches!(err, TransportError::NotReady), "{err}");
    assert!(mesh.transmissions().is_empty());
    assert!(idle.events.groups().is_empty());

    let alpha = online(&mesh, config(2, "Bravo")).await;
    let err = alpha.transport.add_to_group(vec![2, 3], &[3]).await.unwrap_err();
    assert!(matches!(err, TransportError::NoGroup), "{err}");
}
