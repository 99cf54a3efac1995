//! Beacon bootstrap between nodes on one mesh.

use meshfwd_core::config::MeshfwdConfig;

use crate::{broadcasts_from, config, eventually, online, settle};
use meshfwdd::link::MemoryMesh;

fn bravo() -> MeshfwdConfig {
    let mut config = config(42, "Bravo");
    config.identity.uid = "u1".into();
    config
}

#[tokio::test(start_paused = true)]
async fn newcomer_gets_exactly_one_reply() {
    let mesh = MemoryMesh::new();
    let alpha = online(&mesh, config(1, "Alpha")).await;
    assert_eq!(broadcasts_from(&mesh, 1), vec!["ATAKBCAST,1,uid-1,Alpha,1"]);

    let bravo = online(&mesh, bravo()).await;
    assert!(eventually(|| !bravo.events.peers().is_empty()).await);
    settle().await;

    assert_eq!(
        alpha.events.peers(),
        vec![("Bravo".to_string(), 42, "u1".to_string())]
    );
    assert_eq!(
        bravo.events.peers(),
        vec![("Alpha".to_string(), 1, "uid-1".to_string())]
    );
    assert_eq!(
        broadcasts_from(&mesh, 1),
        vec!["ATAKBCAST,1,uid-1,Alpha,1", "ATAKBCAST,1,uid-1,Alpha,0"]
    );
    // The reply does not ask for another one.
    assert_eq!(broadcasts_from(&mesh, 42), vec!["ATAKBCAST,42,u1,Bravo,1"]);

    let known = alpha.transport.directory().get("u1").expect("bravo registered");
    assert_eq!(known.gid, 42);
    assert_eq!(known.callsign, "Bravo");
}

#[tokio::test(start_paused = true)]
async fn manual_discovery_is_heard_but_not_answered() {
    let mesh = MemoryMesh::new();
    let alpha = online(&mesh, config(1, "Alpha")).await;
    let bravo = online(&mesh, bravo()).await;
    settle().await;
    let replies_before = broadcasts_from(&mesh, 1).len();

    bravo.transport.broadcast_discovery().unwrap();
    assert!(eventually(|| alpha.events.peers().len() == 2).await);
    settle().await;

    assert_eq!(broadcasts_from(&mesh, 1).len(), replies_before);
    assert_eq!(
        broadcasts_from(&mesh, 42).last().map(String::as_str),
        Some("ATAKBCAST,42,u1,Bravo,0")
    );
    assert_eq!(alpha.transport.directory().len(), 1);
}
