//! S2 (three-node proxy lookup) and S4 (primary failover) from the spec's
//! end-to-end scenario list.

mod common;

use std::time::Duration;

use meshmap::{Plain, Role};

#[tokio::test(flavor = "multi_thread")]
async fn three_node_proxy_lookup_promotes_and_reannounces() {
    let nodes = common::cluster(3).await;
    let (a, b, c) = (&nodes[0], &nodes[1], &nodes[2]);

    a.put("k".to_string(), Plain("v".to_string()));
    common::settle().await;

    let backups = a.backups_of(&"k".to_string()).unwrap();
    assert_eq!(backups.len(), 1);
    let (backup_node, proxy_node) = if backups[0] == b.local_member() {
        (b, c)
    } else {
        (c, b)
    };
    assert_eq!(backup_node.role_of(&"k".to_string()), Some(Role::Backup));
    assert_eq!(proxy_node.role_of(&"k".to_string()), Some(Role::Proxy));

    let value = proxy_node.get(&"k".to_string()).await;
    assert_eq!(value, Some(Plain("v".to_string())));
    common::settle().await;

    assert_eq!(proxy_node.role_of(&"k".to_string()), Some(Role::Primary));
    assert_eq!(backup_node.role_of(&"k".to_string()), Some(Role::Proxy));
    assert_eq!(a.role_of(&"k".to_string()), Some(Role::Proxy));
}

#[tokio::test(flavor = "multi_thread")]
async fn primary_crash_promotes_sole_backup() {
    let nodes = common::cluster(2).await;
    let (a, b) = (&nodes[0], &nodes[1]);

    a.put("k".to_string(), Plain("v".to_string()));
    common::settle().await;
    assert_eq!(b.role_of(&"k".to_string()), Some(Role::Backup));

    // Simulate a crash: A stops answering (no STOP sent), so B only
    // learns it is gone once its heartbeat's access-timeout expires.
    a.crash();
    tokio::time::sleep(Duration::from_millis(400)).await;
    b.heartbeat().await;

    assert_eq!(b.primary_of(&"k".to_string()), None);
    let value = b.get(&"k".to_string()).await;
    assert_eq!(value, Some(Plain("v".to_string())));
    assert_eq!(b.role_of(&"k".to_string()), Some(Role::Primary));
}
