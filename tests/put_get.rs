//! S1 (two-node put/get) and S3 (backup failover) from the spec's
//! end-to-end scenario list.

mod common;

use meshmap::{Plain, Role};

#[tokio::test(flavor = "multi_thread")]
async fn two_node_put_then_get_swaps_primary_and_backup() {
    let nodes = common::cluster(2).await;
    let (a, b) = (&nodes[0], &nodes[1]);

    a.put("k".to_string(), Plain("v1".to_string()));
    common::settle().await;

    assert_eq!(a.role_of(&"k".to_string()), Some(Role::Primary));
    assert_eq!(a.backups_of(&"k".to_string()), Some(vec![b.local_member()]));
    assert_eq!(b.role_of(&"k".to_string()), Some(Role::Backup));

    let value = b.get(&"k".to_string()).await;
    assert_eq!(value, Some(Plain("v1".to_string())));

    // B promoted itself to primary on the read and re-ran backup
    // selection; with only one other live member (A), round-robin has
    // nobody left to hand a PROXY to, so A becomes the new BACKUP rather
    // than a PROXY (see DESIGN.md: two-node case of S1).
    common::settle().await;
    assert_eq!(b.role_of(&"k".to_string()), Some(Role::Primary));
    assert_eq!(a.role_of(&"k".to_string()), Some(Role::Backup));
    assert_eq!(a.get(&"k".to_string()).await, Some(Plain("v1".to_string())));
}

#[tokio::test(flavor = "multi_thread")]
async fn backup_leaving_triggers_new_backup_selection() {
    let nodes = common::cluster(3).await;
    let (a, b, c) = (&nodes[0], &nodes[1], &nodes[2]);

    a.put("k".to_string(), Plain("v".to_string()));
    common::settle().await;
    assert_eq!(a.backups_of(&"k".to_string()), Some(vec![b.local_member()]));

    b.breakdown().await;
    common::settle().await;

    // A should have relocated backup duty off of B; the only live
    // candidate left is C, so it should now carry the key.
    let backups = a.backups_of(&"k".to_string()).unwrap_or_default();
    assert!(!backups.contains(&b.local_member()));
    if !backups.is_empty() {
        assert_eq!(backups, vec![c.local_member()]);
        assert_eq!(c.role_of(&"k".to_string()), Some(Role::Backup));
    }

    // A keeps serving the key regardless of whether a replacement backup
    // was found.
    assert_eq!(a.get(&"k".to_string()).await, Some(Plain("v".to_string())));
}
