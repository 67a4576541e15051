//! S6 (state transfer) from the spec's end-to-end scenario list: a new
//! node joins an existing one configured for `StateTransferKind::Copy`
//! and bootstraps full-value COPY entries before promoting one to
//! PRIMARY on first read.

use std::sync::Arc;
use std::time::Duration;

use meshmap::{
    BincodeCodec, LocalHub, MapConfig, MemberId, Plain, ReplicatedMap, Role, StateTransferKind,
};

type StrMap = ReplicatedMap<String, Plain<String>, BincodeCodec, meshmap::LocalBus>;

#[tokio::test(flavor = "multi_thread")]
async fn joining_node_bootstraps_via_state_copy_then_promotes() {
    let hub = LocalHub::new();

    let a_id = MemberId::new("a");
    let a_cfg = MapConfig::new(a_id.clone(), b"state-test".to_vec())
        .with_access_timeout(Duration::from_millis(300));
    let a_bus = hub.bus(a_id.clone());
    let a: StrMap = ReplicatedMap::new(a_cfg, BincodeCodec, a_bus.clone());
    a_bus.register(Arc::new(a.clone()));
    a.init(false).await.unwrap();

    a.put("k1".to_string(), Plain("v1".to_string()));
    a.put("k2".to_string(), Plain("v2".to_string()));
    tokio::time::sleep(Duration::from_millis(100)).await;

    // C joins after A already owns k1/k2, configured to request full
    // COPY snapshots rather than lightweight PROXY pointers.
    let c_id = MemberId::new("c");
    let c_cfg = MapConfig::new(c_id.clone(), b"state-test".to_vec())
        .with_access_timeout(Duration::from_millis(300))
        .with_state_transfer_kind(StateTransferKind::Copy);
    let c_bus = hub.bus(c_id.clone());
    let c: StrMap = ReplicatedMap::new(c_cfg, BincodeCodec, c_bus.clone());
    c_bus.register(Arc::new(c.clone()));
    c.init(false).await.unwrap();

    assert_eq!(c.role_of(&"k1".to_string()), Some(Role::Copy));
    assert_eq!(c.role_of(&"k2".to_string()), Some(Role::Copy));
    assert_eq!(
        c.entry_set_full()
            .into_iter()
            .find(|(k, _)| k == "k1")
            .map(|(_, v)| v),
        Some(Plain("v1".to_string()))
    );

    let value = c.get(&"k1".to_string()).await;
    assert_eq!(value, Some(Plain("v1".to_string())));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(c.role_of(&"k1".to_string()), Some(Role::Primary));
}
