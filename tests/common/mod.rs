//! Shared test scaffolding for the scenario suite below: spins up an
//! N-node in-process cluster over [`LocalHub`], the same role the
//! teacher's paired-socket tests play in `tests/internal_service.rs`,
//! minus needing real bindable addresses.

use std::time::Duration;

use meshmap::{BincodeCodec, LocalBus, LocalHub, MapConfig, MemberId, Plain, ReplicatedMap};

pub type StrMap = ReplicatedMap<String, Plain<String>, BincodeCodec, LocalBus>;

/// A cluster node plus the raw bus handle it registered with, so a test
/// can simulate an ungraceful crash (deregister, no STOP sent) instead of
/// a clean `breakdown()`.
pub struct Node {
    pub map: StrMap,
    pub bus: LocalBus,
}

impl std::ops::Deref for Node {
    type Target = StrMap;
    fn deref(&self) -> &StrMap {
        &self.map
    }
}

impl Node {
    /// Simulates a crash: stops answering inbound messages without
    /// broadcasting STOP, so peers only notice via heartbeat timeout.
    pub fn crash(&self) {
        self.bus.deregister();
    }
}

/// Brings up `count` nodes named `node-0..node-{count-1}`, all sharing one
/// map-id, with short timeouts so the scenario tests don't sit around.
pub async fn cluster(count: usize) -> Vec<Node> {
    let hub = LocalHub::new();
    let mut nodes = Vec::with_capacity(count);
    for i in 0..count {
        let local = MemberId::new(format!("node-{i}"));
        let config = MapConfig::new(local.clone(), b"test".to_vec())
            .with_access_timeout(Duration::from_millis(300))
            .with_rpc_timeout(Duration::from_millis(200))
            .with_heartbeat_period(Duration::from_millis(50));
        let bus = hub.bus(local.clone());
        let map: StrMap = ReplicatedMap::new(config, BincodeCodec, bus.clone());
        bus.register(std::sync::Arc::new(map.clone()));
        nodes.push(Node { map, bus });
    }
    for node in &nodes {
        node.map.init(false).await.expect("init should not fail in-process");
    }
    nodes
}

pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}
