use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rand::{
    distributions::{Alphanumeric, DistString},
    SeedableRng,
};
use tracing::info;

use meshmap::{BincodeCodec, LocalHub, MapConfig, MemberId, Plain, ReplicatedMap};

/// Stands up `nodes` in-process replicated-map peers sharing one
/// [`LocalHub`], writes `elements` keys on the first node, lets
/// replication settle, then has the last node read one of them back
/// (forcing a PROXY→PRIMARY promotion) before tearing everything down.
///
/// Mirrors the shape of the teacher's demo binary (`src/main.rs`: bind a
/// socket, seed some key/value pairs, run the reconciliation loop, log
/// progress) with the `UdpSocket`/`other_addr` pair generalized to an
/// arbitrary number of peers over the in-process [`LocalBus`] transport.
#[derive(Parser)]
struct Args {
    /// Number of in-process nodes to spin up and cross-replicate.
    #[arg(short, long, default_value_t = 3)]
    nodes: usize,

    /// Number of keys the first node writes before the demo reads one back.
    #[arg(short, long, default_value_t = 20)]
    elements: usize,

    #[arg(long, default_value_t = tracing::Level::INFO)]
    log_level: tracing::Level,

    #[arg(long, default_value_t = 200)]
    heartbeat_millis: u64,

    #[arg(long, default_value_t = 2)]
    access_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt().with_max_level(args.log_level).init();

    let hub = LocalHub::new();
    let mut nodes = Vec::with_capacity(args.nodes);
    for i in 0..args.nodes {
        let local = MemberId::new(format!("node-{i}"));
        let config = MapConfig::new(local.clone(), b"demo".to_vec())
            .with_access_timeout(Duration::from_secs(args.access_timeout_secs))
            .with_heartbeat_period(Duration::from_millis(args.heartbeat_millis));
        let bus = hub.bus(local.clone());
        let map: ReplicatedMap<String, Plain<String>, BincodeCodec, _> =
            ReplicatedMap::new(config, BincodeCodec, bus.clone());
        bus.register(Arc::new(map.clone()));
        map.init(false).await?;
        info!(node = %local, "initialized");
        map.spawn_heartbeat();
        nodes.push(map);
    }

    // Random keys, the same way the teacher's demo seeds its tree
    // (`rand::distributions::Alphanumeric` over a seeded RNG for
    // reproducible runs).
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let primary = &nodes[0];
    let mut first_key = None;
    for i in 0..args.elements {
        let key = Alphanumeric.sample_string(&mut rng, 16);
        if i == 0 {
            first_key = Some(key.clone());
        }
        primary.put(key, Plain(format!("value-{i}")));
    }
    info!(count = args.elements, node = %primary.local_member(), "wrote keys");

    // Let BACKUP/PROXY fan-out settle before inspecting state.
    tokio::time::sleep(Duration::from_millis(500)).await;

    for map in &nodes {
        info!(
            node = %map.local_member(),
            active = map.size(),
            total = map.size_full(),
            "replicated state"
        );
    }

    if let (Some(last), Some(key)) = (nodes.last(), first_key) {
        if let Some(value) = last.get(&key).await {
            info!(
                node = %last.local_member(),
                value = %value.0,
                "fetched first key via proxy promotion, now PRIMARY here"
            );
        }
    }

    for map in &nodes {
        map.breakdown().await;
    }

    Ok(())
}
