#![cfg_attr(not(test), deny(clippy::unwrap_used))]

use leafchain::{BPlusTree, DemoConfig, IndexError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEMO_KEYS: [i64; 13] = [10, 20, 5, 6, 12, 30, 7, 17, 3, 8, 25, 15, 1];
const DEMO_SEARCHES: [i64; 3] = [6, 15, 100];
const DEMO_DELETES: [i64; 5] = [6, 10, 20, 1, 3];

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leafchain=debug,tree=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match DemoConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    info!(
        "Loaded configuration: order={}, key_count={}, seed={:?}",
        config.tree.order, config.key_count, config.seed
    );

    if let Err(e) = replay_demo(&config).and_then(|_| bulk_load(&config)) {
        error!("Demo failed: {e}");
        std::process::exit(1);
    }
}

fn replay_demo(config: &DemoConfig) -> Result<(), IndexError> {
    let mut tree = BPlusTree::with_config(config.tree)?;
    for key in DEMO_KEYS {
        tree.insert(key)?;
    }

    info!("in-order walk: {:?}", tree.iter().collect::<Vec<_>>());
    info!("structure:\n{tree}");

    for key in DEMO_SEARCHES {
        info!(key, found = tree.search(&key), "search");
    }

    for key in DEMO_DELETES {
        tree.delete(&key)?;
    }

    info!("after deletes: {:?}", tree.iter().collect::<Vec<_>>());
    info!("structure:\n{tree}");
    Ok(())
}

fn bulk_load(config: &DemoConfig) -> Result<(), IndexError> {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut keys: Vec<u64> = (0..config.key_count as u64).collect();
    keys.shuffle(&mut rng);

    let mut tree = BPlusTree::with_config(config.tree)?;
    for key in &keys {
        tree.insert(*key)?;
    }
    info!(
        len = tree.len(),
        height = tree.height(),
        leaves = tree.leaf_count(),
        "bulk insert finished"
    );

    keys.shuffle(&mut rng);
    let (removed, kept) = keys.split_at(keys.len() / 2);
    for key in removed {
        tree.delete(key)?;
    }

    tree.check_invariants();
    if tree.len() != kept.len() || !kept.iter().all(|key| tree.search(key)) {
        warn!(len = tree.len(), expected = kept.len(), "surviving keys do not match");
    }

    info!(
        len = tree.len(),
        height = tree.height(),
        leaves = tree.leaf_count(),
        "bulk delete finished"
    );
    Ok(())
}
