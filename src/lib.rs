// HAT NODE
// Hybrid Adaptive Trust validator attestation and dispute-resolution core.
//
// The node process embeds `HatNode`, hands it the ledger, messaging, key
// custody, storage and bond-custody collaborators, and drives it from block
// and peer-message callbacks.
pub mod logging;
pub mod node;
pub mod scores;

use anyhow::Context;
use std::path::Path;

pub use logging::init_logging;
pub use node::{Collaborators, HatNode, Inbound, NodeError, NodeResult};
pub use scores::{score_integrity_hash, seal_score, HatScoreBook, ScoreError};

pub use hat_core::HatConfig;

/// Loads and validates a YAML configuration file.
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<HatConfig> {
    let path = path.as_ref();
    let config = HatConfig::load(path)
        .with_context(|| format!("loading HAT configuration from {}", path.display()))?;
    log::info!("Loaded HAT configuration from {}", path.display());
    Ok(config)
}
