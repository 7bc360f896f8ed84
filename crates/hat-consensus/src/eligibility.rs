// VALIDATOR ELIGIBILITY
// Stake, history and funding-diversity checks against the host ledger.
//
// SAFETY INVARIANTS:
// 1. Eligibility requires all three requirements; no single factor compensates for another
// 2. A single funding source fails anti-Sybil regardless of stake size
// 3. Data from an unsynced ledger or a truncated scan is tagged, never passed off as complete
// 4. Ledger scans run without holding any registry lock

use hat_core::{
    Address, Amount, BlockHeight, DataQuality, EligibilityConfig, LedgerError, LedgerQuery, Utxo,
    ValidatorEligibilityRecord,
};
use hat_state::{RegistryError, ValidatorRegistry};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EligibilityError {
    #[error("ledger query failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("registry failure: {0}")]
    Registry(#[from] RegistryError),
}

/// Outcome of `verify_stake`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeReport {
    pub utxos: Vec<Utxo>,
    pub total_amount: Amount,
    /// `current_height - min(creation_height)`; zero without outputs
    pub oldest_age_blocks: u64,
    pub quality: DataQuality,
}

/// Outcome of `verify_history`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryReport {
    pub first_seen_height: Option<BlockHeight>,
    pub tx_count: u64,
    pub unique_interactions: u64,
    pub quality: DataQuality,
}

pub struct EligibilityVerifier {
    ledger: Arc<dyn LedgerQuery>,
    registry: Arc<ValidatorRegistry>,
    config: EligibilityConfig,
}

impl EligibilityVerifier {
    pub fn new(ledger: Arc<dyn LedgerQuery>, registry: Arc<ValidatorRegistry>, config: EligibilityConfig) -> Self {
        EligibilityVerifier { ledger, registry, config }
    }

    pub fn config(&self) -> &EligibilityConfig {
        &self.config
    }

    fn sync_quality(&self) -> DataQuality {
        if self.ledger.is_synced() {
            DataQuality::Complete
        } else {
            DataQuality::Stale
        }
    }

    pub fn verify_stake(&self, address: &Address) -> Result<StakeReport, EligibilityError> {
        let quality = self.sync_quality();
        let current = self.ledger.current_height();
        let utxos = self.ledger.utxos_for(address)?;

        let total_amount = utxos.iter().fold(0u64, |acc, u| acc.saturating_add(u.amount));
        let oldest_age_blocks = utxos
            .iter()
            .map(|u| u.creation_height)
            .min()
            .map_or(0, |oldest| current.saturating_sub(oldest));

        Ok(StakeReport {
            utxos,
            total_amount,
            oldest_age_blocks,
            quality,
        })
    }

    /// History from the address index, falling back to a bounded block scan
    /// when the host has no index.
    pub fn verify_history(&self, address: &Address) -> Result<HistoryReport, EligibilityError> {
        let quality = self.sync_quality();
        match self.ledger.tx_history_for(address) {
            Ok(records) => {
                let mut first_seen: Option<BlockHeight> = None;
                let mut tx_count = 0u64;
                let mut counterparties: HashSet<Address> = HashSet::new();
                for record in records {
                    tx_count += 1;
                    first_seen = Some(first_seen.map_or(record.height, |h| h.min(record.height)));
                    counterparties.extend(record.counterparties.into_iter().filter(|c| c != address));
                }
                Ok(HistoryReport {
                    first_seen_height: first_seen,
                    tx_count,
                    unique_interactions: counterparties.len() as u64,
                    quality,
                })
            }
            Err(LedgerError::IndexUnavailable) => {
                debug!("No address index; scanning blocks for {}", address);
                let mut report = self.scan_blocks(address)?;
                report.quality = report.quality.weaker(quality);
                Ok(report)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn scan_blocks(&self, address: &Address) -> Result<HistoryReport, EligibilityError> {
        let deadline = Instant::now() + Duration::from_millis(self.config.history_scan_budget_ms);
        let current = self.ledger.current_height();

        let mut first_seen: Option<BlockHeight> = None;
        let mut tx_count = 0u64;
        let mut counterparties: HashSet<Address> = HashSet::new();
        let mut quality = DataQuality::IndexFallback;

        for height in 0..=current {
            if Instant::now() >= deadline {
                warn!(
                    "History scan for {} hit its budget at height {}/{}; returning partial result",
                    address, height, current
                );
                quality = DataQuality::Partial;
                break;
            }
            for tx in self.ledger.block_transactions(height)? {
                if !tx.participants.contains(address) {
                    continue;
                }
                tx_count += 1;
                first_seen.get_or_insert(height);
                counterparties.extend(tx.participants.into_iter().filter(|p| p != address));
            }
        }

        Ok(HistoryReport {
            first_seen_height: first_seen,
            tx_count,
            unique_interactions: counterparties.len() as u64,
            quality,
        })
    }

    fn distinct_sources(utxos: &[Utxo]) -> u32 {
        utxos.iter().map(|u| u.funding_source).collect::<HashSet<_>>().len() as u32
    }

    /// True iff the stake is funded from at least the configured number of
    /// distinct sources.
    pub fn verify_anti_sybil(&self, address: &Address) -> Result<bool, EligibilityError> {
        let utxos = self.ledger.utxos_for(address)?;
        Ok(Self::distinct_sources(&utxos) >= self.config.min_funding_sources)
    }

    pub fn compute_eligibility(&self, address: &Address) -> Result<ValidatorEligibilityRecord, EligibilityError> {
        let stake = self.verify_stake(address)?;
        let history = self.verify_history(address)?;
        let current = self.ledger.current_height();
        let c = &self.config;

        let mut record = ValidatorEligibilityRecord::new(*address);
        record.staked_amount = stake.total_amount;
        record.stake_age_blocks = stake.oldest_age_blocks;
        record.funding_sources = Self::distinct_sources(&stake.utxos);
        record.blocks_since_first_seen = history
            .first_seen_height
            .map_or(0, |h| current.saturating_sub(h));
        record.transaction_count = history.tx_count;
        record.unique_interactions = history.unique_interactions;
        record.last_update_height = current;
        record.last_update_time = hat_core::time::unix_now_secs();

        record.meets_stake_requirement = record.staked_amount >= c.min_stake
            && record.stake_age_blocks >= c.min_stake_age
            && record.funding_sources >= c.min_funding_sources;
        record.meets_history_requirement = record.blocks_since_first_seen >= c.min_history_blocks
            && record.transaction_count >= c.min_transactions;
        record.meets_interaction_requirement = record.unique_interactions >= c.min_unique_interactions;
        record.data_quality = stake.quality.weaker(history.quality);
        record.refresh_eligibility();

        debug!(
            "Eligibility for {}: stake={} history={} interaction={} quality={:?}",
            address,
            record.meets_stake_requirement,
            record.meets_history_requirement,
            record.meets_interaction_requirement,
            record.data_quality
        );
        Ok(record)
    }

    /// Recomputes and persists the record for `address`.
    pub fn refresh(&self, address: &Address) -> Result<ValidatorEligibilityRecord, EligibilityError> {
        let record = self.compute_eligibility(address)?;
        if self.registry.write_if_newer(&record)? {
            info!(
                "Eligibility refreshed for {} at height {}: eligible={}",
                address, record.last_update_height, record.is_eligible
            );
        }
        Ok(record)
    }

    /// Stored record, computed lazily on first query.
    pub fn eligibility(&self, address: &Address) -> Result<ValidatorEligibilityRecord, EligibilityError> {
        match self.registry.read(address) {
            Some(record) => Ok(record),
            None => self.refresh(address),
        }
    }
}
