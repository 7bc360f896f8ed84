// HAT CORE
// Data model, host collaborator interfaces and configuration shared by
// every HAT crate.
pub mod types;
pub mod collaborators;
pub mod messages;
pub mod config;
pub mod time;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use types::{
    Address, Amount, BlockHeight, BondRef, DataQuality, Hash256, HatScore, ReputationVote,
    TaskState, ValidationResponse, ValidationTask, ValidationTimestamp,
    ValidatorEligibilityRecord, Verdict, COIN, MAX_VOTE_VALUE, MIN_VOTE_VALUE,
};

pub use collaborators::{
    BlockTx, CustodyError, EconomicError, EconomicLedger, KeyCustody, KeyRef, LedgerError,
    LedgerQuery, MessageType, MessagingError, OutPoint, PayoutFragment, PeerMessaging, TxRecord,
    Utxo,
};

pub use messages::{DisputeNotice, PeerMessage};

pub use config::{
    AttestationConfig, ConfigError, CrossChainConfig, DisputeConfig, EligibilityConfig,
    FailedChallengePolicy, HatConfig, RewardConfig, SybilConfig, TieBreak, VoterRewardSplit,
};
