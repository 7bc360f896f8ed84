// HAT CONSENSUS
// Validator eligibility, committee selection, attestation coordination and
// timing-based Sybil/eclipse detection.
pub mod eligibility;
pub mod committee;
pub mod detector;
pub mod coordinator;

pub use eligibility::{EligibilityError, EligibilityVerifier, HistoryReport, StakeReport};

pub use committee::{committee_seed, select_committee, PoolSnapshot, ValidatorPool};

pub use detector::SybilDetector;

pub use coordinator::{
    AggregatedResult, AggregationOutcome, AttestationCoordinator, BroadcastReport,
    CollectOutcome, CoordinatorError, CoordinatorResult, RejectReason,
};
