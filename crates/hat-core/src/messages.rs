//! Peer message envelopes.
//!
//! Payloads are `bincode`-encoded; field order is part of the wire contract
//! because the receiver recomputes signed digests from the decoded values.

use crate::collaborators::MessageType;
use crate::types::{Address, Amount, Hash256, ValidationResponse, ValidationTask};
use serde::{Deserialize, Serialize};

/// Broadcast when a dispute is opened against a reputation vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeNotice {
    pub dispute_id: Hash256,
    pub target_vote_hash: Hash256,
    pub challenger: Address,
    pub challenge_bond: Amount,
    pub voting_deadline: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerMessage {
    TaskAnnouncement(ValidationTask),
    ResponseSubmission(ValidationResponse),
    DisputeNotification(DisputeNotice),
}

impl PeerMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            PeerMessage::TaskAnnouncement(_) => MessageType::TaskAnnouncement,
            PeerMessage::ResponseSubmission(_) => MessageType::ResponseSubmission,
            PeerMessage::DisputeNotification(_) => MessageType::DisputeNotification,
        }
    }
}
