//! Core types for the webhook reconciler

use crate::Result;
use ledger_core::UserId;
use serde::{Deserialize, Serialize};

/// Acknowledgement returned to the webhook sender.
///
/// Every variant maps to a 200-class response upstream; providers retry on
/// anything else, and a payload we cannot use today will not become usable
/// by redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ack {
    /// Event applied to the ledger
    Processed,

    /// Delivery or its money movement was already applied
    Duplicate,

    /// Event carries nothing actionable (lifecycle noise, unknown status)
    Ignored,

    /// Event references a transaction or account we do not know
    Unmatched,
}

/// What a decoded webhook wants done
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WebhookKind {
    /// Inbound money: credit the owning wallet
    Funding {
        /// Virtual-account number the transfer landed on, resolved through
        /// the ledger's account index
        account: Option<String>,

        /// Direct user reference, when the provider echoes ours back
        user_id: Option<UserId>,

        /// Amount received, minor units
        amount_minor: i64,
    },

    /// Provider reports the outcome of an earlier purchase
    StatusUpdate {
        /// Provider's status word, mapped through the shared vocabulary
        status: String,
    },

    /// Lifecycle noise (subscription confirmed, transfer queued, ...)
    Lifecycle,
}

/// A provider payload after decoding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodedWebhook {
    /// Provider's delivery/transaction reference; dedup key and, for status
    /// updates, the join key back to our transaction log
    pub reference: String,

    /// Provider's event type string, kept verbatim for audit
    pub event_type: String,

    /// What to do with it
    pub kind: WebhookKind,
}

/// Per-provider payload decoder.
///
/// Decoders run after signature verification and JSON parsing; they only
/// translate shapes, never touch the ledger.
pub trait WebhookDecoder: Send + Sync {
    /// Decode a parsed payload
    fn decode(&self, payload: &serde_json::Value) -> Result<DecodedWebhook>;

    /// Get decoder name
    fn name(&self) -> &str;
}
