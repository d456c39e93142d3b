//! Standard webhook payload decoder
//!
//! Most of our providers settled on the same envelope:
//!
//! ```json
//! {
//!   "event": "charge.success",
//!   "data": {
//!     "reference": "psk_01H...",
//!     "amount": 250000,
//!     "account_number": "9912345678",
//!     "status": "successful"
//!   }
//! }
//! ```
//!
//! [`StandardDecoder`] covers that shape; providers with bespoke formats get
//! their own [`WebhookDecoder`] implementation.

use crate::types::{DecodedWebhook, WebhookDecoder, WebhookKind};
use crate::{Error, Result};
use ledger_core::{TxStatus, UserId};

/// Decoder for the common `{event, data:{...}}` envelope
pub struct StandardDecoder {
    name: String,
}

impl StandardDecoder {
    /// Create a decoder named after its provider
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn classify(event_type: &str, data: &serde_json::Value) -> Result<WebhookKind> {
        let account = data
            .get("account_number")
            .and_then(|v| v.as_str())
            .map(String::from);
        let user_id = data
            .get("user_id")
            .and_then(|v| v.as_str())
            .map(UserId::new);

        // An inbound credit names the receiving account and a settled event
        let settled = event_type
            .rsplit('.')
            .next()
            .and_then(TxStatus::from_provider_vocab)
            == Some(TxStatus::Success);
        if settled && (account.is_some() || user_id.is_some()) {
            let amount_minor = data
                .get("amount")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| Error::MalformedPayload("Missing amount".to_string()))?;
            return Ok(WebhookKind::Funding {
                account,
                user_id,
                amount_minor,
            });
        }

        if let Some(status) = data.get("status").and_then(|v| v.as_str()) {
            return Ok(WebhookKind::StatusUpdate {
                status: status.to_string(),
            });
        }

        Ok(WebhookKind::Lifecycle)
    }
}

impl WebhookDecoder for StandardDecoder {
    fn decode(&self, payload: &serde_json::Value) -> Result<DecodedWebhook> {
        let event_type = payload
            .get("event")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::MalformedPayload("Missing event field".to_string()))?
            .to_string();
        let data = payload
            .get("data")
            .ok_or_else(|| Error::MalformedPayload("Missing data object".to_string()))?;
        let reference = data
            .get("reference")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::MalformedPayload("Missing reference".to_string()))?
            .to_string();

        Ok(DecodedWebhook {
            kind: Self::classify(&event_type, data)?,
            reference,
            event_type,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}
