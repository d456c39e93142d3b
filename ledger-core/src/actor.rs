//! Actor-based concurrency for the ledger
//!
//! This module implements the single-writer pattern using Tokio actors:
//! - One logical writer task serializes every balance mutation
//! - Read-check-write sequences in [`crate::storage`] become atomic because
//!   no two mutations ever interleave
//! - Async message passing with backpressure (bounded mailbox)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │        API layer (settlement, reconciler)             │
//! │            Many concurrent requests                   │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mutation commands
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │       one mutation at a time, in arrival order        │
//! │                       │                               │
//! │                       ▼                               │
//! │        Storage::* (atomic WriteBatch per op)          │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! Pure reads bypass the actor and hit [`crate::Storage`] directly; only
//! operations that write go through the mailbox.

use crate::types::{
    Currency, ExchangeTrade, SettleOutcome, TradeStatus, Transaction, TxDraft, UserId, Wallet,
    WebhookEvent, WebhookStatus,
};
use crate::{Error, Result, Storage};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Message sent to the ledger actor
pub enum LedgerMessage {
    /// Get or lazily create a wallet
    GetOrCreateWallet {
        user_id: UserId,
        currency: Currency,
        response: oneshot::Sender<Result<Wallet>>,
    },

    /// Attach a virtual-account number to a wallet
    LinkVirtualAccount {
        user_id: UserId,
        currency: Currency,
        account: String,
        response: oneshot::Sender<Result<Wallet>>,
    },

    /// Balance check + debit + pending transaction, atomically
    ReserveAndDebit {
        draft: TxDraft,
        response: oneshot::Sender<Result<Transaction>>,
    },

    /// Credit + settled transaction, atomically
    CreditWallet {
        draft: TxDraft,
        response: oneshot::Sender<Result<Transaction>>,
    },

    /// Move a transaction to a terminal status, refunding failed debits
    Finalize {
        tx_id: Uuid,
        outcome: SettleOutcome,
        response: oneshot::Sender<Result<(Transaction, bool)>>,
    },

    /// Reconcile a pending debit with the provider's actual charge
    ApplyActualCharge {
        tx_id: Uuid,
        actual_amount_minor: i64,
        actual_fee_minor: i64,
        response: oneshot::Sender<Result<Transaction>>,
    },

    /// Record an inbound webhook delivery (dedup boundary)
    RecordWebhookEvent {
        event: WebhookEvent,
        response: oneshot::Sender<Result<WebhookEvent>>,
    },

    /// Update a webhook event's processing status
    MarkWebhookEvent {
        event_id: Uuid,
        status: WebhookStatus,
        response: oneshot::Sender<Result<WebhookEvent>>,
    },

    /// Credit a funding webhook and mark the event, atomically
    CreditAndMark {
        event_id: Uuid,
        draft: TxDraft,
        response: oneshot::Sender<Result<(Transaction, WebhookEvent)>>,
    },

    /// Finalize from a status webhook and mark the event, atomically
    FinalizeAndMark {
        event_id: Uuid,
        tx_id: Uuid,
        outcome: SettleOutcome,
        response: oneshot::Sender<Result<(Transaction, WebhookEvent, bool)>>,
    },

    /// Insert a new exchange trade
    PutTrade {
        trade: ExchangeTrade,
        response: oneshot::Sender<Result<()>>,
    },

    /// Check-and-set trade transition
    TransitionTrade {
        trade_id: Uuid,
        from: TradeStatus,
        to: TradeStatus,
        response: oneshot::Sender<Result<ExchangeTrade>>,
    },

    /// Expire an overdue trade (lazy, read-path)
    ExpireTradeIfOverdue {
        trade_id: Uuid,
        response: oneshot::Sender<Result<ExchangeTrade>>,
    },

    /// Cancel a still-unpaid trade
    CancelTrade {
        trade_id: Uuid,
        user_id: UserId,
        response: oneshot::Sender<Result<ExchangeTrade>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that processes ledger mutations
pub struct LedgerActor {
    /// Storage backend
    storage: Arc<Storage>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(storage: Arc<Storage>, mailbox: mpsc::Receiver<LedgerMessage>) -> Self {
        Self { storage, mailbox }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                LedgerMessage::Shutdown => break,
                _ => self.handle_message(msg),
            }
        }
        tracing::info!("Ledger actor stopped");
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::GetOrCreateWallet {
                user_id,
                currency,
                response,
            } => {
                let _ = response.send(self.storage.get_or_create_wallet(&user_id, currency));
            }

            LedgerMessage::LinkVirtualAccount {
                user_id,
                currency,
                account,
                response,
            } => {
                let _ =
                    response.send(self.storage.link_virtual_account(&user_id, currency, &account));
            }

            LedgerMessage::ReserveAndDebit { draft, response } => {
                let _ = response.send(self.storage.reserve_and_debit(draft));
            }

            LedgerMessage::CreditWallet { draft, response } => {
                let _ = response.send(self.storage.credit_wallet(draft));
            }

            LedgerMessage::Finalize {
                tx_id,
                outcome,
                response,
            } => {
                let _ = response.send(self.storage.finalize(tx_id, outcome));
            }

            LedgerMessage::ApplyActualCharge {
                tx_id,
                actual_amount_minor,
                actual_fee_minor,
                response,
            } => {
                let _ = response.send(self.storage.apply_actual_charge(
                    tx_id,
                    actual_amount_minor,
                    actual_fee_minor,
                ));
            }

            LedgerMessage::RecordWebhookEvent { event, response } => {
                let _ = response.send(self.storage.record_webhook_event(event));
            }

            LedgerMessage::MarkWebhookEvent {
                event_id,
                status,
                response,
            } => {
                let _ = response.send(self.storage.mark_webhook_event(event_id, status));
            }

            LedgerMessage::CreditAndMark {
                event_id,
                draft,
                response,
            } => {
                let _ = response.send(self.storage.credit_and_mark(event_id, draft));
            }

            LedgerMessage::FinalizeAndMark {
                event_id,
                tx_id,
                outcome,
                response,
            } => {
                let _ = response.send(self.storage.finalize_and_mark(event_id, tx_id, outcome));
            }

            LedgerMessage::PutTrade { trade, response } => {
                let _ = response.send(self.storage.put_trade(&trade));
            }

            LedgerMessage::TransitionTrade {
                trade_id,
                from,
                to,
                response,
            } => {
                let _ = response.send(self.storage.transition_trade(trade_id, from, to));
            }

            LedgerMessage::ExpireTradeIfOverdue { trade_id, response } => {
                let _ = response.send(self.storage.expire_trade_if_overdue(trade_id));
            }

            LedgerMessage::CancelTrade {
                trade_id,
                user_id,
                response,
            } => {
                let _ = response.send(self.storage.cancel_trade(trade_id, &user_id));
            }

            LedgerMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Get or lazily create a wallet
    pub async fn get_or_create_wallet(
        &self,
        user_id: UserId,
        currency: Currency,
    ) -> Result<Wallet> {
        self.call(|response| LedgerMessage::GetOrCreateWallet {
            user_id,
            currency,
            response,
        })
        .await
    }

    /// Attach a virtual-account number to a wallet
    pub async fn link_virtual_account(
        &self,
        user_id: UserId,
        currency: Currency,
        account: String,
    ) -> Result<Wallet> {
        self.call(|response| LedgerMessage::LinkVirtualAccount {
            user_id,
            currency,
            account,
            response,
        })
        .await
    }

    /// Reserve funds and open a pending debit
    pub async fn reserve_and_debit(&self, draft: TxDraft) -> Result<Transaction> {
        self.call(|response| LedgerMessage::ReserveAndDebit { draft, response })
            .await
    }

    /// Credit a wallet with a settled transaction
    pub async fn credit_wallet(&self, draft: TxDraft) -> Result<Transaction> {
        self.call(|response| LedgerMessage::CreditWallet { draft, response })
            .await
    }

    /// Finalize a transaction; returns whether a refund was applied
    pub async fn finalize(
        &self,
        tx_id: Uuid,
        outcome: SettleOutcome,
    ) -> Result<(Transaction, bool)> {
        self.call(|response| LedgerMessage::Finalize {
            tx_id,
            outcome,
            response,
        })
        .await
    }

    /// Reconcile a pending debit with the provider's actual charge
    pub async fn apply_actual_charge(
        &self,
        tx_id: Uuid,
        actual_amount_minor: i64,
        actual_fee_minor: i64,
    ) -> Result<Transaction> {
        self.call(|response| LedgerMessage::ApplyActualCharge {
            tx_id,
            actual_amount_minor,
            actual_fee_minor,
            response,
        })
        .await
    }

    /// Record an inbound webhook delivery
    pub async fn record_webhook_event(&self, event: WebhookEvent) -> Result<WebhookEvent> {
        self.call(|response| LedgerMessage::RecordWebhookEvent { event, response })
            .await
    }

    /// Update a webhook event's processing status
    pub async fn mark_webhook_event(
        &self,
        event_id: Uuid,
        status: WebhookStatus,
    ) -> Result<WebhookEvent> {
        self.call(|response| LedgerMessage::MarkWebhookEvent {
            event_id,
            status,
            response,
        })
        .await
    }

    /// Credit a funding webhook and mark the event atomically
    pub async fn credit_and_mark(
        &self,
        event_id: Uuid,
        draft: TxDraft,
    ) -> Result<(Transaction, WebhookEvent)> {
        self.call(|response| LedgerMessage::CreditAndMark {
            event_id,
            draft,
            response,
        })
        .await
    }

    /// Finalize from a status webhook and mark the event atomically
    pub async fn finalize_and_mark(
        &self,
        event_id: Uuid,
        tx_id: Uuid,
        outcome: SettleOutcome,
    ) -> Result<(Transaction, WebhookEvent, bool)> {
        self.call(|response| LedgerMessage::FinalizeAndMark {
            event_id,
            tx_id,
            outcome,
            response,
        })
        .await
    }

    /// Insert a new exchange trade
    pub async fn put_trade(&self, trade: ExchangeTrade) -> Result<()> {
        self.call(|response| LedgerMessage::PutTrade { trade, response })
            .await
    }

    /// Check-and-set trade transition
    pub async fn transition_trade(
        &self,
        trade_id: Uuid,
        from: TradeStatus,
        to: TradeStatus,
    ) -> Result<ExchangeTrade> {
        self.call(|response| LedgerMessage::TransitionTrade {
            trade_id,
            from,
            to,
            response,
        })
        .await
    }

    /// Expire an overdue trade before acting on it
    pub async fn expire_trade_if_overdue(&self, trade_id: Uuid) -> Result<ExchangeTrade> {
        self.call(|response| LedgerMessage::ExpireTradeIfOverdue { trade_id, response })
            .await
    }

    /// Cancel a still-unpaid trade
    pub async fn cancel_trade(&self, trade_id: Uuid, user_id: UserId) -> Result<ExchangeTrade> {
        self.call(|response| LedgerMessage::CancelTrade {
            trade_id,
            user_id,
            response,
        })
        .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(storage: Arc<Storage>, mailbox_capacity: usize) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity); // Bounded channel for backpressure
    let actor = LedgerActor::new(storage, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}
