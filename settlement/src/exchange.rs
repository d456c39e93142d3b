//! Manual currency exchange desk
//!
//! Trades move through a fixed state machine:
//!
//! ```text
//! PendingPayment → PaidAwaitingConfirmation → PaymentReceived → ExchangeCompleted
//!       │
//!       ├─→ Expired    (payment deadline passed, applied lazily on read)
//!       └─→ Cancelled  (user abort, only before payment is claimed)
//! ```
//!
//! The user pays off-platform (bank transfer to the desk), an operator
//! confirms receipt, and completion credits the wallet with the bought
//! amount. The payout credit carries the trade ID as its idempotency
//! reference, so a retried completion never pays twice.

use crate::{Error, Result};
use chrono::{Duration, Utc};
use ledger_core::{
    Currency, ExchangeTrade, Ledger, Provider, TradeStatus, TxCategory, TxDirection, TxDraft,
    UserId,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Provider name stamped on exchange payout credits
const EXCHANGE_PROVIDER: &str = "exchange-desk";

/// Exchange engine
pub struct ExchangeEngine {
    /// Wallet ledger
    ledger: Ledger,

    /// Payment deadline for new trades
    trade_ttl: Duration,
}

impl ExchangeEngine {
    /// Create an exchange engine over an open ledger
    pub fn new(ledger: Ledger, trade_ttl_minutes: i64) -> Self {
        Self {
            ledger,
            trade_ttl: Duration::minutes(trade_ttl_minutes),
        }
    }

    /// Quote and open a new trade. `rate` is buy minor units per sell minor
    /// unit; the buy amount is computed and locked at creation time.
    pub async fn create_trade(
        &self,
        user_id: UserId,
        sell_currency: Currency,
        buy_currency: Currency,
        sell_amount_minor: i64,
        rate: Decimal,
    ) -> Result<ExchangeTrade> {
        if sell_currency == buy_currency {
            return Err(Error::InvalidCommand(
                "Sell and buy currencies must differ".to_string(),
            ));
        }
        if sell_amount_minor <= 0 {
            return Err(Error::InvalidCommand(
                "Sell amount must be positive".to_string(),
            ));
        }
        if rate <= Decimal::ZERO {
            return Err(Error::InvalidCommand("Rate must be positive".to_string()));
        }

        let buy_amount_minor = (Decimal::from(sell_amount_minor) * rate)
            .round()
            .to_i64()
            .ok_or_else(|| Error::InvalidCommand("Buy amount overflow".to_string()))?;
        if buy_amount_minor <= 0 {
            return Err(Error::InvalidCommand(
                "Trade too small for quoted rate".to_string(),
            ));
        }

        let now = Utc::now();
        let trade = ExchangeTrade {
            id: Uuid::now_v7(),
            user_id,
            sell_currency,
            buy_currency,
            sell_amount_minor,
            buy_amount_minor,
            rate,
            status: TradeStatus::PendingPayment,
            expires_at: now + self.trade_ttl,
            created_at: now,
            updated_at: now,
        };
        self.ledger.put_trade(trade.clone()).await?;

        tracing::info!(
            trade_id = %trade.id,
            user_id = %trade.user_id,
            sell = %trade.sell_currency,
            buy = %trade.buy_currency,
            sell_amount_minor = trade.sell_amount_minor,
            buy_amount_minor = trade.buy_amount_minor,
            "Trade opened"
        );
        Ok(trade)
    }

    /// Get a trade, with lazy expiry applied
    pub async fn get_trade(&self, trade_id: Uuid) -> Result<ExchangeTrade> {
        Ok(self.ledger.get_trade(trade_id).await?)
    }

    /// User claims to have sent the payment
    pub async fn mark_paid(&self, trade_id: Uuid, user_id: &UserId) -> Result<ExchangeTrade> {
        self.check_owner(trade_id, user_id).await?;
        Ok(self
            .ledger
            .transition_trade(
                trade_id,
                TradeStatus::PendingPayment,
                TradeStatus::PaidAwaitingConfirmation,
            )
            .await?)
    }

    /// Operator confirms the payment landed in the desk account
    pub async fn confirm_payment(&self, trade_id: Uuid) -> Result<ExchangeTrade> {
        Ok(self
            .ledger
            .transition_trade(
                trade_id,
                TradeStatus::PaidAwaitingConfirmation,
                TradeStatus::PaymentReceived,
            )
            .await?)
    }

    /// Complete the trade: credit the bought amount, then close the trade.
    ///
    /// The credit carries the trade ID as idempotency reference. A retry
    /// after a crash between credit and close skips the duplicate credit and
    /// just finishes the transition.
    pub async fn complete(&self, trade_id: Uuid) -> Result<ExchangeTrade> {
        let trade = self.ledger.get_trade(trade_id).await?;
        if trade.status != TradeStatus::PaymentReceived {
            return Err(Error::Ledger(ledger_core::Error::InvalidTransition(
                format!(
                    "Trade {} is {:?}, expected PaymentReceived",
                    trade_id, trade.status
                ),
            )));
        }

        let draft = TxDraft {
            user_id: trade.user_id.clone(),
            direction: TxDirection::Exchange,
            category: TxCategory::Exchange,
            amount_minor: trade.buy_amount_minor,
            fee_minor: 0,
            currency: trade.buy_currency,
            provider: Provider::new(EXCHANGE_PROVIDER),
            provider_ref: trade.id.to_string(),
            meta: serde_json::json!({
                "sell_currency": trade.sell_currency.code(),
                "sell_amount_minor": trade.sell_amount_minor,
                "rate": trade.rate.to_string(),
            }),
        };

        match self.ledger.credit_wallet(draft).await {
            Ok(_) => {}
            // Payout already landed on an earlier attempt
            Err(ledger_core::Error::DuplicateReference { existing, .. }) => {
                tracing::info!(
                    trade_id = %trade_id,
                    tx_id = %existing,
                    "Payout already credited, finishing transition"
                );
            }
            Err(e) => return Err(e.into()),
        }

        let trade = self
            .ledger
            .transition_trade(
                trade_id,
                TradeStatus::PaymentReceived,
                TradeStatus::ExchangeCompleted,
            )
            .await?;

        tracing::info!(
            trade_id = %trade.id,
            user_id = %trade.user_id,
            buy_amount_minor = trade.buy_amount_minor,
            "Trade completed"
        );
        Ok(trade)
    }

    /// User aborts a trade before claiming payment
    pub async fn cancel(&self, trade_id: Uuid, user_id: UserId) -> Result<ExchangeTrade> {
        Ok(self.ledger.cancel_trade(trade_id, user_id).await?)
    }

    async fn check_owner(&self, trade_id: Uuid, user_id: &UserId) -> Result<ExchangeTrade> {
        let trade = self.ledger.get_trade(trade_id).await?;
        if &trade.user_id != user_id {
            return Err(Error::Ledger(ledger_core::Error::TradeNotFound(
                trade_id.to_string(),
            )));
        }
        Ok(trade)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::Config;

    fn test_ledger() -> (Ledger, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Ledger::open(config).unwrap(), temp_dir)
    }

    // 1 kobo buys 0.00065 cents: ₦10,000.00 → $6.50
    fn ngn_usd_rate() -> Decimal {
        Decimal::new(65, 5)
    }

    #[tokio::test]
    async fn test_full_trade_lifecycle() {
        let (ledger, _temp) = test_ledger();
        let engine = ExchangeEngine::new(ledger.clone(), 30);
        let user = UserId::new("u1");

        let trade = engine
            .create_trade(
                user.clone(),
                Currency::NGN,
                Currency::USD,
                1_000_000,
                ngn_usd_rate(),
            )
            .await
            .unwrap();
        assert_eq!(trade.status, TradeStatus::PendingPayment);
        assert_eq!(trade.buy_amount_minor, 650);

        engine.mark_paid(trade.id, &user).await.unwrap();
        engine.confirm_payment(trade.id).await.unwrap();
        let trade = engine.complete(trade.id).await.unwrap();
        assert_eq!(trade.status, TradeStatus::ExchangeCompleted);

        // Payout landed
        let wallet = ledger.get_wallet(&user).unwrap().unwrap();
        assert_eq!(wallet.balance_minor, 650);
    }

    #[tokio::test]
    async fn test_complete_retry_pays_once() {
        let (ledger, _temp) = test_ledger();
        let engine = ExchangeEngine::new(ledger.clone(), 30);
        let user = UserId::new("u1");

        let trade = engine
            .create_trade(
                user.clone(),
                Currency::NGN,
                Currency::USD,
                1_000_000,
                ngn_usd_rate(),
            )
            .await
            .unwrap();
        engine.mark_paid(trade.id, &user).await.unwrap();
        engine.confirm_payment(trade.id).await.unwrap();
        engine.complete(trade.id).await.unwrap();

        // Second completion is rejected, and no second payout happens
        let result = engine.complete(trade.id).await;
        assert!(result.is_err());
        let wallet = ledger.get_wallet(&user).unwrap().unwrap();
        assert_eq!(wallet.balance_minor, 650);
    }

    #[tokio::test]
    async fn test_cancel_only_before_payment_claimed() {
        let (ledger, _temp) = test_ledger();
        let engine = ExchangeEngine::new(ledger, 30);
        let user = UserId::new("u1");

        let trade = engine
            .create_trade(
                user.clone(),
                Currency::NGN,
                Currency::USD,
                1_000_000,
                ngn_usd_rate(),
            )
            .await
            .unwrap();
        engine.mark_paid(trade.id, &user).await.unwrap();

        let result = engine.cancel(trade.id, user).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_wrong_owner_cannot_mark_paid() {
        let (ledger, _temp) = test_ledger();
        let engine = ExchangeEngine::new(ledger, 30);

        let trade = engine
            .create_trade(
                UserId::new("u1"),
                Currency::NGN,
                Currency::USD,
                1_000_000,
                ngn_usd_rate(),
            )
            .await
            .unwrap();

        let result = engine.mark_paid(trade.id, &UserId::new("intruder")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_same_currency_rejected() {
        let (ledger, _temp) = test_ledger();
        let engine = ExchangeEngine::new(ledger, 30);

        let result = engine
            .create_trade(
                UserId::new("u1"),
                Currency::NGN,
                Currency::NGN,
                1_000_000,
                Decimal::ONE,
            )
            .await;
        assert!(matches!(result, Err(Error::InvalidCommand(_))));
    }
}
