//! End-to-end webhook reconciliation tests

use ledger_core::{
    Config as LedgerConfig, Currency, Ledger, Provider, TxCategory, TxDirection, TxDraft,
    TxStatus, UserId,
};
use reconciler::{
    signature, Ack, Config, Error, ProviderProfile, Reconciler, SignatureScheme, StandardDecoder,
};
use std::sync::Arc;

const SECRET: &str = "whsec_test";

fn setup() -> (Reconciler, Ledger, tempfile::TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut ledger_config = LedgerConfig::default();
    ledger_config.data_dir = temp_dir.path().to_path_buf();
    let ledger = Ledger::open(ledger_config).unwrap();

    let config = Config::default()
        .with_provider(
            "paygate",
            ProviderProfile {
                scheme: SignatureScheme::HmacSha512Hex,
                secret: Some(SECRET.to_string()),
            },
        )
        .with_provider(
            "bills-agg",
            ProviderProfile {
                scheme: SignatureScheme::HmacSha256Hex,
                secret: None,
            },
        );

    let mut rec = Reconciler::new(ledger.clone(), config).unwrap();
    rec.register_decoder(Arc::new(StandardDecoder::new("paygate")));
    rec.register_decoder(Arc::new(StandardDecoder::new("bills-agg")));
    (rec, ledger, temp_dir)
}

fn signed(body: &[u8]) -> String {
    signature::sign(SignatureScheme::HmacSha512Hex, SECRET, body).unwrap()
}

#[tokio::test]
async fn funding_webhook_credits_resolved_wallet() {
    let (rec, ledger, _temp) = setup();
    let user = UserId::new("u1");
    ledger
        .link_virtual_account(user.clone(), "9912345678".to_string())
        .await
        .unwrap();

    let body = serde_json::to_vec(&serde_json::json!({
        "event": "transfer.success",
        "data": {
            "reference": "pay-1",
            "amount": 250000,
            "account_number": "9912345678"
        }
    }))
    .unwrap();

    let ack = rec
        .ingest("paygate", Some(&signed(&body)), &body)
        .await
        .unwrap();
    assert_eq!(ack, Ack::Processed);

    let wallet = ledger.get_wallet(&user).unwrap().unwrap();
    assert_eq!(wallet.balance_minor, 250000);
}

#[tokio::test]
async fn redelivery_is_acknowledged_without_double_credit() {
    let (rec, ledger, _temp) = setup();
    let user = UserId::new("u1");
    ledger
        .link_virtual_account(user.clone(), "9912345678".to_string())
        .await
        .unwrap();

    let body = serde_json::to_vec(&serde_json::json!({
        "event": "transfer.success",
        "data": {
            "reference": "pay-1",
            "amount": 250000,
            "account_number": "9912345678"
        }
    }))
    .unwrap();
    let sig = signed(&body);

    assert_eq!(
        rec.ingest("paygate", Some(&sig), &body).await.unwrap(),
        Ack::Processed
    );
    assert_eq!(
        rec.ingest("paygate", Some(&sig), &body).await.unwrap(),
        Ack::Duplicate
    );

    let wallet = ledger.get_wallet(&user).unwrap().unwrap();
    assert_eq!(wallet.balance_minor, 250000);
}

#[tokio::test]
async fn bad_signature_is_dropped_before_storage() {
    let (rec, _ledger, _temp) = setup();

    let body = serde_json::to_vec(&serde_json::json!({
        "event": "transfer.success",
        "data": {
            "reference": "pay-1",
            "amount": 250000,
            "account_number": "9912345678"
        }
    }))
    .unwrap();

    let result = rec.ingest("paygate", Some("deadbeef"), &body).await;
    assert!(matches!(result, Err(Error::InvalidSignature(_))));

    // A later, correctly signed delivery is fresh, not a duplicate
    // (nothing was recorded for the rejected one)
    let result = rec.ingest("paygate", Some(&signed(&body)), &body).await;
    assert!(matches!(result, Ok(Ack::Unmatched) | Ok(Ack::Processed)));
}

#[tokio::test]
async fn missing_signature_rejected_when_secret_configured() {
    let (rec, _ledger, _temp) = setup();
    let body = br#"{"event":"transfer.success","data":{"reference":"r","amount":1}}"#;

    let result = rec.ingest("paygate", None, body).await;
    assert!(matches!(result, Err(Error::MissingSignature(_))));
}

#[tokio::test]
async fn status_webhook_finalizes_pending_debit() {
    let (rec, ledger, _temp) = setup();
    let user = UserId::new("u1");

    ledger
        .credit_wallet(TxDraft {
            user_id: user.clone(),
            direction: TxDirection::Credit,
            category: TxCategory::WalletFunding,
            amount_minor: 10_000,
            fee_minor: 0,
            currency: Currency::NGN,
            provider: Provider::new("paygate"),
            provider_ref: "fund-1".to_string(),
            meta: serde_json::json!({}),
        })
        .await
        .unwrap();
    let tx = ledger
        .reserve_and_debit(TxDraft {
            user_id: user.clone(),
            direction: TxDirection::Debit,
            category: TxCategory::Electricity,
            amount_minor: 6000,
            fee_minor: 0,
            currency: Currency::NGN,
            provider: Provider::new("bills-agg"),
            provider_ref: "bill-1".to_string(),
            meta: serde_json::json!({}),
        })
        .await
        .unwrap();

    let body = serde_json::to_vec(&serde_json::json!({
        "event": "bill.update",
        "data": { "reference": "bill-1", "status": "delivered" }
    }))
    .unwrap();

    // bills-agg has no secret configured; unsigned ingest
    let ack = rec.ingest("bills-agg", None, &body).await.unwrap();
    assert_eq!(ack, Ack::Processed);

    let tx = ledger.get_transaction(tx.id).unwrap();
    assert_eq!(tx.status, TxStatus::Success);
}

#[tokio::test]
async fn failure_status_webhook_refunds_debit() {
    let (rec, ledger, _temp) = setup();
    let user = UserId::new("u1");

    ledger
        .credit_wallet(TxDraft {
            user_id: user.clone(),
            direction: TxDirection::Credit,
            category: TxCategory::WalletFunding,
            amount_minor: 10_000,
            fee_minor: 0,
            currency: Currency::NGN,
            provider: Provider::new("paygate"),
            provider_ref: "fund-1".to_string(),
            meta: serde_json::json!({}),
        })
        .await
        .unwrap();
    let tx = ledger
        .reserve_and_debit(TxDraft {
            user_id: user.clone(),
            direction: TxDirection::Debit,
            category: TxCategory::Airtime,
            amount_minor: 6000,
            fee_minor: 0,
            currency: Currency::NGN,
            provider: Provider::new("bills-agg"),
            provider_ref: "air-1".to_string(),
            meta: serde_json::json!({}),
        })
        .await
        .unwrap();

    let body = serde_json::to_vec(&serde_json::json!({
        "event": "bill.update",
        "data": { "reference": "air-1", "status": "declined" }
    }))
    .unwrap();

    let ack = rec.ingest("bills-agg", None, &body).await.unwrap();
    assert_eq!(ack, Ack::Processed);

    let tx = ledger.get_transaction(tx.id).unwrap();
    assert_eq!(tx.status, TxStatus::Failed);
    let wallet = ledger.get_wallet(&user).unwrap().unwrap();
    assert_eq!(wallet.balance_minor, 10_000);
}

#[tokio::test]
async fn unknown_reference_is_unmatched() {
    let (rec, _ledger, _temp) = setup();

    let body = serde_json::to_vec(&serde_json::json!({
        "event": "bill.update",
        "data": { "reference": "ghost-1", "status": "delivered" }
    }))
    .unwrap();

    let ack = rec.ingest("bills-agg", None, &body).await.unwrap();
    assert_eq!(ack, Ack::Unmatched);
}

#[tokio::test]
async fn unknown_status_word_is_ignored() {
    let (rec, ledger, _temp) = setup();
    let user = UserId::new("u1");

    ledger
        .credit_wallet(TxDraft {
            user_id: user.clone(),
            direction: TxDirection::Credit,
            category: TxCategory::WalletFunding,
            amount_minor: 10_000,
            fee_minor: 0,
            currency: Currency::NGN,
            provider: Provider::new("paygate"),
            provider_ref: "fund-1".to_string(),
            meta: serde_json::json!({}),
        })
        .await
        .unwrap();
    let tx = ledger
        .reserve_and_debit(TxDraft {
            user_id: user.clone(),
            direction: TxDirection::Debit,
            category: TxCategory::Data,
            amount_minor: 2000,
            fee_minor: 0,
            currency: Currency::NGN,
            provider: Provider::new("bills-agg"),
            provider_ref: "data-1".to_string(),
            meta: serde_json::json!({}),
        })
        .await
        .unwrap();

    let body = serde_json::to_vec(&serde_json::json!({
        "event": "bill.update",
        "data": { "reference": "data-1", "status": "processing" }
    }))
    .unwrap();

    let ack = rec.ingest("bills-agg", None, &body).await.unwrap();
    assert_eq!(ack, Ack::Ignored);

    // Transaction still pending, reservation still held
    let tx = ledger.get_transaction(tx.id).unwrap();
    assert_eq!(tx.status, TxStatus::Pending);
}

#[tokio::test]
async fn funding_for_unknown_account_is_unmatched() {
    let (rec, _ledger, _temp) = setup();

    let body = serde_json::to_vec(&serde_json::json!({
        "event": "transfer.success",
        "data": {
            "reference": "pay-9",
            "amount": 50_000,
            "account_number": "0000000000"
        }
    }))
    .unwrap();

    let ack = rec
        .ingest("paygate", Some(&signed(&body)), &body)
        .await
        .unwrap();
    assert_eq!(ack, Ack::Unmatched);
}
