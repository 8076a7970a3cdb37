// src/api/webhooks.rs
//
// Payment provider notifications. At-least-once delivery: every transition
// below is idempotent on the order's current state, so replays and
// out-of-order events are safe to process again.

use actix_web::{post, web, HttpRequest, HttpResponse};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use crate::{db, AppState};

type HmacSha256 = Hmac<Sha256>;

/// Notifications older than this are rejected (replay protection).
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Parsed `Stripe-Signature` header: `t=<unix>,v1=<hex>[,v1=<hex>...]`.
#[derive(Debug)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

pub fn parse_signature_header(header: &str) -> Option<SignatureHeader> {
    let mut timestamp: Option<i64> = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let (key, value) = part.trim().split_once('=')?;
        match key {
            "t" => timestamp = value.parse::<i64>().ok(),
            "v1" => signatures.push(value.to_string()),
            _ => {} // other schemes are ignored
        }
    }

    let timestamp = timestamp?;
    if signatures.is_empty() {
        return None;
    }

    Some(SignatureHeader {
        timestamp,
        signatures,
    })
}

/// HMAC-SHA256 over `"{timestamp}.{body}"`, hex-encoded.
pub fn compute_signature(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies the header against the raw body at the given clock instant.
/// Fails closed on malformed headers, stale timestamps and digest mismatch.
pub fn verify_signature_at(secret: &str, header: &str, body: &[u8], now: i64) -> bool {
    let Some(parsed) = parse_signature_header(header) else {
        return false;
    };

    if (now - parsed.timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return false;
    }

    parsed.signatures.iter().any(|candidate| {
        let Ok(candidate) = hex::decode(candidate) else {
            return false;
        };
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
        mac.update(parsed.timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        // constant-time comparison
        mac.verify_slice(&candidate).is_ok()
    })
}

pub fn verify_signature(secret: &str, header: &str, body: &[u8]) -> bool {
    verify_signature_at(secret, header, body, chrono::Utc::now().timestamp())
}

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

pub fn parse_event(body: &[u8]) -> Result<StripeEvent, serde_json::Error> {
    serde_json::from_slice(body)
}

async fn handle_session_completed(
    state: &AppState,
    object: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    let order_id = object
        .get("metadata")
        .and_then(|m| m.get("order_id"))
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok());

    let Some(order_id) = order_id else {
        // session this system never created — acknowledge and move on
        log::warn!("checkout.session.completed without order_id metadata");
        return Ok(());
    };

    let payment_intent = object.get("payment_intent").and_then(|v| v.as_str());

    match db::confirm_order_paid(&state.pool, order_id, payment_intent).await? {
        true => log::info!("order {order_id} confirmed, stock decremented"),
        false => log::info!("order {order_id} already past PENDING, completed event ignored"),
    }

    Ok(())
}

async fn handle_payment_succeeded(
    state: &AppState,
    object: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    let Some(intent_id) = object.get("id").and_then(|v| v.as_str()) else {
        log::warn!("payment_intent.succeeded without id");
        return Ok(());
    };

    match db::mark_payment_paid_by_intent(&state.pool, intent_id).await? {
        Some(order_id) => log::info!("payment succeeded for order {order_id}"),
        None => log::info!("payment_intent.succeeded for unknown or settled intent {intent_id}"),
    }

    Ok(())
}

async fn handle_payment_failed(
    state: &AppState,
    object: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    let Some(intent_id) = object.get("id").and_then(|v| v.as_str()) else {
        log::warn!("payment_intent.payment_failed without id");
        return Ok(());
    };

    match db::mark_payment_failed_by_intent(&state.pool, intent_id).await? {
        Some(order_id) => log::info!("payment failed, order {order_id} cancelled"),
        None => log::info!(
            "payment_intent.payment_failed for unknown, settled or shipped intent {intent_id}"
        ),
    }

    Ok(())
}

async fn handle_charge_succeeded(
    state: &AppState,
    object: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    let charge_id = object.get("id").and_then(|v| v.as_str());
    let intent_id = object.get("payment_intent").and_then(|v| v.as_str());

    let (Some(charge_id), Some(intent_id)) = (charge_id, intent_id) else {
        log::warn!("charge.succeeded without id or payment_intent");
        return Ok(());
    };

    match db::attach_charge_by_intent(&state.pool, intent_id, charge_id).await? {
        Some(order_id) => log::info!("charge {charge_id} recorded for order {order_id}"),
        None => log::info!("charge.succeeded for unknown intent {intent_id}"),
    }

    Ok(())
}

// Raw body by design: signature verification needs the exact bytes, so this
// route stays out of the utoipa schema inference.
#[post("/api/webhook/stripe")]
pub async fn stripe_webhook(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    let Some(signature) = req
        .headers()
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
    else {
        return HttpResponse::BadRequest().json(json!({
            "error": "missing stripe-signature header"
        }));
    };

    if !verify_signature(&state.stripe_webhook_secret, signature, &body) {
        log::warn!("webhook signature verification failed");
        return HttpResponse::BadRequest().json(json!({ "error": "invalid signature" }));
    }

    let event = match parse_event(&body) {
        Ok(e) => e,
        Err(e) => {
            log::warn!("webhook payload parse error: {e}");
            return HttpResponse::BadRequest().json(json!({ "error": "invalid payload" }));
        }
    };

    let result = match event.event_type.as_str() {
        "checkout.session.completed" => handle_session_completed(&state, &event.data.object).await,
        "payment_intent.succeeded" => handle_payment_succeeded(&state, &event.data.object).await,
        "payment_intent.payment_failed" => handle_payment_failed(&state, &event.data.object).await,
        "charge.succeeded" => handle_charge_succeeded(&state, &event.data.object).await,
        other => {
            log::info!("unhandled event type: {other}");
            Ok(())
        }
    };

    match result {
        Ok(()) => HttpResponse::Ok().json(json!({ "received": true })),
        Err(e) => {
            log::error!("webhook handler error for {}: {e}", event.event_type);
            HttpResponse::InternalServerError().json(json!({ "error": "webhook handler failed" }))
        }
    }
}
