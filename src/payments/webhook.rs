//! Crypto Pay invoice webhook.
//!
//! Paid invoices are settled in the ledger and announced on a channel; the
//! bot side turns those events into Telegram messages.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::plans::{Plan, PriceList};
use crate::store::{Database, Provider, Settlement, Subscription};

pub const SIGNATURE_HEADER: &str = "crypto-pay-api-signature";

/// Outcome of a webhook delivery that the bot should tell a user about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    Credited {
        user_id: i64,
        plan: Plan,
        subscription: Subscription,
    },
}

#[derive(Clone)]
pub struct WebhookState {
    pub db: Arc<Database>,
    pub events: mpsc::UnboundedSender<PaymentEvent>,
    pub prices: PriceList,
    /// Crypto Pay token used to verify the body signature.
    pub signing_token: Option<String>,
    /// Substring the User-Agent must contain, case-insensitive.
    pub user_agent_marker: Option<String>,
}

#[derive(Deserialize)]
struct Update {
    update_type: String,
    #[serde(default)]
    payload: Option<InvoiceUpdate>,
}

#[derive(Deserialize)]
struct InvoiceUpdate {
    invoice_id: i64,
    status: String,
    #[serde(default)]
    payload: Option<String>,
    #[serde(default)]
    amount: Option<String>,
}

/// Parses `"<user_id>|<plan_key>"`.
pub fn parse_invoice_payload(payload: &str) -> Option<(i64, Plan)> {
    let (user, plan) = payload.split_once('|')?;
    let user_id = user.trim().parse::<i64>().ok()?;
    let plan = Plan::from_key(plan.trim())?;
    Some((user_id, plan))
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| s.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

fn keyed_mac(token: &str, body: &[u8]) -> Option<Hmac<Sha256>> {
    let secret = Sha256::digest(token.as_bytes());
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&secret).ok()?;
    mac.update(body);
    Some(mac)
}

/// Hex HMAC-SHA256 of `body` keyed with SHA256 of the API token.
pub fn sign(token: &str, body: &[u8]) -> Option<String> {
    let mac = keyed_mac(token, body)?;
    Some(mac.finalize().into_bytes().iter().map(|b| format!("{b:02x}")).collect())
}

fn verify_signature(token: &str, body: &[u8], signature: &str) -> bool {
    match (decode_hex(signature.trim()), keyed_mac(token, body)) {
        (Some(expected), Some(mac)) => mac.verify_slice(&expected).is_ok(),
        _ => false,
    }
}

fn authorized(state: &WebhookState, headers: &HeaderMap, body: &[u8]) -> bool {
    if let Some(marker) = &state.user_agent_marker {
        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !user_agent.to_lowercase().contains(&marker.to_lowercase()) {
            return false;
        }
    }

    if let Some(token) = &state.signing_token {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_signature(token, body, signature) {
            return false;
        }
    }

    true
}

pub fn router(path: &str, state: WebhookState) -> Router {
    Router::new().route(path, post(handle_update)).with_state(state)
}

async fn handle_update(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    if !authorized(&state, &headers, &body) {
        warn!("Rejected unauthenticated webhook call");
        return (StatusCode::UNAUTHORIZED, "Unauthorized");
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(e) => {
            warn!("Malformed webhook body: {}", e);
            return (StatusCode::BAD_REQUEST, "Bad request");
        }
    };

    if update.update_type != "invoice_paid" {
        return (StatusCode::OK, "Ignored");
    }

    let Some(invoice) = update.payload else {
        return (StatusCode::BAD_REQUEST, "Bad request");
    };
    if invoice.status != "paid" {
        return (StatusCode::OK, "Not paid");
    }

    let Some((user_id, plan)) = invoice.payload.as_deref().and_then(parse_invoice_payload) else {
        warn!("Invoice {} has malformed payload {:?}", invoice.invoice_id, invoice.payload);
        return (StatusCode::BAD_REQUEST, "Bad payload");
    };

    let amount_rub = invoice
        .amount
        .as_deref()
        .and_then(|a| a.parse::<f64>().ok())
        .map(|a| a.round() as u32)
        .unwrap_or_else(|| state.prices.price(plan));

    let external_id = invoice.invoice_id.to_string();
    match state
        .db
        .settle(Provider::CryptoBot, &external_id, user_id, plan, amount_rub, Utc::now())
    {
        Ok(Settlement::Credited { subscription, .. }) => {
            let event = PaymentEvent::Credited {
                user_id,
                plan,
                subscription,
            };
            if state.events.send(event).is_err() {
                warn!("Payment notifier is gone; user {} will not be notified", user_id);
            }
            (StatusCode::OK, "OK")
        }
        Ok(Settlement::AlreadySettled) | Ok(Settlement::Unknown) => {
            info!(target: "payments", "Repeated delivery of invoice {}", external_id);
            (StatusCode::OK, "OK")
        }
        Err(e) => {
            error!("Failed to settle invoice {}: {}", external_id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Error")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_invoice_payload() {
        assert_eq!(parse_invoice_payload("123|30_days"), Some((123, Plan::Month)));
        assert_eq!(parse_invoice_payload("123|forever"), Some((123, Plan::Forever)));
        assert_eq!(parse_invoice_payload("123"), None);
        assert_eq!(parse_invoice_payload("abc|30_days"), None);
        assert_eq!(parse_invoice_payload("123|31_days"), None);
    }

    #[test]
    fn test_signature_roundtrip() {
        let body = br#"{"update_type":"invoice_paid"}"#;
        let signature = sign("123:token", body).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verify_signature("123:token", body, &signature));
        assert!(verify_signature("123:token", body, &signature.to_uppercase()));
        assert!(!verify_signature("123:other", body, &signature));
        assert!(!verify_signature("123:token", b"{}", &signature));
        assert!(!verify_signature("123:token", body, "zz"));
    }
}
