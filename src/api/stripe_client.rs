// src/api/stripe_client.rs
//
// Minimal client for Stripe hosted Checkout (POST /v1/checkout/sessions).
// Authorization: Bearer secret key. The API base is injectable so tests can
// point it at a stub.

use std::fmt;

use serde::Deserialize;

#[derive(Debug)]
pub enum StripeError {
    Http(reqwest::Error),
    Api { status: u16, body: String },
    InvalidResponse(String),
}

impl fmt::Display for StripeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StripeError::Http(e) => write!(f, "http error: {e}"),
            StripeError::Api { status, body } => {
                write!(f, "stripe api error status={status} body={body}")
            }
            StripeError::InvalidResponse(e) => write!(f, "invalid response: {e}"),
        }
    }
}

impl std::error::Error for StripeError {}

impl From<reqwest::Error> for StripeError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

/// One price line of the hosted session. Amounts are JPY smallest-unit.
#[derive(Debug, Clone)]
pub struct SessionLineItem {
    pub name: String,
    pub description: Option<String>,
    pub unit_amount: i64,
    pub quantity: i64,
}

#[derive(Debug)]
pub struct CreateSessionRequest {
    pub line_items: Vec<SessionLineItem>,
    pub success_url: String,
    pub cancel_url: String,
    /// Opaque correlation metadata echoed back in notifications.
    pub order_id: String,
    pub user_id: String,
    pub customer_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSessionResponse {
    pub id: String,
    pub url: Option<String>,
    pub payment_intent: Option<String>,
}

/// Stripe takes form-encoded bodies with bracketed array/map keys.
fn session_form_params(req: &CreateSessionRequest) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = vec![
        ("mode".into(), "payment".into()),
        ("payment_method_types[0]".into(), "card".into()),
        ("success_url".into(), req.success_url.clone()),
        ("cancel_url".into(), req.cancel_url.clone()),
        ("client_reference_id".into(), req.order_id.clone()),
        ("metadata[order_id]".into(), req.order_id.clone()),
        ("metadata[user_id]".into(), req.user_id.clone()),
    ];

    if let Some(email) = &req.customer_email {
        params.push(("customer_email".into(), email.clone()));
    }

    for (i, item) in req.line_items.iter().enumerate() {
        params.push((
            format!("line_items[{i}][price_data][currency]"),
            "jpy".into(),
        ));
        params.push((
            format!("line_items[{i}][price_data][product_data][name]"),
            item.name.clone(),
        ));
        if let Some(description) = &item.description {
            params.push((
                format!("line_items[{i}][price_data][product_data][description]"),
                description.clone(),
            ));
        }
        params.push((
            format!("line_items[{i}][price_data][unit_amount]"),
            item.unit_amount.to_string(),
        ));
        params.push((format!("line_items[{i}][quantity]"), item.quantity.to_string()));
    }

    params
}

pub async fn create_checkout_session(
    api_base: &str,
    secret_key: &str,
    req: CreateSessionRequest,
) -> Result<CheckoutSessionResponse, StripeError> {
    let client = reqwest::Client::new();
    let params = session_form_params(&req);

    let resp = client
        .post(format!("{api_base}/v1/checkout/sessions"))
        .bearer_auth(secret_key)
        .form(&params)
        .send()
        .await?;

    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        return Err(StripeError::Api {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str::<CheckoutSessionResponse>(&body)
        .map_err(|e| StripeError::InvalidResponse(format!("{e}; body={body}")))
}
