// src/api/checkout.rs

use std::collections::HashSet;

use actix_web::{post, web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::stripe_client::{self, CreateSessionRequest, SessionLineItem};
use crate::models::{Product, ShippingAddress};
use crate::{db, pricing, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutItem {
    #[serde(rename = "productId")]
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub items: Vec<CheckoutItem>,
    #[serde(rename = "shippingAddress")]
    pub shipping_address: ShippingAddress,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub url: Option<String>,
    #[serde(rename = "orderId")]
    pub order_id: Uuid,
}

/// Input-shape validation; business rules (product existence, stock) are
/// checked against the database afterwards.
pub fn validate_request(req: &CheckoutRequest) -> Result<(), String> {
    if req.items.is_empty() {
        return Err("at least one item is required".to_string());
    }
    for item in &req.items {
        if item.quantity < 1 {
            return Err("item quantity must be at least 1".to_string());
        }
    }

    let address = &req.shipping_address;
    if address.name.trim().is_empty()
        || address.postal_code.trim().is_empty()
        || address.address.trim().is_empty()
        || address.phone.trim().is_empty()
    {
        return Err("all shipping address fields are required".to_string());
    }

    Ok(())
}

/// Advisory stock check. Not a reservation: enforcement happens at
/// confirmation time when stock is actually decremented.
fn first_out_of_stock<'a>(lines: &[(&'a Product, i32)]) -> Option<&'a Product> {
    lines
        .iter()
        .find(|(product, quantity)| *quantity > product.stock)
        .map(|(product, _)| *product)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[utoipa::path(
    post,
    path = "/api/checkout/session",
    tag = "checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Order created and payment session opened", body = CheckoutResponse),
        (status = 400, description = "Validation, product or stock error"),
        (status = 401, description = "Not authenticated"),
        (status = 500, description = "Provider or storage failure")
    )
)]
#[post("/checkout/session")]
pub async fn create_checkout_session(
    state: web::Data<AppState>,
    user_id: web::ReqData<i32>,
    payload: web::Json<CheckoutRequest>,
) -> impl Responder {
    let user_id = *user_id;
    let payload = payload.into_inner();

    if let Err(msg) = validate_request(&payload) {
        return HttpResponse::BadRequest().json(json!({ "error": msg }));
    }

    // 1) resolve the referenced products, active only
    let requested_ids: Vec<Uuid> = payload
        .items
        .iter()
        .map(|i| i.product_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let products = match db::find_active_products_by_ids(&state.pool, &requested_ids).await {
        Ok(p) => p,
        Err(e) => {
            log::error!("checkout resolve products error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    if products.len() != requested_ids.len() {
        return HttpResponse::BadRequest().json(json!({
            "error": "some products could not be found"
        }));
    }

    let lines: Vec<(&Product, i32)> = payload
        .items
        .iter()
        .filter_map(|item| {
            products
                .iter()
                .find(|p| p.id == item.product_id)
                .map(|p| (p, item.quantity))
        })
        .collect();

    // 2) advisory stock check
    if let Some(product) = first_out_of_stock(&lines) {
        return HttpResponse::BadRequest().json(json!({
            "error": format!("insufficient stock for {}", product.name)
        }));
    }

    // 3) freeze prices and totals
    let cart = pricing::price_cart(&lines);

    // 4) durable order first, so the session can reference it
    let order_id = match db::create_order(&state.pool, user_id, &payload.shipping_address, &cart)
        .await
    {
        Ok(id) => id,
        Err(e) => {
            log::error!("checkout create order error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let customer_email = match db::find_user_email(&state.pool, user_id).await {
        Ok(email) => email,
        Err(e) => {
            log::warn!("checkout select user email error: {e}");
            None
        }
    };

    // 5) hosted payment session, one price line per item plus shipping
    let mut line_items: Vec<SessionLineItem> = cart
        .lines
        .iter()
        .map(|line| SessionLineItem {
            name: line.name.clone(),
            description: line.description.as_deref().map(|d| truncate_chars(d, 200)),
            unit_amount: line.unit_price,
            quantity: i64::from(line.quantity),
        })
        .collect();

    if cart.shipping_fee > 0 {
        line_items.push(SessionLineItem {
            name: "配送料".to_string(),
            description: None,
            unit_amount: cart.shipping_fee,
            quantity: 1,
        });
    }

    let session = match stripe_client::create_checkout_session(
        &state.stripe_api_base,
        &state.stripe_secret_key,
        CreateSessionRequest {
            line_items,
            success_url: format!(
                "{}/checkout/success?session_id={{CHECKOUT_SESSION_ID}}",
                state.app_base_url
            ),
            cancel_url: format!("{}/checkout/cancel", state.app_base_url),
            order_id: order_id.to_string(),
            user_id: user_id.to_string(),
            customer_email,
        },
    )
    .await
    {
        Ok(s) => s,
        Err(e) => {
            // The PENDING/PENDING order stays behind without an intent ref.
            // Recoverable dangling state, not rolled back.
            log::error!("stripe session create failed for order {order_id}: {e}");
            return HttpResponse::InternalServerError().json(json!({
                "error": "failed to create checkout session"
            }));
        }
    };

    if let Some(payment_intent) = session.payment_intent.as_deref() {
        if let Err(e) = db::set_payment_intent(&state.pool, order_id, payment_intent).await {
            log::error!("checkout attach payment intent error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    }

    HttpResponse::Ok().json(CheckoutResponse {
        session_id: session.id,
        url: session.url,
        order_id,
    })
}
