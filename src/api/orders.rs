// src/api/orders.rs

use actix_web::{get, put, web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::OrderStatus;
use crate::{db, AppState};

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    tag = "orders",
    responses(
        (status = 200, description = "Order with its items"),
        (status = 403, description = "Not the order owner"),
        (status = 404, description = "Order not found")
    )
)]
#[get("/orders/{id}")]
pub async fn get_order(
    state: web::Data<AppState>,
    user_id: web::ReqData<i32>,
    path: web::Path<Uuid>,
) -> impl Responder {
    let order_id = path.into_inner();
    let user_id = *user_id;

    let order = match db::find_order(&state.pool, order_id).await {
        Ok(Some(order)) => order,
        Ok(None) => {
            return HttpResponse::NotFound().json(json!({ "error": "order not found" }));
        }
        Err(e) => {
            log::error!("get_order db error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    if order.user_id != user_id {
        let is_admin = match db::user_is_admin(&state.pool, user_id).await {
            Ok(v) => v,
            Err(e) => {
                log::error!("get_order role check error: {e}");
                return HttpResponse::InternalServerError().finish();
            }
        };
        if !is_admin {
            return HttpResponse::Forbidden().json(json!({ "error": "forbidden" }));
        }
    }

    let items = match db::list_order_items(&state.pool, order_id).await {
        Ok(items) => items,
        Err(e) => {
            log::error!("get_order items db error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    HttpResponse::Ok().json(json!({ "order": order, "items": items }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

/// Admin fulfillment progress. Only `status` moves here; `payment_status`
/// belongs to the notification handler alone. Writes outside the transition
/// table are rejected.
#[utoipa::path(
    put,
    path = "/api/admin/orders/{id}",
    tag = "orders",
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated"),
        (status = 400, description = "Transition not allowed"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Order not found")
    )
)]
#[put("/admin/orders/{id}")]
pub async fn update_order_status(
    state: web::Data<AppState>,
    user_id: web::ReqData<i32>,
    path: web::Path<Uuid>,
    payload: web::Json<UpdateStatusRequest>,
) -> impl Responder {
    let order_id = path.into_inner();

    match db::user_is_admin(&state.pool, *user_id).await {
        Ok(true) => {}
        Ok(false) => return HttpResponse::Forbidden().json(json!({ "error": "forbidden" })),
        Err(e) => {
            log::error!("update_order_status role check error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    }

    let order = match db::find_order(&state.pool, order_id).await {
        Ok(Some(order)) => order,
        Ok(None) => {
            return HttpResponse::NotFound().json(json!({ "error": "order not found" }));
        }
        Err(e) => {
            log::error!("update_order_status db error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let next = payload.status;
    if !order.status.can_transition_to(next) {
        return HttpResponse::BadRequest().json(json!({
            "error": format!("cannot transition from {} to {}", order.status, next)
        }));
    }

    match db::update_order_status(&state.pool, order_id, order.status, next).await {
        Ok(true) => HttpResponse::Ok().json(json!({ "id": order_id, "status": next })),
        // lost the race against a concurrent transition
        Ok(false) => HttpResponse::Conflict().json(json!({ "error": "order status changed" })),
        Err(e) => {
            log::error!("update_order_status db error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}
