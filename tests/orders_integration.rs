use actix_web::test::TestRequest;
use actix_web::{test, web, App};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use training_store::api::auth::{generate_jwt, JwtMiddleware};
use training_store::api::orders::{get_order, update_order_status};
use training_store::models::ShippingAddress;
use training_store::{db, pricing};

mod support;

fn bearer(user_id: i32) -> String {
    let token = generate_jwt(support::TEST_JWT_SECRET, user_id).expect("jwt");
    format!("Bearer {token}")
}

async fn create_order(pool: &PgPool, user_id: i32, product_id: Uuid) -> Uuid {
    let products = db::find_active_products_by_ids(pool, &[product_id])
        .await
        .expect("resolve product");
    let cart = pricing::price_cart(&[(&products[0], 1)]);
    let address = ShippingAddress {
        name: "佐藤 花子".to_string(),
        postal_code: "150-0001".to_string(),
        address: "東京都渋谷区1-2-3".to_string(),
        phone: "090-1234-5678".to_string(),
    };
    db::create_order(pool, user_id, &address, &cart)
        .await
        .expect("create order")
}

macro_rules! orders_app {
    ($state:expr) => {
        test::init_service(
            App::new().app_data($state.clone()).service(
                web::scope("/api")
                    .wrap(JwtMiddleware)
                    .service(get_order)
                    .service(update_order_status),
            ),
        )
        .await
    };
}

#[actix_web::test]
async fn owner_reads_order_with_items_others_forbidden() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;

    let owner = support::insert_user(pool, "owner@example.com", "USER").await;
    let stranger = support::insert_user(pool, "stranger@example.com", "USER").await;
    let admin = support::insert_user(pool, "admin@example.com", "ADMIN").await;
    let product_id = support::insert_product(pool, "bcaa-supplement", 2980, 150).await;
    let order_id = create_order(pool, owner, product_id).await;

    let state = web::Data::new(support::build_state(pool.clone(), "http://127.0.0.1:9"));
    let app = orders_app!(state);

    let req = TestRequest::get()
        .uri(&format!("/api/orders/{order_id}"))
        .insert_header(("Authorization", bearer(owner)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["order"]["status"], "PENDING");
    assert_eq!(body["items"].as_array().map(|a| a.len()), Some(1));

    let req = TestRequest::get()
        .uri(&format!("/api/orders/{order_id}"))
        .insert_header(("Authorization", bearer(stranger)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 403);

    // admins can read any order
    let req = TestRequest::get()
        .uri(&format!("/api/orders/{order_id}"))
        .insert_header(("Authorization", bearer(admin)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
}

#[actix_web::test]
async fn admin_status_updates_follow_the_transition_table() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;

    let owner = support::insert_user(pool, "owner@example.com", "USER").await;
    let admin = support::insert_user(pool, "admin@example.com", "ADMIN").await;
    let product_id = support::insert_product(pool, "whey-protein-chocolate", 4980, 100).await;
    let order_id = create_order(pool, owner, product_id).await;

    // simulate a confirmed payment
    db::confirm_order_paid(pool, order_id, Some("pi_admin_1"))
        .await
        .expect("confirm");

    let state = web::Data::new(support::build_state(pool.clone(), "http://127.0.0.1:9"));
    let app = orders_app!(state);

    // skipping PROCESSING is not an allowed edge
    let req = TestRequest::put()
        .uri(&format!("/api/admin/orders/{order_id}"))
        .insert_header(("Authorization", bearer(admin)))
        .set_json(json!({ "status": "SHIPPED" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);

    for next in ["PROCESSING", "SHIPPED", "DELIVERED"] {
        let req = TestRequest::put()
            .uri(&format!("/api/admin/orders/{order_id}"))
            .insert_header(("Authorization", bearer(admin)))
            .set_json(json!({ "status": next }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success(), "transition to {next}");
    }

    // DELIVERED is terminal
    let req = TestRequest::put()
        .uri(&format!("/api/admin/orders/{order_id}"))
        .insert_header(("Authorization", bearer(admin)))
        .set_json(json!({ "status": "CANCELLED" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);
}

#[actix_web::test]
async fn non_admins_cannot_update_status() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;

    let owner = support::insert_user(pool, "owner@example.com", "USER").await;
    let product_id = support::insert_product(pool, "training-gloves", 1980, 50).await;
    let order_id = create_order(pool, owner, product_id).await;

    let state = web::Data::new(support::build_state(pool.clone(), "http://127.0.0.1:9"));
    let app = orders_app!(state);

    let req = TestRequest::put()
        .uri(&format!("/api/admin/orders/{order_id}"))
        .insert_header(("Authorization", bearer(owner)))
        .set_json(json!({ "status": "CANCELLED" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 403);
}
