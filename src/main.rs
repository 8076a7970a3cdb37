// src/main.rs
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use dotenvy::dotenv;
use sqlx::PgPool;
use std::env;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use training_store::{api, docs, AppState};

const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";

async fn index() -> impl Responder {
    HttpResponse::Ok().body("Service ready!")
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let stripe_secret_key = env::var("STRIPE_SECRET_KEY").expect("STRIPE_SECRET_KEY required");
    let stripe_webhook_secret =
        env::var("STRIPE_WEBHOOK_SECRET").expect("STRIPE_WEBHOOK_SECRET required");
    let stripe_api_base =
        env::var("STRIPE_API_BASE").unwrap_or_else(|_| DEFAULT_STRIPE_API_BASE.to_string());
    let app_base_url =
        env::var("APP_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET required");

    let state = web::Data::new(AppState {
        pool,
        stripe_api_base,
        stripe_secret_key,
        stripe_webhook_secret,
        app_base_url,
        jwt_secret,
    });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/", web::get().to(index))
            .service(
                SwaggerUi::new("/docs/{_:.*}")
                    .url("/api-docs/openapi.json", docs::ApiDoc::openapi()),
            )
            // public auth routes
            .service(api::auth::register)
            .service(api::auth::login)
            // authenticated routes
            .service(
                web::scope("/api")
                    .wrap(api::auth::JwtMiddleware)
                    .service(api::products::list_products)
                    .service(api::checkout::create_checkout_session)
                    .service(api::orders::get_order)
                    .service(api::orders::update_order_status),
            )
            // provider notifications (public, signature-verified)
            .service(api::webhooks::stripe_webhook)
    })
    .bind(("0.0.0.0", 8080))?
    .run()
    .await
}
