pub mod api;
pub mod db;
pub mod docs;
pub mod models;
pub mod pricing;

use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub stripe_api_base: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub app_base_url: String,
    pub jwt_secret: String,
}
