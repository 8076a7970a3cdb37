use sqlx::PgPool;
use std::env;
use std::sync::OnceLock;
use tokio::sync::{Mutex, MutexGuard};

use training_store::api::webhooks::compute_signature;
use training_store::AppState;

fn split_db_url(url: &str) -> Result<(String, String), String> {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base.to_string(), Some(query)),
        None => (url.to_string(), None),
    };

    let db_start = base
        .rfind('/')
        .ok_or_else(|| "invalid database url".to_string())?;
    if db_start + 1 >= base.len() {
        return Err("database name is empty".to_string());
    }

    let db_name = base[db_start + 1..].to_string();
    let mut admin_url = format!("{}postgres", &base[..db_start + 1]);
    if let Some(query) = query {
        admin_url = format!("{admin_url}?{query}");
    }

    Ok((admin_url, db_name))
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

static TEST_DB_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub struct TestDb {
    pub pool: PgPool,
    _guard: MutexGuard<'static, ()>,
}

pub async fn init_test_db() -> TestDb {
    dotenvy::dotenv().ok();
    let test_url = env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let (admin_url, db_name) = split_db_url(&test_url).expect("invalid TEST_DATABASE_URL format");

    let lock = TEST_DB_LOCK.get_or_init(|| Mutex::new(()));
    let guard = lock.lock().await;

    let admin_pool = PgPool::connect(&admin_url).await.expect("connect admin db");

    let _ = sqlx::query("SELECT pg_advisory_lock(424242)")
        .execute(&admin_pool)
        .await;

    let quoted_name = quote_identifier(&db_name);
    let drop_sql = format!("DROP DATABASE IF EXISTS {quoted_name} WITH (FORCE)");
    let create_sql = format!("CREATE DATABASE {quoted_name}");

    let _ = sqlx::query(&drop_sql).execute(&admin_pool).await;
    let create_result = sqlx::query(&create_sql).execute(&admin_pool).await;
    if let Err(e) = create_result {
        eprintln!("create test db error: {e}");
        let _ = sqlx::query(&drop_sql).execute(&admin_pool).await;
        sqlx::query(&create_sql)
            .execute(&admin_pool)
            .await
            .expect("create test db retry");
    }

    let _ = sqlx::query("SELECT pg_advisory_unlock(424242)")
        .execute(&admin_pool)
        .await;

    admin_pool.close().await;

    let pool = PgPool::connect(&test_url).await.expect("connect test db");
    sqlx::migrate!().run(&pool).await.expect("migrations");
    TestDb {
        pool,
        _guard: guard,
    }
}

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test123secret456";
pub const TEST_JWT_SECRET: &str = "test-jwt-secret";

pub fn build_state(pool: PgPool, stripe_api_base: &str) -> AppState {
    AppState {
        pool,
        stripe_api_base: stripe_api_base.to_string(),
        stripe_secret_key: "sk_test_xxx".to_string(),
        stripe_webhook_secret: TEST_WEBHOOK_SECRET.to_string(),
        app_base_url: "http://localhost:3000".to_string(),
        jwt_secret: TEST_JWT_SECRET.to_string(),
    }
}

/// Builds a `Stripe-Signature` header value for the given raw body.
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    let timestamp = chrono::Utc::now().timestamp();
    let signature = compute_signature(secret, timestamp, body);
    format!("t={timestamp},v1={signature}")
}

pub async fn insert_user(pool: &PgPool, email: &str, role: &str) -> i32 {
    use sqlx::Row;
    sqlx::query(
        r#"INSERT INTO users (name, email, password_hash, role)
           VALUES ($1, $2, 'test-hash', $3)
           RETURNING id"#,
    )
    .bind("Test User")
    .bind(email)
    .bind(role)
    .fetch_one(pool)
    .await
    .expect("insert user")
    .get("id")
}

pub async fn insert_product(pool: &PgPool, slug: &str, price: i64, stock: i32) -> uuid::Uuid {
    use sqlx::Row;
    sqlx::query(
        r#"INSERT INTO products (slug, name, description, price, category, stock, is_active)
           VALUES ($1, $2, 'Test product', $3, 'SUPPLEMENT', $4, true)
           RETURNING id"#,
    )
    .bind(slug)
    .bind(format!("Product {slug}"))
    .bind(price)
    .bind(stock)
    .fetch_one(pool)
    .await
    .expect("insert product")
    .get("id")
}
