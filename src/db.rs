// src/db.rs

use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{Order, OrderItem, OrderStatus, PaymentStatus, Product, ShippingAddress};
use crate::pricing::PricedCart;

fn product_from_row(r: sqlx::postgres::PgRow) -> Product {
    Product {
        id: r.get("id"),
        slug: r.get("slug"),
        name: r.get("name"),
        description: r.get("description"),
        price: r.get("price"),
        category: r.get("category"),
        stock: r.get("stock"),
        is_active: r.get("is_active"),
        created_at: r.get("created_at"),
    }
}

fn order_from_row(r: &sqlx::postgres::PgRow) -> Result<Order, sqlx::Error> {
    let status: String = r.get("status");
    let payment_status: String = r.get("payment_status");

    Ok(Order {
        id: r.get("id"),
        user_id: r.get("user_id"),
        subtotal: r.get("subtotal"),
        tax: r.get("tax"),
        shipping_fee: r.get("shipping_fee"),
        total: r.get("total"),
        status: status
            .parse::<OrderStatus>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        payment_status: payment_status
            .parse::<PaymentStatus>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        shipping_address: ShippingAddress {
            name: r.get("shipping_name"),
            postal_code: r.get("shipping_postal_code"),
            address: r.get("shipping_address"),
            phone: r.get("shipping_phone"),
        },
        stripe_payment_intent_id: r.get("stripe_payment_intent_id"),
        stripe_charge_id: r.get("stripe_charge_id"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

pub async fn list_active_products(pool: &PgPool) -> Result<Vec<Product>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT id, slug, name, description, price, category, stock, is_active, created_at
           FROM products
           WHERE is_active = true
           ORDER BY price ASC"#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(product_from_row).collect())
}

/// Resolves the products referenced by a cart. Deactivated or nonexistent
/// ids are simply absent from the result; the caller compares counts.
pub async fn find_active_products_by_ids(
    pool: &PgPool,
    ids: &[Uuid],
) -> Result<Vec<Product>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT id, slug, name, description, price, category, stock, is_active, created_at
           FROM products
           WHERE id = ANY($1) AND is_active = true"#,
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(product_from_row).collect())
}

/// Creates the order row and its items in one transaction, PENDING/PENDING.
/// This happens before the external session request so the session can carry
/// the order id as metadata.
pub async fn create_order(
    pool: &PgPool,
    user_id: i32,
    address: &ShippingAddress,
    cart: &PricedCart,
) -> Result<Uuid, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        r#"INSERT INTO orders
               (user_id, subtotal, tax, shipping_fee, total, status, payment_status,
                shipping_name, shipping_postal_code, shipping_address, shipping_phone)
           VALUES ($1, $2, $3, $4, $5, 'PENDING', 'PENDING', $6, $7, $8, $9)
           RETURNING id"#,
    )
    .bind(user_id)
    .bind(cart.subtotal)
    .bind(cart.tax)
    .bind(cart.shipping_fee)
    .bind(cart.total)
    .bind(&address.name)
    .bind(&address.postal_code)
    .bind(&address.address)
    .bind(&address.phone)
    .fetch_one(&mut *tx)
    .await?;

    let order_id: Uuid = row.get("id");

    for line in &cart.lines {
        sqlx::query(
            r#"INSERT INTO order_items (order_id, product_id, quantity, price, subtotal)
               VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(order_id)
        .bind(line.product_id)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.subtotal)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(order_id)
}

/// Attaches the payment-intent reference once, right after session creation.
/// The only post-creation write the checkout path is allowed to make.
pub async fn set_payment_intent(
    pool: &PgPool,
    order_id: Uuid,
    payment_intent_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE orders
           SET stripe_payment_intent_id = $1, updated_at = NOW()
           WHERE id = $2"#,
    )
    .bind(payment_intent_id)
    .bind(order_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_order(pool: &PgPool, order_id: Uuid) -> Result<Option<Order>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT id, user_id, subtotal, tax, shipping_fee, total, status, payment_status,
                  shipping_name, shipping_postal_code, shipping_address, shipping_phone,
                  stripe_payment_intent_id, stripe_charge_id, created_at, updated_at
           FROM orders
           WHERE id = $1"#,
    )
    .bind(order_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(order_from_row).transpose()
}

pub async fn list_order_items(
    pool: &PgPool,
    order_id: Uuid,
) -> Result<Vec<OrderItem>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT id, order_id, product_id, quantity, price, subtotal
           FROM order_items
           WHERE order_id = $1
           ORDER BY id ASC"#,
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| OrderItem {
            id: r.get("id"),
            order_id: r.get("order_id"),
            product_id: r.get("product_id"),
            quantity: r.get("quantity"),
            price: r.get("price"),
            subtotal: r.get("subtotal"),
        })
        .collect())
}

/// Applies the `checkout.session.completed` transition: PENDING -> CONFIRMED,
/// payment PAID, stock decremented for every line. The conditional UPDATE and
/// the decrements commit together; a replayed notification sees a non-PENDING
/// status, updates zero rows and decrements nothing.
///
/// Returns `true` when the transition applied, `false` on the idempotent path.
pub async fn confirm_order_paid(
    pool: &PgPool,
    order_id: Uuid,
    payment_intent_id: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    // Row lock on the order serializes racing notifications for it.
    let updated = sqlx::query(
        r#"UPDATE orders
           SET status = 'CONFIRMED',
               payment_status = 'PAID',
               stripe_payment_intent_id = COALESCE($2, stripe_payment_intent_id),
               updated_at = NOW()
           WHERE id = $1 AND status = 'PENDING'
           RETURNING id"#,
    )
    .bind(order_id)
    .bind(payment_intent_id)
    .fetch_optional(&mut *tx)
    .await?;

    if updated.is_none() {
        tx.rollback().await?;
        return Ok(false);
    }

    // Quantities are summed per product first: with a bare join, Postgres
    // applies only one matching order_items row per target row, which would
    // under-decrement carts holding duplicate lines for the same product.
    sqlx::query(
        r#"UPDATE products p
           SET stock = p.stock - oi.quantity, updated_at = NOW()
           FROM (SELECT product_id, SUM(quantity)::int AS quantity
                 FROM order_items
                 WHERE order_id = $1
                 GROUP BY product_id) oi
           WHERE oi.product_id = p.id"#,
    )
    .bind(order_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(true)
}

/// `payment_intent.succeeded`: settle payment for the matching order.
/// Guarded so PAID/FAILED are never overwritten. Returns the order id when
/// the transition applied.
pub async fn mark_payment_paid_by_intent(
    pool: &PgPool,
    payment_intent_id: &str,
) -> Result<Option<Uuid>, sqlx::Error> {
    let row = sqlx::query(
        r#"UPDATE orders
           SET payment_status = 'PAID', updated_at = NOW()
           WHERE stripe_payment_intent_id = $1 AND payment_status = 'PENDING'
           RETURNING id"#,
    )
    .bind(payment_intent_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.get("id")))
}

/// `payment_intent.payment_failed`: payment FAILED and order CANCELLED, but
/// only while fulfillment has not progressed past CONFIRMED. A late failure
/// event never cancels a shipped or delivered order.
pub async fn mark_payment_failed_by_intent(
    pool: &PgPool,
    payment_intent_id: &str,
) -> Result<Option<Uuid>, sqlx::Error> {
    let row = sqlx::query(
        r#"UPDATE orders
           SET payment_status = 'FAILED', status = 'CANCELLED', updated_at = NOW()
           WHERE stripe_payment_intent_id = $1
             AND payment_status = 'PENDING'
             AND status IN ('PENDING', 'CONFIRMED')
           RETURNING id"#,
    )
    .bind(payment_intent_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.get("id")))
}

/// `charge.succeeded`: store the charge reference, first write wins.
pub async fn attach_charge_by_intent(
    pool: &PgPool,
    payment_intent_id: &str,
    charge_id: &str,
) -> Result<Option<Uuid>, sqlx::Error> {
    let row = sqlx::query(
        r#"UPDATE orders
           SET stripe_charge_id = $2, updated_at = NOW()
           WHERE stripe_payment_intent_id = $1 AND stripe_charge_id IS NULL
           RETURNING id"#,
    )
    .bind(payment_intent_id)
    .bind(charge_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.get("id")))
}

/// Admin fulfillment progress. Optimistic guard on the current status so a
/// concurrent transition does not get silently overwritten.
pub async fn update_order_status(
    pool: &PgPool,
    order_id: Uuid,
    from: OrderStatus,
    to: OrderStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE orders
           SET status = $3, updated_at = NOW()
           WHERE id = $1 AND status = $2"#,
    )
    .bind(order_id)
    .bind(from.as_str())
    .bind(to.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn find_user_email(pool: &PgPool, user_id: i32) -> Result<Option<String>, sqlx::Error> {
    let row = sqlx::query("SELECT email FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.get("email")))
}

pub async fn user_is_admin(pool: &PgPool, user_id: i32) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT role FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.get::<String, _>("role") == "ADMIN").unwrap_or(false))
}
