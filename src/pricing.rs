// src/pricing.rs
//
// Totals are computed once at checkout and captured into the order;
// they are never recomputed from the live catalog afterwards.

use uuid::Uuid;

use crate::models::Product;

/// Consumption tax, percent of subtotal.
pub const TAX_RATE_PERCENT: i64 = 10;

/// Orders at or above this subtotal ship free.
pub const FREE_SHIPPING_THRESHOLD: i64 = 10_000;

/// Flat shipping fee below the threshold.
pub const FLAT_SHIPPING_FEE: i64 = 500;

/// One priced line of a cart: unit price and line subtotal frozen at the
/// moment of checkout.
#[derive(Debug, Clone)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub quantity: i32,
    pub unit_price: i64,
    pub subtotal: i64,
}

#[derive(Debug, Clone)]
pub struct PricedCart {
    pub lines: Vec<PricedLine>,
    pub subtotal: i64,
    pub tax: i64,
    pub shipping_fee: i64,
    pub total: i64,
}

/// 10% of `subtotal`, round-half-up on the smallest currency unit.
pub fn tax_for(subtotal: i64) -> i64 {
    (subtotal * TAX_RATE_PERCENT + 50) / 100
}

pub fn shipping_fee_for(subtotal: i64) -> i64 {
    if subtotal >= FREE_SHIPPING_THRESHOLD {
        0
    } else {
        FLAT_SHIPPING_FEE
    }
}

/// Prices a resolved cart using the live product prices at this instant.
/// Quantities are assumed already validated (>= 1).
pub fn price_cart(lines: &[(&Product, i32)]) -> PricedCart {
    let mut priced = Vec::with_capacity(lines.len());
    let mut subtotal: i64 = 0;

    for (product, quantity) in lines {
        let line_subtotal = product.price * i64::from(*quantity);
        subtotal += line_subtotal;
        priced.push(PricedLine {
            product_id: product.id,
            name: product.name.clone(),
            description: product.description.clone(),
            quantity: *quantity,
            unit_price: product.price,
            subtotal: line_subtotal,
        });
    }

    let tax = tax_for(subtotal);
    let shipping_fee = shipping_fee_for(subtotal);

    PricedCart {
        lines: priced,
        subtotal,
        tax,
        shipping_fee,
        total: subtotal + tax + shipping_fee,
    }
}
