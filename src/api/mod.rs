pub mod auth;
pub mod checkout;
pub mod orders;
pub mod products;
pub mod stripe_client;
pub mod webhooks;
