use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::checkout::create_checkout_session,
        crate::api::products::list_products,
        crate::api::orders::get_order,
        crate::api::orders::update_order_status
    ),
    components(
        schemas(
            crate::api::auth::RegisterRequest,
            crate::api::auth::LoginRequest,
            crate::api::auth::AuthResponse,
            crate::api::checkout::CheckoutItem,
            crate::api::checkout::CheckoutRequest,
            crate::api::checkout::CheckoutResponse,
            crate::api::orders::UpdateStatusRequest,
            crate::models::Product,
            crate::models::Order,
            crate::models::OrderItem,
            crate::models::OrderStatus,
            crate::models::PaymentStatus,
            crate::models::ShippingAddress
        )
    ),
    tags(
        (name = "checkout", description = "Checkout initiation"),
        (name = "orders", description = "Order lifecycle"),
        (name = "products", description = "Catalog"),
        (name = "webhooks", description = "Payment provider notifications")
    )
)]
pub struct ApiDoc;
