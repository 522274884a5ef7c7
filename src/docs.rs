use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::auth::register,
        crate::api::auth::login,
        crate::api::premium::generate_qr,
        crate::api::premium::verify_payment,
        crate::api::premium::upgrade,
        crate::api::premium::status,
        crate::api::premium::cancel,
        crate::api::premium::refund
    ),
    components(
        schemas(
            crate::api::auth::RegisterRequest,
            crate::api::auth::LoginRequest,
            crate::api::auth::AuthResponse,
            crate::api::premium::GenerateQrRequest,
            crate::api::premium::VerifyPaymentRequest,
            crate::api::premium::UpgradeRequest,
            crate::api::premium::CancelRequest,
            crate::api::premium::RefundRequest,
            crate::models::PaymentRecord,
            crate::models::SubscriptionRecord,
            crate::models::RecruiterProfile
        )
    ),
    tags(
        (name = "auth", description = "Authentication"),
        (name = "premium", description = "Premium subscriptions and payments")
    )
)]
pub struct ApiDoc;
