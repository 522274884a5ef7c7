// src/main.rs

use std::env;
use std::sync::Arc;

use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use dotenvy::dotenv;
use sqlx::PgPool;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use talentgate::gateway::HttpPaymentGateway;
use talentgate::plans::PlanTable;
use talentgate::{api, docs, expiry, AppState};

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

    let merchant_id = env::var("MERCHANT_ID").expect("MERCHANT_ID required");
    let merchant_name =
        env::var("MERCHANT_NAME").unwrap_or_else(|_| "TalentGate Jobs".to_string());
    let merchant_secret = env::var("MERCHANT_SECRET").expect("MERCHANT_SECRET required");
    let notify_webhook_url = env::var("NOTIFY_WEBHOOK_URL").ok();

    let plans = PlanTable::from_env();
    let gateway = Arc::new(HttpPaymentGateway::from_env());

    // фоновая сверка просроченных подписок
    tokio::spawn(expiry::start_expiry_sweep(pool.clone(), plans.clone()));

    let state = web::Data::new(AppState {
        pool,
        plans,
        gateway,
        merchant_id,
        merchant_name,
        merchant_secret,
        notify_webhook_url,
    });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/", web::get().to(index))
            .service(
                SwaggerUi::new("/docs/{_:.*}")
                    .url("/api-docs/openapi.json", docs::ApiDoc::openapi()),
            )
            // Публичные роуты авторизации
            .service(api::auth::register)
            .service(api::auth::login)
            // Premium-операции, только под JWT
            .service(
                web::scope("/premium")
                    .wrap(api::auth::JwtMiddleware)
                    .service(api::premium::generate_qr)
                    .service(api::premium::verify_payment)
                    .service(api::premium::upgrade)
                    .service(api::premium::status)
                    .service(api::premium::cancel)
                    .service(api::premium::refund),
            )
    })
    .bind(("0.0.0.0", 8065))?
    .run()
    .await
}
