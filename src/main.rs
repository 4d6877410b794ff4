mod api;
mod config;
mod database;
mod middleware;
mod models;
mod services;
mod utils;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::database::{ClinicStore, MongoDB};
use crate::services::image_service::{CloudinaryClient, ImageHost};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("❌ {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    log::info!("🚀 Starting Clinic Booking Service...");

    // Initialize MongoDB connection
    let db = MongoDB::new(&config.database_url).await.map_err(|e| {
        log::error!("❌ Failed to connect to MongoDB: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;
    log::info!("✅ MongoDB connected successfully");

    let store: Arc<dyn ClinicStore> = Arc::new(db);

    // Existing ledgers predating slot rows get their rows before we accept bookings
    services::booking_service::reconcile_ledgers(store.as_ref()).await.map_err(|e| {
        log::error!("❌ Slot ledger reconciliation failed: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;
    log::info!("✅ Slot ledgers reconciled");

    let store_data: web::Data<dyn ClinicStore> = web::Data::from(store);
    let images: Arc<dyn ImageHost> = Arc::new(CloudinaryClient::new(config.cloudinary.clone()));
    let images_data: web::Data<dyn ImageHost> = web::Data::from(images);

    let host = config.host.clone();
    let port = config.port;
    let config_data = web::Data::new(config);

    log::info!("🌐 Server starting on {}:{}", host, port);
    log::info!("📚 Swagger UI available at: http://{}:{}/swagger-ui/", host, port);

    // Start HTTP server
    HttpServer::new(move || {
        let mut cors = Cors::default()
            .allowed_methods(vec!["GET", "POST", "PUT", "OPTIONS"])
            .allowed_headers(vec![
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::ACCEPT,
            ])
            .supports_credentials()
            .max_age(3600);
        for origin in &config_data.cors_origins {
            cors = cors.allowed_origin(origin);
        }

        // Generate OpenAPI specification
        let openapi = api::swagger::ApiDoc::openapi();

        App::new()
            .app_data(store_data.clone())
            .app_data(images_data.clone())
            .app_data(config_data.clone())
            .wrap(cors)
            .wrap(middleware::SecurityHeaders)
            .wrap(Logger::default())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi)
            )
            .route("/", web::get().to(api::health::index))
            .route("/health", web::get().to(api::health::health_check))
            .configure(api::admin::routes)
            .configure(api::doctor::routes)
            .configure(api::user::routes)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
