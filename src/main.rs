mod api;
mod config;
mod database;
mod events;
mod middleware;
mod models;
mod questionnaires;
mod services;
mod state;
mod utils;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::ServerConfig;
use crate::middleware::AuthMiddleware;
use crate::services::notification_service::LoggingPushAdapter;
use crate::services::storage_service::LocalFileStorage;
use crate::state::AppContext;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = ServerConfig::from_env().map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    log::info!("🚀 Starting Phoenix Platform...");
    log::info!("📊 Database: {}", config.mongodb_database);

    // Initialize MongoDB connection
    let db = database::MongoDB::new(&config.mongodb_uri, &config.mongodb_database)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    log::info!("✅ MongoDB connected successfully");

    let storage = Arc::new(LocalFileStorage::new(&config.storage.root));
    log::info!("🗄️  File storage root: {}", config.storage.root);

    let host = config.host.clone();
    let port = config.port;
    let cors_origins = config.cors_allowed_origins.clone();
    let max_file_size = config.storage.max_file_size;

    let ctx = web::Data::new(AppContext::new(db, config, storage, Arc::new(LoggingPushAdapter)));

    log::info!("🌐 Server starting on {}:{}", host, port);
    log::info!("📚 Swagger UI available at: http://{}:{}/swagger-ui/", host, port);
    log::info!("📄 OpenAPI spec at: http://{}:{}/api-docs/openapi.json", host, port);

    // Start HTTP server
    HttpServer::new(move || {
        let cors = cors_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::ACCEPT,
                actix_web::http::header::CACHE_CONTROL,
            ])
            .allowed_header(api::identity_verification::WEBHOOK_TOKEN_HEADER)
            .expose_headers(vec![
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::CONTENT_DISPOSITION,
            ])
            .supports_credentials()
            .max_age(3600);

        // Generate OpenAPI specification
        let openapi = api::swagger::ApiDoc::openapi();

        App::new()
            .app_data(ctx.clone())
            .app_data(api::storage::payload_config(max_file_size))
            .wrap(cors)
            .wrap(middleware::SecurityHeaders)
            .wrap(Logger::default())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
            // Health check
            .route("/health", web::get().to(api::health::health_check))
            // Metrics
            .route("/metrics", web::get().to(api::metrics::get_metrics))

            // ==================== AUTH ====================
            .service(
                web::scope("/api/auth/v1")
                    .route("/signup", web::post().to(api::auth::sign_up))
                    .route("/signin", web::post().to(api::auth::sign_in))
                    .route("/refreshtoken", web::post().to(api::auth::refresh_token))
                    .service(
                        web::resource("/signout")
                            .wrap(AuthMiddleware)
                            .route(web::post().to(api::auth::sign_out))
                    )
                    .service(
                        web::resource("/authprofile")
                            .wrap(AuthMiddleware)
                            .route(web::get().to(api::auth::auth_profile))
                    )
                    .service(
                        web::resource("/user/{user_id}/sessions")
                            .wrap(AuthMiddleware)
                            .route(web::get().to(api::auth::retrieve_sessions))
                    )
                    .service(
                        web::resource("/user/{user_id}")
                            .wrap(AuthMiddleware)
                            .route(web::delete().to(api::auth::delete_user))
                    )
            )

            // ==================== INBOX ====================
            .service(
                web::scope("/api/inbox/v1beta")
                    .wrap(AuthMiddleware)
                    .route("/user/{user_id}/message/send", web::post().to(api::inbox::send_message))
                    .route("/user/{user_id}/message/search", web::post().to(api::inbox::search_messages))
                    .route("/user/{user_id}/message/summary/search", web::post().to(api::inbox::search_summary))
                    .route("/user/{user_id}/message/unread", web::get().to(api::inbox::unread_count))
                    .route("/message/confirm", web::post().to(api::inbox::confirm_messages))
                    .route("/message/send", web::post().to(api::inbox::send_message_to_user_list))
            )

            // ==================== STORAGE ====================
            .service(
                web::scope("/api/storage/v1beta")
                    .wrap(AuthMiddleware)
                    .route("/upload/{bucket}", web::post().to(api::storage::upload_to_bucket))
                    .route("/download/{bucket}/{filename:.*}", web::get().to(api::storage::download_from_bucket))
                    .route("/signed/url/{bucket}/{filename:.*}", web::get().to(api::storage::signed_url_for_bucket))
            )
            .service(
                web::scope("/api/storage/v1")
                    // Public: the token itself is the credential
                    .route("/signed/{token}", web::get().to(api::storage::download_signed))
                    .service(
                        web::resource("/upload")
                            .wrap(AuthMiddleware)
                            .route(web::post().to(api::storage::upload_file))
                    )
                    .service(
                        web::resource("/download/{file_id}")
                            .wrap(AuthMiddleware)
                            .route(web::get().to(api::storage::download_file))
                    )
                    .service(
                        web::resource("/signed/url/{file_id}")
                            .wrap(AuthMiddleware)
                            .route(web::get().to(api::storage::retrieve_signed_url))
                    )
            )

            // ==================== NOTIFICATIONS ====================
            .service(
                web::scope("/api/notification/v1beta")
                    .wrap(AuthMiddleware)
                    .route("/device/register", web::post().to(api::notification::register_device))
                    .route("/device/unregister", web::delete().to(api::notification::unregister_device))
                    .route("/device", web::get().to(api::notification::retrieve_devices))
            )

            // ==================== IDENTITY VERIFICATION ====================
            .service(
                web::scope("/api/extensions/v1/identity-verification")
                    // Provider callback, guarded by X-Webhook-Token
                    .route("/callback", web::post().to(api::identity_verification::verification_callback))
                    .service(
                        web::resource("/user/{user_id}/applicant")
                            .wrap(AuthMiddleware)
                            .route(web::post().to(api::identity_verification::register_applicant))
                    )
                    .service(
                        web::resource("/user/{user_id}/verification-log")
                            .wrap(AuthMiddleware)
                            .route(web::get().to(api::identity_verification::retrieve_verification_log))
                    )
            )

            // ==================== EXTENSIONS ====================
            .service(
                web::scope("/api/extensions/v1beta")
                    .wrap(AuthMiddleware)
                    .route("/roles", web::get().to(api::user::list_default_roles))
                    // Module results (before the generic /user/{user_id} routes)
                    .route(
                        "/user/{user_id}/module-result/{module_id}",
                        web::post().to(api::module_result::submit_module_result),
                    )
                    .route(
                        "/user/{user_id}/module-result/{module_id}",
                        web::get().to(api::module_result::retrieve_module_results),
                    )
                    .route("/user/{user_id}/add-role", web::post().to(api::user::add_role))
                    .route("/user/{user_id}", web::get().to(api::user::retrieve_profile))
                    .route("/user/{user_id}", web::post().to(api::user::update_profile))
                    // Deployments
                    .route("/deployment", web::post().to(api::deployment::create_deployment))
                    .route("/deployment/search", web::post().to(api::deployment::search_deployments))
                    .route("/deployment/{deployment_id}", web::get().to(api::deployment::retrieve_deployment))
                    .route("/deployment/{deployment_id}", web::put().to(api::deployment::update_deployment))
                    .route("/deployment/{deployment_id}", web::delete().to(api::deployment::delete_deployment))
                    .route(
                        "/deployment/{deployment_id}/module-config",
                        web::post().to(api::deployment::create_or_update_module_config),
                    )
                    .route(
                        "/deployment/{deployment_id}/module-config",
                        web::put().to(api::deployment::create_or_update_module_config),
                    )
                    .route(
                        "/deployment/{deployment_id}/module-config/{module_config_id}",
                        web::delete().to(api::deployment::delete_module_config),
                    )
                    .route("/deployment/{deployment_id}/role", web::put().to(api::deployment::create_or_update_roles))
                    // Organizations
                    .route("/organization", web::post().to(api::organization::create_organization))
                    .route("/organization/search", web::post().to(api::organization::search_organizations))
                    .route("/organization/{organization_id}", web::get().to(api::organization::retrieve_organization))
                    .route("/organization/{organization_id}", web::put().to(api::organization::update_organization))
                    .route("/organization/{organization_id}", web::delete().to(api::organization::delete_organization))
                    .route(
                        "/organization/{organization_id}/link-deployment",
                        web::post().to(api::organization::link_deployment),
                    )
                    .route(
                        "/organization/{organization_id}/deployment/{deployment_id}",
                        web::delete().to(api::organization::unlink_deployment),
                    )
                    .route(
                        "/organization/{organization_id}/role",
                        web::put().to(api::organization::create_or_update_roles),
                    )
            )
    })
    .bind(format!("{}:{}", host, port))?
    .run()
    .await
}
