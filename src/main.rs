use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use std::sync::Arc;

mod api;
mod config;
mod db;
mod error;
mod services;
mod storage;

use db::repository::PgVideoRepository;
use services::auth::JwtKeys;
use services::upload::SpoolSettings;
use services::VideoService;
use storage::{ObjectStore, S3ObjectStore};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = config::AppConfig::new().context("failed to load configuration")?;
    if config.auth.jwt_secret == config::DEV_JWT_SECRET {
        log::warn!("Using the development JWT secret; set APP__AUTH__JWT_SECRET in production");
    }

    tokio::fs::create_dir_all(&config.storage.upload_path)
        .await
        .with_context(|| format!("failed to create {}", config.storage.upload_path))?;

    let pool = db::create_pool(&config.database).context("failed to build database pool")?;

    let store = S3ObjectStore::connect(&config.object_store).await;
    store
        .ensure_bucket()
        .await
        .with_context(|| format!("bucket {} is not usable", config.object_store.bucket))?;

    let video_service = web::Data::new(VideoService::new(
        Arc::new(PgVideoRepository::new(pool.clone())),
        Arc::new(store),
        SpoolSettings::from(&config.storage),
    ));
    let keys = web::Data::new(JwtKeys::new(&config.auth));
    let pool = web::Data::new(pool);

    log::info!(
        "Starting server on {}:{}",
        config.server.host,
        config.server.port
    );

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(actix_cors::Cors::permissive())
            .app_data(pool.clone())
            .app_data(keys.clone())
            .app_data(video_service.clone())
            .configure(api::configure)
    })
    .bind((config.server.host.clone(), config.server.port))?
    .run()
    .await?;

    Ok(())
}
