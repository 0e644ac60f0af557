// src/main.rs
use actix_web::{App, HttpServer, middleware};
use log::{info, warn};

use plant_vision::config::AppConfig;
use plant_vision::{AppState, configure, cors_headers};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting plant-vision service...");

    let config = AppConfig::from_env()?;
    let app_state = AppState::from_config(&config);

    if app_state.normalizer.is_configured() {
        info!("Vision provider: {}", config.vision.provider);
    } else {
        warn!(
            "No API key configured for vision provider {}; analysis requests will fail",
            config.vision.provider
        );
    }

    info!("Starting HTTP server on {}", config.server.bind_addr);

    HttpServer::new(move || {
        App::new()
            .wrap(cors_headers())
            .wrap(middleware::Logger::default())
            .configure(configure(app_state.clone()))
    })
    .bind(&config.server.bind_addr)?
    .run()
    .await?;

    Ok(())
}
