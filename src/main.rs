use actix_web::{web, HttpServer};
use clap::Parser;
use tracing::{error, info};
use tumor_diagnosis::config::{ServeConfig, EXPECTED_NUM_FEATURES};
use tumor_diagnosis::inference::LoadedModel;
use tumor_diagnosis::{app, logging};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config = ServeConfig::parse();
    if let Err(e) = logging::init(&config.log_config()) {
        eprintln!("Logging unavailable, continuing without it: {}", e);
    }
    info!("=== APPLICATION STARTING ===");

    let model = match LoadedModel::load(&config.model_path, EXPECTED_NUM_FEATURES) {
        Ok(model) => model,
        Err(e) => {
            error!("Failed to load model from {}: {}", config.model_path.display(), e);
            return Err(std::io::Error::other(e));
        }
    };
    info!(
        "Model loaded successfully: {} ({}, {} features)",
        model.name(),
        model.family(),
        model.n_features()
    );
    let model = web::Data::new(model);

    let bind_address = config.bind_address();
    info!("Server running at http://{}", bind_address);

    let mut server = HttpServer::new(move || app(model.clone()));
    if let Some(workers) = config.workers {
        server = server.workers(workers);
    }
    server.bind(&bind_address)?.run().await
}
