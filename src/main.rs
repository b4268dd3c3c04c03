use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fundus_service_rs::{
    config::{ensure_model_exists, Config},
    create_app,
    handlers::AppState,
    model::ModelState,
    upload::UploadStore,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;

    // A failed fetch leaves the model unavailable; the server still starts.
    if let Err(e) = ensure_model_exists(&config).await {
        warn!(error = %e, "Model download failed");
    }

    let model = ModelState::load(
        &config.model_path,
        &config.model_input_op,
        &config.model_output_op,
    );

    tokio::fs::create_dir_all(&config.upload_dir).await?;

    let state = Arc::new(AppState {
        model,
        uploads: UploadStore::new(&config.upload_dir),
        index_path: config.index_path.clone(),
    });
    let app = create_app(state, config.body_limit_bytes);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
