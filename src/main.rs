mod app;
mod appointments;
mod clock;
mod config;
mod db;
mod dto;
mod error;
mod extract;
mod memory;
mod patients;
mod professionals;
mod rules;
mod state;
mod validation;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "clinic_scheduler=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let state = state::AppState::init().await?;
    tracing::info!(storage = ?state.config.storage, "clinic scheduler starting");

    let router = app::build_app(state.clone());
    app::serve(router, &state).await
}
