mod advice;
mod app;
mod auth;
mod chat;
mod clients;
mod config;
mod error;
mod extract;
mod goals;
mod images;
mod medical;
mod nutrition;
mod payments;
mod profiles;
mod scans;
mod state;
mod storage;
mod stories;
mod translate;

#[cfg(test)]
mod testing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "nutriscan=debug,axum=info,tower_http=info".to_string());
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

    let app_state = state::AppState::init().await?;

    sqlx::migrate!("./migrations").run(&app_state.db).await?;
    tracing::info!("database migrations applied");

    let bind_addr = app_state.config.bind_addr.clone();
    app::serve(app::build_app(app_state), &bind_addr).await
}
