use dotenvy::dotenv;
use log::{info, warn};
use std::sync::Arc;
use tower_cookies::CookieManagerLayer;
use tower_http::cors::CorsLayer;

use estateserver::api_router::configure_api_routes;
use estateserver::auth::authentication_middleware;
use estateserver::config::AppConfig;
use estateserver::documents::init_drive;
use estateserver::shared::state::AppState;
use estateserver::shared::utils::create_conn;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = AppConfig::from_env()?;

    let pool = create_conn(&config.database_url())?;
    info!("database pool ready");

    let drive = if config.drive.access_key.is_empty() {
        warn!("document storage not configured, uploads disabled");
        None
    } else {
        match init_drive(&config.drive).await {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("document storage unavailable: {e}");
                None
            }
        }
    };

    let state = Arc::new(AppState::new(pool, config.clone(), drive));

    let app = configure_api_routes()
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            authentication_middleware,
        ))
        .layer(CookieManagerLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
