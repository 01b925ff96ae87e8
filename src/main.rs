use reading_intake::config::IntakeConfig;
use reading_intake::error::ConfigError;
use reading_intake::routes::{AppState, intake_routes};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = IntakeConfig::from_env()?;

    eprintln!("🔮 Reading Intake v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.gemini.model);
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Sessions: {}", config.storage_dir.display());
    eprintln!("   Payment: {}", config.completion.payment_url);
    eprintln!("   API: http://0.0.0.0:{}/api/intake/sessions", config.port);

    tokio::fs::create_dir_all(&config.storage_dir)
        .await
        .map_err(ConfigError::Io)?;

    let state = AppState::from_config(&config).await?;
    let app = intake_routes(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "Intake server started");
    axum::serve(listener, app).await?;

    Ok(())
}
