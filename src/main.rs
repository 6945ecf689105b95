use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use course_server::{
    AppState,
    ai::{GeminiClient, RetryConfig},
    auth::JwtKeys,
    build_router, config, db,
    utils::init_log,
};
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to database file
    #[arg(short, long, default_value = "./database/course.db")]
    database: PathBuf,

    /// Listen address
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Listen port
    #[arg(short, long, default_value = "8000")]
    port: u16,

    /// Log directory; logs go to stdout when unset
    #[arg(short, long)]
    log: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let _guard = init_log(args.log.clone());
    let config = config::Config::from_env()?;

    if let Some(dir) = args.database.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let database = db::connect(&args.database).await?;
    db::init_schema(&database).await?;

    let model = GeminiClient::new(config.gemini, RetryConfig::default())?;
    let state = AppState::new(
        database,
        Arc::new(model),
        JwtKeys::new(config.secret_key.as_bytes()),
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind((args.host.as_str(), args.port)).await?;
    info!("Starting server at http://{}:{}", args.host, args.port);
    info!(
        "Swagger UI available at http://{}:{}/swagger-ui",
        args.host, args.port
    );
    axum::serve(listener, app).await?;

    Ok(())
}
