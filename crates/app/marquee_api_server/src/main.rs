//! Marquee API server binary.
//!
//! Connects to PostgreSQL, applies migrations and serves the JSON API until
//! SIGINT or SIGTERM, then shuts down within the drain deadline.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use marquee_api::config::{ApiConfig, Environment};
use marquee_core::clock::SystemClock;
use marquee_core::mailer::LogMailer;
use marquee_core::ratelimit::LimiterConfig;
use marquee_core::shutdown::ShutdownCoordinator;
use marquee_core::store::Stores;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// CLI arguments. Every flag can also come from a `MARQUEE_*` variable.
#[derive(Parser, Debug)]
#[command(name = "marquee_api_server", about = "Marquee movie catalogue API server")]
struct Args {
    /// API server port.
    #[arg(long, env = "MARQUEE_PORT", default_value_t = 4000)]
    port: u16,

    /// Environment (development|staging|production).
    #[arg(long, env = "MARQUEE_ENV", default_value = "development")]
    env: Environment,

    /// PostgreSQL DSN.
    #[arg(
        long,
        env = "MARQUEE_DB_DSN",
        default_value = "postgres://localhost:5432/marquee"
    )]
    db_dsn: String,

    /// Maximum open database connections.
    #[arg(long, env = "MARQUEE_DB_MAX_OPEN_CONN", default_value_t = 25)]
    db_max_open_conn: u32,

    /// Seconds an idle connection is kept before it is closed.
    #[arg(long, env = "MARQUEE_DB_MAX_IDLE_TIME", default_value_t = 900)]
    db_max_idle_time: u64,

    /// Sustained requests per second per client.
    #[arg(long, env = "MARQUEE_LIMITER_RPS", default_value_t = 2.0)]
    limiter_rps: f64,

    /// Requests a client may burst above the sustained rate.
    #[arg(long, env = "MARQUEE_LIMITER_BURST", default_value_t = 4)]
    limiter_burst: u32,

    /// Enable per-client rate limiting.
    #[arg(
        long,
        env = "MARQUEE_LIMITER_ENABLED",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    limiter_enabled: bool,

    /// Trusted CORS origins (space separated).
    #[arg(
        long,
        env = "MARQUEE_CORS_TRUSTED_ORIGINS",
        value_delimiter = ' ',
        num_args = 0..
    )]
    cors_trusted_origins: Vec<String>,

    /// Key rate limits on X-Forwarded-For / X-Real-IP (set behind a proxy).
    #[arg(
        long,
        env = "MARQUEE_TRUST_PROXY_HEADERS",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    trust_proxy_headers: bool,
}

impl Args {
    fn api_config(&self) -> ApiConfig {
        ApiConfig {
            env: self.env,
            port: self.port,
            limiter: LimiterConfig {
                rps: self.limiter_rps,
                burst: self.limiter_burst,
                enabled: self.limiter_enabled,
            },
            cors_trusted_origins: self
                .cors_trusted_origins
                .iter()
                .filter(|origin| !origin.is_empty())
                .cloned()
                .collect(),
            trust_proxy_headers: self.trust_proxy_headers,
            ..ApiConfig::default()
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,marquee_api=debug,marquee_core=debug")
            }),
        )
        .init();

    let args = Args::parse();
    let config = args.api_config();
    config.validate()?;

    info!(
        env = %config.env,
        port = config.port,
        max_open_conn = args.db_max_open_conn,
        "starting marquee_api_server"
    );

    let pool = PgPoolOptions::new()
        .max_connections(args.db_max_open_conn)
        .idle_timeout(Duration::from_secs(args.db_max_idle_time))
        .acquire_timeout(Duration::from_secs(5))
        .connect(&args.db_dsn)
        .await?;
    info!("database connection pool established");

    info!("running database migrations");
    marquee_api::migrate(&pool).await?;

    let state = marquee_api::AppState::new(
        config.clone(),
        Stores::postgres(pool.clone()),
        Arc::new(LogMailer),
        Arc::new(SystemClock),
    )?;

    let background = CancellationToken::new();
    let sweeper = state.limiter.spawn_sweeper(background.clone());

    let tasks = state.tasks.clone();
    let app = marquee_api::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, env = %config.env, "starting server");

    let coordinator = ShutdownCoordinator::new();
    let stop_listening = coordinator.listener_token();
    let server = async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(stop_listening.cancelled_owned())
        .await
    };

    let result = coordinator.run(shutdown_signal(), server, &tasks).await;

    background.cancel();
    if let Some(sweeper) = sweeper
        && let Err(e) = sweeper.await
    {
        warn!(error = %e, "Rate limiter sweeper ended abnormally");
    }
    pool.close().await;

    result?;
    info!("stopped server");
    Ok(())
}
