//! Salary service HTTP server binary.
//!
//! Storage is PostgreSQL when `DATABASE_URL` is set, otherwise an in-memory
//! store that is lost on exit.

use std::sync::Arc;

use clap::Parser;
use salary_api::config::ApiConfig;
use salary_core::auth::{AuthService, BcryptHasher, SessionTokens, TemporaryTokenCache};
use salary_core::mail::{HttpMailer, LogMailer, MailOutbox, Mailer};
use salary_core::store::{
    CredentialStore, InMemoryCredentialStore, InMemoryWorkplaceStore, PgCredentialStore,
    PgWorkplaceStore, WorkplaceStore,
};
use salary_core::workplace::WorkplaceService;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// CLI arguments. Everything else is read from the environment by
/// [`ApiConfig::from_env`].
#[derive(Parser, Debug)]
#[command(name = "salary_api_server", about = "Salary service API server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:8080")]
    bind_addr: String,

    /// PostgreSQL connection URL. Omit to use the in-memory store.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Skip the periodic purge of expired temporary tokens.
    #[arg(long, default_value_t = false)]
    no_token_sweep: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,salary_api=debug,salary_core=debug".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = ApiConfig::from_env()?;
    config.bind_addr = args.bind_addr;
    config.database_url = args.database_url.filter(|url| !url.is_empty());

    info!(bind_addr = %config.bind_addr, "starting salary_api_server");

    let (store, workplace_store): (Arc<dyn CredentialStore>, Arc<dyn WorkplaceStore>) =
        match &config.database_url {
            Some(url) => {
                info!(max_connections = args.max_connections, "connecting to PostgreSQL");
                let pool = PgPoolOptions::new()
                    .max_connections(args.max_connections)
                    .acquire_timeout(std::time::Duration::from_secs(30))
                    .connect(url)
                    .await?;
                info!("running database migrations");
                salary_core::migrate::migrate(&pool).await?;
                (
                    Arc::new(PgCredentialStore::new(pool.clone())),
                    Arc::new(PgWorkplaceStore::new(pool)),
                )
            }
            None => {
                warn!("DATABASE_URL not set, accounts and records are kept in memory only");
                (
                    Arc::new(InMemoryCredentialStore::new()),
                    Arc::new(InMemoryWorkplaceStore::new()),
                )
            }
        };

    let mailer: Arc<dyn Mailer> = match &config.mail_webhook_url {
        Some(endpoint) => {
            info!(%endpoint, "delivering mail through webhook");
            Arc::new(HttpMailer::new(endpoint.clone()))
        }
        None => {
            warn!("MAIL_WEBHOOK_URL not set, outgoing mail is logged only");
            Arc::new(LogMailer)
        }
    };
    let (outbox, mail_handle) = MailOutbox::spawn(mailer);

    let temp_tokens = Arc::new(TemporaryTokenCache::new(config.auth.temporary_ttl));
    let sweep_handle = (!args.no_token_sweep).then(|| temp_tokens.spawn_cleanup_task());

    let service = AuthService::new(
        store,
        Arc::new(BcryptHasher::default()),
        Arc::new(SessionTokens::new(&config.jwt_secret, config.auth.session_ttl)),
        temp_tokens,
        outbox,
        config.auth.clone(),
    );
    let workplace = WorkplaceService::new(workplace_store);
    let app = salary_api::router(salary_api::AppState::new(
        Arc::new(service),
        Arc::new(workplace),
    ));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
                return;
            }
            info!("shutdown requested");
            shutdown.cancel();
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    if let Some(handle) = sweep_handle {
        handle.abort();
    }
    // The router held the last outbox; the worker drains and exits.
    if let Err(e) = mail_handle.await {
        warn!(error = %e, "mail worker failed");
    }
    info!("stopped");
    Ok(())
}
