use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gateway::config::{self, Config, LogFormat};
use gateway::models::taxpayer::{precheck, ValidationRecord};
use gateway::proxy::upstream::UpstreamClient;
use gateway::store::memory::MemoryStore;
use gateway::store::postgres::PgStore;
use gateway::store::{Page, TaxpayerStore};
use gateway::AppState;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load()?;
    init_tracing(cfg.log_format);

    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Token) => handle_token_command(&cfg).await,
        Some(cli::Commands::Validate {
            tin,
            id_type,
            id_value,
        }) => {
            let store = open_store(&cfg).await?;
            handle_validate_command(&cfg, store, &tin, &id_type, &id_value).await
        }
        Some(cli::Commands::Taxpayer { command }) => {
            let store = open_store(&cfg).await?;
            handle_taxpayer_command(store, command).await
        }
        Some(cli::Commands::Migrate) => {
            if cfg.uses_memory_store() {
                anyhow::bail!("DATABASE_URL points at the in-memory store; nothing to migrate");
            }
            let db = PgStore::connect(&cfg.database_url).await?;
            db.migrate().await?;
            println!("Migrations applied.");
            Ok(())
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "gateway=debug,bilcekap=debug,tower_http=debug".into()),
    );
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Postgres (migrated) or the in-process store, per `DATABASE_URL`.
async fn open_store(cfg: &Config) -> anyhow::Result<Arc<dyn TaxpayerStore>> {
    if cfg.uses_memory_store() {
        tracing::warn!("Using in-memory taxpayer store; records are lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }

    tracing::info!("Connecting to database...");
    let db = PgStore::connect(&cfg.database_url)
        .await
        .context("connecting to DATABASE_URL")?;

    tracing::info!("Running migrations...");
    db.migrate().await?;
    Ok(Arc::new(db))
}

async fn run_server(cfg: Config, port: u16) -> anyhow::Result<()> {
    let store = open_store(&cfg).await?;
    let upstream = UpstreamClient::new(&cfg.myinvois)?;

    let state = Arc::new(AppState {
        store,
        upstream,
        config: cfg,
    });
    let app = gateway::build_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Bilcekap gateway listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn handle_token_command(cfg: &Config) -> anyhow::Result<()> {
    let upstream = UpstreamClient::new(&cfg.myinvois)?;
    let grant = upstream.tokens().fetch_token().await?;
    println!("Token issued:");
    println!("  Type:       {}", grant.token_type.as_deref().unwrap_or("-"));
    println!("  Scope:      {}", grant.scope.as_deref().unwrap_or("-"));
    println!("  Expires in: {}s", grant.expires_in);
    println!("  Token:      {}", grant.access_token);
    Ok(())
}

async fn handle_validate_command(
    cfg: &Config,
    store: Arc<dyn TaxpayerStore>,
    tin: &str,
    id_type: &str,
    id_value: &str,
) -> anyhow::Result<()> {
    if let Some(check) = precheck(tin, id_type, id_value) {
        println!("{}: {}", tin, check.message());
        return Ok(());
    }

    let upstream = UpstreamClient::new(&cfg.myinvois)?;
    let check = upstream.validate_tin(tin, id_type, id_value).await?;
    let row = store
        .record_validation(&ValidationRecord {
            tin: tin.to_string(),
            id_type: id_type.to_string(),
            id_value: id_value.to_string(),
            is_valid: check.is_valid(),
        })
        .await?;

    println!("TIN:     {}", row.tin);
    println!("Valid:   {}", row.is_valid);
    println!("Message: {}", check.message());
    Ok(())
}

async fn handle_taxpayer_command(
    store: Arc<dyn TaxpayerStore>,
    cmd: cli::TaxpayerCommands,
) -> anyhow::Result<()> {
    match cmd {
        cli::TaxpayerCommands::List { skip, limit } => {
            let page = Page::new(Some(skip), Some(limit)).map_err(anyhow::Error::msg)?;
            let rows = store.list(page).await?;
            if rows.is_empty() {
                println!("No taxpayers found.");
                return Ok(());
            }

            println!(
                "{:<8} {:<20} {:<10} {:<8} {:<30} CREATED",
                "ID", "TIN", "ID TYPE", "VALID", "NAME"
            );
            for t in rows {
                let name = t
                    .business_name
                    .as_deref()
                    .or(t.full_name.as_deref())
                    .unwrap_or("-");
                println!(
                    "{:<8} {:<20} {:<10} {:<8} {:<30} {}",
                    t.id,
                    t.tin,
                    t.id_type,
                    t.is_valid,
                    name,
                    t.created_at.format("%Y-%m-%d")
                );
            }
        }
        cli::TaxpayerCommands::Get { tin } => match store.get(&tin).await? {
            Some(t) => println!("{}", serde_json::to_string_pretty(&t)?),
            None => println!("Taxpayer {} not found.", tin),
        },
    }
    Ok(())
}
