//! CookieBar: consent banner, consent log and cookie scanner server.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cookiebar_server::hooks::default_hooks;
use cookiebar_server::{build_router, AppContext, LifecycleEvent};

fn resolve_data_dir() -> PathBuf {
    std::env::var("COOKIEBAR_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

fn open_context(data_dir: &Path) -> anyhow::Result<std::sync::Arc<AppContext>> {
    let config = cookiebar_core::CookieBarConfig::from_env(data_dir)?;
    let store = cookiebar_store::SqliteStore::open(&config.data_paths.db_dir)
        .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?;
    Ok(AppContext::new(config, store, default_hooks()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let data_dir = resolve_data_dir();

    // Handle CLI subcommands
    if args.len() > 1 {
        match args[1].as_str() {
            "export-logs" => {
                let ctx = open_context(&data_dir)?;
                match args.get(2) {
                    Some(path) => {
                        let file = std::fs::File::create(path)?;
                        ctx.store.export_logs_csv(std::io::BufWriter::new(file))?;
                        info!("Consent logs written to {}", path);
                    }
                    None => ctx.store.export_logs_csv(std::io::stdout().lock())?,
                }
                return Ok(());
            }
            "scan" => {
                let ctx = open_context(&data_dir)?;
                ctx.store.seed_default_settings()?;
                ctx.load_stored_ocd();
                let summary = cookiebar_server::scan::run_scan(&ctx, None).await?;
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("CookieBar — cookie consent server");
                println!();
                println!("Usage: cookiebar [command]");
                println!();
                println!("Commands:");
                println!("  (none)               Start the server");
                println!("  export-logs [file]   Write the consent log as CSV (stdout by default)");
                println!("  scan                 Run one cookie scan and print the summary");
                println!("  help                 Show this help message");
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'cookiebar help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    // Normal server startup
    info!("Data directory: {}", data_dir.display());
    let ctx = open_context(&data_dir)?;
    let port = ctx.config.port;

    let failed = ctx.hooks.dispatch(LifecycleEvent::Activate, &ctx).await;
    if !failed.is_empty() {
        warn!("Activation finished with failed hooks: {:?}", failed);
    }

    let app = build_router(ctx.clone());

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("CookieBar server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    ctx.hooks.dispatch(LifecycleEvent::Deactivate, &ctx).await;
    info!("CookieBar server stopped");

    Ok(())
}
