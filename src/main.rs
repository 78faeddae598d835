// src/main.rs
// =============================================================================
// This is the entry point of badger.
//
// What happens here:
// 1. Set up logging (tracing, filtered by RUST_LOG)
// 2. Parse command-line arguments using clap
// 3. Build the prober, the task store and the scheduler
// 4. Either serve the HTTP API, or run one batch and print it
// 5. Exit with a proper code (0 = success, 1 = broken links, 2 = error)
// =============================================================================

mod api;
mod batch;
mod checker;
mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use batch::{Scheduler, TaskStore};
use checker::{HttpProber, ProbeResult};
use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,badger=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

// Returns:
//   Ok(0) = nothing broken (or the server shut down cleanly)
//   Ok(1) = at least one URL has an error
//   Err   = something went wrong before we could answer
async fn run() -> Result<i32> {
    let cli = Cli::parse();

    let prober = Arc::new(HttpProber::new(cli.probe.probe_config()));
    let scheduler = Scheduler::new(
        Arc::new(TaskStore::new()),
        prober,
        cli.probe.scheduler_config(),
    );

    match cli.command {
        Commands::Serve { host, port } => {
            serve(scheduler, &host, port).await?;
            Ok(0)
        }
        Commands::Check { urls, json } => handle_check(scheduler, urls, json).await,
    }
}

async fn serve(scheduler: Scheduler, host: &str, port: u16) -> Result<()> {
    let scheduler_capacity = scheduler.limiter().capacity();
    let app = api::router(scheduler);
    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("failed to bind {}:{}", host, port))?;

    info!(
        concurrency = scheduler_capacity,
        "listening on http://{}",
        listener.local_addr()?
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}

// Handles the 'check' subcommand: one batch, wait for it, print it
async fn handle_check(scheduler: Scheduler, urls: Vec<String>, json: bool) -> Result<i32> {
    let id = scheduler.submit(urls)?;
    let snapshot = scheduler.wait_ready(&id).await?;

    print_results(&snapshot.results, json)?;

    let broken_count = snapshot.results.values().filter(|r| !r.is_ok()).count();

    if broken_count > 0 {
        Ok(1)
    } else {
        Ok(0)
    }
}

fn print_results(results: &BTreeMap<String, ProbeResult>, json: bool) -> Result<()> {
    if json {
        let json_output = serde_json::to_string_pretty(results)?;
        println!("{}", json_output);
    } else {
        print_table(results);
    }
    Ok(())
}

fn print_table(results: &BTreeMap<String, ProbeResult>) {
    println!("{:<60} {:<20} {:<10}", "URL", "ERROR", "REDIRECTS");
    println!("{}", "=".repeat(92));

    for (url, result) in results {
        let error = result
            .error
            .as_ref()
            .map(|e| e.detail().to_string())
            .unwrap_or_else(|| "-".to_string());

        // Truncate URL if too long for display
        let url_display = if url.chars().count() > 57 {
            format!("{}...", url.chars().take(57).collect::<String>())
        } else {
            url.clone()
        };

        println!(
            "{:<60} {:<20} {:<10}",
            url_display,
            error,
            result.redirect_chain.len()
        );
        for hop in &result.redirect_chain {
            println!("    -> {}", hop);
        }
    }

    println!();

    let ok_count = results.values().filter(|r| r.is_ok()).count();
    let broken_count = results.len() - ok_count;

    println!("Summary:");
    println!("   OK: {}", ok_count);
    println!("   Broken: {}", broken_count);
    println!("   Total: {}", results.len());
}
