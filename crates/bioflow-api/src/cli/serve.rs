//! `bioflow serve`: run the event bus until interrupted.

use anyhow::Result;
use console::style;

use crate::state::AppState;

pub async fn serve(state: &AppState) -> Result<()> {
    state.bus.start().await;

    println!(
        "  {} bioflow processing events with {} workers",
        style("⚡").bold(),
        style(state.config.bus.workers.max(1)).cyan()
    );
    println!("     engine:   {}", style(&state.config.engine.base_url).cyan());
    println!("     data dir: {}", style(state.data_dir.display()).dim());
    println!("  {}", style("Press Ctrl+C to stop").dim());

    shutdown_signal().await;

    println!("\n  Stopping, waiting for in-flight events...");
    state.bus.shutdown().await;
    println!("  Stopped.");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
