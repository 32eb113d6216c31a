use crate::output::print_json;
use anyhow::Context;
use fleet_core::{config::FleetConfig, paths, registry::TenantRegistry, FleetError};
use fleet_runtime::{ConsoleConnector, ReconcileReport, TenantLifecycleManager};
use std::path::Path;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Run every active channel tenant against the console transport until
/// Ctrl-C. With `once`, perform a single reconcile pass and exit.
pub fn run(root: &Path, once: bool, json: bool) -> anyhow::Result<()> {
    if !paths::fleet_dir(root).is_dir() {
        return Err(FleetError::NotInitialized.into());
    }
    let config = FleetConfig::load(root).context("failed to load config")?;
    config.ensure_valid().context("refusing to start")?;
    let registry = Arc::new(
        TenantRegistry::open(&paths::registry_path(root)).context("failed to open registry")?,
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let manager = Arc::new(TenantLifecycleManager::new(
            &config,
            registry,
            Arc::new(ConsoleConnector),
        ));

        if once {
            let report = manager.reconcile().await;
            manager.shutdown_all().await;
            return print_report(&report?, json);
        }

        let started = manager.start_all().await?;
        tracing::info!(started, "fleet running, Ctrl-C to stop");
        let reconcile = Arc::clone(&manager).spawn_reconcile_loop();

        let result = tokio::signal::ctrl_c().await;
        reconcile.abort();
        manager.shutdown_all().await;
        result.context("failed to listen for Ctrl-C")
    })
}

fn print_report(report: &ReconcileReport, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(report);
    }
    if report.is_empty() {
        println!("Nothing to do.");
        return Ok(());
    }
    for (label, tokens) in [
        ("started", &report.started),
        ("stopped", &report.stopped),
        ("paused", &report.paused),
        ("resumed", &report.resumed),
        ("rechecked", &report.rechecked),
    ] {
        if !tokens.is_empty() {
            println!("{label}: {}", tokens.len());
        }
    }
    Ok(())
}
