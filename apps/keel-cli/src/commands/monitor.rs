// monitor.rs — Run the lease expiry monitor.
//
// `keel monitor --once` runs a single sweep (useful from cron). Without
// --once the monitor runs on its configured period until Ctrl-C.

use std::sync::Arc;

use keel_credentials::{CredentialStore, LeaseMonitor};

use crate::config::KeelConfig;

pub fn execute(config: &KeelConfig, once: bool) -> anyhow::Result<()> {
    let master = config.master_key()?;
    let store = Arc::new(CredentialStore::open(
        &config.credential_store,
        master,
        config.store_options(),
    )?);
    run(store, config, once)
}

fn run(store: Arc<CredentialStore>, config: &KeelConfig, once: bool) -> anyhow::Result<()> {
    let monitor = LeaseMonitor::new(store).with_period(config.monitor_period);

    if once {
        let report = monitor.sweep_once()?;
        println!(
            "Marked {} expired lease(s); {} lease(s) active.",
            report.newly_marked, report.active
        );
        return Ok(());
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let handle = monitor.spawn();
        tokio::signal::ctrl_c().await?;
        tracing::info!("Interrupt received, stopping lease monitor");
        handle.shutdown().await;
        Ok::<(), anyhow::Error>(())
    })
}
