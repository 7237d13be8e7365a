//! # Kernel Sample
//!
//! Opens two accounts, moves money between them and lets the auditor run a
//! few rounds before shutting everything down.
//!
//! ```bash
//! RUST_LOG=info cargo run -p kernel-sample
//! ```

use actor_kernel::runtime::tracing::setup_tracing;
use actor_kernel::RuntimeConfig;
use kernel_sample::model::BankError;
use kernel_sample::system::BankSystem;
use std::time::Duration;
use tracing::{error, info, Instrument};

#[tokio::main]
async fn main() -> Result<(), BankError> {
    setup_tracing();

    info!("Starting bank");
    let system = BankSystem::new(RuntimeConfig::default().with_tick_ms(10), 20)?;
    let client = system.client.clone();

    let span = tracing::info_span!("account_setup");
    async {
        client.open("alice").await?;
        client.open("bob").await?;
        client.deposit("alice", 100).await?;
        info!("Accounts ready");
        Ok::<_, BankError>(())
    }
    .instrument(span)
    .await?;

    let span = tracing::info_span!("transfers");
    async {
        let receipt = client.transfer("alice", "bob", 40).await?;
        info!(alice = receipt.from_balance, bob = receipt.to_balance, "Transfer done");

        match client.transfer("bob", "alice", 1_000).await {
            Ok(_) => error!("Overdraft was accepted"),
            Err(err) => info!(error = %err, "Overdraft refused as expected"),
        }
        Ok::<_, BankError>(())
    }
    .instrument(span)
    .await?;

    // Let the auditor run a couple of rounds.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let report = client.audit_report().await?;
    info!(runs = report.runs, total = report.last_total, "Audit report");

    system.shutdown();
    info!("Bank closed");
    Ok(())
}
