//! Starts and stops the bank.

use crate::auditor::Auditor;
use crate::client::BankClient;
use crate::ledger::Ledger;
use crate::model::BankError;
use crate::teller::Teller;
use actor_kernel::{Runtime, RuntimeConfig, ServiceOptions};
use tracing::info;

pub const LEDGER: &str = "ledger";
pub const TELLER: &str = "teller";
pub const AUDITOR: &str = "auditor";

pub struct BankSystem {
    pub runtime: Runtime,
    pub client: BankClient,
}

impl BankSystem {
    /// Spawns the ledger, the teller and an auditor running every `audit_every` ticks.
    pub fn new(config: RuntimeConfig, audit_every: u64) -> Result<Self, BankError> {
        let runtime = Runtime::new(config)?;

        let ledger = runtime.spawn(Ledger::default(), ServiceOptions::default().named(LEDGER))?;
        let teller = runtime.spawn(
            Teller::new(ledger.clone()),
            ServiceOptions::default().named(TELLER),
        )?;
        // The auditor sleeps most of the time; give it its own thread.
        let auditor = runtime.spawn(
            Auditor::new(ledger.clone(), audit_every),
            ServiceOptions::default().named(AUDITOR).separate_worker(),
        )?;
        let port = runtime.port()?;

        info!(services = runtime.service_count(), "Bank system started");
        Ok(Self {
            client: BankClient::new(port, ledger, teller, auditor),
            runtime,
        })
    }

    pub fn shutdown(self) {
        info!("Bank system shutting down");
        self.runtime.shutdown();
    }
}
