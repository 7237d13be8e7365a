//! # Kernel Sample: a tiny bank
//!
//! Three services wired together on one [`Runtime`](actor_kernel::Runtime):
//!
//! - **[ledger]**: owns every account balance.
//! - **[teller]**: moves money between accounts with nested calls to the ledger.
//! - **[auditor]**: wakes up on a timer and totals the ledger.
//!
//! [`BankClient`](client::BankClient) hides the message types behind typed
//! async methods, and [`BankSystem`](system::BankSystem) starts and stops the
//! whole thing.

pub mod auditor;
pub mod client;
pub mod ledger;
pub mod model;
pub mod system;
pub mod teller;
