//! C1 Data Store — durable, transactional record of assets, balances, VTXOs,
//! sessions, challenges, transactions and invoices (spec.md §3, §4.1).

pub mod entities;
pub mod error;
pub mod store;

pub use entities::*;
pub use error::{StoreError, StoreResult};
pub use store::{NewLightningInvoice, NewTransaction, NewVtxo, Store, StoreTx};
