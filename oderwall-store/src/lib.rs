//! OderWall Store - the client-side order pipeline core
//!
//! Every view (cashier, kitchen, customer display) embeds an
//! [`OrderStore`]: a write-ahead local cache over one of several
//! interchangeable synchronization adapters. The store funnels every
//! mutation through the pure lifecycle state machine, persists the
//! result through the active adapter, and reconciles its cache
//! wholesale whenever the adapter reports a change - regardless of
//! which view originated it.

pub mod adapter;
pub mod archive;
pub mod error;
pub mod ledger;
pub mod store;

// Re-exports
pub use adapter::{
    KeyedStoreAdapter, LocalBroadcastAdapter, PollAdapter, SharedStorage, SocketAdapter,
    SyncAdapter,
};
pub use archive::{Archive, DEFAULT_HISTORY_LIMIT, RedbArchive};
pub use error::{StoreError, StoreResult};
pub use ledger::ChangeLedger;
pub use store::{OrderStore, StoreConfig};
