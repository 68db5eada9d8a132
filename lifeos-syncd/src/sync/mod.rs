pub mod clock;
pub mod diff;
pub mod dispatcher;
pub mod engine;
pub mod ledger;
pub mod provider;
pub mod scheduler;
pub mod timer;
pub mod watcher;

pub use dispatcher::{SyncDispatcher, SyncRequest};
pub use engine::{SyncEngine, SyncReport, SyncScope};
pub use ledger::{JobOutcome, SyncLedger, SyncTrigger};
