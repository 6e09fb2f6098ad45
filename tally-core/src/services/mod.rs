//! Service layer - business logic orchestration
//!
//! The migration engine is split by responsibility: the ledger records what
//! ran, the executor applies one migration atomically, the runner walks the
//! pending set, and rollback and reset build on both. `MigrationService`
//! ties them together for callers.

mod doctor;
pub mod executor;
pub mod ledger;
pub mod logging;
pub mod migration;
pub mod reset;
pub mod rollback;
pub mod runner;

pub use doctor::{CheckResult, DoctorResult, DoctorService, DoctorSummary};
pub use executor::MigrationExecutor;
pub use ledger::{MigrationLedger, DEFAULT_LEDGER_TABLE};
pub use logging::{EntryPoint, LogEntry, LogEvent, LogStats, LoggingService};
pub use migration::{join_pending, spawn_pending, MigrationService};
pub use reset::{drop_order, SchemaResetter};
pub use rollback::RollbackCoordinator;
pub use runner::{MigrationObserver, MigrationRunner, RunOptions};
