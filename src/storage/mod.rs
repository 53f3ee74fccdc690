//! On-disk state owned by devtempo.
//!  - [json_store::JsonStore] keeps small whole-document JSON files (schedule, lunch ledger,
//!    metrics). Read-modify-write cycles hold an exclusive lock so the CLI and the daemon don't
//!    step on each other.
//!  - [pulse_storage::PulseStorageImpl] keeps one JSON-lines file per UTC day with the activity
//!    pulses recorded by the daemon.

pub mod json_store;
pub mod pulse_storage;
