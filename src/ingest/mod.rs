pub mod ingester;

pub use ingester::{ingest, SignalError};
