pub mod config;
pub mod dispatcher;
pub mod error;
pub mod mempool;
pub mod monitoring;
pub mod security;
pub mod trading;

pub use dispatcher::{DispatchSummary, TransactionDispatcher};
pub use error::{ArbError, Result, VenueError};
