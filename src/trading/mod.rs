pub mod executor;
pub mod order;
pub mod settlement;
pub mod venue;

pub use executor::{ArbitrageExecutor, PowProof, TradeReport, TradeState};
pub use order::{OrderPayload, Side};
pub use settlement::{FixedDelay, Immediate, Settlement};
pub use venue::{HttpVenue, SimulatedVenue, Venue};
