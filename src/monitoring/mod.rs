pub mod journal;
pub mod logging;
pub mod reporter;
pub mod telegram;

pub use journal::{TradeJournal, TradeRecord};
pub use logging::{init_logging, LogFormat};
pub use reporter::{Reporter, Reporters, TracingReporter};
pub use telegram::TelegramNotifier;
