pub mod opportunity;
pub mod scanner;
pub mod transaction;

pub use opportunity::OpportunityDetector;
pub use scanner::MempoolScanner;
pub use transaction::Transaction;
