pub mod envelope;
pub mod pow;

pub use envelope::{SealedPayload, SecureEnvelope};
pub use pow::{PuzzleSolution, PuzzleSolver};
