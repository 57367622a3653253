//! Magnetarr protected-fetch layer
//!
//! Challenge detection, the shared bypass-session cache, the protected
//! fetcher every indexer request goes through, and the serial client for
//! the external challenge solver.

pub mod challenge;
pub mod fetcher;
pub mod session;
pub mod solver;

pub use challenge::{detect, ChallengeKind};
pub use fetcher::{random_desktop_user_agent, FetchOptions, FetchOutcome, ProtectedFetcher};
pub use session::SessionCache;
pub use solver::{SolveOutcome, SolverClient, SolverConfig};
