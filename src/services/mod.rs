pub mod accounts;
pub mod providers;
pub mod retry;
pub mod search;
pub mod session;
pub mod stats;
pub mod telemetry;
pub mod watchlist;

pub use accounts::AccountService;
pub use providers::{MetadataProvider, TmdbProvider};
pub use session::{Claims, SessionKeys};
pub use stats::{StatsService, StatsSettings};
