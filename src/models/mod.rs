mod blacklist;
mod media;
mod metadata;
mod stats;
mod tag;
mod telemetry;
pub mod tmdb;
mod user;
mod watchlist;

pub use blacklist::*;
pub use media::*;
pub use metadata::*;
pub use stats::*;
pub use tag::*;
pub use telemetry::*;
pub use user::*;
pub use watchlist::*;
