// gh-proxy library.
// Caching proxy over the GitHub API with per-organization background refresh.

pub mod cache;
pub mod config;
pub mod error;
pub mod github;
pub mod http;
pub mod live;
pub mod observability;
pub mod scheduler;
pub mod server;
pub mod shape;

pub use cache::{CacheKey, ResourceFetcher, ResourceKind, TtlCache};
pub use config::Config;
pub use error::{ProxyError, Result};
pub use live::LiveBroadcaster;
pub use scheduler::{RefreshNotifier, RefreshScheduler};
