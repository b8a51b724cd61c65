// GitHub API module.
// Provides the client, wire types, and the fetcher that assembles cacheable resources.

pub mod client;
pub mod endpoints;
pub mod fetcher;
pub mod types;

pub use client::{ClientOptions, GitHubClient};
pub use fetcher::GitHubFetcher;
pub use types::*;
