// Cache module for GitHub resources.
// Holds shaped responses in memory with a TTL and shares in-flight fetches.

pub mod key;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use key::{CacheKey, ResourceKind};
pub use store::{CacheEntry, CacheInfo, DEFAULT_TTL, EntryInfo, ResourceFetcher, TtlCache};
