//! Key-value persistence port (driven/secondary port)
//!
//! The sync state store keeps its records as opaque strings under stable
//! keys. This is the whole persistence contract the core needs.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific.
//! - `set_many` defaults to sequential `set` calls. Adapters that can write
//!   several keys in one transaction should override it; callers order the
//!   entries so that a partial sequential write is still consistent.

/// Port trait for string key-value persistence
#[async_trait::async_trait]
pub trait IKeyValueStore: Send + Sync {
    /// Reads the value stored under `key`, if any
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;

    /// Stores several entries, in order
    async fn set_many(&self, entries: &[(&str, String)]) -> anyhow::Result<()> {
        for (key, value) in entries {
            self.set(key, value).await?;
        }
        Ok(())
    }
}
