//! 🔌 Backends: where the real I/O happens.
//!
//! 🪣 The object store lists and fetches, the identity provider answers "who am I, and
//! where?". Everything above this module is arithmetic and ordering; everything in
//! here talks to the network (or pretends to, for tests).
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls (S3 / STS, in-memory) → backend enum that dispatches.
//!   Callers hold the enum and never care which cloud (or which `HashMap`) is underneath.
//! - Collaborator errors are `anyhow`; the walk wraps them into `WalkError::Store` with the
//!   bucket and prefix they were about.
//! - `discover_children` is the "all accounts / all regions" capability, kept separate from
//!   path building so the planner can be tested without a live store.
//!
//! 🦆 The duck has read-only credentials. It cannot mutate the remote store. Neither can we.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

pub mod in_mem;
pub mod s3;

pub use in_mem::{InMemoryStore, StaticIdentity, StoreOp};
pub use s3::{S3Store, StsIdentity};

/// 🗝️ A listed object: its key and its size. Cheap to hold, cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub key: String,
    pub size: u64,
}

/// 📄 One page of a prefix listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectRef>,
    /// ➡️ `Some` while there is more to list. Hand it back to get the next page.
    pub next_continuation: Option<String>,
}

/// 🪣 The object store, as far as the walk is concerned.
///
/// # Contract 📜
/// - `list_page` lists every object under `prefix`, one page per call, in whatever order
///   the store likes.
/// - `discover_children` lists ONE level under `prefix` with `/` as delimiter and returns the
///   child names, parent prefix and slashes stripped, across all pages.
/// - `get_object` returns the whole body. No ranges, no streaming, no surprises.
#[async_trait]
pub trait ObjectStore: Send + Sync + std::fmt::Debug {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage>;

    async fn discover_children(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes>;
}

/// 🪪 "Who is calling, and from where?"
#[async_trait]
pub trait IdentityProvider: Send + Sync + std::fmt::Debug {
    /// 🔢 The account id of the credentials in use.
    async fn caller_account(&self) -> Result<String>;

    /// 🌎 The region the caller is configured for, if any.
    fn default_region(&self) -> Option<String>;
}

/// 🎭 The many faces of an object store. A universal remote for buckets.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    S3(S3Store),
    InMemory(InMemoryStore),
}

#[async_trait]
impl ObjectStore for StoreBackend {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage> {
        match self {
            StoreBackend::S3(s3) => s3.list_page(bucket, prefix, continuation).await,
            StoreBackend::InMemory(mem) => mem.list_page(bucket, prefix, continuation).await,
        }
    }

    async fn discover_children(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        match self {
            StoreBackend::S3(s3) => s3.discover_children(bucket, prefix).await,
            StoreBackend::InMemory(mem) => mem.discover_children(bucket, prefix).await,
        }
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        match self {
            StoreBackend::S3(s3) => s3.get_object(bucket, key).await,
            StoreBackend::InMemory(mem) => mem.get_object(bucket, key).await,
        }
    }
}

/// 🎭 The many faces of "who am I".
#[derive(Debug, Clone)]
pub enum IdentityBackend {
    Sts(StsIdentity),
    Static(StaticIdentity),
}

#[async_trait]
impl IdentityProvider for IdentityBackend {
    async fn caller_account(&self) -> Result<String> {
        match self {
            IdentityBackend::Sts(sts) => sts.caller_account().await,
            IdentityBackend::Static(fixed) => fixed.caller_account().await,
        }
    }

    fn default_region(&self) -> Option<String> {
        match self {
            IdentityBackend::Sts(sts) => sts.default_region(),
            IdentityBackend::Static(fixed) => fixed.default_region(),
        }
    }
}

/// ✂️ `AWSLogs/123456789012/` under parent `AWSLogs/` → `123456789012`.
pub(crate) fn child_name(parent: &str, common_prefix: &str) -> Option<String> {
    let the_name = common_prefix
        .strip_prefix(parent)
        .unwrap_or(common_prefix)
        .trim_matches('/');
    (!the_name.is_empty()).then(|| the_name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_child_names_lose_their_parents() {
        assert_eq!(
            child_name("AWSLogs/", "AWSLogs/123456789012/").as_deref(),
            Some("123456789012")
        );
        assert_eq!(
            child_name("AWSLogs/123/CloudTrail/", "AWSLogs/123/CloudTrail/us-east-1/").as_deref(),
            Some("us-east-1")
        );
        assert_eq!(child_name("AWSLogs/", "AWSLogs/"), None);
    }
}
