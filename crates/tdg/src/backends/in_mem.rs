//! # Previously, on tdg...
//!
//! 🎬 The trail bucket was eleven thousand kilometres away, behind an IAM policy nobody
//! remembered writing. The tests needed a bucket NOW. So we built one out of a `BTreeMap`.
//!
//! `in_mem` provides an in-memory [`ObjectStore`] and a fixed-answer [`IdentityProvider`]
//! for tests and local poking around. The store pages its listings, records every call it
//! receives, and can be told to fail on purpose, which is the whole point of having one.
//!
//! ⚠️ This is NOT for production. There is no production bucket that fits in a `BTreeMap`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

use crate::backends::{IdentityProvider, ListPage, ObjectRef, ObjectStore, child_name};

/// 📝 One call the store received. For assertions, and for trust issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    List { prefix: String, continuation: Option<String> },
    Discover { prefix: String },
    Get { key: String },
}

/// 🪣 A bucket (or several) that lives and dies with the process.
///
/// Clone-able; clones share the same objects, log and failure list, so a test can keep a
/// handle after giving one to the walker.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    objects: Arc<Mutex<BTreeMap<(String, String), Bytes>>>,
    operations: Arc<Mutex<Vec<StoreOp>>>,
    fail_prefixes: Arc<Mutex<Vec<String>>>,
    page_size: usize,
    latency: Option<Duration>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            objects: Arc::default(),
            operations: Arc::default(),
            fail_prefixes: Arc::default(),
            // 📄 same page size S3 uses
            page_size: 1000,
            latency: None,
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 📄 Smaller pages, so tests can see pagination actually paginate.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// 🐌 Sleep before answering each call. Lets concurrent scan units actually overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub async fn put_object(&self, bucket: &str, key: &str, body: impl Into<Bytes>) {
        self.objects
            .lock()
            .await
            .insert((bucket.to_string(), key.to_string()), body.into());
    }

    /// 💥 Every list or get touching a key/prefix that starts with `prefix` fails from now on.
    pub async fn fail_on(&self, prefix: impl Into<String>) {
        self.fail_prefixes.lock().await.push(prefix.into());
    }

    pub async fn operations(&self) -> Vec<StoreOp> {
        self.operations.lock().await.clone()
    }

    async fn record(&self, op: StoreOp) {
        self.operations.lock().await.push(op);
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    async fn check_failure(&self, bucket: &str, target: &str) -> Result<()> {
        let the_fail_prefixes = self.fail_prefixes.lock().await;
        if let Some(the_trap) = the_fail_prefixes.iter().find(|p| target.starts_with(p.as_str())) {
            bail!("💥 injected failure for s3://{bucket}/{target} (matched {the_trap})");
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage> {
        self.record(StoreOp::List {
            prefix: prefix.to_string(),
            continuation: continuation.clone(),
        })
        .await;
        self.pause().await;
        self.check_failure(bucket, prefix).await?;

        // 🔑 the continuation token is simply the last key handed out; resume strictly after it
        let the_objects = self.objects.lock().await;
        let mut the_page: Vec<ObjectRef> = the_objects
            .iter()
            .filter(|((b, key), _)| b == bucket && key.starts_with(prefix))
            .filter(|((_, key), _)| continuation.as_deref().is_none_or(|after| key.as_str() > after))
            .take(self.page_size + 1)
            .map(|((_, key), body)| ObjectRef {
                key: key.clone(),
                size: body.len() as u64,
            })
            .collect();

        let next_continuation = if the_page.len() > self.page_size {
            the_page.truncate(self.page_size);
            the_page.last().map(|o| o.key.clone())
        } else {
            None
        };
        Ok(ListPage {
            objects: the_page,
            next_continuation,
        })
    }

    async fn discover_children(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        self.record(StoreOp::Discover {
            prefix: prefix.to_string(),
        })
        .await;
        self.pause().await;
        self.check_failure(bucket, prefix).await?;

        let the_objects = self.objects.lock().await;
        let the_children: BTreeSet<String> = the_objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .filter_map(|(_, key)| key.strip_prefix(prefix))
            .filter_map(|rest| rest.split_once('/'))
            .filter_map(|(child, _)| child_name("", child))
            .collect();
        Ok(the_children.into_iter().collect())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.record(StoreOp::Get {
            key: key.to_string(),
        })
        .await;
        self.pause().await;
        self.check_failure(bucket, key).await?;

        match self
            .objects
            .lock()
            .await
            .get(&(bucket.to_string(), key.to_string()))
        {
            Some(body) => Ok(body.clone()),
            None => bail!("💀 NoSuchKey: s3://{bucket}/{key}"),
        }
    }
}

/// 🪪 An identity that always gives the same answer. Unlike my manager.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    pub account: String,
    pub region: Option<String>,
}

impl StaticIdentity {
    pub fn new(account: impl Into<String>, region: Option<&str>) -> Self {
        Self {
            account: account.into(),
            region: region.map(str::to_string),
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn caller_account(&self) -> Result<String> {
        if self.account.is_empty() {
            bail!("💀 no caller account configured for the static identity");
        }
        Ok(self.account.clone())
    }

    fn default_region(&self) -> Option<String> {
        self.region.clone()
    }
}
