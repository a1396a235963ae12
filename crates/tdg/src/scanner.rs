//! 🔦 The Parallel Partition Scanner: one unit of work per prefix, all of a day's units at
//! once, every object visited exactly once (as far as S3's listing is willing to promise).
//!
//! 🧠 Knowledge graph:
//! - Fan-out is per day, never across days. The walk finishes a day before starting the next.
//! - Each unit pages through `list_page` with its OWN continuation token and hands every
//!   object to the [`ObjectHandler`] before asking for the next page.
//! - First error wins. The remaining units of that day are aborted (their results would be
//!   thrown away anyway) and the error becomes the walk's error.
//! - A semaphore caps how many units talk to the store at the same time.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, trace};

use crate::backends::{ObjectRef, ObjectStore};
use crate::error::WalkError;
use crate::partitions::PartitionGroup;

/// 🎯 What to do with each listed object. Called from whichever unit found it.
#[async_trait]
pub(crate) trait ObjectHandler: Send + Sync {
    async fn handle(&self, bucket: &str, object: &ObjectRef) -> Result<(), WalkError>;
}

/// 🔦 Scan every prefix of one day concurrently. Returns when all units are done, or at the
/// first failure.
pub(crate) async fn scan_day<S, H>(
    store: Arc<S>,
    bucket: &str,
    group: &PartitionGroup,
    handler: Arc<H>,
    limiter: Arc<Semaphore>,
) -> Result<(), WalkError>
where
    S: ObjectStore + 'static,
    H: ObjectHandler + 'static,
{
    let mut the_units = JoinSet::new();
    for prefix in &group.prefixes {
        info!(prefix = %prefix, "🔦 Digging trail logs");
        let store = Arc::clone(&store);
        let handler = Arc::clone(&handler);
        let limiter = Arc::clone(&limiter);
        let bucket = bucket.to_string();
        let prefix = prefix.clone();
        the_units.spawn(async move {
            let _permit = limiter.acquire_owned().await.map_err(|e| WalkError::Task {
                prefix: prefix.clone(),
                source: Box::new(e),
            })?;
            scan_prefix(store.as_ref(), &bucket, &prefix, handler.as_ref()).await
        });
    }

    while let Some(joined) = the_units.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("💀 a scan unit for {} failed, aborting its siblings", group.day);
                the_units.abort_all();
                return Err(e);
            }
            Err(join_error) => {
                the_units.abort_all();
                return Err(WalkError::Task {
                    prefix: format!("a partition of {}", group.day),
                    source: Box::new(join_error),
                });
            }
        }
    }
    Ok(())
}

/// 📄 Page through one prefix until the store says there is nothing left.
pub(crate) async fn scan_prefix<S, H>(
    store: &S,
    bucket: &str,
    prefix: &str,
    handler: &H,
) -> Result<(), WalkError>
where
    S: ObjectStore + ?Sized,
    H: ObjectHandler + ?Sized,
{
    let mut the_token: Option<String> = None;
    let mut the_page_count = 0usize;
    loop {
        let the_page = store
            .list_page(bucket, prefix, the_token.take())
            .await
            .map_err(|e| WalkError::store(bucket, prefix, e))?;
        the_page_count += 1;
        trace!(
            "📄 page {} of {}: {} objects",
            the_page_count,
            prefix,
            the_page.objects.len()
        );

        for object in &the_page.objects {
            handler.handle(bucket, object).await?;
        }

        match the_page.next_continuation {
            Some(next) => the_token = Some(next),
            None => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::Mutex;

    use super::*;
    use crate::backends::InMemoryStore;
    use crate::dates::Day;

    /// 🧪 Writes down every key it is handed. Optionally throws a tantrum on one of them.
    #[derive(Default)]
    struct KeyCollector {
        keys: Mutex<Vec<String>>,
        explode_on: Option<String>,
    }

    #[async_trait]
    impl ObjectHandler for KeyCollector {
        async fn handle(&self, _bucket: &str, object: &ObjectRef) -> Result<(), WalkError> {
            if self.explode_on.as_deref() == Some(object.key.as_str()) {
                return Err(WalkError::Consumer("💥 handler said no".into()));
            }
            self.keys.lock().await.push(object.key.clone());
            Ok(())
        }
    }

    fn group(prefixes: &[&str]) -> PartitionGroup {
        PartitionGroup {
            day: Day::from_ymd(2022, 2, 28).expect("💀 day"),
            prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
        }
    }

    async fn seeded_store(page_size: usize) -> InMemoryStore {
        let the_store = InMemoryStore::new()
            .with_page_size(page_size)
            .with_latency(Duration::from_millis(1));
        for region in ["us-east-1", "eu-west-1"] {
            for i in 0..7 {
                the_store
                    .put_object(
                        "b",
                        &format!("AWSLogs/111/CloudTrail/{region}/2022/02/28/{i:02}.json.gz"),
                        vec![0u8; 10],
                    )
                    .await;
            }
        }
        the_store
    }

    #[tokio::test]
    async fn the_one_where_every_object_is_visited_exactly_once() -> Result<(), WalkError> {
        let the_store = Arc::new(seeded_store(3).await);
        let the_collector = Arc::new(KeyCollector::default());

        scan_day(
            Arc::clone(&the_store),
            "b",
            &group(&[
                "AWSLogs/111/CloudTrail/us-east-1/2022/02/28/",
                "AWSLogs/111/CloudTrail/eu-west-1/2022/02/28/",
            ]),
            Arc::clone(&the_collector),
            Arc::new(Semaphore::new(4)),
        )
        .await?;

        let mut the_keys = the_collector.keys.lock().await.clone();
        assert_eq!(the_keys.len(), 14);
        the_keys.sort();
        the_keys.dedup();
        assert_eq!(the_keys.len(), 14, "💀 somebody got visited twice");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_one_failed_unit_fails_the_day() {
        let the_store = Arc::new(seeded_store(3).await);
        the_store.fail_on("AWSLogs/111/CloudTrail/eu-west-1/").await;

        let the_result = scan_day(
            the_store,
            "b",
            &group(&[
                "AWSLogs/111/CloudTrail/us-east-1/2022/02/28/",
                "AWSLogs/111/CloudTrail/eu-west-1/2022/02/28/",
            ]),
            Arc::new(KeyCollector::default()),
            Arc::new(Semaphore::new(4)),
        )
        .await;

        match the_result {
            Err(WalkError::Store { target, .. }) => {
                assert_eq!(target, "AWSLogs/111/CloudTrail/eu-west-1/2022/02/28/")
            }
            other => panic!("💀 expected a store error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn the_one_where_handler_errors_stop_the_paging() {
        let the_store = seeded_store(2).await;
        let the_collector = KeyCollector {
            explode_on: Some("AWSLogs/111/CloudTrail/us-east-1/2022/02/28/02.json.gz".to_string()),
            ..KeyCollector::default()
        };

        let the_result = scan_prefix(
            &the_store,
            "b",
            "AWSLogs/111/CloudTrail/us-east-1/2022/02/28/",
            &the_collector,
        )
        .await;

        assert!(matches!(the_result, Err(WalkError::Consumer(_))));
        // 📄 keys 00 and 01 (page one) made it, nothing after the explosion did
        assert_eq!(the_collector.keys.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn the_one_where_an_empty_day_is_just_quiet() -> Result<(), WalkError> {
        let the_collector = Arc::new(KeyCollector::default());
        scan_day(
            Arc::new(InMemoryStore::new()),
            "b",
            &group(&["AWSLogs/111/CloudTrail/us-east-1/2022/02/28/"]),
            Arc::clone(&the_collector),
            Arc::new(Semaphore::new(1)),
        )
        .await?;
        assert!(the_collector.keys.lock().await.is_empty());
        Ok(())
    }
}
