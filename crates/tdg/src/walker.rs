//! 🚶 The Walker: days in order, partitions in parallel, records in time order.
//!
//! 🎬 COLD OPEN: a security engineer, 2:47am, types `tdg events s3://trail -d 2022/02/28`.
//! Somewhere a record stamped 23:59:59 got filed under March 1st. It will still come out
//! on February 28th, right where it belongs, between its neighbours. That's the job.
//!
//! 🧠 Knowledge graph:
//! - [`Walker::events`] plans the walk WITH the trailing day, then spawns a producer task.
//!   Per day: open the buffer, scan every partition ([`scan_day`]), drain the PREVIOUS day
//!   into a bounded channel, then wait until the consumer has taken all of it before the
//!   next day's scan starts. After the last day, drain that day too.
//! - Nothing happens until the stream is first polled.
//! - The consumer side is [`EventStream`], a `futures::Stream`. Drop it and the producer is
//!   aborted: no more listing, no more fetching.
//! - [`Walker::walk_events`] is the callback form on top of the stream.
//! - [`Walker::walk_objects`] plans WITHOUT the trailing day and never fetches a body.
//!
//! ⚠️ Buffers are keyed by the record's own UTC day. The trailing day is scanned but it is
//! outside the window, so its own records are discarded and its drain is always empty.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app_config::{AppConfig, WalkConfig};
use crate::backends::{
    IdentityBackend, ObjectRef, ObjectStore, StoreBackend, s3,
};
use crate::dates::Day;
use crate::error::WalkError;
use crate::partitions::{PartitionPlan, plan_partitions};
use crate::progress::ScanProgress;
use crate::query::QueryOptions;
use crate::record::{Record, decode_batch};
use crate::reorder::{Placement, ReorderBuffer};
use crate::scanner::{ObjectHandler, scan_day};

/// 📊 What a successful walk did, in numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WalkSummary {
    pub days_scanned: u64,
    pub objects_visited: u64,
    pub records_emitted: u64,
    pub records_out_of_window: u64,
    pub records_late: u64,
}

// 🔢 The mutable twin of WalkSummary, shared across scan units.
#[derive(Debug, Default)]
struct WalkCounters {
    days_scanned: AtomicU64,
    objects_visited: AtomicU64,
    records_emitted: AtomicU64,
    records_out_of_window: AtomicU64,
    records_late: AtomicU64,
}

impl WalkCounters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn snapshot(&self) -> WalkSummary {
        WalkSummary {
            days_scanned: self.days_scanned.load(Ordering::Relaxed),
            objects_visited: self.objects_visited.load(Ordering::Relaxed),
            records_emitted: self.records_emitted.load(Ordering::Relaxed),
            records_out_of_window: self.records_out_of_window.load(Ordering::Relaxed),
            records_late: self.records_late.load(Ordering::Relaxed),
        }
    }
}

/// 📨 What travels from the producer task to the [`EventStream`].
#[derive(Debug)]
enum WalkMessage {
    Record(Box<Record>),
    /// 🤝 Every record of a drained day is ahead of this. Fire it once they are all consumed.
    DayDrained(oneshot::Sender<()>),
    Finished(WalkSummary),
    Failed(WalkError),
}

/// 🚶 Walks a CloudTrail bucket. Cheap to clone; clones share the same store and identity.
#[derive(Debug, Clone)]
pub struct Walker {
    store: Arc<StoreBackend>,
    identity: Arc<IdentityBackend>,
    config: WalkConfig,
}

impl Walker {
    pub fn new(store: StoreBackend, identity: IdentityBackend, config: WalkConfig) -> Self {
        Self {
            store: Arc::new(store),
            identity: Arc::new(identity),
            config,
        }
    }

    /// 🚀 A walker on real S3 and STS, configured from `app_config`.
    pub async fn connect(app_config: &AppConfig) -> Self {
        let (the_store, the_identity) = s3::connect(&app_config.aws).await;
        Self::new(the_store, the_identity, app_config.walk.clone())
    }

    pub fn config(&self) -> &WalkConfig {
        &self.config
    }

    /// 🗺️ Resolve days, accounts and regions into the per-day prefixes a walk would scan.
    pub async fn plan(
        &self,
        location: &str,
        opt: &QueryOptions,
        with_trailing_day: bool,
    ) -> Result<PartitionPlan, WalkError> {
        plan_partitions(
            self.store.as_ref(),
            self.identity.as_ref(),
            location,
            opt,
            with_trailing_day,
        )
        .await
    }

    /// 🌊 Every in-window record, in time order, as a lazy stream.
    ///
    /// Nothing is planned or listed until the returned stream is polled for the first time.
    /// The next day's scan waits until every record drained so far has been taken from the
    /// stream, so a consumer that stops early never causes a later day's scan.
    pub fn events(&self, location: &str, opt: &QueryOptions) -> EventStream {
        let (tx, rx) = async_channel::bounded(self.config.channel_capacity.max(1));
        let (the_go, the_go_signal) = oneshot::channel();
        let the_walker = self.clone();
        let the_location = location.to_string();
        let the_options = opt.clone();
        let producer = tokio::spawn(async move {
            // 🚦 first poll, or never
            if the_go_signal.await.is_ok() {
                the_walker.produce_events(the_location, the_options, tx).await;
            }
        });
        EventStream {
            rx: Box::pin(rx),
            start: Some(the_go),
            producer,
            summary: None,
            done: false,
        }
    }

    /// 📞 Callback form of [`Walker::events`]. The first consumer error stops the walk.
    pub async fn walk_events<F>(
        &self,
        location: &str,
        opt: &QueryOptions,
        mut consumer: F,
    ) -> Result<WalkSummary, WalkError>
    where
        F: FnMut(Record) -> anyhow::Result<()>,
    {
        let mut the_stream = self.events(location, opt);
        while let Some(the_item) = the_stream.next().await {
            consumer(the_item?).map_err(|e| WalkError::Consumer(e.into()))?;
        }
        Ok(the_stream.summary().copied().unwrap_or_default())
    }

    /// 📦 Visit every object reference in the requested days. No bodies, no ordering.
    ///
    /// ⚠️ The visitor is called from whichever scan unit found the object, possibly at the
    /// same time from several. Anything it accumulates needs its own lock.
    pub async fn walk_objects<F>(
        &self,
        location: &str,
        opt: &QueryOptions,
        visitor: F,
    ) -> Result<WalkSummary, WalkError>
    where
        F: Fn(&ObjectRef) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let the_plan = self.plan(location, opt, false).await?;
        let the_progress = Arc::new(ScanProgress::new(self.config.show_progress));
        let the_counters = Arc::new(WalkCounters::default());
        let the_handler = Arc::new(ObjectVisitor {
            visitor,
            progress: Arc::clone(&the_progress),
            counters: Arc::clone(&the_counters),
        });
        let the_limiter = Arc::new(Semaphore::new(self.config.max_concurrent_scans.max(1)));

        for group in &the_plan.groups {
            the_progress.start_day(group.day, group.prefixes.len());
            scan_day(
                Arc::clone(&self.store),
                &the_plan.bucket,
                group,
                Arc::clone(&the_handler),
                Arc::clone(&the_limiter),
            )
            .await?;
            WalkCounters::bump(&the_counters.days_scanned, 1);
        }
        the_progress.finish();

        let the_summary = the_counters.snapshot();
        info!(
            "📦 object walk done: {} days, {} objects",
            the_summary.days_scanned, the_summary.objects_visited
        );
        Ok(the_summary)
    }

    async fn produce_events(self, location: String, opt: QueryOptions, tx: Sender<WalkMessage>) {
        let the_last_word = match self.drive_events(&location, &opt, &tx).await {
            Ok(Some(summary)) => WalkMessage::Finished(summary),
            // 🚪 the consumer left; nobody to tell
            Ok(None) => return,
            Err(e) => WalkMessage::Failed(e),
        };
        let _ = tx.send(the_last_word).await;
    }

    /// 🔁 The day loop. `Ok(None)` means the consumer hung up mid-walk.
    async fn drive_events(
        &self,
        location: &str,
        opt: &QueryOptions,
        tx: &Sender<WalkMessage>,
    ) -> Result<Option<WalkSummary>, WalkError> {
        let the_plan = self.plan(location, opt, true).await?;
        let (Some(the_first), Some(the_trailing)) = (the_plan.groups.first(), the_plan.groups.last())
        else {
            return Ok(Some(WalkSummary::default()));
        };
        // 📅 the window ends the day before the trailing day
        let the_last_requested = the_plan
            .groups
            .iter()
            .rev()
            .nth(1)
            .map_or(the_first.day, |g| g.day);

        let the_buffer = Arc::new(Mutex::new(ReorderBuffer::new(the_first.day, the_last_requested)));
        let the_progress = Arc::new(ScanProgress::new(self.config.show_progress));
        let the_counters = Arc::new(WalkCounters::default());
        let the_handler = Arc::new(EventCollector {
            store: Arc::clone(&self.store),
            buffer: Arc::clone(&the_buffer),
            progress: Arc::clone(&the_progress),
            counters: Arc::clone(&the_counters),
        });
        let the_limiter = Arc::new(Semaphore::new(self.config.max_concurrent_scans.max(1)));

        for group in &the_plan.groups {
            the_buffer.lock().await.open_day(group.day);
            the_progress.start_day(group.day, group.prefixes.len());
            scan_day(
                Arc::clone(&self.store),
                &the_plan.bucket,
                group,
                Arc::clone(&the_handler),
                Arc::clone(&the_limiter),
            )
            .await?;
            WalkCounters::bump(&the_counters.days_scanned, 1);

            if let Some(the_previous) = group.day.prev()
                && !drain_day(&the_buffer, the_previous, tx, &the_counters, &the_progress).await
            {
                return Ok(None);
            }
            if !consumer_caught_up(tx).await {
                return Ok(None);
            }
        }
        if !drain_day(&the_buffer, the_trailing.day, tx, &the_counters, &the_progress).await {
            return Ok(None);
        }
        the_progress.finish();

        let the_summary = the_counters.snapshot();
        info!(
            "🏁 event walk done: {} days, {} objects, {} records",
            the_summary.days_scanned, the_summary.objects_visited, the_summary.records_emitted
        );
        Ok(Some(the_summary))
    }
}

/// 🤝 Wait until the consumer has taken everything sent so far. `false` when it is gone.
async fn consumer_caught_up(tx: &Sender<WalkMessage>) -> bool {
    let (the_ack, the_ack_signal) = oneshot::channel();
    if tx.send(WalkMessage::DayDrained(the_ack)).await.is_err() {
        return false;
    }
    the_ack_signal.await.is_ok()
}

/// 🚰 Hand `day`'s records to the channel in key order. `false` when the receiver is gone.
async fn drain_day(
    buffer: &Mutex<ReorderBuffer>,
    day: Day,
    tx: &Sender<WalkMessage>,
    counters: &WalkCounters,
    progress: &ScanProgress,
) -> bool {
    let Some(the_day_buffer) = buffer.lock().await.take_day(day) else {
        return true;
    };
    debug!("🚰 draining {} records for {}", the_day_buffer.len(), day);
    for record in the_day_buffer.into_records() {
        if tx.send(WalkMessage::Record(Box::new(record))).await.is_err() {
            debug!("🚪 event consumer went away during the drain of {}", day);
            return false;
        }
        WalkCounters::bump(&counters.records_emitted, 1);
        progress.records_emitted(1);
    }
    true
}

/// 📥 Fetch, decode, and file every record of an object into the reorder buffer.
struct EventCollector {
    store: Arc<StoreBackend>,
    buffer: Arc<Mutex<ReorderBuffer>>,
    progress: Arc<ScanProgress>,
    counters: Arc<WalkCounters>,
}

#[async_trait]
impl ObjectHandler for EventCollector {
    async fn handle(&self, bucket: &str, object: &ObjectRef) -> Result<(), WalkError> {
        let the_body = self
            .store
            .get_object(bucket, &object.key)
            .await
            .map_err(|e| WalkError::store(bucket, &object.key, e))?;
        self.progress.object_visited(the_body.len() as u64);
        WalkCounters::bump(&self.counters.objects_visited, 1);

        let the_records =
            decode_batch(&the_body).map_err(|e| WalkError::decode(bucket, &object.key, e))?;
        debug!(key = %object.key, records = the_records.len(), "📜 decoded trail log");

        let (mut the_outsiders, mut the_latecomers) = (0u64, 0u64);
        {
            let mut the_buffer = self.buffer.lock().await;
            for record in the_records {
                match the_buffer.place(record) {
                    Placement::OutOfWindow => the_outsiders += 1,
                    Placement::Late => the_latecomers += 1,
                    Placement::Buffered | Placement::Duplicate => {}
                }
            }
        }
        if the_latecomers > 0 {
            warn!(
                "⏰ {} records in s3://{}/{} belong to a day that was already emitted; dropped",
                the_latecomers, bucket, object.key
            );
        }
        WalkCounters::bump(&self.counters.records_out_of_window, the_outsiders);
        WalkCounters::bump(&self.counters.records_late, the_latecomers);
        Ok(())
    }
}

/// 📦 Hands each object reference to the caller's visitor.
struct ObjectVisitor<F> {
    visitor: F,
    progress: Arc<ScanProgress>,
    counters: Arc<WalkCounters>,
}

#[async_trait]
impl<F> ObjectHandler for ObjectVisitor<F>
where
    F: Fn(&ObjectRef) -> anyhow::Result<()> + Send + Sync + 'static,
{
    async fn handle(&self, _bucket: &str, object: &ObjectRef) -> Result<(), WalkError> {
        self.progress.object_visited(object.size);
        WalkCounters::bump(&self.counters.objects_visited, 1);
        (self.visitor)(object).map_err(|e| WalkError::Consumer(e.into()))
    }
}

/// 🌊 The records of one walk, in order. Finite, not restartable.
///
/// Yields `Err` at most once, and then ends. Dropping it aborts the walk.
#[derive(Debug)]
pub struct EventStream {
    rx: Pin<Box<Receiver<WalkMessage>>>,
    start: Option<oneshot::Sender<()>>,
    producer: JoinHandle<()>,
    summary: Option<WalkSummary>,
    done: bool,
}

impl EventStream {
    /// 📊 Available once the stream has ended successfully.
    pub fn summary(&self) -> Option<&WalkSummary> {
        self.summary.as_ref()
    }
}

impl Stream for EventStream {
    type Item = Result<Record, WalkError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        if let Some(the_go) = self.start.take() {
            let _ = the_go.send(());
        }
        loop {
            return match self.rx.as_mut().poll_next(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(Some(WalkMessage::Record(record))) => Poll::Ready(Some(Ok(*record))),
                Poll::Ready(Some(WalkMessage::DayDrained(ack))) => {
                    // 🤝 everything before this was consumed; the next day may start
                    let _ = ack.send(());
                    continue;
                }
                Poll::Ready(Some(WalkMessage::Finished(summary))) => {
                    self.summary = Some(summary);
                    self.done = true;
                    Poll::Ready(None)
                }
                Poll::Ready(Some(WalkMessage::Failed(e))) => {
                    self.done = true;
                    Poll::Ready(Some(Err(e)))
                }
                Poll::Ready(None) => {
                    // 💀 the producer died without saying goodbye (panic or abort)
                    self.done = true;
                    Poll::Ready(Some(Err(WalkError::Task {
                        prefix: "the event walk".to_string(),
                        source: "walk producer stopped before finishing".into(),
                    })))
                }
            };
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.producer.abort();
    }
}
