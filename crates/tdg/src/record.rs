//! 📜 Records: one CloudTrail event, decoded, immutable, and ready to be put in its place.
//!
//! A trail log object is a batch: `{"Records": [ {...}, {...} ]}`, usually gzipped because
//! CloudTrail is thrifty with bytes. [`decode_batch`] turns one object body into records;
//! [`OrderingKey`] decides where each record sits in line.
//!
//! 🧠 Knowledge graph:
//! - Typed fields are the ones the walk and the tallies actually read.
//! - Everything else (userIdentity, requestParameters, resources, ...) rides along verbatim in
//!   `extra`, so serialising a record gives back what CloudTrail wrote.
//! - A malformed body is a terminal error. No partial recovery, no "most of the batch".

use std::io::Read;

use chrono::{DateTime, NaiveDate, Utc};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

/// 🫁 The two bytes every gzip stream starts with.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// 📜 One audit-log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(default)]
    pub event_version: String,
    pub event_time: DateTime<Utc>,
    #[serde(default)]
    pub event_source: String,
    #[serde(default)]
    pub event_name: String,
    #[serde(default)]
    pub aws_region: String,
    #[serde(rename = "eventID", default)]
    pub event_id: String,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub event_type: String,
    /// 🏷️ `true` for management events, `false` for data events.
    #[serde(default)]
    pub management_event: bool,
    #[serde(default)]
    pub recipient_account_id: String,
    #[serde(default)]
    pub event_category: String,
    /// 🎒 Every other field, carried opaquely.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Record {
    /// 📅 The UTC calendar day this event actually happened on. Not the partition's day.
    pub fn event_day(&self) -> NaiveDate {
        self.event_time.date_naive()
    }

    pub fn ordering_key(&self) -> OrderingKey {
        OrderingKey::new(self.event_time, &self.event_id)
    }
}

/// 🔢 Where a record sits in line: seconds first, then a stable hash of the event id.
///
/// The hash gives a deterministic (not chronological) order among events sharing a second.
/// Two distinct events CAN share a key; the reorder buffer keeps both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderingKey {
    pub seconds: i64,
    pub tie_break: u64,
}

impl OrderingKey {
    pub fn new(event_time: DateTime<Utc>, event_id: &str) -> Self {
        Self {
            seconds: event_time.timestamp(),
            tie_break: xxh3_64(event_id.as_bytes()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LogBatch {
    #[serde(rename = "Records", default)]
    records: Vec<Record>,
}

/// 📦 Decode one trail log object body into its records.
///
/// Gzip is sniffed from the magic bytes, so `.json` and `.json.gz` both work whatever the key
/// says. 💀 Bad gzip or bad JSON is an error for the whole body.
pub fn decode_batch(body: &[u8]) -> anyhow::Result<Vec<Record>> {
    let the_batch: LogBatch = if body.starts_with(&GZIP_MAGIC) {
        let mut the_inflated = Vec::new();
        GzDecoder::new(body).read_to_end(&mut the_inflated)?;
        serde_json::from_slice(&the_inflated)?
    } else {
        serde_json::from_slice(body)?
    };
    Ok(the_batch.records)
}
