//! 🕵️ tdg: dig through CloudTrail logs in S3, one day at a time, in the order things happened.
//!
//! A trail bucket is laid out `<prefix>/<account>/CloudTrail/<region>/<YYYY>/<MM>/<DD>/`,
//! one gzipped batch of records every few minutes. This crate plans which of those
//! partitions to read, scans each day's partitions in parallel, and hands back the records
//! sorted by event time, including the ones CloudTrail filed under the next day.
//!
//! ```no_run
//! # async fn demo() -> Result<(), tdg::WalkError> {
//! let the_config = tdg::load_config(None)?;
//! let the_walker = tdg::Walker::connect(&the_config).await;
//! let the_summary = the_walker
//!     .walk_events("s3://my-trail/AWSLogs", &tdg::QueryOptions::for_date("2022/02/28"), |record| {
//!         println!("{} {}", record.event_time, record.event_name);
//!         Ok(())
//!     })
//!     .await?;
//! println!("{} records", the_summary.records_emitted);
//! # Ok(())
//! # }
//! ```

pub mod app_config;
pub mod backends;
pub mod dates;
pub mod error;
pub mod partitions;
pub mod progress;
pub mod query;
pub mod record;
pub mod reorder;
mod scanner;
pub mod tally;
pub mod walker;

pub use app_config::{AppConfig, AwsConfig, WalkConfig, load_config};
pub use backends::{IdentityBackend, ObjectRef, StoreBackend};
pub use dates::{Day, resolve_days};
pub use error::WalkError;
pub use partitions::{Location, PartitionPlan};
pub use query::QueryOptions;
pub use record::{OrderingKey, Record, decode_batch};
pub use tally::{EventTally, SizeTally};
pub use walker::{EventStream, WalkSummary, Walker};
