//! 💀 Errors: the many ways a walk through the trail can end in tears.
//!
//! Every kind here is fatal to the walk that raised it. There is no retry,
//! no partial success, no "well, we got most of it". The first error wins
//! and the walk goes home. 🦆
//!
//! 🧠 Knowledge graph:
//! - Collaborators (`ObjectStore`, `IdentityProvider`) speak `anyhow`, like every backend in
//!   this crate. The walk wraps their errors into [`WalkError::Store`] with the bucket and
//!   prefix/key that blew up, so the 3am reader knows WHERE.
//! - Consumers also speak `anyhow`. Their failures become [`WalkError::Consumer`].
//! - Config and date/location problems are raised before any network call.

/// 📦 The boxed source every wrapped error rides in. `anyhow::Error` converts into it for free.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 💀 Everything that can stop a walk.
#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    /// 🪣 The location was not `s3://<bucket>[/<prefix>]`.
    #[error("invalid s3 bucket url: {0}")]
    InvalidLocation(String),

    /// 📅 A date option was malformed or contradictory.
    #[error("invalid date format: {0}")]
    InvalidDate(String),

    /// 📡 The object store (or identity service) said no.
    #[error("store request failed for s3://{bucket}/{target}")]
    Store {
        bucket: String,
        target: String,
        #[source]
        source: BoxError,
    },

    /// 🧨 An object body was not a valid record batch.
    #[error("failed to decode trail log s3://{bucket}/{key}")]
    Decode {
        bucket: String,
        key: String,
        #[source]
        source: BoxError,
    },

    /// 🙅 The caller's consumer returned an error. We stopped, as asked.
    #[error("consumer rejected a record")]
    Consumer(#[source] BoxError),

    /// 🔧 Configuration could not be loaded.
    #[error("failed to load configuration: {0}")]
    Config(String),

    /// 🧵 A scan unit panicked or was cancelled before finishing.
    #[error("scan task for {prefix} did not finish")]
    Task {
        prefix: String,
        #[source]
        source: BoxError,
    },
}

impl WalkError {
    /// 📡 Wrap a collaborator failure with the bucket and target it was talking about.
    pub(crate) fn store(bucket: &str, target: &str, source: impl Into<BoxError>) -> Self {
        WalkError::Store {
            bucket: bucket.to_string(),
            target: target.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn decode(bucket: &str, key: &str, source: impl Into<BoxError>) -> Self {
        WalkError::Decode {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_store_errors_remember_where_they_happened() {
        let the_error = WalkError::store(
            "trail-bucket",
            "AWSLogs/123/CloudTrail/ap-northeast-1/2022/02/28/",
            anyhow::anyhow!("503 slow down"),
        );

        assert_eq!(
            the_error.to_string(),
            "store request failed for s3://trail-bucket/AWSLogs/123/CloudTrail/ap-northeast-1/2022/02/28/"
        );
        // 🧅 the cause survives the wrapping
        let the_cause = std::error::Error::source(&the_error).map(|e| e.to_string());
        assert_eq!(the_cause.as_deref(), Some("503 slow down"));
    }

    #[test]
    fn the_one_where_bad_dates_say_what_they_were() {
        let the_error = WalkError::InvalidDate("2022/13".to_string());
        assert_eq!(the_error.to_string(), "invalid date format: 2022/13");
    }
}
