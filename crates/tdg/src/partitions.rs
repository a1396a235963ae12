//! 🗂️ Partition planning: from `s3://bucket/AWSLogs` plus a query to the exact list of
//! prefixes to scan, grouped by day.
//!
//! CloudTrail lays its logs out as
//! `<prefix>/<account>/CloudTrail/<region>/<YYYY>/<MM>/<DD>/<file>.json.gz`, so one
//! partition is one account × one region × one day. We build every partition the query
//! asks for, day by day, in day order.
//!
//! 🧠 Knowledge graph:
//! - [`Location::parse`] and the date resolver run before any network call. Bad input fails
//!   fast and for free.
//! - Accounts: all (discover) > explicit list > the caller's own account (identity lookup).
//! - Regions, per account: all (discover) > explicit list > the caller's default region.
//! - [`build_groups`] is pure path arithmetic; the store is only consulted for discovery.

use tracing::debug;

use crate::backends::{IdentityProvider, ObjectStore};
use crate::dates::{Day, resolve_days};
use crate::error::WalkError;
use crate::query::QueryOptions;

/// 🏷️ What CloudTrail calls the top of its tree when nobody configured anything else.
pub const DEFAULT_BASE_PREFIX: &str = "AWSLogs";

const SCHEME: &str = "s3://";

/// 🪣 A parsed `s3://<bucket>[/<prefix>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub bucket: String,
    /// 🗂️ Base prefix without leading or trailing slashes. `AWSLogs` if the location had none.
    pub prefix: String,
}

impl Location {
    /// 🔍 Parse a location string. 💀 `InvalidLocation` for the wrong scheme or no bucket.
    pub fn parse(dsn: &str) -> Result<Self, WalkError> {
        let the_rest = dsn
            .strip_prefix(SCHEME)
            .ok_or_else(|| WalkError::InvalidLocation(dsn.to_string()))?;
        let (bucket, prefix) = the_rest.split_once('/').unwrap_or((the_rest, ""));
        if bucket.is_empty() {
            return Err(WalkError::InvalidLocation(dsn.to_string()));
        }
        let prefix = prefix.trim_matches('/');
        Ok(Self {
            bucket: bucket.to_string(),
            prefix: if prefix.is_empty() {
                DEFAULT_BASE_PREFIX.to_string()
            } else {
                prefix.to_string()
            },
        })
    }

    /// 🏷️ Prepend CloudTrail's log file prefix, if the query has one.
    pub fn with_log_file_prefix(mut self, log_file_prefix: Option<&str>) -> Self {
        if let Some(the_lfp) = log_file_prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
            self.prefix = format!("{}/{}", the_lfp, self.prefix);
        }
        self
    }
}

/// 📅 One day and every prefix to scan for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionGroup {
    pub day: Day,
    pub prefixes: Vec<String>,
}

/// 🗺️ The whole plan for one walk: the bucket, and the groups in day order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    pub bucket: String,
    pub groups: Vec<PartitionGroup>,
}

/// 🌳 `<base>/<account>/CloudTrail/<region>`
pub fn trail_root(base: &str, account: &str, region: &str) -> String {
    format!("{base}/{account}/CloudTrail/{region}")
}

/// 🧮 Roots × days → one group per day, each with `<root>/<YYYY>/<MM>/<DD>/` for every root.
pub fn build_groups(roots: &[String], days: &[Day]) -> Vec<PartitionGroup> {
    days.iter()
        .map(|day| PartitionGroup {
            day: *day,
            prefixes: roots.iter().map(|root| format!("{}/{}/", root, day.path())).collect(),
        })
        .collect()
}

/// 🗺️ Plan a walk: parse, resolve days, resolve accounts and regions, build the groups.
pub async fn plan_partitions<S, I>(
    store: &S,
    identity: &I,
    location: &str,
    opt: &QueryOptions,
    with_trailing_day: bool,
) -> Result<PartitionPlan, WalkError>
where
    S: ObjectStore + ?Sized,
    I: IdentityProvider + ?Sized,
{
    let the_location = Location::parse(location)?.with_log_file_prefix(opt.log_file_prefix.as_deref());
    let the_days = resolve_days(opt, with_trailing_day)?;

    let the_accounts = resolve_accounts(store, identity, &the_location, opt).await?;
    let mut the_roots = Vec::new();
    for account in &the_accounts {
        for region in resolve_regions(store, identity, &the_location, account, opt).await? {
            the_roots.push(trail_root(&the_location.prefix, account, &region));
        }
    }
    debug!(
        "🗺️ planned {} roots × {} days under s3://{}/{}",
        the_roots.len(),
        the_days.len(),
        the_location.bucket,
        the_location.prefix
    );

    Ok(PartitionPlan {
        groups: build_groups(&the_roots, &the_days),
        bucket: the_location.bucket,
    })
}

/// 🔢 Accounts to scan, in priority order: discover, explicit, caller's own.
pub async fn resolve_accounts<S, I>(
    store: &S,
    identity: &I,
    location: &Location,
    opt: &QueryOptions,
) -> Result<Vec<String>, WalkError>
where
    S: ObjectStore + ?Sized,
    I: IdentityProvider + ?Sized,
{
    if opt.all_accounts {
        let the_parent = format!("{}/", location.prefix);
        let the_accounts = store
            .discover_children(&location.bucket, &the_parent)
            .await
            .map_err(|e| WalkError::store(&location.bucket, &the_parent, e))?;
        debug!("🔭 discovered {} accounts under {}", the_accounts.len(), the_parent);
        return Ok(the_accounts);
    }
    if !opt.accounts.is_empty() {
        return Ok(dedup(&opt.accounts));
    }
    let the_account = identity
        .caller_account()
        .await
        .map_err(|e| WalkError::store(&location.bucket, "sts:GetCallerIdentity", e))?;
    Ok(vec![the_account])
}

/// 🌎 Regions to scan for one account, in priority order: discover, explicit, default.
pub async fn resolve_regions<S, I>(
    store: &S,
    identity: &I,
    location: &Location,
    account: &str,
    opt: &QueryOptions,
) -> Result<Vec<String>, WalkError>
where
    S: ObjectStore + ?Sized,
    I: IdentityProvider + ?Sized,
{
    if opt.all_regions {
        let the_parent = format!("{}/{}/CloudTrail/", location.prefix, account);
        return store
            .discover_children(&location.bucket, &the_parent)
            .await
            .map_err(|e| WalkError::store(&location.bucket, &the_parent, e));
    }
    if !opt.regions.is_empty() {
        return Ok(dedup(&opt.regions));
    }
    identity.default_region().map(|r| vec![r]).ok_or_else(|| {
        WalkError::Config(
            "no region selected: pass regions, ask for all regions, or configure a default region"
                .to_string(),
        )
    })
}

// 🧹 Keep first occurrences, keep order. Scanning the same partition twice buys nothing.
fn dedup(items: &[String]) -> Vec<String> {
    let mut the_seen = Vec::with_capacity(items.len());
    for item in items {
        if !item.is_empty() && !the_seen.contains(item) {
            the_seen.push(item.clone());
        }
    }
    the_seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{InMemoryStore, StaticIdentity, StoreOp};

    fn the_identity() -> StaticIdentity {
        StaticIdentity::new("123456789012", Some("ap-northeast-1"))
    }

    #[test]
    fn the_one_where_locations_parse_or_get_bounced() {
        assert_eq!(
            Location::parse("s3://bucket/AWSLogs").ok(),
            Some(Location { bucket: "bucket".into(), prefix: "AWSLogs".into() })
        );
        assert_eq!(
            Location::parse("s3://bucket").ok(),
            Some(Location { bucket: "bucket".into(), prefix: "AWSLogs".into() })
        );
        assert_eq!(
            Location::parse("s3://bucket/").ok(),
            Some(Location { bucket: "bucket".into(), prefix: "AWSLogs".into() })
        );
        assert_eq!(
            Location::parse("s3://bucket/org/trail/AWSLogs/").ok(),
            Some(Location { bucket: "bucket".into(), prefix: "org/trail/AWSLogs".into() })
        );

        for the_reject in ["", "s3://", "s3:///AWSLogs", "gs://bucket/AWSLogs", "bucket/AWSLogs"] {
            assert!(
                matches!(Location::parse(the_reject), Err(WalkError::InvalidLocation(_))),
                "💀 '{}' should be InvalidLocation",
                the_reject
            );
        }
    }

    #[test]
    fn the_one_where_the_log_file_prefix_goes_in_front() {
        let the_location = Location::parse("s3://bucket")
            .expect("💀 valid")
            .with_log_file_prefix(Some("/my-trail/"));
        assert_eq!(the_location.prefix, "my-trail/AWSLogs");

        let the_untouched = Location::parse("s3://bucket/AWSLogs")
            .expect("💀 valid")
            .with_log_file_prefix(Some(""));
        assert_eq!(the_untouched.prefix, "AWSLogs");
    }

    #[test]
    fn the_one_where_roots_and_days_multiply_in_day_order() {
        let the_roots = vec![
            trail_root("AWSLogs", "111", "us-east-1"),
            trail_root("AWSLogs", "222", "eu-west-1"),
        ];
        let the_days = vec![
            Day::from_ymd(2022, 2, 28).expect("💀 day"),
            Day::from_ymd(2022, 3, 1).expect("💀 day"),
        ];

        let the_groups = build_groups(&the_roots, &the_days);
        assert_eq!(the_groups.len(), 2);
        assert_eq!(the_groups[0].day, the_days[0]);
        assert_eq!(
            the_groups[0].prefixes,
            vec![
                "AWSLogs/111/CloudTrail/us-east-1/2022/02/28/",
                "AWSLogs/222/CloudTrail/eu-west-1/2022/02/28/",
            ]
        );
        assert_eq!(
            the_groups[1].prefixes,
            vec![
                "AWSLogs/111/CloudTrail/us-east-1/2022/03/01/",
                "AWSLogs/222/CloudTrail/eu-west-1/2022/03/01/",
            ]
        );
    }

    #[tokio::test]
    async fn the_one_where_defaults_come_from_the_caller_identity() -> Result<(), WalkError> {
        let the_store = InMemoryStore::new();
        let the_plan = plan_partitions(
            &the_store,
            &the_identity(),
            "s3://bucket/AWSLogs",
            &QueryOptions::for_date("2022/02/28"),
            true,
        )
        .await?;

        assert_eq!(the_plan.bucket, "bucket");
        assert_eq!(the_plan.groups.len(), 2);
        assert_eq!(
            the_plan.groups[0].prefixes,
            vec!["AWSLogs/123456789012/CloudTrail/ap-northeast-1/2022/02/28/"]
        );
        assert_eq!(
            the_plan.groups[1].prefixes,
            vec!["AWSLogs/123456789012/CloudTrail/ap-northeast-1/2022/03/01/"]
        );
        // 🤫 purely computational: nobody talked to the store
        assert!(the_store.operations().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_explicit_lists_beat_the_identity() -> Result<(), WalkError> {
        let the_store = InMemoryStore::new();
        let the_opt = QueryOptions {
            accounts: vec!["111".into(), "222".into(), "111".into()],
            regions: vec!["us-east-1".into(), "eu-west-1".into()],
            ..QueryOptions::for_date("2022/02/28")
        };

        let the_plan = plan_partitions(&the_store, &the_identity(), "s3://bucket", &the_opt, false).await?;
        assert_eq!(the_plan.groups.len(), 1);
        assert_eq!(
            the_plan.groups[0].prefixes,
            vec![
                "AWSLogs/111/CloudTrail/us-east-1/2022/02/28/",
                "AWSLogs/111/CloudTrail/eu-west-1/2022/02/28/",
                "AWSLogs/222/CloudTrail/us-east-1/2022/02/28/",
                "AWSLogs/222/CloudTrail/eu-west-1/2022/02/28/",
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_all_means_go_and_look() -> Result<(), WalkError> {
        let the_store = InMemoryStore::new();
        the_store.put_object("bucket", "AWSLogs/111/CloudTrail/us-east-1/2022/02/28/a.json.gz", "x").await;
        the_store.put_object("bucket", "AWSLogs/222/CloudTrail/eu-west-1/2022/02/28/b.json.gz", "x").await;
        the_store.put_object("bucket", "AWSLogs/222/CloudTrail/us-west-2/2022/02/27/c.json.gz", "x").await;
        let the_opt = QueryOptions {
            all_accounts: true,
            all_regions: true,
            accounts: vec!["ignored".into()],
            ..QueryOptions::for_date("2022/02/28")
        };

        let the_plan = plan_partitions(&the_store, &the_identity(), "s3://bucket/AWSLogs", &the_opt, false).await?;
        assert_eq!(
            the_plan.groups[0].prefixes,
            vec![
                "AWSLogs/111/CloudTrail/us-east-1/2022/02/28/",
                "AWSLogs/222/CloudTrail/eu-west-1/2022/02/28/",
                "AWSLogs/222/CloudTrail/us-west-2/2022/02/28/",
            ]
        );
        assert_eq!(
            the_store.operations().await,
            vec![
                StoreOp::Discover { prefix: "AWSLogs/".into() },
                StoreOp::Discover { prefix: "AWSLogs/111/CloudTrail/".into() },
                StoreOp::Discover { prefix: "AWSLogs/222/CloudTrail/".into() },
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_no_region_anywhere_is_a_config_problem() {
        let the_store = InMemoryStore::new();
        let the_regionless = StaticIdentity::new("123456789012", None);
        let the_result = plan_partitions(
            &the_store,
            &the_regionless,
            "s3://bucket",
            &QueryOptions::for_date("2022/02/28"),
            false,
        )
        .await;
        assert!(matches!(the_result, Err(WalkError::Config(_))), "{:?}", the_result);
    }

    #[tokio::test]
    async fn the_one_where_bad_input_never_reaches_the_network() {
        let the_store = InMemoryStore::new();
        let the_bad_location = plan_partitions(
            &the_store,
            &the_identity(),
            "https://bucket",
            &QueryOptions::for_date("2022/02/28"),
            false,
        )
        .await;
        assert!(matches!(the_bad_location, Err(WalkError::InvalidLocation(_))));

        let the_bad_date = plan_partitions(
            &the_store,
            &the_identity(),
            "s3://bucket",
            &QueryOptions { all_accounts: true, ..QueryOptions::for_date("2022/14") },
            false,
        )
        .await;
        assert!(matches!(the_bad_date, Err(WalkError::InvalidDate(_))));
        assert!(the_store.operations().await.is_empty());
    }

    #[tokio::test]
    async fn the_one_where_a_failed_discovery_is_a_store_error() {
        let the_store = InMemoryStore::new();
        the_store.fail_on("AWSLogs/").await;
        let the_result = plan_partitions(
            &the_store,
            &the_identity(),
            "s3://bucket",
            &QueryOptions { all_accounts: true, ..QueryOptions::for_date("2022/02/28") },
            false,
        )
        .await;
        assert!(matches!(the_result, Err(WalkError::Store { .. })), "{:?}", the_result);
    }
}
