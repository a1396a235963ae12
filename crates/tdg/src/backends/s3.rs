//! 🪣📡 The real deal: S3 for objects, STS for identity.
//!
//! INT. AWS CONSOLE. NIGHT. A trail bucket sits in ap-northeast-1, quietly collecting
//! one gzipped JSON file every five minutes per region per account, since 2019.
//! Nobody has looked at it. Tonight, somebody will. 🔦
//!
//! 🧠 Knowledge graph:
//! - Transport: `ListObjectsV2` (paged by continuation token), `ListObjectsV2` with a `/`
//!   delimiter for discovery, `GetObject` → `ByteStream::collect()` for bodies.
//! - Config: `aws-config` defaults chain (env vars → profile → IMDS → hope), with the
//!   overrides from [`AwsConfig`] layered on top.
//! - Identity: `GetCallerIdentity` for the account, the SDK config for the default region.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use bytes::Bytes;
use tracing::{debug, trace};

use crate::app_config::AwsConfig;
use crate::backends::{
    IdentityBackend, IdentityProvider, ListPage, ObjectRef, ObjectStore, StoreBackend, child_name,
};

/// 🪣 S3-backed [`ObjectStore`].
#[derive(Debug, Clone)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
}

/// 🪪 STS-backed [`IdentityProvider`].
#[derive(Debug, Clone)]
pub struct StsIdentity {
    client: aws_sdk_sts::Client,
    region: Option<String>,
}

/// 🚀 Build both AWS collaborators from one shared SDK config.
///
/// 💀 Does not fail on missing credentials. That happens on the first request, which is
/// where the SDK wants to find out too.
pub async fn connect(aws: &AwsConfig) -> (StoreBackend, IdentityBackend) {
    let mut the_loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = &aws.region {
        the_loader = the_loader.region(aws_sdk_s3::config::Region::new(region.clone()));
    }
    if let Some(profile) = &aws.profile {
        the_loader = the_loader.profile_name(profile);
    }
    if let Some(endpoint) = &aws.endpoint_url {
        the_loader = the_loader.endpoint_url(endpoint);
    }
    let the_sdk_config = the_loader.load().await;
    let the_region = the_sdk_config.region().map(|r| r.to_string());
    debug!("🔧 AWS config loaded, default region {:?}", the_region);

    let the_s3_config = aws_sdk_s3::config::Builder::from(&the_sdk_config)
        .force_path_style(aws.force_path_style)
        .build();

    (
        StoreBackend::S3(S3Store {
            client: aws_sdk_s3::Client::from_conf(the_s3_config),
        }),
        IdentityBackend::Sts(StsIdentity {
            client: aws_sdk_sts::Client::new(&the_sdk_config),
            region: the_region,
        }),
    )
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage> {
        let the_response = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(continuation)
            .send()
            .await
            .with_context(|| format!("💀 ListObjectsV2 failed for s3://{bucket}/{prefix}"))?;

        let objects: Vec<ObjectRef> = the_response
            .contents()
            .iter()
            .filter_map(|o| {
                o.key().map(|key| ObjectRef {
                    key: key.to_string(),
                    size: o.size().unwrap_or(0).max(0) as u64,
                })
            })
            .collect();
        trace!("📄 s3://{}/{} page with {} objects", bucket, prefix, objects.len());

        Ok(ListPage {
            objects,
            next_continuation: the_response.next_continuation_token().map(str::to_string),
        })
    }

    async fn discover_children(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let mut the_children = Vec::new();
        let mut the_token: Option<String> = None;
        loop {
            let the_response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .delimiter("/")
                .set_continuation_token(the_token.take())
                .send()
                .await
                .with_context(|| {
                    format!("💀 delimiter listing failed for s3://{bucket}/{prefix}")
                })?;

            the_children.extend(
                the_response
                    .common_prefixes()
                    .iter()
                    .filter_map(|cp| cp.prefix())
                    .filter_map(|p| child_name(prefix, p)),
            );

            match the_response.next_continuation_token() {
                Some(next) => the_token = Some(next.to_string()),
                None => break,
            }
        }
        Ok(the_children)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let the_response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("💀 GetObject failed for s3://{bucket}/{key}"))?;
        let the_body = the_response
            .body
            .collect()
            .await
            .with_context(|| format!("💀 body of s3://{bucket}/{key} ended early"))?;
        Ok(the_body.into_bytes())
    }
}

#[async_trait]
impl IdentityProvider for StsIdentity {
    async fn caller_account(&self) -> Result<String> {
        let the_identity = self
            .client
            .get_caller_identity()
            .send()
            .await
            .context("💀 GetCallerIdentity failed. Are there credentials in this shell at all?")?;
        the_identity
            .account()
            .map(str::to_string)
            .context("💀 GetCallerIdentity answered without an account id")
    }

    fn default_region(&self) -> Option<String> {
        self.region.clone()
    }
}
