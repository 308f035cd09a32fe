//! Node health sources

use std::time::Duration;

use async_trait::async_trait;

use crate::node::Node;
use crate::status::StatusOverride;
use crate::types::*;

/// Health reported for every node of a cluster forced up by an operator
pub const FORCED_UP_HEALTH: u32 = 100;

const HEALTH_HEADER: &str = "x-health";
const HEALTH_BODY_PREFIX: &str = "Health: ";

/// Source of node health scores. 0 means unhealthy; there is no upper bound.
#[async_trait]
pub trait HealthFetcher: Send + Sync {
    async fn current_health(&self, node: &Node) -> Result<u32>;
}

/// Probes `http://<address>:<port><path>` and reads the score from the
/// `X-Health` header, falling back to a `Health: <n>` line in the body.
pub struct HttpHealthFetcher {
    client: reqwest::Client,
}

impl HttpHealthFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IpvsError::Configuration(format!("health client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HealthFetcher for HttpHealthFetcher {
    async fn current_health(&self, node: &Node) -> Result<u32> {
        let url = format!("http://{}:{}{}", node.address(), node.port(), node.path());
        let failed = |e: reqwest::Error| IpvsError::HealthCheck {
            address: node.address().to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(&url).send().await.map_err(failed)?;

        let from_header = response
            .headers()
            .get(HEALTH_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u32>().ok());
        if let Some(health) = from_header {
            return Ok(health);
        }

        let body = response.text().await.map_err(failed)?;
        Ok(parse_health_body(&body))
    }
}

/// Digits following the first `Health: ` in the body, or 0.
pub fn parse_health_body(body: &str) -> u32 {
    body.find(HEALTH_BODY_PREFIX)
        .map(|i| &body[i + HEALTH_BODY_PREFIX.len()..])
        .map(|rest| {
            rest.chars()
                .take_while(|c| c.is_ascii_digit())
                .collect::<String>()
        })
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(0)
}

/// Applies an operator override on top of another health source for one pass.
pub struct OverrideHealth<'a> {
    inner: &'a dyn HealthFetcher,
    status: OverrideStatus,
}

impl<'a> OverrideHealth<'a> {
    pub fn new(inner: &'a dyn HealthFetcher, status: OverrideStatus) -> Self {
        Self { inner, status }
    }

    /// Look the cluster's override up once, then wrap `inner` with it.
    pub async fn resolve(
        inner: &'a dyn HealthFetcher,
        overrides: &dyn StatusOverride,
        cluster_name: &str,
    ) -> OverrideHealth<'a> {
        let status = overrides.override_status(cluster_name).await;
        Self::new(inner, status)
    }

    pub fn status(&self) -> OverrideStatus {
        self.status
    }
}

#[async_trait]
impl HealthFetcher for OverrideHealth<'_> {
    async fn current_health(&self, node: &Node) -> Result<u32> {
        match self.status {
            OverrideStatus::ForcedUp => Ok(FORCED_UP_HEALTH),
            OverrideStatus::ForcedDown => Ok(0),
            OverrideStatus::None => self.inner.current_health(node).await,
        }
    }
}
