//! PatchPlanner — the capability consumed from the remote authoring
//! service that proposes recipe patches (§1/§6). The service itself is out
//! of scope; this module defines the request/response shapes and an
//! optional HTTP-backed client.

use crate::context::ErrorType;
use crate::patch::PatchPayload;
use crate::recipe::ActionRef;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchRequest {
    pub request_id: Uuid,
    pub step_id: String,
    pub error_type: ErrorType,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_action: Option<ActionRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_base64: Option<String>,
}

#[async_trait]
pub trait PatchPlanner: Send + Sync {
    async fn plan_patch(&self, request: PatchRequest) -> anyhow::Result<PatchPayload>;
}

#[cfg(feature = "remote-patch")]
pub use remote::HttpPatchPlanner;

#[cfg(feature = "remote-patch")]
mod remote {
    use super::*;
    use std::time::Duration;

    /// Posts `PatchRequest` to a remote authoring service and parses a
    /// `PatchPayload` back. The service's own planning logic is out of
    /// scope (§1); this is just the transport.
    pub struct HttpPatchPlanner {
        client: reqwest::Client,
        endpoint: String,
    }

    impl HttpPatchPlanner {
        pub fn new(endpoint: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
            let client = reqwest::Client::builder().timeout(timeout).build()?;
            Ok(Self {
                client,
                endpoint: endpoint.into(),
            })
        }
    }

    #[async_trait]
    impl PatchPlanner for HttpPatchPlanner {
        async fn plan_patch(&self, request: PatchRequest) -> anyhow::Result<PatchPayload> {
            let response = self.client.post(&self.endpoint).json(&request).send().await?;
            let payload = response.error_for_status()?.json::<PatchPayload>().await?;
            Ok(payload)
        }
    }
}
