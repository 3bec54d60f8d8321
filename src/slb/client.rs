//! Load balancer control plane client implementation.
//!
//! This module provides the HTTP client for the regional REST API. Each
//! method performs exactly one request; retries and deadlines are applied by
//! the caller's [`RetryPolicy`](crate::retry::RetryPolicy).

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{ApiError, Result, SlbError};

use super::api::{ClusterLookup, SlbApi};
use super::types::{
    CreateLoadBalancerRequest, DeleteProtection, FieldUpdate, ListQuery, LoadBalancer,
    UpdateLoadBalancerRequest,
};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Throttling delay used when the server omits `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Control plane client bound to one region.
#[derive(Debug, Clone)]
pub struct SlbClient {
    /// HTTP client.
    client: Client,
    /// Base URL of the API.
    endpoint: String,
    /// Region every call is scoped to.
    region: String,
    /// Bearer token.
    access_token: String,
    /// Request timeout, reported in timeout errors.
    timeout: Duration,
}

/// Listing response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    load_balancers: Vec<LoadBalancer>,
}

/// Create response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    load_balancer_id: String,
}

/// Cluster search response.
#[derive(Debug, Deserialize)]
struct ClusterSearchResponse {
    #[serde(default)]
    clusters: Vec<NamedResource>,
}

/// Any resource that only matters by name.
#[derive(Debug, Deserialize)]
struct NamedResource {
    #[serde(default)]
    name: String,
}

impl SlbClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(endpoint: &str, region: &str, access_token: &str) -> Result<Self> {
        Self::with_timeout(endpoint, region, access_token, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_timeout(
        endpoint: &str,
        region: &str,
        access_token: &str,
        timeout_secs: u64,
    ) -> Result<Self> {
        let timeout = Duration::from_secs(timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::transient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            region: region.to_string(),
            access_token: access_token.to_string(),
            timeout,
        })
    }

    /// Region this client is bound to.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Builds a URL under the given region.
    fn url(&self, region: &str, path: &str) -> String {
        format!("{}/regions/{region}/{path}", self.endpoint)
    }

    /// Attaches authentication and sends the request.
    async fn dispatch(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        trace!("Sending request: {what}");

        let response = request
            .header(header::AUTHORIZATION, format!("Bearer {}", self.access_token))
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SlbError::Api(ApiError::Timeout {
                        operation: what.to_string(),
                        after_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    })
                } else {
                    SlbError::Api(ApiError::transient(format!("{what}: request failed: {e}")))
                }
            })?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Self::error_for(response, what).await)
        }
    }

    /// Sends a request and decodes a JSON body.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let response = self.dispatch(request, what).await?;
        response.json().await.map_err(|e| {
            SlbError::Api(ApiError::InvalidResponse {
                message: format!("{what}: failed to parse response: {e}"),
            })
        })
    }

    /// Maps a non-success response onto the error taxonomy.
    async fn error_for(response: Response, what: &str) -> SlbError {
        let status = response.status();

        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);

        let body = response.text().await.unwrap_or_default();
        debug!("{what} returned {status}: {body}");

        let error = match status {
            StatusCode::NOT_FOUND => ApiError::not_found(what),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ApiError::PermissionDenied { message: body }
            }
            StatusCode::TOO_MANY_REQUESTS => ApiError::Throttled {
                retry_after_secs: retry_after,
            },
            StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                ApiError::validation(body)
            }
            s if s.is_server_error() => ApiError::transient(format!("{what}: {s}: {body}")),
            s => ApiError::InvalidResponse {
                message: format!("{what}: unexpected status {s}"),
            },
        };

        SlbError::Api(error)
    }

    /// Builds the JSON body of an update request.
    ///
    /// Reset fields are sent with their empty/default marker instead of being
    /// omitted.
    fn update_body(request: &UpdateLoadBalancerRequest) -> serde_json::Value {
        let mut body = serde_json::json!({});

        if let Some(name) = &request.name {
            body["loadBalancerName"] = match name {
                FieldUpdate::Set(value) => serde_json::json!(value),
                FieldUpdate::Reset => serde_json::json!(""),
            };
        }

        if let Some(protection) = &request.delete_protection {
            let value = match protection {
                FieldUpdate::Set(value) => *value,
                FieldUpdate::Reset => DeleteProtection::default(),
            };
            body["deleteProtection"] = serde_json::json!(value.to_string());
        }

        if let Some(tags) = &request.tags {
            body["tags"] = match tags {
                FieldUpdate::Set(value) => serde_json::json!(value),
                FieldUpdate::Reset => serde_json::json!({}),
            };
        }

        if let Some(group) = &request.resource_group_id {
            body["resourceGroupId"] = match group {
                FieldUpdate::Set(value) => serde_json::json!(value),
                FieldUpdate::Reset => serde_json::json!(""),
            };
        }

        body
    }

    /// Resolves the names of the VPC and vswitch a record is placed in.
    ///
    /// Network constructs that no longer exist are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a lookup fails for any reason other than not-found.
    pub async fn network_names(
        &self,
        vpc_id: Option<&str>,
        vswitch_id: Option<&str>,
    ) -> Result<Vec<String>> {
        let lookups = [("vpcs", vpc_id), ("vswitches", vswitch_id)];
        let mut names = Vec::new();

        for (kind, id) in lookups {
            let Some(id) = id.filter(|id| !id.is_empty()) else {
                continue;
            };

            let request = self.client.get(self.url(&self.region, &format!("{kind}/{id}")));
            match self.send::<NamedResource>(request, &format!("describe {kind} {id}")).await {
                Ok(resource) => names.push(resource.name),
                Err(e) if e.is_not_found() => debug!("{kind} {id} no longer exists"),
                Err(e) => return Err(e),
            }
        }

        Ok(names)
    }
}

#[async_trait]
impl SlbApi for SlbClient {
    async fn list(&self, query: &ListQuery) -> Result<Vec<LoadBalancer>> {
        let request = self
            .client
            .get(self.url(&query.region, "load-balancers"))
            .query(&[
                ("pageSize", query.page_size.to_string()),
                ("pageNumber", query.page_number.to_string()),
            ]);

        let response: ListResponse = self
            .send(request, &format!("list page {}", query.page_number))
            .await?;
        Ok(response.load_balancers)
    }

    async fn describe(&self, id: &str) -> Result<LoadBalancer> {
        let request = self
            .client
            .get(self.url(&self.region, &format!("load-balancers/{id}")));
        self.send(request, &format!("describe {id}")).await
    }

    async fn create(&self, request: &CreateLoadBalancerRequest) -> Result<String> {
        let http = self
            .client
            .post(self.url(&self.region, "load-balancers"))
            .json(request);

        let response: CreateResponse = self.send(http, "create load balancer").await?;
        Ok(response.load_balancer_id)
    }

    async fn update(&self, id: &str, request: &UpdateLoadBalancerRequest) -> Result<()> {
        let http = self
            .client
            .patch(self.url(&self.region, &format!("load-balancers/{id}")))
            .json(&Self::update_body(request));

        self.dispatch(http, &format!("update {id}")).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let http = self
            .client
            .delete(self.url(&self.region, &format!("load-balancers/{id}")));

        self.dispatch(http, &format!("delete {id}")).await?;
        Ok(())
    }
}

#[async_trait]
impl ClusterLookup for SlbClient {
    async fn cluster_exists(&self, name: &str) -> Result<bool> {
        let request = self
            .client
            .get(self.url(&self.region, "clusters"))
            .query(&[("name", name)]);

        let response: ClusterSearchResponse = self
            .send(request, &format!("describe cluster {name}"))
            .await?;
        Ok(response.clusters.iter().any(|c| c.name == name))
    }
}
