// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Compute Engine REST API transport.
//!
//! This module contains the HTTP plumbing shared by the GCP-backed collaborators:
//!
//! - [`auth`] - Access token sources (metadata server, static token)
//! - [`types`] - Wire models of the Compute resources the operator touches
//! - [`ComputeClient`] - Authenticated JSON requests, error mapping, operation waits
//!   and paginated listing
//!
//! Mutating calls return an [`types::Operation`]; callers hand it to
//! [`ComputeClient::wait_operation`] before treating the mutation as done.

pub mod auth;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client as HttpClient, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::constants::{
    MAX_OPERATION_WAIT_CALLS, OPERATION_STATUS_DONE, OPERATION_WAIT_TIMEOUT_SECS,
};
use crate::errors::GcpError;
use auth::TokenSource;
use types::{ListPage, Operation};

/// Error envelope returned by Google APIs.
#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorItem>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorItem {
    #[serde(default)]
    reason: Option<String>,
}

/// Authenticated client for the Compute Engine REST API.
#[derive(Clone)]
pub struct ComputeClient {
    http: HttpClient,
    endpoint: Url,
    tokens: Arc<dyn TokenSource>,
}

impl std::fmt::Debug for ComputeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeClient")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl ComputeClient {
    /// Create a client for the given API endpoint.
    ///
    /// # Arguments
    ///
    /// * `http` - Shared HTTP client
    /// * `endpoint` - Base URL, e.g. `https://compute.googleapis.com/compute/v1/`
    /// * `tokens` - Source of bearer tokens
    ///
    /// # Errors
    ///
    /// Returns [`GcpError::Url`] if the endpoint is not a valid URL.
    pub fn new(
        http: HttpClient,
        endpoint: &str,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self, GcpError> {
        // A trailing slash makes `Url::join` append instead of replacing the last segment.
        let endpoint = if endpoint.ends_with('/') {
            Url::parse(endpoint)?
        } else {
            Url::parse(&format!("{endpoint}/"))?
        };

        Ok(Self {
            http,
            endpoint,
            tokens,
        })
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, GcpError> {
        let mut url = self.endpoint.join(path.trim_start_matches('/'))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn send<B, T>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<T, GcpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_with_timeout(method, path, query, body, None)
            .await
    }

    /// Like `send`, with a per-request timeout replacing the client-wide one.
    async fn send_with_timeout<B, T>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
        timeout: Option<Duration>,
    ) -> Result<T, GcpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path, query)?;
        let token = self.tokens.token().await?;

        debug!(method = %method, url = %url, "Calling Compute API");

        let mut request = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let text = response.text().await.unwrap_or_default();
        Err(api_error(status, &text))
    }

    /// GET a resource.
    ///
    /// # Errors
    ///
    /// Returns a [`GcpError`] on transport failure or non-success status.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, GcpError> {
        self.send::<(), T>(Method::GET, path, &[], None).await
    }

    /// POST to a collection or custom method, returning the started operation.
    ///
    /// # Errors
    ///
    /// Returns a [`GcpError`] on transport failure or non-success status.
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<Operation, GcpError> {
        self.send(Method::POST, path, query, Some(body)).await
    }

    /// PUT a full resource, returning the started operation.
    ///
    /// # Errors
    ///
    /// Returns a [`GcpError`] on transport failure or non-success status.
    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Operation, GcpError> {
        self.send(Method::PUT, path, &[], Some(body)).await
    }

    /// DELETE a resource, returning the started operation.
    ///
    /// # Errors
    ///
    /// Returns a [`GcpError`] on transport failure or non-success status.
    pub async fn delete(&self, path: &str) -> Result<Operation, GcpError> {
        self.send::<(), Operation>(Method::DELETE, path, &[], None)
            .await
    }

    /// List every item of a paginated collection.
    ///
    /// Follows `nextPageToken` until the last page.
    ///
    /// # Errors
    ///
    /// Returns a [`GcpError`] if any page request fails.
    pub async fn list_all<T: DeserializeOwned>(
        &self,
        path: &str,
        page_size: u32,
    ) -> Result<Vec<T>, GcpError> {
        let mut all_items = Vec::new();
        let mut page_token: Option<String> = None;
        let mut page_count = 0;

        loop {
            page_count += 1;
            let mut query = vec![("maxResults", page_size.to_string())];
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }

            let page: ListPage<T> = self.send::<(), _>(Method::GET, path, &query, None).await?;
            let item_count = page.items.len();
            all_items.extend(page.items);

            debug!(
                page = page_count,
                items_in_page = item_count,
                total_items = all_items.len(),
                "Fetched page from Compute API"
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(all_items)
    }

    /// Block until a long-running operation is done.
    ///
    /// Issues `.../operations/{name}/wait` calls until the operation reports `DONE`,
    /// then converts an operation-level error into [`GcpError::Operation`] carrying
    /// the operation's HTTP status code, so callers can classify it like an
    /// immediate API error.
    ///
    /// # Arguments
    ///
    /// * `project` - Project the operation runs in
    /// * `operation` - The operation returned by the mutating call
    ///
    /// # Errors
    ///
    /// Returns a [`GcpError`] if waiting fails, the operation fails, or it is still
    /// running after [`MAX_OPERATION_WAIT_CALLS`] wait calls.
    pub async fn wait_operation(
        &self,
        project: &str,
        operation: Operation,
    ) -> Result<(), GcpError> {
        let mut operation = operation;
        let mut calls = 0;

        while operation.status != OPERATION_STATUS_DONE {
            if calls >= MAX_OPERATION_WAIT_CALLS {
                return Err(GcpError::OperationTimeout {
                    operation: operation.name,
                    calls,
                });
            }
            calls += 1;

            // The API holds a wait call open until the operation is done or its own
            // deadline passes, which can outlast the client-wide request timeout.
            let path = operation_wait_path(project, &operation);
            operation = self
                .send_with_timeout::<(), Operation>(
                    Method::POST,
                    &path,
                    &[],
                    None,
                    Some(Duration::from_secs(OPERATION_WAIT_TIMEOUT_SECS)),
                )
                .await?;
        }

        match operation.error {
            Some(error) if !error.errors.is_empty() => {
                let message = error
                    .errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                Err(GcpError::Operation {
                    operation: operation.name,
                    status: operation
                        .http_error_status_code
                        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR.as_u16()),
                    message,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Path of the `wait` method for an operation, scoped the way the operation is.
fn operation_wait_path(project: &str, operation: &Operation) -> String {
    let name = &operation.name;
    match (operation.region.as_deref(), operation.zone.as_deref()) {
        (Some(region), _) => format!(
            "projects/{project}/regions/{}/operations/{name}/wait",
            resource_name(region)
        ),
        (None, Some(zone)) => format!(
            "projects/{project}/zones/{}/operations/{name}/wait",
            resource_name(zone)
        ),
        (None, None) => format!("projects/{project}/global/operations/{name}/wait"),
    }
}

/// Build a [`GcpError::Api`] from an error response.
fn api_error(status: StatusCode, body: &str) -> GcpError {
    let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
    let message = if envelope.error.message.is_empty() {
        body.to_string()
    } else {
        envelope.error.message
    };
    let reason = envelope.error.errors.into_iter().find_map(|e| e.reason);

    GcpError::Api {
        status,
        message,
        reason,
    }
}

/// Last path segment of a self-link (the resource name).
///
/// # Example
///
/// ```rust
/// use capg_firewall_operator::gcp::resource_name;
///
/// assert_eq!(
///     resource_name("https://www.googleapis.com/compute/v1/projects/p/regions/r/routers/rt"),
///     "rt"
/// );
/// assert_eq!(resource_name("plain-name"), "plain-name");
/// ```
#[must_use]
pub fn resource_name(self_link: &str) -> &str {
    self_link
        .rsplit_once('/')
        .map_or(self_link, |(_, name)| name)
}
