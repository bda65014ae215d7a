// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Access tokens for the Compute Engine API.
//!
//! Two sources are provided:
//! - [`MetadataTokenSource`] - fetches tokens for the attached service account from
//!   the GCE metadata server and caches them until shortly before expiry
//! - [`StaticTokenSource`] - a fixed token, for local runs and tests

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::constants::{METADATA_FLAVOR_HEADER, METADATA_TOKEN_URL, TOKEN_REFRESH_MARGIN_SECS};
use crate::errors::GcpError;

/// Something that hands out bearer tokens.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Return a currently valid access token.
    ///
    /// # Errors
    ///
    /// Returns [`GcpError::Auth`] if no token can be obtained.
    async fn token(&self) -> Result<String, GcpError>;
}

/// A token that never changes.
#[derive(Clone)]
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenSource").finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self) -> Result<String, GcpError> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Token source backed by the GCE metadata server.
pub struct MetadataTokenSource {
    http: HttpClient,
    url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataTokenSource {
    /// Create a source using the well-known metadata server address.
    pub fn new(http: HttpClient) -> Self {
        Self::with_url(http, METADATA_TOKEN_URL)
    }

    /// Create a source using a custom token URL.
    pub fn with_url(http: HttpClient, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            cached: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> Result<MetadataToken, GcpError> {
        let response = self
            .http
            .get(&self.url)
            .header(METADATA_FLAVOR_HEADER, "Google")
            .send()
            .await
            .map_err(|e| GcpError::Auth(format!("metadata server unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GcpError::Auth(format!(
                "metadata server returned HTTP {status}"
            )));
        }

        response
            .json::<MetadataToken>()
            .await
            .map_err(|e| GcpError::Auth(format!("invalid token response: {e}")))
    }
}

impl std::fmt::Debug for MetadataTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataTokenSource")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenSource for MetadataTokenSource {
    async fn token(&self) -> Result<String, GcpError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.fetch().await?;
        let lifetime = fresh.expires_in.saturating_sub(TOKEN_REFRESH_MARGIN_SECS);
        debug!(expires_in = fresh.expires_in, "Fetched access token from metadata server");

        *cached = Some(CachedToken {
            value: fresh.access_token.clone(),
            refresh_at: Instant::now() + Duration::from_secs(lifetime),
        });
        Ok(fresh.access_token)
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod auth_tests;
