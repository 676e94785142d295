// OfCheck: Semantic checks of OpenFlow controller configurations
// Copyright (C) 2022-2023 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! RESTCONF client for the OpenDaylight controller.
//!
//! Resources are addressed relative to the store, like
//! `opendaylight-inventory:nodes/node/openflow:1/table/2/flow/1`. Remote procedure calls are
//! addressed by their name, like `sal-flow:add-flow`. All bodies are XML.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use isahc::{
    auth::{Authentication, Credentials},
    config::Configurable,
    AsyncBody, AsyncReadResponseExt, HttpClient, Request,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const XML: &str = "application/xml";

/// The two datastores of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Store {
    /// What was requested.
    Config,
    /// What the controller reports as installed.
    Operational,
}

impl Store {
    /// Path segment of the store.
    pub fn segment(&self) -> &'static str {
        match self {
            Store::Config => "config",
            Store::Operational => "operational",
        }
    }
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

/// Status and body of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body (may be empty)
    pub body: String,
}

impl RestResponse {
    /// Create a new response.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 200, 201 or 204
    pub fn is_success(&self) -> bool {
        matches!(self.status, 200 | 201 | 204)
    }

    /// 404
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// 409, returned when creating a resource that already exists.
    pub fn is_conflict(&self) -> bool {
        self.status == 409
    }
}

/// Interface of the controller used by the test runner.
#[async_trait]
pub trait Controller: Send + Sync {
    /// Create or replace the resource at `path` in the config store.
    async fn put(&self, path: &str, body: &str) -> Result<RestResponse, RestError>;

    /// Create the resource in the collection at `path` in the config store.
    async fn post(&self, path: &str, body: &str) -> Result<RestResponse, RestError>;

    /// Read the resource at `path`.
    async fn get(&self, store: Store, path: &str) -> Result<RestResponse, RestError>;

    /// Delete the resource at `path` from the config store.
    async fn delete(&self, path: &str) -> Result<RestResponse, RestError>;

    /// Invoke the remote procedure `operation` with the `<input>` document `body`.
    async fn invoke(&self, operation: &str, body: &str) -> Result<RestResponse, RestError>;
}

/// HTTP client for the RESTCONF interface, using basic authentication.
#[derive(Debug, Clone)]
pub struct RestconfClient {
    base: String,
    client: HttpClient,
}

impl RestconfClient {
    /// Create a client for `http://{host}:{port}/restconf`. Every request is aborted after
    /// `timeout`.
    pub fn new(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, RestError> {
        let client = HttpClient::builder()
            .timeout(timeout)
            .authentication(Authentication::basic())
            .credentials(Credentials::new(username, password))
            .build()?;
        Ok(Self {
            base: format!("http://{host}:{port}/restconf"),
            client,
        })
    }

    /// Full URL of a resource in a store.
    pub fn url(&self, store: Store, path: &str) -> String {
        format!("{}/{}/{}", self.base, store, path.trim_start_matches('/'))
    }

    /// Full URL of a remote procedure.
    pub fn operation_url(&self, operation: &str) -> String {
        format!("{}/operations/{}", self.base, operation)
    }

    async fn send(&self, request: Request<AsyncBody>) -> Result<RestResponse, RestError> {
        let method = request.method().clone();
        let uri = request.uri().clone();
        let mut response = self.client.send_async(request).await.map_err(|e| {
            if e.is_timeout() {
                log::warn!("[restconf] {method} {uri} timed out");
                RestError::Timeout
            } else {
                log::error!("[restconf] {method} {uri} failed: {e}");
                RestError::Http(e)
            }
        })?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        log::debug!("[restconf] {method} {uri} -> {status}");
        Ok(RestResponse { status, body })
    }

    fn request(
        &self,
        method: &str,
        url: String,
        body: Option<&str>,
    ) -> Result<Request<AsyncBody>, RestError> {
        let builder = Request::builder()
            .method(method)
            .uri(url)
            .header("Accept", XML);
        let request = match body {
            Some(body) => builder
                .header("Content-Type", XML)
                .body(AsyncBody::from(body.to_string()))?,
            None => builder.body(AsyncBody::empty())?,
        };
        Ok(request)
    }
}

#[async_trait]
impl Controller for RestconfClient {
    async fn put(&self, path: &str, body: &str) -> Result<RestResponse, RestError> {
        let url = self.url(Store::Config, path);
        self.send(self.request("PUT", url, Some(body))?).await
    }

    async fn post(&self, path: &str, body: &str) -> Result<RestResponse, RestError> {
        let url = self.url(Store::Config, path);
        self.send(self.request("POST", url, Some(body))?).await
    }

    async fn get(&self, store: Store, path: &str) -> Result<RestResponse, RestError> {
        self.send(self.request("GET", self.url(store, path), None)?)
            .await
    }

    async fn delete(&self, path: &str) -> Result<RestResponse, RestError> {
        let url = self.url(Store::Config, path);
        self.send(self.request("DELETE", url, None)?).await
    }

    async fn invoke(&self, operation: &str, body: &str) -> Result<RestResponse, RestError> {
        let url = self.operation_url(operation);
        self.send(self.request("POST", url, Some(body))?).await
    }
}

/// Error while talking to the controller.
#[derive(Debug, Error)]
pub enum RestError {
    /// Transport error
    #[error("HTTP error: {0}")]
    Http(#[from] isahc::Error),
    /// The request cannot be built.
    #[error("Invalid request: {0}")]
    Request(#[from] isahc::http::Error),
    /// The response body cannot be read.
    #[error("Cannot read the response body: {0}")]
    Body(#[from] std::io::Error),
    /// No response within the configured timeout.
    #[error("Request timed out")]
    Timeout,
}
