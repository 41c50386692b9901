// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0

//! HTTP client the administrative CLI uses to talk to a running
//! `dplaned` daemon over loopback HTTP.

use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};

const DEFAULT_ADDR: &str = "127.0.0.1:8443";

#[derive(Debug, Clone)]
pub struct DaemonClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl DaemonClient {
    pub fn new(listen: Option<String>, token: Option<String>) -> Result<Self> {
        let client = Client::builder().build().context("failed to build HTTP client")?;
        let addr = listen.unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let base_url = format!("http://{addr}");
        Ok(Self { client, base_url, token })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.request(method, format!("{}{path}", self.base_url));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.request(reqwest::Method::GET, path).send().await.with_context(|| format!("GET {path} failed"))?;
        Self::parse(response).await
    }

    pub async fn put_json<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let response = self.request(reqwest::Method::PUT, path).json(body).send().await.with_context(|| format!("PUT {path} failed"))?;
        Self::parse(response).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let response = self.request(reqwest::Method::POST, path).json(body).send().await.with_context(|| format!("POST {path} failed"))?;
        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            bail!("daemon returned {status}: {body}");
        }
        serde_json::from_str(&body).with_context(|| format!("failed to parse daemon response: {body}"))
    }
}
