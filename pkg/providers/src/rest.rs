//! Minimal JSON-over-HTTP client shared by the REST-based providers.

use anyhow::{Context, Result, anyhow};
use pkg_constants::network::HTTP_REQUEST_TIMEOUT_SECS;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// How requests authenticate against the management API.
#[derive(Clone)]
pub enum Auth {
    Basic { user: String, password: String },
    Header { name: &'static str, value: String },
}

#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base: String,
    auth: Auth,
}

impl RestClient {
    /// `host` may be a bare `host[:port]` (https is assumed) or a full URL.
    pub fn new(host: &str, path_prefix: &str, auth: Auth, insecure: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure)
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base: base_url(host, path_prefix),
            auth,
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.client.request(method, format!("{}{}", self.base, path));
        match &self.auth {
            Auth::Basic { user, password } => req.basic_auth(user, Some(password)),
            Auth::Header { name, value } => req.header(*name, value),
        }
    }

    /// GET a JSON document. A 404 yields `None`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let resp = self
            .request(Method::GET, path)
            .send()
            .await
            .with_context(|| format!("GET {}{} failed", self.base, path))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check(resp, "GET", path).await?;
        let body = resp
            .json()
            .await
            .with_context(|| format!("GET {}: unexpected response body", path))?;
        Ok(Some(body))
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        self.send(Method::POST, path, body).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        self.send(Method::PUT, path, body).await
    }

    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        self.send(Method::PATCH, path, body).await
    }

    /// DELETE a resource. Returns `false` if it did not exist.
    pub async fn delete(&self, path: &str) -> Result<bool> {
        let resp = self
            .request(Method::DELETE, path)
            .send()
            .await
            .with_context(|| format!("DELETE {}{} failed", self.base, path))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(resp, "DELETE", path).await?;
        Ok(true)
    }

    async fn send<B: Serialize + ?Sized>(&self, method: Method, path: &str, body: &B) -> Result<()> {
        let name = method.to_string();
        let resp = self
            .request(method, path)
            .json(body)
            .send()
            .await
            .with_context(|| format!("{} {}{} failed", name, self.base, path))?;
        check(resp, &name, path).await?;
        Ok(())
    }
}

async fn check(resp: Response, method: &str, path: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(anyhow!("{} {} returned {}: {}", method, path, status, body.trim()))
}

fn base_url(host: &str, path_prefix: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}{}", host, path_prefix)
    } else {
        format!("https://{}{}", host, path_prefix)
    }
}
