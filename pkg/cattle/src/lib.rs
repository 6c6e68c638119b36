//! Cattle API client publishing provider FQDNs as external DNS events.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use pkg_constants::network::HTTP_REQUEST_TIMEOUT_SECS;
use pkg_controllers::FqdnRegistrar;
use pkg_types::config::CattleSettings;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalDnsEvent<'a> {
    pub event_type: &'a str,
    pub external_id: &'a str,
    pub service_name: &'a str,
    pub stack_name: &'a str,
    pub fqdn: &'a str,
}

pub struct CattleClient {
    client: reqwest::Client,
    url: String,
    access_key: String,
    secret_key: String,
}

impl CattleClient {
    pub fn new(settings: &CattleSettings) -> Result<Self> {
        if settings.url.is_empty() {
            bail!("Cattle URL is not set");
        }
        if settings.access_key.is_empty() {
            bail!("Cattle access key is not set");
        }
        if settings.secret_key.is_empty() {
            bail!("Cattle secret key is not set");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            url: settings.url.trim_end_matches('/').to_string(),
            access_key: settings.access_key.clone(),
            secret_key: settings.secret_key.clone(),
        })
    }

    fn events_url(&self) -> String {
        format!("{}/externaldnsevents", self.url)
    }

    /// List external DNS events to verify URL and credentials.
    pub async fn test_connect(&self) -> Result<()> {
        let url = self.events_url();
        let resp = self
            .client
            .get(&url)
            .basic_auth(&self.access_key, Some(&self.secret_key))
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        if !resp.status().is_success() {
            bail!("GET {} returned {}", url, resp.status());
        }
        Ok(())
    }
}

#[async_trait]
impl FqdnRegistrar for CattleClient {
    async fn register_fqdn(&self, service: &str, stack: &str, fqdn: &str) -> Result<()> {
        let event = ExternalDnsEvent {
            event_type: "dns.update",
            external_id: fqdn,
            service_name: service,
            stack_name: stack,
            fqdn,
        };
        debug!("Posting dns.update for {}/{}: {}", stack, service, fqdn);
        let url = self.events_url();
        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.access_key, Some(&self.secret_key))
            .json(&event)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("POST {} returned {}: {}", url, status, body.trim());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    type Events = Arc<Mutex<Vec<(Option<String>, Value)>>>;

    async fn list() -> Json<Value> {
        Json(json!({"data": []}))
    }

    async fn create(
        State(events): State<Events>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> StatusCode {
        let auth = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        events.lock().unwrap().push((auth, body));
        StatusCode::CREATED
    }

    async fn serve() -> (String, Events) {
        let events = Events::default();
        let app = Router::new()
            .route("/v1/externaldnsevents", get(list).post(create))
            .with_state(events.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/v1", addr), events)
    }

    fn settings(url: &str) -> CattleSettings {
        CattleSettings {
            url: url.to_string(),
            access_key: "ak".to_string(),
            secret_key: "sk".to_string(),
        }
    }

    #[test]
    fn missing_credentials_are_rejected() {
        let mut s = settings("http://cattle/v1");
        s.secret_key.clear();
        assert!(CattleClient::new(&s).is_err());
    }

    #[tokio::test]
    async fn posts_dns_update_event() {
        let (url, events) = serve().await;
        let client = CattleClient::new(&settings(&url)).unwrap();

        client.test_connect().await.unwrap();
        client
            .register_fqdn("web", "shop", "web.lb.example.net")
            .await
            .unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        let (auth, body) = &events[0];
        // base64("ak:sk")
        assert_eq!(auth.as_deref(), Some("Basic YWs6c2s="));
        assert_eq!(
            body,
            &json!({
                "eventType": "dns.update",
                "externalId": "web.lb.example.net",
                "serviceName": "web",
                "stackName": "shop",
                "fqdn": "web.lb.example.net",
            })
        );
    }

    #[tokio::test]
    async fn rejected_event_is_an_error() {
        let (url, _) = serve().await;
        let client = CattleClient::new(&settings(&format!("{}/missing", url))).unwrap();
        assert!(client.register_fqdn("web", "shop", "x").await.is_err());
        assert!(client.test_connect().await.is_err());
    }
}
