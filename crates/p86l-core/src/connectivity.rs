use std::time::Duration;

use async_trait::async_trait;
use log::debug;

/// Endpoint answering `204 No Content` whenever the internet is reachable.
pub const DEFAULT_PROBE_URL: &str = "https://clients3.google.com/generate_204";
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Probe that issues a single GET and treats `204` as online.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpProbe {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            url: DEFAULT_PROBE_URL.to_string(),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn is_online(&self) -> bool {
        match self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response.status() == reqwest::StatusCode::NO_CONTENT,
            Err(error) => {
                debug!("Connectivity probe failed: {error}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn probe_with_status(status: u16) -> bool {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;

        HttpProbe::new(reqwest::Client::new())
            .with_url(format!("{}/generate_204", server.uri()))
            .is_online()
            .await
    }

    #[tokio::test]
    async fn no_content_means_online() {
        assert!(probe_with_status(204).await);
    }

    #[tokio::test]
    async fn other_status_means_offline() {
        assert!(!probe_with_status(200).await);
        assert!(!probe_with_status(503).await);
    }

    #[tokio::test]
    async fn unreachable_endpoint_means_offline() {
        let listener =
            std::net::TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        let addr = listener.local_addr().expect("listener should have an address");
        drop(listener);

        let probe = HttpProbe::new(reqwest::Client::new())
            .with_url(format!("http://{addr}/generate_204"))
            .with_timeout(Duration::from_secs(2));
        assert!(!probe.is_online().await);
    }
}
