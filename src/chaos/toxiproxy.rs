use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum ToxiproxyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Toxiproxy API error: {status} - {message}")]
    Api { status: u16, message: String },
}

/// Client for the Toxiproxy control API.
#[derive(Clone)]
pub struct Toxiproxy {
    base_url: String,
    client: reqwest::Client,
}

/// A named route from a listen address to an upstream address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proxy {
    pub name: String,
    pub listen: String,
    pub upstream: String,
    #[serde(default)]
    pub enabled: bool,
}

impl Proxy {
    pub fn new(
        name: impl Into<String>,
        listen: impl Into<String>,
        upstream: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            listen: listen.into(),
            upstream: upstream.into(),
            enabled: true,
        }
    }
}

/// Which half of the proxied conversation a toxic corrupts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upstream,
    Downstream,
}

impl Default for Direction {
    fn default() -> Self {
        Self::Downstream
    }
}

/// A typed fault registered against a route. Serializes to the
/// Toxiproxy wire format: a `type` tag, flattened attributes, and the
/// stream direction.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Toxic {
    ResetPeer {
        #[serde(flatten)]
        attributes: TimeoutAttributes,
        #[serde(default)]
        stream: Direction,
    },
    Timeout {
        #[serde(flatten)]
        attributes: TimeoutAttributes,
        #[serde(default)]
        stream: Direction,
    },
    Latency {
        #[serde(flatten)]
        attributes: LatencyAttributes,
        #[serde(default)]
        stream: Direction,
    },
    Bandwidth {
        #[serde(flatten)]
        attributes: BandwidthAttributes,
        #[serde(default)]
        stream: Direction,
    },
    SlowClose {
        #[serde(flatten)]
        attributes: SlowCloseAttributes,
        #[serde(default)]
        stream: Direction,
    },
    LimitData {
        #[serde(flatten)]
        attributes: LimitDataAttributes,
        #[serde(default)]
        stream: Direction,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutAttributes {
    pub timeout: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyAttributes {
    pub latency: u32,
    #[serde(default)]
    pub jitter: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandwidthAttributes {
    pub rate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlowCloseAttributes {
    pub delay: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitDataAttributes {
    pub bytes: u64,
}

impl Toxic {
    /// Abruptly reset the TCP connection after `timeout_ms` (0 resets
    /// immediately on the next write).
    pub fn reset_peer(timeout_ms: u32, direction: Direction) -> Self {
        Self::ResetPeer {
            attributes: TimeoutAttributes {
                timeout: timeout_ms,
            },
            stream: direction,
        }
    }

    /// Stop all data from flowing; 0 stalls the connection forever.
    pub fn timeout(timeout_ms: u32, direction: Direction) -> Self {
        Self::Timeout {
            attributes: TimeoutAttributes {
                timeout: timeout_ms,
            },
            stream: direction,
        }
    }

    /// Add delay (and optional jitter) to the connection.
    pub fn latency(latency_ms: u32, jitter_ms: u32, direction: Direction) -> Self {
        Self::Latency {
            attributes: LatencyAttributes {
                latency: latency_ms,
                jitter: jitter_ms,
            },
            stream: direction,
        }
    }

    /// Limit throughput to `rate_kb` KB/s.
    pub fn bandwidth(rate_kb: u32, direction: Direction) -> Self {
        Self::Bandwidth {
            attributes: BandwidthAttributes { rate: rate_kb },
            stream: direction,
        }
    }

    /// Delay closing connections by `delay_ms`.
    pub fn slow_close(delay_ms: u32, direction: Direction) -> Self {
        Self::SlowClose {
            attributes: SlowCloseAttributes { delay: delay_ms },
            stream: direction,
        }
    }

    /// Close the connection after `bytes` have been transmitted.
    pub fn limit_data(bytes: u64, direction: Direction) -> Self {
        Self::LimitData {
            attributes: LimitDataAttributes { bytes },
            stream: direction,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ToxicResponse {
    name: String,
}

impl Toxiproxy {
    /// Default control URL is <http://localhost:8474>.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn localhost() -> Self {
        Self::new("http://localhost:8474")
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ToxiproxyError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(ToxiproxyError::Api {
                status: resp.status().as_u16(),
                message: resp.text().await.unwrap_or_default(),
            })
        }
    }

    /// Health probe; returns the Toxiproxy server version string.
    pub async fn version(&self) -> Result<String, ToxiproxyError> {
        let resp = self.client.get(self.url("version")).send().await?;
        Ok(Self::check(resp).await?.text().await?)
    }

    pub async fn list_proxies(&self) -> Result<HashMap<String, Proxy>, ToxiproxyError> {
        let resp = self.client.get(self.url("proxies")).send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn create_proxy(&self, proxy: &Proxy) -> Result<Proxy, ToxiproxyError> {
        let resp = self
            .client
            .post(self.url("proxies"))
            .json(proxy)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn get_proxy(&self, name: &str) -> Result<Proxy, ToxiproxyError> {
        let resp = self
            .client
            .get(self.url(&format!("proxies/{name}")))
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn delete_proxy(&self, name: &str) -> Result<(), ToxiproxyError> {
        let resp = self
            .client
            .delete(self.url(&format!("proxies/{name}")))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    /// Toggle a route. Disabling drops every connection through it.
    pub async fn set_proxy_enabled(&self, name: &str, enabled: bool) -> Result<(), ToxiproxyError> {
        #[derive(Serialize)]
        struct Update {
            enabled: bool,
        }

        let resp = self
            .client
            .post(self.url(&format!("proxies/{name}")))
            .json(&Update { enabled })
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    /// Remove all proxies and toxics.
    pub async fn reset(&self) -> Result<(), ToxiproxyError> {
        let resp = self.client.post(self.url("reset")).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    /// Register a toxic against a route. Returns the assigned toxic name.
    pub async fn add_toxic(&self, proxy_name: &str, toxic: Toxic) -> Result<String, ToxiproxyError> {
        let resp = self
            .client
            .post(self.url(&format!("proxies/{proxy_name}/toxics")))
            .json(&toxic)
            .send()
            .await?;
        let toxic: ToxicResponse = Self::check(resp).await?.json().await?;
        Ok(toxic.name)
    }

    pub async fn remove_toxic(
        &self,
        proxy_name: &str,
        toxic_name: &str,
    ) -> Result<(), ToxiproxyError> {
        let resp = self
            .client
            .delete(self.url(&format!("proxies/{proxy_name}/toxics/{toxic_name}")))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    /// Like [`add_toxic`](Self::add_toxic), but ties the toxic's
    /// lifetime to the returned guard so it cannot leak into the next
    /// test even if the test body panics.
    pub async fn add_toxic_guarded(
        &self,
        proxy_name: &str,
        toxic: Toxic,
    ) -> Result<ToxicGuard, ToxiproxyError> {
        let name = self.add_toxic(proxy_name, toxic).await?;
        Ok(ToxicGuard {
            client: self.clone(),
            proxy: proxy_name.to_string(),
            name,
            removed: false,
        })
    }
}

/// Scoped toxic registration. Call [`remove`](Self::remove) to take the
/// toxic down explicitly; if the guard is dropped without it, removal
/// is attempted in the background on the current tokio runtime.
#[must_use = "dropping the guard removes the toxic"]
pub struct ToxicGuard {
    client: Toxiproxy,
    proxy: String,
    name: String,
    removed: bool,
}

impl ToxicGuard {
    /// Name Toxiproxy assigned to the toxic.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remove the toxic from its route. Consumes the guard, so removal
    /// happens exactly once.
    pub async fn remove(mut self) -> Result<(), ToxiproxyError> {
        self.removed = true;
        self.client.remove_toxic(&self.proxy, &self.name).await
    }
}

impl Drop for ToxicGuard {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        let client = self.client.clone();
        let proxy = std::mem::take(&mut self.proxy);
        let name = std::mem::take(&mut self.name);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(error) = client.remove_toxic(&proxy, &name).await {
                        tracing::warn!(%proxy, %name, %error, "failed to remove leaked toxic");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(%proxy, %name, "no runtime available to remove leaked toxic");
            }
        }
    }
}

/// Fault controls scoped to one route, mirroring the faults tests
/// actually reach for: coarse enable/disable, connection resets, and
/// stalls.
pub struct ToxicEndpoint {
    client: Toxiproxy,
    route: String,
}

impl ToxicEndpoint {
    /// Create the route on the proxy and return a handle scoped to it.
    pub async fn install(
        client: &Toxiproxy,
        name: impl Into<String>,
        listen: impl Into<String>,
        upstream: impl Into<String>,
    ) -> Result<Self, ToxiproxyError> {
        let route = name.into();
        client
            .create_proxy(&Proxy::new(route.clone(), listen, upstream))
            .await?;
        Ok(Self {
            client: client.clone(),
            route,
        })
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    /// Coarse off switch: refuse and drop all connections on the route.
    pub async fn disable(&self) -> Result<(), ToxiproxyError> {
        self.client.set_proxy_enabled(&self.route, false).await
    }

    pub async fn enable(&self) -> Result<(), ToxiproxyError> {
        self.client.set_proxy_enabled(&self.route, true).await
    }

    /// Reset the TCP connection at the peer after `timeout_ms`.
    pub async fn reset_peer(&self, timeout_ms: u32) -> Result<ToxicGuard, ToxiproxyError> {
        self.client
            .add_toxic_guarded(&self.route, Toxic::reset_peer(timeout_ms, Direction::Downstream))
            .await
    }

    /// Stall the connection, indistinguishable from a partition.
    pub async fn stall(&self, timeout_ms: u32) -> Result<ToxicGuard, ToxiproxyError> {
        self.client
            .add_toxic_guarded(&self.route, Toxic::timeout(timeout_ms, Direction::Downstream))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_peer_serialization() {
        let toxic = Toxic::reset_peer(250, Direction::Downstream);
        let json = serde_json::to_string(&toxic).unwrap();
        assert!(json.contains("\"type\":\"reset_peer\""));
        assert!(json.contains("\"timeout\":250"));
        assert!(json.contains("\"stream\":\"downstream\""));
    }

    #[test]
    fn test_timeout_serialization() {
        let toxic = Toxic::timeout(0, Direction::Upstream);
        let json = serde_json::to_string(&toxic).unwrap();
        assert!(json.contains("\"type\":\"timeout\""));
        assert!(json.contains("\"timeout\":0"));
        assert!(json.contains("\"stream\":\"upstream\""));
    }

    #[test]
    fn test_latency_serialization() {
        let toxic = Toxic::latency(100, 20, Direction::Downstream);
        let json = serde_json::to_string(&toxic).unwrap();
        assert!(json.contains("\"type\":\"latency\""));
        assert!(json.contains("\"latency\":100"));
        assert!(json.contains("\"jitter\":20"));
    }

    #[test]
    fn test_proxy_new_is_enabled() {
        let proxy = Proxy::new("route", "localhost:5555", "localhost:8124");
        assert_eq!(proxy.name, "route");
        assert_eq!(proxy.listen, "localhost:5555");
        assert_eq!(proxy.upstream, "localhost:8124");
        assert!(proxy.enabled);
    }

    /// One-connection-per-request HTTP stub standing in for the
    /// Toxiproxy control API; records request lines and answers every
    /// request with the given body.
    async fn spawn_control_api_stub(
        body: &'static str,
    ) -> (String, tokio::sync::mpsc::UnboundedReceiver<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, seen_rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let seen = seen_tx.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();
                    let request_line = request.lines().next().unwrap_or("").to_string();
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                    let _ = seen.send(request_line);
                });
            }
        });

        (format!("http://{addr}"), seen_rx)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropped_guard_removes_toxic_in_background() {
        use std::time::Duration;

        let (url, mut seen) = spawn_control_api_stub(r#"{"name":"t1"}"#).await;
        let client = Toxiproxy::new(&url);

        let guard = client
            .add_toxic_guarded("route", Toxic::reset_peer(0, Direction::Downstream))
            .await
            .unwrap();
        assert_eq!(guard.name(), "t1");

        let add = tokio::time::timeout(Duration::from_secs(2), seen.recv())
            .await
            .expect("timeout waiting for add")
            .expect("stub gone");
        assert!(
            add.starts_with("POST /proxies/route/toxics"),
            "unexpected request: {add}"
        );

        // guard dropped without an explicit remove; cleanup must still
        // reach the control API
        drop(guard);

        let delete = tokio::time::timeout(Duration::from_secs(2), seen.recv())
            .await
            .expect("timeout waiting for removal")
            .expect("stub gone");
        assert!(
            delete.starts_with("DELETE /proxies/route/toxics/t1"),
            "unexpected request: {delete}"
        );
    }

    #[tokio::test]
    async fn test_guard_remove_consumes_exactly_once() {
        // no server listening; removal fails over HTTP but the guard is
        // consumed and Drop must not try again
        let client = Toxiproxy::new("http://127.0.0.1:1");
        let guard = ToxicGuard {
            client,
            proxy: "route".to_string(),
            name: "toxic".to_string(),
            removed: false,
        };
        assert_eq!(guard.name(), "toxic");
        assert!(guard.remove().await.is_err());
    }
}
