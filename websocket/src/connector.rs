//! Establishing the upstream WebSocket connection.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderMap, HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;

use crate::error::UpstreamError;

/// Inbound half of an upstream connection.
pub type UpstreamStream = BoxStream<'static, Result<Message, UpstreamError>>;

/// Opens a fresh upstream connection on every call.
///
/// The subscriber owns reconnect timing; implementations only connect.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    async fn connect(&self) -> Result<UpstreamStream, UpstreamError>;

    fn url(&self) -> &str;
}

#[async_trait]
impl<T: UpstreamConnector + ?Sized> UpstreamConnector for Arc<T> {
    async fn connect(&self) -> Result<UpstreamStream, UpstreamError> {
        (**self).connect().await
    }

    fn url(&self) -> &str {
        (**self).url()
    }
}

/// Headers the handshake generates itself. Overriding them breaks the
/// upgrade; `sec-websocket-extensions` is listed because tungstenite has no
/// permessage-deflate support.
const RESERVED_HEADERS: &[&str] = &[
    "host",
    "upgrade",
    "connection",
    "sec-websocket-key",
    "sec-websocket-version",
    "sec-websocket-extensions",
];

/// Header set the public flashblocks endpoint accepts: it only serves
/// clients that look like the browser page at flashblocks.base.org.
pub fn default_upstream_headers() -> BTreeMap<String, String> {
    [
        ("Origin", "https://flashblocks.base.org"),
        (
            "User-Agent",
            "Mozilla/5.0 (iPhone; CPU iPhone OS 16_6 like Mac OS X) AppleWebKit/605.1.15 \
             (KHTML, like Gecko) Version/16.6 Mobile/15E148 Safari/604.1",
        ),
        ("Pragma", "no-cache"),
        ("Cache-Control", "no-cache"),
        ("Accept-Encoding", "gzip, deflate, br"),
        ("Accept-Language", "zh-CN,zh;q=0.9"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Real connector: `tokio-tungstenite` over rustls, sending the same header
/// set on every (re)connect.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    url: String,
    headers: HeaderMap,
}

impl TungsteniteConnector {
    /// Validate `url` and `headers` up front so a typo fails at startup
    /// instead of on every reconnect.
    pub fn new(
        url: impl Into<String>,
        headers: &BTreeMap<String, String>,
    ) -> Result<Self, UpstreamError> {
        let url = url.into();
        url.as_str()
            .into_client_request()
            .map_err(|e| UpstreamError::InvalidUrl {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let mut map = HeaderMap::new();
        for (name, value) in headers {
            if RESERVED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                tracing::debug!(header = %name, "skipping handshake-managed header");
                continue;
            }
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| UpstreamError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|e| UpstreamError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            map.insert(header_name, header_value);
        }

        Ok(Self { url, headers: map })
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

#[async_trait]
impl UpstreamConnector for TungsteniteConnector {
    async fn connect(&self) -> Result<UpstreamStream, UpstreamError> {
        let mut request = self.url.as_str().into_client_request()?;
        for (name, value) in &self.headers {
            request.headers_mut().insert(name.clone(), value.clone());
        }

        let (stream, response) = connect_async(request).await?;
        tracing::debug!(status = %response.status(), url = %self.url, "upstream handshake complete");

        Ok(stream.map(|msg| msg.map_err(UpstreamError::from)).boxed())
    }

    fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_headers_survive_validation() {
        let connector = TungsteniteConnector::new(
            "wss://sepolia.flashblocks.base.org/ws",
            &default_upstream_headers(),
        )
        .unwrap();
        let headers = connector.headers();
        assert_eq!(headers["origin"], "https://flashblocks.base.org");
        assert!(headers["user-agent"].to_str().unwrap().contains("iPhone"));
        assert_eq!(headers.len(), 6);
    }

    #[test]
    fn reserved_headers_are_dropped() {
        let mut headers = default_upstream_headers();
        headers.insert("Host".into(), "example.org".into());
        headers.insert("Sec-WebSocket-Extensions".into(), "permessage-deflate".into());
        let connector =
            TungsteniteConnector::new("wss://sepolia.flashblocks.base.org/ws", &headers).unwrap();
        assert!(connector.headers().get("host").is_none());
        assert!(connector.headers().get("sec-websocket-extensions").is_none());
    }

    #[test]
    fn invalid_header_value_is_rejected() {
        let mut headers = BTreeMap::new();
        headers.insert("Origin".to_string(), "bad\nvalue".to_string());
        let err = TungsteniteConnector::new("wss://example.org/ws", &headers).unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidHeader { .. }));
    }

    #[test]
    fn invalid_url_is_rejected() {
        let err = TungsteniteConnector::new("not a url", &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidUrl { .. }));
    }
}
