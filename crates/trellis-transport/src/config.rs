use crate::error::TransportError;

/// Opaque connection credentials supplied by the authentication
/// collaborator. The transport attaches them to the handshake verbatim
/// and never interprets their contents.
#[derive(Debug, Clone, Default)]
pub enum ConnectionParams {
    #[default]
    None,
    /// Sent as `Authorization: Bearer <token>`.
    Bearer(String),
    /// Sent as `Cookie: <value>`.
    Cookie(String),
    /// Arbitrary header-pair credentials, sent as-is.
    Headers(Vec<(String, String)>),
}

/// Configuration for the production WebSocket transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Endpoint URL or bare host; `ws://` / `wss://` is inferred.
    pub endpoint: String,
    pub params: ConnectionParams,
    pub use_tls: bool,
}

impl TransportConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        // Local endpoints default to plaintext, everything else to TLS.
        let use_tls = endpoint.starts_with("wss://")
            || (!endpoint.starts_with("ws://")
                && !endpoint.contains("127.0.0.1")
                && !endpoint.contains("localhost"));
        TransportConfig {
            endpoint,
            params: ConnectionParams::None,
            use_tls,
        }
    }

    pub fn with_params(mut self, params: ConnectionParams) -> Self {
        self.params = params;
        self
    }

    /// Builds the full connection URL, normalizing the scheme.
    pub fn build_url(&self) -> Result<url::Url, TransportError> {
        let mut endpoint = self.endpoint.clone();
        if !endpoint.starts_with("ws://") && !endpoint.starts_with("wss://") {
            endpoint = if self.use_tls {
                format!("wss://{endpoint}")
            } else {
                format!("ws://{endpoint}")
            };
        }
        url::Url::parse(&endpoint).map_err(|err| TransportError::InvalidEndpoint(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_scheme_for_bare_hosts() {
        let local = TransportConfig::new("127.0.0.1:8080/pivot");
        assert_eq!(local.build_url().unwrap().scheme(), "ws");

        let remote = TransportConfig::new("pivot.example.com/ws");
        assert_eq!(remote.build_url().unwrap().scheme(), "wss");
    }

    #[test]
    fn explicit_scheme_wins() {
        let config = TransportConfig::new("ws://pivot.example.com/ws");
        assert_eq!(config.build_url().unwrap().scheme(), "ws");
    }

    #[test]
    fn rejects_unparseable_endpoint() {
        let config = TransportConfig::new("ws://");
        assert!(matches!(
            config.build_url(),
            Err(TransportError::InvalidEndpoint(_))
        ));
    }
}
