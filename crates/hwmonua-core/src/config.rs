//! Server configuration.
//!
//! Two flavors exist, mirroring the two ways the server can be started:
//! - [`ServerConfig::minimal`] - plain endpoint, optional certificate that is
//!   only advertised
//! - [`ServerConfig::secured`] - TLS endpoint with certificate, private key
//!   and an optional trust list of client certificates (feature `encryption`)

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::access::{AccessControl, DefaultAccessControl};
use crate::error::ConfigError;

/// Default endpoint port.
pub const DEFAULT_PORT: u16 = 4840;

/// Default bind address.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default number of requests that may wait for the run-loop.
pub const DEFAULT_MAX_PENDING_REQUESTS: usize = 64;

/// Security material of the endpoint.
#[derive(Clone)]
pub enum SecurityConfig {
    /// No channel security. The certificate, if any, is only advertised.
    None { certificate: Option<Vec<u8>> },
    /// TLS with the given identity. A non-empty trust list requires clients
    /// to present a certificate issued by one of its entries.
    #[cfg(feature = "encryption")]
    SignAndEncrypt {
        certificate: Vec<u8>,
        private_key: Vec<u8>,
        trust_list: Vec<Vec<u8>>,
    },
}

impl SecurityConfig {
    /// Security mode name as advertised in the server info.
    pub fn mode(&self) -> &'static str {
        match self {
            SecurityConfig::None { .. } => "None",
            #[cfg(feature = "encryption")]
            SecurityConfig::SignAndEncrypt { .. } => "SignAndEncrypt",
        }
    }

    pub fn certificate(&self) -> Option<&[u8]> {
        match self {
            SecurityConfig::None { certificate } => certificate.as_deref(),
            #[cfg(feature = "encryption")]
            SecurityConfig::SignAndEncrypt { certificate, .. } => Some(certificate),
        }
    }

    pub fn is_secure(&self) -> bool {
        match self {
            SecurityConfig::None { .. } => false,
            #[cfg(feature = "encryption")]
            SecurityConfig::SignAndEncrypt { .. } => true,
        }
    }
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityConfig::None { certificate } => f
                .debug_struct("None")
                .field("certificate_len", &certificate.as_ref().map(Vec::len))
                .finish(),
            #[cfg(feature = "encryption")]
            SecurityConfig::SignAndEncrypt {
                certificate,
                trust_list,
                ..
            } => f
                .debug_struct("SignAndEncrypt")
                .field("certificate_len", &certificate.len())
                .field("private_key", &"<redacted>")
                .field("trust_list_len", &trust_list.len())
                .finish(),
        }
    }
}

/// Configuration consumed by [`Server::new`](crate::server::Server::new).
#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub application_name: String,
    pub application_uri: String,
    /// Capacity of the queue between the transport and the run-loop.
    pub max_pending_requests: usize,
    pub security: SecurityConfig,
    pub access_control: Arc<dyn AccessControl>,
}

impl ServerConfig {
    /// Unsecured configuration listening on `port`.
    pub fn minimal(port: u16, certificate: Option<Vec<u8>>) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port,
            application_name: "hwmonua".to_string(),
            application_uri: "urn:hwmonua:server".to_string(),
            max_pending_requests: DEFAULT_MAX_PENDING_REQUESTS,
            security: SecurityConfig::None { certificate },
            access_control: Arc::new(DefaultAccessControl),
        }
    }

    /// TLS configuration listening on `port`.
    #[cfg(feature = "encryption")]
    pub fn secured(
        port: u16,
        certificate: Vec<u8>,
        private_key: Vec<u8>,
        trust_list: Vec<Vec<u8>>,
    ) -> Self {
        Self {
            security: SecurityConfig::SignAndEncrypt {
                certificate,
                private_key,
                trust_list,
            },
            ..Self::minimal(port, None)
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    pub fn with_application_uri(mut self, uri: impl Into<String>) -> Self {
        self.application_uri = uri.into();
        self
    }

    pub fn with_max_pending_requests(mut self, max: usize) -> Self {
        self.max_pending_requests = max;
        self
    }

    /// Replace the access-control hook.
    pub fn with_access_control(mut self, access_control: Arc<dyn AccessControl>) -> Self {
        self.access_control = access_control;
        self
    }

    /// Address the endpoint binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn endpoint_url(&self) -> String {
        let scheme = if self.security.is_secure() { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// SHA-256 thumbprint (hex) of the configured certificate file contents.
    pub fn certificate_thumbprint(&self) -> Option<String> {
        self.security
            .certificate()
            .map(|cert| hex::encode(Sha256::digest(cert)))
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("application_name", &self.application_name)
            .field("application_uri", &self.application_uri)
            .field("max_pending_requests", &self.max_pending_requests)
            .field("security", &self.security)
            .finish_non_exhaustive()
    }
}

/// Read a security file (certificate, key, trust list entry).
///
/// An empty file is as useless as a missing one and is reported as an error.
pub fn load_file(path: impl AsRef<Path>) -> Result<Vec<u8>, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read(path).map_err(|source| ConfigError::Load {
        path: path.to_path_buf(),
        source,
    })?;
    if contents.is_empty() {
        return Err(ConfigError::Empty(path.to_path_buf()));
    }
    Ok(contents)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_minimal_config() {
        let config = ServerConfig::minimal(DEFAULT_PORT, None);
        assert_eq!(config.bind_address(), "0.0.0.0:4840");
        assert_eq!(config.endpoint_url(), "http://0.0.0.0:4840");
        assert_eq!(config.security.mode(), "None");
        assert!(config.certificate_thumbprint().is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let config = ServerConfig::minimal(4841, Some(b"cert".to_vec()))
            .with_host("127.0.0.1")
            .with_application_name("bench")
            .with_max_pending_requests(8);

        assert_eq!(config.bind_address(), "127.0.0.1:4841");
        assert_eq!(config.application_name, "bench");
        assert_eq!(config.max_pending_requests, 8);
        // sha256("cert")
        assert_eq!(
            config.certificate_thumbprint().unwrap(),
            "06298432e8066b29e2223bcc23aa9504b56ae508fabf3435508869b9c3190e22"
        );
    }

    #[cfg(feature = "encryption")]
    #[test]
    fn test_secured_config_debug_redacts_key() {
        let config = ServerConfig::secured(4840, b"cert".to_vec(), b"secret-key".to_vec(), vec![]);
        assert_eq!(config.security.mode(), "SignAndEncrypt");
        assert_eq!(config.endpoint_url(), "https://0.0.0.0:4840");

        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"certificate bytes").unwrap();
        assert_eq!(load_file(file.path()).unwrap(), b"certificate bytes");
    }

    #[test]
    fn test_load_file_errors() {
        let empty = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(load_file(empty.path()), Err(ConfigError::Empty(_))));

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.der");
        assert!(matches!(load_file(&missing), Err(ConfigError::Load { .. })));
    }
}
