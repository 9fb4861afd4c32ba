//! Server instance and run-loop.
//!
//! The [`Server`] owns the address space. While it runs, a single task (the
//! one awaiting [`Server::run`]) services every request: the transport only
//! queues [`ServiceRequest`]s and waits for the answers, so data sources are
//! never called concurrently.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::address_space::AddressSpace;
use crate::config::{SecurityConfig, ServerConfig};
use crate::error::{Result, ServerError};
use crate::lifecycle::RunningFlag;
use crate::service;
use crate::transport::{self, ServiceRequest};
use crate::types::StatusCode;

/// Description of the running endpoint, returned by the info service.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub application_name: String,
    pub application_uri: String,
    pub endpoint_url: String,
    pub security_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_thumbprint: Option<String>,
    pub node_count: usize,
    pub started_at: DateTime<Utc>,
}

/// Protocol server instance.
pub struct Server {
    config: ServerConfig,
    address_space: AddressSpace,
    #[cfg(feature = "encryption")]
    acceptor: Option<tokio_rustls::TlsAcceptor>,
}

impl Server {
    /// Construct a server from `config`.
    ///
    /// Security material is validated here, so a bad certificate or key fails
    /// before any socket is opened.
    pub fn new(config: ServerConfig) -> Result<Self> {
        if config.max_pending_requests == 0 {
            return Err(ServerError::InvalidConfig(
                "max_pending_requests must be greater than zero".to_string(),
            ));
        }
        if config.application_uri.is_empty() {
            return Err(ServerError::InvalidConfig(
                "application_uri must not be empty".to_string(),
            ));
        }

        #[cfg(feature = "encryption")]
        let acceptor = match &config.security {
            SecurityConfig::SignAndEncrypt {
                certificate,
                private_key,
                trust_list,
            } => Some(crate::tls::build_acceptor(certificate, private_key, trust_list)?),
            SecurityConfig::None { .. } => None,
        };

        if let SecurityConfig::None {
            certificate: Some(_),
        } = &config.security
        {
            tracing::info!("Certificate configured without channel security, advertising only");
        }

        Ok(Self {
            config,
            address_space: AddressSpace::new(),
            #[cfg(feature = "encryption")]
            acceptor,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn address_space(&self) -> &AddressSpace {
        &self.address_space
    }

    /// Mutable access for node registration before the server runs.
    pub fn address_space_mut(&mut self) -> &mut AddressSpace {
        &mut self.address_space
    }

    /// Bind the configured endpoint and run until `running` is cleared.
    ///
    /// Returns [`StatusCode::GOOD`] after a clean shutdown.
    pub async fn run(self, running: RunningFlag) -> StatusCode {
        let address = self.config.bind_address();
        let listener = match TcpListener::bind(&address).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!("Failed to bind {}: {}", address, e);
                return StatusCode::BAD_COMMUNICATION_ERROR;
            }
        };
        self.run_with_listener(listener, running).await
    }

    /// Run on an already bound listener until `running` is cleared.
    pub async fn run_with_listener(self, listener: TcpListener, running: RunningFlag) -> StatusCode {
        let (tx, mut rx) = mpsc::channel(self.config.max_pending_requests);
        let app = transport::router(tx);

        match listener.local_addr() {
            Ok(addr) => tracing::info!(
                "Server listening on {} (security: {}, nodes: {})",
                addr,
                self.config.security.mode(),
                self.address_space.len()
            ),
            Err(e) => tracing::warn!("Server listening on unknown address: {}", e),
        }

        let transport = {
            let running = running.clone();
            #[cfg(feature = "encryption")]
            let acceptor = self.acceptor.clone();
            tokio::spawn(async move {
                #[cfg(feature = "encryption")]
                let served = match acceptor {
                    Some(acceptor) => transport::serve_tls(listener, acceptor, app, running).await,
                    None => transport::serve_plain(listener, app, running).await,
                };
                #[cfg(not(feature = "encryption"))]
                let served = transport::serve_plain(listener, app, running).await;
                served
            })
        };

        let started_at = Utc::now();
        let mut status = StatusCode::GOOD;

        while running.is_running() {
            let request = tokio::select! {
                biased;
                _ = running.stopped() => break,
                request = rx.recv() => request,
            };

            match request {
                Some(request) => self.dispatch(request, started_at),
                None => {
                    tracing::error!("Request transport terminated unexpectedly");
                    status = StatusCode::BAD_COMMUNICATION_ERROR;
                    break;
                }
            }
        }

        running.stop();
        drop(rx);

        match transport.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!("Request transport failed: {}", e);
                if status.is_good() {
                    status = StatusCode::BAD_COMMUNICATION_ERROR;
                }
            }
            Err(e) => {
                tracing::error!("Request transport task panicked: {}", e);
                if status.is_good() {
                    status = StatusCode::BAD_INTERNAL_ERROR;
                }
            }
        }

        tracing::info!("Server stopped: {}", status);
        status
    }

    fn info(&self, started_at: DateTime<Utc>) -> ServerInfo {
        ServerInfo {
            application_name: self.config.application_name.clone(),
            application_uri: self.config.application_uri.clone(),
            endpoint_url: self.config.endpoint_url(),
            security_mode: self.config.security.mode(),
            certificate_thumbprint: self.config.certificate_thumbprint(),
            node_count: self.address_space.len(),
            started_at,
        }
    }

    fn dispatch(&self, request: ServiceRequest, started_at: DateTime<Utc>) {
        let access = self.config.access_control.as_ref();
        // A dropped reply means the client went away; nothing to do.
        match request {
            ServiceRequest::Info { reply } => {
                let _ = reply.send(self.info(started_at));
            }
            ServiceRequest::Read {
                session,
                request,
                reply,
            } => {
                let response = service::read(&self.address_space, access, &session, &request);
                let _ = reply.send(response);
            }
            ServiceRequest::Write {
                session,
                request,
                reply,
            } => {
                let response = service::write(&self.address_space, access, &session, &request);
                let _ = reply.send(response);
            }
            ServiceRequest::Browse { node_id, reply } => {
                let _ = reply.send(service::browse(&self.address_space, &node_id));
            }
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("nodes", &self.address_space.len())
            .finish_non_exhaustive()
    }
}
