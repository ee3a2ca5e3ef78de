//! # TLS Upgrade for WAN Connections
//!
//! WAN command channels are TLS-upgraded immediately after the TCP handshake.
//! The radio presents a self-signed certificate and is trusted by the relay
//! that brokered the connection, so the peer is accepted unconditionally:
//! no chain, name or expiry checks are made.
//!
//! ## Responsibilities
//! - Build a rustls client configuration with an accept-any verifier
//! - Wrap a connected `TcpStream` in a client TLS stream within a timeout

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::{Certificate, ClientConfig, ServerName};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, instrument};

use crate::error::{ProtocolError, Result};
use crate::utils::timeout::with_timeout_error;

/// Verifier that accepts whatever certificate the radio presents
struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

/// Client TLS configuration for radio command channels
pub fn radio_client_config() -> ClientConfig {
    ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
        .with_no_client_auth()
}

/// Upgrade an established TCP stream to TLS
#[instrument(skip(stream), fields(peer = %peer))]
pub async fn upgrade(
    stream: TcpStream,
    peer: IpAddr,
    timeout: Duration,
) -> Result<TlsStream<TcpStream>> {
    let connector = TlsConnector::from(Arc::new(radio_client_config()));
    let server_name = ServerName::IpAddress(peer);

    let tls_stream = with_timeout_error(
        async {
            connector
                .connect(server_name, stream)
                .await
                .map_err(|e| ProtocolError::TlsError(format!("TLS connection failed: {e}")))
        },
        timeout,
    )
    .await?;

    debug!("TLS session established");
    Ok(tls_stream)
}
