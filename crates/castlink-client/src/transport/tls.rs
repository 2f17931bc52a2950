//! TLS connector for Cast receivers.
//!
//! Receivers present self-signed device certificates, so the server
//! certificate is accepted without validation.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use tokio_rustls::rustls::crypto::{ring, CryptoProvider};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{self, ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio_rustls::TlsConnector;

use castlink_core::error::{CastError, Result};

use crate::config::DeviceSection;

pub type CastStream = TlsStream<TcpStream>;

/// Connect TCP, then run the TLS handshake. Both steps share the timeout.
pub async fn connect(device: &DeviceSection) -> Result<CastStream> {
    let limit = Duration::from_millis(device.connect_timeout_ms);
    let addr = (device.host.as_str(), device.port);

    let tcp = timeout(limit, TcpStream::connect(addr))
        .await
        .map_err(|_| CastError::Connect(format!("tcp connect timed out after {}ms", device.connect_timeout_ms)))?
        .map_err(|e| CastError::Connect(format!("tcp connect to {}:{} failed: {e}", device.host, device.port)))?;
    if let Err(e) = tcp.set_nodelay(true) {
        tracing::debug!(error = %e, "set_nodelay failed");
    }

    let server_name = ServerName::try_from(device.host.clone())
        .map_err(|e| CastError::Connect(format!("invalid server name {}: {e}", device.host)))?;
    let connector = TlsConnector::from(Arc::new(client_config()?));

    timeout(limit, connector.connect(server_name, tcp))
        .await
        .map_err(|_| CastError::Connect(format!("tls handshake timed out after {}ms", device.connect_timeout_ms)))?
        .map_err(|e| CastError::Connect(format!("tls handshake failed: {e}")))
}

fn client_config() -> Result<ClientConfig> {
    let provider = Arc::new(ring::default_provider());
    let verifier = AcceptAnyCert {
        provider: Arc::clone(&provider),
    };

    let cfg = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| CastError::Connect(format!("tls config: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    Ok(cfg)
}

/// Accepts any server certificate. Handshake signatures are still checked
/// against the presented certificate.
#[derive(Debug)]
struct AcceptAnyCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}
