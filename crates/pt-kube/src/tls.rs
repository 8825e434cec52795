//! TLS client configuration shared by the API lookup and the tunnel
//!
//! Trust comes from the kubeconfig's CA bundle when present, otherwise
//! from the platform's native roots. `insecure-skip-tls-verify` replaces
//! verification entirely.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{self, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use pt_core::{ClusterCredentials, TransportError};

/// Build a rustls client config for `credentials`
pub fn client_config(credentials: &ClusterCredentials) -> Result<ClientConfig, TransportError> {
    let provider = Arc::new(crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(tls_error)?;

    let builder = if credentials.insecure_skip_tls_verify {
        tracing::warn!("TLS verification disabled for {}", credentials.server);
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification(provider)))
    } else {
        builder.with_root_certificates(root_store(credentials)?)
    };

    let mut config = match (&credentials.client_cert_pem, &credentials.client_key_pem) {
        (Some(cert), Some(key)) => builder
            .with_client_auth_cert(parse_certs(cert)?, parse_key(key)?)
            .map_err(tls_error)?,
        _ => builder.with_no_client_auth(),
    };
    // WebSocket upgrades need HTTP/1.1
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(config)
}

fn root_store(credentials: &ClusterCredentials) -> Result<RootCertStore, TransportError> {
    let mut roots = RootCertStore::empty();

    if let Some(ca) = &credentials.ca_pem {
        for cert in parse_certs(ca)? {
            roots.add(cert).map_err(tls_error)?;
        }
        return Ok(roots);
    }

    let native = rustls_native_certs::load_native_certs();
    for err in &native.errors {
        tracing::debug!("Skipping native certificate: {}", err);
    }
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    tracing::debug!("Loaded {} native root(s), ignored {}", added, ignored);
    Ok(roots)
}

fn parse_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(tls_error)?;
    if certs.is_empty() {
        return Err(TransportError::Tls("no certificate found in PEM data".into()));
    }
    Ok(certs)
}

fn parse_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>, TransportError> {
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(tls_error)?
        .ok_or_else(|| TransportError::Tls("no private key found in PEM data".into()))
}

fn tls_error(e: impl std::fmt::Display) -> TransportError {
    TransportError::Tls(e.to_string())
}

/// Accepts any server certificate; signatures are still checked
#[derive(Debug)]
struct NoVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
