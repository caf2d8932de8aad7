//! Self-signed certificate per node and the rustls 1.3-only client/server
//! configs built from it (§4.6). Each node mints its own identity at
//! startup; there is no shared CA — peers are authenticated at the
//! application layer (handshake + network_id gating), not by certificate
//! chain, so both sides accept any well-formed peer certificate.

use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::server::{ClientCertVerified, ClientCertVerifier};
use rustls::{Certificate, PrivateKey};
use std::sync::Arc;
use std::time::SystemTime;

pub struct NodeIdentity {
    pub cert_der: Vec<u8>,
    pub key_der: Vec<u8>,
}

/// Generates a fresh self-signed certificate for this node's TLS identity.
pub fn generate_node_identity(node_id: &str) -> anyhow::Result<NodeIdentity> {
    let params = rcgen::CertificateParams::new(vec![node_id.to_string(), "localhost".to_string()]);
    let cert = rcgen::Certificate::from_params(params)?;
    Ok(NodeIdentity {
        cert_der: cert.serialize_der()?,
        key_der: cert.serialize_private_key_der(),
    })
}

/// Accepts any certificate: this network authenticates peers via the
/// application-level handshake (node_id/network_id), not a PKI chain.
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

impl ClientCertVerifier for AcceptAnyCert {
    fn client_auth_root_subjects(&self) -> &[rustls::DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _now: SystemTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        Ok(ClientCertVerified::assertion())
    }
}

pub fn server_config(identity: &NodeIdentity) -> anyhow::Result<Arc<rustls::ServerConfig>> {
    let cert = Certificate(identity.cert_der.clone());
    let key = PrivateKey(identity.key_der.clone());
    let config = rustls::ServerConfig::builder()
        .with_safe_default_cipher_suites()
        .with_safe_default_kx_groups()
        .with_protocol_versions(&[&rustls::version::TLS13])?
        .with_client_cert_verifier(Arc::new(AcceptAnyCert))
        .with_single_cert(vec![cert], key)?;
    Ok(Arc::new(config))
}

pub fn client_config(identity: &NodeIdentity) -> anyhow::Result<Arc<rustls::ClientConfig>> {
    let cert = Certificate(identity.cert_der.clone());
    let key = PrivateKey(identity.key_der.clone());
    let config = rustls::ClientConfig::builder()
        .with_safe_default_cipher_suites()
        .with_safe_default_kx_groups()
        .with_protocol_versions(&[&rustls::version::TLS13])?
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
        .with_single_cert(vec![cert], key)?;
    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_a_parseable_self_signed_identity() {
        let identity = generate_node_identity("node-a").unwrap();
        assert!(!identity.cert_der.is_empty());
        assert!(!identity.key_der.is_empty());
        assert!(server_config(&identity).is_ok());
        assert!(client_config(&identity).is_ok());
    }
}
