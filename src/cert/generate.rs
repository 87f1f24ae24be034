// src/cert/generate.rs

//! Self-signed certificate issuance, used to mint the server certificate on
//! first run and the cluster CA + leaf at bootstrap. `rcgen` is the
//! ecosystem-standard crate for this.

use anyhow::{Context, Result};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

/// A PEM-encoded certificate and its private key.
pub struct GeneratedCert {
    pub cert_pem: String,
    pub key_pem: String,
}

/// Generates a self-signed leaf certificate for the given common name,
/// valid for both server and client auth (the server cert doubles as the
/// client identity when this node calls its peers).
pub fn generate_self_signed(common_name: &str) -> Result<GeneratedCert> {
    let mut params = CertificateParams::new(vec![common_name.to_string()])
        .context("Failed to build certificate parameters")?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;

    let key_pair = KeyPair::generate().context("Failed to generate certificate key pair")?;
    let cert = params
        .self_signed(&key_pair)
        .context("Failed to self-sign certificate")?;

    Ok(GeneratedCert {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
    })
}
