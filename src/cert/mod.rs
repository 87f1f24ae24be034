// src/cert/mod.rs

//! The certificate holder: server and cluster TLS credentials, with
//! self-signed issuance for both.

mod generate;
mod holder;

pub use generate::{GeneratedCert, generate_self_signed};
pub use holder::{CertHolder, CertMaterial};
