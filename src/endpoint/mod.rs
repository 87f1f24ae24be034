// src/endpoint/mod.rs

//! The endpoint manager: live listeners bound to HTTP routers, with
//! hot-reloadable TLS.

mod manager;
mod response;
mod router;

pub use manager::{EndpointKind, EndpointManager, address_matches_core};
pub use response::{Envelope, EnvelopeKind, not_found};
pub use router::{RouterState, base_router};
