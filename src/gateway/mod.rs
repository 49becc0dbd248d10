//! Connection gateway: authentication, then per-address admission.

mod admission;

pub use admission::{AddressAdmission, AdmissionStats, AdmissionTicket};

use std::net::IpAddr;
use std::sync::Arc;

use axum::http::HeaderMap;

use crate::auth::SharedSecret;
use crate::error::Result;

/// Decide whether a connection attempt may proceed.
///
/// Authentication runs strictly before admission counting, so a rejected
/// token never consumes a connection slot.
pub fn authorize(
    secret: &SharedSecret,
    admission: &Arc<AddressAdmission>,
    token: Option<&str>,
    addr: IpAddr,
) -> Result<AdmissionTicket> {
    secret.verify(token)?;
    admission.admit(addr)
}

/// Resolve the source address used for admission accounting, preferring the
/// configured proxy header over the raw peer address.
pub fn resolve_source_addr(headers: &HeaderMap, forwarded_header: &str, peer: IpAddr) -> IpAddr {
    headers
        .get(forwarded_header)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(peer)
}
