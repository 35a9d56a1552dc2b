//! Outbound IP allow-list enforcement, shared by every transport.
//!
//! `ferrex` pulls in `ipnetwork` for the same purpose (validating configured
//! IP ranges); we reuse it here rather than hand-rolling CIDR math.

use ipnetwork::IpNetwork;
use std::net::IpAddr;

use crate::error::TransportError;

/// Resolves `hostname` to its IP addresses (via the system resolver) and
/// confirms at least one of them falls inside `allowed`. An empty `allowed`
/// list is treated as "anything goes" — appropriate only for `Mock` agents,
/// enforced by the caller.
pub fn enforce_allow_list(hostname: &str, allowed: &[IpNetwork]) -> Result<(), TransportError> {
    if allowed.is_empty() {
        return Ok(());
    }

    let ips = resolve(hostname)?;
    if ips.iter().any(|ip| allowed.iter().any(|net| net.contains(*ip))) {
        Ok(())
    } else {
        Err(TransportError::IpNotAllowed {
            hostname: hostname.to_string(),
        })
    }
}

fn resolve(hostname: &str) -> Result<Vec<IpAddr>, TransportError> {
    if let Ok(ip) = hostname.parse::<IpAddr>() {
        return Ok(vec![ip]);
    }

    use std::net::ToSocketAddrs;
    let lookup = format!("{hostname}:0");
    lookup
        .to_socket_addrs()
        .map(|it| it.map(|sa| sa.ip()).collect())
        .map_err(|e| TransportError::Resolve(hostname.to_string(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allow_list_permits_anything() {
        assert!(enforce_allow_list("10.0.0.1", &[]).is_ok());
    }

    #[test]
    fn literal_ip_inside_cidr_is_allowed() {
        let net: IpNetwork = "10.0.0.0/8".parse().unwrap();
        assert!(enforce_allow_list("10.1.2.3", &[net]).is_ok());
    }

    #[test]
    fn literal_ip_outside_cidr_is_rejected() {
        let net: IpNetwork = "10.0.0.0/8".parse().unwrap();
        assert!(enforce_allow_list("192.168.1.1", &[net]).is_err());
    }
}
