//! Device-context capture.
//!
//! Builds the [`DeviceContext`] recorded on sessions from request
//! metadata and inserts it into request extensions, so handlers never
//! touch headers themselves.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::domains::sessions::DeviceContext;

pub async fn capture_device_context(
    connect_info: Option<ConnectInfo<SocketAddr>>,
    mut request: Request,
    next: Next,
) -> Response {
    let peer = connect_info.map(|ConnectInfo(addr)| addr);
    let context = device_context_from(request.headers(), peer);
    request.extensions_mut().insert(context);

    next.run(request).await
}

/// Client IP precedence: `X-Forwarded-For` (first hop), then `X-Real-IP`,
/// then the peer socket address.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        return forwarded
            .to_str()
            .ok()
            .and_then(|s| s.split(',').next())
            .and_then(|s| s.trim().parse().ok());
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        return real_ip.to_str().ok().and_then(|s| s.parse().ok());
    }

    peer.map(|addr| addr.ip())
}

fn device_context_from(headers: &HeaderMap, peer: Option<SocketAddr>) -> DeviceContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    };

    DeviceContext {
        device_id: header("x-device-id"),
        ip: client_ip(headers, peer).map(|ip| ip.to_string()),
        user_agent: header("user-agent"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> Option<SocketAddr> {
        Some("10.0.0.1:443".parse().unwrap())
    }

    #[test]
    fn test_forwarded_for_wins_over_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.2".parse().unwrap());
        headers.insert("x-real-ip", "198.51.100.1".parse().unwrap());

        let ctx = device_context_from(&headers, peer());
        assert_eq!(ctx.ip.as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_real_ip_then_peer_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "198.51.100.1".parse().unwrap());
        assert_eq!(
            device_context_from(&headers, peer()).ip.as_deref(),
            Some("198.51.100.1")
        );

        assert_eq!(
            device_context_from(&HeaderMap::new(), peer()).ip.as_deref(),
            Some("10.0.0.1")
        );
        assert_eq!(device_context_from(&HeaderMap::new(), None).ip, None);
    }

    #[test]
    fn test_captures_device_id_and_user_agent() {
        let mut headers = HeaderMap::new();
        headers.insert("x-device-id", "device-42".parse().unwrap());
        headers.insert("user-agent", "test-agent/1.0".parse().unwrap());

        let ctx = device_context_from(&headers, None);
        assert_eq!(ctx.device_id.as_deref(), Some("device-42"));
        assert_eq!(ctx.user_agent.as_deref(), Some("test-agent/1.0"));
    }
}
