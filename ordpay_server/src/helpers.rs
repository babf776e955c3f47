use std::{net::IpAddr, str::FromStr, sync::OnceLock};

use actix_web::HttpRequest;
use log::{debug, trace, warn};
use regex::Regex;

fn forwarded_for_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)for="?\[?(?P<ip>[0-9a-f.:]+?)\]?(:\d+)?"?(;|,|$)"#)
            .map_err(|e| warn!("💻️ Could not compile the Forwarded header pattern. {e}"))
            .ok()
    })
    .as_ref()
}

/// Get the remote IP address from the request. It uses 3 sources to determine the IP address, in decreasing order
/// of preference:
/// 1. The first entry of the `X-Forwarded-For` header, iif `use_x_forwarded_for` is set.
/// 2. The first `for=` entry of the `Forwarded` header, iif `use_forwarded` is set.
/// 3. The peer address from the connection info.
pub fn get_remote_ip(req: &HttpRequest, use_x_forwarded_for: bool, use_forwarded: bool) -> Option<IpAddr> {
    let mut result = None;
    if use_x_forwarded_for {
        trace!("💻️ Checking X-Forwarded-For header");
        result = req
            .headers()
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| IpAddr::from_str(s.trim()).ok());
        if let Some(ip) = result {
            debug!("💻️ Using X-Forwarded-For header for remote address: {ip}");
        }
    }
    if use_forwarded && result.is_none() {
        trace!("💻️ Checking Forwarded header");
        result = forwarded_for_regex().and_then(|re| {
            req.headers()
                .get("Forwarded")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| re.captures(v))
                .and_then(|caps| caps.name("ip"))
                .and_then(|m| IpAddr::from_str(m.as_str()).ok())
        });
        if let Some(ip) = result {
            debug!("💻️ Using Forwarded header for remote address: {ip}");
        }
    }
    result.or_else(|| {
        let peer_addr = req.peer_addr().map(|a| a.ip());
        trace!("💻️ Using peer address for remote address: {peer_addr:?}");
        peer_addr
    })
}
