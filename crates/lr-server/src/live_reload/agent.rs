//! Browser-side reload agent.

use std::net::IpAddr;

/// Path the asset server exposes the agent script at.
pub const AGENT_PATH: &str = "/__lr/live-reload.js";

const TEMPLATE: &str = include_str!("agent.js");

/// Render the agent script for a notification endpoint at `host:port`.
///
/// Wildcard addresses are left to the page's own hostname so the agent
/// works from other machines on the network.
#[must_use]
pub fn render_agent(host: &str, port: u16) -> String {
    let host = match host.parse::<IpAddr>() {
        Ok(ip) if ip.is_unspecified() => String::new(),
        Ok(IpAddr::V6(ip)) => format!("[{ip}]"),
        _ => host.to_owned(),
    };

    TEMPLATE
        .replace("__LR_HOST__", &host)
        .replace("__LR_PORT__", &port.to_string())
}
