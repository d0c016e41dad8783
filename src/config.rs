//! Proxy configuration, loaded once at startup from a JSON file.

use std::net::SocketAddr;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::sticky::MatchPolicy;
use crate::upstream::{parse_peer_address, Peer};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Address the proxy listens on.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Address the probe server (healthz/readyz) listens on.
    #[serde(default = "default_probe_listen")]
    pub probe_listen: String,
    /// Backend pool. Order matters: it decides affinity tie-breaks.
    pub upstreams: Vec<UpstreamConfig>,
    /// Consecutive connect failures before a peer is marked down.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Sticky-session policy.
    #[serde(default)]
    pub sticky: StickyConfig,
}

/// One backend pool entry.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    pub address: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

/// Sticky-session policy: cookie attributes plus matching behavior.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StickyConfig {
    /// Name of the cookie carrying the affinity token.
    pub cookie_name: String,
    /// `Domain` attribute for issued cookies; host-only when unset.
    pub cookie_domain: Option<String>,
    /// `Path` attribute for issued cookies.
    pub cookie_path: String,
    /// `Max-Age` in seconds; session-lifetime cookie when unset.
    pub cookie_max_age: Option<u64>,
    /// How inbound tokens are compared against peer digests.
    pub match_policy: MatchPolicy,
    /// Whether a pinned peer must be healthy to be used. When false, a
    /// resolved pin is honored even if the peer is marked down.
    pub pin_requires_healthy: bool,
}

impl Default for StickyConfig {
    fn default() -> Self {
        Self {
            cookie_name: "route".to_string(),
            cookie_domain: None,
            cookie_path: "/".to_string(),
            cookie_max_age: None,
            match_policy: MatchPolicy::Prefix,
            pin_requires_healthy: true,
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_probe_listen() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_weight() -> u32 {
    1
}

impl ProxyConfig {
    /// Reads and validates a configuration file.
    pub fn load(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{path}'"))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.listen
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid listen address '{}'", self.listen))?;
        self.probe_listen
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid probe address '{}'", self.probe_listen))?;

        if self.upstreams.is_empty() {
            bail!("at least one upstream peer is required");
        }
        for upstream in &self.upstreams {
            parse_peer_address(&upstream.address).map_err(|e| anyhow::anyhow!(e))?;
        }

        let name = &self.sticky.cookie_name;
        if name.is_empty() || name.contains(|c: char| c == '=' || c == ';' || c.is_whitespace()) {
            bail!("invalid cookie name '{name}'");
        }
        let path = &self.sticky.cookie_path;
        if !path.starts_with('/') {
            bail!("cookie path '{path}' must start with '/'");
        }
        // Control characters would make the rendered Set-Cookie line an
        // illegal header value; ';' would splice in extra attributes.
        if path.contains(|c: char| c == ';' || c.is_control()) {
            bail!("cookie path '{path}' contains characters illegal in a Set-Cookie line");
        }
        if let Some(domain) = &self.sticky.cookie_domain {
            if domain.contains(|c: char| c == ';' || c.is_control()) {
                bail!("cookie domain '{domain}' contains characters illegal in a Set-Cookie line");
            }
        }

        Ok(())
    }

    /// The upstream pool as peers, in configuration order.
    pub fn peers(&self) -> Vec<Peer> {
        self.upstreams
            .iter()
            .map(|u| Peer::new(u.address.as_str(), u.weight))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> ProxyConfig {
        serde_json::from_str(r#"{"upstreams": [{"address": "127.0.0.1:8080"}]}"#).unwrap()
    }

    // ========== Phase 1: Defaults ==========

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = minimal_config();
        assert_eq!(config.listen, "0.0.0.0:8080");
        assert_eq!(config.probe_listen, "0.0.0.0:9090");
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.upstreams[0].weight, 1);
        assert_eq!(config.sticky.cookie_name, "route");
        assert_eq!(config.sticky.cookie_domain, None);
        assert_eq!(config.sticky.cookie_path, "/");
        assert_eq!(config.sticky.cookie_max_age, None);
        assert_eq!(config.sticky.match_policy, MatchPolicy::Prefix);
        assert!(config.sticky.pin_requires_healthy);
    }

    #[test]
    fn test_minimal_config_validates() {
        assert!(minimal_config().validate().is_ok());
    }

    // ========== Phase 2: Full Parse ==========

    #[test]
    fn test_full_config_parses() {
        let raw = r#"{
            "listen": "0.0.0.0:80",
            "probe_listen": "127.0.0.1:9901",
            "upstreams": [
                {"address": "10.0.0.1:80", "weight": 2},
                {"address": "10.0.0.2:80"}
            ],
            "failure_threshold": 5,
            "sticky": {
                "cookie_name": "backend",
                "cookie_domain": ".example.com",
                "cookie_path": "/app",
                "cookie_max_age": 3600,
                "match_policy": "exact",
                "pin_requires_healthy": false
            }
        }"#;
        let config: ProxyConfig = serde_json::from_str(raw).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.upstreams.len(), 2);
        assert_eq!(config.upstreams[0].weight, 2);
        assert_eq!(config.sticky.match_policy, MatchPolicy::Exact);
        assert!(!config.sticky.pin_requires_healthy);
        assert_eq!(config.sticky.cookie_max_age, Some(3600));
    }

    #[test]
    fn test_peers_preserve_order_and_weight() {
        let raw = r#"{"upstreams": [
            {"address": "10.0.0.3:80", "weight": 3},
            {"address": "10.0.0.1:80"}
        ]}"#;
        let config: ProxyConfig = serde_json::from_str(raw).unwrap();
        let peers = config.peers();
        assert_eq!(peers[0].address, "10.0.0.3:80");
        assert_eq!(peers[0].weight, 3);
        assert_eq!(peers[1].address, "10.0.0.1:80");
        assert_eq!(peers[1].weight, 1);
    }

    // ========== Phase 3: Validation ==========

    #[test]
    fn test_empty_upstreams_rejected() {
        let config: ProxyConfig = serde_json::from_str(r#"{"upstreams": []}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_upstream_address_rejected() {
        let config: ProxyConfig =
            serde_json::from_str(r#"{"upstreams": [{"address": "not-an-address"}]}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_listen_address_rejected() {
        let mut config = minimal_config();
        config.listen = "nope".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_cookie_name_rejected() {
        for name in ["", "ro ute", "ro;ute", "ro=ute"] {
            let mut config = minimal_config();
            config.sticky.cookie_name = name.to_string();
            assert!(config.validate().is_err(), "accepted cookie name {name:?}");
        }
    }

    #[test]
    fn test_relative_cookie_path_rejected() {
        let mut config = minimal_config();
        config.sticky.cookie_path = "app".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cookie_path_with_illegal_characters_rejected() {
        // "\r\n" in an attribute would otherwise pass validation and then
        // fail every cookie-issuing response at render time.
        for path in ["/app\r\nX-Injected: 1", "/app\u{7f}", "/a;b"] {
            let mut config = minimal_config();
            config.sticky.cookie_path = path.to_string();
            assert!(config.validate().is_err(), "accepted cookie path {path:?}");
        }
    }

    #[test]
    fn test_cookie_domain_with_illegal_characters_rejected() {
        for domain in ["evil\r\n.example.com", "a;b.example.com"] {
            let mut config = minimal_config();
            config.sticky.cookie_domain = Some(domain.to_string());
            assert!(
                config.validate().is_err(),
                "accepted cookie domain {domain:?}"
            );
        }
    }

    #[test]
    fn test_non_ascii_cookie_domain_accepted() {
        // Bytes above 0x7f are legal in a header value; only control
        // characters and separators corrupt the Set-Cookie line.
        let mut config = minimal_config();
        config.sticky.cookie_domain = Some("müller.example".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_match_policy_rejected() {
        let raw = r#"{"upstreams": [{"address": "127.0.0.1:80"}],
                      "sticky": {"match_policy": "fuzzy"}}"#;
        assert!(serde_json::from_str::<ProxyConfig>(raw).is_err());
    }

    // ========== Phase 4: File Loading ==========

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("sticky-route-test-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"upstreams": [{"address": "127.0.0.1:8080"}]}"#).unwrap();
        let config = ProxyConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.upstreams.len(), 1);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(ProxyConfig::load("/nonexistent/sticky-route.json").is_err());
    }
}
