use miette::{IntoDiagnostic, Result, WrapErr, miette};
use oidc_bff::GatewayConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_ROUTES_DIR: &str = "./config/";

/// Process settings read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    pub routes_dir: PathBuf,
    /// No Redis means the in-memory store, which is single-instance only
    pub redis_url: Option<String>,
    pub session_ttl: Option<Duration>,
    pub outbound_timeout: Option<Duration>,
    pub client_id: String,
    pub client_secret: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| lookup(*key).filter(|v| !v.trim().is_empty()))
        };

        let bind_addr: SocketAddr = var(&["BIND_ADDR"])
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .into_diagnostic()
            .wrap_err("BIND_ADDR is not a socket address")?;

        let routes_dir: PathBuf = var(&["ROUTES_DIR", "YAML_CONFIG_DIR_PATH"])
            .unwrap_or_else(|| DEFAULT_ROUTES_DIR.to_string())
            .into();

        let redis_url = match var(&["REDIS_URL"]) {
            Some(url) => Some(url),
            None => var(&["REDIS_HOST"]).map(|host| {
                let port = var(&["REDIS_PORT"]).unwrap_or_else(|| "6379".to_string());
                format!("redis://{host}:{port}")
            }),
        };

        let session_ttl = match (var(&["SESSION_TTL_SECONDS"]), var(&["REDIS_TTL_MILLISECONDS"])) {
            (Some(seconds), _) => Some(Duration::from_secs(parse_u64("SESSION_TTL_SECONDS", &seconds)?)),
            (None, Some(millis)) => {
                let millis = parse_u64("REDIS_TTL_MILLISECONDS", &millis)?;
                Some(Duration::from_secs((millis / 1000).max(1)))
            }
            (None, None) => None,
        };

        let outbound_timeout = var(&["OUTBOUND_TIMEOUT_SECONDS"])
            .map(|v| parse_u64("OUTBOUND_TIMEOUT_SECONDS", &v).map(Duration::from_secs))
            .transpose()?;

        Ok(Self {
            bind_addr,
            routes_dir,
            redis_url,
            session_ttl,
            outbound_timeout,
            client_id: var(&["OIDC_CLIENT_ID", "KEYCLOAK_CLIENT_ID"]).unwrap_or_default(),
            client_secret: var(&["OIDC_CLIENT_SECRET", "KEYCLOAK_CLIENT_SECRET"]).unwrap_or_default(),
        })
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        let mut config = GatewayConfig::new(&self.client_id, &self.client_secret);
        if let Some(ttl) = self.session_ttl {
            config = config.with_session_ttl(ttl);
        }
        if let Some(timeout) = self.outbound_timeout {
            config = config.with_outbound_timeout(timeout);
        }
        config
    }
}

fn parse_u64(key: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|_| miette!("{key} must be a non-negative integer, got {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.bind_addr.to_string(), "0.0.0.0:3000");
        assert_eq!(s.routes_dir, PathBuf::from("./config/"));
        assert!(s.redis_url.is_none());
        assert_eq!(s.gateway_config().session_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn legacy_names_are_accepted() {
        let s = settings(&[
            ("YAML_CONFIG_DIR_PATH", "/etc/bff"),
            ("REDIS_HOST", "cache"),
            ("REDIS_PORT", "6380"),
            ("REDIS_TTL_MILLISECONDS", "600000"),
            ("KEYCLOAK_CLIENT_ID", "bff"),
            ("KEYCLOAK_CLIENT_SECRET", "secret"),
        ])
        .unwrap();

        assert_eq!(s.routes_dir, PathBuf::from("/etc/bff"));
        assert_eq!(s.redis_url.as_deref(), Some("redis://cache:6380"));
        assert_eq!(s.session_ttl, Some(Duration::from_secs(600)));
        assert_eq!(s.client_id, "bff");
        assert_eq!(s.gateway_config().client_secret, "secret");
    }

    #[test]
    fn explicit_names_win() {
        let s = settings(&[
            ("REDIS_URL", "redis://primary:6379/1"),
            ("REDIS_HOST", "ignored"),
            ("SESSION_TTL_SECONDS", "120"),
            ("REDIS_TTL_MILLISECONDS", "999999"),
            ("OUTBOUND_TIMEOUT_SECONDS", "3"),
        ])
        .unwrap();

        assert_eq!(s.redis_url.as_deref(), Some("redis://primary:6379/1"));
        assert_eq!(s.session_ttl, Some(Duration::from_secs(120)));
        assert_eq!(s.gateway_config().outbound_timeout, Duration::from_secs(3));
    }

    #[test]
    fn rejects_garbage() {
        assert!(settings(&[("BIND_ADDR", "nowhere")]).is_err());
        assert!(settings(&[("SESSION_TTL_SECONDS", "soon")]).is_err());
    }
}
