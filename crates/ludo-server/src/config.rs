use std::time::Duration;

use serde::Deserialize;

use ludo_core::scoring::DEFAULT_COMBO_WINDOW;

/// Top-level server configuration, loaded from `ludo.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Allowed CORS origin for the HTTP surface. `*` allows any.
    pub cors_origin: String,
    pub auth: AuthFileConfig,
    pub scoring: ScoringConfig,
    pub limits: LimitsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3001".to_string(),
            cors_origin: "*".to_string(),
            auth: AuthFileConfig::default(),
            scoring: ScoringConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

/// Infrastructure limits (connection caps, buffer sizes, rate limits).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_ws_connections: usize,
    /// Sustained events per second a single connection may send.
    pub ws_rate_limit_per_sec: f64,
    /// Events a connection may send back to back before the sustained rate
    /// applies.
    pub ws_rate_burst: u32,
    pub player_message_buffer: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_ws_connections: 500,
            ws_rate_limit_per_sec: 20.0,
            ws_rate_burst: 40,
            player_message_buffer: 256,
        }
    }
}

/// Scoring rules that are tunable per deployment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Maximum gap between two captures by the same player for the second
    /// to count toward a combo.
    pub combo_window_ms: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            combo_window_ms: DEFAULT_COMBO_WINDOW.as_millis() as u64,
        }
    }
}

impl ScoringConfig {
    pub fn combo_window(&self) -> Duration {
        Duration::from_millis(self.combo_window_ms)
    }
}

/// Auth section of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthFileConfig {
    pub bearer_token: Option<String>,
}

impl ServerConfig {
    /// Validate configuration, logging warnings for issues.
    pub fn validate(&self) {
        if let Err(problem) = self.check() {
            tracing::error!("{problem}");
            std::process::exit(1);
        }

        if self.auth.bearer_token.is_some() {
            tracing::warn!(
                "bearer_token is set in config file, prefer LUDO_API_TOKEN env var in production"
            );
        }
        if self.auth.bearer_token.is_none() {
            tracing::warn!("No API bearer token configured, admin endpoints are open");
        }
    }

    /// The fatal checks behind `validate`, returned instead of exiting.
    pub fn check(&self) -> Result<(), String> {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "listen_addr is not a valid socket address: {}",
                self.listen_addr
            ));
        }
        if self.cors_origin != "*"
            && axum::http::HeaderValue::from_str(&self.cors_origin).is_err()
        {
            return Err(format!("cors_origin is not a valid origin: {}", self.cors_origin));
        }
        if self.scoring.combo_window_ms == 0 {
            return Err("scoring.combo_window_ms must be > 0".to_string());
        }
        if self.limits.max_ws_connections == 0 {
            return Err("limits.max_ws_connections must be > 0".to_string());
        }
        if self.limits.ws_rate_limit_per_sec <= 0.0 {
            return Err("limits.ws_rate_limit_per_sec must be > 0".to_string());
        }
        if self.limits.ws_rate_burst == 0 {
            return Err("limits.ws_rate_burst must be > 0".to_string());
        }
        if self.limits.player_message_buffer == 0 {
            return Err("limits.player_message_buffer must be > 0".to_string());
        }
        Ok(())
    }

    /// Load config from `ludo.toml` if it exists, then apply env var overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string("ludo.toml") {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from ludo.toml");
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse ludo.toml: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => {
                tracing::info!("No ludo.toml found, using defaults");
                ServerConfig::default()
            },
        };

        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Environment variable overrides. `lookup` is `std::env::var` outside tests.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("LUDO_LISTEN_ADDR")
            && !addr.is_empty()
        {
            self.listen_addr = addr;
        }
        if let Some(origin) = lookup("LUDO_CORS_ORIGIN")
            && !origin.is_empty()
        {
            self.cors_origin = origin;
        }
        if let Some(token) = lookup("LUDO_API_TOKEN")
            && !token.is_empty()
        {
            self.auth.bearer_token = Some(token);
        }
        if let Some(val) = lookup("LUDO_SCORE_COMBO_WINDOW_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            self.scoring.combo_window_ms = ms;
        }
        if let Some(val) = lookup("LUDO_MAX_WS_CONNECTIONS")
            && let Ok(n) = val.parse::<usize>()
        {
            self.limits.max_ws_connections = n;
        }
        if let Some(val) = lookup("LUDO_WS_RATE_LIMIT")
            && let Ok(n) = val.parse::<f64>()
        {
            self.limits.ws_rate_limit_per_sec = n;
        }
        if let Some(val) = lookup("LUDO_WS_RATE_BURST")
            && let Ok(n) = val.parse::<u32>()
        {
            self.limits.ws_rate_burst = n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_values() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.listen_addr, "0.0.0.0:3001");
        assert_eq!(cfg.cors_origin, "*");
        assert!(cfg.auth.bearer_token.is_none());
        assert_eq!(cfg.scoring.combo_window(), Duration::from_secs(10));
        assert!(cfg.check().is_ok());
    }

    #[test]
    fn parse_full_toml() {
        let toml_str = r#"
listen_addr = "127.0.0.1:9090"
cors_origin = "https://ludo.example.com"

[auth]
bearer_token = "secret123"

[scoring]
combo_window_ms = 2500

[limits]
max_ws_connections = 50
ws_rate_limit_per_sec = 5.0
ws_rate_burst = 10
player_message_buffer = 32
"#;
        let cfg: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.listen_addr, "127.0.0.1:9090");
        assert_eq!(cfg.cors_origin, "https://ludo.example.com");
        assert_eq!(cfg.auth.bearer_token.as_deref(), Some("secret123"));
        assert_eq!(cfg.scoring.combo_window(), Duration::from_millis(2500));
        assert_eq!(cfg.limits.max_ws_connections, 50);
        assert!((cfg.limits.ws_rate_limit_per_sec - 5.0).abs() < f64::EPSILON);
        assert_eq!(cfg.limits.ws_rate_burst, 10);
        assert_eq!(cfg.limits.player_message_buffer, 32);
        assert!(cfg.check().is_ok());
    }

    #[test]
    fn missing_sections_use_defaults() {
        let cfg: ServerConfig = toml::from_str("listen_addr = \"0.0.0.0:8080\"").unwrap();
        assert_eq!(cfg.limits.max_ws_connections, 500);
        assert_eq!(cfg.scoring.combo_window_ms, 10_000);
    }

    #[test]
    fn check_rejects_bad_values() {
        let bad_addr = ServerConfig {
            listen_addr: "not-an-address".to_string(),
            ..ServerConfig::default()
        };
        assert!(bad_addr.check().is_err());

        let mut zero_window = ServerConfig::default();
        zero_window.scoring.combo_window_ms = 0;
        assert!(zero_window.check().is_err());

        let mut zero_rate = ServerConfig::default();
        zero_rate.limits.ws_rate_limit_per_sec = 0.0;
        assert!(zero_rate.check().is_err());

        let mut zero_burst = ServerConfig::default();
        zero_burst.limits.ws_rate_burst = 0;
        assert!(zero_burst.check().is_err());

        let bad_origin = ServerConfig {
            cors_origin: "bad\norigin".to_string(),
            ..ServerConfig::default()
        };
        assert!(bad_origin.check().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("LUDO_LISTEN_ADDR", "127.0.0.1:4000"),
            ("LUDO_API_TOKEN", "tok"),
            ("LUDO_SCORE_COMBO_WINDOW_MS", "500"),
            ("LUDO_MAX_WS_CONNECTIONS", "7"),
            ("LUDO_WS_RATE_LIMIT", "not-a-number"),
            ("LUDO_WS_RATE_BURST", "3"),
        ]);
        let mut cfg = ServerConfig::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.listen_addr, "127.0.0.1:4000");
        assert_eq!(cfg.auth.bearer_token.as_deref(), Some("tok"));
        assert_eq!(cfg.scoring.combo_window_ms, 500);
        assert_eq!(cfg.limits.max_ws_connections, 7);
        assert_eq!(cfg.limits.ws_rate_burst, 3);
        // Unparseable values leave the previous setting alone.
        assert!((cfg.limits.ws_rate_limit_per_sec - 20.0).abs() < f64::EPSILON);
    }
}
