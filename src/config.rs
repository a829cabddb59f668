//! Environment-sourced application configuration.
//!
//! Follows the teacher's `SaasConfig::from_env` shape (`src/saas_app.rs`):
//! one struct, one fallible constructor, sane defaults for everything that
//! isn't a secret.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub app_base_url: String,
    /// Design Note §9: a single flag, consulted only in `billing::plan`.
    pub billing_enabled: bool,
    pub payments_webhook_secret: String,
    pub identity_webhook_secret: String,
    pub signed_url_secret: String,
    pub access_token_secret: String,
    pub domain_cache_ttl: Duration,
    pub region: String,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let ttl_secs: u64 = env_or("DOMAIN_CACHE_TTL_SECS", "600").parse()?;
        let ttl_secs = ttl_secs.clamp(300, 900);

        Ok(Self {
            host: env_or("HOST", "0.0.0.0"),
            port: env_or("PORT", "8080").parse()?,
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            app_base_url: env_or("APP_BASE_URL", "http://localhost:8080"),
            billing_enabled: env_or("BILLING_ENABLED", "true").parse().unwrap_or(true),
            payments_webhook_secret: require_env("PAYMENTS_WEBHOOK_SECRET")?,
            identity_webhook_secret: require_env("IDENTITY_WEBHOOK_SECRET")?,
            signed_url_secret: require_env("SIGNED_URL_SECRET")?,
            access_token_secret: require_env("ACCESS_TOKEN_SECRET")?,
            domain_cache_ttl: Duration::from_secs(ttl_secs),
            region: env_or("REGION", "local"),
            request_timeout: Duration::from_secs(
                env_or("REQUEST_TIMEOUT_SECS", "10").parse().unwrap_or(10),
            ),
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The set of hostnames admitted as "main-domain" requests (§4.8 rule 2).
    pub fn static_host_allow_list(&self) -> Vec<String> {
        let mut hosts = vec!["localhost".to_string(), "testserver".to_string()];
        if let Ok(parsed) = url::Url::parse(&self.app_base_url) {
            if let Some(host) = parsed.host_str() {
                hosts.push(host.to_string());
            }
        }
        hosts
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn require_env(key: &str) -> anyhow::Result<String> {
    std::env::var(key).map_err(|_| anyhow::anyhow!("{key} must be set"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_address_combines_host_and_port() {
        let cfg = Config {
            host: "127.0.0.1".into(),
            port: 9090,
            database_url: String::new(),
            app_base_url: String::new(),
            billing_enabled: true,
            payments_webhook_secret: String::new(),
            identity_webhook_secret: String::new(),
            signed_url_secret: String::new(),
            access_token_secret: String::new(),
            domain_cache_ttl: Duration::from_secs(600),
            region: "local".into(),
            request_timeout: Duration::from_secs(10),
        };
        assert_eq!(cfg.server_address(), "127.0.0.1:9090");
    }
}
