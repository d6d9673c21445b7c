//! Process configuration read from the environment.

use std::net::SocketAddr;

use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_SESSION_TTL_HOURS: i64 = 24 * 7;
const DEFAULT_SESSION_COOKIE: &str = "session_token";
const DEFAULT_ADMIN_EMAIL: &str = "admin@scholar.local";
const DEFAULT_ADMIN_PASSWORD: &str = "change-me-please";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is not valid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Credentials for the bootstrap administrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSeed {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub bind_addr: SocketAddr,
    pub session_ttl: chrono::Duration,
    pub session_cookie: String,
    pub seed_on_start: bool,
    pub admin: AdminSeed,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL");
        if database_url.is_none() {
            tracing::warn!("DATABASE_URL not set; using the in-memory store (data is lost on exit)");
        }

        let bind_addr = get("SCHOLAR_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                name: "SCHOLAR_BIND_ADDR",
                reason: e.to_string(),
            })?;

        let ttl_hours = match get("SCHOLAR_SESSION_TTL_HOURS") {
            Some(raw) => raw.trim().parse::<i64>().map_err(|e| ConfigError::Invalid {
                name: "SCHOLAR_SESSION_TTL_HOURS",
                reason: e.to_string(),
            })?,
            None => DEFAULT_SESSION_TTL_HOURS,
        };
        if ttl_hours <= 0 {
            return Err(ConfigError::Invalid {
                name: "SCHOLAR_SESSION_TTL_HOURS",
                reason: "must be positive".into(),
            });
        }

        let session_cookie =
            get("SCHOLAR_SESSION_COOKIE").unwrap_or_else(|| DEFAULT_SESSION_COOKIE.to_string());

        let seed_on_start = match get("SCHOLAR_SEED").as_deref().map(str::trim) {
            None | Some("0") | Some("false") => false,
            Some("1") | Some("true") => true,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "SCHOLAR_SEED",
                    reason: format!("expected 0/1/true/false, got '{other}'"),
                });
            }
        };

        let admin_password = get("SCHOLAR_ADMIN_PASSWORD").unwrap_or_else(|| {
            if seed_on_start {
                tracing::warn!("SCHOLAR_ADMIN_PASSWORD not set; using insecure dev default");
            }
            DEFAULT_ADMIN_PASSWORD.to_string()
        });

        Ok(Self {
            database_url,
            bind_addr,
            session_ttl: chrono::Duration::hours(ttl_hours),
            session_cookie,
            seed_on_start,
            admin: AdminSeed {
                name: "Administrator".to_string(),
                email: get("SCHOLAR_ADMIN_EMAIL").unwrap_or_else(|| DEFAULT_ADMIN_EMAIL.to_string()),
                password: admin_password,
            },
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            session_ttl: chrono::Duration::hours(DEFAULT_SESSION_TTL_HOURS),
            session_cookie: DEFAULT_SESSION_COOKIE.to_string(),
            seed_on_start: false,
            admin: AdminSeed {
                name: "Administrator".to_string(),
                email: DEFAULT_ADMIN_EMAIL.to_string(),
                password: DEFAULT_ADMIN_PASSWORD.to_string(),
            },
        }
    }
}
