//! Service Configuration
//!
//! Every option can be given as a flag or through the environment (a `.env`
//! file is loaded before parsing).

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

use crate::middleware::RateLimitConfig;

#[derive(Parser, Debug, Clone)]
#[command(name = "people-service")]
#[command(about = "User identity service: accounts, credentials, bearer tokens and roles")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: SocketAddr,

    /// SQLite database file
    #[arg(long, env = "AUTH_DB_PATH", default_value = "people.db")]
    pub db_path: String,

    /// HMAC secret for signing tokens. A random one is generated when unset.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Token lifetime in hours
    #[arg(long, env = "TOKEN_TTL_HOURS", default_value_t = 8)]
    pub token_ttl_hours: i64,

    /// Grace period past expiry, in seconds, for clock skew
    #[arg(long, env = "TOKEN_LEEWAY_SECS", default_value_t = 0)]
    pub token_leeway_secs: i64,

    /// bcrypt work factor (4..=31)
    #[arg(long, env = "BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST)]
    pub bcrypt_cost: u32,

    /// Role given to self-registered users
    #[arg(long, env = "DEFAULT_ROLE", default_value = "basic")]
    pub default_role: String,

    /// Administrator created at startup if no user has this email
    #[arg(long, env = "BOOTSTRAP_ADMIN_EMAIL")]
    pub bootstrap_admin_email: Option<String>,

    #[arg(long, env = "BOOTSTRAP_ADMIN_USERNAME", default_value = "admin")]
    pub bootstrap_admin_username: String,

    #[arg(long, env = "BOOTSTRAP_ADMIN_PASSWORD", hide_env_values = true)]
    pub bootstrap_admin_password: Option<String>,

    /// Login attempts allowed per client IP per minute
    #[arg(long, env = "LOGIN_RATE_LIMIT", default_value_t = 20)]
    pub login_rate_limit: u32,

    /// Extra login attempts tolerated above the limit
    #[arg(long, env = "LOGIN_RATE_BURST", default_value_t = 5)]
    pub login_rate_burst: u32,
}

impl Config {
    pub fn login_rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.login_rate_limit,
            window: Duration::from_secs(60),
            burst: self.login_rate_burst,
        }
    }

    /// Email, username and password, when both email and password are set
    pub fn bootstrap_admin(&self) -> Option<(&str, &str, &str)> {
        match (&self.bootstrap_admin_email, &self.bootstrap_admin_password) {
            (Some(email), Some(password)) => Some((
                email.as_str(),
                self.bootstrap_admin_username.as_str(),
                password.as_str(),
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["people-service"]).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.token_ttl_hours, 8);
        assert_eq!(config.token_leeway_secs, 0);
        assert_eq!(config.default_role, "basic");
        assert!(config.bootstrap_admin().is_none());
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = Config::try_parse_from([
            "people-service",
            "--token-ttl-hours",
            "2",
            "--bcrypt-cost",
            "4",
            "--bootstrap-admin-email",
            "root@example.com",
            "--bootstrap-admin-password",
            "Sup3rSecret",
            "--login-rate-limit",
            "3",
        ])
        .unwrap();

        assert_eq!(config.token_ttl_hours, 2);
        assert_eq!(config.bcrypt_cost, 4);
        assert_eq!(
            config.bootstrap_admin(),
            Some(("root@example.com", "admin", "Sup3rSecret"))
        );

        let limit = config.login_rate_limit();
        assert_eq!(limit.max_requests, 3);
        assert_eq!(limit.burst, 5);
        assert_eq!(limit.window, Duration::from_secs(60));
    }
}
