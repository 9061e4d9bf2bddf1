use std::env;

use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub jwt_secret: String,
    pub admin_email: String,
    pub cors_origin: String,
}

impl Config {
    pub fn load() -> Self {
        Self {
            database_url: var_or("DATABASE_URL", "myvote.db"),
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:8080"),
            jwt_secret: var_or("JWT_SECRET", "dev-secret-change-me"),
            admin_email: var_or("ADMIN_EMAIL", ""),
            cors_origin: var_or("CORS_ORIGIN", "http://localhost:3000"),
        }
    }

    /// The admin is whoever signs in with `ADMIN_EMAIL`. An empty value disables admin access.
    pub fn is_admin_email(&self, email: &str) -> bool {
        !self.admin_email.is_empty() && self.admin_email.eq_ignore_ascii_case(email.trim())
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        warn!("{key} not set, using default: {default:?}");
        default.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(admin: &str) -> Config {
        Config {
            database_url: ":memory:".into(),
            bind_addr: "127.0.0.1:0".into(),
            jwt_secret: "secret".into(),
            admin_email: admin.into(),
            cors_origin: "http://localhost:3000".into(),
        }
    }

    #[test]
    fn admin_email_is_case_insensitive() {
        let cfg = config("Admin@MyVote.dev");
        assert!(cfg.is_admin_email("admin@myvote.dev"));
        assert!(!cfg.is_admin_email("someone@myvote.dev"));
    }

    #[test]
    fn empty_admin_email_matches_nobody() {
        let cfg = config("");
        assert!(!cfg.is_admin_email(""));
        assert!(!cfg.is_admin_email("admin@myvote.dev"));
    }
}
