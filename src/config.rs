use anyhow::{Context, Result};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub email: EmailConfig,
    pub auth: AuthConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"[REDACTED]")
            .finish()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?;

        let port = env_or("SERVER_PORT", "8080")
            .parse::<u16>()
            .context("SERVER_PORT is not a valid port")?;
        let smtp_port = env_or("SMTP_PORT", "25")
            .parse::<u16>()
            .context("SMTP_PORT is not a valid port")?;

        Ok(Self {
            server: ServerConfig {
                host: env_or("SERVER_HOST", "0.0.0.0"),
                port,
            },
            database: DatabaseConfig { url: database_url },
            email: EmailConfig {
                smtp_host: env_or("SMTP_HOST", "localhost"),
                smtp_port,
                username: std::env::var("SMTP_USER").ok(),
                password: std::env::var("SMTP_PASS").ok(),
                from: env_or("SMTP_FROM", "noreply@taskserver.local"),
            },
            auth: AuthConfig { jwt_secret },
        })
    }
}
