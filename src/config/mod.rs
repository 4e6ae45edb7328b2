use anyhow::Result;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub drive: DriveConfig,
    pub auth: AuthConfig,
    pub portal: PortalConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub username: String,
    pub password: String,
    pub server: String,
    pub port: u32,
    pub database: String,
}

#[derive(Clone, Debug)]
pub struct DriveConfig {
    pub server: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub use_ssl: bool,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub session_cookie: String,
    pub token_ttl_hours: i64,
}

#[derive(Clone, Debug)]
pub struct PortalConfig {
    /// Static bearer token portal providers send on webhook deliveries.
    pub webhook_token: String,
    /// Country code assumed for phone numbers delivered without one.
    pub default_country_code: String,
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let server = ServerConfig {
            host: env_str("SERVER_HOST", "0.0.0.0"),
            port: env_str("SERVER_PORT", "8080").parse().unwrap_or(8080),
        };
        let database = DatabaseConfig {
            username: env_str("DB_USER", "estate"),
            password: env_str("DB_PASSWORD", ""),
            server: env_str("DB_HOST", "localhost"),
            port: env_str("DB_PORT", "5432").parse().unwrap_or(5432),
            database: env_str("DB_NAME", "estateserver"),
        };
        let drive = DriveConfig {
            server: env_str("DRIVE_SERVER", "http://localhost:9000"),
            access_key: env_str("DRIVE_ACCESS_KEY", ""),
            secret_key: env_str("DRIVE_SECRET_KEY", ""),
            bucket: env_str("DRIVE_BUCKET", "estate-documents"),
            use_ssl: env_str("DRIVE_USE_SSL", "false").to_lowercase() == "true",
        };
        let auth = AuthConfig {
            jwt_secret: env_str("JWT_SECRET", "change-me"),
            session_cookie: env_str("SESSION_COOKIE", "estate_session"),
            token_ttl_hours: env_str("TOKEN_TTL_HOURS", "12").parse().unwrap_or(12),
        };
        let portal = PortalConfig {
            webhook_token: env_str("PORTAL_WEBHOOK_TOKEN", ""),
            default_country_code: env_str("PORTAL_DEFAULT_COUNTRY_CODE", "55"),
        };
        Ok(Self {
            server,
            database,
            drive,
            auth,
            portal,
        })
    }

    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.database.username,
            self.database.password,
            self.database.server,
            self.database.port,
            self.database.database
        )
    }
}
