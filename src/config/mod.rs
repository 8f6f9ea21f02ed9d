use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use std::env;

/// Process-wide configuration, loaded once in `main` and carried inside
/// `AppState`. Components never read the environment themselves.
#[derive(Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub vault: VaultConfig,
    pub site: SiteConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
}

#[derive(Clone)]
pub struct VaultConfig {
    pub passphrase: String,
}

#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub url: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("server", &self.server)
            .field("storage", &self.storage)
            .field("site", &self.site)
            .finish()
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let port = match env::var("PORT") {
            Ok(value) => value.parse().context("PORT must be a number")?,
            Err(_) => 8080,
        };

        let database = DatabaseConfig {
            url: env::var("DATABASE_URL").context("DATABASE_URL is required")?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        };

        let auth = AuthConfig {
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET is required")?,
        };

        let vault = VaultConfig {
            passphrase: env::var("SECRET_VAULT_PASSPHRASE")
                .context("SECRET_VAULT_PASSPHRASE is required")?,
        };
        if vault.passphrase.len() < 16 {
            bail!("SECRET_VAULT_PASSPHRASE must be at least 16 characters");
        }

        let storage = StorageConfig {
            bucket: env::var("STORAGE_BUCKET").unwrap_or_else(|_| "company-assets".to_string()),
            region: env::var("STORAGE_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            endpoint: env::var("STORAGE_ENDPOINT").ok(),
        };

        let site = SiteConfig {
            url: env::var("SITE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
        };

        Ok(Self {
            server: ServerConfig { port },
            database,
            auth,
            storage,
            vault,
            site,
        })
    }
}
