use crate::config::DatabaseConfig;
use crate::error::PortalError;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

pub fn create_conn(config: &DatabaseConfig) -> Result<DbPool, diesel::r2d2::PoolError> {
    let manager = ConnectionManager::<PgConnection>::new(&config.url);
    Pool::builder()
        .max_size(config.max_connections)
        .build(manager)
}

/// Run database migrations
pub fn run_migrations(pool: &DbPool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

    const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

    let mut conn = pool.get()?;
    conn.run_pending_migrations(MIGRATIONS).map_err(
        |e| -> Box<dyn std::error::Error + Send + Sync> {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Migration error: {}", e),
            ))
        },
    )?;
    Ok(())
}

/// Run blocking diesel work on the worker pool. Each call checks a
/// connection out for the duration of the closure only.
pub async fn run_db<T, F>(pool: &DbPool, work: F) -> Result<T, PortalError>
where
    F: FnOnce(&mut PgConnection) -> Result<T, PortalError> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| PortalError::upstream("The request could not be completed.", e))?;
        work(&mut conn)
    })
    .await
    .map_err(|e| PortalError::upstream("The request could not be completed.", e))?
}

pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();

    if email.is_empty() || email.len() > 254 {
        return false;
    }

    let at_pos = match email.find('@') {
        Some(pos) => pos,
        None => return false,
    };

    let local = &email[..at_pos];
    let domain = &email[at_pos + 1..];

    if local.is_empty() || local.len() > 64 {
        return false;
    }

    if domain.is_empty() || !domain.contains('.') {
        return false;
    }

    let domain_parts: Vec<&str> = domain.split('.').collect();
    if domain_parts.iter().any(|p| p.is_empty()) {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("client@example.com"));
        assert!(is_valid_email("first.last@agency.co.uk"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@nodot"));
        assert!(!is_valid_email("user@double..dot"));
    }
}
