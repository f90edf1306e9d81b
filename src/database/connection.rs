use crate::config::DatabaseConfig;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use tracing::info;

/// Schemas left out of [`DatabaseConnection::list_tables`]
const SYSTEM_SCHEMAS: [&str; 2] = ["pg_catalog", "information_schema"];

pub struct DatabaseConnection {
    pool: PgPool,
}

impl DatabaseConnection {
    /// Connect a pool sized and timed out per the configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool)
            .acquire_timeout(config.acquire_timeout())
            .connect(&config.database_url())
            .await?;

        info!(
            "Database pool initialized: {} max connections, {}s acquire timeout",
            config.pool, config.acquire_timeout_seconds
        );

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 as health")
            .fetch_one(&self.pool)
            .await?;

        let health: i32 = row.get("health");
        Ok(health == 1)
    }

    /// User tables visible to the connection, as `schema.table`, sorted
    pub async fn list_tables(&self) -> Result<Vec<String>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT table_schema::text AS table_schema, table_name::text AS table_name \
             FROM information_schema.tables \
             WHERE table_type = 'BASE TABLE' \
               AND table_schema::text <> ALL($1) \
               AND table_schema NOT LIKE 'pg_toast%' \
             ORDER BY table_schema, table_name",
        )
        .bind(&SYSTEM_SCHEMAS[..])
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let schema: String = row.try_get("table_schema")?;
                let table: String = row.try_get("table_name")?;
                Ok(format!("{schema}.{table}"))
            })
            .collect()
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::get_test_database_url;

    #[sqlx::test(migrations = false)]
    #[ignore = "requires a PostgreSQL database"]
    async fn test_health_check_and_table_listing(pool: PgPool) -> sqlx::Result<()> {
        sqlx::query("CREATE TABLE visits (id BIGINT)")
            .execute(&pool)
            .await?;

        let db = DatabaseConnection::from_pool(pool);
        assert!(db.health_check().await?);

        let tables = db.list_tables().await?;
        assert!(tables.contains(&"public.visits".to_string()));
        assert!(tables.iter().all(|t| !t.starts_with("pg_catalog.")));
        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database"]
    async fn test_connect_from_config() {
        let config = DatabaseConfig {
            url: Some(get_test_database_url()),
            ..DatabaseConfig::default()
        };
        let db = DatabaseConnection::connect(&config).await.unwrap();
        assert!(db.health_check().await.unwrap());
        db.close().await;
    }
}
