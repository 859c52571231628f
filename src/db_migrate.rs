use std::fs;
use std::path::{Path, PathBuf};
use scylla::client::session::Session;
use crate::error::{AppError, Result as AppResult};

/// Schema version this build expects.
pub const SCHEMA_VERSION: i32 = 1;

/// Applies the versioned CQL scripts under `schema_path`:
/// `<n>/init_schema.cql` on a fresh keyspace, `<n>/update_schema.cql` afterwards.
pub struct MigrationTool {
    keyspace: String,
    schema_path: PathBuf,
}

impl MigrationTool {
    pub fn new(keyspace: String, schema_path: PathBuf) -> Self {
        tracing::info!("Migration tool ks:{}", keyspace);
        Self {
            keyspace,
            schema_path,
        }
    }

    async fn ensure_keyspace(&self, session: &Session, replication_factor: u32) -> AppResult<()> {
        let create_keyspace = format!(
            "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = \
             {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
            self.keyspace, replication_factor
        );
        session
            .query_unpaged(create_keyspace, &[])
            .await
            .map_err(|e| AppError::Internal(format!("Unable to create keyspace {}: {}", self.keyspace, e)))?;
        Ok(())
    }

    // Ensure `schema_version` table exists. If empty, assume version 0.
    async fn ensure_migration_table(&self, session: &Session) -> AppResult<()> {
        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS {}.schema_version (
                version int,
                applied_at timestamp,
                db int primary key
            )",
            self.keyspace
        );

        session
            .query_unpaged(create_table, &[])
            .await
            .map_err(|e| AppError::Internal(format!("Unable to create schema_version table: {}", e)))?;

        Ok(())
    }

    async fn get_current_version(&self, session: &Session) -> AppResult<i32> {
        let select = format!(
            "SELECT version FROM {}.schema_version WHERE db = 0",
            self.keyspace
        );

        let rows = session.query_unpaged(select, &[]).await?.into_rows_result()?;
        Ok(rows.maybe_first_row::<(i32,)>()?.map_or(0, |(version,)| version))
    }

    async fn set_version(&self, session: &Session, version: i32) -> AppResult<()> {
        let cql: String = format!(
            "INSERT INTO {}.schema_version (version, applied_at, db) VALUES (?, toTimestamp(now()), 0)",
            self.keyspace
        );
        session
            .query_unpaged(cql.clone(), (version,))
            .await
            .map_err(|e| AppError::Internal(format!("Failed to update schema_version cql:{} ({})", cql, e)))?;
        Ok(())
    }

    /// Splits a .cql file on `;` and executes every statement with `{}`
    /// replaced by the keyspace.
    async fn execute_cql_file(&self, session: &Session, file_path: &Path) -> AppResult<()> {
        let contents = fs::read_to_string(file_path)
            .map_err(|e| AppError::Internal(format!("Failed to read file {:?}: {}", file_path, e)))?;

        for stmt in split_statements(&contents, &self.keyspace) {
            tracing::debug!("cql update: {}", stmt);
            session
                .query_unpaged(stmt.clone(), &[])
                .await
                .map_err(|e| AppError::Internal(format!("Error executing CQL: {} ({})", stmt, e)))?;
        }

        Ok(())
    }

    fn available_versions(&self) -> AppResult<Vec<i32>> {
        let mut versions: Vec<i32> = fs::read_dir(&self.schema_path)
            .map_err(|e| AppError::Internal(format!("Unable to read cql schemas directory: {}", e)))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .filter_map(|path| path.file_name()?.to_string_lossy().parse::<i32>().ok())
            .collect();
        versions.sort_unstable();
        Ok(versions)
    }

    /// Migrate from the current version up to `target_version`.
    pub async fn migrate_to_version(
        &self,
        session: &Session,
        replication_factor: u32,
        target_version: i32,
    ) -> AppResult<()> {
        self.ensure_keyspace(session, replication_factor).await?;
        self.ensure_migration_table(session).await?;

        let mut current_version = self.get_current_version(session).await?;
        tracing::info!("Current DB version is: {}", current_version);

        for v in self.available_versions()? {
            if v <= current_version || v > target_version {
                continue;
            }
            let version_path = self.schema_path.join(v.to_string());
            let script = if current_version == 0 {
                version_path.join("init_schema.cql")
            } else {
                version_path.join("update_schema.cql")
            };

            if script.exists() {
                tracing::info!("Upgrading from {} to {} with {}", current_version, v, script.display());
                self.execute_cql_file(session, &script).await?;
            } else {
                tracing::warn!("No migration script {} - skipping.", script.display());
            }

            self.set_version(session, v).await?;
            current_version = v;
            tracing::info!("Database schema migrated to version {}", current_version);
        }

        if current_version < target_version {
            return Err(AppError::Internal(format!(
                "No migration scripts reach version {} (database is at {})",
                target_version, current_version
            )));
        }
        Ok(())
    }
}

fn split_statements(contents: &str, keyspace: &str) -> Vec<String> {
    contents
        .split(';')
        .map(|statement| statement.trim().replace("{}", keyspace))
        .filter(|statement| !statement.is_empty())
        .collect()
}
