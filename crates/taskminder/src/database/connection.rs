/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Connection pool management for the SQLite task store.
//!
//! Accepted URLs are plain file paths, `sqlite://` prefixed paths, `file:`
//! URIs and `:memory:`. Note that every pooled connection to `:memory:`
//! opens its own empty database, so in-memory use needs a pool size of 1.

use crate::error::DatabaseError;
use deadpool_diesel::sqlite::{Manager, Pool, Runtime};
use diesel::prelude::*;
use diesel_migrations::MigrationHarness;
use tracing::info;

/// Pooled SQLite database.
#[derive(Clone)]
pub struct Database {
    pool: Pool,
    url: String,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("url", &self.url)
            .field("max_size", &self.pool.status().max_size)
            .finish()
    }
}

impl Database {
    /// Creates a pool for `url` with at most `pool_size` connections.
    pub fn new(url: &str, pool_size: u32) -> Result<Self, DatabaseError> {
        let connection_url = Self::build_sqlite_url(url);
        let manager = Manager::new(connection_url.clone(), Runtime::Tokio1);
        let pool = Pool::builder(manager)
            .max_size(pool_size.max(1) as usize)
            .build()
            .map_err(|e| DatabaseError::Pool(e.to_string()))?;

        info!(
            "SQLite connection pool initialized for {} (size {})",
            connection_url,
            pool_size.max(1)
        );

        Ok(Self {
            pool,
            url: connection_url,
        })
    }

    /// Opens the pool and applies pending migrations.
    pub async fn connect(url: &str, pool_size: u32) -> Result<Self, DatabaseError> {
        let database = Self::new(url, pool_size)?;
        database.run_migrations().await?;
        Ok(database)
    }

    fn build_sqlite_url(connection_string: &str) -> String {
        match connection_string.strip_prefix("sqlite://") {
            Some(path) => path.to_string(),
            None => connection_string.to_string(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Applies WAL mode and a busy timeout, then runs pending migrations.
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        conn.interact(|conn| -> Result<(), String> {
            diesel::sql_query("PRAGMA journal_mode=WAL;")
                .execute(conn)
                .map_err(|e| format!("Failed to set WAL mode: {}", e))?;
            diesel::sql_query("PRAGMA busy_timeout=30000;")
                .execute(conn)
                .map_err(|e| format!("Failed to set busy_timeout: {}", e))?;
            conn.run_pending_migrations(super::SQLITE_MIGRATIONS)
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?
        .map_err(DatabaseError::Migration)
    }

    /// Gets a pooled connection.
    pub async fn get_connection(
        &self,
    ) -> Result<deadpool::managed::Object<Manager>, deadpool::managed::PoolError<deadpool_diesel::Error>>
    {
        self.pool.get().await
    }
}
