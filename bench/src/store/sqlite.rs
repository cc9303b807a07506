//! Embedded SQLite backend.
//!
//! Holds both schemas in one in-memory (or file) database. There is no hash
//! partitioning here, but the per-column and partial indexes mirror the
//! PostgreSQL layout closely enough for the harness to exercise every code
//! path without a server.

use super::{Dialect, Session, Store};
use crate::error::StoreError;
use crate::fixture::UserProfile;
use crate::scenario::validate_identifier;
use async_trait::async_trait;
use audience_core::config::SchemaNames;
use rusqlite::{params, Connection};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Wrap an already prepared connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Open an in-memory database, create both schemas and load `users`
    /// into each of them.
    pub fn with_fixture(names: &SchemaNames, users: &[UserProfile]) -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory()?;
        configure_connection(&conn)?;
        create_tables(&conn, names)?;
        populate(&mut conn, names, users)?;
        Ok(Self::from_connection(conn))
    }
}

/// Configure a connection for in-memory read performance.
pub fn configure_connection(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "PRAGMA synchronous = OFF;
         PRAGMA cache_size = -131072;
         PRAGMA temp_store = MEMORY;",
    )?;
    Ok(())
}

/// Create the EAV pair and the denormalized table with their indexes.
pub fn create_tables(conn: &Connection, names: &SchemaNames) -> Result<(), StoreError> {
    let users = unqualified(&names.users)?;
    let attributes = unqualified(&names.attributes)?;
    let profiles = unqualified(&names.profiles)?;

    conn.execute_batch(&format!(
        "CREATE TABLE {users} (
             user_id    INTEGER PRIMARY KEY,
             created_at INTEGER NOT NULL
         );
         CREATE TABLE {attributes} (
             user_id INTEGER NOT NULL REFERENCES {users}(user_id),
             key     TEXT NOT NULL,
             value   TEXT NOT NULL
         );
         CREATE INDEX idx_{a}_user_key ON {attributes}(user_id, key);
         CREATE INDEX idx_{a}_key_value ON {attributes}(key, value);

         CREATE TABLE {profiles} (
             user_id       INTEGER PRIMARY KEY,
             country       TEXT NOT NULL,
             tier          TEXT NOT NULL,
             has_purchased INTEGER NOT NULL,
             total_spend   REAL NOT NULL,
             signup_at     INTEGER NOT NULL
         );
         CREATE INDEX idx_{p}_country ON {profiles}(country);
         CREATE INDEX idx_{p}_tier ON {profiles}(tier);
         CREATE INDEX idx_{p}_signup ON {profiles}(signup_at);
         CREATE INDEX idx_{p}_spend_purchased ON {profiles}(total_spend)
             WHERE has_purchased = 1;",
        a = attributes,
        p = profiles,
    ))?;
    Ok(())
}

/// SQLite qualifies the index name rather than the table in `CREATE INDEX`,
/// so the fixture only accepts bare table names.
fn unqualified(name: &str) -> Result<&str, StoreError> {
    let name = validate_identifier(name)?;
    if name.contains('.') {
        return Err(StoreError::InvalidIdentifier(name.to_string()));
    }
    Ok(name)
}

/// Bulk-insert the same users into both schemas in one transaction.
pub fn populate(
    conn: &mut Connection,
    names: &SchemaNames,
    users: &[UserProfile],
) -> Result<(), StoreError> {
    let users_table = validate_identifier(&names.users)?;
    let attributes = validate_identifier(&names.attributes)?;
    let profiles = validate_identifier(&names.profiles)?;

    let tx = conn.transaction()?;
    {
        let mut user_stmt = tx.prepare(&format!(
            "INSERT INTO {users_table} (user_id, created_at) VALUES (?1, ?2)"
        ))?;
        let mut attr_stmt = tx.prepare(&format!(
            "INSERT INTO {attributes} (user_id, key, value) VALUES (?1, ?2, ?3)"
        ))?;
        let mut profile_stmt = tx.prepare(&format!(
            "INSERT INTO {profiles} (
                 user_id, country, tier, has_purchased, total_spend, signup_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
        ))?;

        for user in users {
            user_stmt.execute(params![user.id, user.signup_at])?;
            for (key, value) in user.attribute_rows() {
                attr_stmt.execute(params![user.id, key, value])?;
            }
            profile_stmt.execute(params![
                user.id,
                user.country,
                user.tier,
                user.has_purchased,
                user.total_spend(),
                user.signup_at,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    async fn session(&self) -> Result<Box<dyn Session>, StoreError> {
        let conn = self.conn.clone().lock_owned().await;
        Ok(Box::new(SqliteSession { conn }))
    }
}

/// Exclusive use of the shared connection for the lifetime of the session.
/// Queries run inline on the calling task.
struct SqliteSession {
    conn: OwnedMutexGuard<Connection>,
}

#[async_trait]
impl Session for SqliteSession {
    async fn query_count(&mut self, sql: &str) -> Result<i64, StoreError> {
        Ok(self.conn.query_row(sql, [], |row| row.get::<_, i64>(0))?)
    }

    async fn query_plan(&mut self, explain_sql: &str) -> Result<Vec<String>, StoreError> {
        // EXPLAIN QUERY PLAN rows: (id, parent, notused, detail). Nesting is
        // shown by indenting each step under its parent.
        let mut stmt = self.conn.prepare(explain_sql)?;
        let steps = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut depth_of: Vec<(i64, usize)> = Vec::with_capacity(steps.len());
        let mut lines = Vec::with_capacity(steps.len());
        for (id, parent, detail) in steps {
            let depth = depth_of
                .iter()
                .find(|(step, _)| *step == parent)
                .map(|(_, d)| d + 1)
                .unwrap_or(0);
            depth_of.push((id, depth));
            lines.push(format!("{}{}", "  ".repeat(depth), detail));
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{generate_users, FixtureParams};

    fn store(users: usize) -> SqliteStore {
        let users = generate_users(&FixtureParams::with_users(users));
        SqliteStore::with_fixture(&SchemaNames::default(), &users).unwrap()
    }

    #[tokio::test]
    async fn both_schemas_hold_every_user() {
        let store = store(50);
        let mut session = store.session().await.unwrap();
        assert_eq!(session.query_count("SELECT COUNT(*) FROM users").await.unwrap(), 50);
        assert_eq!(
            session
                .query_count("SELECT COUNT(*) FROM user_profiles")
                .await
                .unwrap(),
            50
        );
        assert_eq!(
            session
                .query_count("SELECT COUNT(DISTINCT user_id) FROM user_attributes")
                .await
                .unwrap(),
            50
        );
    }

    #[tokio::test]
    async fn ping_succeeds_on_open_database() {
        store(1).ping().await.unwrap();
    }

    #[tokio::test]
    async fn plan_lines_are_produced() {
        let store = store(10);
        let mut session = store.session().await.unwrap();
        let lines = session
            .query_plan(&Dialect::Sqlite.explain(
                "SELECT COUNT(*) FROM user_profiles WHERE country = 'US'",
            ))
            .await
            .unwrap();
        assert!(!lines.is_empty());
    }

    #[tokio::test]
    async fn bad_sql_is_an_error() {
        let store = store(1);
        let mut session = store.session().await.unwrap();
        assert!(matches!(
            session.query_count("SELECT COUNT(*) FROM missing").await,
            Err(StoreError::Sqlite(_))
        ));
    }

    #[test]
    fn hostile_table_name_is_rejected() {
        let names = SchemaNames {
            users: "users; DROP TABLE users".to_string(),
            ..SchemaNames::default()
        };
        assert!(matches!(
            SqliteStore::with_fixture(&names, &[]),
            Err(StoreError::InvalidIdentifier(_))
        ));
    }
}
