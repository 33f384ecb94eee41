// Persistent storage behind an async trait. The SQLite implementation keeps
// the relational layout: one table per entity, child tables for scope
// targets, composite (customer_id, client_identifier, mitigation_id) keys.
//
// Absence is not an error: lookups return Ok(None). The repository also owns
// the per-mitigation locks that serialize cancel-then-create sequences on a
// single mitigation id.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::customer::{Customer, CustomerPolicy};
use crate::errors::{DotsError, Result};
use crate::mitigation_scope::{MitigationScope, PortRange, Prefix};
use crate::protection::Protection;
use crate::session_config::SignalSessionConfiguration;

#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_customer_by_common_name(&self, common_name: &str) -> Result<Option<Customer>>;

    async fn get_mitigation_scope(
        &self,
        customer_id: i64,
        client_identifier: &str,
        mitigation_id: i64,
    ) -> Result<Option<MitigationScope>>;

    async fn get_mitigation_ids(
        &self,
        customer_id: i64,
        client_identifier: &str,
    ) -> Result<Vec<i64>>;

    /// Persist a scope, replacing any previous row under the same
    /// (customer, client, mitigation-id) key.
    async fn create_mitigation_scope(&self, scope: &MitigationScope) -> Result<()>;

    async fn delete_mitigation_scope(
        &self,
        customer_id: i64,
        client_identifier: &str,
        mitigation_id: i64,
    ) -> Result<()>;

    /// Latest protection for the key that has not finished. Disabled but
    /// unfinished protections are still returned; callers inspect
    /// `is_enabled`.
    async fn get_active_protection_by_mitigation_id(
        &self,
        customer_id: i64,
        client_identifier: &str,
        mitigation_id: i64,
    ) -> Result<Option<Protection>>;

    /// Insert a protection row, returning its id.
    async fn create_protection(&self, protection: &Protection) -> Result<i64>;

    async fn update_protection(&self, protection: &Protection) -> Result<()>;

    async fn delete_protection(&self, protection_id: i64) -> Result<()>;

    async fn get_current_signal_session_configuration(
        &self,
        customer_id: i64,
    ) -> Result<Option<SignalSessionConfiguration>>;

    /// Replace the customer's current configuration atomically.
    async fn create_signal_session_configuration(
        &self,
        config: &SignalSessionConfiguration,
        customer_id: i64,
    ) -> Result<()>;

    async fn delete_signal_session_configuration_by_customer_id(
        &self,
        customer_id: i64,
    ) -> Result<()>;

    /// Lock serializing operations on one (customer, client, mitigation-id)
    /// key, so cancel-then-create reads as atomic to concurrent GETs.
    fn mitigation_lock(
        &self,
        customer_id: i64,
        client_identifier: &str,
        mitigation_id: i64,
    ) -> Arc<Mutex<()>>;
}

// =============================================================================
// SQLITE IMPLEMENTATION
// =============================================================================

type MitigationKey = (i64, String, i64);

pub struct SqliteRepository {
    conn: Mutex<Connection>,
    locks: std::sync::Mutex<HashMap<MitigationKey, Arc<Mutex<()>>>>,
}

impl SqliteRepository {
    /// Create or open the server database.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())?;
        info!("Opened server database: {:?}", db_path.as_ref());
        Self::with_connection(conn)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS customers (
                 id INTEGER PRIMARY KEY,
                 name TEXT NOT NULL,
                 common_name TEXT NOT NULL UNIQUE,
                 max_concurrent_mitigations INTEGER NOT NULL,
                 max_mitigation_lifetime INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS customer_prefixes (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 customer_id INTEGER NOT NULL,
                 prefix TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS customer_port_ranges (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 customer_id INTEGER NOT NULL,
                 lower_port INTEGER NOT NULL,
                 upper_port INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS customer_protocols (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 customer_id INTEGER NOT NULL,
                 protocol INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS customer_patterns (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 customer_id INTEGER NOT NULL,
                 kind TEXT NOT NULL,
                 pattern TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS mitigation_scopes (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 customer_id INTEGER NOT NULL,
                 client_identifier TEXT NOT NULL,
                 mitigation_id INTEGER NOT NULL,
                 lifetime INTEGER NOT NULL,
                 UNIQUE(customer_id, client_identifier, mitigation_id)
             );
             CREATE TABLE IF NOT EXISTS target_prefixes (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 scope_ref INTEGER NOT NULL,
                 prefix TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS target_port_ranges (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 scope_ref INTEGER NOT NULL,
                 lower_port INTEGER NOT NULL,
                 upper_port INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS target_protocols (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 scope_ref INTEGER NOT NULL,
                 protocol INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS target_names (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 scope_ref INTEGER NOT NULL,
                 kind TEXT NOT NULL,
                 name TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS protections (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 customer_id INTEGER NOT NULL,
                 client_identifier TEXT NOT NULL,
                 mitigation_id INTEGER NOT NULL,
                 blocker_id INTEGER NOT NULL,
                 is_enabled INTEGER NOT NULL,
                 started_at INTEGER,
                 finished_at INTEGER
             );
             CREATE INDEX IF NOT EXISTS idx_protections_key
                 ON protections(customer_id, client_identifier, mitigation_id);
             CREATE TABLE IF NOT EXISTS signal_session_configurations (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 customer_id INTEGER NOT NULL UNIQUE,
                 session_id INTEGER NOT NULL,
                 heartbeat_interval INTEGER NOT NULL,
                 missing_hb_allowed INTEGER NOT NULL,
                 max_retransmit INTEGER NOT NULL,
                 ack_timeout INTEGER NOT NULL,
                 ack_random_factor REAL NOT NULL,
                 trigger_mitigation INTEGER NOT NULL
             );",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            locks: std::sync::Mutex::new(HashMap::new()),
        })
    }

    /// Provision a customer and its policy. Boot-time/test helper; request
    /// handling only ever reads customers.
    pub async fn register_customer(&self, customer: &Customer) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR REPLACE INTO customers
                 (id, name, common_name, max_concurrent_mitigations, max_mitigation_lifetime)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                customer.id,
                customer.name,
                customer.common_name,
                customer.policy.max_concurrent_mitigations,
                customer.policy.max_mitigation_lifetime,
            ],
        )?;

        for table in [
            "customer_prefixes",
            "customer_port_ranges",
            "customer_protocols",
            "customer_patterns",
        ] {
            tx.execute(
                &format!("DELETE FROM {table} WHERE customer_id = ?1"),
                params![customer.id],
            )?;
        }

        for prefix in &customer.policy.allowed_prefixes {
            tx.execute(
                "INSERT INTO customer_prefixes (customer_id, prefix) VALUES (?1, ?2)",
                params![customer.id, prefix.to_string()],
            )?;
        }
        for range in &customer.policy.allowed_port_ranges {
            tx.execute(
                "INSERT INTO customer_port_ranges (customer_id, lower_port, upper_port)
                 VALUES (?1, ?2, ?3)",
                params![customer.id, range.lower, range.upper],
            )?;
        }
        for &protocol in &customer.policy.allowed_protocols {
            tx.execute(
                "INSERT INTO customer_protocols (customer_id, protocol) VALUES (?1, ?2)",
                params![customer.id, protocol],
            )?;
        }
        for (kind, patterns) in [
            ("fqdn", &customer.policy.allowed_fqdn_patterns),
            ("uri", &customer.policy.allowed_uri_patterns),
        ] {
            for pattern in patterns {
                tx.execute(
                    "INSERT INTO customer_patterns (customer_id, kind, pattern)
                     VALUES (?1, ?2, ?3)",
                    params![customer.id, kind, pattern],
                )?;
            }
        }
        for alias in &customer.policy.allowed_aliases {
            tx.execute(
                "INSERT INTO customer_patterns (customer_id, kind, pattern)
                 VALUES (?1, 'alias', ?2)",
                params![customer.id, alias],
            )?;
        }

        tx.commit()?;
        info!(customer_id = customer.id, common_name = customer.common_name.as_str(),
              "customer registered");
        Ok(())
    }

    fn parse_stored_prefix(text: &str) -> Result<Prefix> {
        Prefix::parse(text)
            .map_err(|_| DotsError::Internal(format!("corrupt prefix in storage: {text}")))
    }

    fn load_policy(conn: &Connection, customer_id: i64) -> Result<CustomerPolicy> {
        let (max_concurrent_mitigations, max_mitigation_lifetime) = conn.query_row(
            "SELECT max_concurrent_mitigations, max_mitigation_lifetime
             FROM customers WHERE id = ?1",
            params![customer_id],
            |row| Ok((row.get::<_, u32>(0)?, row.get::<_, i64>(1)?)),
        )?;

        let mut stmt =
            conn.prepare("SELECT prefix FROM customer_prefixes WHERE customer_id = ?1")?;
        let allowed_prefixes = stmt
            .query_map(params![customer_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .iter()
            .map(|text| Self::parse_stored_prefix(text))
            .collect::<Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
            "SELECT lower_port, upper_port FROM customer_port_ranges WHERE customer_id = ?1",
        )?;
        let allowed_port_ranges = stmt
            .query_map(params![customer_id], |row| {
                Ok(PortRange::new(row.get(0)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt =
            conn.prepare("SELECT protocol FROM customer_protocols WHERE customer_id = ?1")?;
        let allowed_protocols = stmt
            .query_map(params![customer_id], |row| row.get::<_, u8>(0))?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;

        let mut stmt = conn.prepare(
            "SELECT kind, pattern FROM customer_patterns WHERE customer_id = ?1",
        )?;
        let mut allowed_fqdn_patterns = Vec::new();
        let mut allowed_uri_patterns = Vec::new();
        let mut allowed_aliases = BTreeSet::new();
        for row in stmt.query_map(params![customer_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })? {
            let (kind, pattern) = row?;
            match kind.as_str() {
                "fqdn" => allowed_fqdn_patterns.push(pattern),
                "uri" => allowed_uri_patterns.push(pattern),
                "alias" => {
                    allowed_aliases.insert(pattern);
                }
                other => {
                    return Err(DotsError::Internal(format!(
                        "unknown customer pattern kind: {other}"
                    )))
                }
            }
        }

        Ok(CustomerPolicy {
            allowed_prefixes,
            allowed_port_ranges,
            allowed_protocols,
            allowed_fqdn_patterns,
            allowed_uri_patterns,
            allowed_aliases,
            max_concurrent_mitigations,
            max_mitigation_lifetime,
        })
    }

    fn load_scope(
        conn: &Connection,
        scope_ref: i64,
        customer_id: i64,
        client_identifier: &str,
        mitigation_id: i64,
        lifetime: i64,
    ) -> Result<MitigationScope> {
        let mut stmt = conn.prepare("SELECT prefix FROM target_prefixes WHERE scope_ref = ?1")?;
        let target_prefix = stmt
            .query_map(params![scope_ref], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .iter()
            .map(|text| Self::parse_stored_prefix(text))
            .collect::<Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
            "SELECT lower_port, upper_port FROM target_port_ranges WHERE scope_ref = ?1",
        )?;
        let target_port_range = stmt
            .query_map(params![scope_ref], |row| {
                Ok(PortRange::new(row.get(0)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt =
            conn.prepare("SELECT protocol FROM target_protocols WHERE scope_ref = ?1")?;
        let target_protocol = stmt
            .query_map(params![scope_ref], |row| row.get::<_, u8>(0))?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;

        let mut stmt =
            conn.prepare("SELECT kind, name FROM target_names WHERE scope_ref = ?1")?;
        let mut fqdn = BTreeSet::new();
        let mut uri = BTreeSet::new();
        let mut alias_name = BTreeSet::new();
        for row in stmt.query_map(params![scope_ref], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })? {
            let (kind, name) = row?;
            match kind.as_str() {
                "fqdn" => {
                    fqdn.insert(name);
                }
                "uri" => {
                    uri.insert(name);
                }
                "alias" => {
                    alias_name.insert(name);
                }
                other => {
                    return Err(DotsError::Internal(format!(
                        "unknown target name kind: {other}"
                    )))
                }
            }
        }

        Ok(MitigationScope {
            mitigation_id,
            customer_id,
            client_identifier: client_identifier.to_string(),
            target_prefix,
            target_port_range,
            target_protocol,
            fqdn,
            uri,
            alias_name,
            lifetime,
        })
    }

    fn delete_scope_rows(
        tx: &rusqlite::Transaction<'_>,
        customer_id: i64,
        client_identifier: &str,
        mitigation_id: i64,
    ) -> Result<()> {
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM mitigation_scopes
                 WHERE customer_id = ?1 AND client_identifier = ?2 AND mitigation_id = ?3",
                params![customer_id, client_identifier, mitigation_id],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(scope_ref) = existing {
            for table in ["target_prefixes", "target_port_ranges", "target_protocols", "target_names"]
            {
                tx.execute(
                    &format!("DELETE FROM {table} WHERE scope_ref = ?1"),
                    params![scope_ref],
                )?;
            }
            tx.execute(
                "DELETE FROM mitigation_scopes WHERE id = ?1",
                params![scope_ref],
            )?;
        }
        Ok(())
    }

    fn row_to_protection(row: &rusqlite::Row<'_>) -> rusqlite::Result<Protection> {
        Ok(Protection {
            id: row.get(0)?,
            customer_id: row.get(1)?,
            client_identifier: row.get(2)?,
            mitigation_id: row.get(3)?,
            blocker_id: row.get(4)?,
            is_enabled: row.get(5)?,
            started_at: row.get(6)?,
            finished_at: row.get(7)?,
        })
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn get_customer_by_common_name(&self, common_name: &str) -> Result<Option<Customer>> {
        let conn = self.conn.lock().await;
        let header: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, name FROM customers WHERE common_name = ?1",
                params![common_name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((id, name)) = header else {
            return Ok(None);
        };
        let policy = Self::load_policy(&conn, id)?;
        Ok(Some(Customer {
            id,
            name,
            common_name: common_name.to_string(),
            policy,
        }))
    }

    async fn get_mitigation_scope(
        &self,
        customer_id: i64,
        client_identifier: &str,
        mitigation_id: i64,
    ) -> Result<Option<MitigationScope>> {
        let conn = self.conn.lock().await;
        let header: Option<(i64, i64)> = conn
            .query_row(
                "SELECT id, lifetime FROM mitigation_scopes
                 WHERE customer_id = ?1 AND client_identifier = ?2 AND mitigation_id = ?3",
                params![customer_id, client_identifier, mitigation_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match header {
            None => Ok(None),
            Some((scope_ref, lifetime)) => Ok(Some(Self::load_scope(
                &conn,
                scope_ref,
                customer_id,
                client_identifier,
                mitigation_id,
                lifetime,
            )?)),
        }
    }

    async fn get_mitigation_ids(
        &self,
        customer_id: i64,
        client_identifier: &str,
    ) -> Result<Vec<i64>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT mitigation_id FROM mitigation_scopes
             WHERE customer_id = ?1 AND client_identifier = ?2
             ORDER BY mitigation_id",
        )?;
        let ids = stmt
            .query_map(params![customer_id, client_identifier], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    async fn create_mitigation_scope(&self, scope: &MitigationScope) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        Self::delete_scope_rows(
            &tx,
            scope.customer_id,
            &scope.client_identifier,
            scope.mitigation_id,
        )?;

        tx.execute(
            "INSERT INTO mitigation_scopes
                 (customer_id, client_identifier, mitigation_id, lifetime)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                scope.customer_id,
                scope.client_identifier,
                scope.mitigation_id,
                scope.lifetime,
            ],
        )?;
        let scope_ref = tx.last_insert_rowid();

        for prefix in &scope.target_prefix {
            tx.execute(
                "INSERT INTO target_prefixes (scope_ref, prefix) VALUES (?1, ?2)",
                params![scope_ref, prefix.to_string()],
            )?;
        }
        for range in &scope.target_port_range {
            tx.execute(
                "INSERT INTO target_port_ranges (scope_ref, lower_port, upper_port)
                 VALUES (?1, ?2, ?3)",
                params![scope_ref, range.lower, range.upper],
            )?;
        }
        for &protocol in &scope.target_protocol {
            tx.execute(
                "INSERT INTO target_protocols (scope_ref, protocol) VALUES (?1, ?2)",
                params![scope_ref, protocol],
            )?;
        }
        for (kind, names) in [("fqdn", &scope.fqdn), ("uri", &scope.uri), ("alias", &scope.alias_name)]
        {
            for name in names {
                tx.execute(
                    "INSERT INTO target_names (scope_ref, kind, name) VALUES (?1, ?2, ?3)",
                    params![scope_ref, kind, name],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    async fn delete_mitigation_scope(
        &self,
        customer_id: i64,
        client_identifier: &str,
        mitigation_id: i64,
    ) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        Self::delete_scope_rows(&tx, customer_id, client_identifier, mitigation_id)?;
        tx.commit()?;
        Ok(())
    }

    async fn get_active_protection_by_mitigation_id(
        &self,
        customer_id: i64,
        client_identifier: &str,
        mitigation_id: i64,
    ) -> Result<Option<Protection>> {
        let conn = self.conn.lock().await;
        let protection = conn
            .query_row(
                "SELECT id, customer_id, client_identifier, mitigation_id, blocker_id,
                        is_enabled, started_at, finished_at
                 FROM protections
                 WHERE customer_id = ?1 AND client_identifier = ?2 AND mitigation_id = ?3
                   AND finished_at IS NULL
                 ORDER BY id DESC LIMIT 1",
                params![customer_id, client_identifier, mitigation_id],
                Self::row_to_protection,
            )
            .optional()?;
        Ok(protection)
    }

    async fn create_protection(&self, protection: &Protection) -> Result<i64> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO protections
                 (customer_id, client_identifier, mitigation_id, blocker_id,
                  is_enabled, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                protection.customer_id,
                protection.client_identifier,
                protection.mitigation_id,
                protection.blocker_id,
                protection.is_enabled,
                protection.started_at,
                protection.finished_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn update_protection(&self, protection: &Protection) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE protections
             SET is_enabled = ?2, started_at = ?3, finished_at = ?4
             WHERE id = ?1",
            params![
                protection.id,
                protection.is_enabled,
                protection.started_at,
                protection.finished_at,
            ],
        )?;
        Ok(())
    }

    async fn delete_protection(&self, protection_id: i64) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM protections WHERE id = ?1",
            params![protection_id],
        )?;
        Ok(())
    }

    async fn get_current_signal_session_configuration(
        &self,
        customer_id: i64,
    ) -> Result<Option<SignalSessionConfiguration>> {
        let conn = self.conn.lock().await;
        let config = conn
            .query_row(
                "SELECT session_id, heartbeat_interval, missing_hb_allowed, max_retransmit,
                        ack_timeout, ack_random_factor, trigger_mitigation
                 FROM signal_session_configurations
                 WHERE customer_id = ?1",
                params![customer_id],
                |row| {
                    Ok(SignalSessionConfiguration {
                        session_id: row.get(0)?,
                        heartbeat_interval: row.get(1)?,
                        missing_hb_allowed: row.get(2)?,
                        max_retransmit: row.get(3)?,
                        ack_timeout: row.get(4)?,
                        ack_random_factor: row.get(5)?,
                        trigger_mitigation: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(config)
    }

    async fn create_signal_session_configuration(
        &self,
        config: &SignalSessionConfiguration,
        customer_id: i64,
    ) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM signal_session_configurations WHERE customer_id = ?1",
            params![customer_id],
        )?;
        tx.execute(
            "INSERT INTO signal_session_configurations
                 (customer_id, session_id, heartbeat_interval, missing_hb_allowed,
                  max_retransmit, ack_timeout, ack_random_factor, trigger_mitigation)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                customer_id,
                config.session_id,
                config.heartbeat_interval,
                config.missing_hb_allowed,
                config.max_retransmit,
                config.ack_timeout,
                config.ack_random_factor,
                config.trigger_mitigation,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn delete_signal_session_configuration_by_customer_id(
        &self,
        customer_id: i64,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM signal_session_configurations WHERE customer_id = ?1",
            params![customer_id],
        )?;
        Ok(())
    }

    fn mitigation_lock(
        &self,
        customer_id: i64,
        client_identifier: &str,
        mitigation_id: i64,
    ) -> Arc<Mutex<()>> {
        let key = (customer_id, client_identifier.to_string(), mitigation_id);
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(key).or_default().clone()
    }
}
