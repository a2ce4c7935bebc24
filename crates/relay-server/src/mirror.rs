//! Durable connection mirror.
//!
//! The registry is the source of truth for routing; this is a write-only
//! copy in Postgres so operators (and other instances) can see who is
//! connected. Every write is best-effort: callers spawn it off the hot
//! path and a failure is a log line, never a closed socket.

use std::time::Duration;

use relay_core::ids::ConnectionId;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info};

use crate::registry::Connection;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS realtime_connections (
    connection_id   text PRIMARY KEY,
    socket_id       text NOT NULL,
    user_id         text NOT NULL,
    tenant_id       text NOT NULL,
    project_id      text NOT NULL,
    ip_address      text,
    user_agent      text,
    connected_at    timestamptz NOT NULL DEFAULT now(),
    last_heartbeat  timestamptz NOT NULL DEFAULT now()
)";

/// Handle on the mirror table. Cheap to clone; wraps a [`PgPool`].
#[derive(Clone)]
pub struct ConnectionMirror {
    pool: PgPool,
}

impl ConnectionMirror {
    /// Connect and ensure the mirror table exists.
    pub async fn connect(url: &str) -> sqlx::Result<Self> {
        let pool = PgPoolOptions::new().max_connections(4).connect(url).await?;
        let _ = sqlx::query(SCHEMA).execute(&pool).await?;
        info!("connection mirror ready");
        Ok(Self { pool })
    }

    /// Upsert a row for a freshly authenticated connection. Upsert, not
    /// insert: a reconnect with the same id takes over the row.
    pub async fn record_connect(&self, conn: &Connection) -> sqlx::Result<()> {
        let _ = sqlx::query(
            r"INSERT INTO realtime_connections
                  (connection_id, socket_id, user_id, tenant_id, project_id,
                   ip_address, user_agent, connected_at, last_heartbeat)
              VALUES ($1, $2, $3, $4, $5, $6, $7, now(), now())
              ON CONFLICT (connection_id) DO UPDATE SET
                  socket_id = EXCLUDED.socket_id,
                  ip_address = EXCLUDED.ip_address,
                  user_agent = EXCLUDED.user_agent,
                  connected_at = now(),
                  last_heartbeat = now()",
        )
        .bind(conn.id.as_str())
        .bind(conn.socket_id.to_string())
        .bind(&conn.user_id)
        .bind(&conn.tenant_id)
        .bind(&conn.project_id)
        .bind(&conn.ip_address)
        .bind(&conn.user_agent)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete the row for a departed connection.
    pub async fn record_disconnect(&self, id: &ConnectionId) -> sqlx::Result<()> {
        let _ = sqlx::query("DELETE FROM realtime_connections WHERE connection_id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Bump `last_heartbeat` for every connection this instance still
    /// considers live. Called from the heartbeat sweep.
    pub async fn refresh_heartbeats(&self, ids: &[ConnectionId]) -> sqlx::Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<&str> = ids.iter().map(ConnectionId::as_str).collect();
        let _ = sqlx::query(
            "UPDATE realtime_connections SET last_heartbeat = now()
             WHERE connection_id = ANY($1)",
        )
        .bind(ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Purge rows whose heartbeat predates the retention window. Catches
    /// rows orphaned by an instance that died without tearing down.
    pub async fn purge_stale(&self, retention: Duration) -> sqlx::Result<u64> {
        let result = sqlx::query(
            "DELETE FROM realtime_connections
             WHERE last_heartbeat < now() - ($1 * interval '1 second')",
        )
        .bind(retention.as_secs() as i64)
        .execute(&self.pool)
        .await?;
        let purged = result.rows_affected();
        if purged > 0 {
            debug!(purged, "purged stale mirror rows");
        }
        Ok(purged)
    }
}
