//! PostgreSQL statement executor
//!
//! Holds a single connection for the whole invocation. Values are always
//! bound as parameters.

use async_trait::async_trait;
use edusync_common::{Result, SyncError};
use sqlx::{
    postgres::{PgArguments, PgConnectOptions},
    query::Query,
    ConnectOptions, Connection, PgConnection, Postgres,
};
use tracing::{debug, info, instrument, warn};

use super::{ExecutorError, InsertStatement, SqlParam, StatementExecutor};
use crate::config::SinkConfig;

/// One scoped connection to the reporting database.
pub struct PgExecutor {
    conn: PgConnection,
}

impl PgExecutor {
    pub fn connect_options(config: &SinkConfig) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
    }

    /// Open the connection; failure here is `SinkUnavailable`.
    #[instrument(
        skip(config),
        fields(host = %config.host, port = config.port, database = %config.database)
    )]
    pub async fn connect(config: &SinkConfig) -> Result<Self> {
        let conn = Self::connect_options(config)
            .connect()
            .await
            .map_err(|e| {
                SyncError::SinkUnavailable(format!(
                    "cannot connect to {}:{}/{}: {}",
                    config.host, config.port, config.database, e
                ))
            })?;

        info!("Connected to relational sink");

        Ok(Self { conn })
    }

    pub fn from_connection(conn: PgConnection) -> Self {
        Self { conn }
    }

    /// Close the connection cleanly. A failed close is logged, not raised:
    /// by then the rows are already written or the run has already failed.
    pub async fn close(self) {
        match self.conn.close().await {
            Ok(()) => debug!("Relational sink connection closed"),
            Err(e) => warn!(error = %e, "Failed to close relational sink connection"),
        }
    }
}

fn bind_params<'q>(sql: &'q str, params: &'q [SqlParam]) -> Query<'q, Postgres, PgArguments> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, param| match param {
            SqlParam::Text(value) => query.bind(value.as_deref()),
            SqlParam::Date(value) => query.bind(*value),
        })
}

fn classify(err: sqlx::Error) -> ExecutorError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => ExecutorError::Connection(err.to_string()),
        other => ExecutorError::Statement(other.to_string()),
    }
}

#[async_trait]
impl StatementExecutor for PgExecutor {
    async fn execute(
        &mut self,
        statement: &InsertStatement,
    ) -> std::result::Result<u64, ExecutorError> {
        let sql = statement.sql();
        let result = bind_params(&sql, &statement.params)
            .execute(&mut self.conn)
            .await
            .map_err(classify)?;

        Ok(result.rows_affected())
    }

    async fn execute_atomic(
        &mut self,
        statements: &[InsertStatement],
    ) -> std::result::Result<u64, ExecutorError> {
        let mut tx = self.conn.begin().await.map_err(classify)?;
        let mut affected = 0u64;

        for statement in statements {
            let sql = statement.sql();
            affected += bind_params(&sql, &statement.params)
                .execute(&mut *tx)
                .await
                .map_err(classify)?
                .rows_affected();
        }

        tx.commit().await.map_err(classify)?;
        debug!(rows = affected, "Transaction committed");

        Ok(affected)
    }
}
