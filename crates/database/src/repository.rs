use crate::error::DbError;
use crate::schema::AccountTables;
use core_types::{EquityRecord, PositionRecord};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use sqlx::{Executor, Row};

/// The `DbRepository` provides a high-level, application-specific interface
/// to the telemetry store. It encapsulates all SQL and data access logic.
///
/// The store is append/upsert-only: nothing here deletes or rewrites history.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: SqlitePool,
}

impl DbRepository {
    /// Creates a new `DbRepository` with a shared database connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the account's tables and indexes if they do not exist yet.
    /// Safe to call on every start and from several tasks at once.
    ///
    /// A positions table without the `(timestamp, symbol)` key has its
    /// duplicate rows netted together before the key is added.
    pub async fn ensure_schema(&self, tables: &AccountTables) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        for statement in tables.create_statements() {
            sqlx::query(&statement).execute(&mut *tx).await?;
        }

        let keyed: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?1")
                .bind(tables.positions_key())
                .fetch_optional(&mut *tx)
                .await?;
        if keyed.is_none() {
            let mut merged = 0;
            for statement in tables.merge_duplicate_statements() {
                merged += sqlx::query(&statement).execute(&mut *tx).await?.rows_affected();
            }
            if merged > 0 {
                tracing::info!(
                    account = %tables.account(),
                    rows = merged,
                    "Netted duplicate position rows before adding the (timestamp, symbol) key."
                );
            }
            sqlx::query(&tables.unique_key_statement()).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        tracing::debug!(account = %tables.account(), "Schema ready.");
        Ok(())
    }

    /// Appends one point to the equity curve. Duplicate timestamps accumulate.
    pub async fn append_equity(&self, tables: &AccountTables, record: &EquityRecord) -> Result<(), DbError> {
        insert_equity(&self.pool, tables, record).await
    }

    /// Inserts or replaces the row keyed by `(timestamp, symbol)`.
    pub async fn upsert_position(&self, tables: &AccountTables, record: &PositionRecord) -> Result<(), DbError> {
        upsert_position(&self.pool, tables, record).await
    }

    /// Writes one poll's equity point and all of its position rows in a
    /// single transaction: either every row lands or none does.
    pub async fn save_snapshot(
        &self,
        tables: &AccountTables,
        equity: &EquityRecord,
        positions: &[PositionRecord],
    ) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        insert_equity(&mut *tx, tables, equity).await?;
        for record in positions {
            upsert_position(&mut *tx, tables, record).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// The most recent `limit` equity points, oldest first.
    pub async fn get_equity_history(&self, tables: &AccountTables, limit: u32) -> Result<Vec<EquityRecord>, DbError> {
        let sql = format!(
            r#"
            SELECT timestamp, equity FROM (
                SELECT rowid AS seq, timestamp, equity
                FROM "{}"
                ORDER BY timestamp DESC, rowid DESC
                LIMIT ?1
            )
            ORDER BY timestamp ASC, seq ASC
            "#,
            tables.equity_table()
        );

        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(equity_from_row).collect()
    }

    /// Every position row recorded at exactly `timestamp`, ordered by symbol.
    pub async fn get_positions_at(&self, tables: &AccountTables, timestamp: i64) -> Result<Vec<PositionRecord>, DbError> {
        let sql = format!(
            r#"SELECT timestamp, symbol, contracts FROM "{}" WHERE timestamp = ?1 ORDER BY symbol ASC"#,
            tables.positions_table()
        );

        let rows = sqlx::query(&sql)
            .bind(timestamp)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(position_from_row).collect()
    }

    /// The latest equity point together with the positions recorded with it.
    ///
    /// Keyed off the equity table because a snapshot with no open positions
    /// leaves no position rows at all.
    pub async fn get_latest_snapshot(
        &self,
        tables: &AccountTables,
    ) -> Result<(EquityRecord, Vec<PositionRecord>), DbError> {
        let sql = format!(
            r#"SELECT timestamp, equity FROM "{}" ORDER BY timestamp DESC, rowid DESC LIMIT 1"#,
            tables.equity_table()
        );

        let row = sqlx::query(&sql)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DbError::NotFound)?;
        let equity = equity_from_row(&row)?;
        let positions = self.get_positions_at(tables, equity.timestamp).await?;

        Ok((equity, positions))
    }
}

async fn insert_equity<'e, E>(executor: E, tables: &AccountTables, record: &EquityRecord) -> Result<(), DbError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        r#"INSERT INTO "{}" (timestamp, equity) VALUES (?1, ?2)"#,
        tables.equity_table()
    );

    sqlx::query(&sql)
        .bind(record.timestamp)
        .bind(to_real("equity", record.equity)?)
        .execute(executor)
        .await?;
    Ok(())
}

async fn upsert_position<'e, E>(executor: E, tables: &AccountTables, record: &PositionRecord) -> Result<(), DbError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        r#"INSERT OR REPLACE INTO "{}" (timestamp, symbol, contracts) VALUES (?1, ?2, ?3)"#,
        tables.positions_table()
    );

    sqlx::query(&sql)
        .bind(record.timestamp)
        .bind(record.symbol.as_str())
        .bind(to_real("contracts", record.net_contracts)?)
        .execute(executor)
        .await?;
    Ok(())
}

fn to_real(field: &'static str, value: Decimal) -> Result<f64, DbError> {
    value
        .to_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| DbError::NumericConversion { field, value: value.to_string() })
}

fn from_real(field: &'static str, value: f64) -> Result<Decimal, DbError> {
    Decimal::from_f64(value).ok_or_else(|| DbError::NumericConversion { field, value: value.to_string() })
}

fn equity_from_row(row: &SqliteRow) -> Result<EquityRecord, DbError> {
    Ok(EquityRecord {
        timestamp: row.try_get("timestamp")?,
        equity: from_real("equity", row.try_get("equity")?)?,
    })
}

fn position_from_row(row: &SqliteRow) -> Result<PositionRecord, DbError> {
    Ok(PositionRecord {
        timestamp: row.try_get("timestamp")?,
        symbol: row.try_get("symbol")?,
        net_contracts: from_real("contracts", row.try_get("contracts")?)?,
    })
}
