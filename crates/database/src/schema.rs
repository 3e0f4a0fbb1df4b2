use core_types::AccountId;

/// The pair of tables that stores one account's telemetry.
///
/// Built only from an [`AccountId`], whose allow-list guarantees the names
/// are plain identifiers; they are still double-quoted in every statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountTables {
    account: AccountId,
    equity: String,
    positions: String,
}

impl AccountTables {
    pub fn new(account: &AccountId) -> Self {
        Self {
            account: account.clone(),
            equity: format!("{}_total_equity", account),
            positions: format!("{}_net_positions", account),
        }
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn equity_table(&self) -> &str {
        &self.equity
    }

    pub fn positions_table(&self) -> &str {
        &self.positions
    }

    /// Name of the unique `(timestamp, symbol)` index on the positions table.
    pub(crate) fn positions_key(&self) -> String {
        format!("{}_ts_symbol", self.positions)
    }

    /// DDL for both tables. Every statement is idempotent.
    pub(crate) fn create_statements(&self) -> [String; 3] {
        let (e, p) = (&self.equity, &self.positions);
        [
            format!(r#"CREATE TABLE IF NOT EXISTS "{e}" (timestamp INTEGER NOT NULL, equity REAL NOT NULL)"#),
            format!(r#"CREATE INDEX IF NOT EXISTS "{e}_ts" ON "{e}" (timestamp)"#),
            format!(
                r#"CREATE TABLE IF NOT EXISTS "{p}" (timestamp INTEGER NOT NULL, symbol TEXT NOT NULL, contracts REAL NOT NULL)"#
            ),
        ]
    }

    /// Folds rows sharing a `(timestamp, symbol)` into one net row, as a
    /// keyless positions table may hold one row per hedge leg. Merged rows are
    /// appended last, so the highest rowid of each group is the one kept, and
    /// legs that cancel out are dropped.
    pub(crate) fn merge_duplicate_statements(&self) -> [String; 3] {
        let p = &self.positions;
        [
            format!(
                r#"INSERT INTO "{p}" (timestamp, symbol, contracts)
                   SELECT timestamp, symbol, SUM(contracts) FROM "{p}"
                   GROUP BY timestamp, symbol HAVING COUNT(*) > 1"#
            ),
            format!(
                r#"DELETE FROM "{p}" WHERE rowid NOT IN
                   (SELECT MAX(rowid) FROM "{p}" GROUP BY timestamp, symbol)"#
            ),
            format!(r#"DELETE FROM "{p}" WHERE contracts = 0"#),
        ]
    }

    /// The positions key. Created as an index rather than a primary key so
    /// that tables from older keyless deployments pick up upsert semantics too.
    pub(crate) fn unique_key_statement(&self) -> String {
        format!(
            r#"CREATE UNIQUE INDEX IF NOT EXISTS "{}" ON "{}" (timestamp, symbol)"#,
            self.positions_key(),
            self.positions
        )
    }
}
