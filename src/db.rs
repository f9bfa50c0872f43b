//! Transfer ledger
//!
//! Uses SQLite with WAL mode for concurrent reads.
//! Writes are serialized through a tokio mutex to prevent lock contention.

use crate::chain::{AssetKind, ChainFamily, ChainId};
use crate::validator::normalize_evm;
use crate::wallets::TerminalStatus;
use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Ledger status of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferStatus {
    Submitted,
    Confirmed,
    Failed,
    PendingTimeout,
    /// Refused before anything was sent to the chain
    Rejected,
}

impl TransferStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransferStatus::Submitted => "submitted",
            TransferStatus::Confirmed => "confirmed",
            TransferStatus::Failed => "failed",
            TransferStatus::PendingTimeout => "pending-timeout",
            TransferStatus::Rejected => "rejected",
        }
    }
}

impl TransferStatus {
    /// Settled on chain; later timeouts must not overwrite it
    pub fn is_settled(self) -> bool {
        matches!(self, TransferStatus::Confirmed | TransferStatus::Failed)
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransferStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(TransferStatus::Submitted),
            "confirmed" => Ok(TransferStatus::Confirmed),
            "failed" => Ok(TransferStatus::Failed),
            "pending-timeout" => Ok(TransferStatus::PendingTimeout),
            "rejected" => Ok(TransferStatus::Rejected),
            _ => Err(anyhow::anyhow!("Unknown transfer status: {}", s)),
        }
    }
}

impl From<TerminalStatus> for TransferStatus {
    fn from(status: TerminalStatus) -> Self {
        match status {
            TerminalStatus::Confirmed => TransferStatus::Confirmed,
            TerminalStatus::Failed => TransferStatus::Failed,
            TerminalStatus::PendingTimeout => TransferStatus::PendingTimeout,
        }
    }
}

/// A ledger row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: String,
    pub chain: String,
    pub asset_kind: String,
    pub token_address: Option<String>,
    pub sender: Option<String>,
    pub destination: String,
    pub amount: Decimal,
    pub tx_handle: Option<String>,
    pub status: TransferStatus,
    pub fee: Option<Decimal>,
    pub block_reference: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields known when a transfer is first recorded
#[derive(Debug, Clone)]
pub struct NewTransfer<'a> {
    pub chain: ChainId,
    pub asset_kind: AssetKind,
    pub token_address: Option<&'a str>,
    pub sender: Option<&'a str>,
    pub destination: &'a str,
    pub amount: Decimal,
    pub tx_handle: Option<&'a str>,
    pub status: TransferStatus,
    pub error_message: Option<&'a str>,
}

type TransferRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    String,
);

const SELECT_COLUMNS: &str = "SELECT id, chain, asset_kind, token_address, sender, destination, \
     amount, tx_handle, status, fee, block_reference, error_message, created_at, updated_at \
     FROM transfers";

/// Database connection and operations
///
/// Uses a write lock to serialize write operations (SQLite limitation)
/// while allowing concurrent reads via WAL mode.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    /// Write lock to serialize write operations
    write_lock: Arc<Mutex<()>>,
}

impl Database {
    /// Create a new database connection
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect(&db_url)
            .await?;

        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;

        // Wait for locks instead of failing immediately
        sqlx::query("PRAGMA busy_timeout=5000")
            .execute(&pool)
            .await?;

        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&pool)
            .await?;

        let db = Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        };
        db.init_schema().await?;

        Ok(db)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transfers (
                id TEXT PRIMARY KEY,
                chain TEXT NOT NULL,
                asset_kind TEXT NOT NULL,
                token_address TEXT,
                sender TEXT,
                destination TEXT NOT NULL,
                amount TEXT NOT NULL,
                tx_handle TEXT,
                status TEXT NOT NULL,
                fee TEXT,
                block_reference TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_transfers_sender ON transfers(chain, sender);
            CREATE INDEX IF NOT EXISTS idx_transfers_destination ON transfers(chain, destination);
            CREATE INDEX IF NOT EXISTS idx_transfers_handle ON transfers(chain, tx_handle);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record a transfer (serialized write)
    pub async fn record_transfer(&self, transfer: &NewTransfer<'_>) -> Result<String> {
        let _lock = self.write_lock.lock().await;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let sender = transfer.sender.map(|a| ledger_address(transfer.chain, a));
        let destination = ledger_address(transfer.chain, transfer.destination);

        sqlx::query(
            r#"
            INSERT INTO transfers (id, chain, asset_kind, token_address, sender, destination,
                                   amount, tx_handle, status, error_message, created_at,
                                   updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(transfer.chain.to_string())
        .bind(transfer.asset_kind.to_string())
        .bind(transfer.token_address)
        .bind(sender)
        .bind(destination)
        .bind(transfer.amount.to_string())
        .bind(transfer.tx_handle)
        .bind(transfer.status.as_str())
        .bind(transfer.error_message)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Record a terminal status for every row with this handle (serialized write).
    /// A settled row (`confirmed`/`failed`) only accepts another settled status.
    /// Returns the number of rows touched.
    pub async fn update_status(
        &self,
        chain: ChainId,
        tx_handle: &str,
        status: TransferStatus,
        fee: Option<Decimal>,
        block_reference: Option<&str>,
    ) -> Result<u64> {
        let _lock = self.write_lock.lock().await;
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            UPDATE transfers
            SET status = ?,
                fee = COALESCE(?, fee),
                block_reference = COALESCE(?, block_reference),
                updated_at = ?
            WHERE chain = ? AND tx_handle = ?
              AND (status NOT IN ('confirmed', 'failed') OR ?)
            "#,
        )
        .bind(status.as_str())
        .bind(fee.map(|f| f.to_string()))
        .bind(block_reference)
        .bind(&now)
        .bind(chain.to_string())
        .bind(tx_handle)
        .bind(status.is_settled())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Transfers sent from or to `wallet`, newest first
    pub async fn get_history(
        &self,
        chain: ChainId,
        wallet: &str,
        limit: u32,
    ) -> Result<Vec<TransferRecord>> {
        let query = format!(
            "{} WHERE chain = ? AND (sender = ? OR destination = ?) \
             ORDER BY created_at DESC LIMIT ?",
            SELECT_COLUMNS
        );

        let wallet = ledger_address(chain, wallet);
        let rows = sqlx::query_as::<_, TransferRow>(&query)
            .bind(chain.to_string())
            .bind(&wallet)
            .bind(&wallet)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(row_to_record).collect())
    }

    /// Look up a transfer by handle
    pub async fn get_by_handle(
        &self,
        chain: ChainId,
        tx_handle: &str,
    ) -> Result<Option<TransferRecord>> {
        let query = format!("{} WHERE chain = ? AND tx_handle = ? LIMIT 1", SELECT_COLUMNS);

        let row = sqlx::query_as::<_, TransferRow>(&query)
            .bind(chain.to_string())
            .bind(tx_handle)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(row_to_record))
    }
}

/// Stored form of an address. EVM addresses are case-insensitive, so they
/// are kept lowercase with the `0x` prefix.
fn ledger_address(chain: ChainId, address: &str) -> String {
    match chain.family() {
        ChainFamily::Evm => normalize_evm(address).to_lowercase(),
        ChainFamily::Solana | ChainFamily::Tron => address.trim().to_string(),
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_record(row: TransferRow) -> TransferRecord {
    TransferRecord {
        id: row.0,
        chain: row.1,
        asset_kind: row.2,
        token_address: row.3,
        sender: row.4,
        destination: row.5,
        amount: row.6.parse().unwrap_or_default(),
        tx_handle: row.7,
        status: row.8.parse().unwrap_or(TransferStatus::Submitted),
        fee: row.9.and_then(|f| f.parse().ok()),
        block_reference: row.10,
        error_message: row.11,
        created_at: parse_timestamp(&row.12),
        updated_at: parse_timestamp(&row.13),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    async fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("ledger.db")).await.unwrap();
        (dir, db)
    }

    fn submitted<'a>(sender: &'a str, destination: &'a str, handle: &'a str) -> NewTransfer<'a> {
        NewTransfer {
            chain: ChainId::Tron,
            asset_kind: AssetKind::Native,
            token_address: None,
            sender: Some(sender),
            destination,
            amount: Decimal::from_str("12.5").unwrap(),
            tx_handle: Some(handle),
            status: TransferStatus::Submitted,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn history_covers_both_directions() {
        let (_dir, db) = open().await;
        db.record_transfer(&submitted("TA", "TB", "h1")).await.unwrap();
        db.record_transfer(&submitted("TB", "TC", "h2")).await.unwrap();
        db.record_transfer(&submitted("TC", "TD", "h3")).await.unwrap();

        let history = db.get_history(ChainId::Tron, "TB", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|r| r.amount == Decimal::from_str("12.5").unwrap()));

        assert!(db.get_history(ChainId::Eth, "TB", 10).await.unwrap().is_empty());
        assert_eq!(db.get_history(ChainId::Tron, "TB", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn terminal_status_updates_the_row() {
        let (_dir, db) = open().await;
        db.record_transfer(&submitted("TA", "TB", "h1")).await.unwrap();

        let touched = db
            .update_status(
                ChainId::Tron,
                "h1",
                TerminalStatus::Confirmed.into(),
                Some(Decimal::from_str("0.345").unwrap()),
                Some("61234567"),
            )
            .await
            .unwrap();
        assert_eq!(touched, 1);

        let record = db.get_by_handle(ChainId::Tron, "h1").await.unwrap().unwrap();
        assert_eq!(record.status, TransferStatus::Confirmed);
        assert_eq!(record.fee, Some(Decimal::from_str("0.345").unwrap()));
        assert_eq!(record.block_reference.as_deref(), Some("61234567"));

        assert_eq!(
            db.update_status(ChainId::Tron, "unknown", TransferStatus::Failed, None, None)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn timeout_does_not_overwrite_a_settled_row() {
        let (_dir, db) = open().await;
        db.record_transfer(&submitted("TA", "TB", "h1")).await.unwrap();
        db.update_status(ChainId::Tron, "h1", TransferStatus::PendingTimeout, None, None)
            .await
            .unwrap();
        assert_eq!(
            db.get_by_handle(ChainId::Tron, "h1").await.unwrap().unwrap().status,
            TransferStatus::PendingTimeout
        );

        db.update_status(ChainId::Tron, "h1", TransferStatus::Confirmed, None, Some("61234567"))
            .await
            .unwrap();
        let touched = db
            .update_status(ChainId::Tron, "h1", TransferStatus::PendingTimeout, None, None)
            .await
            .unwrap();
        assert_eq!(touched, 0);

        let record = db.get_by_handle(ChainId::Tron, "h1").await.unwrap().unwrap();
        assert_eq!(record.status, TransferStatus::Confirmed);
        assert_eq!(record.block_reference.as_deref(), Some("61234567"));
    }

    #[tokio::test]
    async fn evm_history_ignores_case_and_prefix() {
        let (_dir, db) = open().await;
        let transfer = NewTransfer {
            chain: ChainId::Eth,
            ..submitted(
                "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23",
                "52908400098527886E0F7030069857D2E4169EE7",
                "0xabc",
            )
        };
        db.record_transfer(&transfer).await.unwrap();

        let by_sender = db
            .get_history(ChainId::Eth, "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23", 10)
            .await
            .unwrap();
        assert_eq!(by_sender.len(), 1);

        let by_destination = db
            .get_history(ChainId::Eth, "0x52908400098527886e0f7030069857d2e4169ee7", 10)
            .await
            .unwrap();
        assert_eq!(by_destination.len(), 1);

        let unprefixed = db
            .get_history(ChainId::Eth, "2C7536E3605D9C16A7A3D7B1898E529396A65C23", 10)
            .await
            .unwrap();
        assert_eq!(unprefixed.len(), 1);
    }

    #[tokio::test]
    async fn rejections_keep_the_error() {
        let (_dir, db) = open().await;
        let rejected = NewTransfer {
            sender: None,
            tx_handle: None,
            status: TransferStatus::Rejected,
            error_message: Some("Insufficient balance: have 5, need 10"),
            ..submitted("", "TB", "")
        };
        db.record_transfer(&rejected).await.unwrap();

        let history = db.get_history(ChainId::Tron, "TB", 10).await.unwrap();
        assert_eq!(history[0].status, TransferStatus::Rejected);
        assert_eq!(history[0].tx_handle, None);
        assert!(history[0].error_message.as_deref().unwrap().contains("have 5"));
    }

    #[test]
    fn status_names_round_trip_through_text() {
        for status in [
            TransferStatus::Submitted,
            TransferStatus::PendingTimeout,
            TransferStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<TransferStatus>().unwrap(), status);
        }
    }
}
