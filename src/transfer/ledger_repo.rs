//! Ledger journal store (PostgreSQL)
//!
//! - `transactions(trx_id uuid PRIMARY KEY, from_acc, to_acc, amount, status, created_at)`
//! - `entries(id bigserial, trx_id uuid, acc_id uuid, amount numeric)`
//!
//! Header status values are written upper case but compared
//! case-insensitively, so rows touched by hand still recover.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, info};

use super::error::TransferError;
use super::repository::LedgerRepository;
use super::types::{
    LedgerEntry, LedgerStatus, LedgerTransaction, TransactionId, TransferRequest,
};

pub struct PgLedgerRepository {
    pool: PgPool,
}

impl PgLedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_transaction(row: &PgRow) -> Result<LedgerTransaction, TransferError> {
        let trx_id: String = row.try_get("trx_id")?;
        let transaction_id = trx_id
            .parse()
            .map_err(|_| TransferError::Store(format!("Invalid trx_id format: {}", trx_id)))?;
        Ok(LedgerTransaction {
            transaction_id,
            from_account_id: row.try_get("from_acc")?,
            to_account_id: row.try_get("to_acc")?,
            amount: row.try_get("amount")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

async fn insert_entry_pair(
    conn: &mut sqlx::PgConnection,
    transaction_id: TransactionId,
    request: &TransferRequest,
) -> Result<(), TransferError> {
    sqlx::query(
        r#"
        INSERT INTO entries (trx_id, acc_id, amount)
        VALUES
            ($1::uuid, $2::uuid, ($3 * -1)),
            ($1::uuid, $4::uuid, $3)
        "#,
    )
    .bind(transaction_id.to_string())
    .bind(&request.from_account_id)
    .bind(request.amount)
    .bind(&request.to_account_id)
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl LedgerRepository for PgLedgerRepository {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx, TransferError> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), TransferError> {
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), TransferError> {
        tx.rollback().await?;
        Ok(())
    }

    async fn insert_pending_transfer(
        &self,
        tx: &mut Self::Tx,
        transaction_id: TransactionId,
        request: &TransferRequest,
    ) -> Result<(), TransferError> {
        sqlx::query(
            r#"
            INSERT INTO transactions (trx_id, from_acc, to_acc, amount, status)
            VALUES ($1::uuid, $2::uuid, $3::uuid, $4, $5)
            "#,
        )
        .bind(transaction_id.to_string())
        .bind(&request.from_account_id)
        .bind(&request.to_account_id)
        .bind(request.amount)
        .bind(LedgerStatus::Pending.as_str())
        .execute(&mut **tx)
        .await?;

        insert_entry_pair(&mut **tx, transaction_id, request).await?;

        debug!(transaction_id = %transaction_id, "Ledger PENDING row written");
        Ok(())
    }

    async fn mark_committed(
        &self,
        tx: &mut Self::Tx,
        transaction_id: TransactionId,
    ) -> Result<(), TransferError> {
        sqlx::query(
            r#"
            UPDATE transactions
            SET status = $2
            WHERE trx_id = $1::uuid
            "#,
        )
        .bind(transaction_id.to_string())
        .bind(LedgerStatus::Committed.as_str())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn mark_committed_by_id(
        &self,
        transaction_id: TransactionId,
    ) -> Result<bool, TransferError> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $2
            WHERE trx_id = $1::uuid
              AND UPPER(status) = $3
            "#,
        )
        .bind(transaction_id.to_string())
        .bind(LedgerStatus::Committed.as_str())
        .bind(LedgerStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn upsert_committed_transfer_with_entries(
        &self,
        transaction_id: TransactionId,
        request: &TransferRequest,
    ) -> Result<(), TransferError> {
        // Dropping `tx` on an early return rolls it back.
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO transactions (trx_id, from_acc, to_acc, amount, status)
            VALUES ($1::uuid, $2::uuid, $3::uuid, $4, $5)
            ON CONFLICT (trx_id)
            DO UPDATE SET status = EXCLUDED.status
            "#,
        )
        .bind(transaction_id.to_string())
        .bind(&request.from_account_id)
        .bind(&request.to_account_id)
        .bind(request.amount)
        .bind(LedgerStatus::Committed.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM entries WHERE trx_id = $1::uuid")
            .bind(transaction_id.to_string())
            .execute(&mut *tx)
            .await?;

        insert_entry_pair(&mut tx, transaction_id, request).await?;

        tx.commit().await?;
        info!(transaction_id = %transaction_id, "Ledger record reconstructed as COMMITTED");
        Ok(())
    }

    async fn record_aborted_transfer(
        &self,
        transaction_id: TransactionId,
        request: &TransferRequest,
    ) -> Result<(), TransferError> {
        sqlx::query(
            r#"
            INSERT INTO transactions (trx_id, from_acc, to_acc, amount, status)
            VALUES ($1::uuid, $2::uuid, $3::uuid, $4, $5)
            ON CONFLICT (trx_id)
            DO UPDATE SET status = EXCLUDED.status
            "#,
        )
        .bind(transaction_id.to_string())
        .bind(&request.from_account_id)
        .bind(&request.to_account_id)
        .bind(request.amount)
        .bind(LedgerStatus::Aborted.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_transaction_by_id(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<LedgerTransaction>, TransferError> {
        let row = sqlx::query(
            r#"
            SELECT trx_id::text AS trx_id, from_acc::text AS from_acc, to_acc::text AS to_acc,
                   amount, status, created_at
            FROM transactions
            WHERE trx_id = $1::uuid
            "#,
        )
        .bind(transaction_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    async fn get_entries(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<LedgerEntry>, TransferError> {
        let rows = sqlx::query(
            r#"
            SELECT acc_id::text AS acc_id, amount
            FROM entries
            WHERE trx_id = $1::uuid
            ORDER BY amount ASC
            "#,
        )
        .bind(transaction_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(LedgerEntry {
                    transaction_id,
                    account_id: row.try_get("acc_id")?,
                    amount: row.try_get("amount")?,
                })
            })
            .collect()
    }

    async fn ping(&self) -> Result<(), TransferError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
