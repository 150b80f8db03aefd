use sqlx::PgPool;
use tracing::{debug, error};

use crate::domain::deletion::{Table, plan_delete};
use crate::domain::error::DomainError;

/// Runs the deletion plan for one row of `table` inside a transaction.
/// Returns whether the row existed.
pub async fn delete_with_policies(pool: &PgPool, table: Table, id: i64) -> Result<bool, DomainError> {
    let plan = plan_delete(table);
    let mut tx = pool.begin().await.map_err(|e| {
        error!("failed to open transaction: {}", e);
        DomainError::Internal(e.to_string())
    })?;

    let mut removed = 0;
    for step in &plan.steps {
        let sql = step.to_sql();
        debug!(table = table.name(), id, sql = %sql, "delete step");
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("delete step failed on {} {}: {}", table.name(), id, e);
                DomainError::Internal(e.to_string())
            })?;
        removed = result.rows_affected();
    }

    tx.commit().await.map_err(|e| {
        error!("failed to commit delete of {} {}: {}", table.name(), id, e);
        DomainError::Internal(e.to_string())
    })?;

    Ok(removed > 0)
}
