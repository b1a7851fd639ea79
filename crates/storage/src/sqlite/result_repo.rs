use cbt_core::model::{AttemptResult, AttemptStamp, QuestionOutcome, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    attempt_id_from_str, conn, id_i64, parse_trigger, ser, test_id_from_i64, u32_from_i64,
    user_id_from_i64,
};
use crate::repository::{ResultRepository, ResultRow, StorageError};

const RESULT_COLUMNS: &str = r"
    id, attempt_id, test_id, user_id, submit_trigger, started_at, completed_at,
    total_questions, correct_answers, violation_count, outcomes
";

fn map_result_row(row: &sqlx::sqlite::SqliteRow) -> Result<ResultRow, StorageError> {
    let id: i64 = row.try_get("id").map_err(ser)?;
    let stamp = AttemptStamp {
        attempt_id: attempt_id_from_str(&row.try_get::<String, _>("attempt_id").map_err(ser)?)?,
        test_id: test_id_from_i64(row.try_get::<i64, _>("test_id").map_err(ser)?)?,
        user_id: user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        started_at: row.try_get("started_at").map_err(ser)?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
        trigger: parse_trigger(&row.try_get::<String, _>("submit_trigger").map_err(ser)?)?,
    };
    let outcomes: Vec<QuestionOutcome> =
        serde_json::from_str(&row.try_get::<String, _>("outcomes").map_err(ser)?).map_err(ser)?;

    let result = AttemptResult::from_persisted(
        stamp,
        outcomes,
        u32_from_i64(
            "total_questions",
            row.try_get::<i64, _>("total_questions").map_err(ser)?,
        )?,
        u32_from_i64(
            "correct_answers",
            row.try_get::<i64, _>("correct_answers").map_err(ser)?,
        )?,
        u32_from_i64(
            "violation_count",
            row.try_get::<i64, _>("violation_count").map_err(ser)?,
        )?,
    )
    .map_err(ser)?;

    Ok(ResultRow::new(id, result))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait::async_trait]
impl ResultRepository for SqliteRepository {
    async fn save_result(&self, result: &AttemptResult) -> Result<i64, StorageError> {
        let outcomes = serde_json::to_string(result.outcomes()).map_err(ser)?;

        let res = sqlx::query(
            r"
                INSERT INTO results (
                    attempt_id, test_id, user_id, submit_trigger, started_at, completed_at,
                    total_questions, correct_answers, score, violation_count, outcomes
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ",
        )
        .bind(result.attempt_id().to_string())
        .bind(id_i64("test_id", result.test_id().value())?)
        .bind(id_i64("user_id", result.user_id().value())?)
        .bind(result.trigger().as_str())
        .bind(result.started_at())
        .bind(result.completed_at())
        .bind(i64::from(result.total_questions()))
        .bind(i64::from(result.correct_answers()))
        .bind(result.score())
        .bind(i64::from(result.violation_count()))
        .bind(outcomes)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::Conflict
            } else {
                conn(e)
            }
        })?;

        Ok(res.last_insert_rowid())
    }

    async fn get_result(&self, id: i64) -> Result<AttemptResult, StorageError> {
        let sql = format!("SELECT {RESULT_COLUMNS} FROM results WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        Ok(map_result_row(&row)?.result)
    }

    async fn list_results_for_user(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<ResultRow>, StorageError> {
        let sql = format!(
            "SELECT {RESULT_COLUMNS} FROM results WHERE user_id = ?1 \
             ORDER BY completed_at DESC, id DESC LIMIT ?2"
        );
        let rows = sqlx::query(&sql)
            .bind(id_i64("user_id", user_id.value())?)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        rows.iter().map(map_result_row).collect()
    }
}
