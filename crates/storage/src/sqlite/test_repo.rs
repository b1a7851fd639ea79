use std::collections::HashMap;

use cbt_core::model::{AnswerOption, Question, QuestionId, Test, TestId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    conn, id_i64, option_id_from_i64, parse_question_kind, question_id_from_i64, ser,
    test_id_from_i64, u32_from_i64, user_id_from_i64,
};
use crate::repository::{StorageError, TestRepository};

impl SqliteRepository {
    async fn load_questions(&self, test_id: i64) -> Result<Vec<Question>, StorageError> {
        let option_rows = sqlx::query(
            r"
                SELECT o.id, o.question_id, o.text, o.is_correct
                FROM options o
                JOIN questions q ON q.id = o.question_id
                WHERE q.test_id = ?1
                ORDER BY o.question_id ASC, o.position ASC
            ",
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut options: HashMap<QuestionId, Vec<AnswerOption>> = HashMap::new();
        for row in option_rows {
            let question_id =
                question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(ser)?)?;
            let option = AnswerOption::new(
                option_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
                row.try_get::<String, _>("text").map_err(ser)?,
                row.try_get::<bool, _>("is_correct").map_err(ser)?,
            );
            options.entry(question_id).or_default().push(option);
        }

        let question_rows = sqlx::query(
            r"
                SELECT id, prompt, kind
                FROM questions
                WHERE test_id = ?1
                ORDER BY position ASC
            ",
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut questions = Vec::with_capacity(question_rows.len());
        for row in question_rows {
            let id = question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
            let kind = parse_question_kind(&row.try_get::<String, _>("kind").map_err(ser)?)?;
            let prompt: String = row.try_get("prompt").map_err(ser)?;
            let question = Question::new(id, prompt, kind, options.remove(&id).unwrap_or_default())
                .map_err(ser)?;
            questions.push(question);
        }

        Ok(questions)
    }
}

#[async_trait::async_trait]
impl TestRepository for SqliteRepository {
    async fn upsert_test(&self, test: &Test) -> Result<(), StorageError> {
        let test_id = id_i64("test_id", test.id().value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
                INSERT INTO tests (
                    id, title, description, duration_minutes, published, created_by, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    description = excluded.description,
                    duration_minutes = excluded.duration_minutes,
                    published = excluded.published,
                    created_by = excluded.created_by,
                    created_at = excluded.created_at
            ",
        )
        .bind(test_id)
        .bind(test.title())
        .bind(test.description())
        .bind(i64::from(test.duration_minutes()))
        .bind(test.is_published())
        .bind(id_i64("created_by", test.created_by().value())?)
        .bind(test.created_at())
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        // Options go with their questions through ON DELETE CASCADE.
        sqlx::query("DELETE FROM questions WHERE test_id = ?1")
            .bind(test_id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (position, question) in (0_i64..).zip(test.questions()) {
            let question_id = id_i64("question_id", question.id().value())?;
            sqlx::query(
                r"
                    INSERT INTO questions (id, test_id, position, prompt, kind)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                ",
            )
            .bind(question_id)
            .bind(test_id)
            .bind(position)
            .bind(question.prompt())
            .bind(question.kind().as_str())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

            for (option_position, option) in (0_i64..).zip(question.options()) {
                sqlx::query(
                    r"
                        INSERT INTO options (id, question_id, position, text, is_correct)
                        VALUES (?1, ?2, ?3, ?4, ?5)
                    ",
                )
                .bind(id_i64("option_id", option.id().value())?)
                .bind(question_id)
                .bind(option_position)
                .bind(option.text())
                .bind(option.is_correct())
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
            }
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn get_test(&self, id: TestId) -> Result<Option<Test>, StorageError> {
        let test_id = id_i64("test_id", id.value())?;
        let Some(row) = sqlx::query(
            r"
                SELECT id, title, description, duration_minutes, published, created_by, created_at
                FROM tests
                WHERE id = ?1
            ",
        )
        .bind(test_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        else {
            return Ok(None);
        };

        let questions = self.load_questions(test_id).await?;
        let test = Test::new(
            test_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
            row.try_get::<String, _>("title").map_err(ser)?,
            row.try_get::<Option<String>, _>("description").map_err(ser)?,
            u32_from_i64(
                "duration_minutes",
                row.try_get::<i64, _>("duration_minutes").map_err(ser)?,
            )?,
            questions,
            row.try_get::<bool, _>("published").map_err(ser)?,
            user_id_from_i64(row.try_get::<i64, _>("created_by").map_err(ser)?)?,
            row.try_get("created_at").map_err(ser)?,
        )
        .map_err(ser)?;

        Ok(Some(test))
    }

    async fn list_tests(&self, limit: u32) -> Result<Vec<Test>, StorageError> {
        let rows = sqlx::query("SELECT id FROM tests ORDER BY id ASC LIMIT ?1")
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut tests = Vec::with_capacity(rows.len());
        for row in rows {
            let id = test_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
            if let Some(test) = self.get_test(id).await? {
                tests.push(test);
            }
        }
        Ok(tests)
    }
}
