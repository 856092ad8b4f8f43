use std::collections::{BTreeMap, BTreeSet};

use sqlx::Row;
use uuid::Uuid;

use training_core::model::{LearnerId, ModuleId, ProgressState, QuizAttempt};

use super::SqliteRepository;
use super::mapping::{
    id_to_i64, learner_id_from_i64, module_id_from_i64, position_from_i64, score_from_i64, ser,
    status_from_str, status_to_str,
};
use crate::repository::{AttemptRepository, ProgressRecord, ProgressRepository, StorageError};

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn load(
        &self,
        learner_id: LearnerId,
        module_id: ModuleId,
    ) -> Result<Option<ProgressState>, StorageError> {
        let learner = id_to_i64("learner_id", learner_id.value())?;
        let module = id_to_i64("module_id", module_id.value())?;

        let row = sqlx::query(
            r"
            SELECT learner_id, module_id, status, overall_score, started_at, completed_at
            FROM progress
            WHERE learner_id = ?1 AND module_id = ?2
            ",
        )
        .bind(learner)
        .bind(module)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let Some(row) = row else { return Ok(None) };

        let page_rows = sqlx::query(
            r"
            SELECT page_position, completed, score
            FROM progress_pages
            WHERE learner_id = ?1 AND module_id = ?2
            ORDER BY page_position ASC
            ",
        )
        .bind(learner)
        .bind(module)
        .fetch_all(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut completed_pages = BTreeSet::new();
        let mut page_scores = BTreeMap::new();
        for page_row in &page_rows {
            let position = position_from_i64(
                "page_position",
                page_row.try_get::<i64, _>("page_position").map_err(ser)?,
            )?;
            if page_row.try_get::<i64, _>("completed").map_err(ser)? != 0 {
                completed_pages.insert(position);
            }
            if let Some(score) = page_row.try_get::<Option<i64>, _>("score").map_err(ser)? {
                page_scores.insert(position, score_from_i64(score)?);
            }
        }

        let status_str: String = row.try_get("status").map_err(ser)?;
        let overall_score = row
            .try_get::<Option<i64>, _>("overall_score")
            .map_err(ser)?
            .map(score_from_i64)
            .transpose()?;

        let record = ProgressRecord {
            learner_id: learner_id_from_i64(row.try_get::<i64, _>("learner_id").map_err(ser)?)?,
            module_id: module_id_from_i64(row.try_get::<i64, _>("module_id").map_err(ser)?)?,
            status: status_from_str(&status_str)?,
            completed_pages,
            page_scores,
            overall_score,
            started_at: row.try_get("started_at").map_err(ser)?,
            completed_at: row.try_get("completed_at").map_err(ser)?,
        };

        record.into_progress().map(Some).map_err(ser)
    }

    async fn save(&self, progress: &ProgressState) -> Result<(), StorageError> {
        let record = ProgressRecord::from_progress(progress);
        let learner = id_to_i64("learner_id", record.learner_id.value())?;
        let module = id_to_i64("module_id", record.module_id.value())?;
        let overall_score = record.overall_score.map(i64::from);

        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO progress (learner_id, module_id, status, overall_score, started_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(learner_id, module_id) DO UPDATE SET
                status = excluded.status,
                overall_score = excluded.overall_score,
                completed_at = excluded.completed_at
            ",
        )
        .bind(learner)
        .bind(module)
        .bind(status_to_str(record.status))
        .bind(overall_score)
        .bind(record.started_at)
        .bind(record.completed_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        // Per-page rows are replaced wholesale with the new snapshot.
        sqlx::query("DELETE FROM progress_pages WHERE learner_id = ?1 AND module_id = ?2")
            .bind(learner)
            .bind(module)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let positions: BTreeSet<usize> = record
            .completed_pages
            .iter()
            .chain(record.page_scores.keys())
            .copied()
            .collect();
        for position in positions {
            let completed = i64::from(record.completed_pages.contains(&position));
            let score = record.page_scores.get(&position).map(|&s| i64::from(s));
            let position = i64::try_from(position)
                .map_err(|_| StorageError::Serialization("page_position overflow".into()))?;

            sqlx::query(
                r"
                INSERT INTO progress_pages (learner_id, module_id, page_position, completed, score)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
            )
            .bind(learner)
            .bind(module)
            .bind(position)
            .bind(completed)
            .bind(score)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn append_attempt(
        &self,
        learner_id: LearnerId,
        module_id: ModuleId,
        attempt: &QuizAttempt,
    ) -> Result<(), StorageError> {
        let position = i64::try_from(attempt.page_index)
            .map_err(|_| StorageError::Serialization("page_position overflow".into()))?;

        sqlx::query(
            r"
            INSERT INTO quiz_attempts (id, learner_id, module_id, page_position, score, passed, submitted_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
        )
        .bind(attempt.id.to_string())
        .bind(id_to_i64("learner_id", learner_id.value())?)
        .bind(id_to_i64("module_id", module_id.value())?)
        .bind(position)
        .bind(i64::from(attempt.score))
        .bind(i64::from(attempt.passed))
        .bind(attempt.submitted_at)
        .execute(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn list_attempts(
        &self,
        learner_id: LearnerId,
        module_id: ModuleId,
    ) -> Result<Vec<QuizAttempt>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, page_position, score, passed, submitted_at
            FROM quiz_attempts
            WHERE learner_id = ?1 AND module_id = ?2
            ORDER BY submitted_at ASC, rowid ASC
            ",
        )
        .bind(id_to_i64("learner_id", learner_id.value())?)
        .bind(id_to_i64("module_id", module_id.value())?)
        .fetch_all(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut attempts = Vec::with_capacity(rows.len());
        for row in rows {
            attempts.push(QuizAttempt {
                id: Uuid::parse_str(&row.try_get::<String, _>("id").map_err(ser)?).map_err(ser)?,
                page_index: position_from_i64(
                    "page_position",
                    row.try_get::<i64, _>("page_position").map_err(ser)?,
                )?,
                score: score_from_i64(row.try_get::<i64, _>("score").map_err(ser)?)?,
                passed: row.try_get::<i64, _>("passed").map_err(ser)? != 0,
                submitted_at: row.try_get("submitted_at").map_err(ser)?,
            });
        }
        Ok(attempts)
    }
}
