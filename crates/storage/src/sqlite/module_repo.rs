use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use training_core::model::{Module, ModuleId, Page, Quiz, QuizQuestion};

use super::SqliteRepository;
use super::mapping::{
    id_to_i64, module_id_from_i64, options_from_json, options_to_json, position_from_i64, ser,
    training_path_id_from_i64,
};
use crate::repository::{ModuleRepository, StorageError};

#[async_trait::async_trait]
impl ModuleRepository for SqliteRepository {
    async fn upsert_module(&self, module: &Module) -> Result<(), StorageError> {
        let module_id = id_to_i64("module_id", module.id().value())?;
        let training_path = module
            .training_path()
            .map(|p| id_to_i64("training_path_id", p.value()))
            .transpose()?;

        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO modules (id, title, description, training_path_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                training_path_id = excluded.training_path_id
            ",
        )
        .bind(module_id)
        .bind(module.title())
        .bind(module.description())
        .bind(training_path)
        .bind(module.created_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        // Pages are replaced wholesale; the question cascade follows.
        sqlx::query("DELETE FROM pages WHERE module_id = ?1")
            .bind(module_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        for (position, page) in module.pages().iter().enumerate() {
            let position = i64::try_from(position)
                .map_err(|_| StorageError::Serialization("position overflow".into()))?;

            sqlx::query(
                r"
                INSERT INTO pages (module_id, position, title)
                VALUES (?1, ?2, ?3)
                ",
            )
            .bind(module_id)
            .bind(position)
            .bind(page.title())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

            let Some(quiz) = page.quiz() else { continue };
            for (q_position, question) in quiz.questions().iter().enumerate() {
                let q_position = i64::try_from(q_position)
                    .map_err(|_| StorageError::Serialization("question position overflow".into()))?;
                let correct = i64::try_from(question.correct_option())
                    .map_err(|_| StorageError::Serialization("correct_option overflow".into()))?;

                sqlx::query(
                    r"
                    INSERT INTO quiz_questions (module_id, page_position, position, prompt, options, correct_option)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ",
                )
                .bind(module_id)
                .bind(position)
                .bind(q_position)
                .bind(question.prompt())
                .bind(options_to_json(question.options())?)
                .bind(correct)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    async fn get_module(&self, id: ModuleId) -> Result<Option<Module>, StorageError> {
        let module_id = id_to_i64("module_id", id.value())?;

        let row = sqlx::query(
            r"
            SELECT id, title, description, training_path_id, created_at
            FROM modules WHERE id = ?1
            ",
        )
        .bind(module_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let Some(row) = row else { return Ok(None) };

        let pages = self.load_pages(module_id).await?;
        module_from_row(&row, pages).map(Some)
    }

    async fn list_modules(&self, limit: u32) -> Result<Vec<Module>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, title, description, training_path_id, created_at
            FROM modules
            ORDER BY id ASC
            LIMIT ?1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut modules = Vec::with_capacity(rows.len());
        for row in rows {
            let module_id: i64 = row.try_get("id").map_err(ser)?;
            let pages = self.load_pages(module_id).await?;
            modules.push(module_from_row(&row, pages)?);
        }
        Ok(modules)
    }
}

impl SqliteRepository {
    async fn load_pages(&self, module_id: i64) -> Result<Vec<Page>, StorageError> {
        let page_rows = sqlx::query(
            r"
            SELECT position, title
            FROM pages
            WHERE module_id = ?1
            ORDER BY position ASC
            ",
        )
        .bind(module_id)
        .fetch_all(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let question_rows = sqlx::query(
            r"
            SELECT page_position, prompt, options, correct_option
            FROM quiz_questions
            WHERE module_id = ?1
            ORDER BY page_position ASC, position ASC
            ",
        )
        .bind(module_id)
        .fetch_all(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut pages = Vec::with_capacity(page_rows.len());
        for page_row in &page_rows {
            let position =
                position_from_i64("position", page_row.try_get::<i64, _>("position").map_err(ser)?)?;
            let title: String = page_row.try_get("title").map_err(ser)?;

            let mut questions = Vec::new();
            for q_row in &question_rows {
                let page_position = position_from_i64(
                    "page_position",
                    q_row.try_get::<i64, _>("page_position").map_err(ser)?,
                )?;
                if page_position != position {
                    continue;
                }
                let prompt: String = q_row.try_get("prompt").map_err(ser)?;
                let options = options_from_json(&q_row.try_get::<String, _>("options").map_err(ser)?)?;
                let correct = position_from_i64(
                    "correct_option",
                    q_row.try_get::<i64, _>("correct_option").map_err(ser)?,
                )?;
                questions.push(QuizQuestion::new(prompt, options, correct).map_err(ser)?);
            }

            let quiz = if questions.is_empty() {
                None
            } else {
                Some(Quiz::new(questions).map_err(ser)?)
            };
            pages.push(Page::new(title, quiz).map_err(ser)?);
        }

        Ok(pages)
    }
}

fn module_from_row(row: &SqliteRow, pages: Vec<Page>) -> Result<Module, StorageError> {
    let training_path = row
        .try_get::<Option<i64>, _>("training_path_id")
        .map_err(ser)?
        .map(training_path_id_from_i64)
        .transpose()?;

    Module::new(
        module_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        row.try_get::<String, _>("title").map_err(ser)?,
        row.try_get::<Option<String>, _>("description").map_err(ser)?,
        training_path,
        pages,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}
