use training_core::model::{LearnerId, ModuleId, ModuleStatus, TrainingPathId};

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn module_id_from_i64(v: i64) -> Result<ModuleId, StorageError> {
    Ok(ModuleId::new(i64_to_u64("module_id", v)?))
}

pub(crate) fn learner_id_from_i64(v: i64) -> Result<LearnerId, StorageError> {
    Ok(LearnerId::new(i64_to_u64("learner_id", v)?))
}

pub(crate) fn training_path_id_from_i64(v: i64) -> Result<TrainingPathId, StorageError> {
    Ok(TrainingPathId::new(i64_to_u64("training_path_id", v)?))
}

pub(crate) fn id_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn position_from_i64(field: &'static str, v: i64) -> Result<usize, StorageError> {
    usize::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn score_from_i64(v: i64) -> Result<u8, StorageError> {
    match u8::try_from(v) {
        Ok(score) if score <= 100 => Ok(score),
        _ => Err(StorageError::Serialization(format!("invalid score: {v}"))),
    }
}

/// Converts a `ModuleStatus` to its storage representation.
/// This must stay consistent with `status_from_str`.
pub(crate) fn status_to_str(status: ModuleStatus) -> &'static str {
    match status {
        ModuleStatus::NotStarted => "not_started",
        ModuleStatus::InProgress => "in_progress",
        ModuleStatus::Completed => "completed",
    }
}

pub(crate) fn status_from_str(s: &str) -> Result<ModuleStatus, StorageError> {
    match s {
        "not_started" => Ok(ModuleStatus::NotStarted),
        "in_progress" => Ok(ModuleStatus::InProgress),
        "completed" => Ok(ModuleStatus::Completed),
        _ => Err(StorageError::Serialization(format!("invalid status: {s}"))),
    }
}

/// Answer options are stored as one JSON array column per question.
pub(crate) fn options_to_json(options: &[String]) -> Result<String, StorageError> {
    serde_json::to_string(options).map_err(ser)
}

pub(crate) fn options_from_json(raw: &str) -> Result<Vec<String>, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}
