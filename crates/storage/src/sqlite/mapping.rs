use cbt_core::model::{
    AttemptId, OptionId, QuestionId, QuestionKind, SubmitTrigger, TestId, UserId,
};

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn test_id_from_i64(v: i64) -> Result<TestId, StorageError> {
    Ok(TestId::new(i64_to_u64("test_id", v)?))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn option_id_from_i64(v: i64) -> Result<OptionId, StorageError> {
    Ok(OptionId::new(i64_to_u64("option_id", v)?))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64("user_id", v)?))
}

pub(crate) fn attempt_id_from_str(s: &str) -> Result<AttemptId, StorageError> {
    s.parse().map_err(ser)
}

pub(crate) fn parse_question_kind(s: &str) -> Result<QuestionKind, StorageError> {
    match s {
        "single" => Ok(QuestionKind::Single),
        "multiple" => Ok(QuestionKind::Multiple),
        _ => Err(StorageError::Serialization(format!("invalid kind: {s}"))),
    }
}

pub(crate) fn parse_trigger(s: &str) -> Result<SubmitTrigger, StorageError> {
    match s {
        "manual" => Ok(SubmitTrigger::Manual),
        "time_expired" => Ok(SubmitTrigger::TimeExpired),
        _ => Err(StorageError::Serialization(format!("invalid trigger: {s}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_kinds_and_triggers() {
        for kind in [QuestionKind::Single, QuestionKind::Multiple] {
            assert_eq!(parse_question_kind(kind.as_str()).unwrap(), kind);
        }
        for trigger in [SubmitTrigger::Manual, SubmitTrigger::TimeExpired] {
            assert_eq!(parse_trigger(trigger.as_str()).unwrap(), trigger);
        }
        assert!(parse_question_kind("essay").is_err());
    }

    #[test]
    fn rejects_negative_ids() {
        assert!(test_id_from_i64(-1).is_err());
        assert!(id_i64("test_id", u64::MAX).is_err());
    }
}
