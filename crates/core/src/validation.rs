use thiserror::Error;

use crate::ContentId;

pub const MAX_BODY_LEN: usize = 10_000;
pub const MAX_TAGS_PER_ITEM: usize = 10;
pub const MAX_TAG_FILTER: usize = 25;
pub const MAX_REPORT_REASON_LEN: usize = 500;
pub const MAX_BATCH_GET: usize = 100;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("body must not be empty")]
    EmptyBody,
    #[error("body exceeds {0} characters")]
    BodyTooLong(usize),
    #[error("at most {0} tags allowed")]
    TooManyTags(usize),
    #[error("report reason exceeds {0} characters")]
    ReasonTooLong(usize),
    #[error("batch lookup needs between 1 and {0} content ids")]
    BatchSize(usize),
    #[error("duplicate content id in batch")]
    DuplicateContentId,
}

pub fn validate_body(body: &str) -> Result<(), ValidationError> {
    if body.trim().is_empty() {
        return Err(ValidationError::EmptyBody);
    }
    if body.chars().count() > MAX_BODY_LEN {
        return Err(ValidationError::BodyTooLong(MAX_BODY_LEN));
    }
    Ok(())
}

pub fn validate_tag_count(count: usize, limit: usize) -> Result<(), ValidationError> {
    if count > limit {
        Err(ValidationError::TooManyTags(limit))
    } else {
        Ok(())
    }
}

pub fn validate_report_reason(reason: Option<&str>) -> Result<(), ValidationError> {
    match reason {
        Some(reason) if reason.chars().count() > MAX_REPORT_REASON_LEN => {
            Err(ValidationError::ReasonTooLong(MAX_REPORT_REASON_LEN))
        }
        _ => Ok(()),
    }
}

pub fn validate_batch_ids(ids: &[ContentId]) -> Result<(), ValidationError> {
    if ids.is_empty() || ids.len() > MAX_BATCH_GET {
        return Err(ValidationError::BatchSize(MAX_BATCH_GET));
    }
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    if ids.iter().any(|id| !seen.insert(*id)) {
        return Err(ValidationError::DuplicateContentId);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_cases() {
        assert!(validate_body("hello").is_ok());
        assert_eq!(validate_body("   "), Err(ValidationError::EmptyBody));
        let long = "x".repeat(MAX_BODY_LEN + 1);
        assert_eq!(
            validate_body(&long),
            Err(ValidationError::BodyTooLong(MAX_BODY_LEN))
        );
    }

    #[test]
    fn batch_bounds() {
        assert_eq!(
            validate_batch_ids(&[]),
            Err(ValidationError::BatchSize(MAX_BATCH_GET))
        );
        let ids: Vec<ContentId> = (0..=MAX_BATCH_GET).map(|_| ContentId::new()).collect();
        assert!(validate_batch_ids(&ids).is_err());
        assert!(validate_batch_ids(&ids[..MAX_BATCH_GET]).is_ok());

        let id = ContentId::new();
        assert_eq!(
            validate_batch_ids(&[id, id]),
            Err(ValidationError::DuplicateContentId)
        );
    }

    #[test]
    fn reason_and_tags() {
        assert!(validate_report_reason(None).is_ok());
        assert!(validate_report_reason(Some("spam")).is_ok());
        let long = "r".repeat(MAX_REPORT_REASON_LEN + 1);
        assert!(validate_report_reason(Some(&long)).is_err());
        assert!(validate_tag_count(MAX_TAGS_PER_ITEM, MAX_TAGS_PER_ITEM).is_ok());
        assert!(validate_tag_count(MAX_TAGS_PER_ITEM + 1, MAX_TAGS_PER_ITEM).is_err());
    }
}
