//! Shared types for the prediction API layer.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::api::error::{ApiError, ErrorBody};
use crate::pipeline::{Footer, NlpRecord, SequenceClassifier};

// ═══════════════════════════════════════════════════════════
// API context — shared state for the router
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes. The classifier is immutable after
/// startup and shared read-only across requests.
#[derive(Clone)]
pub struct ApiContext {
    pub pipeline: Arc<dyn SequenceClassifier>,
}

impl ApiContext {
    pub fn new(pipeline: Arc<dyn SequenceClassifier>) -> Self {
        Self { pipeline }
    }
}

// ═══════════════════════════════════════════════════════════
// Request parsing
// ═══════════════════════════════════════════════════════════

/// Parse a request body and return its `content` member.
pub fn request_content(body: &[u8]) -> Result<Value, ApiError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| ApiError::BadRequest("Input must be a dictionary".into()))?;
    let Value::Object(mut root) = value else {
        return Err(ApiError::BadRequest("Input must be a dictionary".into()));
    };
    root.remove("content").ok_or_else(|| {
        ApiError::BadRequest("Input must be a dictionary with 'content' key".into())
    })
}

/// One validated case submission.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseContent {
    pub case: Vec<String>,
    pub dates: Vec<Option<String>>,
    pub footer: Footer,
}

impl CaseContent {
    pub fn from_value(content: Value) -> Result<Self, ApiError> {
        let Value::Object(mut fields) = content else {
            return Err(ApiError::InputShape(
                "content must contain 'case' and 'dates' keys".into(),
            ));
        };
        if !fields.contains_key("case") || !fields.contains_key("dates") {
            return Err(ApiError::InputShape(
                "content must contain 'case' and 'dates' keys".into(),
            ));
        }

        let case = string_list(fields.remove("case"))
            .ok_or_else(|| ApiError::BadRequest("'case' must be a list of strings".into()))?;
        let dates = date_list(fields.remove("dates")).ok_or_else(|| {
            ApiError::BadRequest(
                "'dates' must be a list of DDMonYYYY format date strings or nulls".into(),
            )
        })?;

        if case.len() != dates.len() {
            return Err(ApiError::InputShape(format!(
                "'case' ({} items) and 'dates' ({} items) must have the same length",
                case.len(),
                dates.len()
            )));
        }

        let footer = match fields.remove("footer") {
            None | Some(Value::Null) => Footer::default(),
            Some(value @ Value::Object(_)) => serde_json::from_value(value)
                .map_err(|_| ApiError::BadRequest("'footer' must be a dictionary".into()))?,
            Some(_) => return Err(ApiError::BadRequest("'footer' must be a dictionary".into())),
        };

        Ok(Self {
            case,
            dates,
            footer,
        })
    }
}

fn string_list(value: Option<Value>) -> Option<Vec<String>> {
    match value? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

fn date_list(value: Option<Value>) -> Option<Vec<Option<String>>> {
    match value? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Some(Some(s)),
                Value::Null => Some(None),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════
// Responses
// ═══════════════════════════════════════════════════════════

/// One element of a bulk response: a record, or the error for that case.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BulkItem {
    Record(Box<NlpRecord>),
    Error(ErrorBody),
}

impl From<Result<NlpRecord, ApiError>> for BulkItem {
    fn from(result: Result<NlpRecord, ApiError>) -> Self {
        match result {
            Ok(record) => BulkItem::Record(Box::new(record)),
            Err(e) => BulkItem::Error(e.body()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(err: ApiError) -> String {
        match err {
            ApiError::BadRequest(m) => m,
            other => panic!("expected BadRequest, got {other:?}"),
        }
    }

    fn shape_message(err: ApiError) -> String {
        match err {
            ApiError::InputShape(m) => m,
            other => panic!("expected InputShape, got {other:?}"),
        }
    }

    #[test]
    fn content_is_extracted() {
        let content = request_content(br#"{"content": {"case": []}}"#).unwrap();
        assert_eq!(content, json!({"case": []}));
    }

    #[test]
    fn non_object_body_is_rejected() {
        assert_eq!(message(request_content(b"[1, 2]").unwrap_err()), "Input must be a dictionary");
        assert_eq!(message(request_content(b"not json").unwrap_err()), "Input must be a dictionary");
    }

    #[test]
    fn missing_content_is_rejected() {
        assert_eq!(
            message(request_content(br#"{"case": []}"#).unwrap_err()),
            "Input must be a dictionary with 'content' key"
        );
    }

    #[test]
    fn valid_case_with_footer() {
        let parsed = CaseContent::from_value(json!({
            "case": ["fiebre", "disnea"],
            "dates": ["10Jan2024", null],
            "footer": {"note_id": 7}
        }))
        .unwrap();
        assert_eq!(parsed.case, vec!["fiebre", "disnea"]);
        assert_eq!(parsed.dates, vec![Some("10Jan2024".to_string()), None]);
        assert_eq!(parsed.footer.note_id, json!(7));
    }

    #[test]
    fn missing_keys_are_rejected() {
        let err = CaseContent::from_value(json!({"case": ["a"]})).unwrap_err();
        assert!(shape_message(err).contains("'case' and 'dates'"));
    }

    #[test]
    fn case_must_be_strings() {
        let err = CaseContent::from_value(json!({"case": ["a", 3], "dates": [null, null]})).unwrap_err();
        assert_eq!(message(err), "'case' must be a list of strings");
    }

    #[test]
    fn dates_must_be_strings_or_nulls() {
        let err = CaseContent::from_value(json!({"case": ["a"], "dates": "10Jan2024"})).unwrap_err();
        assert!(message(err).starts_with("'dates' must be a list"));
    }

    #[test]
    fn lengths_must_match() {
        let err = CaseContent::from_value(json!({
            "case": ["a", "b", "c"],
            "dates": [null, null]
        }))
        .unwrap_err();
        assert_eq!(
            shape_message(err),
            "'case' (3 items) and 'dates' (2 items) must have the same length"
        );
    }

    #[test]
    fn footer_must_be_object() {
        let err = CaseContent::from_value(json!({"case": [], "dates": [], "footer": [1]})).unwrap_err();
        assert_eq!(message(err), "'footer' must be a dictionary");
    }

    #[test]
    fn extra_content_keys_are_ignored() {
        let content = json!({"case": ["a"], "dates": [null], "source": "nifi"});
        assert!(CaseContent::from_value(content).is_ok());
    }

    #[test]
    fn bulk_error_item_serializes_as_error_body() {
        let item = BulkItem::from(Err(ApiError::BadRequest("nope".into())));
        let json = serde_json::to_value(item).unwrap();
        assert_eq!(json, json!({"error": {"code": "BAD_REQUEST", "message": "nope"}}));
    }
}
