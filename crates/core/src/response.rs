use serde::Deserialize;
use thiserror::Error;

use crate::types::{Faq, GenerationResult};

pub const MIN_FAQS: usize = 3;
pub const MAX_FAQS: usize = 5;

/// Structurally valid payload parsed out of a raw generation response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GenerationPayload {
    pub description: String,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default, rename = "keyFeatures")]
    pub key_features: Option<Vec<String>>,
    pub faqs: Vec<Faq>,
}

/// Reasons a raw response cannot be turned into content.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response was empty")]
    Empty,
    #[error("response does not contain a JSON object")]
    MissingObject,
    #[error("response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("response failed validation: {0}")]
    Invalid(String),
}

impl ResponseError {
    /// Returns the label used for the `result` metric dimension.
    pub fn result_label(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::MissingObject | Self::Json(_) | Self::Invalid(_) => "invalid",
        }
    }
}

/// Slices from the first `{` to the last `}` and parses the result.
///
/// The service may wrap its JSON in prose or code fences. Text holding more
/// than one object therefore fails, because the slice spans all of them.
pub fn extract(raw: &str) -> Result<GenerationPayload, ResponseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ResponseError::Empty);
    }

    let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) else {
        return Err(ResponseError::MissingObject);
    };
    if end < start {
        return Err(ResponseError::MissingObject);
    }

    Ok(serde_json::from_str(&trimmed[start..=end])?)
}

impl GenerationPayload {
    /// Enforces the content invariants and trims every text field.
    pub fn validate(self) -> Result<GenerationResult, ResponseError> {
        let result = self.into_result();

        if result.description.is_empty() {
            return Err(ResponseError::Invalid("description is empty".into()));
        }
        if matches!(result.overview.as_deref(), Some("")) {
            return Err(ResponseError::Invalid("overview is empty".into()));
        }
        if !(MIN_FAQS..=MAX_FAQS).contains(&result.faqs.len()) {
            return Err(ResponseError::Invalid(format!(
                "expected {MIN_FAQS} to {MAX_FAQS} faqs, got {}",
                result.faqs.len()
            )));
        }
        if let Some(index) = result
            .faqs
            .iter()
            .position(|faq| faq.question.is_empty() || faq.answer.is_empty())
        {
            return Err(ResponseError::Invalid(format!("faq {index} is incomplete")));
        }
        if result.highlights.iter().any(String::is_empty) {
            return Err(ResponseError::Invalid("highlight is empty".into()));
        }

        Ok(result)
    }

    /// Converts without enforcing invariants, matching the lenient mode.
    pub fn into_result(self) -> GenerationResult {
        GenerationResult {
            description: self.description.trim().to_string(),
            overview: self.overview.map(|overview| overview.trim().to_string()),
            highlights: self
                .key_features
                .unwrap_or_default()
                .into_iter()
                .map(|feature| feature.trim().to_string())
                .collect(),
            faqs: self
                .faqs
                .into_iter()
                .map(|faq| Faq {
                    question: faq.question.trim().to_string(),
                    answer: faq.answer.trim().to_string(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn faqs(count: usize) -> Vec<serde_json::Value> {
        (0..count)
            .map(|i| json!({"question": format!("Q{i}?"), "answer": format!("A{i}.")}))
            .collect()
    }

    #[test]
    fn extracts_object_surrounded_by_noise() {
        let payload = extract(r#"noise {"description":"x","faqs":[]} trailing"#).expect("payload");
        assert_eq!(payload.description, "x");
        assert!(payload.faqs.is_empty());
        assert!(payload.key_features.is_none());
    }

    #[test]
    fn extracts_from_code_fence() {
        let raw = format!(
            "Here you go:\n```json\n{}\n```",
            json!({"description": "Text", "keyFeatures": ["a"], "faqs": faqs(3)})
        );
        let payload = extract(&raw).expect("payload");
        assert_eq!(payload.key_features, Some(vec!["a".to_string()]));
        assert_eq!(payload.faqs.len(), 3);
    }

    #[test]
    fn rejects_text_without_object() {
        assert!(matches!(
            extract("not json at all"),
            Err(ResponseError::MissingObject)
        ));
        assert!(matches!(extract("} before {"), Err(ResponseError::MissingObject)));
        assert!(matches!(extract("   \n"), Err(ResponseError::Empty)));
    }

    #[test]
    fn two_objects_span_into_invalid_json() {
        let err = extract(r#"{"a":1} {"a":2}"#).unwrap_err();
        assert!(matches!(err, ResponseError::Json(_)));
        assert_eq!(err.result_label(), "invalid");
    }

    #[test]
    fn missing_top_level_fields_are_rejected() {
        assert!(matches!(
            extract(r#"{"description":"x"}"#),
            Err(ResponseError::Json(_))
        ));
    }

    // Structural extraction accepts an empty FAQ list; only strict validation rejects it.
    #[test]
    fn strict_validation_rejects_faq_count_outside_bounds() {
        let payload = extract(r#"{"description":"x","faqs":[]}"#).expect("structurally valid");
        let err = payload.clone().validate().unwrap_err();
        assert!(matches!(err, ResponseError::Invalid(reason) if reason.contains("faqs")));

        let lenient = payload.into_result();
        assert!(lenient.faqs.is_empty());

        let six = json!({"description": "x", "faqs": faqs(6)}).to_string();
        assert!(extract(&six).unwrap().validate().is_err());
    }

    #[test]
    fn strict_validation_rejects_blank_text() {
        let blank_description = json!({"description": "   ", "faqs": faqs(3)}).to_string();
        assert!(extract(&blank_description).unwrap().validate().is_err());

        let mut items = faqs(3);
        items[1] = json!({"question": "Q?", "answer": " "});
        let blank_answer = json!({"description": "x", "faqs": items}).to_string();
        let err = extract(&blank_answer).unwrap().validate().unwrap_err();
        assert!(matches!(err, ResponseError::Invalid(reason) if reason == "faq 1 is incomplete"));

        let blank_overview =
            json!({"description": "x", "overview": "", "faqs": faqs(3)}).to_string();
        assert!(extract(&blank_overview).unwrap().validate().is_err());
    }

    #[test]
    fn validation_trims_fields() {
        let raw = json!({
            "overview": " Intro ",
            "description": "  Body  ",
            "keyFeatures": [" one "],
            "faqs": [
                {"question": " Q1? ", "answer": " A1. "},
                {"question": "Q2?", "answer": "A2."},
                {"question": "Q3?", "answer": "A3."}
            ]
        })
        .to_string();

        let result = extract(&raw).unwrap().validate().expect("valid");
        assert_eq!(result.description, "Body");
        assert_eq!(result.overview.as_deref(), Some("Intro"));
        assert_eq!(result.highlights, vec!["one".to_string()]);
        assert_eq!(result.faqs[0].question, "Q1?");
    }
}
