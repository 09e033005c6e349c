use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::prompt::PromptValues;

/// Kinds of source records that receive generated content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubjectKind {
    PostalCode,
    BankCode,
}

impl SubjectKind {
    pub const ALL: [SubjectKind; 2] = [Self::PostalCode, Self::BankCode];

    /// Returns the canonical CLI / metrics label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PostalCode => "postal-code",
            Self::BankCode => "bank-code",
        }
    }

    /// Returns the `reference_type` stored on content records.
    pub fn reference_type(self) -> &'static str {
        match self {
            Self::PostalCode => "PostalCode",
            Self::BankCode => "BankCode",
        }
    }

    /// Returns `true` when the subject table carries a global completion flag.
    pub fn tracks_progress(self) -> bool {
        matches!(self, Self::BankCode)
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectKind {
    type Err = UnknownSubjectKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "postal-code" | "postal" | "PostalCode" => Ok(Self::PostalCode),
            "bank-code" | "bank" | "BankCode" => Ok(Self::BankCode),
            other => Err(UnknownSubjectKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown subject kind: {0}")]
pub struct UnknownSubjectKind(pub String);

/// A source record eligible for enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub id: i64,
    pub fields: SubjectFields,
}

/// Descriptive fields used to build prompts, per subject kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectFields {
    PostalCode {
        code: String,
        area: Option<String>,
        state: Option<String>,
    },
    BankCode {
        bank: String,
        swift_code: String,
        city: String,
        branch: Option<String>,
    },
}

impl Subject {
    pub fn kind(&self) -> SubjectKind {
        match self.fields {
            SubjectFields::PostalCode { .. } => SubjectKind::PostalCode,
            SubjectFields::BankCode { .. } => SubjectKind::BankCode,
        }
    }

    /// Short human readable identifier used in log lines.
    pub fn label(&self) -> &str {
        match &self.fields {
            SubjectFields::PostalCode { code, .. } => code,
            SubjectFields::BankCode { swift_code, .. } => swift_code,
        }
    }

    /// Adds the subject specific placeholder values to `values`.
    pub fn fill_placeholders(&self, values: &mut PromptValues) {
        match &self.fields {
            SubjectFields::PostalCode { code, area, state } => {
                values.insert("Postal_Code", code.clone());
                values.insert("City_Name", area.clone().unwrap_or_default());
                values.insert("Region_Name", state.clone().unwrap_or_default());
            }
            SubjectFields::BankCode {
                bank,
                swift_code,
                city,
                branch,
            } => {
                values.insert("Bank_Name", bank.clone());
                values.insert("SWIFT_Code", swift_code.clone());
                values.insert("City_Name", city.clone());
                values.insert("Branch_Name", branch.clone().unwrap_or_default());
            }
        }
    }
}

/// A single generated question and answer pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Faq {
    pub question: String,
    pub answer: String,
}

/// Validated generated content for one subject and locale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    #[serde(default)]
    pub highlights: Vec<String>,
    pub faqs: Vec<Faq>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kind_aliases() {
        assert_eq!(
            "postal-code".parse::<SubjectKind>(),
            Ok(SubjectKind::PostalCode)
        );
        assert_eq!("BankCode".parse::<SubjectKind>(), Ok(SubjectKind::BankCode));
        assert_eq!(
            "merchant".parse::<SubjectKind>(),
            Err(UnknownSubjectKind("merchant".into()))
        );
    }

    #[test]
    fn only_bank_codes_track_progress() {
        assert!(SubjectKind::BankCode.tracks_progress());
        assert!(!SubjectKind::PostalCode.tracks_progress());
    }

    #[test]
    fn postal_placeholders_default_missing_fields_to_empty() {
        let subject = Subject {
            id: 7,
            fields: SubjectFields::PostalCode {
                code: "75400".into(),
                area: Some("Karachi".into()),
                state: None,
            },
        };
        let mut values = PromptValues::new();
        subject.fill_placeholders(&mut values);

        assert_eq!(subject.kind(), SubjectKind::PostalCode);
        assert_eq!(subject.label(), "75400");
        assert_eq!(values.get("City_Name"), Some("Karachi"));
        assert_eq!(values.get("Region_Name"), Some(""));
    }
}
