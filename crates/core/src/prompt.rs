//! Literal `{{Placeholder}}` substitution for prompt templates.
//!
//! Rendering is a single left-to-right pass: substituted values are copied
//! verbatim and never scanned again, so a value that happens to contain
//! `{{...}}` cannot inject further placeholders.

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::locale::Locale;
use crate::types::{Subject, SubjectKind};

const POSTAL_CODE_TEMPLATE: &str = include_str!("../templates/postal_code.txt");
const BANK_CODE_TEMPLATE: &str = include_str!("../templates/bank_code.txt");

/// Concrete values keyed by placeholder name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptValues {
    values: BTreeMap<String, String>,
}

impl PromptValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

impl<K, V> FromIterator<(K, V)> for PromptValues
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values = Self::new();
        for (name, value) in iter {
            values.insert(name, value);
        }
        values
    }
}

/// A fixed prompt text containing named placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: Cow<'static, str>,
}

impl PromptTemplate {
    pub fn new(text: impl Into<Cow<'static, str>>) -> Self {
        Self { text: text.into() }
    }

    /// Returns the built-in template for the subject kind.
    pub fn for_kind(kind: SubjectKind) -> Self {
        match kind {
            SubjectKind::PostalCode => Self::new(POSTAL_CODE_TEMPLATE),
            SubjectKind::BankCode => Self::new(BANK_CODE_TEMPLATE),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Substitutes every placeholder; names without a value become empty strings.
    pub fn render(&self, values: &PromptValues) -> String {
        let mut out = String::with_capacity(self.text.len());
        let mut rest: &str = &self.text;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after_open = &rest[start + 2..];
            match after_open.find("}}") {
                Some(end) if is_placeholder_name(&after_open[..end]) => {
                    out.push_str(values.get(&after_open[..end]).unwrap_or(""));
                    rest = &after_open[end + 2..];
                }
                _ => {
                    out.push_str("{{");
                    rest = after_open;
                }
            }
        }

        out.push_str(rest);
        out
    }

    /// Lists the distinct placeholder names in first-seen order.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        let mut rest: &str = &self.text;
        while let Some(start) = rest.find("{{") {
            let after_open = &rest[start + 2..];
            match after_open.find("}}") {
                Some(end) if is_placeholder_name(&after_open[..end]) => {
                    let name = &after_open[..end];
                    if !names.contains(&name) {
                        names.push(name);
                    }
                    rest = &after_open[end + 2..];
                }
                _ => rest = after_open,
            }
        }
        names
    }

    /// Builds the finished request text for one subject in one locale.
    pub fn build_request(&self, subject: &Subject, locale: &Locale, tone: &str) -> String {
        let mut values = PromptValues::new();
        values.insert("Country_Name", locale.country_name.as_str());
        values.insert("Language", locale.language.as_str());
        values.insert("Tone", tone);
        subject.fill_placeholders(&mut values);
        self.render(&values)
    }
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}
