use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One configured country and the language its content is primarily written in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub code: String,
    pub name: String,
    pub language: String,
}

impl Country {
    pub fn new(code: &str, name: &str, language: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            language: language.to_string(),
        }
    }
}

/// A (country, language) pair driving one slice of generation work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Locale {
    pub country_code: String,
    pub country_name: String,
    pub language: String,
}

impl Locale {
    /// Formats the locale as `country-language` for logs and metrics.
    pub fn tag(&self) -> String {
        format!("{}-{}", self.country_code, self.language)
    }
}

const BUILTIN_COUNTRIES: &[(&str, &str, &str)] = &[
    ("pk", "Pakistan", "ur"),
    ("in", "India", "hi"),
    ("ae", "United Arab Emirates", "ar"),
    ("sa", "Saudi Arabia", "ar"),
    ("gb", "United Kingdom", "en"),
    ("us", "United States", "en"),
    ("ca", "Canada", "en"),
    ("au", "Australia", "en"),
    ("fr", "France", "fr"),
    ("de", "Germany", "de"),
];

/// Ordered, validated country → language configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleTable {
    countries: Vec<Country>,
}

impl LocaleTable {
    /// Validates the entries, normalizing codes to lowercase.
    pub fn new(countries: Vec<Country>) -> Result<Self, LocaleTableError> {
        if countries.is_empty() {
            return Err(LocaleTableError::Empty);
        }

        let mut normalized: Vec<Country> = Vec::with_capacity(countries.len());
        for country in countries {
            let code = country.code.trim().to_lowercase();
            let language = country.language.trim().to_lowercase();
            if code.is_empty() || language.is_empty() {
                return Err(LocaleTableError::BlankEntry);
            }
            if normalized.iter().any(|existing| existing.code == code) {
                return Err(LocaleTableError::DuplicateCountry(code));
            }
            let name = match country.name.trim() {
                "" => code.to_uppercase(),
                name => name.to_string(),
            };
            normalized.push(Country {
                code,
                name,
                language,
            });
        }

        Ok(Self {
            countries: normalized,
        })
    }

    /// Returns the table shipped with the binary.
    pub fn builtin() -> Self {
        Self {
            countries: BUILTIN_COUNTRIES
                .iter()
                .map(|(code, name, language)| Country::new(code, name, language))
                .collect(),
        }
    }

    /// Parses a JSON array of `{code, name, language}` objects.
    pub fn from_json(raw: &str) -> Result<Self, LocaleTableError> {
        let countries: Vec<Country> = serde_json::from_str(raw)?;
        Self::new(countries)
    }

    pub fn from_path(path: &Path) -> Result<Self, LocaleTableError> {
        let raw = fs::read_to_string(path).map_err(|source| LocaleTableError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn countries(&self) -> &[Country] {
        &self.countries
    }

    /// Country codes in configuration order.
    pub fn country_codes(&self) -> Vec<&str> {
        self.countries
            .iter()
            .map(|country| country.code.as_str())
            .collect()
    }

    /// Distinct languages in first-seen order.
    pub fn languages(&self) -> Vec<&str> {
        let mut languages: Vec<&str> = Vec::new();
        for country in &self.countries {
            if !languages.contains(&country.language.as_str()) {
                languages.push(&country.language);
            }
        }
        languages
    }

    pub fn country_name(&self, code: &str) -> Option<&str> {
        self.countries
            .iter()
            .find(|country| country.code.eq_ignore_ascii_case(code))
            .map(|country| country.name.as_str())
    }

    /// Pairs every country with every configured language, country-major.
    ///
    /// A country is paired with all languages, not only its own, so content
    /// exists for each language a reader of that country may request.
    pub fn locales(&self) -> Vec<Locale> {
        let languages = self.languages();
        self.countries
            .iter()
            .flat_map(|country| {
                languages.iter().map(move |language| Locale {
                    country_code: country.code.clone(),
                    country_name: country.name.clone(),
                    language: (*language).to_string(),
                })
            })
            .collect()
    }
}

/// Errors raised while loading the locale configuration.
#[derive(Debug, Error)]
pub enum LocaleTableError {
    #[error("locale table must contain at least one country")]
    Empty,
    #[error("locale entries need a country code and a language")]
    BlankEntry,
    #[error("country {0} is configured more than once")]
    DuplicateCountry(String),
    #[error("failed to decode locale table: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("failed to read locale table {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample() -> LocaleTable {
        LocaleTable::new(vec![
            Country::new("PK", "Pakistan", "ur"),
            Country::new("US", "United States", "en"),
            Country::new("CA", "Canada", "en"),
        ])
        .expect("valid table")
    }

    #[test]
    fn languages_are_deduplicated_in_first_seen_order() {
        assert_eq!(sample().languages(), vec!["ur", "en"]);
    }

    #[test]
    fn every_country_is_paired_with_every_language() {
        let locales = sample().locales();
        let pairs: Vec<_> = locales
            .iter()
            .map(|locale| (locale.country_code.as_str(), locale.language.as_str()))
            .collect();

        assert_eq!(
            pairs,
            vec![
                ("pk", "ur"),
                ("pk", "en"),
                ("us", "ur"),
                ("us", "en"),
                ("ca", "ur"),
                ("ca", "en"),
            ]
        );
    }

    #[test]
    fn country_codes_are_lowercased_and_named() {
        let table = sample();
        assert_eq!(table.country_codes(), vec!["pk", "us", "ca"]);
        assert_eq!(table.country_name("PK"), Some("Pakistan"));
        assert_eq!(table.country_name("fr"), None);
    }

    #[test]
    fn rejects_duplicates_and_empty_tables() {
        let err = LocaleTable::new(vec![
            Country::new("pk", "Pakistan", "ur"),
            Country::new("PK", "Pakistan", "en"),
        ])
        .unwrap_err();
        assert!(matches!(err, LocaleTableError::DuplicateCountry(code) if code == "pk"));
        assert!(matches!(
            LocaleTable::new(Vec::new()),
            Err(LocaleTableError::Empty)
        ));
    }

    #[test]
    fn blank_names_fall_back_to_uppercase_code() {
        let table = LocaleTable::new(vec![Country::new("nz", " ", "en")]).expect("valid table");
        assert_eq!(table.country_name("nz"), Some("NZ"));
    }

    #[test]
    fn loads_table_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"[{{"code":"fr","name":"France","language":"fr"}},{{"code":"be","name":"Belgium","language":"fr"}}]"#
        )
        .expect("write table");

        let table = LocaleTable::from_path(file.path()).expect("table loads");
        assert_eq!(table.languages(), vec!["fr"]);
        assert_eq!(table.locales().len(), 2);
    }

    #[test]
    fn builtin_table_is_valid() {
        let builtin = LocaleTable::builtin();
        let revalidated = LocaleTable::new(builtin.countries().to_vec()).expect("valid builtin");
        assert_eq!(builtin, revalidated);
    }
}
