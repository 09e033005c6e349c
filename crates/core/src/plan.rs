use std::collections::VecDeque;

use crate::locale::{Locale, LocaleTable};

/// Optional restriction of the locales a run covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanFilter {
    pub countries: Vec<String>,
    pub languages: Vec<String>,
}

impl PlanFilter {
    fn admits(&self, locale: &Locale) -> bool {
        let country_ok = self.countries.is_empty()
            || self
                .countries
                .iter()
                .any(|code| code.eq_ignore_ascii_case(&locale.country_code));
        let language_ok = self.languages.is_empty()
            || self
                .languages
                .iter()
                .any(|language| language.eq_ignore_ascii_case(&locale.language));
        country_ok && language_ok
    }
}

/// One (country, language) slice of the run, drained page by page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub locale: Locale,
}

/// Explicit FIFO of the work items of a run.
#[derive(Debug, Clone)]
pub struct WorkPlan {
    items: VecDeque<WorkItem>,
    total: usize,
}

impl WorkPlan {
    pub fn new(table: &LocaleTable, filter: &PlanFilter) -> Self {
        let items: VecDeque<WorkItem> = table
            .locales()
            .into_iter()
            .filter(|locale| filter.admits(locale))
            .map(|locale| WorkItem { locale })
            .collect();
        let total = items.len();
        Self { items, total }
    }

    /// Number of items the plan started with.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn remaining(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Iterator for WorkPlan {
    type Item = WorkItem;

    fn next(&mut self) -> Option<Self::Item> {
        self.items.pop_front()
    }
}
