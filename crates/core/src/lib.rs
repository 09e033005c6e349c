//! Domain layer for the content generation pipeline.
//!
//! Everything here is pure: locale enumeration, work planning, prompt
//! rendering and response validation. Storage and network access live in
//! the sibling crates.

pub mod locale;
pub mod plan;
pub mod prompt;
pub mod response;
pub mod types;

pub use locale::{Country, Locale, LocaleTable, LocaleTableError};
pub use plan::{PlanFilter, WorkItem, WorkPlan};
pub use prompt::{PromptTemplate, PromptValues};
pub use response::{extract, GenerationPayload, ResponseError};
pub use types::{Faq, GenerationResult, Subject, SubjectFields, SubjectKind, UnknownSubjectKind};
