//! Batch driver that fills `content_records` for one subject kind.
//!
//! The run walks an explicit [`WorkPlan`] of locales. Each work item is
//! drained page by page with a keyset cursor, and the subjects of a page are
//! handed to a bounded pool of workers that share one [`Throttle`]. Failures
//! of a single subject are logged, counted and skipped; only storage or
//! startup failures end the run.

use std::{sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use contentgen_core::{
    extract, Locale, LocaleTable, PlanFilter, PromptTemplate, ResponseError, Subject, SubjectKind,
    WorkItem, WorkPlan,
};
use contentgen_providers::{GenerationError, OllamaClient};
use contentgen_storage::{
    CheckpointError, CheckpointStatus, ContentError, Database, GenerationCheckpoint,
    NewContentRecord, SubjectError, SubjectPageQuery,
};

use crate::throttle::Throttle;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

const CONTENT_SOURCE: &str = "generated";

/// Options of a single generation run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub kind: SubjectKind,
    pub filter: PlanFilter,
    pub page_size: u32,
    pub workers: usize,
    pub tone: String,
    /// Regenerate content that already exists.
    pub force: bool,
    /// Skip locales a previous run finished cleanly and continue interrupted ones.
    pub resume: bool,
    /// Persist structurally valid payloads without enforcing the content invariants.
    pub lenient: bool,
}

/// Totals reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub work_items: usize,
    pub skipped_items: usize,
    pub pages: u64,
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub subjects_completed: u64,
}

/// Result of processing one subject for one locale.
#[derive(Debug)]
pub enum SubjectOutcome {
    /// Content was written; `completed` is set when the progress flag flipped.
    Stored { completed: bool },
    Empty,
    Invalid(ResponseError),
    GenerationFailed(GenerationError),
    StoreFailed(String),
}

impl SubjectOutcome {
    fn result_label(&self) -> &'static str {
        match self {
            Self::Stored { .. } => "ok",
            Self::Empty => "empty",
            Self::Invalid(err) => err.result_label(),
            Self::GenerationFailed(_) => "error",
            Self::StoreFailed(_) => "store_error",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("generation service is unavailable: {0}")]
    Unavailable(GenerationError),
    #[error("subject query failed: {0}")]
    Subjects(#[from] SubjectError),
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
}

pub struct ContentPipeline {
    database: Database,
    client: OllamaClient,
    throttle: Arc<Throttle>,
    locales: Arc<LocaleTable>,
    clock: Clock,
}

impl ContentPipeline {
    pub fn new(
        database: Database,
        client: OllamaClient,
        throttle: Arc<Throttle>,
        locales: LocaleTable,
        clock: Clock,
    ) -> Self {
        Self {
            database,
            client,
            throttle,
            locales: Arc::new(locales),
            clock,
        }
    }

    /// Fails when the generation service cannot be reached.
    pub async fn probe(&self) -> Result<(), PipelineError> {
        let models = self
            .client
            .health()
            .await
            .map_err(PipelineError::Unavailable)?;

        let model = self.client.model();
        let tagged = format!("{model}:");
        if !models
            .iter()
            .any(|name| name == model || name.starts_with(&tagged))
        {
            warn!(stage = "generation", model = %model, available = ?models, "configured model is not listed by the generation service");
        }
        Ok(())
    }

    /// Runs every work item of the plan to exhaustion.
    pub async fn run(&self, options: &PipelineOptions) -> Result<RunSummary, PipelineError> {
        self.probe().await?;

        let plan = WorkPlan::new(&self.locales, &options.filter);
        let mut summary = RunSummary {
            work_items: plan.total(),
            ..RunSummary::default()
        };

        info!(
            stage = "pipeline",
            kind = %options.kind,
            work_items = plan.total(),
            page_size = options.page_size,
            workers = options.workers,
            force = options.force,
            lenient = options.lenient,
            "starting generation run"
        );

        let worker = SubjectWorker {
            database: self.database.clone(),
            client: self.client.clone(),
            throttle: self.throttle.clone(),
            locales: self.locales.clone(),
            template: Arc::new(PromptTemplate::for_kind(options.kind)),
            tone: Arc::from(options.tone.as_str()),
            lenient: options.lenient,
            clock: self.clock.clone(),
        };

        for item in plan {
            self.drain_item(&worker, &item, options, &mut summary).await?;
        }

        info!(
            stage = "pipeline",
            kind = %options.kind,
            work_items = summary.work_items,
            skipped_items = summary.skipped_items,
            pages = summary.pages,
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            subjects_completed = summary.subjects_completed,
            "generation run finished"
        );
        Ok(summary)
    }

    async fn drain_item(
        &self,
        worker: &SubjectWorker,
        item: &WorkItem,
        options: &PipelineOptions,
        summary: &mut RunSummary,
    ) -> Result<(), PipelineError> {
        let kind = options.kind;
        let locale = Arc::new(item.locale.clone());
        let mut interrupted = None;

        if options.resume {
            let previous = self
                .database
                .checkpoints()
                .fetch(kind, &locale.country_code, &locale.language)
                .await?;
            match previous {
                Some(checkpoint) if checkpoint.is_settled() => {
                    info!(stage = "pipeline", kind = %kind, locale = %locale.tag(), "skipping completed locale");
                    summary.skipped_items += 1;
                    return Ok(());
                }
                Some(checkpoint) if checkpoint.status != CheckpointStatus::Complete => {
                    interrupted = Some(checkpoint);
                }
                _ => {}
            }
        }

        // Counters carry over so failures before the stored cursor keep the item unsettled.
        let mut checkpoint = match interrupted {
            Some(previous) => GenerationCheckpoint {
                status: CheckpointStatus::Running,
                updated_at: self.now(),
                ..previous
            },
            None => GenerationCheckpoint {
                kind,
                country_code: locale.country_code.clone(),
                language: locale.language.clone(),
                status: CheckpointStatus::Running,
                cursor: None,
                processed: 0,
                failed: 0,
                started_at: self.now(),
                updated_at: self.now(),
            },
        };
        let mut after_id = checkpoint.cursor;
        self.database.checkpoints().upsert(&checkpoint).await?;
        info!(stage = "pipeline", kind = %kind, locale = %locale.tag(), after_id = ?after_id, "draining locale");

        loop {
            let query = SubjectPageQuery {
                kind,
                locale: &locale,
                after_id,
                limit: options.page_size,
                include_completed: options.force,
            };
            let page = match self.database.subjects().fetch_page(&query).await {
                Ok(page) => page,
                Err(err) => {
                    error!(stage = "storage", kind = %kind, locale = %locale.tag(), error = %err, "failed to fetch subject page");
                    checkpoint.status = CheckpointStatus::Error;
                    checkpoint.updated_at = self.now();
                    self.database.checkpoints().upsert(&checkpoint).await?;
                    return Err(err.into());
                }
            };

            let Some(last) = page.last() else {
                break;
            };
            after_id = Some(last.id);
            summary.pages += 1;

            for (subject_id, outcome) in worker.process_page(page, &locale, options.workers).await {
                summary.attempted += 1;
                checkpoint.processed += 1;
                match outcome {
                    SubjectOutcome::Stored { completed } => {
                        summary.succeeded += 1;
                        if completed {
                            summary.subjects_completed += 1;
                        }
                    }
                    ref failure => {
                        summary.failed += 1;
                        checkpoint.failed += 1;
                        warn!(
                            stage = "pipeline",
                            kind = %kind,
                            country = %locale.country_code,
                            language = %locale.language,
                            subject = subject_id,
                            result = failure.result_label(),
                            "subject skipped"
                        );
                    }
                }
            }

            checkpoint.cursor = after_id;
            checkpoint.updated_at = self.now();
            self.database.checkpoints().upsert(&checkpoint).await?;
        }

        checkpoint.status = CheckpointStatus::Complete;
        checkpoint.updated_at = self.now();
        self.database.checkpoints().upsert(&checkpoint).await?;
        info!(
            stage = "pipeline",
            kind = %kind,
            locale = %locale.tag(),
            processed = checkpoint.processed,
            failed = checkpoint.failed,
            "locale drained"
        );
        Ok(())
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

/// Everything a worker task needs to handle one subject.
#[derive(Clone)]
struct SubjectWorker {
    database: Database,
    client: OllamaClient,
    throttle: Arc<Throttle>,
    locales: Arc<LocaleTable>,
    template: Arc<PromptTemplate>,
    tone: Arc<str>,
    lenient: bool,
    clock: Clock,
}

impl SubjectWorker {
    /// Processes a page with at most `workers` subjects in flight, returning outcomes in page order.
    async fn process_page(
        &self,
        page: Vec<Subject>,
        locale: &Arc<Locale>,
        workers: usize,
    ) -> Vec<(i64, SubjectOutcome)> {
        let workers = workers.max(1);
        let mut outcomes: Vec<Option<(i64, SubjectOutcome)>> = Vec::new();
        outcomes.resize_with(page.len(), || None);
        let ids: Vec<i64> = page.iter().map(|subject| subject.id).collect();

        let mut tasks = JoinSet::new();
        for (index, subject) in page.into_iter().enumerate() {
            if tasks.len() >= workers {
                if let Some(joined) = tasks.join_next().await {
                    collect(joined, &mut outcomes);
                }
            }
            let worker = self.clone();
            let locale = locale.clone();
            tasks.spawn(async move {
                let id = subject.id;
                (index, id, worker.process(subject, &locale).await)
            });
        }
        while let Some(joined) = tasks.join_next().await {
            collect(joined, &mut outcomes);
        }

        outcomes
            .into_iter()
            .zip(ids)
            .map(|(outcome, id)| {
                outcome.unwrap_or_else(|| {
                    (id, SubjectOutcome::StoreFailed("worker task aborted".to_string()))
                })
            })
            .collect()
    }

    async fn process(&self, subject: Subject, locale: &Locale) -> SubjectOutcome {
        let kind = subject.kind();
        let outcome = self.generate_and_store(&subject, locale).await;
        counter!(
            "generation_requests_total",
            "kind" => kind.as_str(),
            "result" => outcome.result_label()
        )
        .increment(1);

        match &outcome {
            SubjectOutcome::Stored { .. } => {
                info!(stage = "pipeline", kind = %kind, country = %locale.country_code, language = %locale.language, subject = subject.id, label = %subject.label(), "content stored");
            }
            SubjectOutcome::Empty => {
                warn!(stage = "generation", kind = %kind, country = %locale.country_code, language = %locale.language, subject = subject.id, "generation returned empty text");
            }
            SubjectOutcome::Invalid(err) => {
                warn!(stage = "generation", kind = %kind, country = %locale.country_code, language = %locale.language, subject = subject.id, error = %err, "generation returned invalid content");
            }
            SubjectOutcome::GenerationFailed(err) => {
                error!(stage = "generation", kind = %kind, country = %locale.country_code, language = %locale.language, subject = subject.id, error = %err, "generation call failed");
            }
            SubjectOutcome::StoreFailed(err) => {
                error!(stage = "storage", kind = %kind, country = %locale.country_code, language = %locale.language, subject = subject.id, error = %err, "failed to persist content");
            }
        }
        outcome
    }

    async fn generate_and_store(&self, subject: &Subject, locale: &Locale) -> SubjectOutcome {
        let kind = subject.kind();
        let prompt = self.template.build_request(subject, locale, &self.tone);

        self.throttle.acquire().await;
        let started = Instant::now();
        let raw = self.client.generate(&prompt).await;
        histogram!("generation_latency_seconds", "kind" => kind.as_str())
            .record(started.elapsed().as_secs_f64());

        let raw = match raw {
            Ok(raw) => raw,
            Err(err) => return SubjectOutcome::GenerationFailed(err),
        };
        if raw.trim().is_empty() {
            return SubjectOutcome::Empty;
        }

        let result = match extract(&raw) {
            Ok(payload) if self.lenient => payload.into_result(),
            Ok(payload) => match payload.validate() {
                Ok(result) => result,
                Err(err) => return SubjectOutcome::Invalid(err),
            },
            Err(err) => return SubjectOutcome::Invalid(err),
        };

        let record = NewContentRecord {
            kind,
            reference_id: subject.id,
            locale,
            result: &result,
            source: CONTENT_SOURCE,
            model: Some(self.client.model()),
            written_at: self.now(),
        };
        if let Err(err) = self.database.content().upsert(&record).await {
            return SubjectOutcome::StoreFailed(err.to_string());
        }
        counter!("content_records_written_total", "kind" => kind.as_str()).increment(1);

        match self.complete_if_covered(kind, subject.id).await {
            Ok(completed) => SubjectOutcome::Stored { completed },
            Err(err) => {
                // The record is stored; a later run sets the flag once it sees full coverage.
                warn!(stage = "storage", kind = %kind, subject = subject.id, error = %err, "failed to update progress flag");
                SubjectOutcome::Stored { completed: false }
            }
        }
    }

    /// Sets the progress flag once the subject has content for every locale of the table.
    async fn complete_if_covered(&self, kind: SubjectKind, id: i64) -> Result<bool, ProgressError> {
        if !kind.tracks_progress() {
            return Ok(false);
        }

        let stored = self.database.content().locales_for(kind, id).await?;
        let covered = self.locales.locales().iter().all(|locale| {
            stored
                .iter()
                .any(|(country, language)| *country == locale.country_code && *language == locale.language)
        });
        if !covered {
            return Ok(false);
        }

        let flipped = self
            .database
            .subjects()
            .mark_processed(kind, id, self.now())
            .await?;
        if flipped {
            counter!("subjects_completed_total", "kind" => kind.as_str()).increment(1);
        }
        Ok(flipped)
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

#[derive(Debug, thiserror::Error)]
enum ProgressError {
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Subject(#[from] SubjectError),
}

fn collect(
    joined: Result<(usize, i64, SubjectOutcome), tokio::task::JoinError>,
    outcomes: &mut [Option<(i64, SubjectOutcome)>],
) {
    match joined {
        Ok((index, id, outcome)) => outcomes[index] = Some((id, outcome)),
        Err(err) => error!(stage = "pipeline", error = %err, "subject worker panicked"),
    }
}
