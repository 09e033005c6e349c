use std::{
    fs, io,
    path::Path,
    sync::{Mutex, PoisonError},
    time::Instant,
};

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{
    fmt::{self as tracing_fmt, time::UtcTime},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

use contentgen_util::Environment;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to initialize tracing: {0}")]
    Tracing(#[from] TryInitError),
    #[error("failed to initialize prometheus recorder: {0}")]
    Metrics(#[from] BuildError),
    #[error("failed to write metrics file: {0}")]
    Write(#[from] io::Error),
}

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The global recorder can only be installed once per process.
static RECORDER: Mutex<Option<RunMetrics>> = Mutex::new(None);

fn build_git_sha() -> &'static str {
    option_env!("GIT_SHA").unwrap_or("unknown")
}

/// Pretty output in development and tests, JSON lines in production.
pub fn init_tracing(environment: Environment) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = matches!(environment, Environment::Production);

    let pretty_layer = (!json).then(|| {
        tracing_fmt::layer()
            .with_target(false)
            .with_timer(UtcTime::rfc_3339())
            .event_format(tracing_fmt::format().pretty())
    });
    let json_layer = json.then(|| {
        tracing_fmt::layer()
            .with_target(false)
            .with_timer(UtcTime::rfc_3339())
            .json()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(pretty_layer)
        .with(json_layer)
        .try_init()?;

    tracing::info!(stage = "telemetry", env = %environment.as_str(), version = BUILD_VERSION, git_sha = build_git_sha(), "tracing initialized");
    Ok(())
}

/// Metrics collected during one batch run.
#[derive(Clone)]
pub struct RunMetrics {
    handle: PrometheusHandle,
    started: Instant,
}

impl RunMetrics {
    /// Prometheus text exposition with build info and run duration appended.
    pub fn render(&self) -> String {
        let mut body = self.handle.render();
        if !body.is_empty() && !body.ends_with('\n') {
            body.push('\n');
        }

        body.push_str("# TYPE app_build_info gauge\n");
        body.push_str(&format!(
            "app_build_info{{version=\"{}\",git=\"{}\"}} 1\n",
            BUILD_VERSION,
            build_git_sha()
        ));
        body.push_str("# TYPE run_duration_seconds gauge\n");
        body.push_str(&format!(
            "run_duration_seconds {}\n",
            self.started.elapsed().as_secs_f64()
        ));
        body
    }

    /// Writes the exposition atomically so a textfile collector never reads a partial file.
    pub fn write_file(&self, path: &Path) -> Result<(), TelemetryError> {
        let staging = path.with_extension("prom.tmp");
        fs::write(&staging, self.render())?;
        fs::rename(&staging, path)?;
        tracing::info!(stage = "telemetry", path = %path.display(), "metrics written");
        Ok(())
    }
}

pub fn init_metrics() -> Result<RunMetrics, TelemetryError> {
    let mut recorder = RECORDER.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(metrics) = recorder.as_ref() {
        return Ok(metrics.clone());
    }

    let metrics = RunMetrics {
        handle: PrometheusBuilder::new().install_recorder()?,
        started: Instant::now(),
    };
    *recorder = Some(metrics.clone());

    describe_gauge!("app_build_info", "Build metadata for the running binary");
    describe_gauge!("run_duration_seconds", "Seconds since the run started");
    describe_counter!(
        "generation_requests_total",
        "Generation attempts labelled by subject kind and result"
    );
    describe_counter!(
        "content_records_written_total",
        "Content records upserted, labelled by subject kind"
    );
    describe_counter!(
        "subjects_completed_total",
        "Subjects whose progress flag was set after all locales had content"
    );
    describe_counter!("merchant_sync_total", "Merchant detail fetches labelled by result");
    describe_histogram!(
        "generation_latency_seconds",
        "Latency of generation service calls in seconds"
    );
    describe_gauge!(
        "throttle_wait_seconds",
        "Seconds the last caller waited for a rate limit token"
    );

    Ok(metrics)
}
