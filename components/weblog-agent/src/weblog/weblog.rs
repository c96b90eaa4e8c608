// Local crates
use crate::aggregator::{
    aggregator::{Aggregator, MetricsMap},
    dimensions::DimensionEvent,
    histogram::HistogramError,
};
use crate::categorizer::categorizer::{CategoryError, CategoryKind, Categorizer};
use crate::filter::{errors::FilterError, filter::Filter};
use crate::helpers::load_config::{ConfigError, TailerConfig, WebLogConfig};
use crate::metrics::metrics::{COLLECT_DURATION_SECONDS, observe_duration};
use crate::parser::{
    candidates::DEFAULT_CANDIDATES,
    parser::{LogParser, validate_candidates},
    pattern::PatternError,
};
use crate::tailer::{
    models::{TailError, Tailer},
    reader::read_last_line,
};
use crate::worker::{
    control::{StopHandle, WorkerError, WorkerState},
    pipeline::Pipeline,
    worker::Worker,
};

// External crates
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, instrument};

/// Anything that keeps the job from being initialized. Nothing has been
/// started when one of these is returned.
#[derive(Debug, Error)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot read a sample line to learn the log format from")]
    Sample(#[source] TailError),

    #[error("log pattern error")]
    Pattern(#[from] PatternError),

    #[error("filter error")]
    Filter(#[from] FilterError),

    #[error("category error")]
    Category(#[from] CategoryError),

    #[error("histogram error")]
    Histogram(#[from] HistogramError),
}

/// Health check failure. Retryable on the next check.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("cannot open log for tailing")]
    Open(#[source] TailError),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

/// Output of one collection cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Collection {
    pub metrics: MetricsMap,
    pub new_dimensions: Vec<DimensionEvent>,
}

/// One web log job: init, check, collect, cleanup.
#[derive(Debug)]
pub struct WebLog {
    config: WebLogConfig,
    tailer: TailerConfig,
    worker: Worker,
}

impl WebLog {
    /// Validate the configuration, learn or compile the line pattern and
    /// compile every rule. Nothing is started.
    #[instrument(name = "weblog::init", target = "weblog", skip_all, fields(path = %config.path.display()), level = "info")]
    pub async fn init(config: WebLogConfig, tailer: &TailerConfig) -> Result<Self, InitError> {
        config.validate()?;

        let parser = match &config.custom_log_format {
            Some(format) => LogParser::with_pattern(format)?,
            None => {
                let sample = read_last_line(&config.path)
                    .await
                    .map_err(InitError::Sample)?;
                LogParser::learn(&sample, DEFAULT_CANDIDATES)?
            }
        };

        let (filter, url, user) = compile_rules(&config)?;
        let aggregator = Aggregator::new(&config.aggregator_config(), &url, &user)?;

        info!(
            pattern = parser.pattern().name(),
            format = parser.pattern().source(),
            url_categories = config.categories.len(),
            user_categories = config.user_categories.len(),
            "Web log job initialized"
        );

        let pipeline = Pipeline::new(parser, filter, url, user);
        Ok(Self {
            worker: Worker::new(pipeline, aggregator, tailer.channel_capacity),
            config,
            tailer: tailer.clone(),
        })
    }

    /// Compile every configured rule without reading the log.
    pub fn validate(config: &WebLogConfig) -> Result<(), InitError> {
        config.validate()?;
        match &config.custom_log_format {
            Some(format) => {
                LogParser::with_pattern(format)?;
            }
            None => validate_candidates(DEFAULT_CANDIDATES)?,
        }
        let (_, url, user) = compile_rules(config)?;
        Aggregator::new(&config.aggregator_config(), &url, &user)?;
        Ok(())
    }

    /// Open the log and start ingesting. A no-op once running.
    #[instrument(name = "weblog::check", target = "weblog", skip_all, level = "debug")]
    pub async fn check(&mut self) -> Result<(), CheckError> {
        if self.worker.state() == WorkerState::Running {
            return Ok(());
        }

        let tailer = Tailer::open(&self.config.path, self.tailer.options())
            .await
            .map_err(CheckError::Open)?;
        self.worker.start(tailer)?;
        Ok(())
    }

    /// Pause, snapshot, reset the interval, drain new dimensions, resume.
    #[instrument(name = "weblog::collect", target = "weblog", skip_all, level = "trace")]
    pub async fn collect(&mut self) -> Result<Collection, WorkerError> {
        let start = Instant::now();

        let mut paused = self.worker.pause().await?;
        let metrics = paused.snapshot();
        paused.reset_interval();
        let new_dimensions = paused.take_dimension_events();
        paused.unpause();

        observe_duration(&COLLECT_DURATION_SECONDS, start);
        Ok(Collection {
            metrics,
            new_dimensions,
        })
    }

    /// Stop the worker and release the log file.
    pub async fn cleanup(&mut self) {
        self.worker.stop().await;
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.worker.stop_handle()
    }

    pub fn pattern_name(&self) -> &str {
        self.worker.pipeline().parser().pattern().name()
    }

    pub fn pattern_source(&self) -> &str {
        self.worker.pipeline().parser().pattern().source()
    }
}

fn compile_rules(config: &WebLogConfig) -> Result<(Filter, Categorizer, Categorizer), InitError> {
    let filter = Filter::compile(&config.filter)?;
    let url = Categorizer::compile(
        CategoryKind::Url,
        &config.categories,
        CategoryKind::Url.default_field(),
    )?;
    let user = Categorizer::compile(
        CategoryKind::User,
        &config.user_categories,
        &config.user_category_field,
    )?;
    Ok((filter, url, user))
}
