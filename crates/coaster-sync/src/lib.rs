//! Scrape pipeline: walk an ID range, cache images and statistics, persist the tables.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use coaster_adapters::{
    extract_stats, CoasterApi, HttpCoasterApi, StatInsertion, UpstreamError, DEFAULT_API_BASE,
};
use coaster_core::{CoasterId, ImageManifest, PhotographerCredits, StatTables};
use coaster_storage::{write_json_file, EventLog, HttpClientConfig, ImageStore};
use futures::future::{join_all, BoxFuture, FutureExt};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "coaster-sync";

pub const DEFAULT_START_ID: CoasterId = 1;
pub const DEFAULT_END_ID: CoasterId = 20_000;
pub const DEFAULT_BATCH_WIDTH: usize = 10;

pub const IMAGE_MANIFEST_FILE: &str = "image-manifest.json";
pub const PHOTO_CREDITS_FILE: &str = "photographer-credits.json";

pub const SUCCESS_LOG_FILE: &str = "scrape-success.log";
pub const ERROR_LOG_FILE: &str = "scrape-error.log";
pub const DATA_LOG_FILE: &str = "scrape-data.log";

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub api_base: String,
    pub start_id: CoasterId,
    pub end_id: CoasterId,
    pub batch_width: usize,
    pub data_dir: PathBuf,
    pub images_dir: PathBuf,
    pub log_dir: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            start_id: DEFAULT_START_ID,
            end_id: DEFAULT_END_ID,
            batch_width: DEFAULT_BATCH_WIDTH,
            data_dir: PathBuf::from("./data"),
            images_dir: PathBuf::from("./data/images"),
            log_dir: PathBuf::from("./logs"),
            user_agent: "coaster-stats-bot/0.1".to_string(),
            http_timeout_secs: 30,
        }
    }
}

impl ScrapeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: std::env::var("COASTER_API_BASE").unwrap_or(defaults.api_base),
            start_id: std::env::var("COASTER_START_ID")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.start_id),
            end_id: std::env::var("COASTER_END_ID")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.end_id),
            batch_width: std::env::var("COASTER_BATCH_WIDTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.batch_width),
            data_dir: std::env::var("COASTER_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            images_dir: std::env::var("COASTER_IMAGES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.images_dir),
            log_dir: std::env::var("COASTER_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
            user_agent: std::env::var("COASTER_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: std::env::var("COASTER_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
        }
    }

    pub fn id_range(&self) -> RangeInclusive<CoasterId> {
        self.start_id..=self.end_id
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            concurrency: self.batch_width.max(1),
        }
    }
}

/// Accumulated results of one run.
///
/// Each pipeline owns exactly one coaster ID and only reports values for that ID, so the
/// driver can fold outcomes in after every group without any locking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapeStore {
    pub stats: StatTables,
    pub images: ImageManifest,
    pub credits: PhotographerCredits,
}

/// The success, error and data-event logs of one run.
#[derive(Debug)]
pub struct RunLogs {
    pub success: EventLog,
    pub errors: EventLog,
    pub data: EventLog,
}

impl RunLogs {
    pub async fn open(log_dir: &Path, run_id: Uuid) -> Result<Self> {
        Ok(Self {
            success: EventLog::open(log_dir.join(SUCCESS_LOG_FILE), run_id).await?,
            errors: EventLog::open(log_dir.join(ERROR_LOG_FILE), run_id).await?,
            data: EventLog::open(log_dir.join(DATA_LOG_FILE), run_id).await?,
        })
    }

    pub async fn flush(&self) -> Result<()> {
        self.success.flush().await?;
        self.errors.flush().await?;
        self.data.flush().await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageFetchOutcome {
    Downloaded { file_name: String, bytes: usize },
    Skipped { file_name: String },
}

impl ImageFetchOutcome {
    pub fn file_name(&self) -> &str {
        match self {
            ImageFetchOutcome::Downloaded { file_name, .. }
            | ImageFetchOutcome::Skipped { file_name } => file_name,
        }
    }
}

/// Downloads each coaster image at most once into the image store.
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    store: ImageStore,
}

impl ImageFetcher {
    pub fn new(store: ImageStore) -> Self {
        Self { store }
    }

    pub async fn fetch(
        &self,
        api: &dyn CoasterApi,
        id: CoasterId,
        url: &str,
    ) -> Result<ImageFetchOutcome> {
        let file_name = ImageStore::image_file_name(id, url);
        if self.store.cached(&file_name).await?.is_some() {
            return Ok(ImageFetchOutcome::Skipped { file_name });
        }

        let bytes = match api.fetch_image(url).await {
            Ok(bytes) => bytes,
            Err(err) => {
                error!(id, url, error = %err, "image download failed");
                return Err(err).with_context(|| format!("downloading image {url}"));
            }
        };
        let stored = match self.store.store_bytes(&file_name, &bytes).await {
            Ok(stored) => stored,
            Err(err) => {
                let message = format!("{err:#}");
                error!(id, url, error = %message, "image write failed");
                return Err(err);
            }
        };
        Ok(ImageFetchOutcome::Downloaded {
            file_name: stored.file_name,
            bytes: stored.byte_size,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedCoaster {
    pub name: String,
    pub image: ImageFetchOutcome,
    pub credit: Option<String>,
    pub insertions: Vec<StatInsertion>,
}

/// Result of the per-ID pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Scraped(ScrapedCoaster),
    NotFound,
    UpstreamWarning(UpstreamError),
    /// Record lacked a name or a main picture URL.
    Incomplete,
    Failed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScrapeCounters {
    pub attempted: usize,
    pub found: usize,
    pub not_found: usize,
    pub upstream_warnings: usize,
    pub incomplete: usize,
    pub failed: usize,
    pub images_downloaded: usize,
    pub images_skipped: usize,
    pub stat_insertions: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PersistReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrapeRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(flatten)]
    pub counters: ScrapeCounters,
    pub tables_written: usize,
    pub persist_failures: usize,
    pub data_dir: String,
}

pub struct ScrapePipeline {
    config: ScrapeConfig,
    api: Arc<dyn CoasterApi>,
    images: ImageFetcher,
}

impl ScrapePipeline {
    pub fn new(config: ScrapeConfig) -> Result<Self> {
        let api = HttpCoasterApi::new(config.api_base.clone(), config.http_client_config())?;
        Ok(Self::with_api(config, Arc::new(api)))
    }

    pub fn with_api(config: ScrapeConfig, api: Arc<dyn CoasterApi>) -> Self {
        let images = ImageFetcher::new(ImageStore::new(config.images_dir.clone()));
        Self {
            config,
            api,
            images,
        }
    }

    pub async fn run_once(&self) -> Result<ScrapeRunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let logs = RunLogs::open(&self.config.log_dir, run_id)
            .await
            .context("opening run logs")?;

        info!(
            %run_id,
            start = self.config.start_id,
            end = self.config.end_id,
            width = self.config.batch_width,
            "scrape started"
        );

        let mut store = ScrapeStore::default();
        let counters = self.scrape_range(&mut store, &logs).await;
        let report = persist_store(&self.config.data_dir, &store, &logs).await;
        let finished_at = Utc::now();

        let summary = ScrapeRunSummary {
            run_id,
            started_at,
            finished_at,
            counters,
            tables_written: report.written.len(),
            persist_failures: report.failed.len(),
            data_dir: self.config.data_dir.display().to_string(),
        };
        logs.success
            .append(format!(
                "run finished: found={} not_found={} warnings={} incomplete={} failed={} downloaded={} skipped={} files={} persist_failures={}",
                counters.found,
                counters.not_found,
                counters.upstream_warnings,
                counters.incomplete,
                counters.failed,
                counters.images_downloaded,
                counters.images_skipped,
                summary.tables_written,
                summary.persist_failures
            ))
            .await;
        logs.flush().await?;

        info!(
            %run_id,
            found = counters.found,
            failed = counters.failed,
            upstream_warnings = counters.upstream_warnings,
            persist_failures = summary.persist_failures,
            "scrape finished"
        );
        Ok(summary)
    }

    /// Walk the configured range in consecutive groups of `batch_width` IDs.
    ///
    /// Every pipeline of a group runs concurrently; the next group starts only after the whole
    /// group has completed, so at most `batch_width` coasters are in flight.
    pub async fn scrape_range(&self, store: &mut ScrapeStore, logs: &RunLogs) -> ScrapeCounters {
        let ids = self.config.id_range().collect::<Vec<_>>();
        let width = self.config.batch_width.max(1);
        let mut counters = ScrapeCounters::default();

        for group in ids.chunks(width) {
            let outcomes = join_all(group.iter().map(|&id| self.scrape_one(id, logs))).await;
            for (&id, outcome) in group.iter().zip(outcomes) {
                self.commit(store, &mut counters, logs, id, outcome).await;
            }

            if let (Some(first), Some(last)) = (group.first(), group.last()) {
                info!(
                    first,
                    last,
                    found = counters.found,
                    failed = counters.failed,
                    "group done"
                );
            }
        }

        counters
    }

    async fn scrape_one(&self, id: CoasterId, logs: &RunLogs) -> PipelineOutcome {
        let record = match self.api.fetch_coaster(id).await {
            Ok(record) => record,
            Err(err) if err.is_not_found() => return PipelineOutcome::NotFound,
            Err(err) => {
                warn!(id, error = %err, "upstream fetch failed");
                logs.errors.append(format!("coaster {id}: {err}")).await;
                return PipelineOutcome::UpstreamWarning(err);
            }
        };

        let (Some(name), Some(url)) = (record.name(), record.picture_url()) else {
            return PipelineOutcome::Incomplete;
        };

        let image = match self.images.fetch(self.api.as_ref(), id, url).await {
            Ok(image) => image,
            Err(err) => {
                logs.errors
                    .append(format!("coaster {id}: image {url} failed: {err:#}"))
                    .await;
                return PipelineOutcome::Failed(format!("{err:#}"));
            }
        };

        PipelineOutcome::Scraped(ScrapedCoaster {
            name: name.to_string(),
            image,
            credit: record.photo_credit().map(ToString::to_string),
            insertions: extract_stats(&record),
        })
    }

    async fn commit(
        &self,
        store: &mut ScrapeStore,
        counters: &mut ScrapeCounters,
        logs: &RunLogs,
        id: CoasterId,
        outcome: PipelineOutcome,
    ) {
        counters.attempted += 1;
        match outcome {
            PipelineOutcome::NotFound => counters.not_found += 1,
            PipelineOutcome::UpstreamWarning(_) => counters.upstream_warnings += 1,
            PipelineOutcome::Incomplete => {
                counters.found += 1;
                counters.incomplete += 1;
                debug!(id, "record lacks name or picture");
            }
            PipelineOutcome::Failed(reason) => {
                counters.found += 1;
                counters.failed += 1;
                debug!(id, reason = %reason, "pipeline failed");
            }
            PipelineOutcome::Scraped(coaster) => {
                counters.found += 1;
                let action = match &coaster.image {
                    ImageFetchOutcome::Downloaded { bytes, .. } => {
                        counters.images_downloaded += 1;
                        format!("downloaded ({bytes} bytes)")
                    }
                    ImageFetchOutcome::Skipped { .. } => {
                        counters.images_skipped += 1;
                        "skipped".to_string()
                    }
                };
                store
                    .images
                    .insert(id, coaster.image.file_name().to_string());
                if let Some(credit) = coaster.credit {
                    store.credits.insert(id, credit);
                }
                for insertion in coaster.insertions {
                    logs.data
                        .append(format!("coaster {id} {} = {}", insertion.stat, insertion.value))
                        .await;
                    store.stats.insert(insertion.stat, id, insertion.value);
                    counters.stat_insertions += 1;
                }
                logs.success
                    .append(format!(
                        "coaster {id} {:?}: image {} {action}",
                        coaster.name,
                        coaster.image.file_name()
                    ))
                    .await;
                debug!(id, name = %coaster.name, action = %action, "coaster scraped");
            }
        }
    }
}

/// Write every non-empty stat table, the image manifest and the credits.
///
/// All writes are dispatched together; a failed write is logged and does not stop the others.
pub async fn persist_store(data_dir: &Path, store: &ScrapeStore, logs: &RunLogs) -> PersistReport {
    let mut writes: Vec<BoxFuture<'_, (PathBuf, Result<()>)>> = Vec::new();

    for (stat, table) in store.stats.non_empty() {
        let path = data_dir.join(stat.file_name());
        writes.push(
            async move {
                let result = write_json_file(&path, table).await;
                (path, result)
            }
            .boxed(),
        );
    }

    let manifest_path = data_dir.join(IMAGE_MANIFEST_FILE);
    writes.push(
        async move {
            let result = write_json_file(&manifest_path, &store.images).await;
            (manifest_path, result)
        }
        .boxed(),
    );

    let credits_path = data_dir.join(PHOTO_CREDITS_FILE);
    writes.push(
        async move {
            let result = write_json_file(&credits_path, &store.credits).await;
            (credits_path, result)
        }
        .boxed(),
    );

    let mut report = PersistReport::default();
    for (path, result) in join_all(writes).await {
        match result {
            Ok(()) => report.written.push(path),
            Err(err) => {
                let message = format!("{err:#}");
                error!(path = %path.display(), error = %message, "persist failed");
                logs.errors
                    .append(format!("persist {}: {message}", path.display()))
                    .await;
                report.failed.push((path, message));
            }
        }
    }
    report
}

pub async fn run_scrape_once_from_env() -> Result<ScrapeRunSummary> {
    let pipeline = ScrapePipeline::new(ScrapeConfig::from_env())?;
    pipeline.run_once().await
}
