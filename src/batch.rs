//! Batch orchestration: assets × providers on a bounded worker pool.

use crate::config::{BatchConfig, PipelineConfig};
use crate::credentials::CredentialStore;
use crate::error::{Result, StockMetaError};
use crate::pipeline::Pipeline;
use crate::prompt::PromptContext;
use crate::provider::MetadataProvider;
use crate::providers::build_provider;
use crate::types::{AssetContent, MediaType, MetadataRequest, MetadataResult, ProviderKind, TaskResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};

/// Upper bound on concurrent tasks.
pub const MAX_WORKERS: usize = 5;

/// One asset in a batch submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchAsset {
    pub filename: String,
    /// Base64, a data URL, or plain text when `media_type` is text.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,
}

/// A batch request: every asset is analyzed by every listed service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSubmission {
    pub assets: Vec<BatchAsset>,
    pub services: Vec<ProviderKind>,
    /// Extra context appended to every prompt.
    #[serde(default)]
    pub custom_prompt: String,
}

impl BatchSubmission {
    /// Parses a submission from JSON.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Results grouped by filename.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Per-provider results for each filename, in completion order.
    pub results: BTreeMap<String, Vec<TaskResult>>,
    pub total_assets: usize,
    pub total_analyses: usize,
    pub submitted: usize,
    pub completed: usize,
}

impl BatchOutcome {
    /// Groups task results by filename, keeping their order.
    pub fn from_results(total_assets: usize, submitted: usize, results: Vec<TaskResult>) -> Self {
        let completed = results.len();
        let mut grouped: BTreeMap<String, Vec<TaskResult>> = BTreeMap::new();
        for result in results {
            grouped.entry(result.filename.clone()).or_default().push(result);
        }
        Self {
            results: grouped,
            total_assets,
            total_analyses: completed,
            submitted,
            completed,
        }
    }

    /// Number of successful analyses.
    pub fn succeeded(&self) -> usize {
        self.results
            .values()
            .flatten()
            .filter(|r| r.result.success)
            .count()
    }
}

/// Pause taken after every `every` completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub every: usize,
    pub pause: Duration,
}

impl Pacing {
    /// No pausing.
    pub fn disabled() -> Self {
        Self {
            every: 0,
            pause: Duration::ZERO,
        }
    }

    fn is_due(&self, completed: usize) -> bool {
        self.every > 0 && !self.pause.is_zero() && completed % self.every == 0
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            every: 5,
            pause: Duration::from_secs(1),
        }
    }
}

/// Bounded pool of spawned tasks with completion pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    width: usize,
    pacing: Pacing,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(3, Pacing::default())
    }
}

impl WorkerPool {
    /// Creates a pool; `width` is clamped to `1..=MAX_WORKERS`.
    pub fn new(width: usize, pacing: Pacing) -> Self {
        Self {
            width: width.clamp(1, MAX_WORKERS),
            pacing,
        }
    }

    /// Creates a pool from the batch section of the config.
    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(
            config.workers,
            Pacing {
                every: config.pacing_interval,
                pause: Duration::from_millis(config.pacing_pause_ms),
            },
        )
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn pacing(&self) -> Pacing {
        self.pacing
    }

    /// Runs every job and returns outputs in completion order.
    ///
    /// A job that panics is replaced by `on_panic(index)`, where `index` is
    /// its position in `jobs`. The worker that completes a paced job sleeps
    /// while still holding its slot.
    pub async fn run<T, Fut, P>(&self, jobs: Vec<Fut>, on_panic: P) -> Vec<T>
    where
        T: Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        P: Fn(usize) -> T,
    {
        let semaphore = Arc::new(Semaphore::new(self.width));
        let log: Arc<Mutex<Vec<T>>> = Arc::new(Mutex::new(Vec::with_capacity(jobs.len())));

        let mut handles = Vec::with_capacity(jobs.len());
        for job in jobs {
            let semaphore = Arc::clone(&semaphore);
            let log = Arc::clone(&log);
            let pacing = self.pacing;

            handles.push(tokio::spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await.ok();
                let output = job.await;

                let completed = {
                    let mut log = log.lock().await;
                    log.push(output);
                    log.len()
                };

                if pacing.is_due(completed) {
                    tracing::debug!(completed, pause_ms = pacing.pause.as_millis() as u64, "pacing pause");
                    tokio::time::sleep(pacing.pause).await;
                }
            }));
        }

        for (index, handle) in handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                tracing::error!(index, error = %e, "batch task aborted");
                log.lock().await.push(on_panic(index));
            }
        }

        let mut log = log.lock().await;
        std::mem::take(&mut *log)
    }
}

/// Runs batch submissions against configured providers.
pub struct BatchRunner {
    credentials: Arc<dyn CredentialStore>,
    pipeline: Arc<Pipeline>,
    pool: WorkerPool,
    prompt: PromptContext,
}

impl BatchRunner {
    /// Creates a runner over a credential store and configuration.
    pub fn new(credentials: Arc<dyn CredentialStore>, config: PipelineConfig) -> Self {
        Self {
            pool: WorkerPool::from_config(&config.batch),
            pipeline: Arc::new(Pipeline::new(config)),
            credentials,
            prompt: PromptContext::new(),
        }
    }

    /// Sets the prompt every task starts from.
    ///
    /// A submission's non-blank `custom_prompt` replaces the context's
    /// additional context; its system prompt is always kept.
    pub fn with_prompt(mut self, prompt: PromptContext) -> Self {
        self.prompt = prompt;
        self
    }

    /// Replaces the pipeline.
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Arc::new(pipeline);
        self
    }

    /// Replaces the worker pool.
    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn prompt(&self) -> &PromptContext {
        &self.prompt
    }

    /// Analyzes every asset with every service.
    ///
    /// Only an empty submission is an error. Tasks that cannot start
    /// (undecodable content, missing or malformed credential) are resolved
    /// at once without taking a worker slot.
    pub async fn run(&self, submission: BatchSubmission) -> Result<BatchOutcome> {
        let assets = submission
            .assets
            .into_iter()
            .map(|asset| {
                let content = AssetContent::decode(&asset.content, asset.media_type);
                (asset.filename, content)
            })
            .collect();
        self.execute(assets, submission.services, &submission.custom_prompt)
            .await
    }

    /// Like [`run`](Self::run) for content that is already decoded.
    pub async fn run_contents(
        &self,
        assets: Vec<(String, AssetContent)>,
        services: Vec<ProviderKind>,
        custom_prompt: &str,
    ) -> Result<BatchOutcome> {
        let assets = assets
            .into_iter()
            .map(|(filename, content)| (filename, Ok(content)))
            .collect();
        self.execute(assets, services, custom_prompt).await
    }

    async fn execute(
        &self,
        assets: Vec<(String, Result<AssetContent>)>,
        requested: Vec<ProviderKind>,
        custom_prompt: &str,
    ) -> Result<BatchOutcome> {
        if assets.is_empty() {
            return Err(StockMetaError::InvalidInput("No assets provided".into()));
        }

        let mut services: Vec<ProviderKind> = Vec::with_capacity(requested.len());
        for kind in requested {
            if !services.contains(&kind) {
                services.push(kind);
            }
        }
        if services.is_empty() {
            return Err(StockMetaError::InvalidInput("No services selected".into()));
        }

        let start = Instant::now();
        let prompt = if custom_prompt.trim().is_empty() {
            self.prompt.clone()
        } else {
            self.prompt.clone().with_context(custom_prompt)
        };

        // Resolved once per service; the error text is reused for every asset.
        let mut providers: BTreeMap<ProviderKind, std::result::Result<(Arc<dyn MetadataProvider>, String), String>> =
            BTreeMap::new();
        for kind in &services {
            let provider = match self.credentials.credential(*kind) {
                None => Err(StockMetaError::NotConfigured(*kind).to_string()),
                Some(credential) => build_provider(&credential, self.pipeline.config())
                    .map(|provider| (provider, credential.model().to_string()))
                    .map_err(|e| e.to_string()),
            };
            providers.insert(*kind, provider);
        }

        let total_assets = assets.len();
        let submitted = total_assets * services.len();
        let mut resolved = Vec::new();
        let mut tasks: Vec<(String, ProviderKind)> = Vec::new();
        let mut jobs = Vec::new();

        for (filename, content) in assets {
            for kind in &services {
                let content = match &content {
                    Ok(content) => content,
                    Err(e) => {
                        resolved.push(TaskResult {
                            filename: filename.clone(),
                            service: *kind,
                            result: MetadataResult::failure(e.to_string()),
                        });
                        continue;
                    }
                };
                let (provider, model) = match &providers[kind] {
                    Ok((provider, model)) => (Arc::clone(provider), model.clone()),
                    Err(message) => {
                        resolved.push(TaskResult {
                            filename: filename.clone(),
                            service: *kind,
                            result: MetadataResult::failure(message.clone()),
                        });
                        continue;
                    }
                };

                let request = prompt.apply(
                    MetadataRequest::new(filename.clone(), content.clone(), *kind).with_model(model),
                );

                tasks.push((filename.clone(), *kind));
                jobs.push(run_task(Arc::clone(&self.pipeline), provider, request));
            }
        }

        tracing::info!(
            assets = total_assets,
            services = services.len(),
            queued = jobs.len(),
            resolved = resolved.len(),
            workers = self.pool.width(),
            "batch started"
        );

        let completed = self
            .pool
            .run(jobs, |index| {
                let (filename, service) = tasks[index].clone();
                TaskResult {
                    filename,
                    service,
                    result: MetadataResult::failure("Analysis task aborted unexpectedly"),
                }
            })
            .await;

        resolved.extend(completed);
        let outcome = BatchOutcome::from_results(total_assets, submitted, resolved);

        tracing::info!(
            completed = outcome.completed,
            succeeded = outcome.succeeded(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "batch finished"
        );
        Ok(outcome)
    }
}

async fn run_task(
    pipeline: Arc<Pipeline>,
    provider: Arc<dyn MetadataProvider>,
    request: MetadataRequest,
) -> TaskResult {
    let filename = request.filename.clone();
    let service = request.provider;
    let result = pipeline.analyze(provider.as_ref(), request).await;
    TaskResult {
        filename,
        service,
        result,
    }
}
