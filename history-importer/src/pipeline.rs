use crate::aggregators::{group_by_5_years, into_buckets};
use crate::publisher::GhostPublisher;
use crate::traits::{ImageResolver, PostSource};
use crate::types::{ImporterError, LogConfig, Result};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// Outcome of one import run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineReport {
    pub posts: usize,
    /// Start years of the buckets that were published.
    pub published: Vec<i32>,
    /// Start year and error of every bucket that failed.
    pub failed: Vec<(i32, String)>,
}

impl PipelineReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct PipelineBuilder {
    source: Option<Box<dyn PostSource>>,
    resolver: Option<Box<dyn ImageResolver>>,
    publisher: Option<GhostPublisher>,
}

impl PipelineBuilder {
    /// Installs the log subscriber described by `log`.
    pub fn new(log: LogConfig) -> Self {
        log.init();
        Self {
            source: None,
            resolver: None,
            publisher: None,
        }
    }

    pub fn source(mut self, source: Box<dyn PostSource>) -> Self {
        info!("Using source: {}", source.source_name());
        self.source = Some(source);
        self
    }

    pub fn resolver(mut self, resolver: Box<dyn ImageResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn publisher(mut self, publisher: GhostPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn build(self) -> Result<ImportPipeline> {
        let missing = |what: &str| ImporterError::General(format!("pipeline has no {}", what));
        Ok(ImportPipeline {
            source: self.source.ok_or_else(|| missing("source"))?,
            resolver: self.resolver.ok_or_else(|| missing("image resolver"))?,
            publisher: self.publisher.ok_or_else(|| missing("publisher"))?,
        })
    }
}

/// Source -> image resolution -> 5-year buckets -> publish.
pub struct ImportPipeline {
    source: Box<dyn PostSource>,
    resolver: Box<dyn ImageResolver>,
    publisher: GhostPublisher,
}

impl ImportPipeline {
    /// Source failures abort the run; a failing bucket is logged and the rest still publish.
    pub async fn run(&mut self) -> Result<PipelineReport> {
        let span = info_span!("import", run_id = %Uuid::new_v4());
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&mut self) -> Result<PipelineReport> {
        info!("Reading posts from {}", self.source.source_name());
        let posts = self.source.produce().await?;
        let posts = self.resolver.resolve(posts).await?;
        let mut report = PipelineReport {
            posts: posts.len(),
            ..Default::default()
        };

        let buckets = into_buckets(group_by_5_years(posts));
        info!("Publishing {} posts in {} buckets", report.posts, buckets.len());

        for bucket in &buckets {
            match self.publisher.publish(bucket).await {
                Ok(()) => report.published.push(bucket.start_year),
                Err(e) => {
                    error!("Failed to publish {}-{}: {}", bucket.start_year, bucket.end_year, e);
                    report.failed.push((bucket.start_year, e.to_string()));
                }
            }
        }

        info!(
            "Import finished: {} published, {} failed",
            report.published.len(),
            report.failed.len()
        );
        Ok(report)
    }
}
