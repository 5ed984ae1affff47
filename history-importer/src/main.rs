use anyhow::Context;
use clap::{Parser, Subcommand};
use history_importer::{
    exchange_long_lived_token, ArchiveSource, CachedFetcher, CityTableGeocoder, ClientConfig,
    GhostPublisher, GraphApiSource, HttpTransport, LogConfig, MobiledocRenderer, PipelineBuilder,
    GhostAdminKey, PublicUrlResolver, PublishConfig, ReqwestTransport,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Republish Facebook history to a Ghost blog, one post per 5 years.
#[derive(Parser, Debug)]
#[command(name = "history-importer", version)]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: tracing::Level,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a "download your information" archive
    Archive {
        download_dir: PathBuf,
        ghost_api_url: String,
        /// Admin API key of a Ghost custom integration, `<id>:<secret>`
        ghost_admin_key: String,
        user_slug: String,
        /// Public URL the archive's media files were uploaded under
        image_base_url: String,
        /// JSON city table used to name photo locations
        #[arg(long, value_name = "FILE")]
        geonames: Option<PathBuf>,
    },
    /// Import through the Graph API
    Api {
        cache_dir: PathBuf,
        app_id: String,
        app_secret: String,
        user_token: String,
        ghost_api_url: String,
        /// Admin API key of a Ghost custom integration, `<id>:<secret>`
        ghost_admin_key: String,
        user_slug: String,
        /// Additional access tokens to rotate through when rate limited
        #[arg(long = "extra-token", value_name = "TOKEN")]
        extra_tokens: Vec<String>,
        #[arg(long, default_value = "")]
        image_base_url: String,
        /// Pages of posts to read, 0 for all
        #[arg(long, default_value = "0")]
        max_pages: usize,
        #[arg(long, default_value = "100")]
        page_size: u32,
        #[arg(long, default_value = "180")]
        hourly_limit: u32,
    },
}

fn publisher(
    transport: Arc<dyn HttpTransport>,
    api_url: String,
    admin_key: &str,
    user_slug: String,
) -> anyhow::Result<GhostPublisher> {
    let key = GhostAdminKey::parse(admin_key).context("reading the Ghost admin key")?;
    let config = PublishConfig {
        api_url,
        user_slug,
        ..Default::default()
    };
    Ok(GhostPublisher::new(
        transport,
        config,
        Arc::new(key),
        Box::new(MobiledocRenderer),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let builder = PipelineBuilder::new(LogConfig {
        level: cli.log_level,
        json: cli.json_logs,
    });

    let builder = match cli.command {
        Command::Archive {
            download_dir,
            ghost_api_url,
            ghost_admin_key,
            user_slug,
            image_base_url,
            geonames,
        } => {
            let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(&ClientConfig::default())?);
            let mut source = ArchiveSource::new(&download_dir);
            if let Some(path) = geonames {
                let geocoder = CityTableGeocoder::from_path(&path)
                    .with_context(|| format!("loading city table {}", path.display()))?;
                source = source.with_geocoder(Arc::new(geocoder));
            }

            builder
                .source(Box::new(source))
                .resolver(Box::new(
                    PublicUrlResolver::new(image_base_url).with_archive_root(&download_dir),
                ))
                .publisher(publisher(transport, ghost_api_url, &ghost_admin_key, user_slug)?)
        }
        Command::Api {
            cache_dir,
            app_id,
            app_secret,
            user_token,
            ghost_api_url,
            ghost_admin_key,
            user_slug,
            extra_tokens,
            image_base_url,
            max_pages,
            page_size,
            hourly_limit,
        } => {
            let config = ClientConfig {
                cache_dir,
                hourly_limit,
                ..Default::default()
            };
            let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(&config)?);

            let token = exchange_long_lived_token(transport.as_ref(), &config, &app_id, &app_secret, &user_token)
                .await
                .context("exchanging the user token")?;
            info!("Got long lived token, {} extra tokens", extra_tokens.len());
            let tokens = std::iter::once(token).chain(extra_tokens).collect();

            let fetcher = CachedFetcher::new(transport.clone(), config, tokens);
            let source = GraphApiSource::new(fetcher).with_paging(max_pages, page_size);

            builder
                .source(Box::new(source))
                .resolver(Box::new(PublicUrlResolver::new(image_base_url)))
                .publisher(publisher(transport, ghost_api_url, &ghost_admin_key, user_slug)?)
        }
    };

    let mut pipeline = builder.build()?;
    let report = pipeline.run().await?;

    for (start_year, reason) in &report.failed {
        error!("Bucket {} failed: {}", start_year, reason);
    }
    info!(
        "Imported {} posts into {} buckets",
        report.posts,
        report.published.len()
    );
    Ok(())
}
