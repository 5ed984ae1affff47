pub mod types;
pub mod transport;
pub mod cache;
pub mod fetcher;
pub mod parser;
pub mod geocode;
pub mod traits;
pub mod sources;
pub mod aggregators;
pub mod render;
pub mod images;
pub mod publisher;
pub mod admin_token;
pub mod pipeline;

pub use types::*;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use fetcher::{exchange_long_lived_token, CachedFetcher, GraphRequest, TokenPool};
pub use geocode::{CityTableGeocoder, NullGeocoder, ReverseGeocoder};
pub use traits::{AdminTokenProvider, ImageResolver, PostSource, StaticAdminToken, TemplateRenderer};
pub use sources::{ArchiveSource, GraphApiSource};
pub use render::MobiledocRenderer;
pub use images::PublicUrlResolver;
pub use publisher::GhostPublisher;
pub use admin_token::GhostAdminKey;
pub use pipeline::{ImportPipeline, PipelineBuilder, PipelineReport};
