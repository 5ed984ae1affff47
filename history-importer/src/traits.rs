use crate::render::RenderModel;
use crate::types::{CanonicalPost, Result};
use async_trait::async_trait;

/// Anything that can produce canonical posts (export archive, Graph API, ...)
#[async_trait]
pub trait PostSource: Send {
    /// Human-readable name for this source
    fn source_name(&self) -> String;

    /// Read every post the source has. Posts without content are already dropped.
    async fn produce(&mut self) -> Result<Vec<CanonicalPost>>;
}

/// Gives every image a public `src` URL (and dimensions where it can).
#[async_trait]
pub trait ImageResolver: Send + Sync {
    async fn resolve(&self, posts: Vec<CanonicalPost>) -> Result<Vec<CanonicalPost>>;
}

/// Supplies the credential for the destination admin API.
pub trait AdminTokenProvider: Send + Sync {
    fn token(&self) -> Result<String>;
}

/// Turns the render model of one bucket into the destination document body.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, model: &RenderModel) -> Result<String>;
}

/// A token minted outside the importer.
pub struct StaticAdminToken(pub String);

impl AdminTokenProvider for StaticAdminToken {
    fn token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}
