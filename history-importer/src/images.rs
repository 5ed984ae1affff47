use crate::traits::ImageResolver;
use crate::types::{CanonicalPost, ImageRef, ImageSource, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Points every image at a public URL.
///
/// Archive files are expected to be uploaded under `base_url` with the same
/// layout they have in the archive; remote images are already public. Archive
/// files without known dimensions are inspected, and anything that does not
/// read as an image (videos, missing files) is dropped from its post.
pub struct PublicUrlResolver {
    base_url: String,
    archive_root: Option<PathBuf>,
}

impl PublicUrlResolver {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            archive_root: None,
        }
    }

    pub fn with_archive_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.archive_root = Some(root.into());
        self
    }

    pub fn public_url(&self, path: &Path) -> String {
        let relative = self
            .archive_root
            .as_deref()
            .and_then(|root| path.strip_prefix(root).ok())
            .map(Path::to_path_buf)
            .or_else(|| path.file_name().map(PathBuf::from))
            .unwrap_or_else(|| path.to_path_buf());

        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        format!("{}/{}", self.base_url, segments.join("/"))
    }

    /// Returns false when the image should be dropped.
    async fn resolve_image(&self, image: &mut ImageRef) -> bool {
        if image.src.is_some() {
            return true;
        }
        let src = match &image.source {
            ImageSource::Remote(url) => url.clone(),
            ImageSource::LocalFile(path) => {
                if image.width.is_none() {
                    match image_dimensions(path).await {
                        Some((width, height)) => {
                            info!("Image dimension for {}, {} w x {} h", path.display(), width, height);
                            image.width = Some(width);
                            image.height = Some(height);
                        }
                        None => {
                            warn!("Failed to identify image {}, skipping", path.display());
                            return false;
                        }
                    }
                }
                self.public_url(path)
            }
        };
        debug!("Image {:?} -> {}", image.source, src);
        image.src = Some(src);
        true
    }
}

/// Width and height read from the file header, if it is a known image format.
pub async fn image_dimensions(path: &Path) -> Option<(u32, u32)> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("Cannot read {}: {}", path.display(), e);
            return None;
        }
    };
    let size = imagesize::blob_size(&bytes).ok()?;
    Some((u32::try_from(size.width).ok()?, u32::try_from(size.height).ok()?))
}

#[async_trait]
impl ImageResolver for PublicUrlResolver {
    async fn resolve(&self, posts: Vec<CanonicalPost>) -> Result<Vec<CanonicalPost>> {
        let mut resolved = Vec::with_capacity(posts.len());
        for mut post in posts {
            let had_images = !post.images.is_empty();
            let mut images = Vec::with_capacity(post.images.len());
            for mut image in std::mem::take(&mut post.images) {
                if self.resolve_image(&mut image).await {
                    images.push(image);
                }
            }
            post.images = images;

            if had_images && !post.has_content() {
                info!("Skipping post {}, none of its media is an image", post.id);
                continue;
            }
            resolved.push(post);
        }
        Ok(resolved)
    }
}
