use crate::geocode::{NullGeocoder, ReverseGeocoder};
use crate::parser::{parse_archive_file, sanitize, RawAttachmentItem, RawMedia, RawPlace, RawPost};
use crate::traits::PostSource;
use crate::types::{CanonicalPost, ImageRef, ImporterError, Place, Result};
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, TimeZone};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Links to these are app activity (music, pins, games), not something the user wrote.
const APP_ACTIVITY_MARKERS: [&str; 3] = ["spotify", "pinterest", "/fbapp/"];

/// Reads the posts of a Facebook "download your information" archive.
pub struct ArchiveSource {
    root: PathBuf,
    geocoder: Arc<dyn ReverseGeocoder>,
}

impl ArchiveSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            geocoder: Arc::new(NullGeocoder),
        }
    }

    pub fn with_geocoder(mut self, geocoder: Arc<dyn ReverseGeocoder>) -> Self {
        self.geocoder = geocoder;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read every `posts/*posts*` file. A corrupt file is logged and skipped.
    pub fn read(&self) -> Result<Vec<CanonicalPost>> {
        let posts_dir = self.root.join("posts");
        if !posts_dir.is_dir() {
            return Err(ImporterError::ArchiveNotFound(posts_dir.display().to_string()));
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(&posts_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.contains("posts"))
            })
            .collect();
        files.sort();

        let mut posts = Vec::new();
        for file in files {
            match self.read_file(&file) {
                Ok(file_posts) => {
                    info!("Read {} posts from {}", file_posts.len(), file.display());
                    posts.extend(file_posts);
                }
                Err(e) => {
                    error!("Skipping {}: {}", file.display(), e);
                }
            }
        }

        info!("Read {} posts from archive {}", posts.len(), self.root.display());
        Ok(posts)
    }

    pub fn read_file(&self, file: &Path) -> Result<Vec<CanonicalPost>> {
        let raw = std::fs::read(file)?;
        let raw_posts = parse_archive_file(&file.display().to_string(), &raw)?;

        let mut posts = Vec::with_capacity(raw_posts.len());
        for raw_post in raw_posts {
            let post = match self.convert_post(raw_post) {
                Ok(post) => post,
                Err(e) => {
                    warn!("Skipping record in {}: {}", file.display(), e);
                    continue;
                }
            };
            if post.has_content() {
                info!(
                    "Adding post {}: {} images, {} places, locations: {:?}",
                    post.id,
                    post.images.len(),
                    post.places.len(),
                    post.locations
                );
                posts.push(post);
            } else {
                info!("Skipping empty post {}", post.id);
            }
        }
        Ok(posts)
    }

    fn convert_post(&self, raw: RawPost) -> Result<CanonicalPost> {
        let created_at = local_time(raw.timestamp).ok_or_else(|| ImporterError::MalformedSource {
            path: format!("post {}", raw.timestamp),
            reason: "timestamp out of range".to_string(),
        })?;
        let mut post = CanonicalPost::new(raw.timestamp.to_string(), created_at);

        let mut lines: Vec<String> = raw
            .data
            .iter()
            .filter_map(|d| d.post.as_deref())
            .map(sanitize)
            .collect();
        // photo geocodes in the order they were found, for place address fallback
        let mut geocoded: Vec<String> = Vec::new();

        for item in raw.attachments.iter().flat_map(|a| a.data.iter()) {
            match item {
                RawAttachmentItem { media: Some(media), .. } => {
                    let image = self.convert_media(media, &mut geocoded);
                    post.images.push(image);
                    if lines.is_empty() {
                        if let Some(description) = media.description.as_deref().filter(|d| !d.is_empty()) {
                            // the message lives in the photo description
                            lines.push(sanitize(description));
                        }
                    }
                }
                RawAttachmentItem { place: Some(place), .. } => {
                    let place = convert_place(place, &geocoded);
                    if !post.add_place(place) {
                        warn!("Dropping duplicate place on post {}", post.id);
                    }
                }
                RawAttachmentItem {
                    external_context: Some(context),
                    ..
                } => {
                    if let Some(url) = context.url.as_deref() {
                        if is_app_activity(url) {
                            continue;
                        }
                        let line = match context.name.as_deref() {
                            Some(name) if !name.is_empty() => format!("{} - {}", name, url),
                            _ => url.to_string(),
                        };
                        lines.push(line);
                    }
                }
                _ => {}
            }
        }

        post.locations.extend(geocoded);
        let message = lines.join("\n");
        post.message = (!message.is_empty()).then_some(message);
        post.tags = raw
            .tags
            .map(|tags| tags.into_iter().map(|t| t.into_name()).collect());

        Ok(post)
    }

    fn convert_media(&self, media: &RawMedia, geocoded: &mut Vec<String>) -> ImageRef {
        let mut image = ImageRef::local(self.root.join(&media.uri));
        if let Some(meta) = media.photo_metadata() {
            image.latitude = meta.latitude;
            image.longitude = meta.longitude;
            image.orientation = meta.orientation;
            // the photo's own position is more trustworthy than the app's check-in
            if let Some(location) = self.geocoder.locate(meta.latitude, meta.longitude) {
                geocoded.push(location);
            }
        }
        image
    }
}

#[async_trait]
impl PostSource for ArchiveSource {
    fn source_name(&self) -> String {
        format!("Facebook archive ({})", self.root.display())
    }

    async fn produce(&mut self) -> Result<Vec<CanonicalPost>> {
        self.read()
    }
}

fn convert_place(place: &RawPlace, geocoded: &[String]) -> Place {
    let address = place
        .address
        .as_deref()
        .map(sanitize)
        .filter(|a| !a.is_empty())
        // borrow from the photos
        .or_else(|| geocoded.first().cloned());

    Place {
        name: sanitize(&place.name),
        address,
        latitude: place.coordinate.as_ref().map(|c| c.latitude),
        longitude: place.coordinate.as_ref().map(|c| c.longitude),
        url: None,
    }
}

fn is_app_activity(url: &str) -> bool {
    APP_ACTIVITY_MARKERS.iter().any(|marker| url.contains(marker))
}

fn local_time(timestamp: i64) -> Option<NaiveDateTime> {
    Local
        .timestamp_opt(timestamp, 0)
        .single()
        .map(|dt| dt.naive_local())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_activity_links_are_recognized() {
        assert!(is_app_activity("https://open.spotify.com/track/1"));
        assert!(is_app_activity("https://www.pinterest.com/pin/2"));
        assert!(is_app_activity("https://apps.facebook.com/fbapp/3"));
        assert!(!is_app_activity("https://example.com/article"));
    }

    #[test]
    fn place_address_falls_back_to_first_geocode() {
        let place = RawPlace {
            name: "Caf&eacute; Central".to_string(),
            address: None,
            coordinate: None,
        };
        let geocoded = vec!["Vienna, Austria".to_string(), "Graz, Austria".to_string()];
        let converted = convert_place(&place, &geocoded);
        assert_eq!(converted.name, "Café Central");
        assert_eq!(converted.address.as_deref(), Some("Vienna, Austria"));

        let no_fallback = convert_place(&place, &[]);
        assert_eq!(no_fallback.address, None);
    }
}
