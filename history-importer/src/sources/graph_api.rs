use crate::fetcher::{CachedFetcher, GraphRequest};
use crate::parser::sanitize;
use crate::traits::PostSource;
use crate::types::{CanonicalPost, ImageRef, Place, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Post id, creation time and message, before attachments are fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct PostMeta {
    pub id: String,
    pub created_at: NaiveDateTime,
    pub message: Option<String>,
}

/// Downloads the user's posts and their attachments from the Graph API.
pub struct GraphApiSource {
    fetcher: CachedFetcher,
    max_pages: usize,
    page_size: u32,
}

impl GraphApiSource {
    pub fn new(fetcher: CachedFetcher) -> Self {
        Self {
            fetcher,
            max_pages: 0,
            page_size: 100,
        }
    }

    /// `max_pages == 0` reads until the API runs out of pages.
    pub fn with_paging(mut self, max_pages: usize, page_size: u32) -> Self {
        self.max_pages = max_pages;
        self.page_size = page_size;
        self
    }

    pub fn fetcher(&self) -> &CachedFetcher {
        &self.fetcher
    }

    /// Enumerate the posts (no attachments).
    pub async fn get_posts_meta(&mut self, max_pages: usize, page_size: u32) -> Result<Vec<PostMeta>> {
        let mut metas = Vec::new();

        let me = match self.fetcher.call(&GraphRequest::new("me"), false).await? {
            Some(me) => me,
            None => {
                warn!("Could not read the current user, no posts fetched");
                return Ok(metas);
            }
        };
        let name = me.get("name").and_then(Value::as_str).unwrap_or("unknown user");
        info!("Fetching posts for {}", name);

        let mut page = GraphRequest::new("me/posts").with_param("limit", page_size);
        let mut pages = 0;
        while max_pages == 0 || pages < max_pages {
            let result = self.fetcher.call(&page, true).await?;
            let posts_page = match result.map(serde_json::from_value::<PostsPage>) {
                Some(Ok(posts_page)) if !posts_page.data.is_empty() => posts_page,
                Some(Err(e)) => {
                    warn!("Unexpected page shape for {}: {}", page.signature(), e);
                    break;
                }
                _ => {
                    warn!("Empty page result, probably done: {}", page.signature());
                    break;
                }
            };

            for post in posts_page.data {
                match post.into_meta() {
                    Some(meta) => {
                        info!("Post {} : {} {:?}", meta.id, meta.created_at, meta.message);
                        metas.push(meta);
                    }
                    None => warn!("Skipping post with unreadable created_time"),
                }
            }
            pages += 1;

            let Some(next_url) = posts_page.paging.and_then(|p| p.next) else {
                break;
            };
            let next_page = GraphRequest::from_url(&next_url)?;
            if next_page.signature() == page.signature() {
                warn!("Next page repeats {}, stopping", page.signature());
                break;
            }
            page = next_page;
        }

        info!("Fetched {} posts in {} pages", metas.len(), pages);
        Ok(metas)
    }

    /// Posts with their attachments, in the order the API listed them.
    pub async fn get_posts(&mut self, max_pages: usize, page_size: u32) -> Result<Vec<CanonicalPost>> {
        let metas = self.get_posts_meta(max_pages, page_size).await?;
        let mut posts = Vec::with_capacity(metas.len());

        for meta in metas {
            info!("Getting attachments for post {}", meta.id);
            let request = GraphRequest::new(format!("{}/attachments", meta.id));
            let attachments = match self.fetcher.call(&request, true).await? {
                Some(value) => serde_json::from_value::<AttachmentPage>(value)
                    .map(|page| page.data)
                    .unwrap_or_else(|e| {
                        warn!("Unexpected attachments for post {}: {}", meta.id, e);
                        Vec::new()
                    }),
                None => Vec::new(),
            };

            let mut post = CanonicalPost::new(meta.id, meta.created_at);
            post.message = meta.message;
            for attachment in attachments {
                add_attachment(&mut post, attachment);
            }
            debug!("  Images: {:?}", post.images);

            if post.has_content() {
                posts.push(post);
            } else {
                info!("Skipping empty post {}", post.id);
            }
        }

        Ok(posts)
    }
}

#[async_trait]
impl PostSource for GraphApiSource {
    fn source_name(&self) -> String {
        "Facebook Graph API".to_string()
    }

    async fn produce(&mut self) -> Result<Vec<CanonicalPost>> {
        let (max_pages, page_size) = (self.max_pages, self.page_size);
        self.get_posts(max_pages, page_size).await
    }
}

fn add_attachment(post: &mut CanonicalPost, attachment: GraphAttachment) {
    match attachment.kind.as_deref() {
        Some("photo") | Some("cover_photo") => {
            post.images.extend(attachment.media.and_then(GraphMedia::into_image));
        }
        Some("map") => {
            post.images.extend(attachment.media.and_then(GraphMedia::into_image));
            if let Some(title) = attachment.title.as_deref().map(sanitize) {
                post.locations.insert(title.clone());
                post.add_place(Place {
                    name: title,
                    address: None,
                    latitude: None,
                    longitude: None,
                    url: attachment.url,
                });
            }
        }
        Some("album") => {
            let subattachments = attachment.subattachments.map(|s| s.data).unwrap_or_default();
            for sub in subattachments {
                post.images.extend(sub.media.and_then(GraphMedia::into_image));
            }
        }
        other => debug!("Ignoring attachment type {:?}", other),
    }
}

#[derive(Debug, Deserialize)]
struct PostsPage {
    #[serde(default)]
    data: Vec<GraphPost>,
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphPost {
    id: String,
    created_time: String,
    message: Option<String>,
}

impl GraphPost {
    fn into_meta(self) -> Option<PostMeta> {
        let created_at = parse_created_time(&self.created_time)?;
        Some(PostMeta {
            id: self.id,
            created_at,
            message: self.message.map(|m| sanitize(&m)).filter(|m| !m.is_empty()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct AttachmentPage {
    #[serde(default)]
    data: Vec<GraphAttachment>,
}

#[derive(Debug, Deserialize)]
struct GraphAttachment {
    #[serde(rename = "type")]
    kind: Option<String>,
    media: Option<GraphMedia>,
    title: Option<String>,
    url: Option<String>,
    subattachments: Option<AttachmentPage>,
}

#[derive(Debug, Deserialize)]
struct GraphMedia {
    image: Option<GraphImage>,
}

impl GraphMedia {
    fn into_image(self) -> Option<ImageRef> {
        let image = self.image?;
        let mut image_ref = ImageRef::remote(image.src);
        image_ref.width = image.width;
        image_ref.height = image.height;
        Some(image_ref)
    }
}

#[derive(Debug, Deserialize)]
struct GraphImage {
    src: String,
    width: Option<u32>,
    height: Option<u32>,
}

/// Graph timestamps look like `2019-03-01T08:15:00+0000`; keep their wall clock.
fn parse_created_time(value: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z")
        .ok()
        .map(|dt| dt.naive_local())
}
