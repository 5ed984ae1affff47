use crate::render::build_render_model;
use crate::traits::{AdminTokenProvider, TemplateRenderer};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::types::{ImporterError, PublishConfig, Result, TimeBucket};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// What the admin API tells us about an existing post.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PostSummary {
    pub id: String,
    pub slug: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<AuthorSummary>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthorSummary {
    pub slug: String,
}

#[derive(Debug, Deserialize)]
struct PostsEnvelope {
    #[serde(default)]
    posts: Vec<PostSummary>,
}

/// Publishes one document per bucket to the Ghost Admin API, replacing earlier copies.
pub struct GhostPublisher {
    transport: Arc<dyn HttpTransport>,
    config: PublishConfig,
    tokens: Arc<dyn AdminTokenProvider>,
    renderer: Box<dyn TemplateRenderer>,
}

impl GhostPublisher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        config: PublishConfig,
        tokens: Arc<dyn AdminTokenProvider>,
        renderer: Box<dyn TemplateRenderer>,
    ) -> Self {
        Self {
            transport,
            config,
            tokens,
            renderer,
        }
    }

    pub fn config(&self) -> &PublishConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_url.trim_end_matches('/'), path)
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let token = self.tokens.token()?;
        let request = request.with_header("Authorization", format!("Ghost {}", token));
        self.transport.send(request).await
    }

    /// Id of the live post with this slug, if there is one.
    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<String>> {
        let url = self.endpoint(&format!("admin/posts/slug/{}/", slug));
        let response = self.send(HttpRequest::get(url)).await?;

        match response.status {
            200 => {
                let envelope: PostsEnvelope = serde_json::from_str(&response.body)?;
                Ok(envelope.posts.into_iter().next().map(|p| p.id))
            }
            404 => Ok(None),
            status => Err(ImporterError::Publish {
                slug: slug.to_string(),
                status,
                body: response.body,
            }),
        }
    }

    pub async fn delete(&self, slug: &str, id: &str) -> Result<()> {
        let url = self.endpoint(&format!("admin/posts/{}/", id));
        let response = self.send(HttpRequest::delete(url)).await?;
        if !response.is_success() {
            error!("Failed to clean up post {} ({}): {}", slug, id, response.status);
            return Err(ImporterError::Publish {
                slug: slug.to_string(),
                status: response.status,
                body: response.body,
            });
        }
        info!("Deleted previous post {} ({})", slug, id);
        Ok(())
    }

    pub async fn create(&self, slug: &str, title: &str, mobiledoc: &str) -> Result<PostSummary> {
        let payload = json!({
            "posts": [{ "slug": slug, "title": title, "mobiledoc": mobiledoc }]
        });
        let request = HttpRequest::post(self.endpoint("admin/posts/"), serde_json::to_string(&payload)?);
        let response = self.send(request).await?;

        if response.status == 409 {
            warn!("Slug {} already taken", slug);
            return Err(ImporterError::PublishConflict { slug: slug.to_string() });
        }
        if !response.is_success() {
            error!("Failed to create post {}: {} {}\n{}", slug, response.status, response.body, mobiledoc);
            return Err(ImporterError::Publish {
                slug: slug.to_string(),
                status: response.status,
                body: response.body,
            });
        }

        let created = serde_json::from_str::<PostsEnvelope>(&response.body)?
            .posts
            .into_iter()
            .next()
            .ok_or_else(|| ImporterError::General(format!("Create of {} returned no post", slug)))?;
        // Ghost renames the slug when another writer got there first
        if created.slug != slug {
            warn!("Post {} was created as {}", slug, created.slug);
            return Err(ImporterError::PublishConflict { slug: slug.to_string() });
        }

        info!("Created post {} ({})", created.slug, created.id);
        Ok(created)
    }

    /// Render the bucket and replace whatever is published under its slug.
    pub async fn publish(&self, bucket: &TimeBucket) -> Result<()> {
        let slug = bucket.slug(&self.config.user_slug);
        let title = bucket.title();
        info!("Publishing {} with {} posts", slug, bucket.posts.len());

        let model = build_render_model(&bucket.posts, self.config.images_per_row, self.config.max_width);
        let mobiledoc = self.renderer.render(&model)?;

        if let Some(id) = self.find_by_slug(&slug).await? {
            self.delete(&slug, &id).await?;
        }
        self.create(&slug, &title, &mobiledoc).await?;
        Ok(())
    }

    /// Every post on the site by slug. `max_pages == 0` reads all pages.
    pub async fn list_posts(&self, max_pages: usize) -> Result<BTreeMap<String, PostSummary>> {
        let mut by_slug = BTreeMap::new();
        let mut page = 1;

        while max_pages == 0 || page <= max_pages {
            let url = self.endpoint(&format!(
                "admin/posts?order=title%20asc&limit={}&page={}",
                self.config.list_page_size, page
            ));
            let response = self.send(HttpRequest::get(url)).await?;
            if response.status != 200 {
                error!("Page request {} failed: {}", page, response.status);
                break;
            }

            let envelope: PostsEnvelope = serde_json::from_str(&response.body)?;
            if envelope.posts.is_empty() {
                break;
            }
            for post in envelope.posts {
                let authors: Vec<&str> = post.authors.iter().map(|a| a.slug.as_str()).collect();
                info!(
                    "Post {} {}: {} by {}",
                    post.id,
                    post.slug,
                    post.title.as_deref().unwrap_or(""),
                    authors.join(",")
                );
                by_slug.insert(post.slug.clone(), post);
            }
            page += 1;
        }

        info!("Fetched {} pages and {} posts", page - 1, by_slug.len());
        Ok(by_slug)
    }
}
