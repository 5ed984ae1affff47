use crate::traits::TemplateRenderer;
use crate::types::{CanonicalPost, Place, Result};
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Everything the template needs to lay out one bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderModel {
    pub posts: Vec<RenderedPost>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedPost {
    /// `YYYY-MM-DD`
    pub date: String,
    pub message: Vec<String>,
    pub has_image: bool,
    pub has_locations: bool,
    /// 1-based position of the post in the bucket.
    pub gallery_idx: usize,
    pub images: Vec<RenderedImage>,
    pub locations: Option<String>,
    pub places: Vec<Place>,
    pub tags: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedImage {
    /// SHA-256 hex of the image URL
    pub filename: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub src: String,
    pub row: usize,
}

/// Scale down to `max_width` keeping the aspect ratio. Unknown sizes pass through.
pub fn resize(width: Option<u32>, height: Option<u32>, max_width: u32) -> (Option<u32>, Option<u32>) {
    match (width, height) {
        (Some(w), Some(h)) if w > max_width && max_width > 0 => {
            let scaled = (h as f64 / (w as f64 / max_width as f64)) as u32;
            (Some(max_width), Some(scaled))
        }
        (Some(w), None) if w > max_width && max_width > 0 => (Some(max_width), None),
        other => other,
    }
}

fn url_filename(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}

pub fn build_render_model(posts: &[CanonicalPost], images_per_row: usize, max_width: u32) -> RenderModel {
    let per_row = images_per_row.max(1);

    let posts = posts
        .iter()
        .enumerate()
        .map(|(idx, post)| {
            let images: Vec<RenderedImage> = post
                .images
                .iter()
                .enumerate()
                // images the resolver could not publish are left out
                .filter_map(|(i, image)| {
                    let src = image.src.as_ref()?;
                    let (width, height) = resize(image.width, image.height, max_width);
                    Some(RenderedImage {
                        filename: url_filename(src),
                        width,
                        height,
                        src: src.clone(),
                        row: i / per_row,
                    })
                })
                .collect();

            let message = post
                .message
                .as_deref()
                .map(|m| {
                    m.replace('"', "")
                        .lines()
                        .filter(|line| !line.trim().is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            let locations = (!post.locations.is_empty())
                .then(|| post.locations.iter().cloned().collect::<Vec<_>>().join(","));

            RenderedPost {
                date: post.created_at.format("%Y-%m-%d").to_string(),
                message,
                has_image: !images.is_empty(),
                has_locations: locations.is_some(),
                gallery_idx: idx + 1,
                images,
                locations,
                places: post.places.clone(),
                tags: post
                    .tags
                    .as_ref()
                    .filter(|t| !t.is_empty())
                    .map(|t| format!("with {}", t.join(", "))),
            }
        })
        .collect();

    RenderModel { posts }
}

/// Ghost mobiledoc holding the whole bucket in a single HTML card.
#[derive(Debug, Default, Clone)]
pub struct MobiledocRenderer;

impl MobiledocRenderer {
    pub fn render_html(&self, model: &RenderModel) -> String {
        let mut html = String::new();
        for post in &model.posts {
            render_post(&mut html, post);
        }
        html
    }
}

impl TemplateRenderer for MobiledocRenderer {
    fn render(&self, model: &RenderModel) -> Result<String> {
        let doc = json!({
            "version": "0.3.1",
            "atoms": [],
            "markups": [],
            "cards": [["html", { "cardName": "html", "html": self.render_html(model) }]],
            "sections": [[10, 0]],
        });
        Ok(serde_json::to_string(&doc)?)
    }
}

fn render_post(html: &mut String, post: &RenderedPost) {
    let text = |s: &str| html_escape::encode_text(s).into_owned();
    let attr = |s: &str| html_escape::encode_double_quoted_attribute(s).into_owned();

    html.push_str("<div class=\"fb-post\">\n");
    let _ = writeln!(html, "<h3 class=\"fb-date\">{}</h3>", post.date);
    for line in &post.message {
        let _ = writeln!(html, "<p>{}</p>", text(line));
    }

    if post.has_image {
        let _ = writeln!(html, "<div class=\"fb-gallery\" id=\"gallery-{}\">", post.gallery_idx);
        let mut current_row = None;
        for image in &post.images {
            if current_row != Some(image.row) {
                if current_row.is_some() {
                    html.push_str("</div>\n");
                }
                html.push_str("<div class=\"fb-gallery-row\">\n");
                current_row = Some(image.row);
            }
            let _ = write!(html, "<figure><img src=\"{}\" data-filename=\"{}\"", attr(&image.src), image.filename);
            if let Some(width) = image.width {
                let _ = write!(html, " width=\"{}\"", width);
            }
            if let Some(height) = image.height {
                let _ = write!(html, " height=\"{}\"", height);
            }
            html.push_str("></figure>\n");
        }
        if current_row.is_some() {
            html.push_str("</div>\n");
        }
        html.push_str("</div>\n");
    }

    if let Some(locations) = post.locations.as_deref() {
        let _ = writeln!(html, "<p class=\"fb-locations\">{}</p>", text(locations));
    }
    for place in &post.places {
        html.push_str("<p class=\"fb-place\">");
        match place.url.as_deref() {
            Some(url) => {
                let _ = write!(html, "<a href=\"{}\">{}</a>", attr(url), text(&place.name));
            }
            None => html.push_str(&text(&place.name)),
        }
        if let Some(address) = place.address.as_deref() {
            let _ = write!(html, " <span class=\"fb-address\">{}</span>", text(address));
        }
        html.push_str("</p>\n");
    }
    if let Some(tags) = post.tags.as_deref() {
        let _ = writeln!(html, "<p class=\"fb-tags\">{}</p>", text(tags));
    }
    html.push_str("</div>\n");
}
