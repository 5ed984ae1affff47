#![allow(dead_code)]

use async_trait::async_trait;
use history_importer::{ClientConfig, HttpRequest, HttpResponse, HttpTransport, Result};
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

/// The escape Facebook writes for each byte of `text`.
pub fn fb_escape(text: &str) -> String {
    text.bytes().map(|b| format!("\\u00{:02x}", b)).collect()
}

pub const GRAPH_BASE: &str = "http://graph.test";

/// Client config pointing at the scripted Graph host, with a negligible call interval.
pub fn graph_config(cache_dir: &Path) -> ClientConfig {
    ClientConfig {
        base_url: GRAPH_BASE.to_string(),
        cache_dir: cache_dir.to_path_buf(),
        hourly_limit: 3_600_000,
        ..Default::default()
    }
}

struct Rule {
    pattern: String,
    status: u16,
    body: String,
    once: bool,
}

/// Answers requests from a script of `(url substring -> response)` rules and records them.
///
/// Rules are tried in the order they were added; `once` rules are consumed
/// by their first match. Unscripted requests get a 500.
pub struct ScriptedTransport {
    rules: Mutex<Vec<Rule>>,
    pub requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn on(&self, pattern: &str, status: u16, body: impl Into<String>) -> &Self {
        self.push(pattern, status, body.into(), false)
    }

    pub fn once(&self, pattern: &str, status: u16, body: impl Into<String>) -> &Self {
        self.push(pattern, status, body.into(), true)
    }

    fn push(&self, pattern: &str, status: u16, body: String, once: bool) -> &Self {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            status,
            body,
            once,
        });
        self
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests.lock().unwrap().iter().map(|r| r.url.clone()).collect()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.urls().iter().filter(|u| u.contains(pattern)).count()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);

        let mut rules = self.rules.lock().unwrap();
        let Some(idx) = rules.iter().position(|r| url.contains(&r.pattern)) else {
            return Ok(HttpResponse {
                status: 500,
                body: format!("unscripted request {}", url),
            });
        };
        let response = HttpResponse {
            status: rules[idx].status,
            body: rules[idx].body.clone(),
        };
        if rules[idx].once {
            rules.remove(idx);
        }
        Ok(response)
    }
}

#[derive(Debug, Clone)]
pub struct StoredPost {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub mobiledoc: String,
}

/// In-memory Ghost Admin API: slug lookup, delete, create and paged listing.
pub struct FakeGhost {
    pub posts: Mutex<BTreeMap<String, StoredPost>>,
    pub requests: Mutex<Vec<HttpRequest>>,
    failing_slugs: Mutex<HashSet<String>>,
    next_id: Mutex<u32>,
}

pub const GHOST_API: &str = "http://blog.test/ghost/api/v3";

impl FakeGhost {
    pub fn new() -> Self {
        Self {
            posts: Mutex::new(BTreeMap::new()),
            requests: Mutex::new(Vec::new()),
            failing_slugs: Mutex::new(HashSet::new()),
            next_id: Mutex::new(1),
        }
    }

    /// Create requests for `slug` get a 500.
    pub fn fail_creates_for(&self, slug: &str) {
        self.failing_slugs.lock().unwrap().insert(slug.to_string());
    }

    /// Store a post as if another writer had created it.
    pub fn seed(&self, slug: &str, title: &str) -> String {
        self.insert(slug.to_string(), title.to_string(), String::new()).id
    }

    pub fn slugs(&self) -> Vec<String> {
        let mut slugs: Vec<String> = self.posts.lock().unwrap().values().map(|p| p.slug.clone()).collect();
        slugs.sort();
        slugs
    }

    pub fn post_by_slug(&self, slug: &str) -> Option<StoredPost> {
        self.posts.lock().unwrap().values().find(|p| p.slug == slug).cloned()
    }

    pub fn methods(&self) -> Vec<Method> {
        self.requests.lock().unwrap().iter().map(|r| r.method.clone()).collect()
    }

    fn insert(&self, slug: String, title: String, mobiledoc: String) -> StoredPost {
        let mut next_id = self.next_id.lock().unwrap();
        let post = StoredPost {
            id: format!("post{:04}", *next_id),
            slug,
            title,
            mobiledoc,
        };
        *next_id += 1;
        self.posts.lock().unwrap().insert(post.id.clone(), post.clone());
        post
    }

    fn summary(post: &StoredPost) -> Value {
        json!({ "id": post.id, "slug": post.slug, "title": post.title, "authors": [{ "slug": "owner" }] })
    }

    fn respond(status: u16, body: Value) -> HttpResponse {
        HttpResponse {
            status,
            body: body.to_string(),
        }
    }

    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        let url = url::Url::parse(&request.url).unwrap();
        let path = url.path().trim_start_matches("/ghost/api/v3/").trim_end_matches('/').to_string();
        let segments: Vec<&str> = path.split('/').collect();

        match (request.method.as_str(), segments.as_slice()) {
            ("GET", ["admin", "posts", "slug", slug]) => match self.post_by_slug(slug) {
                Some(post) => Self::respond(200, json!({ "posts": [Self::summary(&post)] })),
                None => Self::respond(404, json!({ "errors": [{ "message": "Post not found." }] })),
            },
            ("DELETE", ["admin", "posts", id]) => match self.posts.lock().unwrap().remove(*id) {
                Some(_) => HttpResponse {
                    status: 204,
                    body: String::new(),
                },
                None => Self::respond(404, json!({ "errors": [] })),
            },
            ("POST", ["admin", "posts"]) => {
                let payload: Value = serde_json::from_str(request.body.as_deref().unwrap_or("{}")).unwrap();
                let new_post = &payload["posts"][0];
                let requested = new_post["slug"].as_str().unwrap_or_default().to_string();
                if self.failing_slugs.lock().unwrap().contains(&requested) {
                    return Self::respond(500, json!({ "errors": [{ "message": "boom" }] }));
                }
                // Ghost keeps slugs unique by suffixing
                let mut slug = requested.clone();
                let mut n = 2;
                while self.post_by_slug(&slug).is_some() {
                    slug = format!("{}-{}", requested, n);
                    n += 1;
                }
                let post = self.insert(
                    slug,
                    new_post["title"].as_str().unwrap_or_default().to_string(),
                    new_post["mobiledoc"].as_str().unwrap_or_default().to_string(),
                );
                Self::respond(201, json!({ "posts": [Self::summary(&post)] }))
            }
            ("GET", ["admin", "posts"]) => {
                let param = |name: &str| {
                    url.query_pairs()
                        .find(|(k, _)| k == name)
                        .and_then(|(_, v)| v.parse::<usize>().ok())
                };
                let limit = param("limit").unwrap_or(15);
                let page = param("page").unwrap_or(1);
                let mut all: Vec<StoredPost> = self.posts.lock().unwrap().values().cloned().collect();
                all.sort_by(|a, b| a.title.cmp(&b.title));
                let posts: Vec<Value> = all
                    .iter()
                    .skip((page - 1) * limit)
                    .take(limit)
                    .map(Self::summary)
                    .collect();
                Self::respond(200, json!({ "posts": posts }))
            }
            _ => Self::respond(404, json!({ "errors": [{ "message": "Resource not found" }] })),
        }
    }
}

#[async_trait]
impl HttpTransport for FakeGhost {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self.handle(&request);
        self.requests.lock().unwrap().push(request);
        Ok(response)
    }
}

/// Lay out `<root>/posts/<name>` files the way an export does.
pub fn write_archive(root: &Path, files: &[(&str, &str)]) -> PathBuf {
    let posts_dir = root.join("posts");
    std::fs::create_dir_all(&posts_dir).unwrap();
    for (name, content) in files {
        std::fs::write(posts_dir.join(name), content).unwrap();
    }
    root.to_path_buf()
}

/// A PNG header is all the dimension probe reads.
pub fn png_header(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR".to_vec();
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&[8, 2, 0, 0, 0, 0, 0, 0, 0]);
    bytes
}

pub fn write_media(root: &Path, relative: &str, content: &[u8]) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}
