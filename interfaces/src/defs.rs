use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// A post as every stage of the importer sees it, whatever source it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPost {
    pub id: String,
    /// Local wall-clock time, second precision.
    pub created_at: NaiveDateTime,
    pub message: Option<String>,
    pub images: Vec<ImageRef>,
    pub locations: BTreeSet<String>,
    /// At most one entry; the first place seen in the source wins.
    pub places: Vec<Place>,
    pub tags: Option<Vec<String>>,
}

impl CanonicalPost {
    pub fn new(id: impl Into<String>, created_at: NaiveDateTime) -> Self {
        Self {
            id: id.into(),
            created_at,
            message: None,
            images: Vec::new(),
            locations: BTreeSet::new(),
            places: Vec::new(),
            tags: None,
        }
    }

    /// A post with no message, images, places or tags has nothing to publish.
    pub fn has_content(&self) -> bool {
        self.message.as_deref().is_some_and(|m| !m.is_empty())
            || !self.images.is_empty()
            || !self.places.is_empty()
            || self.tags.as_ref().is_some_and(|t| !t.is_empty())
    }

    /// Keeps only the first place offered.
    pub fn add_place(&mut self, place: Place) -> bool {
        if self.places.is_empty() {
            self.places.push(place);
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageSource {
    LocalFile(PathBuf),
    Remote(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub source: ImageSource,
    /// Public URL, filled in by the image resolver.
    pub src: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub orientation: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl ImageRef {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::with_source(ImageSource::LocalFile(path.into()))
    }

    pub fn remote(url: impl Into<String>) -> Self {
        Self::with_source(ImageSource::Remote(url.into()))
    }

    fn with_source(source: ImageSource) -> Self {
        Self {
            source,
            src: None,
            width: None,
            height: None,
            orientation: None,
            latitude: None,
            longitude: None,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub url: Option<String>,
}

/// Posts of one 5-year publishing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBucket {
    pub start_year: i32,
    pub end_year: i32,
    pub posts: Vec<CanonicalPost>,
}

impl TimeBucket {
    pub fn new(start_year: i32, posts: Vec<CanonicalPost>) -> Self {
        Self {
            start_year,
            end_year: start_year + 4,
            posts,
        }
    }

    pub fn slug(&self, user_slug: &str) -> String {
        format!("{}_{}_{}", user_slug, self.start_year, self.end_year)
    }

    pub fn title(&self) -> String {
        format!(
            "The Years {}-{}, According to Facebook",
            self.start_year, self.end_year
        )
    }
}
