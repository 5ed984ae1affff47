use crate::types::{ImporterError, Result};
use once_cell::sync::Lazy;
use regex::bytes::{Captures, Regex};
use serde::Deserialize;
use std::borrow::Cow;
use tracing::{debug, warn};

// Facebook writes non-ASCII bytes of UTF-8 text as `\u00XX` escapes. Only
// bytes >= 0x80 are touched; genuine ASCII escapes stay for the JSON parser.
static BAD_ESCAPE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\\u00[89a-fA-F][0-9a-fA-F])+").unwrap());

const ESCAPE_LEN: usize = 6;

/// Turn mis-encoded `\u00XX` escapes back into the raw bytes they stand for.
///
/// Only escape runs that spell valid UTF-8 are replaced; a stray escape such as a
/// real `\u00e9` code point is left for the JSON parser. Idempotent: the output
/// never contains a run that decodes differently on a second pass.
pub fn repair_escapes(raw: &[u8]) -> Cow<'_, [u8]> {
    BAD_ESCAPE_RUN.replace_all(raw, |caps: &Captures| decode_run(&caps[0]))
}

fn decode_run(run: &[u8]) -> Vec<u8> {
    let bytes: Vec<u8> = run
        .chunks(ESCAPE_LEN)
        .map(|escape| {
            let hex = std::str::from_utf8(&escape[4..]).unwrap_or("3f");
            u8::from_str_radix(hex, 16).unwrap_or(b'?')
        })
        .collect();

    let mut out = Vec::with_capacity(run.len());
    let mut done = 0;
    while done < bytes.len() {
        let rest = &bytes[done..];
        match std::str::from_utf8(rest) {
            Ok(_) => {
                out.extend_from_slice(rest);
                break;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                let invalid = e.error_len().unwrap_or(rest.len() - valid);
                out.extend_from_slice(&rest[..valid]);
                // keep the escapes that do not form a character
                let from = (done + valid) * ESCAPE_LEN;
                out.extend_from_slice(&run[from..from + invalid * ESCAPE_LEN]);
                done += valid + invalid;
            }
        }
    }
    out
}

/// HTML-entity decode and drop double quotes.
pub fn sanitize(text: &str) -> String {
    html_escape::decode_html_entities(text).replace('"', "")
}

/// Repair and decode one export file.
pub fn parse_archive_file(path: &str, raw: &[u8]) -> Result<Vec<RawPost>> {
    let repaired = repair_escapes(raw);
    let text = std::str::from_utf8(&repaired).map_err(|e| ImporterError::MalformedSource {
        path: path.to_string(),
        reason: format!("invalid UTF-8 after repair: {}", e),
    })?;

    let records: Vec<serde_json::Value> =
        serde_json::from_str(text).map_err(|e| ImporterError::MalformedSource {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

    let total = records.len();
    let posts: Vec<RawPost> = records
        .into_iter()
        .enumerate()
        .filter_map(|(idx, record)| match serde_json::from_value::<RawPost>(record) {
            Ok(post) => Some(post),
            Err(e) => {
                warn!("Skipping record {} in {}: {}", idx, path, e);
                None
            }
        })
        .collect();

    debug!("Parsed {} of {} raw posts from {}", posts.len(), total, path);
    Ok(posts)
}

#[derive(Debug, Deserialize)]
pub struct RawPost {
    pub timestamp: i64,
    #[serde(default)]
    pub data: Vec<RawPostData>,
    #[serde(default)]
    pub attachments: Vec<RawAttachment>,
    #[serde(default)]
    pub tags: Option<Vec<RawTag>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawPostData {
    pub post: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawAttachment {
    #[serde(default)]
    pub data: Vec<RawAttachmentItem>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawAttachmentItem {
    pub media: Option<RawMedia>,
    pub place: Option<RawPlace>,
    pub external_context: Option<RawExternalContext>,
}

#[derive(Debug, Deserialize)]
pub struct RawMedia {
    pub uri: String,
    pub description: Option<String>,
    pub media_metadata: Option<RawMediaMetadata>,
}

impl RawMedia {
    pub fn photo_metadata(&self) -> Option<&RawPhotoMetadata> {
        self.media_metadata.as_ref()?.photo_metadata.as_ref()
    }
}

#[derive(Debug, Deserialize)]
pub struct RawMediaMetadata {
    pub photo_metadata: Option<RawPhotoMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct RawPhotoMetadata {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub orientation: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RawPlace {
    pub name: String,
    pub address: Option<String>,
    pub coordinate: Option<RawCoordinate>,
}

#[derive(Debug, Deserialize)]
pub struct RawCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize)]
pub struct RawExternalContext {
    pub name: Option<String>,
    pub url: Option<String>,
}

/// Older exports list tags as names, newer ones as objects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawTag {
    Name(String),
    Person { name: String },
}

impl RawTag {
    pub fn into_name(self) -> String {
        match self {
            RawTag::Name(name) | RawTag::Person { name } => name,
        }
    }
}
