use crate::types::{CanonicalPost, TimeBucket};
use chrono::Datelike;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Width of a publishing window in years.
pub const BUCKET_YEARS: i32 = 5;

/// First year of the 5-year window holding `year` (2016-2020, 2021-2025, ...).
pub fn bucket_start_year(year: i32) -> i32 {
    (year - 1).div_euclid(BUCKET_YEARS) * BUCKET_YEARS + 1
}

/// Group posts by bucket start year. Posts keep their input order inside a bucket.
pub fn group_by_5_years(posts: Vec<CanonicalPost>) -> BTreeMap<i32, Vec<CanonicalPost>> {
    let mut buckets: BTreeMap<i32, Vec<CanonicalPost>> = BTreeMap::new();
    for post in posts {
        let start = bucket_start_year(post.created_at.year());
        debug!("Post {} ({}) goes to bucket {}", post.id, post.created_at, start);
        buckets.entry(start).or_default().push(post);
    }

    for (start, posts) in &buckets {
        info!("Bucket {}-{}: {} posts", start, start + BUCKET_YEARS - 1, posts.len());
    }
    buckets
}

/// Buckets in ascending year order.
pub fn into_buckets(grouped: BTreeMap<i32, Vec<CanonicalPost>>) -> Vec<TimeBucket> {
    grouped
        .into_iter()
        .map(|(start, posts)| TimeBucket::new(start, posts))
        .collect()
}
