pub mod time_bucket;

pub use time_bucket::{bucket_start_year, group_by_5_years, into_buckets};
