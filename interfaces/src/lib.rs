pub mod defs;

pub use defs::{CanonicalPost, ImageRef, ImageSource, Place, TimeBucket};
