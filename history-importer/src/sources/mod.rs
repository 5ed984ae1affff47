pub mod archive;
pub mod graph_api;

pub use archive::ArchiveSource;
pub use graph_api::{GraphApiSource, PostMeta};
