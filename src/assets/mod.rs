// src/assets/mod.rs
// Asset tables, the byte cache and request streaming

pub mod cache;
pub mod catalog;
pub mod stream;

use std::path::PathBuf;

pub use cache::{AssetCache, SweepReport};
pub use catalog::AssetCatalog;
pub use stream::AssetStreamer;

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("unknown texture id {0}")]
    UnknownTexture(u64),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
