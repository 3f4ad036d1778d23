pub mod error;
pub use error::{CoreError, CoreResult};

pub mod config;
pub use config::Config;

pub mod logging;
pub use logging::{LoggerBuilder, LoggerConfig};

pub mod tasks {
    pub mod job;
    pub use job::{JobHandle, spawn_job};
}

pub mod fs {
    pub mod vfs;
    pub use vfs::{EntryInfo, FileSystem, ReadSeek, TargetKind};

    pub mod local;
    pub use local::LocalFileSystem;

    pub mod memory;
    pub use memory::MemoryFileSystem;

    pub mod indexer;
    pub use indexer::{ImageIndexer, SettleWatch};
}

pub mod image {
    pub mod format;
    pub use format::{ImageHeader, PixelLayout, Rect, Region, SourceFormat};

    pub mod surface;
    pub use surface::Surface;

    pub mod codec;
    pub use codec::{ImageCodec, ImageDecoder};

    pub mod standard;
    pub use standard::StandardCodec;
}

pub mod render {
    pub mod resource;
    pub use resource::{ResourceId, ResourceUploader, TextureRef};

    pub mod software;
    pub use software::SoftwareRenderer;
}

pub mod cache {
    pub mod stats;
    pub use stats::{CacheStats, CacheStatsSnapshot};

    pub mod decode_task;
    pub use decode_task::{DecodeStatus, DecodeTask, PreparedDecode, RegionFeed};

    pub mod texture_cache;
    pub use texture_cache::TextureCache;
}

pub mod navigator;
pub use navigator::Navigator;

#[cfg(test)]
pub(crate) mod test_support;
