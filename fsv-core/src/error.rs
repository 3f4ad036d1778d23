//! Core error handling module
//!
//! • One enum for every fallible path in the crate (indexer, cache, decode,
//!   upload, configuration)
//! • `CompactString` payloads keep the common variants off the heap
//! • `trace()` emits a single structured `tracing` event and hands back a
//!   reference, so it can sit in a call chain or stand alone
use std::io::{self, ErrorKind};

use compact_str::CompactString;
use thiserror::Error;
use tracing::{Level, event};

/// Convenient alias carrying our unified error type
pub type CoreResult<T> = Result<T, CoreError>;

/// Primary error enumeration (grouped by concern)
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CoreError {
    // ────────────────────────────────────────────────────────────
    // Path resolution
    // ────────────────────────────────────────────────────────────
    #[error("Path not found: {0}")]
    NotFound(CompactString),

    #[error("Unsupported image format: {name}")]
    UnsupportedFormat { name: CompactString },

    // ────────────────────────────────────────────────────────────
    // Decoding
    // ────────────────────────────────────────────────────────────
    #[error("Unreadable image header in {name}: {reason}")]
    UnreadableHeader {
        name:   CompactString,
        reason: CompactString,
    },

    #[error("Decode failed for {name}: {reason}")]
    Decode {
        name:   CompactString,
        reason: CompactString,
    },

    // ────────────────────────────────────────────────────────────
    // File-system
    // ────────────────────────────────────────────────────────────
    #[error("FS operation failed: {kind:?}")]
    FileSystem {
        kind:   ErrorKind,
        #[source]
        source: Box<io::Error>,
    },

    // ────────────────────────────────────────────────────────────
    // Renderer resources
    // ────────────────────────────────────────────────────────────
    #[error("Resource error: {reason}")]
    Resource { reason: CompactString },

    // ────────────────────────────────────────────────────────────
    // Configuration
    // ────────────────────────────────────────────────────────────
    #[error("Invalid config: {field} - {message}")]
    InvalidConfig {
        field:   CompactString,
        message: CompactString,
    },

    /// Operation cancelled by its owner.
    #[error("Operation was cancelled")]
    Cancelled,
}

// ────────────────────────────────────────────────────────────────────────────
// Fast classification helpers
// ────────────────────────────────────────────────────────────────────────────
impl CoreError {
    /// Whether the viewer can keep going (skip the entry, show nothing).
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::UnsupportedFormat { .. }
                | Self::UnreadableHeader { .. }
                | Self::Decode { .. }
                | Self::Cancelled
        )
    }

    #[inline]
    #[must_use]
    pub const fn operation_type(&self) -> &'static str {
        match self {
            Self::NotFound(_)                               => "path_access",

            Self::UnsupportedFormat { .. } |
                    Self::UnreadableHeader { .. } |
                    Self::Decode { .. }                     => "image_decode",

            Self::FileSystem { .. }                         => "file_system",

            Self::Resource { .. }                           => "resource_upload",

            Self::InvalidConfig { .. }                      => "configuration",

            Self::Cancelled                                 => "cancellation",
        }
    }

    #[inline]
    #[must_use]
    const fn error_marker(&self) -> &'static str {
        match self {
            Self::NotFound(_)                => "ERROR_PATH_NOT_FOUND",

            Self::UnsupportedFormat { .. }   => "ERROR_UNSUPPORTED_FORMAT",

            Self::UnreadableHeader { .. }    => "ERROR_UNREADABLE_HEADER",

            Self::Decode { .. }              => "ERROR_DECODE_FAILED",

            Self::FileSystem { .. }          => "ERROR_FILE_SYSTEM",

            Self::Resource { .. }            => "ERROR_RESOURCE",

            Self::InvalidConfig { .. }       => "ERROR_INVALID_CONFIG",

            Self::Cancelled                  => "ERROR_CANCELLED",
        }
    }

    /// Emit one structured event for this error.
    pub fn trace(&self) -> &Self {
        event!(
            Level::WARN,
            marker         = self.error_marker(),
            operation_type = self.operation_type(),
            error          = %self,
            recoverable    = self.is_recoverable(),
        );

        self
    }

    // ────────────────────────────────────────────────────────────
    // Lightweight smart-constructors
    // ────────────────────────────────────────────────────────────
    #[inline]
    #[must_use]
    pub fn not_found(path: &str) -> Self {
        Self::NotFound(CompactString::new(path))
    }

    #[inline]
    #[must_use]
    pub fn unsupported_format(name: &str) -> Self {
        Self::UnsupportedFormat {
            name: CompactString::new(name),
        }
    }

    #[inline]
    #[must_use]
    pub fn unreadable_header(name: &str, reason: impl std::fmt::Display) -> Self {
        Self::UnreadableHeader {
            name:   CompactString::new(name),
            reason: CompactString::new(reason.to_string()),
        }
    }

    #[inline]
    #[must_use]
    pub fn decode(name: &str, reason: impl std::fmt::Display) -> Self {
        Self::Decode {
            name:   CompactString::new(name),
            reason: CompactString::new(reason.to_string()),
        }
    }

    #[inline]
    #[must_use]
    pub fn resource(reason: impl std::fmt::Display) -> Self {
        Self::Resource {
            reason: CompactString::new(reason.to_string()),
        }
    }

    #[inline]
    #[must_use]
    pub fn invalid_config(field: &str, message: &str) -> Self {
        Self::InvalidConfig {
            field:   CompactString::new(field),
            message: CompactString::new(message),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Loss-free mapping from std::io::Error
// ────────────────────────────────────────────────────────────────────────────
impl From<io::Error> for CoreError {
    fn from(err: io::Error) -> Self {
        Self::FileSystem {
            kind:   err.kind(),
            source: Box::new(err),
        }
    }
}
