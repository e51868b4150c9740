//! LocalSend v2 wire protocol types.
//!
//! Everything that crosses the network lives here: the multicast
//! announcement codec, the file descriptors exchanged in prepare-upload,
//! the `X-Content-Range` grammar, and the filename sanitiser applied on
//! the receiving side.

pub mod announce;
pub mod range;
pub mod sanitize;
pub mod types;

pub use announce::Announcement;
pub use range::ContentRange;
pub use sanitize::{resolve_destination, sanitized_basename};
pub use types::{
    FileInfo, FileMetadata, PrepareUploadRequest, PrepareUploadResponse, SessionQuery,
    UploadQuery,
};
