//! Wire protocol types for the chunkdrop resumable upload protocol.
//!
//! Every JSON response uses the [`ApiResponse`] envelope. The application
//! `code` is independent of the HTTP status so that protocol outcomes
//! (e.g. "merge failed") can be told apart from transport failures.

pub mod envelope;
pub mod naming;
pub mod routes;
pub mod types;

pub use envelope::ApiResponse;
pub use naming::{
    NamingError, artifact_name, parse_part_index, part_name, validate_component,
    validate_part_name,
};
pub use types::{MergeParams, UploadedPart, VerifyResponse};

/// Application code for a successful operation.
pub const CODE_OK: i32 = 200;

/// Application code for a failed operation.
pub const CODE_FAIL: i32 = 1;
