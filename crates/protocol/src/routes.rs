//! Request paths of the upload protocol.

/// Route template for the whole-file form upload.
pub const WHOLE_UPLOAD: &str = "/wholeUpload";
/// Route template for verification.
pub const VERIFY: &str = "/verify/{fingerprint_name}";
/// Route template for part upload.
pub const PART: &str = "/part/{fingerprint_name}/{start}/{part_name}";
/// Route template for merge.
pub const MERGE: &str = "/merge/{fingerprint_name}";

pub fn verify_path(fingerprint_name: &str) -> String {
    format!("/verify/{fingerprint_name}")
}

pub fn part_path(fingerprint_name: &str, start: u64, part_name: &str) -> String {
    format!("/part/{fingerprint_name}/{start}/{part_name}")
}

pub fn merge_path(fingerprint_name: &str) -> String {
    format!("/merge/{fingerprint_name}")
}
