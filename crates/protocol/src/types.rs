use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

/// A part file the server already holds for a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedPart {
    /// Part file name, `{fingerprintName}-{index}`.
    pub file_name: String,
    /// Bytes durably stored for this part.
    pub size: u64,
}

/// Payload of `GET /verify/{fingerprintName}`.
///
/// `uploadedList` is always present while an upload is needed, even when
/// empty, and omitted once the artifact exists.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// `false` when the artifact already exists.
    pub need_upload: bool,
    #[serde(default)]
    pub uploaded_list: Vec<UploadedPart>,
}

impl Serialize for VerifyResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("VerifyResponse", 2)?;
        s.serialize_field("needUpload", &self.need_upload)?;
        if self.need_upload {
            s.serialize_field("uploadedList", &self.uploaded_list)?;
        } else {
            s.skip_field("uploadedList")?;
        }
        s.end()
    }
}

impl VerifyResponse {
    /// The artifact is already stored; nothing to send.
    pub fn already_uploaded() -> Self {
        Self {
            need_upload: false,
            uploaded_list: Vec::new(),
        }
    }

    /// The artifact is missing; `uploaded` lists parts already staged.
    pub fn pending(uploaded: Vec<UploadedPart>) -> Self {
        Self {
            need_upload: true,
            uploaded_list: uploaded,
        }
    }

    /// Returns the stored byte count for `part_name` (0 if absent).
    pub fn stored_size(&self, part_name: &str) -> u64 {
        self.uploaded_list
            .iter()
            .find(|p| p.file_name == part_name)
            .map(|p| p.size)
            .unwrap_or(0)
    }
}

/// Query parameters of `GET /merge/{fingerprintName}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeParams {
    /// Merge stride in bytes; the server default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}
