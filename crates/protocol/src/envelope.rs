use serde::{Deserialize, Serialize};

use crate::{CODE_FAIL, CODE_OK};

/// Envelope for every JSON response: `{code, msg, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    #[serde(default)]
    pub msg: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    /// Creates a successful response carrying `data`.
    pub fn ok(msg: impl Into<String>, data: T) -> Self {
        Self {
            code: CODE_OK,
            msg: msg.into(),
            data,
        }
    }

    /// Creates a failed response carrying `data`.
    pub fn fail(msg: impl Into<String>, data: T) -> Self {
        Self {
            code: CODE_FAIL,
            msg: msg.into(),
            data,
        }
    }

    /// Returns `true` if the application code signals success.
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }

    /// Converts into `Ok(data)` on success, `Err((code, msg))` otherwise.
    pub fn into_result(self) -> Result<T, (i32, String)> {
        if self.is_ok() {
            Ok(self.data)
        } else {
            Err((self.code, self.msg))
        }
    }
}
