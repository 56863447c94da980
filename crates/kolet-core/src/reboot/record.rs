//! The reboot-result record printed for the harness

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::KoletError;

/// `{"reboot":"<mark>"}`, emitted exactly once when a reboot request is
/// detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebootRecord {
    pub reboot: String,
}

impl RebootRecord {
    pub fn new(mark: impl Into<String>) -> Self {
        Self {
            reboot: mark.into(),
        }
    }

    /// Compact JSON, no trailing newline.
    pub fn to_json_line(&self) -> Result<String, KoletError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Write the record as one line to `out` and flush.
    pub fn emit(&self, out: &mut impl Write) -> Result<(), KoletError> {
        let line = self.to_json_line()?;
        writeln!(out, "{line}")
            .and_then(|()| out.flush())
            .map_err(|e| KoletError::persistence("<stdout>", e))
    }
}
