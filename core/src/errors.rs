// Copyright 2025 HEM Sp. z o.o.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use thiserror::Error;

use crate::definitions::{HalResultCode, SurfaceId};

/// Failures reported by the headset link. None of them is fatal to the process; the
/// coordinator reflects them through the link state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Link is not ready")]
    NotReady,

    #[error("No headset device present")]
    NoDevice,

    #[error("Permission to access the headset denied")]
    NoPermission,

    #[error("Invalid argument")]
    InvalidArgument,

    #[error("Command not supported by the headset")]
    UnsupportedCommand,

    #[error("Checksum mismatch")]
    ChecksumMismatch,

    #[error("Protocol version mismatch")]
    VersionMismatch,

    #[error("Command id mismatch")]
    IdMismatch,

    #[error("Insufficient memory on the headset")]
    InsufficientMemory,

    #[error("Command code not written")]
    CodeNotWritten,

    #[error("Hardware I/O timed out")]
    Timeout,

    #[error("Response did not match the request")]
    ResponseMismatch,

    #[error("Unknown hardware error")]
    Unknown,
}

impl LinkError {
    /// Maps a non-success HAL code to an error. `Success` maps to `None`.
    pub fn from_code(code: HalResultCode) -> Option<Self> {
        let err = match code {
            HalResultCode::Success => return None,
            HalResultCode::NoDevice => LinkError::NoDevice,
            HalResultCode::NoPermission => LinkError::NoPermission,
            HalResultCode::InvalidArgument => LinkError::InvalidArgument,
            HalResultCode::UnsupportedCommand => LinkError::UnsupportedCommand,
            HalResultCode::ChecksumMismatch => LinkError::ChecksumMismatch,
            HalResultCode::VersionMismatch => LinkError::VersionMismatch,
            HalResultCode::IdMismatch => LinkError::IdMismatch,
            HalResultCode::InsufficientMemory => LinkError::InsufficientMemory,
            HalResultCode::CodeNotWritten => LinkError::CodeNotWritten,
            HalResultCode::Timeout => LinkError::Timeout,
            HalResultCode::ResponseMismatch => LinkError::ResponseMismatch,
            HalResultCode::Unknown => LinkError::Unknown,
        };
        Some(err)
    }

    pub fn check(code: HalResultCode) -> Result<(), Self> {
        match Self::from_code(code) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("Surface {0} is no longer valid")]
    InvalidSurface(SurfaceId),

    #[error("Surface {0} is not presentation capable")]
    NotPresentable(SurfaceId),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RadioError {
    #[error("Permission to read radio state denied")]
    PermissionDenied,

    #[error("Radio query failed: {0}")]
    QueryFailed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HudError {
    #[error("Widget \"{0}\" is already registered")]
    DuplicateWidget(String),

    #[error("Widget \"{0}\" did not create its views during initialization")]
    MissingViews(String),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session is not running")]
    NotRunning,

    #[error("Session is already running")]
    AlreadyRunning,

    #[error("Headset link error: {0}")]
    Link(#[from] LinkError),

    #[error("Host event source unavailable: {0}")]
    EventSource(String),

    #[error("HUD error: {0}")]
    Hud(#[from] HudError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_code_is_not_an_error() {
        assert_eq!(LinkError::from_code(HalResultCode::Success), None);
        assert!(LinkError::check(HalResultCode::Success).is_ok());
    }

    #[test]
    fn failure_codes_keep_their_meaning() {
        assert_eq!(LinkError::check(HalResultCode::ChecksumMismatch), Err(LinkError::ChecksumMismatch));
        assert_eq!(LinkError::check(HalResultCode::CodeNotWritten), Err(LinkError::CodeNotWritten));
        assert_eq!(LinkError::check(HalResultCode::Timeout), Err(LinkError::Timeout));
    }
}
