//! Output format identifiers.
//!
//! Only still-image formats can be produced: every emitted blob is an
//! independently compressed frame.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::RecorderError;

/// A recordable output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MimeType {
    #[default]
    Jpeg,
    Webp,
}

impl MimeType {
    pub const fn as_str(self) -> &'static str {
        match self {
            MimeType::Jpeg => "image/jpeg",
            MimeType::Webp => "image/webp",
        }
    }

    /// File extension for blobs of this type.
    pub const fn extension(self) -> &'static str {
        match self {
            MimeType::Jpeg => "jpg",
            MimeType::Webp => "webp",
        }
    }

    /// Whether `mime_type` names a format the recorder can produce.
    ///
    /// Matching is by substring, so parameters such as
    /// `image/jpeg;quality=high` are accepted.
    pub fn is_type_supported(mime_type: &str) -> bool {
        Self::detect(mime_type).is_some()
    }

    fn detect(mime_type: &str) -> Option<Self> {
        if mime_type.contains("image/jpe") {
            Some(MimeType::Jpeg)
        } else if mime_type.contains("image/web") {
            Some(MimeType::Webp)
        } else {
            None
        }
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MimeType {
    type Err = RecorderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::detect(s).ok_or_else(|| RecorderError::UnsupportedMimeType(s.to_string()))
    }
}

impl Serialize for MimeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MimeType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
