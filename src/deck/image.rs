use std::fmt;
use std::fs;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const DATA_URI_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";
const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum CardImageError {
    #[error("failed to read image file {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("image file is empty: {path}")]
    Empty { path: String },
    #[error("malformed data uri: {message}")]
    MalformedDataUri { message: String },
}

/// Image bytes attached to a card slot.
///
/// The bytes are opaque; `media_type` is only carried along so the image can be
/// handed back to a renderer. In snapshots the image is written as a
/// `data:<media type>;base64,<payload>` string.
#[derive(Clone, PartialEq, Eq)]
pub struct CardImage {
    media_type: String,
    bytes: Vec<u8>,
}

impl CardImage {
    pub fn new(media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            bytes,
        }
    }

    /// Reads a user-selected file, sniffing the media type from its contents.
    pub fn from_file(path: &Path) -> Result<Self, CardImageError> {
        let bytes = fs::read(path).map_err(|source| CardImageError::Read {
            path: path.display().to_string(),
            source,
        })?;
        if bytes.is_empty() {
            return Err(CardImageError::Empty {
                path: path.display().to_string(),
            });
        }
        Ok(Self::from_bytes(bytes))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let media_type = image::guess_format(&bytes)
            .map(|format| format.to_mime_type().to_string())
            .unwrap_or_else(|_| FALLBACK_MEDIA_TYPE.to_string());
        Self { media_type, bytes }
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_data_uri(&self) -> String {
        format!(
            "{DATA_URI_PREFIX}{}{BASE64_MARKER}{}",
            self.media_type,
            BASE64.encode(&self.bytes)
        )
    }

    pub fn from_data_uri(value: &str) -> Result<Self, CardImageError> {
        let rest = value
            .strip_prefix(DATA_URI_PREFIX)
            .ok_or_else(|| CardImageError::MalformedDataUri {
                message: "missing data: prefix".to_string(),
            })?;
        let (media_type, payload) = rest.split_once(BASE64_MARKER).ok_or_else(|| {
            CardImageError::MalformedDataUri {
                message: "only base64 payloads are supported".to_string(),
            }
        })?;
        let bytes = BASE64
            .decode(payload)
            .map_err(|err| CardImageError::MalformedDataUri {
                message: err.to_string(),
            })?;
        let media_type = if media_type.is_empty() {
            FALLBACK_MEDIA_TYPE
        } else {
            media_type
        };
        Ok(Self::new(media_type, bytes))
    }
}

impl fmt::Debug for CardImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardImage")
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Serialize for CardImage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_data_uri())
    }
}

impl<'de> Deserialize<'de> for CardImage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::from_data_uri(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn from_bytes_sniffs_png_media_type() {
        let image = CardImage::from_bytes(PNG_MAGIC.to_vec());
        assert_eq!(image.media_type(), "image/png");
    }

    #[test]
    fn from_bytes_falls_back_for_unknown_content() {
        let image = CardImage::from_bytes(b"not an image".to_vec());
        assert_eq!(image.media_type(), FALLBACK_MEDIA_TYPE);
    }

    #[test]
    fn data_uri_matches_browser_format() {
        let image = CardImage::new("image/webp", b"abc".to_vec());
        assert_eq!(image.to_data_uri(), "data:image/webp;base64,YWJj");
    }

    #[test]
    fn from_data_uri_decodes_payload() {
        let image = CardImage::from_data_uri("data:image/jpeg;base64,YWJj").expect("valid uri");
        assert_eq!(image.media_type(), "image/jpeg");
        assert_eq!(image.bytes(), b"abc");
    }

    #[test]
    fn from_data_uri_rejects_plain_paths() {
        let err = CardImage::from_data_uri("/heathenlocke_deck_cover.webp").unwrap_err();
        assert!(matches!(err, CardImageError::MalformedDataUri { .. }));
    }

    #[test]
    fn from_file_rejects_empty_files() {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        let err = CardImage::from_file(file.path()).unwrap_err();
        assert!(matches!(err, CardImageError::Empty { .. }));
    }

    #[test]
    fn debug_output_hides_payload() {
        let image = CardImage::new("image/png", vec![0; 4096]);
        let rendered = format!("{image:?}");
        assert!(rendered.contains("len: 4096"));
    }
}
