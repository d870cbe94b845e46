//! Compact conversation-metadata framing.
//!
//! Conversations carry a small binary metadata blob (member profiles, the
//! current invite tag, the committed expiry) that travels in wire payloads
//! with a hard practical size budget. MessagePack keeps realistic payloads
//! well under the limit.

use crate::types::InboxId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Practical ceiling for an encoded metadata blob.
pub const MAX_ENCODED_LEN: usize = 1024;

/// One member profile embedded in the compact blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub inbox_id: InboxId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// The compact metadata triple: profiles, invite tag, expiry.
///
/// `expires_at` is epoch seconds; absent means no explosion committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactMetadata {
    pub profiles: Vec<ProfileEntry>,
    pub invite_tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

/// Codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encoded metadata is {0} bytes, limit is {MAX_ENCODED_LEN}")]
    TooLarge(usize),

    #[error("encode: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("decode: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Encode metadata, enforcing the size ceiling.
pub fn encode(metadata: &CompactMetadata) -> Result<Vec<u8>, CodecError> {
    let bytes = rmp_serde::to_vec(metadata)?;
    if bytes.len() > MAX_ENCODED_LEN {
        return Err(CodecError::TooLarge(bytes.len()));
    }
    Ok(bytes)
}

/// Decode a metadata blob.
pub fn decode(bytes: &[u8]) -> Result<CompactMetadata, CodecError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CompactMetadata {
        CompactMetadata {
            profiles: vec![
                ProfileEntry {
                    inbox_id: InboxId::from("inbox-a"),
                    name: "Ada".to_string(),
                    avatar_url: Some("https://example.net/a.png".to_string()),
                },
                ProfileEntry {
                    inbox_id: InboxId::from("inbox-b"),
                    name: "Brin".to_string(),
                    avatar_url: None,
                },
            ],
            invite_tag: "t-8Qf3xkDu".to_string(),
            expires_at: Some(1_900_000_000),
        }
    }

    #[test]
    fn round_trip_is_identity() {
        let original = sample();
        let bytes = encode(&original).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn round_trip_without_expiry() {
        let mut metadata = sample();
        metadata.expires_at = None;
        let decoded = decode(&encode(&metadata).unwrap()).unwrap();
        assert_eq!(decoded.expires_at, None);
        assert_eq!(decoded.invite_tag, metadata.invite_tag);
    }

    #[test]
    fn realistic_payload_fits_budget() {
        // A ten-member group with display names and avatar URLs stays
        // comfortably inside the 1 KB ceiling.
        let metadata = CompactMetadata {
            profiles: (0..10)
                .map(|i| ProfileEntry {
                    inbox_id: InboxId::generate(),
                    name: format!("Member {i}"),
                    avatar_url: Some(format!("https://cdn.example.net/avatars/{i}.png")),
                })
                .collect(),
            invite_tag: "t-Zk29fQmwHs".to_string(),
            expires_at: Some(1_900_000_000),
        };
        let bytes = encode(&metadata).unwrap();
        assert!(bytes.len() <= MAX_ENCODED_LEN, "payload {} bytes", bytes.len());
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let metadata = CompactMetadata {
            profiles: (0..40)
                .map(|_| ProfileEntry {
                    inbox_id: InboxId::generate(),
                    name: "x".repeat(64),
                    avatar_url: Some("y".repeat(64)),
                })
                .collect(),
            invite_tag: "t-overflow".to_string(),
            expires_at: None,
        };
        assert!(matches!(encode(&metadata), Err(CodecError::TooLarge(_))));
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(decode(&[0xff, 0x00, 0x13, 0x37]).is_err());
    }
}
