//! Gossip wire format.
//!
//! A payload is a schema-versioned, order-independent list of `(key, value)`
//! records. Full snapshots and deltas share the format; the receiver cannot
//! tell them apart and does not need to.

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use murmur_core::config::DEFAULT_MAX_PAYLOAD_BYTES;
use murmur_core::{MeshConfig, MurmurError, Result};

/// Current wire schema
pub const WIRE_SCHEMA_VERSION: u16 = 1;

#[derive(Serialize)]
struct WireStateRef<'a, K, V> {
    schema_version: u16,
    records: &'a [(K, V)],
}

#[derive(Deserialize)]
struct WireState<K, V> {
    schema_version: u16,
    records: Vec<(K, V)>,
}

/// Size-limited bincode codec for replicated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireCodec {
    max_payload_bytes: u64,
}

impl WireCodec {
    /// Codec rejecting payloads over `max_payload_bytes`
    pub fn new(max_payload_bytes: u64) -> Self {
        Self { max_payload_bytes }
    }

    /// Codec using the configured payload limit
    pub fn from_config(config: &MeshConfig) -> Self {
        Self::new(config.max_payload_bytes)
    }

    /// Configured payload limit
    pub fn max_payload_bytes(&self) -> u64 {
        self.max_payload_bytes
    }

    fn options(&self) -> impl Options {
        bincode::DefaultOptions::new()
            .with_limit(self.max_payload_bytes)
            .reject_trailing_bytes()
    }

    /// Encode records
    pub fn encode<K, V>(&self, records: &[(K, V)]) -> Result<Vec<u8>>
    where
        K: Serialize,
        V: Serialize,
    {
        let state = WireStateRef {
            schema_version: WIRE_SCHEMA_VERSION,
            records,
        };
        self.options().serialize(&state).map_err(|e| {
            MurmurError::encode(format!("failed to encode {} records: {e}", records.len()))
        })
    }

    /// Decode records. Truncated, oversized, trailing or unknown-schema input
    /// is a [`MurmurError::Decode`].
    pub fn decode<K, V>(&self, bytes: &[u8]) -> Result<Vec<(K, V)>>
    where
        K: DeserializeOwned,
        V: DeserializeOwned,
    {
        let state: WireState<K, V> = self.options().deserialize(bytes).map_err(|e| {
            MurmurError::decode(format!("malformed payload of {} bytes: {e}", bytes.len()))
        })?;
        if state.schema_version != WIRE_SCHEMA_VERSION {
            return Err(MurmurError::decode(format!(
                "unsupported schema version {} (expected {WIRE_SCHEMA_VERSION})",
                state.schema_version
            )));
        }
        Ok(state.records)
    }
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_records_survive_encoding() {
        let codec = WireCodec::default();
        let records = vec![(1u32, "one".to_string()), (2, "two".to_string())];
        let bytes = codec.encode(&records).unwrap();
        let decoded: Vec<(u32, String)> = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, records);
    }

    #[test]
    fn test_empty_input_is_decode_error() {
        let result = WireCodec::default().decode::<u32, String>(&[]);
        assert_matches!(result, Err(MurmurError::Decode { .. }));
    }

    #[test]
    fn test_every_truncation_is_decode_error() {
        let codec = WireCodec::default();
        let bytes = codec
            .encode(&[(7u64, "seven".to_string()), (8, "eight".to_string())])
            .unwrap();
        for cut in 0..bytes.len() {
            let result = codec.decode::<u64, String>(&bytes[..cut]);
            assert_matches!(result, Err(MurmurError::Decode { .. }), "cut at {cut}");
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let codec = WireCodec::default();
        let mut bytes = codec.encode(&[(1u32, 2u32)]).unwrap();
        bytes.push(0);
        assert_matches!(codec.decode::<u32, u32>(&bytes), Err(MurmurError::Decode { .. }));
    }

    #[test]
    fn test_unknown_schema_version_rejected() {
        let bytes = bincode::DefaultOptions::new()
            .serialize(&WireStateRef {
                schema_version: WIRE_SCHEMA_VERSION + 1,
                records: &[(1u32, 2u32)][..],
            })
            .unwrap();
        let err = WireCodec::default().decode::<u32, u32>(&bytes).unwrap_err();
        assert!(err.to_string().contains("schema version"));
    }

    #[test]
    fn test_payload_limit_enforced() {
        let small = WireCodec::new(16);
        let records = vec![(0u32, "x".repeat(64))];
        assert_matches!(small.encode(&records), Err(MurmurError::Encode { .. }));

        let bytes = WireCodec::default().encode(&records).unwrap();
        assert_matches!(small.decode::<u32, String>(&bytes), Err(MurmurError::Decode { .. }));
    }

    #[test]
    fn test_huge_length_prefix_does_not_allocate() {
        // schema 1, then a varint length claiming u64::MAX records
        let mut bytes = vec![1u8, 253];
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());
        assert_matches!(
            WireCodec::default().decode::<u32, u32>(&bytes),
            Err(MurmurError::Decode { .. })
        );
    }
}
