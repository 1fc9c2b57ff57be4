//! Batch body decoding: optional gzip framing, byte and count caps.

use flate2::read::GzDecoder;
use std::io::Read;

use crate::types::{IngestError, IngestResult, ResultBatch, MAX_BATCH_BYTES, MAX_BATCH_RESULTS};

/// Decode a batch body, inflating gzip frames when the agent compressed
/// the payload. The decoded size is bounded before JSON parsing so a
/// malicious or buggy agent cannot balloon memory.
pub fn decode_batch(body: &[u8], gzip: bool) -> IngestResult<ResultBatch> {
    let decoded: Vec<u8> = if gzip {
        let mut decoder = GzDecoder::new(body).take((MAX_BATCH_BYTES + 1) as u64);
        let mut buffer = Vec::new();
        decoder
            .read_to_end(&mut buffer)
            .map_err(|err| IngestError::Decode(format!("gzip inflate failed: {err}")))?;
        buffer
    } else {
        body.to_vec()
    };

    if decoded.len() > MAX_BATCH_BYTES {
        return Err(IngestError::BatchTooLarge {
            count: 0,
            bytes: decoded.len(),
        });
    }

    let batch: ResultBatch = serde_json::from_slice(&decoded)
        .map_err(|err| IngestError::Decode(format!("malformed batch JSON: {err}")))?;

    if batch.results.len() > MAX_BATCH_RESULTS {
        return Err(IngestError::BatchTooLarge {
            count: batch.results.len(),
            bytes: decoded.len(),
        });
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use uuid::Uuid;

    fn sample_json(count: usize) -> Vec<u8> {
        let results: Vec<serde_json::Value> = (0..count)
            .map(|i| {
                serde_json::json!({
                    "target_id": Uuid::new_v4(),
                    "ip": format!("10.0.0.{}", i % 250 + 1),
                    "timestamp": Utc::now(),
                    "success": true,
                    "latency_ms": 12.5,
                    "packet_loss_pct": 0.0,
                    "rtt_samples": [12.1, 12.9]
                })
            })
            .collect();
        serde_json::to_vec(&serde_json::json!({
            "agent_id": Uuid::new_v4(),
            "results": results
        }))
        .unwrap()
    }

    #[test]
    fn plain_json_round_trips() {
        let body = sample_json(3);
        let batch = decode_batch(&body, false).unwrap();
        assert_eq!(batch.results.len(), 3);
        assert!(batch.results[0].success);
    }

    #[test]
    fn gzip_bodies_are_inflated() {
        let body = sample_json(2);
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&body).unwrap();
        let compressed = encoder.finish().unwrap();

        let batch = decode_batch(&compressed, true).unwrap();
        assert_eq!(batch.results.len(), 2);
    }

    #[test]
    fn oversize_result_count_is_a_distinct_error() {
        let body = serde_json::to_vec(&serde_json::json!({
            "agent_id": Uuid::new_v4(),
            "results": (0..MAX_BATCH_RESULTS + 1).map(|_| serde_json::json!({
                "target_id": Uuid::new_v4(),
                "ip": "10.0.0.1",
                "timestamp": Utc::now(),
                "success": false,
                "latency_ms": null,
            })).collect::<Vec<_>>()
        }))
        .unwrap();

        // either the byte cap or the count cap trips, both map to the same
        // distinct error the agent keys its retry-smaller logic on
        assert!(matches!(
            decode_batch(&body, false),
            Err(IngestError::BatchTooLarge { .. })
        ));
    }

    #[test]
    fn garbage_gzip_is_a_decode_error() {
        let err = decode_batch(b"definitely not gzip", true).unwrap_err();
        assert!(matches!(err, IngestError::Decode(_)));
    }

    #[test]
    fn garbage_json_is_a_decode_error() {
        let err = decode_batch(b"{not json", false).unwrap_err();
        assert!(matches!(err, IngestError::Decode(_)));
    }
}
