//! Vector utilities and dot-product ranking of stored chunks.
//!
//! Chunk vectors are L2-normalized when they are written, and query vectors
//! are normalized by the embedder, so cosine similarity reduces to a plain
//! dot product. Ranking is a stable sort, so equal scores keep the storage
//! order the caller loaded them in.

use crate::envelope::{DocumentHit, Pagination};

/// A persisted chunk vector as read from the ingestion store.
#[derive(Debug, Clone)]
pub struct ChunkVector {
    pub text: String,
    /// Little-endian `f32` bytes.
    pub embedding: Vec<u8>,
    /// Dimensionality recorded next to the blob.
    pub dim: i64,
    pub filename: String,
    pub doc_type: String,
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use query_harness_core::ranking::{blob_to_vec, vec_to_blob};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector. Trailing partial words are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Dot product of two equal-length vectors; `0.0` when the lengths differ.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}

/// Score every chunk against `query`, sort descending and return one page.
///
/// Chunks whose decoded length disagrees with their recorded `dim`, or with
/// the query's dimensionality, are skipped and do not count toward `total`.
/// `limit` is clamped to at least 1 and `offset` to at least 0.
pub fn rank_chunks(
    query: &[f32],
    chunks: Vec<ChunkVector>,
    limit: i64,
    offset: i64,
) -> (Vec<DocumentHit>, Pagination) {
    let limit = limit.max(1);
    let offset = offset.max(0);

    let mut scored: Vec<DocumentHit> = chunks
        .into_iter()
        .filter_map(|chunk| {
            let vec = blob_to_vec(&chunk.embedding);
            if vec.len() as i64 != chunk.dim || vec.len() != query.len() {
                return None;
            }
            Some(DocumentHit {
                score: dot(&vec, query),
                text: chunk.text,
                filename: chunk.filename,
                doc_type: chunk.doc_type,
            })
        })
        .collect();

    // sort_by is stable; ties keep storage order.
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));

    let total = scored.len() as i64;
    let page = scored
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .collect();

    (
        page,
        Pagination {
            limit,
            offset,
            total,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, vec: &[f32]) -> ChunkVector {
        ChunkVector {
            text: text.to_string(),
            embedding: vec_to_blob(vec),
            dim: vec.len() as i64,
            filename: format!("{text}.txt"),
            doc_type: "txt".to_string(),
        }
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_normalize_unit_length() {
        let mut v = vec![3.0f32, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0f32, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_rank_descending_with_dot_scores() {
        let query = [1.0f32, 0.0, 0.0];
        let chunks = vec![
            chunk("low", &[0.0, 1.0, 0.0]),
            chunk("high", &[1.0, 0.0, 0.0]),
            chunk("mid", &[0.6, 0.8, 0.0]),
        ];
        let (hits, page) = rank_chunks(&query, chunks, 10, 0);
        let names: Vec<_> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(names, vec!["high", "mid", "low"]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!((hits[1].score - 0.6).abs() < 1e-6);
        assert!(hits[2].score.abs() < 1e-6);
        assert_eq!(page.total, 3);
    }

    #[test]
    fn test_rank_ties_keep_storage_order() {
        let query = [1.0f32, 0.0];
        let chunks = vec![
            chunk("first", &[0.5, 0.5]),
            chunk("second", &[0.5, -0.5]),
            chunk("third", &[0.5, 0.0]),
        ];
        let (hits, _) = rank_chunks(&query, chunks, 10, 0);
        let names: Vec<_> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_rank_skips_dim_mismatch() {
        let query = [1.0f32, 0.0];
        let mut bad = chunk("bad", &[1.0, 0.0]);
        bad.dim = 3;
        let short = chunk("short", &[1.0]);
        let chunks = vec![bad, short, chunk("ok", &[0.0, 1.0])];
        let (hits, page) = rank_chunks(&query, chunks, 10, 0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "ok");
        assert_eq!(page.total, 1);
    }

    #[test]
    fn test_rank_pagination_window() {
        let query = [1.0f32];
        let chunks: Vec<_> = (0..5)
            .map(|i| chunk(&format!("c{i}"), &[1.0 - i as f32 * 0.1]))
            .collect();
        let (hits, page) = rank_chunks(&query, chunks.clone(), 2, 3);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "c3");
        assert_eq!(page.total, 5);

        let (hits, page) = rank_chunks(&query, chunks, 0, 7);
        assert!(hits.is_empty());
        assert_eq!(page.limit, 1);
        assert_eq!(page.offset, 7);
    }
}
