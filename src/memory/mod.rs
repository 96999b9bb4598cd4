pub mod events;
pub mod maintenance;
pub mod projects;
pub mod search;
pub mod stats;
pub mod store;
pub mod types;

/// Encode an f32 vector as little-endian bytes, the layout sqlite-vec reads.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode little-endian f32 bytes. Trailing bytes that do not form a whole float are ignored.
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
