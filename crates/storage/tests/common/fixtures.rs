use bytes::Bytes;
use sha2::{Digest, Sha256};

/// Hex SHA-256 of `data`, for comparing large objects without dumping them.
pub fn sha256_hash(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Reproducible pseudo-random content. Parts cut from it differ from one
/// another, so a misordered compose shows up as a digest mismatch.
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut state = seed.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let data: Vec<u8> = (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect();
    Bytes::from(data)
}
