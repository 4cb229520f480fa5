//! Chunk naming for multi-part uploads.
//!
//! The first part of an upload is written directly under the destination key,
//! so a single-part upload needs no compose or rename. Every later part carries
//! [`CHUNK_NAME_MARKER`] followed by its part number, e.g.
//! `content/vol-01/UUID.bytes.chunk2`.

/// Hard limit on the number of source objects a single compose request may reference.
pub const COMPOSE_REQUEST_LIMIT: u32 = 32;

/// Separator between the destination key and the part number of an intermediate part.
pub const CHUNK_NAME_MARKER: &str = ".chunk";

/// Name under which part `part_number` (1-based) of `destination` is stored.
pub fn chunk_name(destination: &str, part_number: u32) -> String {
    debug_assert!(part_number >= 1, "part numbers start at 1");
    if part_number == 1 {
        return destination.to_string();
    }
    format!("{destination}{CHUNK_NAME_MARKER}{part_number}")
}

/// Parse the part number out of an intermediate part name.
///
/// Returns `None` for the destination itself and for names that were not
/// produced by [`chunk_name`] for this destination.
pub fn part_number_of(destination: &str, name: &str) -> Option<u32> {
    let suffix = name
        .strip_prefix(destination)?
        .strip_prefix(CHUNK_NAME_MARKER)?;
    if suffix.starts_with('0') || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match suffix.parse::<u32>() {
        Ok(n) if n >= 2 => Some(n),
        _ => None,
    }
}

/// Whether `name` is an intermediate part of `destination` and therefore safe to delete
/// once the upload has finished.
pub fn is_chunk_name(destination: &str, name: &str) -> bool {
    part_number_of(destination, name).is_some()
}
