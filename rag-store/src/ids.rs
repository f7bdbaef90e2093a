use uuid::Uuid;

/// Deterministic UUIDv5 from an arbitrary string id.
pub fn stable_uuid(id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, id.as_bytes())
}

/// Id of an index entry. Re-ingesting the same text from the same source at
/// the same position yields the same id, so inserts behave as upserts.
pub fn entry_id(source: &str, chunk_index: usize, text: &str) -> String {
    stable_uuid(&format!("{source}\u{1f}{chunk_index}\u{1f}{text}")).to_string()
}
