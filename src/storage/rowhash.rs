use siphasher::sip::SipHasher13;
use std::hash::Hasher;

use crate::model::Entity;

/// Computes a deterministic SipHash64 over the provided row bytes.
pub fn row_hash64(bytes: &[u8]) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    hasher.write(bytes);
    hasher.finish()
}

/// Hex content hash of an entity, ignoring bookkeeping properties.
///
/// This is the value stamped into the `hash` property of read copies and
/// recomputed during live-state validation.
pub fn content_hash(entity: &Entity) -> String {
    let bytes = entity.without_volatile().canonical_bytes();
    hex::encode(row_hash64(&bytes).to_be_bytes())
}
