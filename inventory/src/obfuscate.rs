use data_encoding::HEXLOWER;
use sha2::{Digest, Sha256};

/// Derives the opaque public-directory name for a tool.
///
/// All orgs share the root org's public directory, so the stored name mixes
/// the org id into the hash: the same tool name in two orgs never collides,
/// and the name reveals neither. Stable across restarts, not invertible.
pub fn obfuscated_store_name(org_id: &str, name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(org_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(name.as_bytes());
    HEXLOWER.encode(&hasher.finalize())
}
