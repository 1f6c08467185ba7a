mod masking;

pub use masking::mask_subject;

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 digest of `data`.
pub fn sha256_hex<D: AsRef<[u8]>>(data: D) -> String {
    format!("{:x}", Sha256::digest(data.as_ref()))
}
