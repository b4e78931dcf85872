use sha2::{Digest, Sha256};

pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    hex_encode(Sha256::digest(data.as_ref()))
}

/// First `len` hex characters of the SHA-256 of `data`.
pub fn short_digest(data: impl AsRef<[u8]>, len: usize) -> String {
    let mut digest = sha256_hex(data);
    digest.truncate(len);
    digest
}

fn hex_encode(bytes: impl AsRef<[u8]>) -> String {
    bytes
        .as_ref()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
