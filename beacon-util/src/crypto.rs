use rand::Rng;
use sha2::{Digest as _, Sha256};

/// All letters and digits.
pub const ALPHA_NUM: &[u8; 62] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub fn sha256_hex_digest<D: AsRef<[u8]>>(data: D) -> String {
    let mut hasher = Sha256::default();
    hasher.update(data.as_ref());
    let digest = hasher.finalize();
    format!("{digest:x}")
}

/// Returns a string of length `len` made of characters picked at random
/// from `charset`.
pub fn pseudorandom_string(charset: impl AsRef<[u8]>, len: usize) -> String {
    let charset = charset.as_ref();
    let mut rng = rand::rng();
    (0..len)
        .map(|_| charset[rng.random_range(0..charset.len())] as char)
        .collect()
}
