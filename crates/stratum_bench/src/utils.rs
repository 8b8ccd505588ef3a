//! Benchmark utilities.

use rand::Rng;
use stratum_env::{Env, EnvExt};

/// Generate random data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` random offsets at which a `size`-byte read fits
/// inside a file of `file_len` bytes.
pub fn random_offsets(count: usize, file_len: usize, size: usize) -> Vec<u64> {
    let mut rng = rand::thread_rng();
    let span = file_len.saturating_sub(size).max(1);
    (0..count).map(|_| rng.gen_range(0..span) as u64).collect()
}

/// Write a file of `len` random bytes and return its contents.
pub fn prepare_file(env: &dyn Env, fname: &str, len: usize) -> Vec<u8> {
    let data = random_data(len);
    env.write_string_to_file(&data, fname, false)
        .expect("Failed to write benchmark file");
    data
}
