use rand::prelude::*;

/// A random file name for staging writes before they are renamed into place.
pub fn tmp_file_name(prefix: &str) -> String {
    const ALPHANUM_CHARS: &[u8; 52] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .filter_map(|_| ALPHANUM_CHARS.choose(&mut rng))
        .map(|&c| c as char)
        .collect();

    format!("{prefix}{suffix}")
}

/// Round `n` up to the next multiple of `N`.
pub const fn align_to_n<const N: usize>(n: usize) -> usize {
    (n + N - 1) / N * N
}
