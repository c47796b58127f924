use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256};

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn sha256_file_hex(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 64 * 1024];
    loop {
        let read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Accepts `sha256:<hex>` (GitHub asset digests) or bare hex.
pub fn parse_sha256_digest(value: &str) -> Result<String> {
    let trimmed = value.trim();
    let hex_part = match trimmed.split_once(':') {
        Some((algo, rest)) if algo.eq_ignore_ascii_case("sha256") => rest,
        Some((algo, _)) => return Err(anyhow!("unsupported digest algorithm '{algo}'")),
        None => trimmed,
    };
    if hex_part.len() != 64 || !hex_part.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(anyhow!("malformed sha256 digest '{value}'"));
    }
    Ok(hex_part.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn file_digest_matches_in_memory_digest() {
        let path = std::env::temp_dir().join(format!(
            "sbapp-security-tests-{}-digest.bin",
            std::process::id()
        ));
        std::fs::write(&path, b"abc").expect("must write");

        assert_eq!(
            sha256_file_hex(&path).expect("must hash"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(sha256_file_hex(&path).expect("must hash"), sha256_hex(b"abc"));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn parse_digest_forms() {
        let hex = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        assert_eq!(parse_sha256_digest(&format!("sha256:{hex}")).expect("prefixed"), hex);
        assert_eq!(
            parse_sha256_digest(&hex.to_ascii_uppercase()).expect("bare"),
            hex
        );
        assert!(parse_sha256_digest("md5:abc").is_err());
        assert!(parse_sha256_digest("sha256:xyz").is_err());
    }
}
