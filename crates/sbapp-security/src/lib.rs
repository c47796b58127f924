mod checksum;

pub use checksum::{parse_sha256_digest, sha256_file_hex, sha256_hex};
