use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Parse a GitHub asset digest of the form `sha256:<64 hex chars>`.
pub(crate) fn parse_sha256_digest(digest: &str) -> Option<String> {
    let (algorithm, hash) = digest.split_once(':')?;
    if !algorithm.eq_ignore_ascii_case("sha256") {
        return None;
    }
    if hash.len() != 64 || !hash.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    Some(hash.to_ascii_lowercase())
}

pub(crate) fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 8192];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::{parse_sha256_digest, sha256_file};

    #[test]
    fn parse_sha256_digest_accepts_valid_sha256() {
        let parsed = parse_sha256_digest(
            "sha256:50639d63848d275a7efcd04478de62ca0df8f35dfd75be490e4fcae667ecd436",
        );
        assert_eq!(
            parsed.as_deref(),
            Some("50639d63848d275a7efcd04478de62ca0df8f35dfd75be490e4fcae667ecd436")
        );
    }

    #[test]
    fn parse_sha256_digest_rejects_invalid_values() {
        assert!(parse_sha256_digest("sha1:abc").is_none());
        assert!(parse_sha256_digest("sha256:not-hex").is_none());
        assert!(parse_sha256_digest("sha256:abcd").is_none());
        assert!(parse_sha256_digest("no-separator").is_none());
    }

    #[test]
    fn sha256_file_returns_known_digest() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let file_path = temp.path().join("payload.bin");
        std::fs::write(&file_path, b"abc").expect("payload file should be written");

        let digest = sha256_file(&file_path).expect("checksum should be computed");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
