//! Checksum engine (C2).
//!
//! A single pass over the file computes every requested digest over the
//! same 1 MiB chunks; MD5 is always included since it is the canonical
//! stored checksum (spec §3 `FileRecord.checksum`).

use std::io::Read;

use md5::{Digest as Md5Digest, Md5};
use sha1::Sha1;
use sha2::Sha256;
use thiserror::Error;

const CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChecksumError {
    #[error("malformed checksum spec: {0}")]
    MalformedSpec(String),
    #[error("unknown checksum algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error("checksum mismatch")]
    Mismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha1,
    Sha256,
}

impl ChecksumAlgorithm {
    fn parse(name: &str) -> Result<Self, ChecksumError> {
        match name {
            "md5" => Ok(ChecksumAlgorithm::Md5),
            "sha1" => Ok(ChecksumAlgorithm::Sha1),
            "sha2" | "sha256" => Ok(ChecksumAlgorithm::Sha256),
            other => Err(ChecksumError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// A `"<alg>:<hex>"` checksum as declared by an upload caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub algorithm: ChecksumAlgorithm,
    pub hex: String,
}

impl std::str::FromStr for Checksum {
    type Err = ChecksumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (alg, hex) = s
            .split_once(':')
            .ok_or_else(|| ChecksumError::MalformedSpec(s.to_string()))?;
        Ok(Checksum {
            algorithm: ChecksumAlgorithm::parse(alg)?,
            hex: hex.to_ascii_lowercase(),
        })
    }
}

/// The digests computed over one pass of a source file. `md5` is always
/// populated; `requested` is populated only when a non-MD5 algorithm was
/// declared, so the common path never pays for an unused digest.
#[derive(Debug, Clone, Default)]
pub struct Digests {
    pub md5: String,
    pub requested: Option<(ChecksumAlgorithm, String)>,
}

/// Streams `reader` once, computing MD5 plus `requested` (if given) over
/// the same chunks.
pub fn digest<R: Read>(
    mut reader: R,
    requested: Option<ChecksumAlgorithm>,
) -> std::io::Result<Digests> {
    let mut md5 = Md5::new();
    let mut sha1 = requested
        .filter(|a| *a == ChecksumAlgorithm::Sha1)
        .map(|_| Sha1::new());
    let mut sha256 = requested
        .filter(|a| *a == ChecksumAlgorithm::Sha256)
        .map(|_| Sha256::new());

    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        md5.update(&buf[..n]);
        if let Some(h) = sha1.as_mut() {
            h.update(&buf[..n]);
        }
        if let Some(h) = sha256.as_mut() {
            h.update(&buf[..n]);
        }
    }

    let requested = match requested {
        Some(ChecksumAlgorithm::Md5) => Some((ChecksumAlgorithm::Md5, hex::encode(md5.clone().finalize()))),
        Some(ChecksumAlgorithm::Sha1) => {
            sha1.map(|h| (ChecksumAlgorithm::Sha1, hex::encode(h.finalize())))
        }
        Some(ChecksumAlgorithm::Sha256) => {
            sha256.map(|h| (ChecksumAlgorithm::Sha256, hex::encode(h.finalize())))
        }
        None => None,
    };

    Ok(Digests {
        md5: hex::encode(md5.finalize()),
        requested,
    })
}

/// Verifies a declared checksum against a computed [`Digests`], failing
/// with [`ChecksumError::Mismatch`] on any disagreement.
pub fn verify_checksum(declared: &Checksum, digests: &Digests) -> Result<(), ChecksumError> {
    let actual = if declared.algorithm == ChecksumAlgorithm::Md5 {
        Some(digests.md5.as_str())
    } else {
        digests
            .requested
            .as_ref()
            .filter(|(alg, _)| *alg == declared.algorithm)
            .map(|(_, hex)| hex.as_str())
    };

    match actual {
        Some(hex) if hex.eq_ignore_ascii_case(&declared.hex) => Ok(()),
        _ => Err(ChecksumError::Mismatch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::str::FromStr;

    #[test]
    fn md5_of_empty_input_is_well_known() {
        let d = digest(Cursor::new(b""), None).unwrap();
        assert_eq!(d.md5, "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn sha256_matches_requested_algorithm() {
        let d = digest(Cursor::new(b"hello"), Some(ChecksumAlgorithm::Sha256)).unwrap();
        assert_eq!(
            d.requested.unwrap().1,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn parses_alg_colon_hex() {
        let c = Checksum::from_str("sha2:AAFF").unwrap();
        assert_eq!(c.algorithm, ChecksumAlgorithm::Sha256);
        assert_eq!(c.hex, "aaff");
    }

    #[test]
    fn rejects_unknown_algorithm() {
        assert_eq!(
            Checksum::from_str("crc32:aa").unwrap_err(),
            ChecksumError::UnknownAlgorithm("crc32".to_string())
        );
    }

    #[test]
    fn rejects_missing_colon() {
        assert!(matches!(
            Checksum::from_str("deadbeef"),
            Err(ChecksumError::MalformedSpec(_))
        ));
    }

    #[test]
    fn verify_detects_mismatch() {
        let digests = digest(Cursor::new(b"hello"), None).unwrap();
        let declared = Checksum {
            algorithm: ChecksumAlgorithm::Md5,
            hex: "0".repeat(32),
        };
        assert_eq!(verify_checksum(&declared, &digests).unwrap_err(), ChecksumError::Mismatch);
    }

    #[test]
    fn verify_accepts_matching_md5() {
        let digests = digest(Cursor::new(b""), None).unwrap();
        let declared = Checksum {
            algorithm: ChecksumAlgorithm::Md5,
            hex: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
        };
        assert!(verify_checksum(&declared, &digests).is_ok());
    }
}
