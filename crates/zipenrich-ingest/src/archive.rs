//! In-memory decoding of password-protected zip archives
//!
//! Archives use legacy PKWARE (ZipCrypto) encryption. The payload is the
//! first entry, in archive order, whose name ends with the tabular suffix.

use std::io::{Cursor, Read};

use thiserror::Error;
use tracing::{debug, warn};
use zip::result::{InvalidPassword, ZipError};
use zip::ZipArchive;

/// Upper bound on the buffer reserved up front from an entry's declared size
const MAX_RESERVE: u64 = 64 * 1024 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("No {suffix} entry found in {archive}")]
    NoPayload { archive: String, suffix: String },

    #[error("Incorrect password for {archive}")]
    BadPassword { archive: String },

    #[error("Corrupt archive {archive}: {reason}")]
    Corrupt { archive: String, reason: String },
}

impl DecodeError {
    fn corrupt(archive: &str, reason: impl std::fmt::Display) -> Self {
        Self::Corrupt {
            archive: archive.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// The extracted tabular entry of an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
    /// Entry name inside the archive
    pub name: String,
    pub data: Vec<u8>,
}

/// Extract the tabular payload from an encrypted archive blob.
///
/// `source` is only used in diagnostics. Entries that are not encrypted are
/// read as-is; the passphrase is ignored for them.
pub fn decode_payload(
    blob: Vec<u8>,
    passphrase: &str,
    payload_suffix: &str,
    source: &str,
) -> Result<DecodedPayload, DecodeError> {
    let mut archive = ZipArchive::new(Cursor::new(blob)).map_err(|e| DecodeError::corrupt(source, e))?;

    let candidates = payload_entries(&mut archive, payload_suffix, source)?;
    let (index, name) = match candidates.as_slice() {
        [] => {
            return Err(DecodeError::NoPayload {
                archive: source.to_string(),
                suffix: payload_suffix.to_string(),
            })
        },
        [first] => first.clone(),
        [first, rest @ ..] => {
            warn!(
                "{} holds {} {} entries, using {}",
                source,
                rest.len() + 1,
                payload_suffix,
                first.1
            );
            first.clone()
        },
    };

    let mut entry = match archive.by_index_decrypt(index, passphrase.as_bytes()) {
        Ok(Ok(entry)) => entry,
        Ok(Err(InvalidPassword)) => {
            return Err(DecodeError::BadPassword {
                archive: source.to_string(),
            })
        },
        Err(e) => return Err(DecodeError::corrupt(source, e)),
    };

    // The declared size comes from the archive itself and is not trusted
    let mut data = Vec::with_capacity(entry.size().min(MAX_RESERVE) as usize);
    // A wrong password that slips past the header check surfaces here as a
    // checksum mismatch.
    entry
        .read_to_end(&mut data)
        .map_err(|e| DecodeError::corrupt(source, ZipError::Io(e)))?;

    debug!("Extracted {} from {} ({} bytes)", name, source, data.len());
    Ok(DecodedPayload { name, data })
}

/// `(index, name)` of every non-directory entry ending with `suffix`
fn payload_entries<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    suffix: &str,
    source: &str,
) -> Result<Vec<(usize, String)>, DecodeError> {
    let mut found = Vec::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index_raw(index)
            .map_err(|e| DecodeError::corrupt(source, e))?;
        if !entry.is_dir() && entry.name().ends_with(suffix) {
            found.push((index, entry.name().to_string()));
        }
    }
    Ok(found)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::{CompressionMethod, ZipWriter};

    fn plain_archive(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, FileOptions::default()).unwrap();
            } else {
                writer.start_file(*name, FileOptions::default()).unwrap();
                writer.write_all(data.as_bytes()).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_decode_unencrypted_entry_ignores_passphrase() {
        let blob = plain_archive(&[("users.csv", "userid\n1\n")]);
        let payload = decode_payload(blob, "s3cret", ".csv", "grp1_a.zip").unwrap();
        assert_eq!(payload.name, "users.csv");
        assert_eq!(payload.data, b"userid\n1\n");
    }

    #[test]
    fn test_decode_skips_directories_and_other_entries() {
        let blob = plain_archive(&[
            ("readme.txt", "hello"),
            ("data.csv/", ""),
            ("nested/users.csv", "userid\n2\n"),
        ]);
        let payload = decode_payload(blob, "pw", ".csv", "grp1_b.zip").unwrap();
        assert_eq!(payload.name, "nested/users.csv");
    }

    #[test]
    fn test_decode_first_payload_wins() {
        let blob = plain_archive(&[("b.csv", "userid\nb\n"), ("a.csv", "userid\na\n")]);
        let payload = decode_payload(blob, "pw", ".csv", "grp1_c.zip").unwrap();
        assert_eq!(payload.name, "b.csv");
    }

    #[test]
    fn test_decode_suffix_is_case_sensitive() {
        let blob = plain_archive(&[("USERS.CSV", "userid\n1\n")]);
        let err = decode_payload(blob, "pw", ".csv", "grp1_d.zip").unwrap_err();
        assert!(matches!(err, DecodeError::NoPayload { .. }));
    }

    #[test]
    fn test_declared_size_is_not_trusted() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Stored);
        writer.start_file("users.csv", options).unwrap();
        writer.write_all(b"userid\n1\n").unwrap();
        let mut blob = writer.finish().unwrap().into_inner();

        // Claim an uncompressed size near u64::MAX through a zip64 extra field
        let header = blob
            .windows(4)
            .position(|w| w == [0x50, 0x4b, 0x01, 0x02])
            .unwrap();
        blob[header + 24..header + 28].copy_from_slice(&u32::MAX.to_le_bytes());
        let name_len = u16::from_le_bytes([blob[header + 28], blob[header + 29]]) as usize;
        let extra_len = u16::from_le_bytes([blob[header + 30], blob[header + 31]]);
        let mut zip64 = vec![0x01, 0x00, 0x08, 0x00];
        zip64.extend_from_slice(&0xFFFF_FFFF_FFFF_FFF0u64.to_le_bytes());
        blob[header + 30..header + 32].copy_from_slice(&(extra_len + 12).to_le_bytes());
        let at = header + 46 + name_len + extra_len as usize;
        let tail = blob.split_off(at);
        blob.extend(zip64);
        blob.extend(tail);

        // End of central directory: grow the recorded directory size
        let eocd = blob
            .windows(4)
            .rposition(|w| w == [0x50, 0x4b, 0x05, 0x06])
            .unwrap();
        let size = u32::from_le_bytes(blob[eocd + 12..eocd + 16].try_into().unwrap());
        blob[eocd + 12..eocd + 16].copy_from_slice(&(size + 12).to_le_bytes());

        match decode_payload(blob, "pw", ".csv", "grp1_f.zip") {
            Ok(payload) => assert_eq!(payload.data, b"userid\n1\n"),
            Err(DecodeError::Corrupt { .. }) => {},
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_decode_garbage_is_corrupt() {
        let err = decode_payload(b"not a zip".to_vec(), "pw", ".csv", "grp1_e.zip").unwrap_err();
        match err {
            DecodeError::Corrupt { archive, .. } => assert_eq!(archive, "grp1_e.zip"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
