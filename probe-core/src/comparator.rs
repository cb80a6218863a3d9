//! Payload Comparator
//!
//! Decides whether the downloaded copy is identical to the reference
//! payload. Only full content equality counts as a match; equal length
//! alone never does.

use std::io;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};

/// Read size used when streaming both files
const CHUNK_SIZE: usize = 64 * 1024;

/// Result of a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Contents are identical
    Match,
    /// Contents differ; `offset` is the first differing byte (or the
    /// shorter length when one side is a prefix of the other)
    Mismatch { offset: u64 },
}

impl Comparison {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }
}

/// Compare two in-memory buffers byte for byte
pub fn compare_bytes(expected: &[u8], actual: &[u8]) -> Comparison {
    match expected.iter().zip(actual).position(|(a, b)| a != b) {
        Some(offset) => Comparison::Mismatch {
            offset: offset as u64,
        },
        None if expected.len() == actual.len() => Comparison::Match,
        None => Comparison::Mismatch {
            offset: expected.len().min(actual.len()) as u64,
        },
    }
}

/// Compare two files byte for byte, streaming both in chunks
pub async fn compare_files(reference: &Path, staged: &Path) -> io::Result<Comparison> {
    let reference = File::open(reference).await?;
    let staged = File::open(staged).await?;

    let reference_len = reference.metadata().await?.len();
    let staged_len = staged.metadata().await?.len();

    let mut left = BufReader::with_capacity(CHUNK_SIZE, reference);
    let mut right = BufReader::with_capacity(CHUNK_SIZE, staged);
    let mut left_buf = vec![0u8; CHUNK_SIZE];
    let mut right_buf = vec![0u8; CHUNK_SIZE];
    let mut offset: u64 = 0;

    loop {
        let left_read = read_full(&mut left, &mut left_buf).await?;
        let right_read = read_full(&mut right, &mut right_buf).await?;

        let common = left_read.min(right_read);
        if let Comparison::Mismatch { offset: at } =
            compare_bytes(&left_buf[..common], &right_buf[..common])
        {
            return Ok(Comparison::Mismatch { offset: offset + at });
        }
        offset += common as u64;

        if left_read != right_read {
            return Ok(Comparison::Mismatch { offset });
        }
        if left_read == 0 {
            break;
        }
    }

    // Files changed length under us while streaming
    if reference_len != staged_len {
        return Ok(Comparison::Mismatch {
            offset: reference_len.min(staged_len),
        });
    }

    Ok(Comparison::Match)
}

/// Fill `buf` as far as the reader allows; returns bytes read (0 at EOF)
async fn read_full<R: AsyncReadExt + Unpin>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_compare_bytes_match() {
        assert_eq!(compare_bytes(b"0123456789", b"0123456789"), Comparison::Match);
        assert_eq!(compare_bytes(b"", b""), Comparison::Match);
    }

    #[test]
    fn test_compare_bytes_every_single_byte_mutation() {
        let payload = b"0123456789";
        for i in 0..payload.len() {
            let mut mutated = payload.to_vec();
            mutated[i] = mutated[i].wrapping_add(1);
            assert_eq!(
                compare_bytes(payload, &mutated),
                Comparison::Mismatch { offset: i as u64 }
            );
        }
    }

    #[test]
    fn test_compare_bytes_truncation() {
        assert_eq!(
            compare_bytes(b"0123456789", b"01234"),
            Comparison::Mismatch { offset: 5 }
        );
        assert_eq!(
            compare_bytes(b"0123", b"01234"),
            Comparison::Mismatch { offset: 4 }
        );
    }

    #[tokio::test]
    async fn test_compare_files_identical() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a", b"0123456789");
        let b = write(&dir, "b", b"0123456789");

        assert_eq!(compare_files(&a, &b).await.unwrap(), Comparison::Match);
    }

    #[tokio::test]
    async fn test_compare_files_same_size_different_content() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a", b"0123456789");
        let b = write(&dir, "b", b"0123456780");

        assert_eq!(
            compare_files(&a, &b).await.unwrap(),
            Comparison::Mismatch { offset: 9 }
        );
    }

    #[tokio::test]
    async fn test_compare_files_across_chunks() {
        let dir = TempDir::new().unwrap();
        let payload: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let mut mutated = payload.clone();
        let at = CHUNK_SIZE * 2 + 5;
        mutated[at] ^= 0x01;

        let a = write(&dir, "a", &payload);
        let b = write(&dir, "b", &payload);
        let c = write(&dir, "c", &mutated);

        assert_eq!(compare_files(&a, &b).await.unwrap(), Comparison::Match);
        assert_eq!(
            compare_files(&a, &c).await.unwrap(),
            Comparison::Mismatch { offset: at as u64 }
        );
    }

    #[tokio::test]
    async fn test_compare_files_truncated_copy() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a", b"0123456789");
        let b = write(&dir, "b", b"012345");

        assert_eq!(
            compare_files(&a, &b).await.unwrap(),
            Comparison::Mismatch { offset: 6 }
        );
    }

    #[tokio::test]
    async fn test_compare_files_missing_staged_copy() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a", b"0123456789");

        assert!(compare_files(&a, &dir.path().join("missing")).await.is_err());
    }
}

#[cfg(test)]
mod proptests {
    use proptest::prelude::*;
    use tempfile::TempDir;

    use super::*;

    fn exact_len(len: usize) -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(any::<u8>(), len)
    }

    /// Payloads biased toward empty input and the chunk boundaries
    fn arb_payload() -> impl Strategy<Value = Vec<u8>> {
        prop_oneof![
            Just(Vec::new()),
            prop::collection::vec(any::<u8>(), 1..1024),
            (CHUNK_SIZE - 2..=CHUNK_SIZE + 2).prop_flat_map(exact_len),
            (2 * CHUNK_SIZE - 1..=2 * CHUNK_SIZE + 1).prop_flat_map(exact_len),
        ]
    }

    fn compare_on_disk(reference: &[u8], staged: &[u8]) -> Comparison {
        let dir = TempDir::new().unwrap();
        let left = dir.path().join("reference");
        let right = dir.path().join("staged");
        std::fs::write(&left, reference).unwrap();
        std::fs::write(&right, staged).unwrap();

        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(compare_files(&left, &right))
            .unwrap()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn payload_always_matches_itself(payload in arb_payload()) {
            prop_assert_eq!(compare_bytes(&payload, &payload), Comparison::Match);
            prop_assert_eq!(compare_on_disk(&payload, &payload), Comparison::Match);
        }

        #[test]
        fn single_byte_mutation_reports_its_offset(
            (payload, index) in arb_payload()
                .prop_filter("needs a byte to mutate", |p| !p.is_empty())
                .prop_flat_map(|p| {
                    let len = p.len();
                    (Just(p), 0..len)
                }),
            flip in 1u8..=255,
        ) {
            let mut mutated = payload.clone();
            mutated[index] ^= flip;

            let expected = Comparison::Mismatch { offset: index as u64 };
            prop_assert_eq!(compare_bytes(&payload, &mutated), expected);
            prop_assert_eq!(compare_on_disk(&payload, &mutated), expected);
        }
    }
}
