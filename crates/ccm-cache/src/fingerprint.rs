use crate::error::CacheError;
use md5::{Digest, Md5};
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Content-identity token recorded for a slot.
///
/// Locally computed fingerprints are lowercase hex MD5 digests. Remote stores may hand out their
/// own token (an ETag) which is kept verbatim after normalization.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// MD5 of an arbitrary byte slice.
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Self {
        let mut hasher = Md5::new();
        hasher.update(bytes.as_ref());
        Self(hex::encode(hasher.finalize()))
    }

    /// MD5 of everything read from `reader`, streamed in 64 KiB chunks.
    pub fn from_reader(mut reader: impl Read) -> Result<Self, CacheError> {
        let mut hasher = Md5::new();
        let mut buf = vec![0_u8; 64 * 1024];
        loop {
            let read = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            hasher.update(&buf[..read]);
        }
        Ok(Self(hex::encode(hasher.finalize())))
    }

    /// MD5 of a file's contents.
    ///
    /// Failures are reported as [`CacheError::HashComputation`] so callers can treat them as
    /// "uncacheable" rather than as I/O failures of the cache itself.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        let hash_err = |err: &dyn fmt::Display| CacheError::HashComputation {
            location: path.display().to_string(),
            message: err.to_string(),
        };
        let file = std::fs::File::open(path).map_err(|err| hash_err(&err))?;
        Self::from_reader(file).map_err(|err| hash_err(&err))
    }

    /// Normalize a store-provided token (e.g. an ETag header value).
    ///
    /// Surrounding quotes and a weak-validator `W/` prefix are dropped. Returns `None` when nothing
    /// usable is left.
    pub fn from_token(token: &str) -> Option<Self> {
        let token = token.trim();
        let token = token.strip_prefix("W/").unwrap_or(token);
        let token = token.trim_matches('"').trim();
        if token.is_empty() {
            None
        } else {
            Some(Self(token.to_string()))
        }
    }

    /// Wrap a previously recorded value without normalizing it.
    pub fn from_recorded(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_of_known_inputs() {
        assert_eq!(
            Fingerprint::from_bytes("hello world").as_str(),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
        assert_eq!(
            Fingerprint::from_bytes(b"").as_str(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn streamed_file_matches_in_memory_digest() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("pkg.tar.gz");
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &payload).unwrap();

        assert_eq!(
            Fingerprint::from_file(&path).unwrap(),
            Fingerprint::from_bytes(&payload)
        );
    }

    #[test]
    fn unreadable_file_is_a_hash_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Fingerprint::from_file(tmp.path().join("missing.tar.gz")).unwrap_err();
        assert!(
            matches!(err, CacheError::HashComputation { .. }),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn etag_tokens_are_normalized() {
        assert_eq!(
            Fingerprint::from_token("\"9e107d9d372bb6826bd81d3542a419d6\"")
                .unwrap()
                .as_str(),
            "9e107d9d372bb6826bd81d3542a419d6"
        );
        assert_eq!(
            Fingerprint::from_token("W/\"abc-2\"").unwrap().as_str(),
            "abc-2"
        );
        assert_eq!(Fingerprint::from_token("\"\""), None);
        assert_eq!(Fingerprint::from_token("   "), None);
    }
}
