use crate::error::CacheError;
use crate::fingerprint::Fingerprint;
use crate::util::atomic_write;
use std::path::Path;

/// Name of the provenance file kept at the root of every slot.
pub const SOURCE_FILE_NAME: &str = "source.txt";

/// Where a slot's content came from and which fingerprint it was extracted from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceRecord {
    pub version: String,
    pub origin: String,
    pub hash: Fingerprint,
}

impl SourceRecord {
    /// Render the three-line `key=value` form stored on disk.
    pub fn render(&self) -> String {
        format!(
            "version={}\nurl={}\nhash={}\n",
            self.version, self.origin, self.hash
        )
    }

    /// Parse the on-disk form.
    ///
    /// Returns `None` unless a non-empty `hash` is present. Lines without `=` and unknown keys
    /// are skipped, values are trimmed, and the last occurrence of a key wins.
    pub fn parse(contents: &str) -> Option<Self> {
        let fields = parse_fields(contents);
        let hash = fields.hash.filter(|hash| !hash.is_empty())?;
        Some(Self {
            version: fields.version.unwrap_or_default(),
            origin: fields.url.unwrap_or_default(),
            hash: Fingerprint::from_recorded(hash),
        })
    }
}

#[derive(Default)]
struct Fields {
    version: Option<String>,
    url: Option<String>,
    hash: Option<String>,
}

fn parse_fields(contents: &str) -> Fields {
    let mut fields = Fields::default();
    for line in contents.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim() {
            "version" => fields.version = Some(value),
            "url" => fields.url = Some(value),
            "hash" => fields.hash = Some(value),
            _ => {}
        }
    }
    fields
}

/// Persist the record for `slot_dir`, replacing any previous one atomically.
pub fn save(
    slot_dir: &Path,
    version: &str,
    origin: &str,
    hash: &Fingerprint,
) -> Result<(), CacheError> {
    let record = SourceRecord {
        version: version.to_string(),
        origin: origin.to_string(),
        hash: hash.clone(),
    };
    atomic_write(&slot_dir.join(SOURCE_FILE_NAME), record.render().as_bytes())
}

/// Read the record for `slot_dir`.
///
/// Missing, unreadable and malformed records all read as `None`.
pub fn load(slot_dir: &Path) -> Option<SourceRecord> {
    let path = slot_dir.join(SOURCE_FILE_NAME);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(
                    target: "ccm.cache",
                    path = %path.display(),
                    error = %err,
                    "failed to read source record"
                );
            }
            return None;
        }
    };

    let record = SourceRecord::parse(&contents);
    if record.is_none() {
        tracing::debug!(
            target: "ccm.cache",
            path = %path.display(),
            "source record has no hash; treating slot as unrecorded"
        );
    }
    record
}

/// The recorded origin of `slot_dir`, even when the record carries no hash.
pub fn read_origin(slot_dir: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(slot_dir.join(SOURCE_FILE_NAME)).ok()?;
    parse_fields(&contents).url.filter(|url| !url.is_empty())
}
