//! Zip archive entry selection

use eyre::{Context, Result, eyre};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read};
use zip::ZipArchive;

/// Rule picking the entry of an archive to parse
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryMatcher {
    /// File name ends with the given extension, e.g. `.csv`, matching case
    Extension(String),
    /// File path contains the given fragment
    Contains(String),
    /// File path matches the regular expression
    Pattern(#[serde(with = "regex_serde")] Regex),
}

impl EntryMatcher {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Extension(ext) => name.ends_with(ext.as_str()),
            Self::Contains(fragment) => name.contains(fragment.as_str()),
            Self::Pattern(re) => re.is_match(name),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Extension(ext) => format!("*{}", ext),
            Self::Contains(fragment) => fragment.clone(),
            Self::Pattern(re) => format!("/{}/", re.as_str()),
        }
    }
}

/// Read the first entry (in archive order) accepted by `matcher`
///
/// Returns the entry name and its contents.
///
/// # Errors
/// Returns an error if the bytes are not a zip archive or no entry matches
pub fn read_matching_entry(
    bytes: Vec<u8>,
    matcher: &EntryMatcher,
    origin: &str,
) -> Result<(String, Vec<u8>)> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .with_context(|| format!("Invalid zip archive from {}", origin))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if !entry.is_file() || !matcher.matches(entry.name()) {
            continue;
        }
        let name = entry.name().to_string();
        log::debug!("Selected zip entry {} from {}", name, origin);

        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .with_context(|| format!("Failed to read {} from {}", name, origin))?;
        return Ok((name, content));
    }

    Err(eyre!(
        "Could not find file {} in zipped file from {}",
        matcher.describe(),
        origin
    ))
}

mod regex_serde {
    use regex::Regex;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(re: &Regex, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(re.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Regex, D::Error> {
        let pattern = String::deserialize(deserializer)?;
        Regex::new(&pattern).map_err(D::Error::custom)
    }
}
