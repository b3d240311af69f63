//! Delimited-text file loader

use crate::etl::{EtlContext, Loader};
use crate::frame::cell_to_string;
use crate::{Dataset, Frame};
use encoding_rs::Encoding;
use eyre::{Context, Result, bail, eyre};
use std::path::{Path, PathBuf};

/// Writes one `<label>.csv` file per labeled frame into a directory
///
/// A single frame is written under the loader's label, `dati` unless set.
///
/// # Example
/// ```no_run
/// use tabular_etl::loaders::CsvLoader;
///
/// let loader = CsvLoader::new("./data/output")
///     .label("organizzazioni")
///     .sep(',');
/// ```
#[derive(Debug, Clone)]
pub struct CsvLoader {
    dir: PathBuf,
    label: String,
    encoding: String,
    sep: char,
}

impl CsvLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            label: "dati".to_string(),
            encoding: "utf8".to_string(),
            sep: ';',
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    pub fn sep(mut self, sep: char) -> Self {
        self.sep = sep;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file written for `label`
    pub fn path_for(&self, label: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", label))
    }

    fn render(&self, frame: &Frame) -> Result<Vec<u8>> {
        let mut writer = ::csv::WriterBuilder::new()
            .delimiter(self.sep as u8)
            .from_writer(Vec::new());

        writer.write_record(frame.columns())?;
        for row in frame.rows() {
            writer.write_record(row.iter().map(cell_to_string))?;
        }
        writer
            .into_inner()
            .map_err(|e| eyre!("Failed to flush CSV buffer: {}", e))
    }
}

/// Reject labels that would not name a file directly inside the directory
fn check_label(label: &str) -> Result<()> {
    if label.is_empty() {
        bail!("Cannot write a CSV file for an empty label");
    }
    if label.contains(['/', '\\']) || label.contains("..") {
        bail!("Invalid label '{}', it cannot be used as a file name", label);
    }
    Ok(())
}

/// Re-encode UTF-8 text into the target encoding
pub(crate) fn encode(text: Vec<u8>, label: &str) -> Result<Vec<u8>> {
    let encoding = Encoding::for_label(label.as_bytes())
        .ok_or_else(|| eyre!("Unknown encoding: {}", label))?;
    if encoding == encoding_rs::UTF_8 {
        return Ok(text);
    }

    let text = String::from_utf8(text)?;
    let (bytes, used, had_errors) = encoding.encode(&text);
    if used != encoding {
        log::warn!("Cannot write {}, falling back to {}", encoding.name(), used.name());
    }
    if had_errors {
        log::warn!("Some characters are not representable in {}", used.name());
    }
    Ok(bytes.into_owned())
}

impl Loader for CsvLoader {
    async fn load(&self, ctx: &EtlContext, data: &Dataset) -> Result<usize> {
        if !self.sep.is_ascii() {
            bail!("Separator must be an ASCII character, got '{}'", self.sep);
        }

        let frames = data.labeled(&self.label)?;
        for label in frames.keys() {
            check_label(label)?;
        }
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create directory: {}", self.dir.display()))?;

        let mut written = 0;
        for (label, frame) in &frames {
            let path = self.path_for(label);
            let bytes = encode(self.render(frame)?, &self.encoding)?;
            std::fs::write(&path, bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;

            ctx.info(format_args!("Wrote {} rows to {}", frame.len(), path.display()));
            written += frame.len();
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use serde_json::{Value, json};
    use tempfile::TempDir;

    fn frame() -> Frame {
        Frame::from_rows(
            vec!["a".into(), "b".into()],
            vec![vec![json!(1), json!("x")], vec![Value::Null, json!("y;z")]],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_frame_under_default_label() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("nested/out");
        let loader = CsvLoader::new(&out);

        let n = loader
            .load(&EtlContext::new(), &Dataset::Frame(frame()))
            .await
            .unwrap();
        assert_eq!(n, 2);

        let content = std::fs::read_to_string(out.join("dati.csv")).unwrap();
        assert_eq!(content, "a;b\n1;x\n;\"y;z\"\n");
    }

    #[tokio::test]
    async fn test_one_file_per_label() {
        let dir = TempDir::new().unwrap();
        let mut frames = IndexMap::new();
        frames.insert("nord".to_string(), frame());
        frames.insert("sud".to_string(), frame());

        CsvLoader::new(dir.path())
            .sep(',')
            .load(&EtlContext::new(), &Dataset::Labeled(frames))
            .await
            .unwrap();

        assert!(dir.path().join("nord.csv").exists());
        let sud = std::fs::read_to_string(dir.path().join("sud.csv")).unwrap();
        assert!(sud.starts_with("a,b\n"));
    }

    #[tokio::test]
    async fn test_latin1_output() {
        let dir = TempDir::new().unwrap();
        let frame = Frame::from_rows(vec!["c".into()], vec![vec![json!("città")]]).unwrap();

        CsvLoader::new(dir.path())
            .encoding("latin1")
            .load(&EtlContext::new(), &Dataset::Frame(frame))
            .await
            .unwrap();

        let bytes = std::fs::read(dir.path().join("dati.csv")).unwrap();
        assert_eq!(bytes, b"c\ncitt\xE0\n");
    }

    #[tokio::test]
    async fn test_labels_stay_inside_dir() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");

        for label in ["../escaped", "a/b", "a\\b", ""] {
            let mut frames = IndexMap::new();
            frames.insert("ok".to_string(), frame());
            frames.insert(label.to_string(), frame());

            let err = CsvLoader::new(&out)
                .load(&EtlContext::new(), &Dataset::Labeled(frames))
                .await
                .unwrap_err();
            assert!(err.to_string().contains("label"), "{}: {}", label, err);
        }

        assert!(!dir.path().join("escaped.csv").exists());
        assert!(!out.exists(), "nothing is written when a label is rejected");
    }

    #[tokio::test]
    async fn test_bad_records_fail() {
        let dir = TempDir::new().unwrap();
        let err = CsvLoader::new(dir.path())
            .load(&EtlContext::new(), &Dataset::Records(vec![json!(1)]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("list of non-object values"));
    }
}
