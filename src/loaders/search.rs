//! Search index loader using the `_bulk` API

use crate::client::SearchClient;
use crate::etl::{EtlContext, Loader};
use crate::{Dataset, Frame};
use eyre::{Result, eyre};
use serde_json::{Map, Value, json};
use std::time::Duration;

/// Indexes every row of a frame as one document
///
/// The index is created when missing, or dropped and recreated when
/// `delete` is set. Documents are sent in batches of `batch_size`.
///
/// # Example
/// ```no_run
/// use tabular_etl::client::{Auth, SearchClient};
/// use tabular_etl::loaders::SearchLoader;
/// use url::Url;
///
/// # fn example() -> eyre::Result<()> {
/// let client = SearchClient::try_new(vec![Url::parse("http://localhost:9200")?], Auth::None)?;
/// let loader = SearchLoader::new(client, "politici")
///     .id_field("id")
///     .delete(true);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SearchLoader {
    client: SearchClient,
    index: String,
    doc_type: Option<String>,
    id_field: Option<String>,
    mapping: Option<Value>,
    batch_size: usize,
    delete: bool,
    settle_delay: Duration,
}

impl SearchLoader {
    pub fn new(client: SearchClient, index: impl Into<String>) -> Self {
        Self {
            client,
            index: index.into(),
            doc_type: None,
            id_field: None,
            mapping: None,
            batch_size: 500,
            delete: false,
            settle_delay: Duration::from_secs(2),
        }
    }

    pub fn doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    /// Column whose value becomes the document `_id`
    pub fn id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = Some(id_field.into());
        self
    }

    pub fn mapping(mut self, mapping: Value) -> Self {
        self.mapping = Some(mapping);
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Drop the index before loading if it exists
    pub fn delete(mut self, delete: bool) -> Self {
        self.delete = delete;
        self
    }

    /// Pause after creating the index, before writing to it
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    async fn prepare_index(&self, ctx: &EtlContext) -> Result<()> {
        let exists = self.client.index_exists(&self.index).await?;
        if exists && self.delete {
            self.client.delete_index(&self.index).await?;
            ctx.info(format_args!("Deleted index \"{}\"", self.index));
        }
        if !exists || self.delete {
            self.client.create_index(&self.index, None).await?;
            ctx.info(format_args!("Created index \"{}\"", self.index));
            tokio::time::sleep(self.settle_delay).await;
        }

        if let Some(mapping) = &self.mapping {
            self.client
                .put_mapping(&self.index, self.doc_type.as_deref(), mapping)
                .await?;
            ctx.info(format_args!("Applied mapping to index \"{}\"", self.index));
        }
        Ok(())
    }

    /// NDJSON body for one batch of rows
    fn bulk_body(&self, frame: &Frame, rows: std::ops::Range<usize>) -> Result<String> {
        let mut body = String::new();
        for i in rows {
            let record = frame
                .record(i)
                .ok_or_else(|| eyre!("Row {} out of range", i))?;

            let mut meta = Map::new();
            meta.insert("_index".to_string(), Value::String(self.index.clone()));
            if let Some(doc_type) = &self.doc_type {
                meta.insert("_type".to_string(), Value::String(doc_type.clone()));
            }
            if let Some(id) = self.id_field.as_ref().and_then(|f| record.get(f)) {
                match id {
                    Value::Null => {}
                    Value::String(s) => {
                        meta.insert("_id".to_string(), Value::String(s.clone()));
                    }
                    other => {
                        meta.insert("_id".to_string(), Value::String(other.to_string()));
                    }
                }
            }

            body.push_str(&serde_json::to_string(&json!({ "index": meta }))?);
            body.push('\n');
            body.push_str(&serde_json::to_string(&record)?);
            body.push('\n');
        }
        Ok(body)
    }
}

/// Log each bulk item and count the successful ones
fn report_items(ctx: &EtlContext, response: &Value, offset: usize) -> usize {
    let Some(items) = response.get("items").and_then(Value::as_array) else {
        return 0;
    };

    let mut ok = 0;
    for (i, item) in items.iter().enumerate() {
        let Some((action, result)) = item.as_object().and_then(|o| o.iter().next()) else {
            continue;
        };
        let doc_id = format!(
            "/{}/{}/{}",
            result["_index"].as_str().unwrap_or_default(),
            result["_type"].as_str().unwrap_or("_doc"),
            result["_id"].as_str().unwrap_or_default()
        );
        let status = result["status"].as_u64().unwrap_or_default();
        let n = offset + i + 1;

        if (200..300).contains(&status) {
            ok += 1;
            ctx.debug(format_args!(
                "{}: \"{}\" succeeded on document {}: {}",
                n, action, doc_id, result
            ));
        } else {
            ctx.error(format_args!(
                "{}: \"{}\" failed on document {}: {}",
                n, action, doc_id, result
            ));
        }
    }
    ok
}

/// Peak resident memory of this process in kilobytes, where available
fn peak_memory_kb() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmHWM:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse().ok())
}

impl Loader for SearchLoader {
    async fn load(&self, ctx: &EtlContext, data: &Dataset) -> Result<usize> {
        let frame = data.single()?;
        self.prepare_index(ctx).await?;

        ctx.info(format_args!(
            "Indexing {} documents into \"{}\"",
            frame.len(),
            self.index
        ));

        let mut indexed = 0;
        let mut start = 0;
        while start < frame.len() {
            let end = (start + self.batch_size).min(frame.len());
            let body = self.bulk_body(&frame, start..end)?;
            let response = self.client.bulk(body).await?;
            indexed += report_items(ctx, &response, start);

            match peak_memory_kb() {
                Some(kb) => ctx.info(format_args!("{}: peak memory {} kB", end, kb)),
                None => ctx.info(format_args!("{}: batch sent", end)),
            }
            start = end;
        }

        ctx.info(format_args!("Indexed {} documents", indexed));
        Ok(indexed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Auth;
    use url::Url;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn frame() -> Frame {
        Frame::from_rows(
            vec!["id".into(), "name".into()],
            vec![
                vec![json!(1), json!("Roma")],
                vec![json!(2), json!("Milano")],
                vec![json!(3), json!("Napoli")],
            ],
        )
        .unwrap()
    }

    fn loader(server: &MockServer) -> SearchLoader {
        let client =
            SearchClient::try_new(vec![Url::parse(&server.uri()).unwrap()], Auth::None).unwrap();
        SearchLoader::new(client, "comuni").settle_delay(Duration::ZERO)
    }

    #[test]
    fn test_bulk_body() {
        let client =
            SearchClient::try_new(vec![Url::parse("http://localhost:9200").unwrap()], Auth::None)
                .unwrap();
        let loader = SearchLoader::new(client, "comuni")
            .id_field("id")
            .doc_type("comune");

        let body = loader.bulk_body(&frame(), 0..2).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            serde_json::from_str::<Value>(lines[0]).unwrap(),
            json!({"index": {"_index": "comuni", "_type": "comune", "_id": "1"}})
        );
        assert_eq!(
            serde_json::from_str::<Value>(lines[3]).unwrap(),
            json!({"id": 2, "name": "Milano"})
        );
    }

    #[test]
    fn test_report_items() {
        let response = json!({"items": [
            {"index": {"_index": "x", "_id": "1", "status": 201}},
            {"index": {"_index": "x", "_id": "2", "status": 400, "error": {"type": "mapper_parsing_exception"}}}
        ]});
        assert_eq!(report_items(&EtlContext::new(), &response, 0), 1);
    }

    #[tokio::test]
    async fn test_creates_index_and_batches() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/comuni"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/comuni"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acknowledged": true})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": false,
                "items": [
                    {"index": {"_index": "comuni", "_id": "a", "status": 201}},
                    {"index": {"_index": "comuni", "_id": "b", "status": 201}}
                ]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let n = loader(&server)
            .batch_size(2)
            .load(&EtlContext::new(), &Dataset::Frame(frame()))
            .await
            .unwrap();
        // both mocked batches answer with two successes
        assert_eq!(n, 4);
    }

    #[tokio::test]
    async fn test_delete_and_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/comuni"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acknowledged": true})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/comuni"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acknowledged": true})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/comuni/_mapping"))
            .and(body_string_contains("keyword"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acknowledged": true})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .mount(&server)
            .await;

        loader(&server)
            .delete(true)
            .mapping(json!({"properties": {"name": {"type": "keyword"}}}))
            .load(&EtlContext::new(), &Dataset::Frame(frame()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rejects_multiple_labels() {
        let server = MockServer::start().await;
        let mut frames = indexmap::IndexMap::new();
        frames.insert("a".to_string(), frame());
        frames.insert("b".to_string(), frame());

        let err = loader(&server)
            .load(&EtlContext::new(), &Dataset::Labeled(frames))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("labeled frames"));
    }
}
