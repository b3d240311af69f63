//! Integration tests for ETL pipeline functionality
//!
//! These tests demonstrate end-to-end workflows using the ETL framework
//! with real file I/O, mocked HTTP endpoints and sqlite databases.

use eyre::Result;
use indexmap::IndexMap;
use serde_json::{Value, json};
use std::io::Write;
use std::time::Duration;
use tabular_etl::client::{Auth, SearchClient};
use tabular_etl::config::PipelineConfig;
use tabular_etl::etl::{EtlContext, Extractor, Pipeline, from_fn};
use tabular_etl::extractors::{
    CsvExtractor, FrameExtractor, NoOpExtractor, SparqlExtractor, SqlExtractor, ZipCsvExtractor,
};
use tabular_etl::loaders::{BulkInsertLoader, CsvLoader, JsonLoader, SearchLoader, UpsertLoader};
use tabular_etl::transform::{ColumnDropper, Partition};
use tabular_etl::{Dataset, Frame};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sqlite_url(dir: &TempDir) -> String {
    format!("sqlite://{}?mode=rwc", dir.path().join("etl.db").display())
}

fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn regions() -> Frame {
    Frame::from_rows(
        vec!["regione".into(), "comune".into(), "abitanti".into()],
        vec![
            vec![json!("Lazio"), json!("Roma"), json!(2749031)],
            vec![json!("Lombardia"), json!("Milano"), json!(1371498)],
            vec![json!("Lazio"), json!("Latina"), json!(127564)],
        ],
    )
    .unwrap()
}

#[tokio::test]
async fn test_csv_to_csv_pipeline() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let input = temp_dir.path().join("input.csv");
    std::fs::write(&input, "a;b\n1;x\n2;y\n")?;
    let output_dir = temp_dir.path().join("output");

    // Extract from a local file, load under the "out" label
    let extractor = CsvExtractor::new(input.to_string_lossy());
    let loader = CsvLoader::new(&output_dir).label("out");

    let mut pipeline = Pipeline::new(extractor, loader);
    pipeline.run().await?;

    assert_eq!(pipeline.loaded(), Some(2));
    let content = std::fs::read_to_string(output_dir.join("out.csv"))?;
    assert_eq!(content, "a;b\n1;x\n2;y\n");

    Ok(())
}

#[tokio::test]
async fn test_run_equals_chained_stages() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let mut chained = Pipeline::new(
        FrameExtractor::new(regions()),
        CsvLoader::new(temp_dir.path().join("chained")),
    );
    chained.extract().await?.transform()?.load().await?;

    let mut run = Pipeline::new(
        FrameExtractor::new(regions()),
        CsvLoader::new(temp_dir.path().join("run")),
    );
    let returned: *const _ = run.run().await?;
    assert!(std::ptr::eq(returned, &run), "run() returns the same pipeline");

    assert_eq!(run.original_data(), chained.original_data());
    assert_eq!(run.processed_data(), chained.processed_data());
    assert_eq!(
        std::fs::read(temp_dir.path().join("run/dati.csv"))?,
        std::fs::read(temp_dir.path().join("chained/dati.csv"))?
    );

    Ok(())
}

#[tokio::test]
async fn test_identity_preserves_shape() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut pipeline = Pipeline::new(
        FrameExtractor::new(regions()),
        JsonLoader::new(temp_dir.path().join("out.json")),
    );
    pipeline.extract().await?.transform()?;

    let processed = pipeline.processed_data().expect("transform ran");
    let frame = processed.single()?;
    assert_eq!(frame.len(), 3);
    assert_eq!(frame.columns(), regions().columns());

    Ok(())
}

#[tokio::test]
async fn test_partition_writes_one_file_per_label() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let mut pipeline = Pipeline::new(
        FrameExtractor::new(regions()),
        CsvLoader::new(temp_dir.path()).sep(','),
    )
    .with_transformation(Partition::new("regione").drop_key(true));
    pipeline.run().await?;

    let lazio = std::fs::read_to_string(temp_dir.path().join("Lazio.csv"))?;
    assert_eq!(lazio, "comune,abitanti\nRoma,2749031\nLatina,127564\n");
    assert!(temp_dir.path().join("Lombardia.csv").exists());
    assert!(
        !temp_dir.path().join("dati.csv").exists(),
        "labeled frames do not use the loader label"
    );

    Ok(())
}

#[tokio::test]
async fn test_record_list_loads_under_label() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let to_records = from_fn(|_ctx: &EtlContext, frame: &Frame| {
        Ok(Dataset::Records(frame.records().map(Value::Object).collect()))
    });
    let mut pipeline = Pipeline::new(
        FrameExtractor::new(regions()),
        CsvLoader::new(temp_dir.path()).label("comuni"),
    )
    .with_transformation(to_records);
    pipeline.run().await?;

    let content = std::fs::read_to_string(temp_dir.path().join("comuni.csv"))?;
    assert_eq!(content.lines().count(), 4, "header plus three rows");

    Ok(())
}

#[tokio::test]
async fn test_labeled_frames_to_json() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output = temp_dir.path().join("nested/out.json");

    let mut pipeline = Pipeline::new(FrameExtractor::new(regions()), JsonLoader::new(&output))
        .with_transformation(Partition::new("regione"));
    pipeline.run().await?;

    let written: Value = serde_json::from_slice(&std::fs::read(&output)?)?;
    assert_eq!(written["Lombardia"][0]["comune"], "Milano");
    assert_eq!(written["Lazio"].as_array().map(Vec::len), Some(2));

    Ok(())
}

#[tokio::test]
async fn test_load_before_transform_fails() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut pipeline = Pipeline::new(NoOpExtractor, CsvLoader::new(temp_dir.path()));

    let err = pipeline.load().await.err().expect("load without transform");
    assert!(err.to_string().contains("transform() has not run"));

    Ok(())
}

#[tokio::test]
async fn test_remote_zip_to_json() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/governo.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(zip_bytes(&[
            ("LEGGIMI.txt", "niente"),
            ("governo.csv", "id;nome;note\n1;Conte;x\n2;Draghi;y\n"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new()?;
    let output = temp_dir.path().join("governo.json");

    let mut pipeline = Pipeline::new(
        ZipCsvExtractor::new(format!("{}/governo.zip", server.uri())),
        JsonLoader::new(&output),
    )
    .with_transformation(ColumnDropper::new(["note"]));
    pipeline.run().await?;

    let written: Value = serde_json::from_slice(&std::fs::read(&output)?)?;
    assert_eq!(
        written,
        json!([{"id": "1", "nome": "Conte"}, {"id": "2", "nome": "Draghi"}])
    );

    Ok(())
}

#[tokio::test]
async fn test_sparql_retries_then_loads() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sparql"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sparql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "head": {"vars": ["persona", "nome"]},
            "results": {"bindings": [
                {"persona": {"type": "uri", "value": "http://dati.camera.it/p1"},
                 "nome": {"type": "literal", "value": "Nilde"}}
            ]}
        })))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new()?;
    let extractor = SparqlExtractor::new(
        &format!("{}/sparql", server.uri()),
        "SELECT ?persona ?nome WHERE { ?persona foaf:firstName ?nome }",
    )?
    .max_retries(3)
    .retry_delay(Duration::from_millis(10));

    let mut pipeline = Pipeline::new(extractor, CsvLoader::new(temp_dir.path()));
    pipeline.run().await?;

    let content = std::fs::read_to_string(temp_dir.path().join("dati.csv"))?;
    assert_eq!(content, "persona;nome\nhttp://dati.camera.it/p1;Nilde\n");

    Ok(())
}

#[tokio::test]
async fn test_sparql_gives_up_after_max_retries() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&server)
        .await;

    let extractor = SparqlExtractor::new(&server.uri(), "ASK { ?s ?p ?o }")?
        .max_retries(2)
        .retry_delay(Duration::from_millis(10));

    let err = extractor.extract(&EtlContext::new()).await.unwrap_err();
    assert!(err.to_string().contains("after 2 attempts"));

    Ok(())
}

#[tokio::test]
async fn test_frame_to_search_index() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/comuni"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": false,
            "items": [
                {"index": {"_index": "comuni", "_id": "Roma", "status": 201}},
                {"index": {"_index": "comuni", "_id": "Milano", "status": 201}},
                {"index": {"_index": "comuni", "_id": "Latina", "status": 201}}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = SearchClient::try_new(vec![Url::parse(&server.uri())?], Auth::None)?;
    let loader = SearchLoader::new(client, "comuni")
        .id_field("comune")
        .settle_delay(Duration::ZERO);

    let mut pipeline = Pipeline::new(FrameExtractor::new(regions()), loader);
    pipeline.run().await?;
    assert_eq!(pipeline.loaded(), Some(3));

    Ok(())
}

#[tokio::test]
async fn test_sqlite_roundtrip() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let url = sqlite_url(&temp_dir);
    let pool = tabular_etl::db::connect(&url).await?;
    sqlx::query("CREATE TABLE comuni (regione TEXT, comune TEXT PRIMARY KEY, abitanti INTEGER)")
        .execute(&pool)
        .await?;
    pool.close().await;

    // Bulk insert everything
    let mut insert = Pipeline::new(
        FrameExtractor::new(regions()),
        BulkInsertLoader::new(&url, "comuni"),
    );
    insert.run().await?;
    assert_eq!(insert.loaded(), Some(3));

    // Update one population and add a new town
    let changes = Frame::from_rows(
        vec!["regione".into(), "comune".into(), "abitanti".into()],
        vec![
            vec![json!("Lazio"), json!("Roma"), json!(2750000)],
            vec![json!("Campania"), json!("Napoli"), json!(913462)],
        ],
    )?;
    let mut upsert = Pipeline::new(
        FrameExtractor::new(changes),
        UpsertLoader::new(&url, "comuni").update_fields(["abitanti"]),
    );
    upsert.run().await?;
    assert_eq!(upsert.loaded(), Some(2));

    // Read it all back
    let frame = SqlExtractor::new(&url, "SELECT comune, abitanti FROM comuni ORDER BY comune")
        .extract(&EtlContext::new())
        .await?;
    assert_eq!(
        frame.to_json_records(),
        json!([
            {"comune": "Latina", "abitanti": 127564},
            {"comune": "Milano", "abitanti": 1371498},
            {"comune": "Napoli", "abitanti": 913462},
            {"comune": "Roma", "abitanti": 2750000}
        ])
    );

    Ok(())
}

#[tokio::test]
async fn test_pipeline_from_config_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let input = temp_dir.path().join("comuni.csv");
    std::fs::write(&input, "# export\nregione,comune,abitanti\nLazio,Roma,2749031\nMolise,Isernia,NA\n")?;
    let output = temp_dir.path().join("out");

    let config_path = temp_dir.path().join("pipeline.json");
    std::fs::write(
        &config_path,
        serde_json::to_string(&json!({
            "logging": {"level": "debug", "target": "comuni"},
            "extractor": {
                "type": "csv",
                "source": input,
                "sep": ",",
                "skip_rows": 1,
                "dtype": {"abitanti": "int"}
            },
            "transform": {"type": "partition", "column": "regione"},
            "loader": {"type": "csv", "dir": output}
        }))?,
    )?;

    let mut pipeline = PipelineConfig::read(&config_path)?.build(|| {
        Err(eyre::eyre!("no search cluster needed"))
    })?;
    pipeline.run().await?;

    let original = pipeline.original_data().expect("extract ran");
    assert_eq!(original.get(0, "abitanti"), Some(&json!(2749031)));
    assert_eq!(original.get(1, "abitanti"), Some(&Value::Null));

    let molise = std::fs::read_to_string(output.join("Molise.csv"))?;
    assert_eq!(molise, "regione;comune;abitanti\nMolise;Isernia;\n");

    let mut labels: Vec<String> = match pipeline.processed_data() {
        Some(Dataset::Labeled(frames)) => frames.keys().cloned().collect(),
        other => panic!("expected labeled frames, got {:?}", other),
    };
    labels.sort();
    assert_eq!(labels, ["Lazio", "Molise"]);

    Ok(())
}

#[tokio::test]
async fn test_shape_error_names_shape() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut frames = IndexMap::new();
    frames.insert("a".to_string(), regions());
    frames.insert("b".to_string(), regions());

    let two_labels = from_fn(move |_ctx: &EtlContext, _frame: &Frame| {
        Ok(Dataset::Labeled(frames.clone()))
    });
    let mut pipeline = Pipeline::new(
        FrameExtractor::new(regions()),
        BulkInsertLoader::new(sqlite_url(&temp_dir), "comuni"),
    )
    .with_transformation(two_labels);

    let err = pipeline.run().await.err().expect("two labels cannot be one table");
    assert!(err.to_string().contains("labeled frames"));

    Ok(())
}
