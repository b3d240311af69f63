//! Pipeline orchestration for ETL operations

use super::{EtlContext, Extractor, IdentityTransformation, Loader, Transformation};
use crate::{Dataset, Frame};
use eyre::{Result, eyre};

/// ETL Pipeline that orchestrates Extract, Transform, and Load operations
///
/// The pipeline owns one extractor, one transformation and one loader.
/// `extract()` fills the original data, `transform()` turns it into the
/// processed data and `load()` hands that to the loader. The three calls
/// return the pipeline itself so they can be chained, and [`Pipeline::run`]
/// performs all of them in order.
///
/// # Type Parameters
/// - `E`: Extractor type
/// - `L`: Loader type
/// - `T`: Transformation type, [`IdentityTransformation`] unless replaced
///
/// # Example
/// ```no_run
/// use tabular_etl::etl::{EtlContext, Pipeline};
/// use tabular_etl::extractors::CsvExtractor;
/// use tabular_etl::loaders::CsvLoader;
///
/// # async fn example() -> eyre::Result<()> {
/// let mut pipeline = Pipeline::new(
///     CsvExtractor::new("data/input.csv"),
///     CsvLoader::new("data/out").label("governi"),
/// )
/// .with_context(EtlContext::new().verbose(true));
///
/// pipeline.extract().await?.transform()?.load().await?;
/// println!("Loaded {:?} rows", pipeline.loaded());
/// # Ok(())
/// # }
/// ```
pub struct Pipeline<E, L, T = IdentityTransformation> {
    extractor: E,
    transformation: T,
    loader: L,
    context: EtlContext,
    original_data: Option<Frame>,
    processed_data: Option<Dataset>,
    loaded: Option<usize>,
}

impl<E, L> Pipeline<E, L, IdentityTransformation>
where
    E: Extractor,
    L: Loader,
{
    /// Create a new pipeline passing data through unchanged
    pub fn new(extractor: E, loader: L) -> Self {
        Self {
            extractor,
            transformation: IdentityTransformation,
            loader,
            context: EtlContext::default(),
            original_data: None,
            processed_data: None,
            loaded: None,
        }
    }
}

impl<E, L, T> Pipeline<E, L, T>
where
    E: Extractor,
    L: Loader,
    T: Transformation,
{
    /// Replace the transformation, changing the pipeline type
    pub fn with_transformation<U: Transformation>(self, transformation: U) -> Pipeline<E, L, U> {
        Pipeline {
            extractor: self.extractor,
            transformation,
            loader: self.loader,
            context: self.context,
            original_data: self.original_data,
            processed_data: self.processed_data,
            loaded: self.loaded,
        }
    }

    /// Set the logging context lent to every stage
    pub fn with_context(mut self, context: EtlContext) -> Self {
        self.context = context;
        self
    }

    pub fn set_extractor(&mut self, extractor: E) {
        self.extractor = extractor;
    }

    pub fn set_transformation(&mut self, transformation: T) {
        self.transformation = transformation;
    }

    pub fn set_loader(&mut self, loader: L) {
        self.loader = loader;
    }

    pub fn context(&self) -> &EtlContext {
        &self.context
    }

    /// Table produced by the last `extract()`
    pub fn original_data(&self) -> Option<&Frame> {
        self.original_data.as_ref()
    }

    /// Data produced by the last `transform()`
    pub fn processed_data(&self) -> Option<&Dataset> {
        self.processed_data.as_ref()
    }

    /// Rows reported by the last `load()`
    pub fn loaded(&self) -> Option<usize> {
        self.loaded
    }

    /// Extract data with the extractor and store it as the original data
    ///
    /// # Errors
    /// Returns the extractor's error unchanged
    pub async fn extract(&mut self) -> Result<&mut Self> {
        self.context.debug("Extracting from source...");
        let frame = self.extractor.extract(&self.context).await?;
        self.context.info(format_args!(
            "Extracted {} rows ({} columns)",
            frame.len(),
            frame.columns().len()
        ));
        self.original_data = Some(frame);
        Ok(self)
    }

    /// Transform the original data into the processed data
    ///
    /// # Errors
    /// Returns an error if nothing was extracted yet, or the
    /// transformation's error unchanged
    pub fn transform(&mut self) -> Result<&mut Self> {
        let original = self
            .original_data
            .as_ref()
            .ok_or_else(|| eyre!("Nothing to transform: extract() has not run"))?;

        self.context.debug("Transforming data...");
        let processed = self.transformation.transform(&self.context, original)?;
        self.context.info(format_args!(
            "Transformed into {} ({} rows)",
            processed.shape(),
            processed.row_count()
        ));
        self.processed_data = Some(processed);
        Ok(self)
    }

    /// Load the processed data with the loader
    ///
    /// # Errors
    /// Returns an error if nothing was transformed yet, or the loader's
    /// error unchanged
    pub async fn load(&mut self) -> Result<&mut Self> {
        let processed = self
            .processed_data
            .as_ref()
            .ok_or_else(|| eyre!("Nothing to load: transform() has not run"))?;

        self.context.debug("Loading to destination...");
        let count = self.loader.load(&self.context, processed).await?;
        self.context.info(format_args!("Loaded {} rows", count));
        self.loaded = Some(count);
        Ok(self)
    }

    /// Run the complete ETL pipeline
    ///
    /// Shortcut for `extract().transform().load()`.
    ///
    /// # Errors
    /// Returns an error if any stage fails
    pub async fn run(&mut self) -> Result<&mut Self> {
        self.context.info("Starting ETL pipeline");
        self.extract().await?.transform()?.load().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::from_fn;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    struct MockExtractor(Frame);

    impl Extractor for MockExtractor {
        async fn extract(&self, _ctx: &EtlContext) -> Result<Frame> {
            Ok(self.0.clone())
        }
    }

    struct FailingExtractor;

    impl Extractor for FailingExtractor {
        async fn extract(&self, _ctx: &EtlContext) -> Result<Frame> {
            Err(eyre!("source unavailable"))
        }
    }

    #[derive(Clone, Default)]
    struct RecordingLoader(Arc<Mutex<Vec<Dataset>>>);

    impl Loader for RecordingLoader {
        async fn load(&self, _ctx: &EtlContext, data: &Dataset) -> Result<usize> {
            self.0.lock().unwrap().push(data.clone());
            Ok(data.row_count())
        }
    }

    fn numbers() -> Frame {
        Frame::from_rows(
            vec!["n".into()],
            vec![vec![json!(1)], vec![json!(2)], vec![json!(3)]],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_pipeline() {
        let loader = RecordingLoader::default();
        let doubled = from_fn(|_ctx, frame: &Frame| {
            let rows = frame
                .rows()
                .iter()
                .map(|r| vec![json!(r[0].as_i64().unwrap_or(0) * 2)])
                .collect();
            Ok(Frame::from_rows(frame.columns().to_vec(), rows)?.into())
        });

        let mut pipeline =
            Pipeline::new(MockExtractor(numbers()), loader.clone()).with_transformation(doubled);
        pipeline.run().await.unwrap();

        assert_eq!(pipeline.loaded(), Some(3));
        let loaded = loader.0.lock().unwrap();
        let frame = loaded[0].single().unwrap();
        assert_eq!(frame.get(2, "n"), Some(&json!(6)));
    }

    #[tokio::test]
    async fn test_run_matches_chained_calls() {
        let chained_loader = RecordingLoader::default();
        let mut chained = Pipeline::new(MockExtractor(numbers()), chained_loader.clone());
        chained.extract().await.unwrap().transform().unwrap().load().await.unwrap();

        let run_loader = RecordingLoader::default();
        let mut shortcut = Pipeline::new(MockExtractor(numbers()), run_loader.clone());
        let returned = shortcut.run().await.unwrap();
        let returned_ptr: *const _ = returned;

        assert_eq!(returned_ptr, &shortcut as *const _);
        assert_eq!(shortcut.original_data(), chained.original_data());
        assert_eq!(shortcut.processed_data(), chained.processed_data());
        assert_eq!(shortcut.loaded(), chained.loaded());
        assert_eq!(*run_loader.0.lock().unwrap(), *chained_loader.0.lock().unwrap());
    }

    #[tokio::test]
    async fn test_transform_before_extract_fails() {
        let mut pipeline = Pipeline::new(MockExtractor(numbers()), RecordingLoader::default());
        assert!(pipeline.transform().is_err());
        assert!(pipeline.load().await.is_err());
    }

    #[tokio::test]
    async fn test_stage_error_propagates() {
        let loader = RecordingLoader::default();
        let mut pipeline = Pipeline::new(FailingExtractor, loader.clone());

        let err = pipeline.run().await.err().unwrap();
        assert_eq!(err.to_string(), "source unavailable");
        assert!(pipeline.original_data().is_none());
        assert!(loader.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_pipeline() {
        let loader = RecordingLoader::default();
        let mut pipeline = Pipeline::new(MockExtractor(Frame::default()), loader.clone());
        pipeline.run().await.unwrap();
        assert_eq!(pipeline.loaded(), Some(0));
    }
}
