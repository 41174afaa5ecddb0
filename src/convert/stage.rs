//! Conversion stage wiring configuration into per-item execution.

use std::sync::Arc;

use async_stream::try_stream;
use futures_core::Stream;

use crate::config::{ConfigError, EngineConfig, ResourceConfig};
use crate::extraction::{DocumentExtractor, ExtractionApi, ExtractionError};
use crate::metrics::{ConversionMetrics, MetricsSnapshot};
use crate::queries::{QueryMap, invoice_queries};
use crate::vectorstore::Vectorstore;

use super::types::{
    ConversionOutcome, ConvertError, FileItem, MERGE_KEY_FIELD, StructuredRecord, TableContract,
    WriteDisposition,
};

/// Pipeline stage turning file references into structured records.
///
/// Configuration is resolved up front: the vectorstore name, the query set,
/// and the execution mode are fixed for the lifetime of the stage. Items are
/// converted one at a time, in the order the caller delivers them; the
/// concurrent mode only overlaps the per-query work inside a single item.
pub struct ConversionStage {
    queries: QueryMap,
    vectorstore: Vectorstore,
    contract: TableContract,
    run_async: bool,
    engine: Arc<dyn ExtractionApi>,
    metrics: Arc<ConversionMetrics>,
}

impl std::fmt::Debug for ConversionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionStage")
            .field("queries", &self.queries)
            .field("vectorstore", &self.vectorstore)
            .field("contract", &self.contract)
            .field("run_async", &self.run_async)
            .finish_non_exhaustive()
    }
}

impl ConversionStage {
    /// Wire a stage from resource configuration and an extraction engine.
    ///
    /// Substitutes the built-in invoice queries when the caller supplies none
    /// and resolves the vectorstore name immediately, so a misconfigured
    /// stage fails here rather than on the first item.
    pub fn configure(
        config: ResourceConfig,
        engine: Arc<dyn ExtractionApi>,
    ) -> Result<Self, ConfigError> {
        let vectorstore: Vectorstore = config
            .vectorstore
            .parse()
            .map_err(|()| ConfigError::UnknownVectorstore(config.vectorstore.clone()))?;

        let queries = match config.queries {
            Some(queries) if !queries.is_empty() => queries,
            _ => invoice_queries(),
        };

        let contract = TableContract {
            table_name: config.table_name,
            write_disposition: WriteDisposition::Merge,
            merge_key: MERGE_KEY_FIELD,
            primary_key: MERGE_KEY_FIELD,
        };

        tracing::debug!(
            table = %contract.table_name,
            vectorstore = %vectorstore,
            queries = queries.len(),
            run_async = config.run_async,
            "Conversion stage configured"
        );

        Ok(Self {
            queries,
            vectorstore,
            contract,
            run_async: config.run_async,
            engine,
            metrics: Arc::new(ConversionMetrics::new()),
        })
    }

    /// Wire a stage and build its [`DocumentExtractor`] from engine
    /// configuration in one call.
    ///
    /// An `openai_api_key` on the resource configuration overrides the one on
    /// the engine configuration before the provider clients are built.
    pub fn from_config(
        config: ResourceConfig,
        engine_config: EngineConfig,
    ) -> Result<Self, ConfigError> {
        let vectorstore: Vectorstore = config
            .vectorstore
            .parse()
            .map_err(|()| ConfigError::UnknownVectorstore(config.vectorstore.clone()))?;
        let engine_config = engine_config.with_api_key(config.openai_api_key.clone());
        let extractor = DocumentExtractor::from_config(vectorstore, &engine_config)?;
        Self::configure(config, Arc::new(extractor))
    }

    /// Convert one item into at most one structured record.
    ///
    /// Items without a usable `file_path` are dropped without a log line.
    /// Files the engine reports as having an unsupported format are dropped
    /// with a warning. Every other failure is returned to the caller.
    pub async fn convert(&self, item: FileItem) -> Result<Option<StructuredRecord>, ConvertError> {
        self.metrics.record_received();

        let Some(file_path) = item.file_path().map(str::to_string) else {
            self.metrics.record_missing_path();
            return Ok(None);
        };

        let result = if self.run_async {
            tracing::info!(file = %file_path, "Running extraction concurrently");
            self.engine
                .extract_concurrent(&file_path, &self.queries)
                .await
        } else {
            self.engine.extract(&file_path, &self.queries).await
        };

        match result {
            Ok(fields) => {
                let mut metadata = item.into_inner();
                metadata.remove("file_path");
                self.metrics.record_emitted();
                Ok(Some(StructuredRecord {
                    fields,
                    file_path,
                    metadata,
                }))
            }
            Err(ExtractionError::UnsupportedFormat { path, reason }) => {
                tracing::warn!(
                    file = %path,
                    reason = %reason,
                    "File has unsupported format; skipping"
                );
                self.metrics.record_unsupported();
                Ok(None)
            }
            Err(error) => Err(ConvertError::Extraction(error)),
        }
    }

    /// Convert a sequence of items into a stream of records, in input order.
    ///
    /// Skipped items produce no stream element; the first fatal error ends
    /// the stream.
    pub fn convert_stream<'a, I>(
        &'a self,
        items: I,
    ) -> impl Stream<Item = Result<StructuredRecord, ConvertError>> + 'a
    where
        I: IntoIterator<Item = FileItem> + 'a,
    {
        try_stream! {
            for item in items {
                if let Some(record) = self.convert(item).await? {
                    yield record;
                }
            }
        }
    }

    /// Convert a batch of items, collecting records and counting skips.
    pub async fn convert_batch(
        &self,
        items: Vec<FileItem>,
    ) -> Result<ConversionOutcome, ConvertError> {
        let mut records = Vec::new();
        let mut skipped = 0;
        for item in items {
            match self.convert(item).await? {
                Some(record) => records.push(record),
                None => skipped += 1,
            }
        }
        Ok(ConversionOutcome { records, skipped })
    }

    /// Convert one item from synchronous code.
    ///
    /// Spins up a fresh runtime per call; must not be called from inside an
    /// async context.
    pub fn convert_blocking(
        &self,
        item: FileItem,
    ) -> Result<Option<StructuredRecord>, ConvertError> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.convert(item))
    }

    /// Queries bound to this stage.
    pub fn queries(&self) -> &QueryMap {
        &self.queries
    }

    /// Backend selected at configuration time.
    pub fn vectorstore(&self) -> Vectorstore {
        self.vectorstore
    }

    /// Whether per-query extraction calls overlap.
    pub fn run_async(&self) -> bool {
        self.run_async
    }

    /// Destination table declaration for the host pipeline.
    pub fn contract(&self) -> &TableContract {
        &self.contract
    }

    /// Current counters for this stage.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures_util::{StreamExt, pin_mut};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeEngine {
        calls: Mutex<Vec<(String, bool)>>,
    }

    impl FakeEngine {
        fn answer(
            &self,
            file_path: &str,
            queries: &QueryMap,
            concurrent: bool,
        ) -> Result<BTreeMap<String, String>, ExtractionError> {
            self.calls
                .lock()
                .unwrap()
                .push((file_path.to_string(), concurrent));
            if file_path.ends_with(".xyz") {
                return Err(ExtractionError::UnsupportedFormat {
                    path: file_path.to_string(),
                    reason: "no loader registered for extension 'xyz'".to_string(),
                });
            }
            if file_path.ends_with("broken.txt") {
                return Err(ExtractionError::EmptyDocument {
                    path: file_path.to_string(),
                });
            }
            Ok(queries
                .keys()
                .map(|field| (field.clone(), format!("value for {field}")))
                .collect())
        }
    }

    #[async_trait]
    impl ExtractionApi for FakeEngine {
        async fn extract(
            &self,
            file_path: &str,
            queries: &QueryMap,
        ) -> Result<BTreeMap<String, String>, ExtractionError> {
            self.answer(file_path, queries, false)
        }

        async fn extract_concurrent(
            &self,
            file_path: &str,
            queries: &QueryMap,
        ) -> Result<BTreeMap<String, String>, ExtractionError> {
            self.answer(file_path, queries, true)
        }
    }

    fn stage_with(config: ResourceConfig) -> (ConversionStage, Arc<FakeEngine>) {
        let engine = Arc::new(FakeEngine::default());
        let stage = ConversionStage::configure(config, engine.clone()).expect("configure");
        (stage, engine)
    }

    fn two_queries() -> QueryMap {
        QueryMap::from([
            (
                "invoice_number".to_string(),
                "What is the invoice number?".to_string(),
            ),
            ("total".to_string(), "What is the total?".to_string()),
        ])
    }

    #[tokio::test]
    async fn item_without_file_path_is_dropped_silently() {
        let (stage, engine) = stage_with(ResourceConfig::default());

        let result = stage.convert(FileItem::default()).await.expect("convert");
        assert!(result.is_none());
        assert!(engine.calls.lock().unwrap().is_empty());

        let snapshot = stage.metrics_snapshot();
        assert_eq!(snapshot.items_received, 1);
        assert_eq!(snapshot.missing_path_skipped, 1);
        assert_eq!(snapshot.records_emitted, 0);
    }

    #[tokio::test]
    async fn record_merges_fields_path_and_metadata() {
        let (stage, _) = stage_with(ResourceConfig {
            queries: Some(two_queries()),
            ..ResourceConfig::default()
        });

        let item = FileItem::from_path("/inbox/invoice.pdf")
            .insert("data_hash", json!("abc123"))
            .insert("source", json!("mailbox"));
        let record = stage
            .convert(item)
            .await
            .expect("convert")
            .expect("record emitted");

        assert_eq!(record.file_path, "/inbox/invoice.pdf");
        assert_eq!(record.fields["invoice_number"], "value for invoice_number");
        assert_eq!(record.fields["total"], "value for total");
        assert!(record.metadata.get("file_path").is_none());
        assert_eq!(record.metadata["data_hash"], json!("abc123"));
        assert_eq!(record.metadata["source"], json!("mailbox"));
    }

    #[tokio::test]
    async fn unsupported_format_skips_and_processing_continues() {
        let (stage, _) = stage_with(ResourceConfig::default());

        let outcome = stage
            .convert_batch(vec![
                FileItem::from_path("/inbox/archive.xyz"),
                FileItem::from_path("/inbox/invoice.pdf"),
            ])
            .await
            .expect("batch");

        assert_eq!(outcome.emitted(), 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.records[0].file_path, "/inbox/invoice.pdf");
        assert_eq!(stage.metrics_snapshot().unsupported_skipped, 1);
    }

    #[tokio::test]
    async fn other_engine_failures_propagate() {
        let (stage, _) = stage_with(ResourceConfig::default());

        let error = stage
            .convert(FileItem::from_path("/inbox/broken.txt"))
            .await
            .expect_err("must propagate");
        assert!(matches!(
            error,
            ConvertError::Extraction(ExtractionError::EmptyDocument { .. })
        ));
    }

    #[test]
    fn unknown_vectorstore_fails_at_configure_time() {
        let engine = Arc::new(FakeEngine::default());
        let error = ConversionStage::configure(
            ResourceConfig {
                vectorstore: "qdrant".to_string(),
                ..ResourceConfig::default()
            },
            engine,
        )
        .expect_err("unknown backend must fail");

        assert!(matches!(
            error,
            ConfigError::UnknownVectorstore(name) if name == "qdrant"
        ));
    }

    #[tokio::test]
    async fn default_queries_are_bound_when_none_supplied() {
        let (stage, _) = stage_with(ResourceConfig::default());
        assert_eq!(stage.queries(), &invoice_queries());

        let (stage, _) = stage_with(ResourceConfig {
            queries: Some(QueryMap::new()),
            ..ResourceConfig::default()
        });
        assert_eq!(stage.queries(), &invoice_queries());

        let record = stage
            .convert(FileItem::from_path("/inbox/invoice.pdf"))
            .await
            .expect("convert")
            .expect("record emitted");
        assert!(record.fields.contains_key("invoice_number"));
        assert!(record.fields.contains_key("invoice_amount"));
    }

    #[tokio::test]
    async fn run_async_selects_the_concurrent_engine_path() {
        let (stage, engine) = stage_with(ResourceConfig {
            run_async: true,
            ..ResourceConfig::default()
        });
        stage
            .convert(FileItem::from_path("/inbox/invoice.pdf"))
            .await
            .expect("convert");

        let calls = engine.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1, "expected the concurrent path");

        let (stage, engine) = stage_with(ResourceConfig::default());
        stage
            .convert(FileItem::from_path("/inbox/invoice.pdf"))
            .await
            .expect("convert");
        assert!(!engine.calls.lock().unwrap()[0].1);
    }

    #[tokio::test]
    async fn sync_and_concurrent_paths_emit_the_same_key_set() {
        let (sequential, _) = stage_with(ResourceConfig::default());
        let (concurrent, _) = stage_with(ResourceConfig {
            run_async: true,
            ..ResourceConfig::default()
        });

        let item = FileItem::from_path("/inbox/invoice.pdf");
        let first = sequential
            .convert(item.clone())
            .await
            .expect("convert")
            .expect("record");
        let second = concurrent
            .convert(item)
            .await
            .expect("convert")
            .expect("record");

        let first_keys: Vec<_> = first.fields.keys().collect();
        let second_keys: Vec<_> = second.fields.keys().collect();
        assert_eq!(first_keys, second_keys);
    }

    #[tokio::test]
    async fn identical_content_yields_identical_merge_keys() {
        let (stage, _) = stage_with(ResourceConfig::default());
        let make_item = || {
            FileItem::from_path("/inbox/invoice.pdf").insert("data_hash", json!("samehash"))
        };

        let first = stage
            .convert(make_item())
            .await
            .expect("convert")
            .expect("record");
        let second = stage
            .convert(make_item())
            .await
            .expect("convert")
            .expect("record");

        assert_eq!(first.data_hash(), second.data_hash());
        assert_eq!(stage.contract().merge_key, "metadata.data_hash");
        assert_eq!(stage.contract().primary_key, "metadata.data_hash");
        assert_eq!(
            stage.contract().write_disposition,
            WriteDisposition::Merge
        );
    }

    #[tokio::test]
    async fn stream_skips_quietly_and_yields_records_in_order() {
        let (stage, _) = stage_with(ResourceConfig::default());
        let items = vec![
            FileItem::from_path("/inbox/first.pdf"),
            FileItem::default(),
            FileItem::from_path("/inbox/second.pdf"),
        ];

        let stream = stage.convert_stream(items);
        pin_mut!(stream);

        let mut paths = Vec::new();
        while let Some(result) = stream.next().await {
            paths.push(result.expect("record").file_path);
        }
        assert_eq!(paths, vec!["/inbox/first.pdf", "/inbox/second.pdf"]);
    }

    #[test]
    fn blocking_wrapper_drives_conversion_to_completion() {
        let (stage, _) = stage_with(ResourceConfig::default());
        let record = stage
            .convert_blocking(FileItem::from_path("/inbox/invoice.pdf"))
            .expect("convert")
            .expect("record");
        assert_eq!(record.file_path, "/inbox/invoice.pdf");
    }
}
