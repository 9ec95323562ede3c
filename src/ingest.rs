//! Ingestion pipeline orchestration.
//!
//! One run walks five steps in a fixed order, each consuming the fully
//! materialized output of the previous one:
//!
//! ```text
//! [STEP 1] load      input JSON → raw entries
//! [STEP 2] normalize raw entries → normalized records → normalized JSON file
//! [STEP 3] build     normalized records → corpus text file
//! [STEP 4] upload    corpus text → blob store object (overwrite)
//! [STEP 5] import    blob location → corpus import request
//! ```
//!
//! The first failing step aborts the run; nothing after it executes and
//! nothing is retried here. Normalization failures (identifier collision,
//! no valid records) abort before any file is written. The import is a
//! request only; the run does not wait for the service to finish indexing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::Config;
use crate::corpus_text::build_corpus_text;
use crate::input::load_input;
use crate::models::{BlobLocation, DroppedRecord, ImportAck};
use crate::normalize::Normalizer;
use crate::progress::{IngestProgressEvent, IngestProgressReporter, IngestStep, ProgressMode};
use crate::traits::{create_blob_store, create_corpus_service, BlobStore, CorpusService};

/// What one ingestion run did.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub input_records: usize,
    pub normalized_records: usize,
    pub dropped: Vec<DroppedRecord>,
    pub normalized_path: PathBuf,
    pub corpus_path: PathBuf,
    pub corpus_bytes: usize,
    pub corpus_sha256: String,
    /// `None` on a dry run.
    pub location: Option<BlobLocation>,
    /// `None` on a dry run.
    pub import: Option<ImportAck>,
}

pub struct IngestionDriver {
    config: Config,
    backends: Option<(Arc<dyn BlobStore>, Arc<dyn CorpusService>)>,
    progress: Box<dyn IngestProgressReporter>,
}

impl IngestionDriver {
    /// Driver that can only dry-run until [`with_backends`](Self::with_backends)
    /// is called.
    pub fn new(config: Config, progress: Box<dyn IngestProgressReporter>) -> Self {
        Self {
            config,
            backends: None,
            progress,
        }
    }

    pub fn with_backends(
        mut self,
        blob_store: Arc<dyn BlobStore>,
        corpus: Arc<dyn CorpusService>,
    ) -> Self {
        self.backends = Some((blob_store, corpus));
        self
    }

    /// Run the pipeline. With `dry_run`, steps 4 and 5 are skipped and no
    /// backend is touched.
    pub async fn run(&self, dry_run: bool) -> Result<IngestReport> {
        let backends = match (&self.backends, dry_run) {
            (_, true) => None,
            (Some(b), false) => Some(b),
            (None, false) => bail!("ingestion needs a blob store and a corpus service"),
        };
        let paths = &self.config.paths;

        // 1. Load
        self.started(IngestStep::Load, paths.input.display().to_string());
        let entries = load_input(&paths.input).context("[STEP 1] loading input failed")?;
        self.finished(IngestStep::Load, format!("{} records", entries.len()));

        // 2. Normalize
        self.started(IngestStep::Normalize, String::new());
        let outcome = Normalizer::new(self.config.normalize.clone())
            .normalize(&entries)
            .context("[STEP 2] normalization failed")?;
        let normalized_json = serde_json::to_string_pretty(&outcome.records)?;
        write_replacing(&paths.normalized, normalized_json.as_bytes())
            .await
            .context("[STEP 2] writing normalized metadata failed")?;
        self.finished(
            IngestStep::Normalize,
            format!(
                "{} records, {} dropped → {}",
                outcome.records.len(),
                outcome.dropped.len(),
                paths.normalized.display()
            ),
        );

        // 3. Build
        self.started(IngestStep::Build, String::new());
        let corpus_text =
            build_corpus_text(&outcome.records).context("[STEP 3] building corpus text failed")?;
        write_replacing(&paths.corpus, corpus_text.as_bytes())
            .await
            .context("[STEP 3] writing corpus file failed")?;
        let corpus_sha256 = hex::encode(Sha256::digest(corpus_text.as_bytes()));
        self.finished(
            IngestStep::Build,
            format!("{} bytes → {}", corpus_text.len(), paths.corpus.display()),
        );

        let mut report = IngestReport {
            input_records: entries.len(),
            normalized_records: outcome.records.len(),
            dropped: outcome.dropped,
            normalized_path: paths.normalized.clone(),
            corpus_path: paths.corpus.clone(),
            corpus_bytes: corpus_text.len(),
            corpus_sha256,
            location: None,
            import: None,
        };

        let (blob_store, corpus) = match backends {
            Some((blob_store, corpus)) => (blob_store, corpus),
            None => {
                self.progress.report(IngestProgressEvent::Skipped {
                    step: IngestStep::Upload,
                });
                self.progress.report(IngestProgressEvent::Skipped {
                    step: IngestStep::Import,
                });
                return Ok(report);
            }
        };

        // 4. Upload
        let object_name = self.config.blob_store.object_name();
        self.started(
            IngestStep::Upload,
            format!("{} ({})", object_name, blob_store.name()),
        );
        let location = blob_store
            .put(object_name, corpus_text.as_bytes())
            .await
            .context("[STEP 4] upload failed")?;
        self.finished(IngestStep::Upload, location.uri.clone());

        // 5. Import
        self.started(IngestStep::Import, corpus.name().to_string());
        let ack = corpus
            .import(&location)
            .await
            .context("[STEP 5] corpus import failed")?;
        self.finished(
            IngestStep::Import,
            match ack.operation {
                Some(ref op) => format!("import requested ({})", op),
                None => "import requested".to_string(),
            },
        );

        info!(uri = %location.uri, corpus = %ack.corpus, "ingestion finished");
        report.location = Some(location);
        report.import = Some(ack);
        Ok(report)
    }

    fn started(&self, step: IngestStep, detail: String) {
        self.progress
            .report(IngestProgressEvent::Started { step, detail });
    }

    fn finished(&self, step: IngestStep, detail: String) {
        self.progress
            .report(IngestProgressEvent::Finished { step, detail });
    }
}

/// Replace `path` with `body` via a temporary sibling and a rename.
async fn write_replacing(path: &Path, body: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    tokio::fs::write(&tmp, body)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// CLI entry point for `qrag ingest`.
///
/// Backends are only constructed for a real run, so a dry run needs no
/// cloud credentials.
pub async fn run_ingestion(config: &Config, dry_run: bool, progress: ProgressMode) -> Result<()> {
    println!("=== Question RAG Ingestion ===");

    let mut driver = IngestionDriver::new(config.clone(), progress.reporter());
    if !dry_run {
        let blob_store = create_blob_store(config)?;
        let corpus = create_corpus_service(config, blob_store.clone())?;
        driver = driver.with_backends(blob_store, corpus);
    }

    let report = driver.run(dry_run).await?;
    print_report(&report, dry_run);
    println!("=== Ingestion complete ===");
    Ok(())
}

fn print_report(report: &IngestReport, dry_run: bool) {
    if dry_run {
        println!("ingest (dry-run)");
    }
    println!("  input records: {}", report.input_records);
    println!(
        "  normalized records: {} → {}",
        report.normalized_records,
        report.normalized_path.display()
    );
    println!("  dropped: {}", report.dropped.len());
    for d in &report.dropped {
        println!(
            "    dropped #{} ({}): {}",
            d.position,
            d.id.as_deref().unwrap_or("-"),
            d.reason
        );
    }
    println!(
        "  corpus file: {} ({} bytes, sha256 {})",
        report.corpus_path.display(),
        report.corpus_bytes,
        report.corpus_sha256
    );
    match &report.location {
        Some(loc) => println!("  uploaded: {}", loc.uri),
        None => println!("  upload: skipped"),
    }
    match &report.import {
        Some(ack) => match &ack.operation {
            Some(op) => println!("  import requested: {} (operation {})", ack.corpus, op),
            None => println!("  import requested: {}", ack.corpus),
        },
        None => println!("  import: skipped"),
    }
}
