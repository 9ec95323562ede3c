//! Ingestion progress reporting.
//!
//! Each pipeline step is announced when it starts and summarized when it
//! finishes, so a long upload or import is visibly "in flight". Progress is
//! emitted on **stderr**; stdout carries only the run summary and stays
//! parseable for scripts.

use std::io::Write;

/// Pipeline steps, in execution order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IngestStep {
    Load,
    Normalize,
    Build,
    Upload,
    Import,
}

impl IngestStep {
    pub const ALL: [IngestStep; 5] = [
        IngestStep::Load,
        IngestStep::Normalize,
        IngestStep::Build,
        IngestStep::Upload,
        IngestStep::Import,
    ];

    /// 1-based position, as shown in `[STEP n]`.
    pub fn number(self) -> usize {
        match self {
            IngestStep::Load => 1,
            IngestStep::Normalize => 2,
            IngestStep::Build => 3,
            IngestStep::Upload => 4,
            IngestStep::Import => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IngestStep::Load => "load",
            IngestStep::Normalize => "normalize",
            IngestStep::Build => "build",
            IngestStep::Upload => "upload",
            IngestStep::Import => "import",
        }
    }

    fn label(self) -> &'static str {
        match self {
            IngestStep::Load => "Loading raw metadata",
            IngestStep::Normalize => "Normalizing metadata",
            IngestStep::Build => "Building corpus text file",
            IngestStep::Upload => "Uploading corpus file to blob storage",
            IngestStep::Import => "Importing file into corpus",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum IngestProgressEvent {
    Started { step: IngestStep, detail: String },
    Finished { step: IngestStep, detail: String },
    /// Step intentionally not run (dry run).
    Skipped { step: IngestStep },
}

pub trait IngestProgressReporter: Send + Sync {
    fn report(&self, event: IngestProgressEvent);
}

/// `[STEP 4] Uploading corpus file to blob storage: metadata_tagging_file.txt`
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let line = match &event {
            IngestProgressEvent::Started { step, detail } if detail.is_empty() => {
                format!("[STEP {}] {}...\n", step.number(), step.label())
            }
            IngestProgressEvent::Started { step, detail } => {
                format!("[STEP {}] {}: {}\n", step.number(), step.label(), detail)
            }
            IngestProgressEvent::Finished { step, detail } => {
                format!("[STEP {}] done: {}\n", step.number(), detail)
            }
            IngestProgressEvent::Skipped { step } => {
                format!("[STEP {}] {} skipped (dry run)\n", step.number(), step.as_str())
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// One JSON object per line on stderr.
pub struct JsonProgress;

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgressEvent) {
        let obj = match &event {
            IngestProgressEvent::Started { step, detail } => serde_json::json!({
                "event": "progress",
                "step": step.number(),
                "name": step.as_str(),
                "status": "started",
                "detail": detail
            }),
            IngestProgressEvent::Finished { step, detail } => serde_json::json!({
                "event": "progress",
                "step": step.number(),
                "name": step.as_str(),
                "status": "finished",
                "detail": detail
            }),
            IngestProgressEvent::Skipped { step } => serde_json::json!({
                "event": "progress",
                "step": step.number(),
                "name": step.as_str(),
                "status": "skipped"
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

/// `--progress` value.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    #[default]
    Human,
    Json,
}

impl ProgressMode {
    pub fn reporter(&self) -> Box<dyn IngestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
