//! Run orchestration
//!
//! A run connects to the reference store and then the remote store, lists the
//! archives of one group and pushes each through
//! `Read -> Decode -> Resolve/Transform -> Write`. A failing file is recorded
//! and skipped; only a failed connection aborts the run. Connections are
//! released in reverse order of acquisition on every exit path.

use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::archive::decode_payload;
use crate::config::PipelineConfig;
use crate::enrich::{enrich_payload, EnrichOptions, TransformError};
use crate::reference::{MongoReferenceStore, ReferenceCache, ReferenceError, ReferenceLookup};
use crate::report::{NoopReporter, ProgressReporter};
use crate::store::{ArchiveEntry, FtpSession, RemoteSession, RemoteStoreClient, StoreError, StoreResult};

/// Names echoed in the discovery log line
const PREVIEW_LEN: usize = 5;

/// Fatal run errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Remote store unavailable: {0}")]
    StoreConnect(#[source] StoreError),

    #[error("Reference store unavailable: {0}")]
    ReferenceConnect(#[source] ReferenceError),
}

/// Step of the per-file flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Read,
    Decode,
    Resolve,
    Transform,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Read => "read",
            Self::Decode => "decode",
            Self::Resolve => "resolve",
            Self::Transform => "transform",
            Self::Write => "write",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Connecting,
    Listing,
    /// Zero-based index into the listing
    ProcessingFiles(usize),
    Finalizing,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => f.write_str("Connecting"),
            Self::Listing => f.write_str("Listing archives"),
            Self::ProcessingFiles(i) => write!(f, "Processing archive {}", i + 1),
            Self::Finalizing => f.write_str("Finalizing"),
        }
    }
}

/// Why one archive was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub file: String,
    pub stage: Stage,
    pub reason: String,
}

impl FileFailure {
    pub fn new(file: impl Into<String>, stage: Stage, reason: impl fmt::Display) -> Self {
        Self {
            file: file.into(),
            stage,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Uploaded { path: String },
    Skipped(FileFailure),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub discovered: usize,
    pub uploaded: usize,
    pub failures: Vec<FileFailure>,
}

impl RunSummary {
    pub fn skipped(&self) -> usize {
        self.failures.len()
    }
}

pub struct Pipeline<R: ProgressReporter = NoopReporter> {
    config: PipelineConfig,
    reporter: R,
    verbose: bool,
}

impl Pipeline<NoopReporter> {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            reporter: NoopReporter,
            verbose: false,
        }
    }
}

impl<R: ProgressReporter> Pipeline<R> {
    pub fn with_reporter<T: ProgressReporter>(self, reporter: T) -> Pipeline<T> {
        Pipeline {
            config: self.config,
            reporter,
            verbose: self.verbose,
        }
    }

    /// Log the destination of every upload
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    pub fn into_reporter(self) -> R {
        self.reporter
    }

    /// Run against MongoDB and FTP as configured
    pub fn run_live(&mut self, group_id: &str) -> Result<RunSummary, PipelineError> {
        let reference = self.config.reference.clone();
        let store = self.config.store.clone();
        self.run(
            group_id,
            || MongoReferenceStore::connect(&reference),
            || FtpSession::open(&store),
        )
    }

    /// Process every archive of `group_id`.
    ///
    /// `connect_reference` is called once. `connect_store` is retried
    /// according to the configured policy. Per-file failures end up in the
    /// returned summary.
    pub fn run<L, S, C, O>(
        &mut self,
        group_id: &str,
        connect_reference: C,
        connect_store: O,
    ) -> Result<RunSummary, PipelineError>
    where
        L: ReferenceLookup,
        S: RemoteSession,
        C: FnOnce() -> Result<L, ReferenceError>,
        O: FnMut() -> StoreResult<S>,
    {
        self.reporter.state_changed(RunState::Connecting);

        let reference = connect_reference().map_err(PipelineError::ReferenceConnect)?;
        let mut client = RemoteStoreClient::connect(self.config.retry, connect_store)
            .map_err(PipelineError::StoreConnect)?
            .with_output_prefix(self.config.enrich.output_prefix.clone());

        let summary = self.process(group_id, &reference, &mut client);

        self.reporter.state_changed(RunState::Finalizing);
        client.close();
        drop(reference);
        debug!("Released remote store and reference store");

        info!(
            discovered = summary.discovered,
            uploaded = summary.uploaded,
            skipped = summary.skipped(),
            "Run complete for group {}: {} discovered, {} uploaded, {} skipped",
            group_id,
            summary.discovered,
            summary.uploaded,
            summary.skipped()
        );
        self.reporter.run_finished(&summary);

        Ok(summary)
    }

    fn process<L, S>(
        &mut self,
        group_id: &str,
        reference: &L,
        client: &mut RemoteStoreClient<S>,
    ) -> RunSummary
    where
        L: ReferenceLookup,
        S: RemoteSession,
    {
        client.ensure_directory(&self.config.store.source_dir);
        client.ensure_directory(&self.config.store.output_dir);

        self.reporter.state_changed(RunState::Listing);
        let names = client.list_matching(
            &self.config.store.source_dir,
            group_id,
            &self.config.archive.archive_suffix,
        );

        let mut summary = RunSummary {
            discovered: names.len(),
            ..RunSummary::default()
        };

        if names.is_empty() {
            info!("No archives found for group {}", group_id);
            return summary;
        }
        info!(
            "Found {} archives for group {}: {}",
            names.len(),
            group_id,
            preview(&names)
        );
        self.reporter.run_started(names.len());

        let mut cache = ReferenceCache::new(reference);
        for (index, name) in names.iter().enumerate() {
            self.reporter.state_changed(RunState::ProcessingFiles(index));

            let entry = ArchiveEntry::new(name.as_str(), self.config.store.source_dir.as_str());
            let outcome = match self.process_file(&entry, &mut cache, client) {
                Ok(path) => {
                    summary.uploaded += 1;
                    if self.verbose {
                        info!(file = %name, "Uploaded enriched table to {}", path);
                    }
                    FileOutcome::Uploaded { path }
                },
                Err(failure) => {
                    warn!(
                        file = %failure.file,
                        stage = %failure.stage,
                        "Skipping {}: {}",
                        failure.file,
                        failure.reason
                    );
                    summary.failures.push(failure.clone());
                    FileOutcome::Skipped(failure)
                },
            };
            self.reporter.file_finished(name, &outcome);
        }

        debug!("Reference lookups issued: {}", cache.round_trips());
        summary
    }

    /// Returns the uploaded path
    fn process_file<L, S>(
        &self,
        entry: &ArchiveEntry,
        cache: &mut ReferenceCache<'_, L>,
        client: &mut RemoteStoreClient<S>,
    ) -> Result<String, FileFailure>
    where
        L: ReferenceLookup,
        S: RemoteSession,
    {
        let name = entry.name.as_str();
        let archive = &self.config.archive;

        let blob = client
            .read_all(&entry.path())
            .map_err(|e| FileFailure::new(name, Stage::Read, e))?;

        let payload = decode_payload(blob, &archive.password, &archive.payload_suffix, name)
            .map_err(|e| FileFailure::new(name, Stage::Decode, e))?;
        debug!(file = %name, "Decoded payload {}", payload.name);

        let options = EnrichOptions::for_archive(&self.config.enrich, name);
        let enriched = enrich_payload(&payload.data, name, &options, |ids| cache.resolve(ids))
            .map_err(|e| match e {
                TransformError::Reference { .. } => FileFailure::new(name, Stage::Resolve, e),
                TransformError::InvalidStructure { .. } => {
                    FileFailure::new(name, Stage::Transform, e)
                },
            })?;

        client
            .write_all(&self.config.store.output_dir, &archive.payload_name(name), &enriched)
            .map_err(|e| FileFailure::new(name, Stage::Write, e))
    }
}

/// `a, b, c, d, e, ...`
fn preview(names: &[String]) -> String {
    let mut shown = names
        .iter()
        .take(PREVIEW_LEN)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if names.len() > PREVIEW_LEN {
        shown.push_str(", ...");
    }
    shown
}
