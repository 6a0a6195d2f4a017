//! zipenrich ingest library
//!
//! Batch enrichment of group-tagged, password-protected zip archives held on
//! a remote file store.
//!
//! # Flow
//!
//! - **store**: list, read and write remote files (FTP)
//! - **archive**: decrypt the tabular entry of an archive in memory
//! - **reference**: batched identifier lookups against MongoDB
//! - **enrich**: append `dob`/`email` columns to the table
//! - **pipeline**: run the flow per archive and summarize
//!
//! # Example
//!
//! ```no_run
//! use zipenrich_ingest::{Pipeline, PipelineConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::from_env()?;
//!     let summary = Pipeline::new(config).run_live("grp123")?;
//!     println!("{} uploaded, {} skipped", summary.uploaded, summary.skipped());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod archive;
pub mod config;
pub mod enrich;
pub mod pipeline;
pub mod reference;
pub mod report;
pub mod retry;
pub mod store;
pub mod table;

pub use config::PipelineConfig;
pub use pipeline::{FileFailure, FileOutcome, Pipeline, PipelineError, RunState, RunSummary, Stage};
pub use report::{BarReporter, NoopReporter, ProgressReporter};
pub use retry::RetryPolicy;
