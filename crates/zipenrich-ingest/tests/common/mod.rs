//! Test helpers for zipenrich integration tests
//!
//! - [`MemoryStore`]: an in-memory remote file store session
//! - [`MemoryReference`]: an in-memory reference store
//! - fixture loading and a ready-made [`PipelineConfig`]
//!
//! Both fakes append to a shared [`EventLog`] when they are closed so tests
//! can check release order.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::rc::Rc;

use zipenrich_ingest::config::{ArchiveConfig, EnrichConfig, ReferenceConfig, StoreConfig};
use zipenrich_ingest::reference::{ReferenceError, ReferenceLookup, ReferenceRecord};
use zipenrich_ingest::store::{RemoteSession, StoreError, StoreResult};
use zipenrich_ingest::{PipelineConfig, RetryPolicy};

pub const PASSWORD: &str = "s3cret";
pub const SOURCE_DIR: &str = "/inbox";
pub const OUTPUT_DIR: &str = "/outbox";

pub type EventLog = Rc<RefCell<Vec<String>>>;

pub fn fixture(name: &str) -> Vec<u8> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read(&path).unwrap_or_else(|e| panic!("missing fixture {}: {}", path.display(), e))
}

pub fn config() -> PipelineConfig {
    PipelineConfig {
        store: StoreConfig::new("ftp.test", SOURCE_DIR).with_output_dir(OUTPUT_DIR),
        reference: ReferenceConfig::new("mongodb://unused", "crm"),
        archive: ArchiveConfig::with_password(PASSWORD),
        enrich: EnrichConfig::default(),
        retry: RetryPolicy::immediate(3),
    }
}

/// Shared contents of the fake remote store
#[derive(Default)]
pub struct StoreState {
    pub files: BTreeMap<String, Vec<u8>>,
    pub dirs: BTreeSet<String>,
    /// Paths whose upload is refused
    pub refuse_writes: BTreeSet<String>,
    /// Remaining transient failures per path
    pub read_failures: HashMap<String, u32>,
    /// Every RETR issued, in order
    pub reads: Vec<String>,
}

impl StoreState {
    pub fn file_text(&self, path: &str) -> String {
        String::from_utf8(self.files[path].clone()).unwrap()
    }
}

pub struct MemoryStore {
    state: Rc<RefCell<StoreState>>,
    events: EventLog,
}

impl MemoryStore {
    pub fn new(state: Rc<RefCell<StoreState>>, events: EventLog) -> Self {
        Self { state, events }
    }
}

impl RemoteSession for MemoryStore {
    fn change_dir(&mut self, path: &str) -> StoreResult<()> {
        if self.state.borrow().dirs.contains(path) {
            Ok(())
        } else {
            Err(StoreError::operation("CWD", path, "550 No such directory"))
        }
    }

    fn make_dir(&mut self, path: &str) -> StoreResult<()> {
        self.state.borrow_mut().dirs.insert(path.to_string());
        Ok(())
    }

    fn list_names(&mut self, directory: &str) -> StoreResult<Vec<String>> {
        let state = self.state.borrow();
        if !state.dirs.contains(directory) {
            return Err(StoreError::operation("NLST", directory, "550 No such directory"));
        }
        let prefix = format!("{}/", directory.trim_end_matches('/'));
        Ok(state
            .files
            .keys()
            .filter(|path| {
                path.strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.contains('/'))
            })
            .cloned()
            .collect())
    }

    fn retrieve(&mut self, path: &str) -> StoreResult<Vec<u8>> {
        let mut state = self.state.borrow_mut();
        state.reads.push(path.to_string());
        if let Some(remaining) = state.read_failures.get_mut(path) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::operation("RETR", path, "425 Can't open data connection"));
            }
        }
        state
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::operation("RETR", path, "550 No such file"))
    }

    fn store(&mut self, path: &str, content: &[u8]) -> StoreResult<()> {
        let mut state = self.state.borrow_mut();
        if state.refuse_writes.contains(path) {
            return Err(StoreError::operation("STOR", path, "553 Permission denied"));
        }
        state.files.insert(path.to_string(), content.to_vec());
        Ok(())
    }

    fn close(&mut self) -> StoreResult<()> {
        self.events.borrow_mut().push("store closed".to_string());
        Ok(())
    }
}

pub struct MemoryReference {
    records: HashMap<String, ReferenceRecord>,
    /// Identifier lists of every lookup, in order
    pub requests: Rc<RefCell<Vec<Vec<String>>>>,
    events: EventLog,
}

impl MemoryReference {
    pub fn new(events: EventLog) -> Self {
        Self {
            records: HashMap::new(),
            requests: Rc::new(RefCell::new(Vec::new())),
            events,
        }
    }

    pub fn with_record(mut self, id: &str, dob: &str, email: &str) -> Self {
        self.records
            .insert(id.to_string(), ReferenceRecord::new(dob, email));
        self
    }
}

impl ReferenceLookup for MemoryReference {
    fn find_many(&self, ids: &[String]) -> Result<Vec<(String, ReferenceRecord)>, ReferenceError> {
        self.requests.borrow_mut().push(ids.to_vec());
        Ok(ids
            .iter()
            .filter_map(|id| self.records.get(id).map(|r| (id.clone(), r.clone())))
            .collect())
    }
}

impl Drop for MemoryReference {
    fn drop(&mut self) {
        self.events.borrow_mut().push("reference closed".to_string());
    }
}

/// A store with the source directory present and `archives` in it
pub fn store_with(archives: &[(&str, Vec<u8>)]) -> Rc<RefCell<StoreState>> {
    let mut state = StoreState::default();
    state.dirs.insert(SOURCE_DIR.to_string());
    for (name, data) in archives {
        state
            .files
            .insert(format!("{}/{}", SOURCE_DIR, name), data.clone());
    }
    Rc::new(RefCell::new(state))
}
