//! Remote store client with retries, directory handling and filtered listing

use tracing::{debug, info, warn};

use super::{basename, join_remote, RemoteSession, StoreResult};
use crate::config::DEFAULT_OUTPUT_PREFIX;
use crate::retry::RetryPolicy;

/// Owns one [`RemoteSession`] for the duration of a run.
///
/// The session is closed exactly once: by [`close`](Self::close) or, on any
/// other exit path, when the client is dropped.
pub struct RemoteStoreClient<S: RemoteSession> {
    session: S,
    retry: RetryPolicy,
    output_prefix: String,
    closed: bool,
}

impl<S: RemoteSession> RemoteStoreClient<S> {
    /// Open a session through `open`, retrying with `retry`'s backoff.
    ///
    /// Returns the last connection error once attempts are exhausted.
    pub fn connect<F>(retry: RetryPolicy, open: F) -> StoreResult<Self>
    where
        F: FnMut() -> StoreResult<S>,
    {
        let session = retry.run("Remote store connection", open)?;
        Ok(Self::with_session(session, retry))
    }

    /// Wrap an already open session
    pub fn with_session(session: S, retry: RetryPolicy) -> Self {
        Self {
            session,
            retry,
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            closed: false,
        }
    }

    /// Prefix added to names passed to [`write_all`](Self::write_all)
    pub fn with_output_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.output_prefix = prefix.into();
        self
    }

    /// Name a file is uploaded under: `updated_<name>` by default
    pub fn output_name(&self, name: &str) -> String {
        format!("{}{}", self.output_prefix, name)
    }

    /// Make sure `path` exists.
    ///
    /// Tries a single create first, then falls back to creating every
    /// segment from the root down, ignoring segments that already exist.
    pub fn ensure_directory(&mut self, path: &str) {
        if self.session.change_dir(path).is_ok() {
            debug!("Remote directory exists: {}", path);
            return;
        }

        match self.session.make_dir(path) {
            Ok(()) => info!("Created remote directory: {}", path),
            Err(e) => {
                warn!("Failed to create {}: {}", path, e);

                let mut current = String::new();
                for part in path.split('/').filter(|p| !p.is_empty()) {
                    current.push('/');
                    current.push_str(part);

                    if self.session.change_dir(&current).is_ok() {
                        continue;
                    }
                    if let Err(e) = self.session.make_dir(&current) {
                        debug!("Ignoring mkdir failure for {}: {}", current, e);
                    }
                }

                info!("Ensured remote directory: {}", path);
            },
        }
    }

    /// Names in `directory` containing `substring` (case-insensitive) and
    /// ending with `suffix`.
    ///
    /// Duplicates are dropped, keeping the first occurrence. A directory that
    /// cannot be listed yields an empty list.
    pub fn list_matching(&mut self, directory: &str, substring: &str, suffix: &str) -> Vec<String> {
        let names = match self.session.list_names(directory) {
            Ok(names) => names,
            Err(e) => {
                warn!("Error listing files in {}: {}", directory, e);
                return Vec::new();
            },
        };

        let needle = substring.to_lowercase();
        let mut matching: Vec<String> = Vec::new();
        for name in names.iter().map(|n| basename(n)) {
            if name.to_lowercase().contains(&needle)
                && name.ends_with(suffix)
                && !matching.iter().any(|m| m == name)
            {
                matching.push(name.to_string());
            }
        }

        info!(
            "Listed files in {}: found {} matching {} files",
            directory,
            matching.len(),
            suffix
        );
        matching
    }

    /// Read a whole file into memory, retrying transient failures
    pub fn read_all(&mut self, path: &str) -> StoreResult<Vec<u8>> {
        let session = &mut self.session;
        let data = self
            .retry
            .run(&format!("Read of {}", path), || session.retrieve(path))?;
        info!("Read from remote store: {} ({} bytes)", path, data.len());
        Ok(data)
    }

    /// Upload `content` as `<output prefix><name>` inside `directory`.
    ///
    /// Returns the remote path written. Not retried.
    pub fn write_all(&mut self, directory: &str, name: &str, content: &[u8]) -> StoreResult<String> {
        let path = join_remote(directory, &self.output_name(name));
        self.session.store(&path, content)?;
        info!("Uploaded {} ({} bytes)", path, content.len());
        Ok(path)
    }

    /// Close the session now instead of at drop
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        match self.session.close() {
            Ok(()) => debug!("Remote store session closed"),
            Err(e) => warn!("Failed to close remote store session: {}", e),
        }
    }
}

impl<S: RemoteSession> Drop for RemoteStoreClient<S> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use std::cell::RefCell;
    use std::collections::{BTreeSet, HashMap};
    use std::rc::Rc;

    /// Scripted session recording every call
    #[derive(Default)]
    struct Scripted {
        dirs: BTreeSet<String>,
        refuse_mkdir: BTreeSet<String>,
        listing: Option<Vec<String>>,
        files: HashMap<String, Vec<u8>>,
        read_failures: u32,
        calls: Rc<RefCell<Vec<String>>>,
    }

    impl RemoteSession for Scripted {
        fn change_dir(&mut self, path: &str) -> StoreResult<()> {
            self.calls.borrow_mut().push(format!("cwd {}", path));
            if self.dirs.contains(path) {
                Ok(())
            } else {
                Err(StoreError::operation("CWD", path, "550"))
            }
        }

        fn make_dir(&mut self, path: &str) -> StoreResult<()> {
            self.calls.borrow_mut().push(format!("mkd {}", path));
            if self.refuse_mkdir.contains(path) {
                return Err(StoreError::operation("MKD", path, "550 parent missing"));
            }
            self.dirs.insert(path.to_string());
            Ok(())
        }

        fn list_names(&mut self, directory: &str) -> StoreResult<Vec<String>> {
            self.listing
                .clone()
                .ok_or_else(|| StoreError::operation("NLST", directory, "550"))
        }

        fn retrieve(&mut self, path: &str) -> StoreResult<Vec<u8>> {
            self.calls.borrow_mut().push(format!("retr {}", path));
            if self.read_failures > 0 {
                self.read_failures -= 1;
                return Err(StoreError::operation("RETR", path, "425 timeout"));
            }
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| StoreError::operation("RETR", path, "550"))
        }

        fn store(&mut self, path: &str, content: &[u8]) -> StoreResult<()> {
            self.files.insert(path.to_string(), content.to_vec());
            Ok(())
        }

        fn close(&mut self) -> StoreResult<()> {
            self.calls.borrow_mut().push("quit".to_string());
            Ok(())
        }
    }

    fn client(session: Scripted) -> RemoteStoreClient<Scripted> {
        RemoteStoreClient::with_session(session, RetryPolicy::immediate(3))
    }

    #[test]
    fn test_ensure_directory_existing_is_noop() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut session = Scripted {
            calls: calls.clone(),
            ..Default::default()
        };
        session.dirs.insert("/out".to_string());

        client(session).ensure_directory("/out");
        assert_eq!(calls.borrow()[0], "cwd /out");
        assert!(!calls.borrow().iter().any(|c| c.starts_with("mkd")));
    }

    #[test]
    fn test_ensure_directory_falls_back_to_segments() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut session = Scripted {
            calls: calls.clone(),
            ..Default::default()
        };
        session.dirs.insert("/remote".to_string());
        session.refuse_mkdir.insert("/remote/path/out".to_string());

        let mut client = client(session);
        client.ensure_directory("/remote/path/out");

        let calls = calls.borrow();
        let mkdirs: Vec<&String> = calls.iter().filter(|c| c.starts_with("mkd")).collect();
        // Whole path refused, then the missing segments are created top-down;
        // the final segment is refused again and tolerated.
        assert_eq!(
            mkdirs,
            vec!["mkd /remote/path/out", "mkd /remote/path", "mkd /remote/path/out"]
        );
    }

    #[test]
    fn test_list_matching_filters_and_dedupes() {
        let session = Scripted {
            listing: Some(vec![
                "/in/GRP123_a.zip".to_string(),
                "grp123_b.ZIP".to_string(),
                "grp999_c.zip".to_string(),
                "notes_grp123.txt".to_string(),
                "grp123_a.zip".to_string(),
            ]),
            ..Default::default()
        };

        let names = client(session).list_matching("/in", "grp123", ".zip");
        assert_eq!(names, vec!["GRP123_a.zip".to_string(), "grp123_a.zip".to_string()]);
    }

    #[test]
    fn test_list_matching_unlistable_directory_is_empty() {
        let names = client(Scripted::default()).list_matching("/missing", "grp", ".zip");
        assert!(names.is_empty());
    }

    #[test]
    fn test_read_all_retries_transient_failures() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut session = Scripted {
            read_failures: 2,
            calls: calls.clone(),
            ..Default::default()
        };
        session.files.insert("/in/a.zip".to_string(), b"PK".to_vec());

        let data = client(session).read_all("/in/a.zip").unwrap();
        assert_eq!(data, b"PK");
        assert_eq!(calls.borrow().iter().filter(|c| c.starts_with("retr")).count(), 3);
    }

    #[test]
    fn test_read_all_gives_up_after_policy() {
        let session = Scripted {
            read_failures: 5,
            ..Default::default()
        };
        let err = client(session).read_all("/in/a.zip").unwrap_err();
        assert!(err.to_string().contains("425"));
    }

    #[test]
    fn test_write_all_uses_output_prefix() {
        let mut client = client(Scripted::default());
        let path = client.write_all("/out/", "grp1_a.csv", b"userid\n1\n").unwrap();
        assert_eq!(path, "/out/updated_grp1_a.csv");
        assert_eq!(client.session.files.get(&path).unwrap(), b"userid\n1\n");
    }

    #[test]
    fn test_session_closed_exactly_once() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let session = Scripted {
            calls: calls.clone(),
            ..Default::default()
        };

        client(session).close();
        assert_eq!(calls.borrow().iter().filter(|c| *c == "quit").count(), 1);

        let session = Scripted {
            calls: calls.clone(),
            ..Default::default()
        };
        drop(client(session));
        assert_eq!(calls.borrow().iter().filter(|c| *c == "quit").count(), 2);
    }

    #[test]
    fn test_connect_retries_then_fails() {
        let mut attempts = 0;
        let result = RemoteStoreClient::<Scripted>::connect(RetryPolicy::immediate(3), || {
            attempts += 1;
            Err(StoreError::connect("ftp:21", "connection refused"))
        });

        assert!(matches!(result, Err(StoreError::Connect { .. })));
        assert_eq!(attempts, 3);
    }
}
