//! Raw operations of one remote store session

use super::StoreResult;

/// An authenticated session against a remote file store.
///
/// Implementations perform exactly one protocol exchange per call; retries,
/// directory creation fallbacks and filtering live in
/// [`RemoteStoreClient`](super::RemoteStoreClient). Sessions are not shared
/// between threads.
pub trait RemoteSession {
    /// Change the working directory; fails when the directory does not exist
    fn change_dir(&mut self, path: &str) -> StoreResult<()>;

    /// Create a single directory
    fn make_dir(&mut self, path: &str) -> StoreResult<()>;

    /// Entry names in `directory`, in server order
    fn list_names(&mut self, directory: &str) -> StoreResult<Vec<String>>;

    /// Whole file contents
    fn retrieve(&mut self, path: &str) -> StoreResult<Vec<u8>>;

    /// Create or replace a file with `content`
    fn store(&mut self, path: &str, content: &[u8]) -> StoreResult<()>;

    /// End the session. Called exactly once by the owning client.
    fn close(&mut self) -> StoreResult<()>;
}
