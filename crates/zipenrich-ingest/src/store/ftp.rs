//! FTP implementation of [`RemoteSession`]
//!
//! One control connection is opened per run and reused for every archive.
//! Transfers use binary mode and Extended Passive Mode (EPSV) for better
//! NAT/firewall compatibility.

use suppaftp::types::FileType;
use suppaftp::{FtpStream, Mode};
use tracing::{debug, info, warn};

use super::{RemoteSession, StoreError, StoreResult};
use crate::config::StoreConfig;

pub struct FtpSession {
    stream: Option<FtpStream>,
    address: String,
}

impl FtpSession {
    /// Connect and log in. Single attempt; retries belong to the caller.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let address = config.address();
        debug!("Connecting to FTP server: {}", address);

        let mut stream =
            FtpStream::connect(&address).map_err(|e| StoreError::connect(&address, e))?;

        stream.set_mode(Mode::ExtendedPassive);

        debug!("Logging in as: {}", config.username);
        stream
            .login(config.username.as_str(), config.password.as_str())
            .map_err(|e| StoreError::connect(&address, format!("login failed: {}", e)))?;

        stream
            .transfer_type(FileType::Binary)
            .map_err(|e| StoreError::connect(&address, format!("binary mode refused: {}", e)))?;

        info!("Connected to FTP server: {}", address);
        Ok(Self {
            stream: Some(stream),
            address,
        })
    }

    fn stream(&mut self) -> StoreResult<&mut FtpStream> {
        self.stream.as_mut().ok_or(StoreError::Closed)
    }
}

impl RemoteSession for FtpSession {
    fn change_dir(&mut self, path: &str) -> StoreResult<()> {
        self.stream()?
            .cwd(path)
            .map_err(|e| StoreError::operation("CWD", path, e))
    }

    fn make_dir(&mut self, path: &str) -> StoreResult<()> {
        self.stream()?
            .mkdir(path)
            .map_err(|e| StoreError::operation("MKD", path, e))
    }

    fn list_names(&mut self, directory: &str) -> StoreResult<Vec<String>> {
        self.stream()?
            .nlst(Some(directory))
            .map_err(|e| StoreError::operation("NLST", directory, e))
    }

    fn retrieve(&mut self, path: &str) -> StoreResult<Vec<u8>> {
        let buffer = self
            .stream()?
            .retr_as_buffer(path)
            .map_err(|e| StoreError::operation("RETR", path, e))?;
        Ok(buffer.into_inner())
    }

    fn store(&mut self, path: &str, content: &[u8]) -> StoreResult<()> {
        let mut reader = content;
        let written = self
            .stream()?
            .put_file(path, &mut reader)
            .map_err(|e| StoreError::operation("STOR", path, e))?;
        debug!("Stored {} bytes at {}", written, path);
        Ok(())
    }

    fn close(&mut self) -> StoreResult<()> {
        let mut stream = self.stream.take().ok_or(StoreError::Closed)?;
        debug!("Closing FTP session: {}", self.address);
        stream
            .quit()
            .map_err(|e| StoreError::operation("QUIT", &self.address, e))
    }
}

impl Drop for FtpSession {
    fn drop(&mut self) {
        if self.stream.is_some() {
            if let Err(e) = self.close() {
                warn!("Failed to quit FTP session gracefully: {}", e);
            }
        }
    }
}
