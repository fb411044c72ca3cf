//! Status monitor: a Unix-socket endpoint serving run snapshots as JSON.
//!
//! The listener is non-blocking and polls the kill flag between accepts, so
//! the monitor thread winds down with the rest of the run. Each connection
//! is one request/response exchange: the client sends a line, the server
//! answers with the current [`Snapshot`](crate::state::Snapshot) and closes.

use anyhow::{Context, Result};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::state::RunState;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct Monitor {
    socket_path: PathBuf,
    state: Arc<RunState>,
}

impl Monitor {
    pub fn new(socket_path: impl Into<PathBuf>, state: Arc<RunState>) -> Self {
        Self {
            socket_path: socket_path.into(),
            state,
        }
    }

    pub fn run(self) -> Result<()> {
        if self.socket_path.exists() {
            fs::remove_file(&self.socket_path).with_context(|| {
                format!("Failed to remove stale socket {}", self.socket_path.display())
            })?;
        }
        let listener = UnixListener::bind(&self.socket_path).with_context(|| {
            format!("Failed to bind monitor socket {}", self.socket_path.display())
        })?;
        listener
            .set_nonblocking(true)
            .context("Failed to set monitor socket to non-blocking")?;
        info!(socket = %self.socket_path.display(), "monitor listening");

        while !self.state.killed() {
            match listener.accept() {
                Ok((stream, _addr)) => {
                    if let Err(err) = self.serve(stream) {
                        debug!(error = %err, "monitor client dropped");
                    }
                }
                Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(err) => {
                    warn!(error = %err, "monitor accept failed");
                    break;
                }
            }
        }

        if let Err(err) = fs::remove_file(&self.socket_path) {
            debug!(error = %err, "monitor socket already gone");
        }
        info!("monitor exiting");
        Ok(())
    }

    fn serve(&self, stream: UnixStream) -> Result<()> {
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .context("Failed to set read timeout")?;
        let mut reader = BufReader::new(stream);
        let mut request = String::new();
        reader
            .read_line(&mut request)
            .context("Failed to read monitor request")?;
        debug!(request = request.trim(), "monitor request");

        let snapshot = self.state.snapshot();
        let mut stream = reader.into_inner();
        serde_json::to_writer(&mut stream, &snapshot).context("Failed to write snapshot")?;
        stream.write_all(b"\n").context("Failed to write snapshot")?;
        Ok(())
    }
}
