// Local crates
use crate::tailer::{
    models::{TailError, TailEvent, Tailer, TailerOptions},
    state::FileIdentity,
    wakeups::FsWakeups,
};

// External crates
use std::io::ErrorKind;
use std::path::Path;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader, SeekFrom},
    sync::mpsc,
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

impl Tailer {
    /// Open `path` for tailing. Starts at end of file unless
    /// `read_from_start` is set.
    #[instrument(name = "weblog::tailer::open", target = "tailer", skip_all, fields(path = %path.as_ref().display()), level = "debug")]
    pub async fn open(path: impl AsRef<Path>, options: TailerOptions) -> Result<Self, TailError> {
        let path = path.as_ref().to_path_buf();
        let (reader, identity, start, mid_line) = open_at(&path, !options.read_from_start).await?;

        let wakeups = match FsWakeups::watch(&path) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Filesystem notifications unavailable, polling only");
                None
            }
        };

        if mid_line {
            debug!(offset = start, "Opened mid-line, skipping to the next newline");
        }
        debug!(offset = start, "Tailer opened");

        Ok(Self {
            path,
            options,
            reader,
            identity,
            committed: start,
            pending: Vec::new(),
            discarding: mid_line,
            wakeups,
            missing_reported: false,
            reopens: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read offset including any buffered partial line.
    pub fn position(&self) -> u64 {
        self.committed + self.pending.len() as u64
    }

    /// Number of rotations and truncations handled so far.
    pub fn reopens(&self) -> u64 {
        self.reopens
    }

    /// Next complete line, waiting for one if necessary. Reopen
    /// notifications are skipped.
    pub async fn next_line(&mut self) -> Result<String, TailError> {
        loop {
            if let TailEvent::Line(line) = self.next_event().await? {
                return Ok(line);
            }
        }
    }

    /// Next line or reopen notification. Blocks while there is no new data.
    /// Cancel safe: partially read bytes stay in the pending buffer.
    ///
    /// A line longer than `max_line_bytes` is reported once as
    /// [`TailError::LineTooLong`] and skipped up to its newline.
    pub async fn next_event(&mut self) -> Result<TailEvent, TailError> {
        let limit = self.options.max_line_bytes.max(1);

        loop {
            let room = limit.saturating_sub(self.pending.len()).max(1) as u64;
            let n = (&mut self.reader)
                .take(room)
                .read_until(b'\n', &mut self.pending)
                .await
                .map_err(TailError::Read)?;

            if n > 0 {
                if self.pending.last() == Some(&b'\n') {
                    if self.discarding {
                        self.discard_pending();
                        self.discarding = false;
                        continue;
                    }
                    return Ok(TailEvent::Line(self.take_line()));
                }
                if self.pending.len() >= limit {
                    self.discard_pending();
                    if !self.discarding {
                        self.discarding = true;
                        return Err(TailError::LineTooLong {
                            path: self.path.clone(),
                            limit,
                        });
                    }
                }
                // Unterminated fragment, keep it until the newline arrives.
                continue;
            }

            if let Some(event) = self.check_rotation().await? {
                return Ok(event);
            }

            self.wait().await;
        }
    }

    fn discard_pending(&mut self) {
        self.committed += self.pending.len() as u64;
        self.pending.clear();
    }

    fn take_line(&mut self) -> String {
        self.committed += self.pending.len() as u64;

        let mut end = self.pending.len();
        while end > 0 && matches!(self.pending[end - 1], b'\n' | b'\r') {
            end -= 1;
        }
        let line = String::from_utf8_lossy(&self.pending[..end]).into_owned();
        self.pending.clear();
        line
    }

    /// Called at EOF. Detects replacement, truncation and disappearance.
    async fn check_rotation(&mut self) -> Result<Option<TailEvent>, TailError> {
        let current = match FileIdentity::of_path(&self.path).await {
            Ok(current) => current,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if self.missing_reported {
                    return Ok(None);
                }
                self.missing_reported = true;
                return Err(TailError::Missing {
                    path: self.path.clone(),
                });
            }
            Err(e) => return Err(TailError::Io(e)),
        };
        self.missing_reported = false;

        if !current.same_file(&self.identity) {
            let (reader, identity, _, _) = open_at(&self.path, false).await?;
            info!(path = %self.path.display(), "File rotated, reopened at start");
            self.reader = reader;
            self.identity = identity;
            self.restart();
            return Ok(Some(TailEvent::Reopened));
        }

        if current.len < self.position() {
            info!(path = %self.path.display(), len = current.len, offset = self.position(), "File truncated, reading from start");
            self.reader.seek(SeekFrom::Start(0)).await?;
            self.identity = current;
            self.restart();
            return Ok(Some(TailEvent::Reopened));
        }

        Ok(None)
    }

    fn restart(&mut self) {
        if !self.pending.is_empty() {
            debug!(bytes = self.pending.len(), "Dropping unterminated fragment");
        }
        self.pending.clear();
        self.discarding = false;
        self.committed = 0;
        self.reopens += 1;
    }

    async fn wait(&mut self) {
        let poll = self.options.poll_interval;
        match self.wakeups.as_mut() {
            Some(wakeups) => {
                if let Ok(None) = timeout(poll, wakeups.changed()).await {
                    debug!("Filesystem watcher closed, polling only");
                    self.wakeups = None;
                }
            }
            None => sleep(poll).await,
        }
    }

    /// Tail until cancelled, forwarding events to `tx`. A full channel
    /// blocks reading, so no line is dropped while the consumer is busy.
    #[instrument(name = "weblog::tailer::run", target = "tailer", skip_all, fields(path = %self.path.display()), level = "debug")]
    pub async fn run(mut self, tx: mpsc::Sender<TailEvent>, cancel: CancellationToken) {
        info!("Starting Tailer");

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = self.next_event() => next,
            };

            let (event, failed) = match next {
                Ok(event) => (event, false),
                Err(e) => {
                    warn!(error = %e, "Tailer I/O failure");
                    (TailEvent::Error(e.to_string()), true)
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                sent = tx.send(event) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }

            if failed {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(self.options.poll_interval) => {}
                }
            }
        }

        info!(reopens = self.reopens, "Tailer stopped");
    }
}

/// Open `path` at its start or end. The flag is set when opening at the
/// end lands inside a line that is still being written.
async fn open_at(
    path: &Path,
    at_end: bool,
) -> Result<(BufReader<File>, FileIdentity, u64, bool), TailError> {
    let open_err = |source| TailError::Open {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).await.map_err(open_err)?;
    let meta = file.metadata().await.map_err(open_err)?;

    let (start, mid_line) = if at_end {
        let end = file.seek(SeekFrom::End(0)).await?;
        let mid_line = if end > 0 {
            file.seek(SeekFrom::Start(end - 1)).await?;
            file.read_u8().await? != b'\n'
        } else {
            false
        };
        (end, mid_line)
    } else {
        (0, false)
    };

    Ok((
        BufReader::new(file),
        FileIdentity::from_metadata(&meta),
        start,
        mid_line,
    ))
}
