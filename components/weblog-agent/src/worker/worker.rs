// Local crates
use crate::aggregator::aggregator::Aggregator;
use crate::tailer::models::{TailEvent, Tailer};
use crate::worker::{
    control::{Control, PauseRequest, StopHandle, WorkerError, WorkerState},
    pipeline::Pipeline,
};

// External crates
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

/// Runs the tail -> parse -> filter -> classify -> record loop in the
/// background and lends its [`Aggregator`] out for consistent snapshots.
///
/// The aggregator is owned by exactly one side at a time. While running it
/// lives in the ingest task; [`Worker::pause`] moves it to the caller and
/// dropping the returned guard moves it back. Lines that arrive in the
/// meantime wait in the bounded tail channel.
#[derive(Debug)]
pub struct Worker {
    state: WorkerState,
    pipeline: Arc<Pipeline>,
    /// Held here while idle and after stop.
    aggregator: Option<Aggregator>,
    capacity: usize,
    cancel: CancellationToken,
    control: Option<mpsc::Sender<Control>>,
    tailer: Option<JoinHandle<()>>,
    ingest: Option<JoinHandle<Option<Aggregator>>>,
}

impl Worker {
    pub fn new(pipeline: Pipeline, aggregator: Aggregator, capacity: usize) -> Self {
        Self {
            state: WorkerState::Idle,
            pipeline: Arc::new(pipeline),
            aggregator: Some(aggregator),
            capacity: capacity.max(1),
            cancel: CancellationToken::new(),
            control: None,
            tailer: None,
            ingest: None,
        }
    }

    pub fn state(&self) -> WorkerState {
        if self.cancel.is_cancelled() {
            WorkerState::Stopped
        } else {
            self.state
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// The aggregator, when not owned by the ingest task (idle or stopped).
    pub fn aggregator(&self) -> Option<&Aggregator> {
        self.aggregator.as_ref()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.cancel.clone())
    }

    /// Spawn the tailer and ingest tasks. Idle -> Running.
    #[instrument(name = "weblog::worker::start", target = "worker", skip_all, level = "debug")]
    pub fn start(&mut self, tailer: Tailer) -> Result<(), WorkerError> {
        match self.state() {
            WorkerState::Idle => {}
            WorkerState::Stopped => return Err(WorkerError::Stopped),
            state => {
                return Err(WorkerError::InvalidState {
                    operation: "start",
                    state,
                });
            }
        }
        let aggregator = self.aggregator.take().ok_or(WorkerError::Stopped)?;

        let (event_tx, event_rx) = mpsc::channel::<TailEvent>(self.capacity);
        let (control_tx, control_rx) = mpsc::channel::<Control>(1);

        self.tailer = Some(tokio::spawn(tailer.run(event_tx, self.cancel.clone())));
        self.ingest = Some(tokio::spawn(ingest(
            Arc::clone(&self.pipeline),
            aggregator,
            event_rx,
            control_rx,
            self.cancel.clone(),
        )));
        self.control = Some(control_tx);
        self.state = WorkerState::Running;

        info!(capacity = self.capacity, "Worker started");
        Ok(())
    }

    /// Suspend ingestion before its next aggregator mutation and wait for
    /// the hand-over. Running -> Paused until the guard is dropped.
    pub async fn pause(&mut self) -> Result<PausedWorker<'_>, WorkerError> {
        match self.state() {
            WorkerState::Running => {}
            WorkerState::Stopped => return Err(WorkerError::Stopped),
            state => {
                return Err(WorkerError::InvalidState {
                    operation: "pause",
                    state,
                });
            }
        }
        let control = self.control.clone().ok_or(WorkerError::Stopped)?;

        let (ack_tx, ack_rx) = oneshot::channel();
        let (resume_tx, resume_rx) = oneshot::channel();
        let mut request = PauseRequest {
            ack: ack_rx,
            resume: Some(resume_tx),
        };

        tokio::select! {
            _ = self.cancel.cancelled() => return Err(WorkerError::Stopped),
            sent = control.send(Control::Pause { ack: ack_tx, resume: resume_rx }) => {
                sent.map_err(|_| WorkerError::Stopped)?;
            }
        }

        let aggregator = tokio::select! {
            biased;
            received = &mut request.ack => received.map_err(|_| WorkerError::Stopped)?,
            _ = self.cancel.cancelled() => return Err(WorkerError::Stopped),
        };
        let resume = request.resume.take();

        self.state = WorkerState::Paused;
        trace!("Worker paused");

        Ok(PausedWorker {
            worker: self,
            aggregator,
            resume,
        })
    }

    /// Cancel both tasks, wait for them and release the tailed file.
    /// Safe to call in any state and more than once.
    #[instrument(name = "weblog::worker::stop", target = "worker", skip_all, level = "debug")]
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        self.control = None;

        if let Some(task) = self.ingest.take() {
            match task.await {
                Ok(Some(aggregator)) => self.aggregator = Some(aggregator),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Ingest task failed"),
            }
        }
        if let Some(task) = self.tailer.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Tailer task failed");
            }
        }

        if self.state != WorkerState::Stopped {
            info!("Worker stopped");
        }
        self.state = WorkerState::Stopped;
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Exclusive access to the aggregator while ingestion is suspended.
/// Dropping it (or calling [`PausedWorker::unpause`]) resumes the worker.
#[derive(Debug)]
pub struct PausedWorker<'a> {
    worker: &'a mut Worker,
    aggregator: Aggregator,
    resume: Option<oneshot::Sender<Aggregator>>,
}

impl PausedWorker<'_> {
    /// Paused -> Running.
    pub fn unpause(self) {}
}

impl Deref for PausedWorker<'_> {
    type Target = Aggregator;

    fn deref(&self) -> &Aggregator {
        &self.aggregator
    }
}

impl DerefMut for PausedWorker<'_> {
    fn deref_mut(&mut self) -> &mut Aggregator {
        &mut self.aggregator
    }
}

impl Drop for PausedWorker<'_> {
    fn drop(&mut self) {
        let aggregator = std::mem::take(&mut self.aggregator);
        let unreturned = match self.resume.take() {
            Some(resume) => resume.send(aggregator).err(),
            None => Some(aggregator),
        };

        match unreturned {
            None => {
                self.worker.state = WorkerState::Running;
                trace!("Worker resumed");
            }
            Some(aggregator) => {
                // Ingest task is gone, keep the final state on the handle.
                self.worker.aggregator = Some(aggregator);
                self.worker.state = WorkerState::Stopped;
            }
        }
    }
}

#[instrument(name = "weblog::worker::ingest", target = "worker", skip_all, level = "debug")]
async fn ingest(
    pipeline: Arc<Pipeline>,
    mut aggregator: Aggregator,
    mut events: mpsc::Receiver<TailEvent>,
    mut control: mpsc::Receiver<Control>,
    cancel: CancellationToken,
) -> Option<Aggregator> {
    let mut tail_open = true;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(request) = control.recv() => {
                let Control::Pause { ack, resume } = request;
                aggregator = hand_over(aggregator, ack, resume, &cancel).await?;
            }
            event = events.recv(), if tail_open => match event {
                Some(event) => pipeline.apply(event, &mut aggregator),
                None => {
                    debug!("Tail channel closed");
                    tail_open = false;
                }
            },
        }
    }

    debug!("Ingest stopped");
    Some(aggregator)
}

/// Lend the aggregator to the pauser and wait for it to come back.
/// `None` means it is not coming back and ingestion has to end.
async fn hand_over(
    aggregator: Aggregator,
    ack: oneshot::Sender<Aggregator>,
    resume: oneshot::Receiver<Aggregator>,
    cancel: &CancellationToken,
) -> Option<Aggregator> {
    if let Err(aggregator) = ack.send(aggregator) {
        // Pauser gave up before taking it.
        return Some(aggregator);
    }

    tokio::select! {
        biased;
        back = resume => {
            if back.is_err() {
                warn!("Paused aggregator was never returned");
            }
            back.ok()
        }
        _ = cancel.cancelled() => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::aggregator::AggregatorConfig;
    use crate::categorizer::categorizer::{Categorizer, CategoryKind};
    use crate::filter::filter::Filter;
    use crate::parser::parser::LogParser;
    use crate::tailer::models::TailerOptions;
    use std::io::Write;
    use std::path::Path;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    fn worker() -> Worker {
        let parser = LogParser::with_pattern("$remote_addr $status").unwrap();
        let url = Categorizer::compile(CategoryKind::Url, &[], "uri").unwrap();
        let user = Categorizer::compile(CategoryKind::User, &[], "user_defined").unwrap();
        let aggregator = Aggregator::new(&AggregatorConfig::default(), &url, &user).unwrap();
        Worker::new(Pipeline::new(parser, Filter::accept_all(), url, user), aggregator, 4)
    }

    async fn tailer(path: &Path) -> Tailer {
        Tailer::open(
            path,
            TailerOptions {
                poll_interval: Duration::from_millis(10),
                read_from_start: true,
                ..TailerOptions::default()
            },
        )
        .await
        .unwrap()
    }

    fn append(path: &Path, lines: usize) {
        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .unwrap();
        for i in 0..lines {
            writeln!(f, "10.0.0.{} 200", i % 250).unwrap();
        }
    }

    async fn wait_for_requests(worker: &mut Worker, expected: u64) {
        for _ in 0..500 {
            {
                let paused = worker.pause().await.unwrap();
                if paused.counter("requests") == expected {
                    return;
                }
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("worker never reached {expected} requests");
    }

    #[tokio::test]
    async fn pause_requires_running_worker() {
        let mut worker = worker();
        assert_eq!(
            worker.pause().await.err(),
            Some(WorkerError::InvalidState {
                operation: "pause",
                state: WorkerState::Idle
            })
        );
    }

    #[tokio::test]
    async fn snapshot_is_frozen_while_paused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        append(&path, 3);

        let mut worker = worker();
        worker.start(tailer(&path).await).unwrap();
        assert_eq!(worker.state(), WorkerState::Running);
        wait_for_requests(&mut worker, 3).await;

        {
            let paused = worker.pause().await.unwrap();
            let before = paused.snapshot();

            // More lines than the channel holds, all must survive the pause.
            append(&path, 20);
            sleep(Duration::from_millis(200)).await;
            assert_eq!(paused.snapshot(), before);
            paused.unpause();
        }
        assert_eq!(worker.state(), WorkerState::Running);

        wait_for_requests(&mut worker, 23).await;
        worker.stop().await;
        assert_eq!(worker.aggregator().unwrap().counter("requests"), 23);
    }

    #[tokio::test]
    async fn stop_while_paused_keeps_the_aggregator() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        append(&path, 2);

        let mut worker = worker();
        let handle = worker.stop_handle();
        worker.start(tailer(&path).await).unwrap();
        wait_for_requests(&mut worker, 2).await;

        {
            let paused = worker.pause().await.unwrap();
            handle.stop();
            assert!(handle.is_stopped());
            drop(paused);
        }
        assert_eq!(worker.state(), WorkerState::Stopped);
        assert_eq!(worker.pause().await.err(), Some(WorkerError::Stopped));

        timeout(Duration::from_secs(5), worker.stop()).await.unwrap();
        timeout(Duration::from_secs(5), worker.stop()).await.unwrap();
        assert_eq!(worker.aggregator().unwrap().counter("requests"), 2);
    }

    #[tokio::test]
    async fn stop_before_start_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        append(&path, 0);

        let mut worker = worker();
        worker.stop().await;
        assert_eq!(worker.state(), WorkerState::Stopped);
        assert_eq!(
            worker.start(tailer(&path).await).err(),
            Some(WorkerError::Stopped)
        );
        assert!(worker.aggregator().is_some());
    }
}
