use crate::{
    encoder::frames::{DiskSpace, FramesEncoder},
    error::SaveError,
    job::FrameJob,
};
use crossbeam_channel::{Receiver, Sender};
use std::{
    collections::VecDeque,
    error::Error as _,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

/// State the workers report into, read by the render thread.
#[derive(Debug, Default)]
pub(crate) struct PoolState {
    active: AtomicUsize,
    error_count: AtomicU64,
    last_error: Mutex<Option<String>>,
    last_encode_duration: Mutex<Option<Duration>>,
}

impl PoolState {
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Acquire)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_encode_duration(&self) -> Option<Duration> {
        *self
            .last_encode_duration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reset_errors(&self) {
        self.error_count.store(0, Ordering::Release);
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Counts a failure that happened outside the workers.
    pub fn record_error(&self, message: String) {
        tracing::error!("{}", message);
        self.error_count.fetch_add(1, Ordering::AcqRel);
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(message);
    }

    fn record_save_error(&self, err: &SaveError) {
        let mut message = err.to_string();
        if let Some(source) = err.source() {
            message = format!("{}: {}", message, source);
        }
        if let Some(code) = err.raw_os_error() {
            message = format!("{} (os error {})", message, code);
        }
        self.record_error(message);
    }
}

/// Decrements the active count when a worker is done with its job.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Budget bounded writers for frame jobs.
///
/// Jobs wait in a FIFO queue on the render thread. [`drain`](WorkerPool::drain) moves at
/// most `budget - active` of them to the worker threads, which are spawned lazily and
/// reused for later jobs.
pub(crate) struct WorkerPool {
    pending: VecDeque<FrameJob>,
    sender: Option<Sender<FrameJob>>,
    receiver: Receiver<FrameJob>,
    workers: Vec<JoinHandle<()>>,
    state: Arc<PoolState>,
    encoder: Arc<FramesEncoder<Arc<dyn DiskSpace>>>,
}

impl WorkerPool {
    pub fn new(disk_space: Arc<dyn DiskSpace>) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            pending: VecDeque::new(),
            sender: Some(sender),
            receiver,
            workers: Vec::new(),
            state: Arc::default(),
            encoder: Arc::new(FramesEncoder::new(disk_space)),
        }
    }

    pub fn state(&self) -> &PoolState {
        &self.state
    }

    pub fn push(&mut self, job: FrameJob) {
        self.pending.push_back(job);
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_bytes(&self) -> u64 {
        self.pending.iter().map(|job| job.byte_len() as u64).sum()
    }

    /// Hands up to `budget - active` pending jobs to the workers. Returns how many.
    pub fn drain(&mut self, budget: usize) -> usize {
        let budget = budget.max(1);
        let remain = self
            .pending
            .len()
            .min(budget.saturating_sub(self.state.active()));
        if remain == 0 {
            return 0;
        }

        self.ensure_workers(budget);
        self.dispatch(remain)
    }

    fn dispatch(&mut self, count: usize) -> usize {
        let Some(sender) = &self.sender else {
            return 0;
        };

        let mut sent = 0;
        while sent < count {
            let Some(job) = self.pending.pop_front() else {
                break;
            };

            self.state.active.fetch_add(1, Ordering::AcqRel);
            if let Err(err) = sender.send(job) {
                self.state.active.fetch_sub(1, Ordering::AcqRel);
                self.pending.push_front(err.into_inner());
                break;
            }
            sent += 1;
        }
        sent
    }

    fn ensure_workers(&mut self, count: usize) {
        while self.workers.len() < count {
            let index = self.workers.len();
            let receiver = self.receiver.clone();
            let state = Arc::clone(&self.state);
            let encoder = Arc::clone(&self.encoder);

            let spawned = thread::Builder::new()
                .name(format!("multishot-writer-{}", index))
                .spawn(move || run(receiver, state, encoder));
            match spawned {
                Ok(handle) => self.workers.push(handle),
                Err(err) => {
                    tracing::error!("Failed to spawn writer thread: {}", err);
                    break;
                }
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            tracing::info!("Writing {} queued frames before shutdown", self.pending.len());
            self.ensure_workers(1);
            self.dispatch(self.pending.len());
        }

        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("A writer thread panicked");
            }
        }
    }
}

fn run(
    receiver: Receiver<FrameJob>,
    state: Arc<PoolState>,
    encoder: Arc<FramesEncoder<Arc<dyn DiskSpace>>>,
) {
    for job in receiver.iter() {
        let _active = ActiveGuard(&state.active);
        let started = Instant::now();
        let repeat_index = job.repeat_index;

        for (kind, result) in encoder.encode_job(job) {
            match result {
                Ok(path) => tracing::debug!("Saved '{}' image to \"{}\"", kind, path.display()),
                Err(err) => state.record_save_error(&err),
            }
        }

        let elapsed = started.elapsed();
        tracing::debug!("Frame {} written in {:?}", repeat_index, elapsed);
        *state
            .last_encode_duration
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{CaptureSet, KindOutput},
        encoder::frames::VolumeSpace,
        host::Environment,
        job::{CapturedImage, PixelData},
        statistics::Statistics,
        CaptureKind,
    };
    use crossbeam_channel::bounded;
    use std::{io, path::Path};
    use tempdir::TempDir;

    /// Blocks every writer in the free space query until released.
    struct Gate {
        running: AtomicUsize,
        peak: AtomicUsize,
        release: Receiver<()>,
    }

    impl DiskSpace for Gate {
        fn query(&self, _path: &Path) -> io::Result<VolumeSpace> {
            let now = self.running.fetch_add(1, Ordering::AcqRel) + 1;
            self.peak.fetch_max(now, Ordering::AcqRel);
            let _ = self.release.recv();
            self.running.fetch_sub(1, Ordering::AcqRel);
            Ok(VolumeSpace {
                free: u64::MAX,
                total: u64::MAX,
            })
        }
    }

    fn job(dir: &Path, index: u32) -> FrameJob {
        let mut set = CaptureSet::new("pool");
        set.outputs.original = KindOutput {
            free_space_limit: 1,
            ..KindOutput::new("frame_<INDEX>")
        };
        let environment = Environment {
            base_path: dir.to_owned(),
            ..Environment::default()
        };
        let mut job = FrameJob::new(set, Statistics::default(), environment, index, (1, 1));
        job.images.insert(
            CaptureKind::Original,
            CapturedImage {
                width: 1,
                height: 1,
                pixels: PixelData::Rgba8(vec![1, 2, 3, 4]),
            },
        );
        job
    }

    #[test]
    fn drain_respects_the_budget() {
        let dir = TempDir::new("multishot-pool").unwrap();
        let (release, gate) = bounded(0);
        let disk = Arc::new(Gate {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            release: gate,
        });

        let mut pool = WorkerPool::new(disk.clone());
        for index in 0..5 {
            pool.push(job(dir.path(), index));
        }

        assert_eq!(pool.drain(2), 2);
        assert_eq!(pool.pending(), 3);
        assert_eq!(pool.state().active(), 2);
        assert_eq!(pool.drain(2), 0);

        let mut written = 0;
        while written < 5 {
            release.send(()).unwrap();
            written += 1;
            while pool.pending() > 0 && pool.drain(2) == 0 {
                thread::yield_now();
            }
        }
        drop(pool);

        assert!(disk.peak.load(Ordering::Acquire) <= 2);
        for index in 0..5 {
            assert!(dir.path().join(format!("frame_{}.png", index)).is_file());
        }
    }

    #[test]
    fn dropping_writes_everything_left() {
        let dir = TempDir::new("multishot-pool").unwrap();
        let mut pool = WorkerPool::new(Arc::new(crate::encoder::frames::SystemDiskSpace));
        for index in 0..3 {
            let mut job = job(dir.path(), index);
            job.set.outputs.original.free_space_limit = 0;
            pool.push(job);
        }
        assert_eq!(pool.pending_bytes(), 12);
        drop(pool);

        for index in 0..3 {
            assert!(dir.path().join(format!("frame_{}.png", index)).is_file());
        }
    }
}
