use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::foundation::error::{SenseHatError, SenseHatResult};
use crate::schedule::cancel::CancelToken;

/// How a job that returned normally ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Cancelled,
}

/// A unit of device work. It must poll the token and return promptly once cancelled.
pub type Job = Box<dyn FnOnce(&CancelToken) -> SenseHatResult<JobOutcome> + Send + 'static>;

/// Lifecycle of a submitted job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    /// Removed before it started, or stopped cooperatively while running.
    Cancelled,
    /// Returned an error or panicked.
    Failed(String),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Queued | JobStatus::Running)
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of worker threads, at least 1.
    pub workers: usize,
    /// Workers are named `{prefix}-{index}`.
    pub thread_name_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            thread_name_prefix: "sensehat-worker".to_string(),
        }
    }
}

struct JobShared {
    id: u64,
    token: CancelToken,
    status: Mutex<JobStatus>,
    done: Condvar,
}

impl JobShared {
    fn lock(&self) -> MutexGuard<'_, JobStatus> {
        self.status.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set(&self, status: JobStatus) {
        let terminal = status.is_terminal();
        *self.lock() = status;
        if terminal {
            self.done.notify_all();
        }
    }
}

struct Queued {
    shared: Arc<JobShared>,
    job: Job,
}

#[derive(Default)]
struct QueueState {
    jobs: VecDeque<Queued>,
    running: Vec<Arc<JobShared>>,
    shutdown: bool,
    next_id: u64,
}

#[derive(Default)]
struct Queue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl Queue {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Pull the job out of the queue if it has not been picked up yet.
    fn remove(&self, id: u64) -> Option<Queued> {
        let mut st = self.lock();
        let pos = st.jobs.iter().position(|q| q.shared.id == id)?;
        st.jobs.remove(pos)
    }
}

/// Handle to a submitted job.
#[derive(Clone)]
pub struct JobHandle {
    shared: Arc<JobShared>,
    queue: Weak<Queue>,
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.shared.id)
            .field("status", &self.status())
            .finish()
    }
}

impl JobHandle {
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn token(&self) -> &CancelToken {
        &self.shared.token
    }

    pub fn status(&self) -> JobStatus {
        self.shared.lock().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.status().is_terminal()
    }

    /// Signal the job to stop. A job still in the queue is removed and never runs; a running
    /// job sees its token cancelled at its next check.
    pub fn cancel(&self) {
        self.shared.token.cancel();
        let removed = self.queue.upgrade().and_then(|q| q.remove(self.shared.id));
        if let Some(queued) = removed {
            tracing::debug!(job = self.shared.id, "cancelled before start");
            queued.shared.set(JobStatus::Cancelled);
            // Payload is released here, outside the queue lock.
            drop(queued.job);
        }
    }

    /// Block until the job reaches a terminal status.
    pub fn wait(&self) -> JobStatus {
        let mut st = self.shared.lock();
        while !st.is_terminal() {
            st = self
                .shared
                .done
                .wait(st)
                .unwrap_or_else(|p| p.into_inner());
        }
        st.clone()
    }

    /// Like [`JobHandle::wait`], giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<JobStatus> {
        let deadline = Instant::now() + timeout;
        let mut st = self.shared.lock();
        while !st.is_terminal() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            st = self
                .shared
                .done
                .wait_timeout(st, remaining)
                .map(|(g, _)| g)
                .unwrap_or_else(|p| p.into_inner().0);
        }
        Some(st.clone())
    }
}

/// Bounded pool of worker threads draining a FIFO job queue.
///
/// With one worker (one device) at most one job writes at a time. Preemption is layered on
/// top by cancelling the previous [`JobHandle`] before submitting the next one.
pub struct Scheduler {
    queue: Arc<Queue>,
    workers: Vec<JoinHandle<()>>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> SenseHatResult<Self> {
        if config.workers == 0 {
            return Err(SenseHatError::validation("scheduler needs at least one worker"));
        }

        let mut sched = Self {
            queue: Arc::new(Queue::default()),
            workers: Vec::with_capacity(config.workers),
            config,
        };

        for i in 0..sched.config.workers {
            let queue = Arc::clone(&sched.queue);
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", sched.config.thread_name_prefix, i))
                .spawn(move || worker_loop(queue));
            match spawned {
                Ok(h) => sched.workers.push(h),
                Err(e) => {
                    // Drop joins the workers that did start.
                    return Err(SenseHatError::scheduler(format!(
                        "failed to spawn worker {i}: {e}"
                    )));
                }
            }
        }

        Ok(sched)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Queue a job behind everything already submitted.
    pub fn submit(&self, job: Job) -> SenseHatResult<JobHandle> {
        let mut st = self.queue.lock();
        if st.shutdown {
            return Err(SenseHatError::scheduler("scheduler is shut down"));
        }
        st.next_id += 1;
        let shared = Arc::new(JobShared {
            id: st.next_id,
            token: CancelToken::new(),
            status: Mutex::new(JobStatus::Queued),
            done: Condvar::new(),
        });
        st.jobs.push_back(Queued {
            shared: Arc::clone(&shared),
            job,
        });
        drop(st);
        self.queue.ready.notify_one();

        tracing::debug!(job = shared.id, "queued");
        Ok(JobHandle {
            shared,
            queue: Arc::downgrade(&self.queue),
        })
    }

    /// Jobs waiting for a worker.
    pub fn queued_len(&self) -> usize {
        self.queue.lock().jobs.len()
    }

    /// Stop accepting work, cancel queued and running jobs, and join the workers.
    ///
    /// Returns once every worker thread has exited. Safe to call more than once.
    pub fn shutdown(&mut self) {
        let (drained, running) = {
            let mut st = self.queue.lock();
            st.shutdown = true;
            let drained: Vec<Queued> = st.jobs.drain(..).collect();
            (drained, st.running.clone())
        };
        self.queue.ready.notify_all();

        for job in &running {
            job.token.cancel();
        }
        for queued in drained {
            queued.shared.token.cancel();
            queued.shared.set(JobStatus::Cancelled);
        }

        for h in self.workers.drain(..) {
            if h.join().is_err() {
                tracing::warn!("scheduler worker panicked outside a job");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(queue: Arc<Queue>) {
    loop {
        let next = {
            let mut st = queue.lock();
            loop {
                if let Some(q) = st.jobs.pop_front() {
                    st.running.push(Arc::clone(&q.shared));
                    break Some(q);
                }
                if st.shutdown {
                    break None;
                }
                st = queue.ready.wait(st).unwrap_or_else(|p| p.into_inner());
            }
        };
        let Some(Queued { shared, job }) = next else {
            return;
        };

        let status = if shared.token.is_cancelled() {
            drop(job);
            JobStatus::Cancelled
        } else {
            shared.set(JobStatus::Running);
            let span = tracing::debug_span!("job", id = shared.id);
            let _enter = span.enter();
            tracing::debug!("started");
            match std::panic::catch_unwind(AssertUnwindSafe(|| job(&shared.token))) {
                Ok(Ok(JobOutcome::Completed)) => JobStatus::Completed,
                Ok(Ok(JobOutcome::Cancelled)) => JobStatus::Cancelled,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "job failed");
                    JobStatus::Failed(e.to_string())
                }
                Err(_) => {
                    tracing::warn!("job panicked");
                    JobStatus::Failed("job panicked".to_string())
                }
            }
        };

        queue.lock().running.retain(|r| r.id != shared.id);
        tracing::debug!(job = shared.id, ?status, "finished");
        shared.set(status);
    }
}
