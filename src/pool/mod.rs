use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::trace;

use crate::bruteforcer::{Executor, Job};
use crate::state::Tracked;

pub type JobSender = mpsc::Sender<Tracked<Job>>;
pub type JobReceiver = mpsc::Receiver<Tracked<Job>>;

pub fn job_queue(capacity: usize) -> (JobSender, JobReceiver) {
    mpsc::channel(capacity.max(1))
}

#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(size: usize, executor: Arc<Executor>, jobs: JobReceiver) -> Self {
        let jobs = Arc::new(Mutex::new(jobs));
        let handles = (0..size.max(1))
            .map(|id| {
                let executor = Arc::clone(&executor);
                let jobs = Arc::clone(&jobs);
                tokio::spawn(async move { worker(id, executor, jobs).await })
            })
            .collect();
        Self { handles }
    }

    pub fn abort(&self) {
        for handle in self.handles.iter() {
            handle.abort();
        }
    }

    pub async fn join(self) {
        let _: Vec<_> = self
            .handles
            .into_iter()
            .collect::<FuturesUnordered<_>>()
            .collect()
            .await;
    }
}

async fn worker(id: usize, executor: Arc<Executor>, jobs: Arc<Mutex<JobReceiver>>) {
    loop {
        // the lock is only held while waiting for the next job
        let job = { jobs.lock().await.recv().await };
        let Some(job) = job else {
            break;
        };
        trace!(worker = id, url = %job.url, method = %job.method, "picked job");
        executor.execute(&job).await;
        // dropping the tracked job releases its unit of work
        drop(job);
    }
}
