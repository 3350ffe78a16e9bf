use super::runner::{JobContext, UnitOutcome, UnitRunner};
use crate::ingest::model::PlannedUnit;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// UnitBroker distributes one job's units over a bounded worker pool
///
/// Architecture:
/// 1. `spawn` starts `num_workers` tasks, each owning a bounded unit channel
/// 2. `dispatch` sends units round-robin; a full channel applies backpressure
/// 3. Workers report every unit on one outcome channel read by the coordinator,
///    which stays the only writer of job state
/// 4. Dropping the broker closes the unit channels; workers finish what they
///    hold and exit, after which the outcome channel closes
///
/// With one worker, units run strictly in dispatch order.
pub struct UnitBroker {
    worker_channels: Vec<mpsc::Sender<PlannedUnit>>,
    next_worker: AtomicUsize,
}

impl UnitBroker {
    pub fn spawn(
        runner: Arc<UnitRunner>,
        ctx: Arc<JobContext>,
        num_workers: usize,
        channel_size: usize,
    ) -> (Self, mpsc::Receiver<UnitOutcome>) {
        let num_workers = num_workers.max(1);
        let channel_size = channel_size.max(1);
        info!(job_id = %ctx.job_id, num_workers, channel_size, "Starting unit workers");

        let (done_tx, done_rx) = mpsc::channel(num_workers * channel_size + num_workers);
        let mut worker_channels = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let (tx, rx) = mpsc::channel(channel_size);
            worker_channels.push(tx);
            tokio::spawn(worker_loop(
                worker_id,
                rx,
                runner.clone(),
                ctx.clone(),
                done_tx.clone(),
            ));
        }

        let broker = Self {
            worker_channels,
            next_worker: AtomicUsize::new(0),
        };
        (broker, done_rx)
    }

    /// Send a unit to the next worker; false if that worker is gone
    pub async fn dispatch(&self, unit: PlannedUnit) -> bool {
        let worker_idx = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.worker_channels.len();
        let index = unit.index;

        match self.worker_channels[worker_idx].send(unit).await {
            Ok(()) => {
                debug!(unit = index, worker_idx, "Unit sent to worker");
                true
            }
            Err(_) => {
                warn!(unit = index, worker_idx, "Worker channel closed, unit not delivered");
                false
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    mut units: mpsc::Receiver<PlannedUnit>,
    runner: Arc<UnitRunner>,
    ctx: Arc<JobContext>,
    done: mpsc::Sender<UnitOutcome>,
) {
    while let Some(unit) = units.recv().await {
        let outcome = runner.run(&ctx, &unit).await;
        if done.send(outcome).await.is_err() {
            warn!(worker_id, job_id = %ctx.job_id, "Outcome channel closed, worker exiting");
            break;
        }
    }
    debug!(worker_id, job_id = %ctx.job_id, "Unit worker stopped");
}
