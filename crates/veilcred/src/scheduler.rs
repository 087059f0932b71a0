//! dispute-window scheduler
//!
//! one durable task per approved application, firing once when the clock
//! passes `fires_at`. the scheduler is an optimization, not the authority:
//! eligibility is always recomputed from ledger state by whoever handles
//! the fire, so a lost or late timer only delays disclosure, never
//! corrupts it. pending tasks are reloaded from sled at startup.

use crate::commitment::ActivityCommitment;
use crate::field::FieldScalar;
use crate::ledger::LoanId;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// how often the run loop re-checks the clock between wakeups
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// a scheduled dispute-window expiry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisputeWindowTask {
    pub loan_id: LoanId,
    pub commitment: ActivityCommitment,
    /// unix seconds at which the window closes
    pub fires_at: u64,
}

type TaskKey = (LoanId, [u8; 32]);

pub struct DisputeScheduler {
    tree: sled::Tree,
    tasks: Mutex<BTreeMap<TaskKey, u64>>,
    notify: Notify,
}

impl DisputeScheduler {
    /// open the task store and reload any tasks that survived a restart
    pub fn open(db: &sled::Db) -> Result<Self> {
        let tree = db.open_tree("dispute_tasks")?;
        let mut tasks = BTreeMap::new();
        for item in tree.iter() {
            let (_, value) = item?;
            let task: DisputeWindowTask = serde_json::from_slice(&value)?;
            tasks.insert(
                (task.loan_id, *task.commitment.as_bytes()),
                task.fires_at,
            );
        }
        if !tasks.is_empty() {
            tracing::info!("reloaded {} pending dispute tasks", tasks.len());
        }
        Ok(DisputeScheduler {
            tree,
            tasks: Mutex::new(tasks),
            notify: Notify::new(),
        })
    }

    /// schedule (or replace) the dispute-window task for an application
    pub fn schedule(&self, task: &DisputeWindowTask) -> Result<()> {
        let key = (task.loan_id, *task.commitment.as_bytes());
        self.tree
            .insert(encode_key(&key), serde_json::to_vec(task)?)?;
        self.tasks
            .lock()
            .expect("lock poisoned")
            .insert(key, task.fires_at);
        self.notify.notify_one();
        Ok(())
    }

    /// drop a pending task without firing, e.g. on early repayment
    pub fn cancel(&self, loan_id: LoanId, commitment: &ActivityCommitment) -> Result<bool> {
        let key = (loan_id, *commitment.as_bytes());
        let existed = self
            .tasks
            .lock()
            .expect("lock poisoned")
            .remove(&key)
            .is_some();
        self.tree.remove(encode_key(&key))?;
        self.notify.notify_one();
        Ok(existed)
    }

    /// tasks currently waiting to fire
    pub fn pending(&self) -> Vec<DisputeWindowTask> {
        let tasks = self.tasks.lock().expect("lock poisoned");
        tasks
            .iter()
            .map(|(&(loan_id, bytes), &fires_at)| DisputeWindowTask {
                loan_id,
                commitment: ActivityCommitment(FieldScalar(bytes)),
                fires_at,
            })
            .collect()
    }

    /// drive the scheduler: fire due tasks through `on_fire`, one at a time
    ///
    /// the callback runs with no scheduler lock held. a task is erased
    /// from sled only after its callback returns, so a crash mid-fire
    /// refires after restart; the fire handler re-checks ledger state and
    /// tolerates replays.
    pub async fn run<N, F, Fut>(self: Arc<Self>, now_fn: N, mut on_fire: F)
    where
        N: Fn() -> u64 + Send + Sync,
        F: FnMut(DisputeWindowTask) -> Fut + Send,
        Fut: Future<Output = ()> + Send,
    {
        loop {
            let now = now_fn();

            for task in self.take_due(now) {
                tracing::info!(
                    "dispute window expired for loan {} commitment {}",
                    task.loan_id,
                    task.commitment.to_hex()
                );
                on_fire(task.clone()).await;
                self.finish(&task);
            }

            let delay = self.next_delay(now);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.notify.notified() => {}
            }
        }
    }

    /// remove and return all tasks due at `now`; removal from the map
    /// before the callback gives at-most-one in-flight fire per key
    fn take_due(&self, now: u64) -> Vec<DisputeWindowTask> {
        let mut tasks = self.tasks.lock().expect("lock poisoned");
        let due_keys: Vec<TaskKey> = tasks
            .iter()
            .filter(|(_, &fires_at)| fires_at <= now)
            .map(|(&key, _)| key)
            .collect();

        due_keys
            .into_iter()
            .map(|key| {
                let fires_at = tasks.remove(&key).expect("key present");
                DisputeWindowTask {
                    loan_id: key.0,
                    commitment: ActivityCommitment(FieldScalar(key.1)),
                    fires_at,
                }
            })
            .collect()
    }

    /// erase the durable copy unless the key was rescheduled mid-fire
    fn finish(&self, task: &DisputeWindowTask) {
        let key = (task.loan_id, *task.commitment.as_bytes());
        let rescheduled = self
            .tasks
            .lock()
            .expect("lock poisoned")
            .contains_key(&key);
        if !rescheduled {
            if let Err(e) = self.tree.remove(encode_key(&key)) {
                tracing::warn!("failed to erase fired task: {}", e);
            }
        }
    }

    fn next_delay(&self, now: u64) -> Duration {
        let tasks = self.tasks.lock().expect("lock poisoned");
        match tasks.values().min() {
            Some(&earliest) => {
                Duration::from_secs(earliest.saturating_sub(now)).min(POLL_INTERVAL)
            }
            None => POLL_INTERVAL,
        }
    }
}

fn encode_key(key: &TaskKey) -> Vec<u8> {
    let mut out = Vec::with_capacity(40);
    out.extend_from_slice(&key.0.to_be_bytes());
    out.extend_from_slice(&key.1);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::{derive_activity_commitment, BorrowerSecret};
    use std::sync::atomic::{AtomicU64, Ordering};

    fn commitment(n: u8) -> ActivityCommitment {
        let secret = BorrowerSecret::from_bytes([n; 32]);
        derive_activity_commitment(&secret, 700, &[n; 32]).unwrap()
    }

    fn open(dir: &tempfile::TempDir) -> Arc<DisputeScheduler> {
        let db = sled::open(dir.path()).unwrap();
        Arc::new(DisputeScheduler::open(&db).unwrap())
    }

    fn spawn_run(
        scheduler: Arc<DisputeScheduler>,
        clock: Arc<AtomicU64>,
    ) -> Arc<Mutex<Vec<DisputeWindowTask>>> {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        tokio::spawn(scheduler.run(
            move || clock.load(Ordering::SeqCst),
            move |task| {
                let sink = sink.clone();
                async move {
                    sink.lock().expect("lock poisoned").push(task);
                }
            },
        ));
        fired
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = open(&dir);
        let clock = Arc::new(AtomicU64::new(50));
        let fired = spawn_run(scheduler.clone(), clock.clone());

        scheduler
            .schedule(&DisputeWindowTask {
                loan_id: 1,
                commitment: commitment(1),
                fires_at: 100,
            })
            .unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.lock().unwrap().is_empty());

        clock.store(101, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.lock().unwrap().len(), 1);

        // no refire
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.lock().unwrap().len(), 1);
        assert!(scheduler.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_fire() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = open(&dir);
        let clock = Arc::new(AtomicU64::new(50));
        let fired = spawn_run(scheduler.clone(), clock.clone());

        let c = commitment(2);
        scheduler
            .schedule(&DisputeWindowTask {
                loan_id: 2,
                commitment: c,
                fires_at: 100,
            })
            .unwrap();

        assert!(scheduler.cancel(2, &c).unwrap());
        assert!(!scheduler.cancel(2, &c).unwrap());

        clock.store(200, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = open(&dir);
        let clock = Arc::new(AtomicU64::new(0));
        let fired = spawn_run(scheduler.clone(), clock.clone());

        let c = commitment(3);
        for fires_at in [100, 300] {
            scheduler
                .schedule(&DisputeWindowTask {
                    loan_id: 3,
                    commitment: c,
                    fires_at,
                })
                .unwrap();
        }
        assert_eq!(scheduler.pending().len(), 1);

        clock.store(150, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.lock().unwrap().is_empty(), "old deadline must not fire");

        clock.store(301, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.lock().unwrap().len(), 1);
        assert_eq!(fired.lock().unwrap()[0].fires_at, 300);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tasks_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let c = commitment(4);
        {
            let scheduler = open(&dir);
            scheduler
                .schedule(&DisputeWindowTask {
                    loan_id: 4,
                    commitment: c,
                    fires_at: 100,
                })
                .unwrap();
        }

        let scheduler = open(&dir);
        assert_eq!(scheduler.pending().len(), 1);

        let clock = Arc::new(AtomicU64::new(150));
        let fired = spawn_run(scheduler.clone(), clock.clone());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.lock().unwrap().len(), 1);
    }
}
