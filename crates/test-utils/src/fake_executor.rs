use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use jobdag::engine::{JobOutcome, RuntimeEvent, ScheduledJob};
use jobdag::errors::Result;
use jobdag::exec::ExecutorBackend;
use jobdag::store::MemoryArtifactStore;

/// A fake executor that:
/// - records which jobs were "run"
/// - writes their concrete outputs into an in-memory store, plus any
///   realizations configured for dynamic outputs
/// - immediately reports `JobCompleted` for each scheduled job.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    store: MemoryArtifactStore,
    executed: Arc<Mutex<Vec<ScheduledJob>>>,
    /// Rule name → paths written in place of its placeholder outputs.
    realizations: BTreeMap<String, Vec<String>>,
    /// Rules whose jobs fail without writing anything.
    failing: BTreeSet<String>,
    /// Rules whose jobs report success without writing anything.
    silent: BTreeSet<String>,
    /// Rules whose jobs write outputs dated before every input.
    stale: BTreeSet<String>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, store: MemoryArtifactStore) -> Self {
        Self {
            runtime_tx,
            store,
            executed: Arc::new(Mutex::new(Vec::new())),
            realizations: BTreeMap::new(),
            failing: BTreeSet::new(),
            silent: BTreeSet::new(),
            stale: BTreeSet::new(),
        }
    }

    pub fn realize(mut self, rule: &str, paths: &[&str]) -> Self {
        self.realizations
            .insert(rule.to_string(), paths.iter().map(|p| p.to_string()).collect());
        self
    }

    pub fn fail(mut self, rule: &str) -> Self {
        self.failing.insert(rule.to_string());
        self
    }

    /// Report success for `rule` without writing its outputs.
    pub fn skip_outputs(mut self, rule: &str) -> Self {
        self.silent.insert(rule.to_string());
        self
    }

    /// Write the outputs of `rule` with the oldest possible timestamp.
    pub fn stale(mut self, rule: &str) -> Self {
        self.stale.insert(rule.to_string());
        self
    }

    /// Shared handle on the jobs run so far.
    pub fn executed(&self) -> Arc<Mutex<Vec<ScheduledJob>>> {
        Arc::clone(&self.executed)
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_jobs(
        &mut self,
        jobs: Vec<ScheduledJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let store = self.store.clone();
        let executed = Arc::clone(&self.executed);
        let realizations = self.realizations.clone();
        let failing = self.failing.clone();
        let silent = self.silent.clone();
        let stale = self.stale.clone();

        Box::pin(async move {
            for job in jobs {
                {
                    let mut guard = executed.lock().unwrap();
                    guard.push(job.clone());
                }

                let outcome = if failing.contains(&job.rule) {
                    JobOutcome::Failed(format!("{} exited with status 1", job.rule))
                } else if silent.contains(&job.rule) {
                    JobOutcome::Success
                } else {
                    let write = |path: &str| {
                        if stale.contains(&job.rule) {
                            store.add_at(path, 0);
                        } else {
                            store.add(path);
                        }
                    };
                    for output in &job.outputs {
                        if output.is_placeholder() {
                            for path in realizations.get(&job.rule).into_iter().flatten() {
                                write(path);
                            }
                        } else {
                            write(output.path());
                        }
                    }
                    JobOutcome::Success
                };

                tx.send(RuntimeEvent::JobCompleted {
                    job: job.id,
                    outcome,
                })
                .await
                .map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }
}
