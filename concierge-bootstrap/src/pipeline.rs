//! Stages, waves and sub-steps.
//!
//! A [`Stage`] is an ordered list of waves. Every sub-step of a wave runs
//! concurrently and the wave completes only when all of them have finished,
//! whether they succeeded or not. Results are then inspected in the order the
//! steps were added, and the first failure ends the stage.

use crate::error::BootstrapError;
use async_trait::async_trait;
use concierge_core::error::StoreResult;
use concierge_core::store::ConciergeStore;
use futures::future::join_all;
use std::fmt;
use tracing::{error, info};

/// Bootstrap stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageName {
    Drop,
    Create,
    Seed,
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageName::Drop => write!(f, "drop"),
            StageName::Create => write!(f, "create"),
            StageName::Seed => write!(f, "seed"),
        }
    }
}

/// One unit of bootstrap work against the store.
#[async_trait]
pub trait BootstrapStep: Send + Sync {
    /// Name reported in logs and failures, e.g. `create users table`.
    fn name(&self) -> String;

    async fn run(&self, store: &dyn ConciergeStore) -> StoreResult<()>;
}

/// A named sequence of waves.
pub struct Stage {
    name: StageName,
    waves: Vec<Vec<Box<dyn BootstrapStep>>>,
}

impl Stage {
    pub fn new(name: StageName) -> Self {
        Self {
            name,
            waves: Vec::new(),
        }
    }

    /// Append a wave of steps that run concurrently.
    pub fn wave(mut self, steps: Vec<Box<dyn BootstrapStep>>) -> Self {
        self.waves.push(steps);
        self
    }

    pub fn name(&self) -> StageName {
        self.name
    }

    /// Step names per wave.
    pub fn plan(&self) -> Vec<Vec<String>> {
        self.waves
            .iter()
            .map(|wave| wave.iter().map(|step| step.name()).collect())
            .collect()
    }

    pub async fn run(&self, store: &dyn ConciergeStore) -> Result<(), BootstrapError> {
        info!(stage = %self.name, waves = self.waves.len(), "Starting bootstrap stage");

        for wave in &self.waves {
            let results = join_all(wave.iter().map(|step| self.run_step(step.as_ref(), store))).await;

            for (step, result) in wave.iter().zip(results) {
                result.map_err(|cause| BootstrapError::StageFailure {
                    stage: self.name,
                    substep: step.name(),
                    cause,
                })?;
            }
        }

        info!(stage = %self.name, "Completed bootstrap stage");
        Ok(())
    }

    async fn run_step(&self, step: &dyn BootstrapStep, store: &dyn ConciergeStore) -> StoreResult<()> {
        let result = step.run(store).await;
        match &result {
            Ok(()) => info!(stage = %self.name, step = %step.name(), "Bootstrap step completed"),
            Err(err) => error!(
                stage = %self.name,
                step = %step.name(),
                error = %err,
                "Bootstrap step failed"
            ),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_core::error::StoreError;
    use concierge_core::store::memory::MemoryStore;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct TimedStep {
        name: &'static str,
        delay: Duration,
        fail: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl BootstrapStep for TimedStep {
        fn name(&self) -> String {
            self.name.to_string()
        }

        async fn run(&self, _store: &dyn ConciergeStore) -> StoreResult<()> {
            tokio::time::sleep(self.delay).await;
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                Err(StoreError::NotFound(self.name.to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn timed(
        log: &Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
        millis: u64,
        fail: bool,
    ) -> Box<dyn BootstrapStep> {
        Box::new(TimedStep {
            name,
            delay: Duration::from_millis(millis),
            fail,
            log: log.clone(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_wave_is_a_barrier() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stage = Stage::new(StageName::Create)
            .wave(vec![timed(&log, "slow", 50, false), timed(&log, "fast", 1, false)])
            .wave(vec![timed(&log, "next", 0, false)]);

        stage.run(&MemoryStore::new()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["fast", "slow", "next"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_failure_in_step_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stage = Stage::new(StageName::Seed)
            .wave(vec![
                timed(&log, "first", 50, true),
                timed(&log, "second", 1, true),
                timed(&log, "third", 10, false),
            ])
            .wave(vec![timed(&log, "never", 0, false)]);

        let err = stage.run(&MemoryStore::new()).await.unwrap_err();
        assert_eq!(err.stage(), StageName::Seed);
        assert_eq!(err.substep(), "first");
        // every sibling ran to completion; the next wave did not start
        assert_eq!(*log.lock().unwrap(), vec!["second", "third", "first"]);
    }

    #[test]
    fn test_plan_lists_waves() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stage = Stage::new(StageName::Drop)
            .wave(vec![timed(&log, "a", 0, false)])
            .wave(vec![timed(&log, "b", 0, false), timed(&log, "c", 0, false)]);
        assert_eq!(stage.plan(), vec![vec!["a"], vec!["b", "c"]]);
        assert_eq!(stage.name().to_string(), "drop");
    }
}
