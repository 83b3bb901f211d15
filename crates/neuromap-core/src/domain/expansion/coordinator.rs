//! Submits expansion jobs and waits for them

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{ExpansionJobSystem, ExpansionOptions, ExpansionResult, JobId, JobStatus};
use crate::config::ExpansionConfig;
use crate::error::{Error, Result};

pub struct ExpansionCoordinator {
    jobs: Arc<dyn ExpansionJobSystem>,
    poll_interval: Duration,
    default_timeout: Duration,
}

impl std::fmt::Debug for ExpansionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpansionCoordinator")
            .field("poll_interval", &self.poll_interval)
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

impl ExpansionCoordinator {
    pub fn new(jobs: Arc<dyn ExpansionJobSystem>, config: &ExpansionConfig) -> Self {
        Self {
            jobs,
            poll_interval: config.poll_interval().max(Duration::from_millis(1)),
            default_timeout: config.timeout(),
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Submit an expansion job for a context
    pub async fn expand(
        &self,
        user_id: &str,
        context: &str,
        options: &ExpansionOptions,
    ) -> Result<JobId> {
        let job_id = self
            .jobs
            .submit_expansion(user_id, context, options)
            .await
            .map_err(|e| job_system_error("submit an expansion", context, e))?;
        info!(
            user_id = %user_id,
            context = %context,
            job_id = %job_id,
            depth = options.depth,
            "Submitted knowledge expansion"
        );
        Ok(job_id)
    }

    /// Poll `job_id` until it completes, fails, times out or `cancel` fires.
    ///
    /// A failed job surfaces as [`Error::Upstream`] carrying the job's own
    /// message; running out of time is [`Error::Timeout`].
    pub async fn await_completion(
        &self,
        context: &str,
        job_id: &JobId,
        wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<ExpansionResult> {
        let poll = async {
            let mut ticker = interval(self.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let status = self
                    .jobs
                    .poll_job(job_id)
                    .await
                    .map_err(|e| job_system_error("report job status", context, e))?;
                match status {
                    JobStatus::Completed { result } => return Ok(result),
                    JobStatus::Failed { message } => {
                        return Err(Error::upstream(format!(
                            "Knowledge expansion failed for context '{}': {}",
                            context, message
                        )));
                    }
                    status => debug!(job_id = %job_id, ?status, "Expansion still in progress"),
                }
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled(format!(
                "knowledge expansion {} for context '{}'",
                job_id, context
            ))),
            outcome = timeout(wait, poll) => match outcome {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout {
                    operation: format!("knowledge expansion for context '{}'", context),
                    timeout_ms: u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                }),
            },
        }
    }
}

fn job_system_error(action: &str, context: &str, error: Error) -> Error {
    let detail = match error {
        Error::Upstream(message) => message,
        other => other.to_string(),
    };
    Error::upstream(format!(
        "Expansion job system could not {} for context '{}': {}",
        action, context, detail
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays a fixed sequence of statuses, repeating the last one
    struct ScriptedJobs {
        script: Mutex<Vec<JobStatus>>,
        polls: AtomicUsize,
        broken: bool,
    }

    impl ScriptedJobs {
        fn new(script: Vec<JobStatus>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                polls: AtomicUsize::new(0),
                broken: false,
            })
        }

        /// Every call fails with a transport-level error
        fn unreachable() -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(vec![JobStatus::Pending]),
                polls: AtomicUsize::new(0),
                broken: true,
            })
        }
    }

    #[async_trait]
    impl ExpansionJobSystem for ScriptedJobs {
        async fn submit_expansion(
            &self,
            _user_id: &str,
            context: &str,
            _options: &ExpansionOptions,
        ) -> Result<JobId> {
            if self.broken {
                return Err(Error::validation("queue rejected the request"));
            }
            Ok(JobId::new(format!("job-{}", context)))
        }

        async fn poll_job(&self, _job_id: &JobId) -> Result<JobStatus> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            if self.broken {
                return Err(Error::upstream("connection reset"));
            }
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                Ok(script.remove(0))
            } else {
                Ok(script[0].clone())
            }
        }
    }

    fn coordinator(jobs: Arc<ScriptedJobs>) -> ExpansionCoordinator {
        ExpansionCoordinator::new(jobs, &ExpansionConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_completion() {
        let jobs = ScriptedJobs::new(vec![
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed {
                result: ExpansionResult {
                    added_nodes: 4,
                    added_edges: 6,
                },
            },
        ]);
        let coordinator = coordinator(jobs.clone());
        let job = coordinator
            .expand("u", "ctx", &ExpansionOptions::default())
            .await
            .unwrap();
        assert_eq!(job.as_str(), "job-ctx");

        let result = coordinator
            .await_completion("ctx", &job, Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.added_nodes, 4);
        assert_eq!(jobs.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_preserves_job_message() {
        let jobs = ScriptedJobs::new(vec![JobStatus::Failed {
            message: "crawler quota exceeded".into(),
        }]);
        let err = coordinator(jobs)
            .await_completion(
                "research",
                &JobId::new("j"),
                Duration::from_secs(5),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), "E300");
        let msg = err.to_string();
        assert!(msg.contains("research"));
        assert!(msg.contains("crawler quota exceeded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_distinctly() {
        let jobs = ScriptedJobs::new(vec![JobStatus::Running]);
        let err = coordinator(jobs)
            .await_completion(
                "ctx",
                &JobId::new("j"),
                Duration::from_secs(2),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { timeout_ms: 2000, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_waiting() {
        let jobs = ScriptedJobs::new(vec![JobStatus::Pending]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(600)).await;
            trigger.cancel();
        });

        let err = coordinator(jobs)
            .await_completion("ctx", &JobId::new("j"), Duration::from_secs(60), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "E501");
    }

    #[tokio::test]
    async fn test_submit_errors_become_upstream_with_context() {
        let err = coordinator(ScriptedJobs::unreachable())
            .expand("u", "research", &ExpansionOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.code(), "E300");
        let msg = err.to_string();
        assert!(msg.contains("submit an expansion"));
        assert!(msg.contains("research"));
        assert!(msg.contains("queue rejected the request"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_errors_become_upstream_with_context() {
        let jobs = ScriptedJobs::unreachable();
        let err = coordinator(jobs.clone())
            .await_completion(
                "research",
                &JobId::new("j"),
                Duration::from_secs(5),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Upstream(_)));
        let msg = err.to_string();
        assert!(msg.contains("report job status"));
        assert!(msg.contains("research"));
        assert!(msg.contains("connection reset"));
        assert!(!msg.contains("Upstream error: Upstream error"));
        assert_eq!(jobs.polls.load(Ordering::SeqCst), 1);
    }
}
