//! Bounded-concurrency driver for per-question ranking tasks.
//!
//! Questions are submitted in input order, at most `max_tasks` at a time.
//! Completion order is arbitrary; all aggregation happens on the loop that
//! drains completions, never inside the tasks themselves.

use crate::error::{FailureCause, RankingFailure};
use crate::{Qid, Question, RankingResult};
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use tokio::task::{JoinError, JoinSet};

pub const DEFAULT_MAX_TASKS: usize = 100;

type TaskOutput = (Qid, Result<Result<RankingResult, RankingFailure>, JoinError>);

#[derive(Debug, Default)]
pub struct RunOutcome {
    /// Successful results in completion order.
    pub answers: Vec<RankingResult>,
    pub failures: Vec<RankingFailure>,
    /// Wrapper tasks that died before reporting their qid.
    pub unattributed: usize,
    /// Results dropped because their qid was already answered.
    pub duplicates: usize,
    pub submitted: usize,
}

impl RunOutcome {
    pub fn failure_count(&self) -> usize { self.failures.len() + self.unattributed }

    /// Every submitted task lands in exactly one bucket.
    pub fn resolved(&self) -> usize { self.answers.len() + self.failure_count() + self.duplicates }
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    max_tasks: usize,
}

impl Default for Scheduler {
    fn default() -> Self { Self::new(DEFAULT_MAX_TASKS) }
}

impl Scheduler {
    pub fn new(max_tasks: usize) -> Self { Self { max_tasks: max_tasks.max(1) } }

    pub fn max_tasks(&self) -> usize { self.max_tasks }

    /// Run `task` once per question and collect the outcomes.
    ///
    /// Failures are terminal per question and never retried here. Returns only
    /// after every submitted task has resolved.
    pub async fn run<F, Fut>(&self, questions: Vec<Question>, task: F) -> RunOutcome
    where
        F: Fn(Question) -> Fut,
        Fut: Future<Output = Result<RankingResult, RankingFailure>> + Send + 'static,
    {
        let total = questions.len();
        let mut pending: VecDeque<Question> = questions.into();
        let mut inflight: JoinSet<TaskOutput> = JoinSet::new();
        let mut outcome = RunOutcome::default();
        let mut answered: HashSet<Qid> = HashSet::new();

        while !pending.is_empty() || !inflight.is_empty() {
            while inflight.len() < self.max_tasks {
                let Some(question) = pending.pop_front() else { break };
                let qid = question.qid;
                let fut = task(question);
                // the inner spawn keeps a panicking task from losing its qid
                inflight.spawn(async move { (qid, tokio::spawn(fut).await) });
                outcome.submitted += 1;
                tracing::info!(qid, submitted = outcome.submitted, total, "submitted task");
            }

            let Some(first) = inflight.join_next().await else { break };
            self.record(first, &mut outcome, &mut answered);
            while let Some(done) = inflight.try_join_next() {
                self.record(done, &mut outcome, &mut answered);
            }
        }

        tracing::info!(total, succeeded = outcome.answers.len(), failed = outcome.failure_count(), "all tasks resolved");
        outcome
    }

    fn record(&self, joined: Result<TaskOutput, JoinError>, outcome: &mut RunOutcome, answered: &mut HashSet<Qid>) {
        let (dispatched, result) = match joined {
            Ok(output) => output,
            // the outer wrapper only awaits the inner task, so this is unreachable short of runtime shutdown
            Err(err) => {
                tracing::error!(error = %err, "scheduler wrapper task failed");
                outcome.unattributed += 1;
                return;
            }
        };
        match result {
            Ok(Ok(answer)) if answer.qid != dispatched => {
                let failure = RankingFailure::new(dispatched, FailureCause::QidMismatch { dispatched, reported: answer.qid });
                tracing::error!(qid = dispatched, reported = answer.qid, "qid mismatch between dispatched question and result");
                outcome.failures.push(failure);
            }
            Ok(Ok(answer)) => {
                if answered.insert(answer.qid) {
                    tracing::info!(qid = answer.qid, retrieve = answer.retrieve, "completed task");
                    outcome.answers.push(answer);
                } else {
                    tracing::warn!(qid = answer.qid, "duplicate qid in question set, keeping the first answer");
                    outcome.duplicates += 1;
                }
            }
            Ok(Err(failure)) => {
                tracing::warn!(qid = dispatched, error = %failure.cause, "task failed");
                outcome.failures.push(failure);
            }
            Err(join_err) => {
                tracing::warn!(qid = dispatched, error = %join_err, "task aborted");
                outcome.failures.push(RankingFailure::new(dispatched, FailureCause::TaskAborted(join_err.to_string())));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wrapper_failures_are_counted() {
        let mut set: JoinSet<TaskOutput> = JoinSet::new();
        set.spawn(std::future::pending());
        set.abort_all();
        let joined = set.join_next().await.expect("one task");
        assert!(joined.is_err());

        let mut outcome = RunOutcome { submitted: 1, ..RunOutcome::default() };
        let mut answered = HashSet::new();
        Scheduler::new(1).record(joined, &mut outcome, &mut answered);
        assert_eq!(outcome.failure_count(), 1);
        assert_eq!(outcome.resolved(), outcome.submitted);
    }
}
