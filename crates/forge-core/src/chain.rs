//! The per-runner execution chain.
//!
//! A FIFO queue drained by exactly one worker task: a step starts only after
//! the previous one has settled, so at most one step per chain is ever in
//! flight and steps run in submission order. A failing or panicking step
//! does not stop the worker.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};

use crate::error::{EngineError, Result};

type Step = Pin<Box<dyn Future<Output = ()> + Send>>;

pub struct ExecutionChain {
    label: String,
    tx: mpsc::UnboundedSender<Step>,
}

impl ExecutionChain {
    /// Start the worker. Must be called from within a Tokio runtime.
    ///
    /// The worker exits once the chain is dropped and the queue is drained.
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Step>();

        let worker_label = label.clone();
        tokio::spawn(async move {
            while let Some(step) = rx.recv().await {
                if AssertUnwindSafe(step).catch_unwind().await.is_err() {
                    tracing::error!(chain = %worker_label, "chain step panicked; continuing");
                }
            }
            tracing::debug!(chain = %worker_label, "execution chain closed");
        });

        Self { label, tx }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Append `fut` to the chain. The returned [`Completion`] resolves with
    /// its output once it has run; dropping the completion does not cancel
    /// the step.
    pub fn enqueue<F, T>(&self, fut: F) -> Completion<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let step: Step = Box::pin(async move {
            let _ = done_tx.send(fut.await);
        });
        if self.tx.send(step).is_err() {
            tracing::warn!(chain = %self.label, "enqueue on a closed execution chain");
        }
        Completion { rx: done_rx }
    }
}

/// Handle to the output of one chained step.
///
/// Resolves to [`EngineError::ChainClosed`] when the step was dropped
/// without producing a value (worker gone, or the step panicked).
#[derive(Debug)]
pub struct Completion<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Future for Completion<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.map_err(|_| EngineError::ChainClosed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[tokio::test]
    async fn steps_run_in_submission_order() {
        let chain = ExecutionChain::new("test");
        let log = Arc::new(Mutex::new(Vec::new()));

        // The first step is the slowest; it must still finish first.
        let mut handles = vec![];
        for (i, delay) in [(1, 60u64), (2, 10), (3, 0)] {
            let log = Arc::clone(&log);
            handles.push(chain.enqueue(async move {
                log.lock().unwrap().push(format!("start {i}"));
                tokio::time::sleep(Duration::from_millis(delay)).await;
                log.lock().unwrap().push(format!("end {i}"));
                i
            }));
        }
        let mut results = vec![];
        for h in handles {
            results.push(h.await.unwrap());
        }

        assert_eq!(results, vec![1, 2, 3]);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["start 1", "end 1", "start 2", "end 2", "start 3", "end 3"]
        );
    }

    #[tokio::test]
    async fn failed_step_does_not_stop_the_chain() {
        let chain = ExecutionChain::new("test");
        let failing = chain.enqueue(async { Err::<(), _>("boom") });
        let next = chain.enqueue(async { 7 });
        assert_eq!(failing.await.unwrap(), Err("boom"));
        assert_eq!(next.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn panicking_step_reports_closed_and_chain_continues() {
        let chain = ExecutionChain::new("test");
        let panicking: Completion<()> = chain.enqueue(async { panic!("step blew up") });
        let next = chain.enqueue(async { "still alive" });
        assert!(matches!(panicking.await, Err(EngineError::ChainClosed)));
        assert_eq!(next.await.unwrap(), "still alive");
    }

    #[tokio::test]
    async fn dropped_completion_still_runs_step() {
        let chain = ExecutionChain::new("test");
        let flag = Arc::new(Mutex::new(false));
        let f = Arc::clone(&flag);
        drop(chain.enqueue(async move {
            *f.lock().unwrap() = true;
        }));
        chain.enqueue(async {}).await.unwrap();
        assert!(*flag.lock().unwrap());
    }
}
