//! Entry point for issuing requests.

use crate::base::neterror::NetError;
use crate::urlrequest::context::URLRequestContext;
use crate::urlrequest::delegate::ResponseConsumer;
use crate::urlrequest::job::URLRequestJob;
use crate::urlrequest::pool::{Admission, WorkerPool};
use crate::urlrequest::request::RequestHandler;
use std::sync::Arc;

/// Runs requests against a [`URLRequestContext`], either on the caller's
/// task ([`inline`](Self::inline)) or on the bounded worker pool
/// ([`schedule`](Self::schedule)).
#[derive(Debug)]
pub struct RequestPipeline {
    context: Arc<URLRequestContext>,
    pool: WorkerPool,
}

impl RequestPipeline {
    pub fn new(context: Arc<URLRequestContext>) -> Self {
        let config = context.config();
        let pool = WorkerPool::new(config.max_concurrent_requests, config.max_queued_requests);
        Self { context, pool }
    }

    pub fn context(&self) -> &Arc<URLRequestContext> {
        &self.context
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Run a request to completion on the current task.
    ///
    /// The consumer is called exactly once; the same outcome is returned.
    pub async fn inline(
        &self,
        handler: &RequestHandler,
        consumer: Box<dyn ResponseConsumer>,
    ) -> Result<(), NetError> {
        URLRequestJob::new(self.context.clone(), handler.clone())
            .run(consumer)
            .await
    }

    /// Queue a request for a worker.
    ///
    /// Fails with [`NetError::InsufficientResources`] when the queue is
    /// full or the pipeline is shut down; the consumer's `on_error` is
    /// called in that case too. Requests cancelled while queued report
    /// `on_cancelled` without touching the network.
    pub fn schedule(
        &self,
        handler: &RequestHandler,
        consumer: Box<dyn ResponseConsumer>,
    ) -> Result<(), NetError> {
        let slot = match self.pool.reserve() {
            Ok(slot) => slot,
            Err(e) => {
                consumer.on_error(e);
                return Err(e);
            }
        };

        let job = URLRequestJob::new(self.context.clone(), handler.clone());
        let url = handler.descriptor().url.clone();
        self.pool
            .spawn(slot, handler.token().clone(), move |admission| async move {
                match admission {
                    Admission::Running => {
                        let _ = job.run(consumer).await;
                    }
                    Admission::Cancelled => {
                        tracing::debug!(url = %url, "cancelled before start");
                        consumer.on_cancelled();
                    }
                }
            });
        Ok(())
    }

    /// Stop accepting scheduled requests and wait for queued and running
    /// ones to finish.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}
