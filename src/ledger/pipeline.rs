//! Serialized, nonce-ordered submission of ledger mutations.
//!
//! The ledger needs a strictly increasing sequence number per account, so two
//! mutations in flight at once would race for the same number. All mutations
//! are queued to one worker task that runs them strictly one after another.

use super::{Ledger, LedgerCall, LedgerError, LedgerErrorKind, Receipt};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

#[derive(Debug)]
struct Job {
    call: LedgerCall,
    reply: oneshot::Sender<Result<Receipt, LedgerError>>,
}

/// Handle to the transaction chain. Cheap to clone; every clone feeds the
/// same queue.
#[derive(Debug, Clone)]
pub struct TxPipeline {
    queue: mpsc::UnboundedSender<Job>,
}

impl TxPipeline {
    /// Starts the worker on the current Tokio runtime.
    #[instrument(skip(ledger))]
    pub fn spawn(ledger: Arc<dyn Ledger>) -> Self {
        let (queue, jobs) = mpsc::unbounded_channel();
        tokio::spawn(run_chain(ledger, jobs));
        info!("Transaction pipeline started");
        Self { queue }
    }

    /// Queues `call` and returns a future for its confirmed receipt.
    ///
    /// The call is enqueued before this returns, so the order of `submit`
    /// calls is the order of execution whether or not the futures are polled.
    /// Dropping the future does not cancel the call.
    pub fn submit(
        &self,
        call: LedgerCall,
    ) -> impl Future<Output = Result<Receipt, LedgerError>> + Send + 'static {
        let method = call.method();
        let (reply, result) = oneshot::channel();
        let queued = self.queue.send(Job { call, reply });
        debug!(method, "Queued ledger call");

        async move {
            if queued.is_err() {
                return Err(LedgerError::new(
                    LedgerErrorKind::PipelineClosed,
                    "Transaction pipeline is not running",
                ));
            }
            result.await.unwrap_or_else(|_| {
                Err(LedgerError::new(
                    LedgerErrorKind::PipelineClosed,
                    "Transaction pipeline dropped the call",
                ))
            })
        }
    }
}

async fn run_chain(ledger: Arc<dyn Ledger>, mut jobs: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = jobs.recv().await {
        let result = dispatch(ledger.as_ref(), &job.call).await;
        if job.reply.send(result).is_err() {
            debug!(method = job.call.method(), "Caller stopped waiting for result");
        }
    }
    info!("Transaction pipeline stopped");
}

/// Runs one call: fetch nonce, send, confirm. A stale nonce gets exactly one
/// retry with a fresh nonce.
#[instrument(skip(ledger, call), fields(method = call.method()))]
async fn dispatch(ledger: &dyn Ledger, call: &LedgerCall) -> Result<Receipt, LedgerError> {
    let nonce = ledger.pending_nonce().await?;
    let tx = match ledger.send(call, nonce).await {
        Ok(tx) => tx,
        Err(err) if err.is_stale_nonce() => {
            warn!(nonce, error = %err, "Stale nonce, retrying once");
            let nonce = ledger.pending_nonce().await?;
            ledger.send(call, nonce).await?
        }
        Err(err) => return Err(err),
    };

    let receipt = ledger.confirm(&tx).await?;
    info!(hash = %receipt.hash, nonce = receipt.nonce, "Ledger call confirmed");
    Ok(receipt)
}
