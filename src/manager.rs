use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::providers::ProviderError;
use crate::router::OutputRouter;
use crate::traits::TurnRunner;
use crate::types::{SubmitOutcome, Turn, TurnOutcome, CANCEL_KEYWORD, SOURCE_SCHEDULER};

pub const BUSY_NOTICE: &str =
    "I'm still working on the previous request. Say 'stop' to cancel it, or try again in a moment.";
pub const INTERRUPTED_NOTICE: &str = "🛑 Task interrupted.";

/// The single execution slot. `generation` increments on every admission so
/// a stale turn's cleanup can never release a slot that has since been
/// handed to someone else.
#[derive(Default)]
struct Slot {
    busy: bool,
    generation: u64,
    cancel: Option<CancellationToken>,
}

/// Admission control: one turn runs at a time.
///
/// While busy, "stop" cancels the running turn, scheduler submissions
/// preempt it after a short grace window, and anything else is turned away
/// with a notice. The slot is released by a monitor task that watches the
/// runner's join handle, so a panicking turn frees the slot too.
pub struct TaskManager {
    slot: Mutex<Slot>,
    runner: Arc<dyn TurnRunner>,
    router: Arc<OutputRouter>,
    preempt_grace: Duration,
}

impl TaskManager {
    pub fn new(
        runner: Arc<dyn TurnRunner>,
        router: Arc<OutputRouter>,
        preempt_grace: Duration,
    ) -> Self {
        Self {
            slot: Mutex::new(Slot::default()),
            runner,
            router,
            preempt_grace,
        }
    }

    pub async fn is_busy(&self) -> bool {
        self.slot.lock().await.busy
    }

    /// Admit, cancel, preempt, or reject an incoming request.
    pub async fn submit(self: &Arc<Self>, turn: Turn) -> anyhow::Result<SubmitOutcome> {
        let mut slot = self.slot.lock().await;

        if slot.busy {
            if turn.text.trim().eq_ignore_ascii_case(CANCEL_KEYWORD) {
                info!(source = %turn.source, "Cancellation requested");
                if let Some(cancel) = &slot.cancel {
                    cancel.cancel();
                }
                return Ok(SubmitOutcome::CancelRequested);
            }

            if turn.source == SOURCE_SCHEDULER {
                info!("Scheduler job preempting the running turn");
                if let Some(cancel) = &slot.cancel {
                    cancel.cancel();
                }
                drop(slot);
                // Give the old turn a moment to unwind and emit its
                // interrupted notice before the job takes the slot.
                tokio::time::sleep(self.preempt_grace).await;
                let mut slot = self.slot.lock().await;
                // A turn admitted during the grace window holds a fresh
                // token; it gets preempted as well.
                if slot.busy {
                    if let Some(cancel) = &slot.cancel {
                        cancel.cancel();
                    }
                }
                self.admit(&mut slot, turn).await;
                return Ok(SubmitOutcome::Admitted);
            }

            info!(source = %turn.source, "Slot busy, rejecting");
            let source = turn.source.clone();
            let target = turn.target.clone();
            drop(slot);
            self.router
                .deliver_to(&source, target.as_deref(), BUSY_NOTICE)
                .await;
            return Ok(SubmitOutcome::RejectedBusy);
        }

        self.admit(&mut slot, turn).await;
        Ok(SubmitOutcome::Admitted)
    }

    /// Take the slot and spawn the runner plus its monitor. The caller
    /// holds the slot lock.
    async fn admit(self: &Arc<Self>, slot: &mut Slot, turn: Turn) {
        slot.generation += 1;
        slot.busy = true;
        let generation = slot.generation;
        let cancel = CancellationToken::new();
        slot.cancel = Some(cancel.clone());

        info!(source = %turn.source, generation, "Turn admitted");
        self.router
            .record_activity(&turn.source, turn.target.as_deref())
            .await;

        let source = turn.source.clone();
        let runner = Arc::clone(&self.runner);
        let handle = tokio::spawn(async move { runner.run_turn(turn, cancel).await });

        // Monitor: await the runner no matter how it ends, send the one
        // terminal notice, release the slot.
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            match handle.await {
                Ok(Ok(TurnOutcome::Completed)) => {}
                Ok(Ok(TurnOutcome::Cancelled)) => {
                    manager.router.deliver(&source, INTERRUPTED_NOTICE).await;
                }
                Ok(Err(e)) => {
                    error!(source = %source, "Turn failed: {:#}", e);
                    let notice = match e.downcast_ref::<ProviderError>() {
                        Some(pe) => pe.user_message(),
                        None => format!("Something went wrong: {}", e),
                    };
                    manager.router.deliver(&source, &notice).await;
                }
                Err(join_err) => {
                    error!(source = %source, "Turn task aborted: {}", join_err);
                    manager
                        .router
                        .deliver(&source, "Something went wrong, the task died unexpectedly.")
                        .await;
                }
            }
            manager.release(generation).await;
        });
    }

    async fn release(&self, generation: u64) {
        let mut slot = self.slot.lock().await;
        if slot.generation == generation {
            slot.busy = false;
            slot.cancel = None;
        } else {
            // A preempting turn owns the slot now; nothing to do.
            warn!(
                stale = generation,
                current = slot.generation,
                "Skipping release of superseded slot"
            );
        }
    }
}
