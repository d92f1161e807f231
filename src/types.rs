/// Source id used by the scheduler when it submits a due job. Scheduler turns
/// preempt whatever is running and their output is broadcast to every
/// recently active surface.
pub const SOURCE_SCHEDULER: &str = "scheduler";

pub const SOURCE_TELEGRAM: &str = "telegram";
pub const SOURCE_CONSOLE: &str = "console";

/// Keyword that cancels the in-flight task when sent while busy.
/// Compared after trimming, case-insensitively.
pub const CANCEL_KEYWORD: &str = "stop";

/// One unit of admitted work: a text request plus where it came from.
#[derive(Debug, Clone)]
pub struct Turn {
    /// Originating surface: a channel name ("telegram", "console"), a live
    /// connection id ("ipc_127.0.0.1:53412"), or [`SOURCE_SCHEDULER`].
    pub source: String,
    /// Channel-specific reply address (e.g. a Telegram chat id). None when
    /// the channel has a single destination.
    pub target: Option<String>,
    pub text: String,
}

impl Turn {
    pub fn new(source: &str, target: Option<String>, text: &str) -> Self {
        Self {
            source: source.to_string(),
            target,
            text: text.to_string(),
        }
    }
}

/// How an admitted turn ended. Errors are reported separately via
/// `anyhow::Result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Cancelled,
}

/// What `TaskManager::submit` did with an incoming request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The slot was free (or freed by preemption) and the turn is running.
    Admitted,
    /// The slot was busy and the sender was told to try again or say "stop".
    RejectedBusy,
    /// The text was the cancellation keyword; the running turn was cancelled.
    CancelRequested,
}
