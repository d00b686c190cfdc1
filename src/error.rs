use std::fmt::Display;

/// Errors the scheduler can genuinely raise to a caller. Per §7 the
/// scheduler "never raises to its callers except via the documented
/// return values" for protocol-level outcomes (`already_taken`,
/// `invalid_piece`, ...) — those live as plain enum variants on the
/// operation's own result type (`PickOutcome`, `MarkFetched`, ...).
/// `SchedulerError` is reserved for the paths that are genuinely
/// exceptional: the actor's mailbox being gone, a fatal disk write
/// (§7, `write_failed`), and a collaborator rejecting a request.
#[derive(Debug)]
pub struct SchedulerError {
    pub msg: String,
    pub kind: SchedulerErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerErrorKind {
    /// The actor task has shut down; its mailbox cannot accept
    /// further messages.
    ActorGone,
    /// The disk sink rejected a write (§7, `write_failed`). Fatal for
    /// the scheduler turn; the block stays reserved so that `putback`
    /// on eventual peer loss re-queues it.
    WriteFailed,
    /// A collaborator (the catalog, most likely) returned an error for
    /// an otherwise well-formed request, e.g. an unregistered torrent.
    /// Distinct from `ActorGone` so callers don't mistake "the catalog
    /// rejected this torrent" for "the scheduler task is dead."
    Internal,
}

impl SchedulerError {
    pub fn actor_gone(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            kind: SchedulerErrorKind::ActorGone,
        }
    }

    pub fn write_failed(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            kind: SchedulerErrorKind::WriteFailed,
        }
    }
}

impl Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.msg)
    }
}

impl std::error::Error for SchedulerError {}

impl From<anyhow::Error> for SchedulerError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            msg: err.to_string(),
            kind: SchedulerErrorKind::Internal,
        }
    }
}
