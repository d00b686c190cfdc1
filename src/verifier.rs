use std::sync::Arc;

use tracing::warn;

use crate::ids::TorrentId;

/// Result of a hash check (§6, `check_piece`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Ok,
    BadHash,
}

/// Where a `Verifier` reports its result. Consumed by the catalog in a
/// full client (§4.4: "on `bad_hash` the catalog re-announces the
/// piece"); this crate only specifies the seam.
pub trait VerificationSink: Send + Sync + 'static {
    fn report(&self, torrent: TorrentId, piece: usize, outcome: VerifyOutcome);
}

/// The hash verifier external collaborator (§2, §6). `check_piece` is
/// fire-and-forget from the scheduler's point of view — per §5 it
/// "must be dispatched to a separate task so it cannot stall the
/// actor"; the result reaches the catalog out of band through a
/// `VerificationSink`, never back through the scheduler.
pub trait Verifier: Send + Sync {
    fn check_piece(&self, torrent: TorrentId, piece: usize);
}

/// Runs a caller-supplied check function on the blocking thread pool.
/// Grounded on the teacher's hash-verification worker, which moves
/// hashing off the async runtime the same way; reading piece bytes and
/// computing the actual digest is out of this crate's scope (§1), so
/// the check function is supplied by the embedder.
pub struct SpawningVerifier<F> {
    check: Arc<F>,
    sink: Arc<dyn VerificationSink>,
}

impl<F> SpawningVerifier<F>
where
    F: Fn(TorrentId, usize) -> VerifyOutcome + Send + Sync + 'static,
{
    pub fn new(check: F, sink: Arc<dyn VerificationSink>) -> Self {
        Self {
            check: Arc::new(check),
            sink,
        }
    }
}

impl<F> Verifier for SpawningVerifier<F>
where
    F: Fn(TorrentId, usize) -> VerifyOutcome + Send + Sync + 'static,
{
    fn check_piece(&self, torrent: TorrentId, piece: usize) {
        let check = Arc::clone(&self.check);
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            match tokio::task::spawn_blocking(move || check(torrent, piece)).await {
                Ok(outcome) => sink.report(torrent, piece, outcome),
                Err(err) => warn!(%torrent, piece, %err, "verification task panicked"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    struct RecordingSink {
        tx: Mutex<Option<oneshot::Sender<(TorrentId, usize, VerifyOutcome)>>>,
    }

    impl VerificationSink for RecordingSink {
        fn report(&self, torrent: TorrentId, piece: usize, outcome: VerifyOutcome) {
            if let Some(tx) = self.tx.lock().unwrap().take() {
                let _ = tx.send((torrent, piece, outcome));
            }
        }
    }

    #[tokio::test]
    async fn dispatches_off_thread_and_reports_result() {
        let (tx, rx) = oneshot::channel();
        let sink = Arc::new(RecordingSink { tx: Mutex::new(Some(tx)) });
        let verifier = SpawningVerifier::new(|_t, _p| VerifyOutcome::BadHash, sink);
        let torrent = TorrentId::new();
        verifier.check_piece(torrent, 3);
        let (reported_torrent, piece, outcome) = rx.await.unwrap();
        assert_eq!(reported_torrent, torrent);
        assert_eq!(piece, 3);
        assert_eq!(outcome, VerifyOutcome::BadHash);
    }
}
