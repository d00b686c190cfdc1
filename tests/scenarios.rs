//! The six concrete scenarios from §8, each driven end to end through
//! a real `SchedulerHandle` over a real channel — the same way the
//! teacher's own examples drive a `Client`, rather than poking at
//! private fields.

mod common;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use chunk_scheduler::catalog::PieceCatalog;
use chunk_scheduler::scheduler::{MarkFetchedOutcome, PickOutcome};
use chunk_scheduler::{HaveSet, Locator, OwnerId, PeerId, TorrentId};

use common::Harness;

fn have(pieces: &[usize]) -> HaveSet {
    pieces.iter().copied().collect()
}

#[tokio::test]
async fn scenario_1_fresh_chunkify() {
    let h = Harness::spawn();
    let torrent = TorrentId::new();
    h.catalog.register(torrent, 1, 32 * 1024, 32 * 1024);
    h.scheduler.register_torrent(OwnerId::new(), torrent, CancellationToken::new()).await.unwrap();

    let peer_a = PeerId::new();
    let outcome = h
        .scheduler
        .pick_blocks(torrent, peer_a, CancellationToken::new(), Some(have(&[0])), 10)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        PickOutcome::Normal(vec![(
            0,
            vec![
                Locator { offset: 0, length: 16384 },
                Locator { offset: 16384, length: 16384 },
            ]
        )])
    );

    let second = h
        .scheduler
        .pick_blocks(torrent, peer_a, CancellationToken::new(), Some(have(&[0])), 10)
        .await
        .unwrap();
    assert_eq!(second, PickOutcome::NoneEligible);
}

#[tokio::test]
async fn scenario_2_reservation_release_on_disconnect() {
    let h = Harness::spawn();
    let torrent = TorrentId::new();
    h.catalog.register(torrent, 1, 32 * 1024, 32 * 1024);
    h.scheduler.register_torrent(OwnerId::new(), torrent, CancellationToken::new()).await.unwrap();

    let peer_a = PeerId::new();
    let token_a = CancellationToken::new();
    let first = h
        .scheduler
        .pick_blocks(torrent, peer_a, token_a.clone(), Some(have(&[0])), 10)
        .await
        .unwrap();
    assert!(matches!(first, PickOutcome::Normal(_)));

    // Peer A dies: cancelling its token is observed by the liveness
    // tracker, which runs `putback` on its own.
    token_a.cancel();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let peer_b = PeerId::new();
    let second = h
        .scheduler
        .pick_blocks(torrent, peer_b, CancellationToken::new(), Some(have(&[0])), 10)
        .await
        .unwrap();
    assert_eq!(
        second,
        PickOutcome::Normal(vec![(
            0,
            vec![
                Locator { offset: 0, length: 16384 },
                Locator { offset: 16384, length: 16384 },
            ]
        )])
    );
}

#[tokio::test]
async fn scenario_3_completion_fires() {
    let h = Harness::spawn();
    let torrent = TorrentId::new();
    h.catalog.register(torrent, 1, 32 * 1024, 32 * 1024);
    h.scheduler.register_torrent(OwnerId::new(), torrent, CancellationToken::new()).await.unwrap();

    let peer_a = PeerId::new();
    h.scheduler
        .pick_blocks(torrent, peer_a, CancellationToken::new(), Some(have(&[0])), 10)
        .await
        .unwrap();

    h.scheduler.store_block(torrent, 0, 0, Bytes::from(vec![0u8; 16384])).unwrap();
    h.scheduler.store_block(torrent, 0, 16384, Bytes::from(vec![0u8; 16384])).unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    assert_eq!(h.verifier.call_count(torrent, 0), 1);

    // The piece is finalized: a fresh pick over the same have-set no
    // longer sees any work for piece 0.
    let after = h
        .scheduler
        .pick_blocks(torrent, PeerId::new(), CancellationToken::new(), Some(have(&[0])), 10)
        .await
        .unwrap();
    assert_eq!(after, PickOutcome::NotInterested);
}

#[tokio::test]
async fn scenario_4_duplicate_store_is_safe() {
    let h = Harness::spawn();
    let torrent = TorrentId::new();
    h.catalog.register(torrent, 1, 32 * 1024, 32 * 1024);
    h.scheduler.register_torrent(OwnerId::new(), torrent, CancellationToken::new()).await.unwrap();

    h.scheduler
        .pick_blocks(torrent, PeerId::new(), CancellationToken::new(), Some(have(&[0])), 10)
        .await
        .unwrap();

    h.scheduler.store_block(torrent, 0, 0, Bytes::from(vec![0u8; 16384])).unwrap();
    h.scheduler.store_block(torrent, 0, 16384, Bytes::from(vec![0u8; 16384])).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(h.verifier.total_calls(), 1);

    // Repeating either store must not trigger a second finalization.
    h.scheduler.store_block(torrent, 0, 0, Bytes::from(vec![0u8; 16384])).unwrap();
    h.scheduler.store_block(torrent, 0, 16384, Bytes::from(vec![0u8; 16384])).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(h.verifier.total_calls(), 1);
}

#[tokio::test]
async fn scenario_5_endgame_shuffle_excludes_fetched_blocks() {
    let h = Harness::spawn();
    let torrent = TorrentId::new();
    h.catalog.register(torrent, 1, 49152, 49152);
    h.scheduler.register_torrent(OwnerId::new(), torrent, CancellationToken::new()).await.unwrap();

    let peer_a = PeerId::new();
    let picked = h
        .scheduler
        .pick_blocks(torrent, peer_a, CancellationToken::new(), Some(have(&[0])), 10)
        .await
        .unwrap();
    assert!(matches!(picked, PickOutcome::Normal(_)));

    // A fetches two of the three blocks; the third stays `{assigned,
    // A}`.
    h.scheduler.store_block(torrent, 0, 0, Bytes::from(vec![0u8; 16384])).unwrap();
    h.scheduler.store_block(torrent, 0, 16384, Bytes::from(vec![0u8; 16384])).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(h.verifier.total_calls(), 0, "piece must not finalize with one block outstanding");

    h.catalog.set_endgame(torrent, true);

    let peer_b = PeerId::new();
    let endgame = h
        .scheduler
        .pick_blocks(torrent, peer_b, CancellationToken::new(), Some(have(&[0])), 5)
        .await
        .unwrap();
    assert_eq!(endgame, PickOutcome::Endgame(vec![(0, vec![Locator { offset: 32768, length: 16384 }])]));
}

#[tokio::test]
async fn scenario_6_mark_fetched_semantics() {
    let h = Harness::spawn();
    let torrent = TorrentId::new();
    h.catalog.register(torrent, 1, 32 * 1024, 32 * 1024);
    h.scheduler.register_torrent(OwnerId::new(), torrent, CancellationToken::new()).await.unwrap();

    let have_set = have(&[0]);
    let descriptor = h.catalog.find_new(torrent, &have_set).unwrap().unwrap();
    h.scheduler.chunkify(torrent, descriptor).await.unwrap();

    let first = h.scheduler.mark_fetched(torrent, 0, 16384).await.unwrap();
    assert_eq!(first, MarkFetchedOutcome::Found);

    let second = h.scheduler.mark_fetched(torrent, 0, 16384).await.unwrap();
    assert_eq!(second, MarkFetchedOutcome::Assigned);
}
