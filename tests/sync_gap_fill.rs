//! Multi-peer synchronization against in-process peers

mod common;

use blockforge::engine::BlockSelection;
use blockforge::sync::select_best_chain;
use common::{build_engine, mock_network, MockFactory, MockPeer, FORK_CHAIN, MAIN_CHAIN};

#[tokio::test]
async fn test_three_peer_gap_fill() {
    // Three peers carry the same 11-block chain; the first reports the
    // other two so discovery finds them transitively.
    let factory = MockFactory::default()
        .with_peer(
            MockPeer::new("http://peer-a:1/", MAIN_CHAIN.clone()).with_known_peers(vec![
                "http://peer-b:1/".to_string(),
                "http://peer-c:1/".to_string(),
            ]),
        )
        .with_peer(MockPeer::new("http://peer-b:1/", MAIN_CHAIN.clone()))
        .with_peer(MockPeer::new("http://peer-c:1/", MAIN_CHAIN.clone()));

    let network = mock_network(factory);
    network.connect("http://peer-a:1/").await.unwrap();
    assert_eq!(network.peer_count(), 3);

    // Local chain holds only the shared genesis: height 0.
    let engine = build_engine(network);
    engine
        .chain()
        .lock()
        .await
        .add_new_block(MAIN_CHAIN[0].clone());
    assert_eq!(engine.height().await, Some(0));

    let height = engine.sync_chain().await.unwrap();
    assert_eq!(height, 10);

    // Exactly the peer chain, applied in index order.
    let blocks = engine
        .blocks(&BlockSelection::Page {
            start: 0,
            count: 100,
        })
        .await;
    assert_eq!(blocks.len(), 11);
    for (i, block) in blocks.iter().enumerate() {
        assert_eq!(block.identity(), MAIN_CHAIN[i].identity());
    }
}

#[tokio::test]
async fn test_sync_from_empty_chain_includes_genesis() {
    let factory = MockFactory::default()
        .with_peer(MockPeer::new("http://peer-a:1/", MAIN_CHAIN.clone()));
    let network = mock_network(factory);
    network.connect("http://peer-a:1/").await.unwrap();

    let engine = build_engine(network);
    assert_eq!(engine.height().await, None);

    let height = engine.sync_chain().await.unwrap();
    assert_eq!(height, 10);
    assert_eq!(engine.height().await, Some(10));
}

#[tokio::test]
async fn test_failing_peer_ranges_are_refetched_elsewhere() {
    // One peer answers identity queries but refuses every block
    // retrieval; its ranges must be re-fetched from the healthy peer.
    let factory = MockFactory::default()
        .with_peer(MockPeer::new("http://flaky:1/", MAIN_CHAIN.clone()).failing_blocks())
        .with_peer(MockPeer::new("http://steady:1/", MAIN_CHAIN.clone()));

    let network = mock_network(factory);
    network.connect("http://flaky:1/").await.unwrap();
    network.connect("http://steady:1/").await.unwrap();

    let engine = build_engine(network);
    engine
        .chain()
        .lock()
        .await
        .add_new_block(MAIN_CHAIN[0].clone());

    let height = engine.sync_chain().await.unwrap();
    assert_eq!(height, 10);
}

#[tokio::test]
async fn test_best_chain_corroborates_shorter_peers() {
    // Two peers at height 10, one honest straggler at height 5 on the
    // same chain. The straggler's identity is confirmed by a
    // representative of the best group, so all three corroborate.
    let factory = MockFactory::default()
        .with_peer(MockPeer::new("http://full-a:1/", MAIN_CHAIN.clone()))
        .with_peer(MockPeer::new("http://full-b:1/", MAIN_CHAIN.clone()))
        .with_peer(MockPeer::new(
            "http://behind:1/",
            MAIN_CHAIN[..6].to_vec(),
        ));

    let network = mock_network(factory);
    for url in ["http://full-a:1/", "http://full-b:1/", "http://behind:1/"] {
        network.connect(url).await.unwrap();
    }

    let best = select_best_chain(&network).await.unwrap();
    assert_eq!(best.block, MAIN_CHAIN[10].identity());
    assert_eq!(best.peers.len(), 3);
}

#[tokio::test]
async fn test_best_chain_excludes_unrelated_fork() {
    // A peer on a disjoint chain shares no ancestry, so the best-group
    // representative cannot confirm its identity.
    let factory = MockFactory::default()
        .with_peer(MockPeer::new("http://main-a:1/", MAIN_CHAIN.clone()))
        .with_peer(MockPeer::new("http://main-b:1/", MAIN_CHAIN.clone()))
        .with_peer(MockPeer::new("http://forked:1/", FORK_CHAIN.clone()));

    let network = mock_network(factory);
    for url in ["http://main-a:1/", "http://main-b:1/", "http://forked:1/"] {
        network.connect(url).await.unwrap();
    }

    let best = select_best_chain(&network).await.unwrap();
    assert_eq!(best.block, MAIN_CHAIN[10].identity());
    assert_eq!(best.peers.len(), 2);
}

#[tokio::test]
async fn test_sync_fails_when_no_peer_answers() {
    let factory = MockFactory::default()
        .with_peer(MockPeer::new("http://mute:1/", MAIN_CHAIN.clone()).failing_identities());

    let network = mock_network(factory);
    network.connect("http://mute:1/").await.unwrap();

    let engine = build_engine(network.clone());
    assert!(engine.sync_chain().await.is_err());
    // The unresponsive peer was dropped from the registry.
    assert_eq!(network.peer_count(), 0);
}
