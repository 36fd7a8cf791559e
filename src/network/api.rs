//! The node's own peer-facing HTTP surface

use crate::core::{BlockBundle, BlockHashed, BlockIdentity, TransactionsBundle};
use crate::engine::{BlockSelection, Engine};
use crate::network::{P2PNetwork, PROTOCOL_VERSION};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state behind every route
#[derive(Clone)]
pub struct ApiState {
    /// Node engine handling blocks and transactions
    pub engine: Arc<Engine>,
    /// Peer registry
    pub network: P2PNetwork,
}

/// Build the peer API router
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api", get(version))
        .route("/api/connection", get(connections).post(connect))
        .route("/api/transaction", post(accept_transactions))
        .route("/api/block", get(blocks).post(accept_block))
        .route("/api/block/identity", get(block_identities))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Query selecting blocks either as a page (`s`, `c`) or as an explicit
/// index list (`i`, comma-separated). The two groups are mutually
/// exclusive.
#[derive(Debug, Deserialize)]
pub struct BlockQuery {
    /// Page start index; -1 selects from the tip
    pub s: Option<i64>,
    /// Page size
    pub c: Option<u64>,
    /// Comma-separated explicit indexes
    pub i: Option<String>,
}

impl BlockQuery {
    fn selection(&self) -> Result<BlockSelection, String> {
        match (self.s, self.c, &self.i) {
            (Some(start), Some(count), None) => Ok(BlockSelection::Page { start, count }),
            (None, None, Some(indexes)) => {
                let parsed: Result<Vec<u64>, _> =
                    indexes.split(',').map(|part| part.trim().parse()).collect();
                parsed
                    .map(BlockSelection::Indexes)
                    .map_err(|e| format!("invalid index list: {}", e))
            }
            _ => Err("query requires either s and c, or i".to_string()),
        }
    }
}

async fn version() -> Json<&'static str> {
    Json(PROTOCOL_VERSION)
}

async fn connections(State(state): State<ApiState>) -> Json<Vec<String>> {
    Json(state.network.peer_urls())
}

async fn connect(
    State(state): State<ApiState>,
    Json(address): Json<String>,
) -> Json<Vec<String>> {
    Json(state.network.register_peer(&address).await)
}

async fn accept_transactions(
    State(state): State<ApiState>,
    Json(bundle): Json<TransactionsBundle>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .engine
        .accept_transactions(bundle)
        .await
        .map(|_| StatusCode::OK)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

async fn accept_block(
    State(state): State<ApiState>,
    Json(bundle): Json<BlockBundle>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .engine
        .accept_block(bundle)
        .await
        .map(|_| StatusCode::OK)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

async fn blocks(
    State(state): State<ApiState>,
    Query(query): Query<BlockQuery>,
) -> Result<Json<Vec<BlockHashed>>, (StatusCode, String)> {
    let selection = query
        .selection()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    Ok(Json(state.engine.blocks(&selection).await))
}

async fn block_identities(
    State(state): State<ApiState>,
    Query(query): Query<BlockQuery>,
) -> Result<Json<Vec<BlockIdentity>>, (StatusCode, String)> {
    let selection = query
        .selection()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    Ok(Json(state.engine.block_identities(&selection).await))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_selects_page() {
        let query = BlockQuery {
            s: Some(-1),
            c: Some(1),
            i: None,
        };
        assert_eq!(
            query.selection().unwrap(),
            BlockSelection::Page { start: -1, count: 1 }
        );
    }

    #[test]
    fn test_query_selects_indexes() {
        let query = BlockQuery {
            s: None,
            c: None,
            i: Some("1,2, 30".to_string()),
        };
        assert_eq!(
            query.selection().unwrap(),
            BlockSelection::Indexes(vec![1, 2, 30])
        );
    }

    #[test]
    fn test_query_groups_are_mutually_exclusive() {
        let query = BlockQuery {
            s: Some(0),
            c: Some(1),
            i: Some("1".to_string()),
        };
        assert!(query.selection().is_err());

        let query = BlockQuery {
            s: Some(0),
            c: None,
            i: None,
        };
        assert!(query.selection().is_err());
    }
}
