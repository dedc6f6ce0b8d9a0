// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use crate::database::DatabaseError;
use crate::route::DatabaseId;
use crate::store::StoreError;

/// Recommended number of node expansions allowed in a single route search
/// before [RoutingError::LimitExceeded] is returned.
pub const DEFAULT_NODE_LIMIT: usize = 1_000_000;

/// Reasons for which a route could not be calculated.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    /// Every node reachable under the cost limit was expanded without reaching the target.
    #[error("no route found")]
    NotFound,

    /// The [Breaker](crate::Breaker) passed to the calculation was triggered.
    #[error("route calculation cancelled")]
    Cancelled,

    /// Route search has exceeded its limit of expanded nodes.
    ///
    /// Concluding that no route exists may require traversing a large part
    /// of the graph. The node limit protects against resource exhaustion.
    #[error("node limit of {0} exceeded")]
    LimitExceeded(usize),

    #[error("router is not open")]
    NotOpen,

    #[error("invalid route position: {0}")]
    InvalidPosition(String),

    /// A found path could not be followed along the objects of its databases.
    #[error("cannot resolve route path: {0}")]
    UnresolvablePath(String),

    #[error("unknown database {0}")]
    UnknownDatabase(DatabaseId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}
