//! Lightweight friend graph consumed by the emergency contact manager.
//!
//! Friendships are stored as directed rows that may be missing one side;
//! [`SocialGraph`] reconciles them into undirected relationships.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use database::Database;
//! use rider_core::IdentityGateway;
//! use social_graph::{GraphTimeouts, SocialGraph};
//!
//! # async fn example() -> rider_core::Result<()> {
//! let db = Database::in_memory().await?;
//! let identity = Arc::new(IdentityGateway::new(db.clone(), Duration::from_secs(10)));
//! let graph = SocialGraph::new(
//!     db,
//!     identity,
//!     GraphTimeouts {
//!         remote: Duration::from_secs(10),
//!         search: Duration::from_secs(5),
//!     },
//! );
//!
//! for friend in graph.friends_of("alex").await? {
//!     println!("{}", friend.name);
//! }
//! # Ok(())
//! # }
//! ```

mod graph;

pub use graph::{GraphTimeouts, SearchOutcome, SocialGraph, MAX_SEARCH_RESULTS, MIN_QUERY_CHARS};

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
