//! Friend graph operations.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use database::{friendship, profile, Database, DatabaseError, FriendStatus, Friendship};
use indexmap::IndexSet;
use rider_core::{with_deadline, Conflict, CoreError, IdentityGateway, Result, User};
use tracing::{debug, info};

/// Shortest accepted search query, in characters.
pub const MIN_QUERY_CHARS: usize = 2;

/// Maximum number of search results.
pub const MAX_SEARCH_RESULTS: i64 = 10;

/// Result of a profile search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Matching profiles, at most [`MAX_SEARCH_RESULTS`].
    Results(Vec<User>),
    /// A later search with a different query was issued while this one was in flight.
    Superseded,
}

impl SearchOutcome {
    /// Results, or `None` if superseded.
    pub fn into_results(self) -> Option<Vec<User>> {
        match self {
            SearchOutcome::Results(users) => Some(users),
            SearchOutcome::Superseded => None,
        }
    }
}

#[derive(Debug, Default)]
struct SearchTicket {
    generation: u64,
    query: String,
}

/// Timeouts applied at the operation boundary.
#[derive(Debug, Clone, Copy)]
pub struct GraphTimeouts {
    pub remote: Duration,
    pub search: Duration,
}

/// Friend edges, requests and search over the remote store.
///
/// The store may hold zero, one or two directed rows per pair; every read
/// treats either direction as authoritative.
pub struct SocialGraph {
    db: Database,
    identity: Arc<IdentityGateway>,
    timeouts: GraphTimeouts,
    latest_search: Mutex<SearchTicket>,
}

impl SocialGraph {
    /// Create a graph over the remote store.
    pub fn new(db: Database, identity: Arc<IdentityGateway>, timeouts: GraphTimeouts) -> Self {
        Self {
            db,
            identity,
            timeouts,
            latest_search: Mutex::new(SearchTicket::default()),
        }
    }

    /// Case-insensitive name search excluding `current_user_id`.
    ///
    /// A search whose query was replaced by a later, different query before
    /// it completed returns [`SearchOutcome::Superseded`].
    pub async fn search(&self, query: &str, current_user_id: &str) -> Result<SearchOutcome> {
        let needle = query.trim().to_lowercase();
        if needle.chars().count() < MIN_QUERY_CHARS {
            return Err(CoreError::validation(format!(
                "search query must be at least {} characters",
                MIN_QUERY_CHARS
            )));
        }

        let generation = self.issue_ticket(&needle);

        let users = with_deadline(
            "social.search",
            self.timeouts.search,
            profile::search_profiles(self.db.pool(), &needle, current_user_id, MAX_SEARCH_RESULTS),
        )
        .await?;

        if self.is_superseded(generation, &needle) {
            debug!(query = %needle, "Search superseded");
            return Ok(SearchOutcome::Superseded);
        }

        Ok(SearchOutcome::Results(users))
    }

    fn issue_ticket(&self, query: &str) -> u64 {
        match self.latest_search.lock() {
            Ok(mut ticket) => {
                ticket.generation += 1;
                ticket.query = query.to_string();
                ticket.generation
            }
            Err(_) => 0,
        }
    }

    fn is_superseded(&self, generation: u64, query: &str) -> bool {
        match self.latest_search.lock() {
            Ok(ticket) => ticket.generation != generation && ticket.query != query,
            Err(_) => false,
        }
    }

    /// Accepted friends of `user_id`, reconciled across both row directions.
    pub async fn friends_of(&self, user_id: &str) -> Result<Vec<User>> {
        let edges = with_deadline(
            "social.friends_of",
            self.timeouts.remote,
            friendship::accepted_edges_for(self.db.pool(), user_id),
        )
        .await?;

        let ids = other_parties(&edges, user_id);
        self.load_profiles(ids).await
    }

    /// Users with a pending request addressed to `user_id`.
    pub async fn pending_incoming(&self, user_id: &str) -> Result<Vec<User>> {
        let rows = with_deadline(
            "social.pending_incoming",
            self.timeouts.remote,
            friendship::pending_incoming(self.db.pool(), user_id),
        )
        .await?;

        let senders: IndexSet<String> = rows.into_iter().map(|row| row.user_id).collect();
        self.load_profiles(senders).await
    }

    /// Reconciled relationship between two users, if any row exists.
    ///
    /// Accepted takes precedence over pending, pending over blocked.
    pub async fn relationship(&self, a: &str, b: &str) -> Result<Option<FriendStatus>> {
        let rows = self.edges_between(a, b).await?;
        Ok(reconcile(&rows))
    }

    /// Whether `b` is an accepted friend of `a`.
    pub async fn are_friends(&self, a: &str, b: &str) -> Result<bool> {
        Ok(self.relationship(a, b).await? == Some(FriendStatus::Accepted))
    }

    /// Send a friend request from the signed-in user `from` to `to`.
    pub async fn send_request(&self, from: &str, to: &str) -> Result<()> {
        self.identity.require_self(from).await?;
        if from == to {
            return Err(CoreError::validation("cannot send a friend request to yourself"));
        }

        let target = with_deadline(
            "social.lookup_target",
            self.timeouts.remote,
            profile::get_profile(self.db.pool(), to),
        )
        .await?;
        if target.is_none() {
            return Err(CoreError::validation(format!("user {} does not exist", to)));
        }

        match self.relationship(from, to).await? {
            Some(FriendStatus::Accepted) => return Err(CoreError::Conflict(Conflict::AlreadyFriends)),
            Some(FriendStatus::Pending) => return Err(CoreError::Conflict(Conflict::AlreadySent)),
            Some(FriendStatus::Blocked) => return Err(CoreError::Conflict(Conflict::Blocked)),
            None => {}
        }

        let inserted = with_deadline(
            "social.send_request",
            self.timeouts.remote,
            friendship::insert_edge(self.db.pool(), from, to, FriendStatus::Pending),
        )
        .await;

        match inserted {
            Ok(()) => {
                info!(from, to, "Friend request sent");
                Ok(())
            }
            Err(CoreError::Conflict(Conflict::Exists { .. })) => {
                Err(CoreError::Conflict(Conflict::AlreadySent))
            }
            Err(err) => Err(err),
        }
    }

    /// Accept the pending request `sender -> receiver`.
    ///
    /// Flips the pending row and writes the reciprocal accepted row. An
    /// existing reciprocal row is updated in place.
    pub async fn accept_request(&self, receiver: &str, sender: &str) -> Result<()> {
        self.identity.require_self(receiver).await?;

        let pool = self.db.pool();
        with_deadline("social.accept_request", self.timeouts.remote, async {
            match friendship::transition(
                pool,
                sender,
                receiver,
                FriendStatus::Pending,
                FriendStatus::Accepted,
            )
            .await
            {
                Ok(()) => Ok(()),
                Err(DatabaseError::NotFound { .. }) => Err(CoreError::validation(format!(
                    "no pending request from {}",
                    sender
                ))),
                Err(err) => Err(CoreError::from(err)),
            }
        })
        .await?;

        with_deadline("social.accept_reciprocal", self.timeouts.remote, async {
            match friendship::insert_edge(pool, receiver, sender, FriendStatus::Accepted).await {
                Ok(()) => Ok(()),
                Err(DatabaseError::AlreadyExists { .. }) => {
                    debug!(receiver, sender, "Reciprocal row exists, updating status");
                    friendship::set_status(pool, receiver, sender, FriendStatus::Accepted)
                        .await
                        .map(|_| ())
                }
                Err(err) => Err(err),
            }
        })
        .await?;

        info!(receiver, sender, "Friend request accepted");
        Ok(())
    }

    /// Decline the pending request `sender -> receiver`.
    pub async fn decline_request(&self, receiver: &str, sender: &str) -> Result<()> {
        self.identity.require_self(receiver).await?;

        let rows = self.edges_between(receiver, sender).await?;
        let pending = rows.iter().any(|row| {
            row.user_id == sender
                && row.friend_id == receiver
                && row.status() == Some(FriendStatus::Pending)
        });
        if !pending {
            return Err(CoreError::validation(format!(
                "no pending request from {}",
                sender
            )));
        }

        with_deadline(
            "social.decline_request",
            self.timeouts.remote,
            friendship::delete_edge(self.db.pool(), sender, receiver),
        )
        .await?;

        info!(receiver, sender, "Friend request declined");
        Ok(())
    }

    /// Remove the relationship between `user_id` and `other`, in both directions.
    pub async fn remove_friend(&self, user_id: &str, other: &str) -> Result<()> {
        self.identity.require_self(user_id).await?;

        let removed = with_deadline(
            "social.remove_friend",
            self.timeouts.remote,
            friendship::delete_pair(self.db.pool(), user_id, other),
        )
        .await?;

        info!(user_id, other, removed, "Friend removed");
        Ok(())
    }

    async fn edges_between(&self, a: &str, b: &str) -> Result<Vec<Friendship>> {
        with_deadline(
            "social.edges_between",
            self.timeouts.remote,
            friendship::edges_between(self.db.pool(), a, b),
        )
        .await
    }

    async fn load_profiles(&self, ids: IndexSet<String>) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = ids.into_iter().collect();
        let users = with_deadline(
            "social.load_profiles",
            self.timeouts.remote,
            profile::get_profiles(self.db.pool(), &ids),
        )
        .await?;

        if users.len() < ids.len() {
            debug!(
                expected = ids.len(),
                found = users.len(),
                "Some related profiles are missing"
            );
        }
        Ok(users)
    }
}

/// Other endpoints of `edges` relative to `user_id`, first occurrence wins.
fn other_parties(edges: &[Friendship], user_id: &str) -> IndexSet<String> {
    edges
        .iter()
        .filter_map(|edge| edge.other_party(user_id))
        .filter(|other| *other != user_id)
        .map(str::to_string)
        .collect()
}

fn reconcile(rows: &[Friendship]) -> Option<FriendStatus> {
    let statuses: Vec<FriendStatus> = rows.iter().filter_map(Friendship::status).collect();
    [FriendStatus::Accepted, FriendStatus::Pending, FriendStatus::Blocked]
        .into_iter()
        .find(|wanted| statuses.contains(wanted))
}
