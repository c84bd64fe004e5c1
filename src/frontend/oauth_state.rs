//! Single-use tokens for the installation flow.
//!
//! OAuth `state` values guard the redirect back from Slack, and selection
//! tokens tie the channel form to the team that just authorized the app.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;

/// What a token was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Purpose {
    OAuthState,
    ChannelSelection { team_id: String },
}

#[derive(Debug, Clone)]
struct Issued {
    at: Instant,
    purpose: Purpose,
}

/// Issues and consumes one-time tokens, each valid for a limited time.
///
/// Trivially cloneable; clones share the same tokens.
#[derive(Clone)]
pub struct OAuthStateStore {
    expiration: Duration,
    tokens: Arc<DashMap<String, Issued>>,
}

impl OAuthStateStore {
    pub fn new(expiration: Duration) -> Self {
        Self {
            expiration,
            tokens: Arc::new(DashMap::new()),
        }
    }

    /// Issue a fresh OAuth state.
    pub fn issue(&self) -> String {
        self.insert(Purpose::OAuthState)
    }

    /// Issue a token that lets the holder pick the channel for `team_id`, once.
    pub fn issue_for_team(&self, team_id: &str) -> String {
        self.insert(Purpose::ChannelSelection { team_id: team_id.to_owned() })
    }

    /// Consume an OAuth state.  Returns `true` only the first time a valid, unexpired state is consumed.
    pub fn consume(&self, state: &str) -> bool {
        self.take(state, &Purpose::OAuthState)
    }

    /// Consume a selection token for `team_id`.  Tokens issued for another team are rejected (and burned).
    pub fn consume_for_team(&self, token: &str, team_id: &str) -> bool {
        self.take(token, &Purpose::ChannelSelection { team_id: team_id.to_owned() })
    }

    fn insert(&self, purpose: Purpose) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let now = Instant::now();

        self.tokens.retain(|_, issued| now.duration_since(issued.at) < self.expiration);
        self.tokens.insert(token.clone(), Issued { at: now, purpose });

        token
    }

    fn take(&self, token: &str, purpose: &Purpose) -> bool {
        self.tokens
            .remove(token)
            .is_some_and(|(_, issued)| issued.at.elapsed() < self.expiration && issued.purpose == *purpose)
    }
}

// Tests.
