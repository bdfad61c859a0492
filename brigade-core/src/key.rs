//! Collection keys and matchers.
//!
//! A `CollectionKey` addresses exactly one cached view of a remote
//! collection. The matcher is a pure data predicate over keys, so bulk
//! invalidation is testable without any knowledge of URL or string shape.

use crate::VenueId;
use serde::{Deserialize, Serialize};

/// Resource families the dashboard caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Stock,
    Recipe,
    Order,
    Staff,
    Notification,
    Subscription,
}

impl ResourceKind {
    /// Path segment used by the REST API for this resource.
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::Stock => "stock-items",
            Self::Recipe => "recipes",
            Self::Order => "orders",
            Self::Staff => "staff",
            Self::Notification => "notifications",
            Self::Subscription => "subscriptions",
        }
    }
}

/// Which view of a scope's collection an entry holds.
///
/// `All` is the unbounded list; `Window` is the cursor-paginated view.
/// Both views of one scope cache the same remote collection and must be
/// patched together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    All,
    Window,
}

/// Composite key addressing one cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionKey {
    pub resource: ResourceKind,
    pub venue: VenueId,
    pub view: ViewKind,
}

impl CollectionKey {
    pub fn new(resource: ResourceKind, venue: VenueId, view: ViewKind) -> Self {
        Self {
            resource,
            venue,
            view,
        }
    }

    /// The unbounded view of a venue's collection.
    pub fn all(resource: ResourceKind, venue: VenueId) -> Self {
        Self::new(resource, venue, ViewKind::All)
    }

    /// The paginated view of a venue's collection.
    pub fn window(resource: ResourceKind, venue: VenueId) -> Self {
        Self::new(resource, venue, ViewKind::Window)
    }
}

impl std::fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{:?}",
            self.resource.path_segment(),
            self.venue,
            self.view
        )
    }
}

/// Pure predicate over collection keys.
///
/// `None` fields are wildcards. A mutation carries one of these so the
/// coordinator can patch every view the mutation is visible in (flat and
/// windowed) in one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMatcher {
    pub resource: ResourceKind,
    pub venue: Option<VenueId>,
    pub view: Option<ViewKind>,
}

impl KeyMatcher {
    /// Match every view of one venue's collection. This is the matcher
    /// almost every mutation wants.
    pub fn venue_wide(resource: ResourceKind, venue: VenueId) -> Self {
        Self {
            resource,
            venue: Some(venue),
            view: None,
        }
    }

    /// Match every cached view of a resource across venues.
    pub fn resource_wide(resource: ResourceKind) -> Self {
        Self {
            resource,
            venue: None,
            view: None,
        }
    }

    /// Match exactly one key.
    pub fn only(key: CollectionKey) -> Self {
        Self {
            resource: key.resource,
            venue: Some(key.venue),
            view: Some(key.view),
        }
    }

    /// Restrict the matcher to a single view kind.
    pub fn with_view(mut self, view: ViewKind) -> Self {
        self.view = Some(view);
        self
    }

    pub fn matches(&self, key: &CollectionKey) -> bool {
        if self.resource != key.resource {
            return false;
        }
        if let Some(venue) = self.venue {
            if venue != key.venue {
                return false;
            }
        }
        if let Some(view) = self.view {
            if view != key.view {
                return false;
            }
        }
        true
    }
}
