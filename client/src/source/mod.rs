//! Backends the façade can route a call to.

use std::sync::Arc;

use muvin_backend_api::{Agent, HotelBackend};

pub mod fixture;
pub mod live;

pub use fixture::FixtureBackend;
pub use live::CanisterBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Live,
    Fixture,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Live => "live",
            SourceKind::Fixture => "fixture",
        }
    }
}

/// Live backend plus the optional degraded-mode fallback.
pub struct Sources {
    live: Arc<dyn HotelBackend>,
    fixture: Option<Arc<dyn HotelBackend>>,
}

impl Sources {
    pub fn new(live: Arc<dyn HotelBackend>, fixture: Option<Arc<dyn HotelBackend>>) -> Self {
        Self { live, fixture }
    }

    pub fn live_only(live: Arc<dyn HotelBackend>) -> Self {
        Self::new(live, None)
    }

    /// Handles without an endpoint go to the fixture when one is configured.
    /// Otherwise the live backend answers and reports itself unavailable.
    pub fn pick(&self, agent: &Agent) -> (SourceKind, Arc<dyn HotelBackend>) {
        match (&self.fixture, agent.endpoint()) {
            (Some(fixture), None) => (SourceKind::Fixture, fixture.clone()),
            _ => (SourceKind::Live, self.live.clone()),
        }
    }

    pub fn has_fixture(&self) -> bool {
        self.fixture.is_some()
    }
}
