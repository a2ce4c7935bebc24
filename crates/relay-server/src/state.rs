//! Shared gateway state, injected into every handler.

use std::sync::Arc;

use relay_auth::Authority;
use relay_settings::RelaySettings;

use crate::mirror::ConnectionMirror;
use crate::registry::Registry;

/// Process-wide dependencies: the registry is the single source of truth
/// for routing; the mirror (when configured) is a best-effort durable
/// copy for cross-instance visibility and is never read on the hot path.
pub struct AppState {
    /// Live connections and the topic index.
    pub registry: Registry,
    /// The external trust boundary.
    pub authority: Arc<dyn Authority>,
    /// Settings snapshot taken at startup.
    pub settings: Arc<RelaySettings>,
    /// Durable connection mirror, when a database is configured.
    pub mirror: Option<ConnectionMirror>,
}

impl AppState {
    /// Assemble the state.
    pub fn new(
        authority: Arc<dyn Authority>,
        settings: Arc<RelaySettings>,
        mirror: Option<ConnectionMirror>,
    ) -> Self {
        Self {
            registry: Registry::new(),
            authority,
            settings,
            mirror,
        }
    }
}
