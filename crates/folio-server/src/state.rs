//! Shared application state: one consent session per page load.

use std::collections::HashMap;
use std::sync::Arc;

use folio_consent::{
    ChannelBridge, ClientEnvironment, ConsentContext, ConsentManager, ConsentStatus, DevTools,
    FeatureGate, GateSet, MonitorGate, RegionClassifier,
};
use folio_core::{Clock, FolioConfig};
use folio_store::{ConsentStore, KeyValueBackend};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

const MAX_SESSIONS: usize = 1000;
const EVENT_CAPACITY: usize = 32;

/// A live page session and the collaborators wired into its manager.
pub struct SessionHandle {
    pub id: String,
    pub visitor_id: String,
    pub manager: ConsentManager,
    pub bridge: Arc<ChannelBridge>,
    pub analytics: Arc<MonitorGate>,
    pub performance: Arc<MonitorGate>,
    pub created_at: i64,
}

/// Per-monitor activation flags reported to the page.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorFlags {
    pub analytics: bool,
    pub performance: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: String,
    pub visitor_id: String,
    pub consent: ConsentStatus,
    pub monitors: MonitorFlags,
}

impl SessionHandle {
    pub fn view(&self) -> SessionView {
        SessionView {
            session_id: self.id.clone(),
            visitor_id: self.visitor_id.clone(),
            consent: self.manager.status(),
            monitors: MonitorFlags {
                analytics: self.analytics.is_active(),
                performance: self.performance.is_active(),
            },
        }
    }
}

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: FolioConfig,
    backend: Arc<dyn KeyValueBackend>,
    clock: Arc<dyn Clock>,
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl AppState {
    pub fn new(config: FolioConfig, backend: Arc<dyn KeyValueBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            backend,
            clock,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// The persisted records of one visitor.
    pub fn store_for(&self, visitor_id: &str) -> ConsentStore {
        ConsentStore::new(self.backend.clone(), self.clock.clone())
            .with_namespace(visitor_id)
            .with_decision_ttl(self.config.decision_ttl)
    }

    pub fn dev_tools(&self, visitor_id: &str) -> DevTools {
        DevTools::new(self.store_for(visitor_id))
    }

    /// Build and initialize a consent session for a page load.
    pub fn start_session(&self, visitor_id: &str, environment: ClientEnvironment) -> Arc<SessionHandle> {
        let store = self.store_for(visitor_id);
        let classifier = RegionClassifier::new(store.clone(), Arc::new(environment))
            .with_freshness_window(self.config.freshness_window);
        let bridge = Arc::new(ChannelBridge::new(EVENT_CAPACITY));
        let (gates, analytics, performance) = GateSet::site_monitors();

        let manager = ConsentManager::new(ConsentContext {
            store,
            classifier,
            bridge: bridge.clone(),
            gate: Arc::new(gates),
        });
        manager.initialize();

        let handle = Arc::new(SessionHandle {
            id: uuid::Uuid::new_v4().to_string(),
            visitor_id: visitor_id.to_string(),
            manager,
            bridge,
            analytics,
            performance,
            created_at: self.clock.now_millis(),
        });

        let mut sessions = self.sessions.write();
        if sessions.len() >= MAX_SESSIONS {
            // Evict the oldest session; its pending prompt simply lapses.
            if let Some(oldest) = sessions
                .values()
                .min_by_key(|s| s.created_at)
                .map(|s| s.id.clone())
            {
                sessions.remove(&oldest);
            }
        }
        sessions.insert(handle.id.clone(), handle.clone());
        info!(
            "Consent session {} started for visitor {}: {}",
            handle.id,
            visitor_id,
            handle.manager.state()
        );
        handle
    }

    pub fn session(&self, id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.read().get(id).cloned()
    }

    /// The newest live session of a visitor, if any.
    pub fn latest_session_for(&self, visitor_id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions
            .read()
            .values()
            .filter(|s| s.visitor_id == visitor_id)
            .max_by_key(|s| s.created_at)
            .cloned()
    }

    /// End a session without recording a decision.
    pub fn end_session(&self, id: &str) -> bool {
        self.sessions.write().remove(id).is_some()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}

/// Visitor ids become storage key prefixes; keep them to a safe alphabet.
pub fn valid_visitor_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
