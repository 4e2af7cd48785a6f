//! Typed consent records over a [`KeyValueBackend`].
//!
//! Reads never fail from the caller's point of view: an unavailable backend,
//! a payload that does not parse, or an expired decision all read as `None`.
//! Writes log and drop their errors.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::KeyValueBackend;
use crate::types::*;
use folio_core::{Clock, Error, Result};

/// Durable store for one visitor's consent decision and region cache.
#[derive(Clone)]
pub struct ConsentStore {
    backend: Arc<dyn KeyValueBackend>,
    clock: Arc<dyn Clock>,
    namespace: Option<String>,
    decision_ttl: Option<Duration>,
}

impl ConsentStore {
    /// Create a store over `backend` with no namespace and no decision expiry.
    pub fn new(backend: Arc<dyn KeyValueBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            namespace: None,
            decision_ttl: None,
        }
    }

    /// Scope all keys to one visitor, e.g. `"v42:consent-decision"`.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Treat decisions older than `ttl` as absent.
    pub fn with_decision_ttl(mut self, ttl: Duration) -> Self {
        self.decision_ttl = Some(ttl);
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ---------------------------------------------------------------
    // Consent decision
    // ---------------------------------------------------------------

    /// Load the current decision, or `None` if absent, invalid, or expired.
    /// A legacy record is upgraded in place.
    pub fn load(&self) -> Option<ConsentDecision> {
        self.load_decision(true)
    }

    /// Like [`Self::load`] but never writes; a legacy record reads as `None`.
    pub fn peek(&self) -> Option<ConsentDecision> {
        self.load_decision(false)
    }

    fn load_decision(&self, migrate: bool) -> Option<ConsentDecision> {
        let decision = match self.read::<ConsentDecision>(DECISION_KEY) {
            Ok(Some(decision)) => decision,
            Ok(None) if migrate => return self.migrate_legacy(),
            Ok(None) => return None,
            Err(e) => {
                warn!("Consent decision unreadable, treating as absent: {}", e);
                return None;
            }
        };

        if decision.timestamp < 0 {
            warn!(
                "{}",
                Error::InvalidPersistedShape {
                    key: self.key(DECISION_KEY),
                    reason: format!("negative timestamp {}", decision.timestamp),
                }
            );
            return None;
        }

        if let Some(ttl) = self.decision_ttl {
            let age = self.clock.now_millis().saturating_sub(decision.timestamp);
            if age >= i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX) {
                info!(
                    "Consent decision ({}) expired after {}ms, treating as absent",
                    decision.reason, age
                );
                return None;
            }
        }

        Some(decision)
    }

    /// Persist `decision`, replacing any earlier one.
    pub fn save(&self, decision: &ConsentDecision) {
        if let Err(e) = self.write(DECISION_KEY, decision) {
            warn!("Failed to persist consent decision: {}", e);
        }
    }

    /// Remove the decision. Idempotent.
    pub fn clear(&self) {
        if let Err(e) = self.backend.remove(&self.key(DECISION_KEY)) {
            warn!("Failed to clear consent decision: {}", e);
        }
    }

    // ---------------------------------------------------------------
    // Region classification
    // ---------------------------------------------------------------

    /// Load the cached classification, or `None` if absent or invalid.
    ///
    /// Freshness is the classifier's concern; this returns stale entries too.
    pub fn load_classification(&self) -> Option<RegionClassification> {
        match self.read::<RegionClassification>(CLASSIFICATION_KEY) {
            Ok(Some(c)) => {
                let reason = if c.timestamp < 0 {
                    format!("negative timestamp {}", c.timestamp)
                } else if c.is_restricted_region != c.signals.any() {
                    format!(
                        "verdict {} disagrees with signals {:?}",
                        c.is_restricted_region, c.signals
                    )
                } else {
                    return Some(c);
                };
                warn!(
                    "{}",
                    Error::InvalidPersistedShape {
                        key: self.key(CLASSIFICATION_KEY),
                        reason,
                    }
                );
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Region cache unreadable, treating as absent: {}", e);
                None
            }
        }
    }

    pub fn save_classification(&self, classification: &RegionClassification) {
        if let Err(e) = self.write(CLASSIFICATION_KEY, classification) {
            warn!("Failed to persist region classification: {}", e);
        }
    }

    pub fn clear_classification(&self) {
        if let Err(e) = self.backend.remove(&self.key(CLASSIFICATION_KEY)) {
            warn!("Failed to clear region classification: {}", e);
        }
    }

    /// Remove every consent record, including the legacy key.
    pub fn clear_all(&self) {
        self.clear();
        self.clear_classification();
        if let Err(e) = self.backend.remove(&self.key(LEGACY_DECISION_KEY)) {
            warn!("Failed to clear legacy consent record: {}", e);
        }
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    fn key(&self, name: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{}:{}", ns, name),
            None => name.to_string(),
        }
    }

    fn read<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let key = self.key(name);
        let Some(raw) = self.backend.get(&key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| Error::InvalidPersistedShape {
                key,
                reason: e.to_string(),
            })
    }

    fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.backend.set(&self.key(name), &json)
    }

    /// Upgrade a bare legacy status string into a full decision record.
    fn migrate_legacy(&self) -> Option<ConsentDecision> {
        let legacy_key = self.key(LEGACY_DECISION_KEY);
        let raw = match self.backend.get(&legacy_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                debug!("Legacy consent key unreadable: {}", e);
                return None;
            }
        };

        let granted = match raw.trim().trim_matches('"').to_ascii_lowercase().as_str() {
            "accepted" | "granted" => true,
            "declined" | "denied" => false,
            other => {
                warn!(
                    "{}",
                    Error::InvalidPersistedShape {
                        key: legacy_key,
                        reason: format!("unknown legacy status '{}'", other),
                    }
                );
                return None;
            }
        };

        let decision = ConsentDecision::new(granted, DecisionReason::Restored, self.clock.now_millis());
        self.save(&decision);
        if let Err(e) = self.backend.remove(&legacy_key) {
            warn!("Failed to remove legacy consent key: {}", e);
        }
        info!("Migrated legacy consent record (granted={})", granted);
        Some(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, UnavailableBackend};
    use folio_core::ManualClock;

    const DAY_MS: i64 = 86_400_000;

    fn test_store() -> (ConsentStore, Arc<MemoryBackend>, Arc<ManualClock>) {
        let backend = Arc::new(MemoryBackend::new());
        let clock = Arc::new(ManualClock::new(10 * DAY_MS));
        let store = ConsentStore::new(backend.clone(), clock.clone());
        (store, backend, clock)
    }

    #[test]
    fn test_save_load_clear() {
        let (store, _, _) = test_store();
        assert!(store.load().is_none());

        let decision = ConsentDecision::new(false, DecisionReason::UserDecline, 123);
        store.save(&decision);
        assert_eq!(store.load(), Some(decision));

        store.clear();
        store.clear();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_corrupt_payload_reads_as_absent() {
        let (store, backend, _) = test_store();
        backend.set(DECISION_KEY, "{not json").unwrap();
        assert!(store.load().is_none());

        backend
            .set(DECISION_KEY, r#"{"granted":"yes","reason":"user-accept","timestamp":1}"#)
            .unwrap();
        assert!(store.load().is_none());

        backend
            .set(DECISION_KEY, r#"{"granted":true,"reason":"because","timestamp":1}"#)
            .unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_unavailable_backend_degrades_to_absent() {
        let store = ConsentStore::new(Arc::new(UnavailableBackend), Arc::new(ManualClock::new(0)));
        store.save(&ConsentDecision::new(true, DecisionReason::UserAccept, 1));
        assert!(store.load().is_none());
        assert!(store.load_classification().is_none());
        store.clear_all();
    }

    #[test]
    fn test_decision_expiry() {
        let (store, _, clock) = test_store();
        let store = store.with_decision_ttl(Duration::from_secs(2 * 86_400));
        store.save(&ConsentDecision::new(true, DecisionReason::UserAccept, clock.now_millis()));

        clock.advance(DAY_MS);
        assert!(store.load().is_some());

        clock.advance(DAY_MS);
        assert!(store.load().is_none());
    }

    #[test]
    fn test_unbounded_ttl_never_expires() {
        let (store, _, clock) = test_store();
        let store = store.with_decision_ttl(Duration::from_secs(u64::MAX));
        store.save(&ConsentDecision::new(true, DecisionReason::UserAccept, 0));

        clock.advance(100_000 * DAY_MS);
        assert!(store.load().is_some());
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let backend = Arc::new(MemoryBackend::new());
        let clock = Arc::new(ManualClock::new(0));
        let a = ConsentStore::new(backend.clone(), clock.clone()).with_namespace("a");
        let b = ConsentStore::new(backend.clone(), clock).with_namespace("b");

        a.save(&ConsentDecision::new(true, DecisionReason::UserAccept, 1));
        assert!(a.load().is_some());
        assert!(b.load().is_none());
        assert!(backend.get("a:consent-decision").unwrap().is_some());
    }

    #[test]
    fn test_inconsistent_classification_is_rejected() {
        let (store, backend, _) = test_store();
        backend
            .set(
                CLASSIFICATION_KEY,
                r#"{"isEU":false,"timestamp":1,"methods":{"timezone":true,"language":false,"dateFormat":false}}"#,
            )
            .unwrap();
        assert!(store.load_classification().is_none());

        backend
            .set(
                CLASSIFICATION_KEY,
                r#"{"isEU":false,"timestamp":-5,"methods":{"timezone":false,"language":false,"dateFormat":false}}"#,
            )
            .unwrap();
        assert!(store.load_classification().is_none());

        let ok = RegionClassification::from_signals(RegionSignals::uniform(false), 1);
        store.save_classification(&ok);
        assert_eq!(store.load_classification(), Some(ok));
    }

    #[test]
    fn test_legacy_record_is_migrated() {
        let (store, backend, clock) = test_store();
        backend.set(LEGACY_DECISION_KEY, "accepted").unwrap();

        let decision = store.load().unwrap();
        assert!(decision.granted);
        assert_eq!(decision.reason, DecisionReason::Restored);
        assert_eq!(decision.timestamp, clock.now_millis());
        assert!(backend.get(LEGACY_DECISION_KEY).unwrap().is_none());

        // Second read comes from the upgraded record.
        clock.advance(1);
        assert_eq!(store.load(), Some(decision));
    }

    #[test]
    fn test_peek_leaves_legacy_record_alone() {
        let (store, backend, _) = test_store();
        backend.set(LEGACY_DECISION_KEY, "declined").unwrap();

        assert!(store.peek().is_none());
        assert_eq!(backend.get(LEGACY_DECISION_KEY).unwrap().as_deref(), Some("declined"));
        assert!(backend.get(DECISION_KEY).unwrap().is_none());

        let decision = ConsentDecision::new(true, DecisionReason::UserAccept, 1);
        store.save(&decision);
        assert_eq!(store.peek(), Some(decision));
    }

    #[test]
    fn test_unknown_legacy_value_is_ignored() {
        let (store, backend, _) = test_store();
        backend.set(LEGACY_DECISION_KEY, "maybe").unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_clear_all() {
        let (store, backend, _) = test_store();
        store.save(&ConsentDecision::new(true, DecisionReason::UserAccept, 1));
        store.save_classification(&RegionClassification::from_signals(RegionSignals::default(), 1));
        backend.set(LEGACY_DECISION_KEY, "declined").unwrap();

        store.clear_all();
        assert!(backend.is_empty());
    }
}
