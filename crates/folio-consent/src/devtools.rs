//! Seeding and inspection helpers for test scenarios. These only touch stored
//! records; the decision logic itself is unchanged.

use serde::Serialize;
use tracing::info;

use crate::manager::{ConsentManager, ConsentStatus};
use folio_store::{ConsentDecision, ConsentStore, RegionClassification, RegionSignals};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DevStatus {
    pub decision: Option<ConsentDecision>,
    pub classification: Option<RegionClassification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<ConsentStatus>,
}

pub struct DevTools {
    store: ConsentStore,
}

impl DevTools {
    pub fn new(store: ConsentStore) -> Self {
        Self { store }
    }

    /// Overwrite the cached classification with a fresh, forced verdict.
    pub fn force_region(&self, restricted: bool) -> RegionClassification {
        let classification = RegionClassification::from_signals(
            RegionSignals::uniform(restricted),
            self.store.clock().now_millis(),
        );
        self.store.save_classification(&classification);
        info!("Dev: forced region classification restricted={}", restricted);
        classification
    }

    /// Remove every persisted consent record.
    pub fn clear_all(&self) {
        self.store.clear_all();
        info!("Dev: cleared consent records");
    }

    /// Read-only snapshot; never migrates or rewrites stored records.
    pub fn status(&self, session: Option<&ConsentManager>) -> DevStatus {
        DevStatus {
            decision: self.store.peek(),
            classification: self.store.load_classification(),
            session: session.map(|m| m.status()),
        }
    }
}
