//! Consent state machine for one page session.
//!
//! ```text
//! Uninitialized ──► RestoredGranted | RestoredDeclined   (stored decision)
//!               ──► AutoGranted                          (non-restricted region)
//!               ──► AwaitingPrompt ──accept──► RestoredGranted
//!                                  ──decline─► RestoredDeclined
//! ```
//!
//! Every state but `AwaitingPrompt` is terminal for the session. The manager
//! is a per-session context object; nothing here is process-global.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::bridge::ConsentUiBridge;
use crate::gate::FeatureGate;
use crate::region::RegionClassifier;
use folio_store::{ConsentDecision, ConsentStore, DecisionReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsentState {
    Uninitialized,
    AutoGranted,
    AwaitingPrompt,
    RestoredGranted,
    RestoredDeclined,
}

impl ConsentState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Uninitialized | Self::AwaitingPrompt)
    }

    /// Whether monitoring may run in this state.
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::AutoGranted | Self::RestoredGranted)
    }
}

impl std::fmt::Display for ConsentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "UNINITIALIZED"),
            Self::AutoGranted => write!(f, "AUTO_GRANTED"),
            Self::AwaitingPrompt => write!(f, "AWAITING_PROMPT"),
            Self::RestoredGranted => write!(f, "RESTORED_GRANTED"),
            Self::RestoredDeclined => write!(f, "RESTORED_DECLINED"),
        }
    }
}

/// Snapshot of a session's resolved consent.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentStatus {
    pub state: ConsentState,
    pub decision: Option<ConsentDecision>,
    pub prompt_pending: bool,
    pub monitoring: bool,
}

/// Labels banners in UI events. Unique within the process so a page that
/// re-subscribes can tell one session's banner from another's.
static NEXT_PROMPT_ID: AtomicU64 = AtomicU64::new(1);

/// Collaborators a [`ConsentManager`] is built from. Timestamps come from the
/// store's clock.
pub struct ConsentContext {
    pub store: ConsentStore,
    pub classifier: RegionClassifier,
    pub bridge: Arc<dyn ConsentUiBridge>,
    pub gate: Arc<dyn FeatureGate>,
}

/// Handle to one page session's consent state.
#[derive(Clone)]
pub struct ConsentManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    store: ConsentStore,
    classifier: RegionClassifier,
    bridge: Arc<dyn ConsentUiBridge>,
    gate: Arc<dyn FeatureGate>,
    session: Mutex<SessionState>,
}

struct SessionState {
    state: ConsentState,
    current: Option<ConsentDecision>,
    pending_prompt: Option<u64>,
}

/// Side effect decided under the session lock, applied after releasing it.
enum Effect {
    Activate,
    Deactivate,
    Prompt(BannerRequest),
}

impl ConsentManager {
    pub fn new(ctx: ConsentContext) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                store: ctx.store,
                classifier: ctx.classifier,
                bridge: ctx.bridge,
                gate: ctx.gate,
                session: Mutex::new(SessionState {
                    state: ConsentState::Uninitialized,
                    current: None,
                    pending_prompt: None,
                }),
            }),
        }
    }

    /// Resolve consent for this session. Later calls return the state already
    /// resolved and have no side effects.
    pub fn initialize(&self) -> ConsentState {
        let (state, effect) = {
            let mut session = self.inner.session.lock();
            if session.state != ConsentState::Uninitialized {
                debug!("Consent already initialized: {}", session.state);
                return session.state;
            }
            let effect = self.inner.resolve(&mut session);
            (session.state, effect)
        };

        info!("Consent initialized: {}", state);
        self.inner.apply(effect);
        state
    }

    /// Record acceptance of the pending prompt. Returns `false` (and does
    /// nothing) unless a prompt is pending.
    pub fn accept(&self, reason: &str) -> bool {
        self.inner.respond(true, reason)
    }

    /// Record refusal of the pending prompt. Same guard as [`Self::accept`].
    pub fn decline(&self, reason: &str) -> bool {
        self.inner.respond(false, reason)
    }

    /// Ask the UI for the expanded privacy information. Consent is unchanged.
    pub fn show_details(&self) {
        self.inner.bridge.notify_show_details();
    }

    pub fn state(&self) -> ConsentState {
        self.inner.session.lock().state
    }

    pub fn current_decision(&self) -> Option<ConsentDecision> {
        self.inner.session.lock().current.clone()
    }

    pub fn status(&self) -> ConsentStatus {
        let (state, decision, prompt_pending) = {
            let session = self.inner.session.lock();
            (
                session.state,
                session.current.clone(),
                session.pending_prompt.is_some(),
            )
        };
        ConsentStatus {
            state,
            decision,
            prompt_pending,
            monitoring: self.inner.gate.is_active(),
        }
    }
}

impl ManagerInner {
    fn resolve(self: &Arc<Self>, session: &mut SessionState) -> Effect {
        if let Some(existing) = self.store.load() {
            session.state = if existing.granted {
                ConsentState::RestoredGranted
            } else {
                ConsentState::RestoredDeclined
            };
            debug!("Reusing stored decision ({})", existing.reason);
            session.current = Some(existing);
            return if session.state.is_granted() {
                Effect::Activate
            } else {
                Effect::Deactivate
            };
        }

        let classification = self.classifier.classify();
        if !classification.is_restricted_region {
            let decision = ConsentDecision::new(
                true,
                DecisionReason::AutoNonRestrictedRegion,
                self.store.clock().now_millis(),
            );
            self.store.save(&decision);
            session.state = ConsentState::AutoGranted;
            session.current = Some(decision);
            return Effect::Activate;
        }

        let prompt_id = NEXT_PROMPT_ID.fetch_add(1, Ordering::Relaxed);
        session.pending_prompt = Some(prompt_id);
        session.state = ConsentState::AwaitingPrompt;
        Effect::Prompt(BannerRequest {
            prompt_id,
            manager: Arc::downgrade(self),
        })
    }

    fn apply(&self, effect: Effect) {
        match effect {
            Effect::Activate => self.gate.activate(),
            Effect::Deactivate => self.gate.deactivate(),
            Effect::Prompt(request) => self.bridge.notify_show_banner(request),
        }
    }

    /// A session issues at most one prompt, so any answer reaching a live
    /// manager in `AwaitingPrompt` is an answer to that prompt. Requests from
    /// other sessions never get here: their weak handle points elsewhere.
    fn respond(&self, granted: bool, reason: &str) -> bool {
        let (decision, prompt_id) = {
            let mut session = self.session.lock();
            if session.state != ConsentState::AwaitingPrompt {
                debug!(
                    "Ignoring consent response '{}' in state {}",
                    reason, session.state
                );
                return false;
            }

            let decision = ConsentDecision::new(
                granted,
                if granted {
                    DecisionReason::UserAccept
                } else {
                    DecisionReason::UserDecline
                },
                self.store.clock().now_millis(),
            );
            self.store.save(&decision);
            session.state = if granted {
                ConsentState::RestoredGranted
            } else {
                ConsentState::RestoredDeclined
            };
            session.current = Some(decision.clone());
            (decision, session.pending_prompt.take())
        };

        info!(
            "Consent {} by visitor ({})",
            if decision.granted { "granted" } else { "declined" },
            reason
        );
        self.apply(if decision.granted {
            Effect::Activate
        } else {
            Effect::Deactivate
        });
        if let Some(prompt_id) = prompt_id {
            self.bridge.notify_banner_closed(prompt_id);
        }
        true
    }
}

/// A pending prompt handed to the UI. Its methods are the only way a user's
/// answer reaches the manager; once the prompt is answered, or the session is
/// gone, they do nothing and return `false`.
#[derive(Clone)]
pub struct BannerRequest {
    prompt_id: u64,
    manager: Weak<ManagerInner>,
}

impl BannerRequest {
    pub fn prompt_id(&self) -> u64 {
        self.prompt_id
    }

    pub fn accept(&self, reason: &str) -> bool {
        match self.manager.upgrade() {
            Some(inner) => inner.respond(true, reason),
            None => false,
        }
    }

    pub fn decline(&self, reason: &str) -> bool {
        match self.manager.upgrade() {
            Some(inner) => inner.respond(false, reason),
            None => false,
        }
    }

    pub fn show_details(&self) -> bool {
        match self.manager.upgrade() {
            Some(inner) => {
                inner.bridge.notify_show_details();
                true
            }
            None => false,
        }
    }

    /// Whether the session that issued this prompt is still alive.
    pub fn is_live(&self) -> bool {
        self.manager.strong_count() > 0
    }
}

impl std::fmt::Debug for BannerRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BannerRequest")
            .field("prompt_id", &self.prompt_id)
            .field("live", &self.is_live())
            .finish()
    }
}
