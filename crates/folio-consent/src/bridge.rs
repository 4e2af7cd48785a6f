//! UI-facing side of the consent flow.
//!
//! The manager talks to the page through [`ConsentUiBridge`]; the page's
//! answers come back only through the [`BannerRequest`] captured when the
//! banner was requested.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::manager::BannerRequest;

/// Notifications from the consent core to the UI layer.
pub trait ConsentUiBridge: Send + Sync {
    /// Present the consent banner for `request`.
    fn notify_show_banner(&self, request: BannerRequest);
    /// Present the expanded privacy information (show-if-not-shown).
    fn notify_show_details(&self);
    /// Dismiss the privacy information, if open.
    fn notify_close_details(&self);
    /// Prompt `prompt_id` was answered; take down its banner.
    fn notify_banner_closed(&self, prompt_id: u64);
}

/// Event delivered to UI subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiEvent {
    #[serde(rename_all = "camelCase")]
    ShowBanner { prompt_id: u64 },
    ShowDetails,
    CloseDetails,
    BannerClosed,
}

/// Bridge that broadcasts [`UiEvent`]s and holds the pending banner until the
/// user answers.
///
/// A second banner request while one is pending replaces the held request
/// (last request wins) without emitting another `ShowBanner`, so the page
/// never shows two banners.
pub struct ChannelBridge {
    events: broadcast::Sender<UiEvent>,
    pending: Mutex<Option<BannerRequest>>,
    details_open: AtomicBool,
}

impl ChannelBridge {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            events,
            pending: Mutex::new(None),
            details_open: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.events.subscribe()
    }

    /// The banner request currently awaiting an answer.
    pub fn pending_banner(&self) -> Option<BannerRequest> {
        self.pending.lock().clone()
    }

    pub fn details_open(&self) -> bool {
        self.details_open.load(Ordering::SeqCst)
    }

    /// The visitor clicked accept. Returns whether a decision was recorded.
    pub fn user_accepted(&self, reason: &str) -> bool {
        self.answer(|request| request.accept(reason))
    }

    /// The visitor clicked decline. Returns whether a decision was recorded.
    pub fn user_declined(&self, reason: &str) -> bool {
        self.answer(|request| request.decline(reason))
    }

    /// The visitor asked for more information.
    pub fn user_requested_details(&self) {
        let pending = self.pending_banner();
        let forwarded = pending.map(|r| r.show_details()).unwrap_or(false);
        if !forwarded {
            self.notify_show_details();
        }
    }

    /// The visitor dismissed the information panel.
    pub fn user_closed_details(&self) {
        self.notify_close_details();
    }

    /// A recorded answer closes the banner through
    /// [`ConsentUiBridge::notify_banner_closed`]. A request whose session is
    /// gone is closed here instead.
    fn answer(&self, respond: impl FnOnce(&BannerRequest) -> bool) -> bool {
        let Some(request) = self.pending_banner() else {
            debug!("Consent answer with no banner pending, ignoring");
            return false;
        };
        let recorded = respond(&request);
        if !recorded {
            self.notify_banner_closed(request.prompt_id());
        }
        recorded
    }

    fn emit(&self, event: UiEvent) {
        // No subscribers is fine: the page may not be listening yet.
        let _ = self.events.send(event);
    }
}

impl Default for ChannelBridge {
    fn default() -> Self {
        Self::new(32)
    }
}

impl ConsentUiBridge for ChannelBridge {
    fn notify_show_banner(&self, request: BannerRequest) {
        let prompt_id = request.prompt_id();
        let replaced = self.pending.lock().replace(request);
        match replaced {
            Some(old) => debug!(
                "Banner request {} replaced by {}",
                old.prompt_id(),
                prompt_id
            ),
            None => self.emit(UiEvent::ShowBanner { prompt_id }),
        }
    }

    fn notify_show_details(&self) {
        if !self.details_open.swap(true, Ordering::SeqCst) {
            self.emit(UiEvent::ShowDetails);
        }
    }

    fn notify_close_details(&self) {
        if self.details_open.swap(false, Ordering::SeqCst) {
            self.emit(UiEvent::CloseDetails);
        }
    }

    fn notify_banner_closed(&self, prompt_id: u64) {
        let closed = {
            let mut pending = self.pending.lock();
            if pending.as_ref().is_some_and(|r| r.prompt_id() == prompt_id) {
                pending.take()
            } else {
                None
            }
        };
        if closed.is_some() {
            self.emit(UiEvent::BannerClosed);
            self.notify_close_details();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut broadcast::Receiver<UiEvent>) -> Vec<UiEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_details_are_show_if_not_shown() {
        let bridge = ChannelBridge::default();
        let mut rx = bridge.subscribe();

        bridge.user_requested_details();
        bridge.user_requested_details();
        assert!(bridge.details_open());
        bridge.user_closed_details();
        bridge.user_closed_details();

        assert_eq!(drain(&mut rx), vec![UiEvent::ShowDetails, UiEvent::CloseDetails]);
    }

    #[test]
    fn test_answer_without_banner_is_ignored() {
        let bridge = ChannelBridge::default();
        let mut rx = bridge.subscribe();
        assert!(!bridge.user_accepted("click"));
        assert!(!bridge.user_declined("click"));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_closing_unknown_prompt_is_ignored() {
        let bridge = ChannelBridge::default();
        let mut rx = bridge.subscribe();
        bridge.notify_banner_closed(42);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_event_wire_shape() {
        let json = serde_json::to_value(UiEvent::ShowBanner { prompt_id: 3 }).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "show-banner", "promptId": 3 }));
        let json = serde_json::to_value(UiEvent::CloseDetails).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "close-details" }));
    }
}
