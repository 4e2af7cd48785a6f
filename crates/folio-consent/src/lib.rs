//! Consent coordination — when to prompt, how answers persist, and which
//! monitors run as a result.
//!
//! A [`ConsentManager`] is built per page session from a [`ConsentStore`],
//! a [`RegionClassifier`], a [`ConsentUiBridge`], and a [`FeatureGate`].

pub mod bridge;
pub mod devtools;
pub mod gate;
pub mod manager;
pub mod region;

pub use bridge::{ChannelBridge, ConsentUiBridge, UiEvent};
pub use devtools::{DevStatus, DevTools};
pub use gate::{FeatureGate, GateSet, MonitorGate};
pub use manager::{BannerRequest, ConsentContext, ConsentManager, ConsentState, ConsentStatus};
pub use region::{ClientEnvironment, EnvironmentProbe, RegionClassifier, SystemEnvironment};

pub use folio_store::ConsentStore;
