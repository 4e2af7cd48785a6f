//! Downstream features whose activation depends on consent.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::info;

/// A feature (analytics, performance monitoring) started or stopped by the
/// consent manager.
pub trait FeatureGate: Send + Sync {
    fn activate(&self);
    fn deactivate(&self);
    fn is_active(&self) -> bool;
}

/// A single named monitor with call counters.
#[derive(Debug)]
pub struct MonitorGate {
    name: String,
    active: AtomicBool,
    activations: AtomicUsize,
    deactivations: AtomicUsize,
}

impl MonitorGate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: AtomicBool::new(false),
            activations: AtomicUsize::new(0),
            deactivations: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of `activate` calls received.
    pub fn activation_count(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }

    /// Number of `deactivate` calls received.
    pub fn deactivation_count(&self) -> usize {
        self.deactivations.load(Ordering::SeqCst)
    }
}

impl FeatureGate for MonitorGate {
    fn activate(&self) {
        self.activations.fetch_add(1, Ordering::SeqCst);
        if !self.active.swap(true, Ordering::SeqCst) {
            info!("Monitor '{}' enabled", self.name);
        }
    }

    fn deactivate(&self) {
        self.deactivations.fetch_add(1, Ordering::SeqCst);
        if self.active.swap(false, Ordering::SeqCst) {
            info!("Monitor '{}' disabled", self.name);
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Fan-out over several gates; active only when every member is.
#[derive(Default)]
pub struct GateSet {
    gates: Vec<Arc<dyn FeatureGate>>,
}

impl GateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, gate: Arc<dyn FeatureGate>) -> Self {
        self.gates.push(gate);
        self
    }

    /// The site's standard pair: analytics and performance monitoring.
    pub fn site_monitors() -> (Self, Arc<MonitorGate>, Arc<MonitorGate>) {
        let analytics = Arc::new(MonitorGate::new("analytics"));
        let performance = Arc::new(MonitorGate::new("performance"));
        let set = Self::new()
            .with(analytics.clone())
            .with(performance.clone());
        (set, analytics, performance)
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }
}

impl FeatureGate for GateSet {
    fn activate(&self) {
        for gate in &self.gates {
            gate.activate();
        }
    }

    fn deactivate(&self) {
        for gate in &self.gates {
            gate.deactivate();
        }
    }

    fn is_active(&self) -> bool {
        !self.gates.is_empty() && self.gates.iter().all(|g| g.is_active())
    }
}
