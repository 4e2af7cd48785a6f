//! Restricted-region classification from local environment heuristics.
//!
//! Three independent votes (timezone, language, date format) are OR'd
//! together: missing a visitor who needs an opt-in prompt is worse than
//! prompting one who does not. Results are cached in the [`ConsentStore`]
//! for a freshness window.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use folio_core::{Error, Result};
use folio_store::{ConsentStore, RegionClassification, RegionSignals};

/// ISO 3166-1 alpha-2 codes of jurisdictions requiring opt-in consent:
/// EU member states, the rest of the EEA, the UK, and Switzerland.
pub const RESTRICTED_COUNTRIES: &[&str] = &[
    "AT", "BE", "BG", "HR", "CY", "CZ", "DK", "EE", "FI", "FR", "DE", "GR", "HU", "IE", "IT",
    "LV", "LT", "LU", "MT", "NL", "PL", "PT", "RO", "SK", "SI", "ES", "SE", "IS", "LI", "NO",
    "GB", "CH",
];

/// Primary language subtags official in a restricted country. English is
/// left out: on its own it says nothing about location.
pub const RESTRICTED_LANGUAGES: &[&str] = &[
    "bg", "ca", "cs", "da", "de", "el", "es", "et", "eu", "fi", "fr", "ga", "gl", "hr", "hu",
    "is", "it", "lb", "lt", "lv", "mt", "nb", "nl", "nn", "no", "pl", "pt", "rm", "ro", "sk",
    "sl", "sv",
];

/// IANA zones in restricted countries outside the `Europe/` area.
const RESTRICTED_NON_EUROPE_ZONES: &[&str] = &[
    "Africa/Ceuta",
    "Asia/Famagusta",
    "Asia/Nicosia",
    "Atlantic/Azores",
    "Atlantic/Canary",
    "Atlantic/Faroe",
    "Atlantic/Madeira",
    "Atlantic/Reykjavik",
    "Arctic/Longyearbyen",
];

/// `Europe/` zones outside any restricted country.
const NON_RESTRICTED_EUROPE_ZONES: &[&str] = &[
    "Europe/Astrakhan",
    "Europe/Belgrade",
    "Europe/Chisinau",
    "Europe/Istanbul",
    "Europe/Kaliningrad",
    "Europe/Kiev",
    "Europe/Kirov",
    "Europe/Kyiv",
    "Europe/Minsk",
    "Europe/Moscow",
    "Europe/Podgorica",
    "Europe/Samara",
    "Europe/Sarajevo",
    "Europe/Saratov",
    "Europe/Simferopol",
    "Europe/Skopje",
    "Europe/Tirane",
    "Europe/Ulyanovsk",
    "Europe/Volgograd",
];

/// Local environment facts the classifier votes on.
pub trait EnvironmentProbe: Send + Sync {
    /// IANA timezone name, e.g. `Europe/Berlin`.
    fn timezone(&self) -> Result<String>;
    /// BCP-47 language tags in preference order.
    fn languages(&self) -> Result<Vec<String>>;
    /// How the environment renders the date 2024-12-31, e.g. `31.12.2024`.
    fn date_format(&self) -> Result<String>;
}

/// Environment reported by the visitor's page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientEnvironment {
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub date_format: Option<String>,
}

impl EnvironmentProbe for ClientEnvironment {
    fn timezone(&self) -> Result<String> {
        self.timezone
            .clone()
            .filter(|tz| !tz.trim().is_empty())
            .ok_or(Error::SignalUnavailable("timezone"))
    }

    fn languages(&self) -> Result<Vec<String>> {
        if self.languages.is_empty() {
            return Err(Error::SignalUnavailable("language"));
        }
        Ok(self.languages.clone())
    }

    fn date_format(&self) -> Result<String> {
        self.date_format
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or(Error::SignalUnavailable("dateFormat"))
    }
}

/// Environment of the host process, read from POSIX locale variables.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEnvironment;

impl EnvironmentProbe for SystemEnvironment {
    fn timezone(&self) -> Result<String> {
        if let Ok(tz) = std::env::var("TZ") {
            let tz = tz.trim_start_matches(':').trim();
            if !tz.is_empty() {
                return Ok(tz.to_string());
            }
        }
        #[cfg(target_os = "linux")]
        {
            if let Ok(tz) = std::fs::read_to_string("/etc/timezone") {
                let tz = tz.trim();
                if !tz.is_empty() {
                    return Ok(tz.to_string());
                }
            }
        }
        Err(Error::SignalUnavailable("timezone"))
    }

    fn languages(&self) -> Result<Vec<String>> {
        let mut tags = Vec::new();
        if let Ok(list) = std::env::var("LANGUAGE") {
            tags.extend(list.split(':').map(str::to_string));
        }
        for var in ["LC_ALL", "LC_MESSAGES", "LANG"] {
            if let Ok(value) = std::env::var(var) {
                tags.push(value);
            }
        }
        let tags: Vec<String> = tags
            .iter()
            .filter_map(|raw| posix_locale_to_tag(raw))
            .collect();
        if tags.is_empty() {
            return Err(Error::SignalUnavailable("language"));
        }
        Ok(tags)
    }

    fn date_format(&self) -> Result<String> {
        Err(Error::SignalUnavailable("dateFormat"))
    }
}

/// `de_DE.UTF-8@euro` → `de-DE`; `C` and `POSIX` carry no language.
fn posix_locale_to_tag(raw: &str) -> Option<String> {
    let base = raw.split(['.', '@']).next()?.trim();
    if base.is_empty() || base == "C" || base == "POSIX" {
        return None;
    }
    Some(base.replace('_', "-"))
}

// ---------------------------------------------------------------
// Signals
// ---------------------------------------------------------------

pub fn timezone_is_restricted(tz: &str) -> bool {
    let tz = tz.trim();
    if RESTRICTED_NON_EUROPE_ZONES.contains(&tz) {
        return true;
    }
    tz.starts_with("Europe/") && !NON_RESTRICTED_EUROPE_ZONES.contains(&tz)
}

/// A tag with a region subtag votes by country; a bare language votes by
/// language.
pub fn language_is_restricted(tag: &str) -> bool {
    let mut parts = tag.trim().split(['-', '_']);
    let Some(primary) = parts.next().map(str::to_ascii_lowercase) else {
        return false;
    };
    let region = parts
        .find(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_alphabetic()))
        .map(str::to_ascii_uppercase);

    match region {
        Some(region) => RESTRICTED_COUNTRIES.contains(&region.as_str()),
        None => RESTRICTED_LANGUAGES.contains(&primary.as_str()),
    }
}

/// Prefixes of the word for December in the restricted countries' languages.
const DECEMBER_PREFIXES: &[&str] = &[
    "dec", "déc", "dez", "dic", "diċ", "des", "dets", "gru", "pro", "jou", "noll", "δεκ", "дек",
];

/// Day-before-month rendering of 2024-12-31 (`31/12/2024`, `31.12.2024`,
/// `31 Dec 2024`). Samples where the day or the month cannot be found vote
/// `false`.
pub fn date_format_is_restricted(sample: &str) -> bool {
    let tokens: Vec<String> = sample
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect();

    let day = tokens.iter().position(|t| t == "31");
    let month = tokens.iter().position(|t| {
        t == "12"
            || (t.chars().all(char::is_alphabetic)
                && DECEMBER_PREFIXES.iter().any(|p| t.starts_with(p)))
    });
    matches!((day, month), (Some(day), Some(month)) if day < month)
}

// ---------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------

/// Produces cached [`RegionClassification`]s for one visitor.
pub struct RegionClassifier {
    store: ConsentStore,
    probe: Arc<dyn EnvironmentProbe>,
    freshness_window: Duration,
}

impl RegionClassifier {
    /// Default freshness window for cached classifications.
    pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(24 * 3600);

    pub fn new(store: ConsentStore, probe: Arc<dyn EnvironmentProbe>) -> Self {
        Self {
            store,
            probe,
            freshness_window: Self::DEFAULT_FRESHNESS,
        }
    }

    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    /// Return the cached classification if fresh, otherwise recompute,
    /// persist, and return a new one.
    pub fn classify(&self) -> RegionClassification {
        let now = self.store.clock().now_millis();

        if let Some(cached) = self.store.load_classification() {
            let age = now.saturating_sub(cached.timestamp);
            let window = i64::try_from(self.freshness_window.as_millis()).unwrap_or(i64::MAX);
            if (0..window).contains(&age) {
                debug!("Region cache hit (age {}ms)", age);
                return cached;
            }
            debug!("Region cache stale (age {}ms), recomputing", age);
        }

        let classification = RegionClassification::from_signals(self.evaluate_signals(), now);
        self.store.save_classification(&classification);
        info!(
            "Region classified: restricted={} signals={:?}",
            classification.is_restricted_region, classification.signals
        );
        classification
    }

    /// Evaluate each heuristic on its own; a failing probe votes `false`.
    pub fn evaluate_signals(&self) -> RegionSignals {
        RegionSignals {
            timezone_matched: vote("timezone", self.probe.timezone(), |tz| {
                timezone_is_restricted(tz)
            }),
            language_matched: vote("language", self.probe.languages(), |tags| {
                tags.iter().any(|t| language_is_restricted(t))
            }),
            date_format_matched: vote("dateFormat", self.probe.date_format(), |sample| {
                date_format_is_restricted(sample)
            }),
        }
    }
}

fn vote<T>(name: &str, probed: Result<T>, matches: impl FnOnce(&T) -> bool) -> bool {
    match probed {
        Ok(value) => {
            let matched = matches(&value);
            debug!("Signal {}: matched={}", name, matched);
            matched
        }
        Err(e) => {
            debug!("Signal {} unavailable, voting false: {}", name, e);
            false
        }
    }
}
