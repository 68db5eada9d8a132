//! Static catalog of the providers the application can talk to.
//!
//! The catalog is shared by the settings UI and the sync daemon. The daemon
//! only looks at [`SyncMode`] capabilities; the UI also uses category and
//! platform for grouping.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{
    PROVIDER_EDUPLANR, PROVIDER_EXCHANGE_RATES, PROVIDER_GOOGLE_CALENDAR,
    PROVIDER_GOOGLE_CONTACTS, PROVIDER_MEDIA_LOOKUP,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderCategory {
    Calendar,
    Contacts,
    Education,
    Finance,
    Media,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    Web,
    Mobile,
    All,
}

/// Direction data is allowed to flow between the local store and a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// Remote records are imported once; existing local copies are never
    /// updated or deleted from the remote side and nothing is pushed.
    AddOnly,
    Pull,
    Push,
    TwoWay,
}

impl SyncMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncMode::AddOnly => "add-only",
            SyncMode::Pull => "pull",
            SyncMode::Push => "push",
            SyncMode::TwoWay => "two-way",
        }
    }

    pub fn allows_pull(self) -> bool {
        !matches!(self, SyncMode::Push)
    }

    pub fn allows_push(self) -> bool {
        matches!(self, SyncMode::Push | SyncMode::TwoWay)
    }

    pub fn allows_pulled_updates(self) -> bool {
        matches!(self, SyncMode::Pull | SyncMode::TwoWay)
    }

    pub fn allows_pulled_deletes(self) -> bool {
        matches!(self, SyncMode::Pull | SyncMode::TwoWay)
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown sync mode: {0}")]
pub struct UnknownSyncMode(pub String);

impl FromStr for SyncMode {
    type Err = UnknownSyncMode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "add-only" => Ok(SyncMode::AddOnly),
            "pull" => Ok(SyncMode::Pull),
            "push" => Ok(SyncMode::Push),
            "two-way" => Ok(SyncMode::TwoWay),
            other => Err(UnknownSyncMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub key: &'static str,
    pub display_name: &'static str,
    pub category: ProviderCategory,
    pub default_sync_mode: SyncMode,
    pub platform: Platform,
}

static CATALOG: [ProviderDescriptor; 5] = [
    ProviderDescriptor {
        key: PROVIDER_EDUPLANR,
        display_name: "EduPlanr",
        category: ProviderCategory::Education,
        default_sync_mode: SyncMode::TwoWay,
        platform: Platform::All,
    },
    ProviderDescriptor {
        key: PROVIDER_GOOGLE_CALENDAR,
        display_name: "Google Calendar",
        category: ProviderCategory::Calendar,
        default_sync_mode: SyncMode::TwoWay,
        platform: Platform::Web,
    },
    ProviderDescriptor {
        key: PROVIDER_GOOGLE_CONTACTS,
        display_name: "Google Contacts",
        category: ProviderCategory::Contacts,
        default_sync_mode: SyncMode::AddOnly,
        platform: Platform::Web,
    },
    ProviderDescriptor {
        key: PROVIDER_EXCHANGE_RATES,
        display_name: "Exchange rates",
        category: ProviderCategory::Finance,
        default_sync_mode: SyncMode::Pull,
        platform: Platform::All,
    },
    ProviderDescriptor {
        key: PROVIDER_MEDIA_LOOKUP,
        display_name: "Media lookup",
        category: ProviderCategory::Media,
        default_sync_mode: SyncMode::Pull,
        platform: Platform::All,
    },
];

pub fn describe(key: &str) -> Option<&'static ProviderDescriptor> {
    CATALOG.iter().find(|descriptor| descriptor.key == key)
}

pub fn all() -> &'static [ProviderDescriptor] {
    &CATALOG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_known_providers() {
        let eduplanr = describe("eduplanr").unwrap();
        assert_eq!(eduplanr.category, ProviderCategory::Education);
        assert_eq!(eduplanr.default_sync_mode, SyncMode::TwoWay);

        let contacts = describe("google-contacts").unwrap();
        assert_eq!(contacts.default_sync_mode, SyncMode::AddOnly);
        assert!(describe("myspace").is_none());
    }

    #[test]
    fn catalog_keys_are_unique() {
        let mut keys: Vec<_> = all().iter().map(|d| d.key).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), all().len());
    }

    #[test]
    fn add_only_and_pull_modes_never_push() {
        assert!(!SyncMode::AddOnly.allows_push());
        assert!(!SyncMode::Pull.allows_push());
        assert!(SyncMode::Push.allows_push());
        assert!(SyncMode::TwoWay.allows_push());
        assert!(!SyncMode::Push.allows_pull());
    }

    #[test]
    fn add_only_refuses_pulled_updates_and_deletes() {
        assert!(SyncMode::AddOnly.allows_pull());
        assert!(!SyncMode::AddOnly.allows_pulled_updates());
        assert!(!SyncMode::AddOnly.allows_pulled_deletes());
        assert!(SyncMode::TwoWay.allows_pulled_deletes());
    }

    #[test]
    fn sync_mode_round_trips_through_strings() {
        for mode in [
            SyncMode::AddOnly,
            SyncMode::Pull,
            SyncMode::Push,
            SyncMode::TwoWay,
        ] {
            assert_eq!(mode.as_str().parse::<SyncMode>(), Ok(mode));
        }
        assert_eq!(
            "sideways".parse::<SyncMode>(),
            Err(UnknownSyncMode("sideways".into()))
        );
        assert_eq!(
            serde_json::to_string(&SyncMode::TwoWay).unwrap(),
            "\"two-way\""
        );
    }
}
