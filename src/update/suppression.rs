//! Per-version "don't ask again" markers kept in the settings store.
//!
//! A dismissal is permanent for its version and always wins over a postponement.
//! A postponement hides the version until its deadline; once the deadline has
//! passed the marker is dropped the next time it is looked at.

use anyhow::Result;

use crate::state::SettingsStore;

const DISMISSED_PREFIX: &str = "update.dismissed.";
const POSTPONED_PREFIX: &str = "update.postponed.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    Dismissed,
    /// Hidden until this epoch-millisecond instant.
    Postponed { until: i64 },
}

fn dismissed_key(version: &str) -> String {
    format!("{DISMISSED_PREFIX}{version}")
}

fn postponed_key(version: &str) -> String {
    format!("{POSTPONED_PREFIX}{version}")
}

impl SettingsStore {
    pub fn dismiss_update(&self, version: &str) -> Result<()> {
        self.set(&dismissed_key(version), true)?;
        self.remove(&postponed_key(version))?;
        Ok(())
    }

    pub fn postpone_update(&self, version: &str, until_ms: i64) -> Result<()> {
        self.set(&postponed_key(version), until_ms)
    }

    /// Current suppression for `version`, expiring stale postponements as a side effect.
    pub fn update_suppression(&self, version: &str, now_ms: i64) -> Result<Option<Suppression>> {
        if self.get_bool(&dismissed_key(version)).unwrap_or(false) {
            return Ok(Some(Suppression::Dismissed));
        }

        let key = postponed_key(version);
        match self.get_i64(&key) {
            Some(until) if until > now_ms => Ok(Some(Suppression::Postponed { until })),
            Some(_) => {
                log::debug!("Postponement of {version} expired");
                self.remove(&key)?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Versions the user never wants offered again, sorted.
    pub fn dismissed_versions(&self) -> Vec<String> {
        let mut versions: Vec<String> = self
            .keys_with_prefix(DISMISSED_PREFIX)
            .into_iter()
            .filter(|key| self.get_bool(key).unwrap_or(false))
            .filter_map(|key| key.strip_prefix(DISMISSED_PREFIX).map(String::from))
            .collect();
        versions.sort();
        versions
    }

    /// Drop every marker for `version`.
    pub fn clear_update_suppression(&self, version: &str) -> Result<()> {
        self.remove(&dismissed_key(version))?;
        self.remove(&postponed_key(version))?;
        Ok(())
    }
}
