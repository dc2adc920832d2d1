// SPDX-License-Identifier: MIT OR Apache-2.0
//! Governance collaborators: the kill-switch and the key-block policy.
//!
//! The core treats both as opaque capabilities. The implementations here are
//! the file-backed ones the runtime ships with; anything heavier (admin
//! tokens, amendment approval flows) lives outside the core and only has to
//! satisfy these traits.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use mace_structures::Amendment;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Emergency halt consulted before every request.
pub trait KillSwitch {
    /// Whether execution is currently halted.
    fn is_active(&self) -> bool;

    /// Reason and actor behind the current state.
    fn status(&self) -> KillSwitchStatus;
}

/// Current kill-switch state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KillSwitchStatus {
    /// Whether the switch is engaged.
    pub active: bool,
    /// Why it was engaged.
    pub reason: Option<String>,
    /// Who engaged it.
    pub activated_by: Option<String>,
    /// When it was engaged (RFC-3339 UTC).
    pub activated_at: Option<String>,
}

/// Key-level write policy consulted by `put_sem`.
pub trait PolicyGate {
    /// Whether writes to `key` are blocked.
    fn block_key(&self, key: &str) -> bool;
}

/// A kill switch that is never active. Used by replay and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct InertKillSwitch;

impl KillSwitch for InertKillSwitch {
    fn is_active(&self) -> bool {
        false
    }

    fn status(&self) -> KillSwitchStatus {
        KillSwitchStatus::default()
    }
}

/// A policy gate that blocks nothing. Used by replay and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllPolicy;

impl PolicyGate for AllowAllPolicy {
    fn block_key(&self, _key: &str) -> bool {
        false
    }
}

/// Kill switch backed by a JSON flag file.
///
/// Presence of the file with `active: true` halts execution; removing the
/// file restores it. Corrupt state reads as inactive so that a damaged flag
/// file cannot wedge the runtime shut.
#[derive(Debug, Clone)]
pub struct FileKillSwitch {
    path: PathBuf,
}

impl FileKillSwitch {
    /// Watch `path` for the halt flag.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Engage the switch.
    ///
    /// # Errors
    ///
    /// Propagates filesystem errors writing the flag file.
    pub fn activate(&self, reason: &str, activated_by: &str) -> std::io::Result<()> {
        let state = KillSwitchStatus {
            active: true,
            reason: Some(reason.to_string()),
            activated_by: Some(activated_by.to_string()),
            activated_at: Some(
                chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            ),
        };
        let body = serde_json::to_string(&state).map_err(std::io::Error::other)?;
        std::fs::write(&self.path, body)?;
        tracing::warn!(reason, activated_by, "kill switch activated");
        Ok(())
    }

    /// Disengage the switch.
    ///
    /// # Errors
    ///
    /// Propagates filesystem errors removing the flag file.
    pub fn deactivate(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!("kill switch deactivated");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn read_state(&self) -> KillSwitchStatus {
        let Ok(body) = std::fs::read_to_string(&self.path) else {
            return KillSwitchStatus::default();
        };
        serde_json::from_str(&body).unwrap_or_default()
    }
}

impl KillSwitch for FileKillSwitch {
    fn is_active(&self) -> bool {
        self.read_state().active
    }

    fn status(&self) -> KillSwitchStatus {
        self.read_state()
    }
}

/// Policy gate driven by newline-delimited amendment records.
///
/// A key is blocked while an active `block_key` amendment names it as an
/// exact target. A missing or partially corrupt amendments file fails open:
/// unreadable lines are skipped.
#[derive(Debug, Clone)]
pub struct AmendmentPolicy {
    path: PathBuf,
}

impl AmendmentPolicy {
    /// Read amendments from `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append an amendment record.
    ///
    /// # Errors
    ///
    /// Propagates filesystem errors from the append.
    pub fn append(&self, amendment: &Amendment) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(amendment).map_err(std::io::Error::other)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// All amendments currently on disk, unreadable lines skipped.
    #[must_use]
    pub fn load(&self) -> Vec<Amendment> {
        let Ok(body) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        body.lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// The amendments file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PolicyGate for AmendmentPolicy {
    fn block_key(&self, key: &str) -> bool {
        self.load()
            .iter()
            .any(|a| a.active && a.policy_type == "block_key" && a.target == key)
    }
}
