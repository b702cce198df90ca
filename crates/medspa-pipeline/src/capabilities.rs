// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Optional worker collaborators, assembled once at startup.
//!
//! Each optional feature is present or absent as a whole; the worker asks
//! for it by name instead of checking individual handles.

use std::sync::Arc;

use tracing::info;

use medspa_core::{BookingAdapter, ClinicConfigStore, Notifier, SandboxPurger, TranscriptRecorder};

use crate::deposit::DepositDispatcher;
use crate::supervisor::SupervisorGate;

#[derive(Clone, Default)]
pub struct Capabilities {
    pub supervisor: Option<Arc<SupervisorGate>>,
    pub notifier: Option<Arc<dyn Notifier>>,
    pub deposits: Option<Arc<DepositDispatcher>>,
    pub booking: Option<Arc<dyn BookingAdapter>>,
    /// Present only in sandbox deployments.
    pub purger: Option<Arc<dyn SandboxPurger>>,
    pub transcript: Option<Arc<dyn TranscriptRecorder>>,
    pub clinics: Option<Arc<dyn ClinicConfigStore>>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_supervisor(mut self, gate: SupervisorGate) -> Self {
        self.supervisor = Some(Arc::new(gate));
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_deposits(mut self, dispatcher: DepositDispatcher) -> Self {
        self.deposits = Some(Arc::new(dispatcher));
        self
    }

    pub fn with_booking(mut self, booking: Arc<dyn BookingAdapter>) -> Self {
        self.booking = Some(booking);
        self
    }

    pub fn with_purger(mut self, purger: Arc<dyn SandboxPurger>) -> Self {
        self.purger = Some(purger);
        self
    }

    pub fn with_transcript(mut self, transcript: Arc<dyn TranscriptRecorder>) -> Self {
        self.transcript = Some(transcript);
        self
    }

    pub fn with_clinics(mut self, clinics: Arc<dyn ClinicConfigStore>) -> Self {
        self.clinics = Some(clinics);
        self
    }

    /// Names of the capabilities that are not configured.
    pub fn absent(&self) -> Vec<&'static str> {
        [
            ("supervisor", self.supervisor.is_none()),
            ("notifier", self.notifier.is_none()),
            ("deposits", self.deposits.is_none()),
            ("booking", self.booking.is_none()),
            ("sandbox_purge", self.purger.is_none()),
            ("transcript", self.transcript.is_none()),
            ("clinic_config", self.clinics.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, missing)| missing.then_some(name))
        .collect()
    }

    /// Logs the absent capabilities once, at pool start.
    pub fn log_absent(&self) {
        let absent = self.absent();
        if !absent.is_empty() {
            info!(skipped = ?absent, "worker side effects without a configured collaborator are skipped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_capabilities_report_everything_absent() {
        let caps = Capabilities::new();
        assert_eq!(caps.absent().len(), 7);
        assert!(caps.absent().contains(&"supervisor"));
    }
}
