//! Setup gate consulted before serving traffic.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::lifecycle::MasterKeyLifecycle;
use crate::settings::SettingsFile;

/// Admission decision for an incoming request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GateDecision {
    /// Both setup steps are done.
    ReadyForTraffic,
    /// Step 1: create or recover the master key.
    NeedMasterKeySetup,
    /// Step 2: configure the store.
    NeedStoreSetup,
}

impl GateDecision {
    /// Setup route for this decision.
    #[must_use]
    pub const fn setup_path(self) -> &'static str {
        match self {
            Self::NeedMasterKeySetup => "/setup/step1",
            Self::NeedStoreSetup => "/setup/step2",
            Self::ReadyForTraffic => "/setup/completed",
        }
    }

    /// Whether normal traffic may pass.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::ReadyForTraffic)
    }
}

/// Master key setup comes first; store setup needs the master key to
/// encrypt its credentials.
#[must_use]
pub const fn evaluate(master_key_initialized: bool, store_configured: bool) -> GateDecision {
    match (master_key_initialized, store_configured) {
        (false, _) => GateDecision::NeedMasterKeySetup,
        (true, false) => GateDecision::NeedStoreSetup,
        (true, true) => GateDecision::ReadyForTraffic,
    }
}

/// [`evaluate`] over live state.
#[derive(Debug, Clone)]
pub struct InitializationGate {
    lifecycle: Arc<MasterKeyLifecycle>,
    settings: SettingsFile,
}

impl InitializationGate {
    /// Bind a lifecycle and a settings file.
    #[must_use]
    pub const fn new(lifecycle: Arc<MasterKeyLifecycle>, settings: SettingsFile) -> Self {
        Self {
            lifecycle,
            settings,
        }
    }

    /// Current decision. Cheap enough for every request.
    #[must_use]
    pub fn check(&self) -> GateDecision {
        evaluate(self.lifecycle.is_initialized(), self.settings.is_configured())
    }
}
