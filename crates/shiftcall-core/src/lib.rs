//! # Shiftcall Core
//!
//! Shared foundation for the shift-release voice agent orchestrator: the
//! data model (`CallSession`, `ShiftOccurrence`, `CascadePlan`,
//! `RecordingAsset`), the workspace-wide error taxonomy, and application
//! configuration.
//!
//! Every other crate in the workspace depends on this one and nothing in
//! this crate depends back on them.

pub mod config;
pub mod directive;
pub mod error;
pub mod model;

pub use config::AppConfig;
pub use error::{OrchestratorError, Result};

/// Convenience re-exports for downstream crates.
pub mod prelude {
    pub use crate::config::{
        AppConfig, CascadeConfig, CatalogConfig, GatewayConfig, GeneralConfig, RecordingConfig,
        StoreConfig, TelephonyConfig,
    };
    pub use crate::directive::{Directive, Gather};
    pub use crate::error::{OrchestratorError, Result};
    pub use crate::model::{
        CallDirection, CallSession, CascadePhase, CascadePlan, Phase, PendingTransfer, Provider,
        ProviderId, ProviderSummary, RecordingAsset, ShiftId, ShiftOccurrence, ShiftStatus,
        SessionId, Worker, WorkerId,
    };
}
