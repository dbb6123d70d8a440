//! Issuer reconciliation: default resolution, renewal decision, signing and
//! status reporting for one issuer per pass.

mod defaults;
mod driver;
mod renewal;
mod status;

pub use defaults::{
    apply_defaults, RenewalPolicy, ResolvedTiming, DEFAULT_CERT_DURATION, DEFAULT_RENEWAL_RATIO,
};
pub use driver::{IssuerReconciler, ReconcileAction};
pub use renewal::{certificate_needs_renewal, evaluate_renewal, RenewalReason};
pub use status::StatusReporter;
