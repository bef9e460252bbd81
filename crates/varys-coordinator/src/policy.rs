//! The rate-allocation policy seam.
//!
//! The coordinator owns the *mechanism* — the catalog, the periodic dispatch
//! loop, and the enforcement path — but not the *policy*: how available
//! capacity is split across competing flows is an injected pure function from
//! a catalog snapshot to a per-flow rate map. Only entries with a positive
//! rate are dispatched; an absent entry means "no limit for this flow".

use std::collections::HashMap;
use std::sync::Arc;

use varys_core::ids::DataIdentifier;
use varys_core::FlowDescription;

/// A rate-allocation policy: given every flow currently in the catalog,
/// produce the bits-per-second allocation for whichever flows it wants to
/// throttle. Flows it omits are left unthrottled.
pub trait RatePolicy: Send + Sync {
    /// Computes the next round's allocations.
    fn allocate(&self, flows: &[FlowDescription]) -> HashMap<DataIdentifier, u64>;
}

/// Type-erased handle to an injected policy.
pub type SharedPolicy = Arc<dyn RatePolicy>;

/// The default policy: no throttling. Every flow is left unlimited, so the
/// periodic dispatcher never finds a positive rate to report.
pub struct IdentityPolicy;

impl RatePolicy for IdentityPolicy {
    fn allocate(&self, _flows: &[FlowDescription]) -> HashMap<DataIdentifier, u64> {
        HashMap::new()
    }
}

/// Wraps a plain closure as a [`RatePolicy`], for tests and simple callers
/// that don't need a dedicated type.
pub struct FnPolicy<F>(pub F)
where
    F: Fn(&[FlowDescription]) -> HashMap<DataIdentifier, u64> + Send + Sync;

impl<F> RatePolicy for FnPolicy<F>
where
    F: Fn(&[FlowDescription]) -> HashMap<DataIdentifier, u64> + Send + Sync,
{
    fn allocate(&self, flows: &[FlowDescription]) -> HashMap<DataIdentifier, u64> {
        (self.0)(flows)
    }
}
