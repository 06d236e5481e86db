//! `Resource`: the common payload shared by Input, Output, Observation,
//! and Placeholder entries — current value, default/override, the
//! routing source edge, the push-handler list, the admin-update
//! pending slot, and the tri-state flag set.
//!
//! Destinations are derivable (any resource whose source points here)
//! rather than stored; `ResourceTree` computes them by scanning.

use crate::handler::{HandlerId, HandlerList};
use crate::sample::{DataType, Sample};
use crate::tree::EntryId;

/// The tri-state flag set carried by every entry (namespace or
/// resource): `New` (materialized during the current admin-update
/// window and not yet observed), `Relevant` (participates in the
/// current snapshot scan), `Deleted` (tombstoned, retained only for
/// zombie retention).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub new: bool,
    pub relevant: bool,
    pub deleted: bool,
}

/// Common resource state, embedded in `IoPoint`, `Placeholder`, and
/// `Observation`.
#[derive(Default)]
pub struct ResourceState {
    current: Option<Sample>,
    default: Option<Sample>,
    override_value: Option<Sample>,
    source: Option<EntryId>,
    handlers: HandlerList,
    pending: Option<Sample>,
    suspended: bool,
    flags: Flags,
}

impl ResourceState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The value a reader sees: the current pushed value, or the
    /// default if no push has landed yet. Defaults never inject
    /// themselves as a push and never appear in a buffer.
    #[must_use]
    pub fn get_current_value(&self) -> Option<&Sample> {
        self.current.as_ref().or(self.default.as_ref())
    }

    /// The raw current value, ignoring the default fallback. Used
    /// internally to decide whether a first value has ever been
    /// delivered (mandatory-output tracking).
    #[must_use]
    pub fn raw_current(&self) -> Option<&Sample> {
        self.current.as_ref()
    }

    pub fn store_current(&mut self, sample: Sample) {
        self.current = Some(sample);
    }

    #[must_use]
    pub fn default_value(&self) -> Option<&Sample> {
        self.default.as_ref()
    }

    pub fn set_default(&mut self, sample: Option<Sample>) {
        self.default = sample;
    }

    #[must_use]
    pub fn override_value(&self) -> Option<&Sample> {
        self.override_value.as_ref()
    }

    pub fn set_override(&mut self, sample: Option<Sample>) {
        self.override_value = sample;
    }

    /// If an override is active, replace `incoming` with a fresh
    /// sample carrying the override's value and the incoming sample's
    /// timestamp.
    #[must_use]
    pub fn apply_override(&self, incoming: Sample) -> Sample {
        match &self.override_value {
            Some(ov) => ov.with_timestamp(incoming.timestamp()),
            None => incoming,
        }
    }

    #[must_use]
    pub fn source(&self) -> Option<EntryId> {
        self.source
    }

    pub fn set_source(&mut self, source: Option<EntryId>) {
        self.source = source;
    }

    pub fn add_handler(
        &mut self,
        declared_type: DataType,
        callback: impl FnMut(&Sample) + 'static,
    ) -> HandlerId {
        let current = self.get_current_value().cloned();
        self.handlers.add(declared_type, callback, current.as_ref())
    }

    pub fn remove_handler(&mut self, id: HandlerId) -> bool {
        self.handlers.remove(id)
    }

    pub fn call_handlers(&mut self, sample: &Sample) {
        self.handlers.call_all(sample);
    }

    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    /// Store `sample` in the single-slot pending buffer, overwriting
    /// any previous pending sample, per the update-window coalescing
    /// rule.
    pub fn set_pending(&mut self, sample: Sample) {
        self.pending = Some(sample);
    }

    /// Drain the pending slot and clear suspension, delivering at most
    /// one sample. Called once per resource at `EndUpdate`.
    pub fn take_pending(&mut self) -> Option<Sample> {
        self.suspended = false;
        self.pending.take()
    }

    #[must_use]
    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn flags_mut(&mut self) -> &mut Flags {
        &mut self.flags
    }

    /// Whether this resource currently carries admin settings that
    /// should survive a delete (source route, default, or override).
    /// Filter-bearing kinds (Observation) extend this with their own
    /// check — see `Observation::has_admin_settings`.
    #[must_use]
    pub fn has_local_admin_settings(&self) -> bool {
        self.default.is_some() || self.override_value.is_some() || self.source.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_feeds_on_first_read_without_being_pushed() {
        let mut r = ResourceState::new();
        r.set_default(Some(Sample::numeric(0.0, 42.0)));
        assert_eq!(r.get_current_value().and_then(Sample::as_numeric), Some(42.0));
        assert!(r.raw_current().is_none());
    }

    #[test]
    fn override_replaces_incoming_value_keeping_timestamp() {
        let mut r = ResourceState::new();
        r.set_override(Some(Sample::numeric(0.0, 99.0)));
        let incoming = Sample::numeric(5.0, 1.0);
        let applied = r.apply_override(incoming);
        assert_eq!(applied.timestamp(), 5.0);
        assert_eq!(applied.as_numeric(), Some(99.0));
    }

    #[test]
    fn pending_slot_coalesces_to_latest() {
        let mut r = ResourceState::new();
        r.suspend();
        r.set_pending(Sample::numeric(1.0, 1.0));
        r.set_pending(Sample::numeric(2.0, 2.0));
        r.set_pending(Sample::numeric(3.0, 3.0));
        let drained = r.take_pending().unwrap();
        assert_eq!(drained.timestamp(), 3.0);
        assert!(!r.is_suspended());
        assert!(r.take_pending().is_none());
    }
}
