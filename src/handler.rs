//! `HandlerList`: an ordered list of type-filtered push-handler
//! callbacks with stable references, usable for removal independent
//! of iteration order.

use crate::sample::{DataType, Sample};

/// A stable reference to a registered handler, returned by `add` and
/// accepted by `remove`. Valid only against the list that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Slot {
    id: HandlerId,
    declared_type: DataType,
    callback: Box<dyn FnMut(&Sample)>,
}

/// An ordered, type-filtered callback list.
///
/// `Trigger` is a wildcard with respect to value presence: a handler
/// declared `Trigger` fires on every push regardless of the pushed
/// sample's type.
#[derive(Default)]
pub struct HandlerList {
    next_id: u64,
    slots: Vec<Slot>,
}

impl HandlerList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. If `current` holds a value whose type
    /// matches `declared_type` (or `declared_type` is `Trigger`), the
    /// handler is invoked once immediately with that value.
    pub fn add(
        &mut self,
        declared_type: DataType,
        mut callback: impl FnMut(&Sample) + 'static,
        current: Option<&Sample>,
    ) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;

        if let Some(sample) = current {
            if declared_type == DataType::Trigger || sample.data_type() == declared_type {
                callback(sample);
            }
        }

        self.slots.push(Slot {
            id,
            declared_type,
            callback: Box::new(callback),
        });
        id
    }

    /// Remove a handler by its stable reference. Returns `true` if a
    /// handler with that id was present.
    pub fn remove(&mut self, id: HandlerId) -> bool {
        let before = self.slots.len();
        self.slots.retain(|slot| slot.id != id);
        self.slots.len() != before
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Dispatch `sample` to every handler whose declared type matches,
    /// in registration order. A handler removed mid-iteration by a
    /// prior callback (via a shared reference to this list) is simply
    /// skipped — callers invoke `call_all` with exclusive access, so
    /// removal can only happen through nested re-entrant pushes that
    /// themselves run to completion against a snapshot of indices.
    pub fn call_all(&mut self, sample: &Sample) {
        let ids: Vec<HandlerId> = self.slots.iter().map(|s| s.id).collect();
        for id in ids {
            let Some(slot) = self.slots.iter_mut().find(|s| s.id == id) else {
                continue;
            };
            if slot.declared_type == DataType::Trigger || slot.declared_type == sample.data_type()
            {
                (slot.callback)(sample);
            }
        }
    }
}
