//! The admin-update bracket: `StartUpdate`/`EndUpdate`, and the
//! lifecycle listener list notified at each transition.
//!
//! Between the two calls, any resource whose filter, source, or
//! destination set is mutated enters a suspended state (tracked on
//! `ResourceTree` itself). Pushes that arrive while suspended collapse
//! into a single pending slot; `EndUpdate` drains each suspended
//! resource's slot exactly once, running the pending sample through
//! the normal push pipeline now that routing has settled.

use crate::backup::BufferBackupStore;
use crate::error::{HubError, Result};
use crate::tree::ResourceTree;

/// Owns the lifecycle listener list and enforces that `StartUpdate`/
/// `EndUpdate` calls are properly paired.
#[derive(Default)]
pub struct Dispatch {
    listeners: Vec<Box<dyn FnMut(bool)>>,
}

impl Dispatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked with `true` at `StartUpdate` and
    /// `false` at `EndUpdate`.
    pub fn on_update_lifecycle(&mut self, listener: impl FnMut(bool) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Open an admin-update window.
    ///
    /// # Errors
    ///
    /// `HubError::NotPermitted` if a window is already open.
    pub fn start_update(&mut self, tree: &mut ResourceTree) -> Result<()> {
        if tree.update_window_open() {
            return Err(HubError::not_permitted("an update window is already open"));
        }
        tree.set_update_window_open(true);
        for listener in &mut self.listeners {
            listener(true);
        }
        Ok(())
    }

    /// Close the admin-update window, draining every suspended
    /// resource's pending slot through the normal push pipeline.
    ///
    /// # Errors
    ///
    /// `HubError::NotPermitted` if no window is open. Propagates the
    /// first error a drained push returns.
    pub fn end_update(&mut self, tree: &mut ResourceTree, backup: &dyn BufferBackupStore) -> Result<()> {
        if !tree.update_window_open() {
            return Err(HubError::not_permitted("no update window is open"));
        }
        for id in tree.suspended_entries() {
            if let Some(sample) = tree.take_pending(id) {
                tree.push(id, sample, backup)?;
            }
        }
        tree.set_update_window_open(false);
        tree.clear_all_new_flags();
        for listener in &mut self.listeners {
            listener(false);
        }
        Ok(())
    }
}
