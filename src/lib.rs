//! `data_hub`: an in-process, hierarchical, typed pub/sub data-routing
//! fabric. A tree of inputs, outputs, observations, and namespaces
//! carries typed samples from producers to consumers with coercion,
//! filtering, and optional transform/aggregation along the way.
//!
//! [`DataHub`] is the single entry point: it owns the entry arena, the
//! admin-update lifecycle, the hub-wide configuration, and the
//! pluggable buffer-backup store, and exposes the operation surface
//! described in the module docs below as ordinary methods.

pub mod backup;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod io;
pub mod logging;
pub mod observation;
pub mod placeholder;
pub mod resource;
pub mod sample;
pub mod tree;

pub use backup::{BufferBackupStore, JsonFileBackupStore, NullBackupStore};
pub use config::HubConfig;
pub use error::{HubError, Result};
pub use handler::HandlerId;
pub use io::IoKind;
pub use observation::TransformKind;
pub use sample::{DataType, Sample};
pub use tree::EntryId;

use dispatch::Dispatch;
use tree::ResourceTree;

/// The facade type embedding applications hold: one resource tree,
/// one admin-update dispatcher, one buffer-backup store.
pub struct DataHub {
    tree: ResourceTree,
    dispatch: Dispatch,
    backup: Box<dyn BufferBackupStore>,
}

impl DataHub {
    /// Build a hub with the given configuration and backup store.
    #[must_use]
    pub fn new(config: HubConfig, backup: Box<dyn BufferBackupStore>) -> Self {
        Self {
            tree: ResourceTree::new(config),
            dispatch: Dispatch::new(),
            backup,
        }
    }

    /// The tree root, the base for every absolute path.
    #[must_use]
    pub fn root(&self) -> EntryId {
        self.tree.root()
    }

    // --- tree surface -------------------------------------------------

    /// # Errors
    /// `HubError::NotFound` if `path` does not resolve under `base`.
    pub fn find_entry(&self, base: EntryId, path: &str) -> Result<EntryId> {
        self.tree.find_entry(base, path)
    }

    /// # Errors
    /// `HubError::Duplicate` on a type/units or cross-kind conflict.
    pub fn get_input(&mut self, base: EntryId, path: &str, data_type: DataType, units: &str) -> Result<EntryId> {
        let id = self.tree.get_io(base, path, IoKind::Input, data_type, units)?;
        tracing::debug!(path, ?data_type, "input ready");
        Ok(id)
    }

    /// # Errors
    /// `HubError::Duplicate` on a type/units or cross-kind conflict.
    pub fn get_output(&mut self, base: EntryId, path: &str, data_type: DataType, units: &str) -> Result<EntryId> {
        let id = self.tree.get_io(base, path, IoKind::Output, data_type, units)?;
        tracing::debug!(path, ?data_type, "output ready");
        Ok(id)
    }

    /// # Errors
    /// `HubError::Duplicate` if an Input/Output already occupies `path`.
    pub fn get_observation(&mut self, base: EntryId, path: &str) -> Result<EntryId> {
        let id = self.tree.get_observation(base, path)?;
        tracing::debug!(path, "observation ready");
        Ok(id)
    }

    /// # Errors
    /// `HubError::BadParameter` if `id` is not an Input/Output.
    pub fn delete_io(&mut self, id: EntryId) -> Result<()> {
        self.tree.delete_io(id)
    }

    /// # Errors
    /// `HubError::BadParameter` if `id` is not an Observation.
    pub fn delete_observation(&mut self, id: EntryId) -> Result<()> {
        self.tree.delete_observation(id)
    }

    #[must_use]
    pub fn children(&self, id: EntryId) -> Vec<EntryId> {
        self.tree.children(id)
    }

    #[must_use]
    pub fn children_with_zombies(&self, id: EntryId) -> Vec<EntryId> {
        self.tree.children_with_zombies(id)
    }

    /// Run the snapshot scanner's zombie-flush pass.
    pub fn flush_zombies(&mut self) {
        self.tree.flush_zombies();
    }

    pub fn take_deletion_events(&mut self) -> Vec<String> {
        self.tree.take_deletion_events()
    }

    /// # Errors
    /// `HubError::NotFound` if `id` is not within `base`'s subtree.
    pub fn render_path(&self, id: EntryId, base: EntryId) -> Result<String> {
        self.tree.render_path(id, base)
    }

    // --- resource surface -----------------------------------------------

    /// # Errors
    /// `HubError::BadParameter` if `id` names a namespace;
    /// `HubError::Fault` on recursion-depth exhaustion.
    pub fn push(&mut self, id: EntryId, sample: Sample) -> Result<()> {
        self.tree.push(id, sample, self.backup.as_ref())
    }

    /// # Errors
    /// `HubError::Unavailable` if `id` has no current value.
    pub fn get_current_value(&self, id: EntryId) -> Result<Sample> {
        self.tree.current_value(id)
    }

    /// # Errors
    /// `HubError::BadParameter` if `id` names a namespace.
    pub fn set_default(&mut self, id: EntryId, sample: Option<Sample>) -> Result<()> {
        self.tree.set_default(id, sample)
    }

    /// # Errors
    /// `HubError::BadParameter` if `id` names a namespace.
    pub fn set_override(&mut self, id: EntryId, sample: Option<Sample>) -> Result<()> {
        self.tree.set_override(id, sample)
    }

    /// # Errors
    /// `HubError::Duplicate` if the new source would close a cycle;
    /// `HubError::BadParameter` if `dest` names a namespace.
    pub fn set_source(&mut self, dest: EntryId, source: Option<EntryId>) -> Result<()> {
        self.tree.set_source(dest, source)
    }

    #[must_use]
    pub fn source(&self, id: EntryId) -> Option<EntryId> {
        self.tree.source(id)
    }

    /// # Errors
    /// `HubError::BadParameter` if `id` names a namespace.
    pub fn add_handler(
        &mut self,
        id: EntryId,
        declared_type: DataType,
        callback: impl FnMut(&Sample) + 'static,
    ) -> Result<HandlerId> {
        self.tree.add_handler(id, declared_type, callback)
    }

    pub fn remove_handler(&mut self, id: EntryId, handler: HandlerId) -> bool {
        self.tree.remove_handler(id, handler)
    }

    pub fn mark_optional(&mut self, id: EntryId) {
        self.tree.with_io_mut(id, io::IoPoint::mark_optional);
    }

    #[must_use]
    pub fn is_mandatory(&self, id: EntryId) -> bool {
        self.tree.with_io(id, io::IoPoint::is_mandatory).unwrap_or(false)
    }

    // --- observation surface ----------------------------------------------

    pub fn with_observation<T>(&self, id: EntryId, f: impl FnOnce(&observation::Observation) -> T) -> Option<T> {
        self.tree.with_observation(id, f)
    }

    pub fn with_observation_mut<T>(
        &mut self,
        id: EntryId,
        f: impl FnOnce(&mut observation::Observation) -> T,
    ) -> Option<T> {
        let result = self.tree.with_observation_mut(id, f);
        if result.is_some() {
            self.tree.mark_filter_mutated(id);
        }
        result
    }

    /// Restore an observation's buffer from its backup store, as
    /// requested at (re)creation.
    ///
    /// # Errors
    /// `HubError::Fault` if the backup store read fails;
    /// `HubError::BadParameter` if the stored JSON is malformed.
    pub fn restore_observation_buffer(&mut self, id: EntryId) -> Result<()> {
        let path = self.tree.render_path(id, self.tree.root())?;
        let Some(json) = self.backup.read_buffer(&path)? else {
            return Ok(());
        };
        self.tree
            .with_observation_mut(id, |o| o.restore_from_backup(&json))
            .ok_or_else(|| HubError::bad_parameter("not an observation"))?
    }

    // --- lifecycle ----------------------------------------------------

    /// # Errors
    /// `HubError::NotPermitted` if a window is already open.
    pub fn start_update(&mut self) -> Result<()> {
        self.dispatch.start_update(&mut self.tree)
    }

    /// # Errors
    /// `HubError::NotPermitted` if no window is open.
    pub fn end_update(&mut self) -> Result<()> {
        self.dispatch.end_update(&mut self.tree, self.backup.as_ref())
    }

    pub fn on_update_lifecycle(&mut self, listener: impl FnMut(bool) + 'static) {
        self.dispatch.on_update_lifecycle(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facade_round_trips_a_push_through_get_current_value() {
        let mut hub = DataHub::new(HubConfig::default(), Box::new(NullBackupStore));
        let root = hub.root();
        let input = hub.get_input(root, "/s/a", DataType::Numeric, "degC").unwrap();
        hub.push(input, Sample::numeric(1.0, 5.5)).unwrap();
        assert_eq!(hub.get_current_value(input).unwrap().as_numeric(), Some(5.5));
    }

    #[test]
    fn cross_kind_create_is_duplicate() {
        let mut hub = DataHub::new(HubConfig::default(), Box::new(NullBackupStore));
        let root = hub.root();
        hub.get_input(root, "/s/a", DataType::Numeric, "degC").unwrap();
        assert!(matches!(
            hub.get_observation(root, "/s/a"),
            Err(HubError::Duplicate(_))
        ));
    }
}
