//! `ResourceTree`: the hierarchical, path-indexed entry graph —
//! children lists, zombie retention across deletes, variant
//! upgrade/downgrade, path parsing and rendering, and the push/routing
//! machinery that ties `IoPoint`, `Placeholder`, and `Observation`
//! together into one dispatch surface.

use std::sync::LazyLock;

use regex::Regex;

use crate::backup::BufferBackupStore;
use crate::config::HubConfig;
use crate::error::{HubError, Result};
use crate::handler::HandlerId;
use crate::io::{IoKind, IoPoint};
use crate::observation::Observation;
use crate::placeholder::Placeholder;
use crate::resource::{Flags, ResourceState};
use crate::sample::{DataType, Sample, Value};

/// A stable reference to an entry in the arena. Indices are never
/// reused within a tree's lifetime — a deleted-and-flushed entry's
/// slot is retired, not recycled, so a stale `EntryId` reliably fails
/// lookups rather than silently resolving to an unrelated entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(u32);

impl EntryId {
    const fn index(self) -> usize {
        self.0 as usize
    }
}

/// The five entry variants. Cross-variant transitions ("upgrade" /
/// "downgrade") replace this in place, carrying shared admin settings
/// across via the functions in this module.
pub enum EntryKind {
    Namespace,
    Input(IoPoint),
    Output(IoPoint),
    Observation(Observation),
    Placeholder(Placeholder),
}

impl EntryKind {
    fn base(&self) -> Option<&ResourceState> {
        match self {
            Self::Namespace => None,
            Self::Input(io) | Self::Output(io) => Some(&io.base),
            Self::Observation(o) => Some(&o.base),
            Self::Placeholder(p) => Some(&p.base),
        }
    }

    fn base_mut(&mut self) -> Option<&mut ResourceState> {
        match self {
            Self::Namespace => None,
            Self::Input(io) | Self::Output(io) => Some(&mut io.base),
            Self::Observation(o) => Some(&mut o.base),
            Self::Placeholder(p) => Some(&mut p.base),
        }
    }

    fn has_admin_settings(&self) -> bool {
        match self {
            Self::Namespace => false,
            Self::Input(io) | Self::Output(io) => io.base.has_local_admin_settings(),
            Self::Observation(o) => o.has_admin_settings(),
            Self::Placeholder(p) => p.has_admin_settings(),
        }
    }
}

struct Entry {
    name: String,
    parent: Option<EntryId>,
    children: Vec<EntryId>,
    kind: EntryKind,
    namespace_flags: Flags,
    retired: bool,
}

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^/.\[\]]+$").expect("static pattern"));

fn validate_name(name: &str, config: &HubConfig) -> Result<()> {
    if name.is_empty() {
        return Err(HubError::bad_parameter("empty path element"));
    }
    if name.len() > config.max_name_len {
        return Err(HubError::bad_parameter(format!(
            "path element '{name}' exceeds max length {}",
            config.max_name_len
        )));
    }
    if !NAME_PATTERN.is_match(name) {
        return Err(HubError::bad_parameter(format!(
            "path element '{name}' contains a reserved character"
        )));
    }
    Ok(())
}

/// Reject a String/Json sample whose payload exceeds the hub's
/// configured bound. Other variants are never bounded.
fn validate_sample_bounds(sample: &Sample, config: &HubConfig) -> Result<()> {
    match sample.value() {
        Value::String(s) if s.len() > config.max_string_sample_len => Err(HubError::Overflow),
        Value::Json(j) if j.len() > config.max_json_sample_len => Err(HubError::Overflow),
        _ => Ok(()),
    }
}

/// The hierarchical entry graph.
pub struct ResourceTree {
    entries: Vec<Entry>,
    root: EntryId,
    config: HubConfig,
    update_window_open: bool,
    deletion_events: Vec<String>,
}

impl Default for ResourceTree {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl ResourceTree {
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        let root = Entry {
            name: String::new(),
            parent: None,
            children: Vec::new(),
            kind: EntryKind::Namespace,
            namespace_flags: Flags::default(),
            retired: false,
        };
        Self {
            entries: vec![root],
            root: EntryId(0),
            config,
            update_window_open: false,
            deletion_events: Vec::new(),
        }
    }

    #[must_use]
    pub const fn root(&self) -> EntryId {
        self.root
    }

    fn entry(&self, id: EntryId) -> &Entry {
        &self.entries[id.index()]
    }

    fn entry_mut(&mut self, id: EntryId) -> &mut Entry {
        &mut self.entries[id.index()]
    }

    #[must_use]
    pub fn name(&self, id: EntryId) -> &str {
        &self.entry(id).name
    }

    #[must_use]
    pub fn parent(&self, id: EntryId) -> Option<EntryId> {
        self.entry(id).parent
    }

    /// Children of `id`, excluding zombies (entries demoted-but-not-
    /// yet-flushed). This is the view normal traffic sees.
    #[must_use]
    pub fn children(&self, id: EntryId) -> Vec<EntryId> {
        self.entry(id)
            .children
            .iter()
            .copied()
            .filter(|c| !self.entry(*c).namespace_deleted())
            .collect()
    }

    /// Children of `id` including zombies, for the snapshot scanner's
    /// one-time tombstone observation.
    #[must_use]
    pub fn children_with_zombies(&self, id: EntryId) -> Vec<EntryId> {
        self.entry(id).children.clone()
    }

    #[must_use]
    pub fn flags(&self, id: EntryId) -> Flags {
        let entry = self.entry(id);
        entry.kind.base().map_or(entry.namespace_flags, ResourceState::flags)
    }

    pub fn set_relevant(&mut self, id: EntryId, relevant: bool) {
        self.flags_mut(id).relevant = relevant;
    }

    pub fn set_new(&mut self, id: EntryId, new: bool) {
        self.flags_mut(id).new = new;
    }

    fn flags_mut(&mut self, id: EntryId) -> &mut Flags {
        let entry = self.entry_mut(id);
        match entry.kind.base_mut() {
            Some(base) => base.flags_mut(),
            None => &mut entry.namespace_flags,
        }
    }

    /// Clear every `New` flag tree-wide. Called at `EndUpdate`.
    pub fn clear_all_new_flags(&mut self) {
        for i in 0..self.entries.len() {
            let id = EntryId(i as u32);
            self.flags_mut(id).new = false;
        }
    }

    // --- path resolution --------------------------------------------------

    fn split_path<'a>(&self, base: EntryId, path: &'a str) -> (EntryId, Vec<&'a str>) {
        let (start, rest) = if let Some(stripped) = path.strip_prefix('/') {
            (self.root, stripped)
        } else {
            (base, path)
        };
        let components = rest.split('/').filter(|s| !s.is_empty()).collect();
        (start, components)
    }

    /// Resolve `path` relative to `base` without creating anything.
    ///
    /// # Errors
    ///
    /// `HubError::NotFound` if any component is missing;
    /// `HubError::BadParameter` if a component is malformed.
    pub fn find_entry(&self, base: EntryId, path: &str) -> Result<EntryId> {
        let (mut cur, components) = self.split_path(base, path);
        for name in components {
            validate_name(name, &self.config)?;
            cur = self
                .entry(cur)
                .children
                .iter()
                .copied()
                .find(|c| self.entry(*c).name == name && !self.entry(*c).namespace_deleted())
                .ok_or_else(|| HubError::not_found(format!("no entry named '{name}'")))?;
        }
        Ok(cur)
    }

    /// Resolve `path` relative to `base`, materializing missing
    /// intermediate entries as namespaces.
    fn walk_create_namespaces(&mut self, base: EntryId, path: &str) -> Result<(EntryId, String)> {
        let (start, components) = {
            let (s, c) = self.split_path(base, path);
            (s, c.into_iter().map(str::to_string).collect::<Vec<_>>())
        };
        let Some((last, intermediate)) = components.split_last() else {
            return Err(HubError::bad_parameter("empty path"));
        };
        let mut cur = start;
        for name in intermediate {
            validate_name(name, &self.config)?;
            cur = self.child_or_create_namespace(cur, name);
        }
        validate_name(last, &self.config)?;
        Ok((cur, last.clone()))
    }

    fn child_or_create_namespace(&mut self, parent: EntryId, name: &str) -> EntryId {
        if let Some(existing) = self
            .entry(parent)
            .children
            .iter()
            .copied()
            .find(|c| self.entry(*c).name == name && !self.entry(*c).namespace_deleted())
        {
            return existing;
        }
        self.push_entry(
            parent,
            name.to_string(),
            EntryKind::Namespace,
        )
    }

    fn push_entry(&mut self, parent: EntryId, name: String, kind: EntryKind) -> EntryId {
        let id = EntryId(self.entries.len() as u32);
        self.entries.push(Entry {
            name,
            parent: Some(parent),
            children: Vec::new(),
            kind,
            namespace_flags: Flags::default(),
            retired: false,
        });
        self.entry_mut(parent).children.push(id);
        self.flags_mut(id).new = true;
        id
    }

    // --- entry lookup / creation by kind -----------------------------------

    /// Find-or-create an Input or Output at `path`.
    ///
    /// # Errors
    ///
    /// `HubError::Duplicate` on a type/units mismatch or a cross-kind
    /// conversion; `HubError::BadParameter` on a malformed path.
    pub fn get_io(
        &mut self,
        base: EntryId,
        path: &str,
        io_kind: IoKind,
        data_type: DataType,
        units: &str,
    ) -> Result<EntryId> {
        let (parent, leaf) = self.walk_create_namespaces(base, path)?;
        if let Some(existing) = self
            .entry(parent)
            .children
            .iter()
            .copied()
            .find(|c| self.entry(*c).name == leaf && !self.entry(*c).namespace_deleted())
        {
            return self.upgrade_to_io(existing, io_kind, data_type, units);
        }
        let point = IoPoint::new(io_kind, data_type, units);
        let kind = match io_kind {
            IoKind::Input => EntryKind::Input(point),
            IoKind::Output => EntryKind::Output(point),
        };
        Ok(self.push_entry(parent, leaf, kind))
    }

    fn upgrade_to_io(
        &mut self,
        id: EntryId,
        io_kind: IoKind,
        data_type: DataType,
        units: &str,
    ) -> Result<EntryId> {
        let entry = self.entry_mut(id);
        match &entry.kind {
            EntryKind::Namespace => {
                let point = IoPoint::new(io_kind, data_type, units);
                entry.kind = match io_kind {
                    IoKind::Input => EntryKind::Input(point),
                    IoKind::Output => EntryKind::Output(point),
                };
                Ok(id)
            }
            EntryKind::Placeholder(_) => {
                let EntryKind::Placeholder(placeholder) =
                    std::mem::replace(&mut entry.kind, EntryKind::Namespace)
                else {
                    unreachable!()
                };
                let mut point = IoPoint::new(io_kind, data_type, units);
                point.base = placeholder.base; // MoveAdminSettings
                self.entry_mut(id).kind = match io_kind {
                    IoKind::Input => EntryKind::Input(point),
                    IoKind::Output => EntryKind::Output(point),
                };
                Ok(id)
            }
            EntryKind::Input(existing) if io_kind == IoKind::Input => {
                if existing.data_type == data_type && existing.units == units {
                    Ok(id)
                } else {
                    Err(HubError::duplicate("Input type/units mismatch"))
                }
            }
            EntryKind::Output(existing) if io_kind == IoKind::Output => {
                if existing.data_type == data_type && existing.units == units {
                    Ok(id)
                } else {
                    Err(HubError::duplicate("Output type/units mismatch"))
                }
            }
            EntryKind::Input(_) | EntryKind::Output(_) | EntryKind::Observation(_) => {
                Err(HubError::duplicate("cross-kind create at existing path"))
            }
        }
    }

    /// Find-or-create an Observation at `path`.
    ///
    /// # Errors
    ///
    /// `HubError::Duplicate` if an Input/Output already occupies the
    /// path; `HubError::BadParameter` on a malformed path.
    pub fn get_observation(&mut self, base: EntryId, path: &str) -> Result<EntryId> {
        let (parent, leaf) = self.walk_create_namespaces(base, path)?;
        let default_cap = self.config.default_buffer_max_count;
        let new_observation = || {
            let mut obs = Observation::new();
            obs.set_buffer_max_count(default_cap);
            obs
        };
        if let Some(existing) = self
            .entry(parent)
            .children
            .iter()
            .copied()
            .find(|c| self.entry(*c).name == leaf && !self.entry(*c).namespace_deleted())
        {
            let entry = self.entry_mut(existing);
            return match &entry.kind {
                EntryKind::Namespace => {
                    entry.kind = EntryKind::Observation(new_observation());
                    Ok(existing)
                }
                EntryKind::Placeholder(_) => {
                    let EntryKind::Placeholder(placeholder) =
                        std::mem::replace(&mut entry.kind, EntryKind::Namespace)
                    else {
                        unreachable!()
                    };
                    let mut obs = new_observation();
                    obs.base = placeholder.base;
                    self.entry_mut(existing).kind = EntryKind::Observation(obs);
                    Ok(existing)
                }
                EntryKind::Observation(_) => Ok(existing),
                EntryKind::Input(_) | EntryKind::Output(_) => {
                    Err(HubError::duplicate("cross-kind create at existing path"))
                }
            };
        }
        Ok(self.push_entry(parent, leaf, EntryKind::Observation(new_observation())))
    }

    /// Delete an Input/Output, demoting it to a Placeholder if admin
    /// settings remain, else to a tombstoned Namespace.
    ///
    /// # Errors
    ///
    /// `HubError::BadParameter` if `id` is not an Input/Output.
    pub fn delete_io(&mut self, id: EntryId) -> Result<()> {
        let entry = self.entry(id);
        if !matches!(entry.kind, EntryKind::Input(_) | EntryKind::Output(_)) {
            return Err(HubError::bad_parameter("delete_io on a non-IO entry"));
        }
        self.demote(id)
    }

    /// Delete an Observation, following the same demote rule.
    ///
    /// # Errors
    ///
    /// `HubError::BadParameter` if `id` is not an Observation.
    pub fn delete_observation(&mut self, id: EntryId) -> Result<()> {
        if !matches!(self.entry(id).kind, EntryKind::Observation(_)) {
            return Err(HubError::bad_parameter("delete_observation on a non-observation entry"));
        }
        self.demote(id)
    }

    fn demote(&mut self, id: EntryId) -> Result<()> {
        let path = self.render_path(id, self.root)?;
        let entry = self.entry_mut(id);
        let keep_settings = entry.kind.has_admin_settings();
        let taken = std::mem::replace(&mut entry.kind, EntryKind::Namespace);
        if keep_settings {
            let base = match taken {
                EntryKind::Input(io) | EntryKind::Output(io) => io.base,
                EntryKind::Observation(o) => o.base,
                EntryKind::Placeholder(p) => p.base,
                EntryKind::Namespace => ResourceState::new(),
            };
            let mut placeholder = Placeholder::new();
            placeholder.base = base;
            self.entry_mut(id).kind = EntryKind::Placeholder(placeholder);
        } else {
            let entry = self.entry_mut(id);
            entry.namespace_flags.deleted = !entry.namespace_flags.new;
        }
        self.deletion_events.push(path);
        Ok(())
    }

    /// Drain deletion events recorded since the last drain, for the
    /// external snapshot module.
    pub fn take_deletion_events(&mut self) -> Vec<String> {
        std::mem::take(&mut self.deletion_events)
    }

    /// The snapshot scanner's flush pass: permanently detach any
    /// zombie (tombstoned Namespace) entry that has no children, one
    /// cycle after it was demoted. This is the second phase of the
    /// two-phase demote-then-flush deletion protocol.
    pub fn flush_zombies(&mut self) {
        let ids: Vec<EntryId> = (0..self.entries.len()).map(|i| EntryId(i as u32)).collect();
        for id in ids {
            let entry = self.entry(id);
            if entry.namespace_deleted() && entry.children.is_empty() && !entry.retired {
                let parent = entry.parent;
                self.entry_mut(id).retired = true;
                if let Some(parent) = parent {
                    self.entry_mut(parent).children.retain(|c| *c != id);
                }
            }
        }
    }

    // --- path rendering -----------------------------------------------------

    /// Render `entry`'s path relative to `base`.
    ///
    /// # Errors
    ///
    /// `HubError::NotFound` if `entry` is not within `base`'s subtree.
    pub fn render_path(&self, entry: EntryId, base: EntryId) -> Result<String> {
        if entry == base {
            return Ok(String::new());
        }
        let mut names = Vec::new();
        let mut cur = entry;
        loop {
            let e = self.entry(cur);
            let Some(parent) = e.parent else {
                return Err(HubError::not_found("entry not within base subtree"));
            };
            names.push(e.name.clone());
            if parent == base {
                names.reverse();
                let joined = names.join("/");
                return Ok(if base == self.root {
                    format!("/{joined}")
                } else {
                    joined
                });
            }
            cur = parent;
        }
    }

    // --- routing --------------------------------------------------------

    #[must_use]
    pub fn source(&self, id: EntryId) -> Option<EntryId> {
        self.entry(id).kind.base().and_then(ResourceState::source)
    }

    /// Set (or clear, with `source = None`) the source edge of `dest`.
    ///
    /// # Errors
    ///
    /// `HubError::Duplicate` if the assignment would close a cycle.
    pub fn set_source(&mut self, dest: EntryId, source: Option<EntryId>) -> Result<()> {
        if let Some(s) = source {
            if s == dest || self.reachable_via_source(s, dest) {
                return Err(HubError::duplicate("routing change would create a cycle"));
            }
        }
        if let Some(base) = self.entry_mut(dest).kind.base_mut() {
            base.set_source(source);
        } else {
            return Err(HubError::bad_parameter("cannot route a namespace"));
        }
        self.maybe_suspend(dest);
        Ok(())
    }

    fn reachable_via_source(&self, start: EntryId, target: EntryId) -> bool {
        let mut cur = Some(start);
        let mut visited = std::collections::HashSet::new();
        while let Some(c) = cur {
            if c == target {
                return true;
            }
            if !visited.insert(c) {
                return false;
            }
            cur = self.source(c);
        }
        false
    }

    /// All resources whose source currently points at `id`, in
    /// ascending creation order (the derivable "destination list").
    #[must_use]
    pub fn destinations(&self, id: EntryId) -> Vec<EntryId> {
        (0..self.entries.len())
            .map(|i| EntryId(i as u32))
            .filter(|c| self.source(*c) == Some(id))
            .collect()
    }

    fn maybe_suspend(&mut self, id: EntryId) {
        if self.update_window_open {
            if let Some(base) = self.entry_mut(id).kind.base_mut() {
                base.suspend();
            }
        }
    }

    // --- update window ----------------------------------------------------

    pub fn set_update_window_open(&mut self, open: bool) {
        self.update_window_open = open;
    }

    #[must_use]
    pub fn update_window_open(&self) -> bool {
        self.update_window_open
    }

    /// Notify `id`'s filter/admin state has been mutated; used by the
    /// Observation filter setters exposed on `DataHub`.
    pub fn mark_filter_mutated(&mut self, id: EntryId) {
        self.maybe_suspend(id);
    }

    /// Drain `id`'s pending slot, clearing its suspension. `None` if
    /// nothing arrived while suspended.
    pub fn take_pending(&mut self, id: EntryId) -> Option<Sample> {
        self.entry_mut(id).kind.base_mut().and_then(ResourceState::take_pending)
    }

    /// Every entry currently suspended, for `EndUpdate` draining.
    #[must_use]
    pub fn suspended_entries(&self) -> Vec<EntryId> {
        (0..self.entries.len())
            .map(|i| EntryId(i as u32))
            .filter(|id| {
                self.entry(*id)
                    .kind
                    .base()
                    .is_some_and(ResourceState::is_suspended)
            })
            .collect()
    }

    // --- push -------------------------------------------------------------

    /// Push `sample` to `id` directly (as the owning client or
    /// administrator would). Runs the full coercion/filter/handler/
    /// forwarding pipeline.
    ///
    /// # Errors
    ///
    /// `HubError::BadParameter` if `id` names a Namespace;
    /// `HubError::Fault` if re-entrant push recursion exceeds the
    /// depth guard.
    pub fn push(&mut self, id: EntryId, sample: Sample, backup: &dyn BufferBackupStore) -> Result<()> {
        self.push_inner(id, sample, backup, false, 0)
    }

    const MAX_PUSH_DEPTH: u32 = 64;

    fn push_inner(
        &mut self,
        id: EntryId,
        sample: Sample,
        backup: &dyn BufferBackupStore,
        via_routing: bool,
        depth: u32,
    ) -> Result<()> {
        if depth > Self::MAX_PUSH_DEPTH {
            return Err(HubError::fault("push recursion depth exceeded"));
        }
        if via_routing && matches!(self.entry(id).kind, EntryKind::Input(_)) {
            return Ok(());
        }
        if matches!(self.entry(id).kind, EntryKind::Namespace) {
            return Err(HubError::bad_parameter("push to a namespace"));
        }

        let suspended = self
            .entry(id)
            .kind
            .base()
            .is_some_and(ResourceState::is_suspended);
        if suspended {
            if let Some(base) = self.entry_mut(id).kind.base_mut() {
                base.set_pending(sample);
            }
            return Ok(());
        }

        let Some(published) = self.process_local(id, sample, backup)? else {
            return Ok(());
        };

        if let Some(base) = self.entry_mut(id).kind.base_mut() {
            base.call_handlers(&published);
        }

        for dest in self.destinations(id) {
            self.push_inner(dest, published.clone(), backup, true, depth + 1)?;
        }
        Ok(())
    }

    fn process_local(
        &mut self,
        id: EntryId,
        sample: Sample,
        backup: &dyn BufferBackupStore,
    ) -> Result<Option<Sample>> {
        let obs_path = if matches!(self.entry(id).kind, EntryKind::Observation(_)) {
            Some(self.render_path(id, self.root)?)
        } else {
            None
        };
        let config = self.config;
        match &mut self.entry_mut(id).kind {
            EntryKind::Namespace => Err(HubError::bad_parameter("push to a namespace")),
            EntryKind::Input(io) | EntryKind::Output(io) => {
                let overridden = io.base.apply_override(sample);
                let coerced = io.coerce(&overridden);
                validate_sample_bounds(&coerced, &config)?;
                io.base.store_current(coerced.clone());
                Ok(Some(coerced))
            }
            EntryKind::Placeholder(p) => {
                let overridden = p.base.apply_override(sample);
                validate_sample_bounds(&overridden, &config)?;
                p.base.store_current(overridden.clone());
                Ok(Some(overridden))
            }
            EntryKind::Observation(obs) => {
                let overridden = obs.base.apply_override(sample);
                validate_sample_bounds(&overridden, &config)?;
                Ok(obs.process(&overridden, backup, obs_path.as_deref().unwrap_or_default()))
            }
        }
    }

    // --- typed accessors for embedding code --------------------------------

    pub fn with_io<T>(&self, id: EntryId, f: impl FnOnce(&IoPoint) -> T) -> Option<T> {
        match &self.entry(id).kind {
            EntryKind::Input(io) | EntryKind::Output(io) => Some(f(io)),
            _ => None,
        }
    }

    pub fn with_io_mut<T>(&mut self, id: EntryId, f: impl FnOnce(&mut IoPoint) -> T) -> Option<T> {
        match &mut self.entry_mut(id).kind {
            EntryKind::Input(io) | EntryKind::Output(io) => Some(f(io)),
            _ => None,
        }
    }

    pub fn with_observation<T>(&self, id: EntryId, f: impl FnOnce(&Observation) -> T) -> Option<T> {
        match &self.entry(id).kind {
            EntryKind::Observation(o) => Some(f(o)),
            _ => None,
        }
    }

    pub fn with_observation_mut<T>(
        &mut self,
        id: EntryId,
        f: impl FnOnce(&mut Observation) -> T,
    ) -> Option<T> {
        match &mut self.entry_mut(id).kind {
            EntryKind::Observation(o) => Some(f(o)),
            _ => None,
        }
    }

    /// # Errors
    ///
    /// `HubError::Unavailable` if `id` has no current value (including
    /// when `id` names a namespace, which never holds one).
    pub fn current_value(&self, id: EntryId) -> Result<Sample> {
        self.entry(id)
            .kind
            .base()
            .and_then(ResourceState::get_current_value)
            .cloned()
            .ok_or(HubError::Unavailable)
    }

    pub fn set_default(&mut self, id: EntryId, sample: Option<Sample>) -> Result<()> {
        self.entry_mut(id)
            .kind
            .base_mut()
            .ok_or_else(|| HubError::bad_parameter("set_default on a namespace"))?
            .set_default(sample);
        Ok(())
    }

    pub fn set_override(&mut self, id: EntryId, sample: Option<Sample>) -> Result<()> {
        self.entry_mut(id)
            .kind
            .base_mut()
            .ok_or_else(|| HubError::bad_parameter("set_override on a namespace"))?
            .set_override(sample);
        self.maybe_suspend(id);
        Ok(())
    }

    pub fn add_handler(
        &mut self,
        id: EntryId,
        declared_type: DataType,
        callback: impl FnMut(&Sample) + 'static,
    ) -> Result<HandlerId> {
        Ok(self
            .entry_mut(id)
            .kind
            .base_mut()
            .ok_or_else(|| HubError::bad_parameter("add_handler on a namespace"))?
            .add_handler(declared_type, callback))
    }

    pub fn remove_handler(&mut self, id: EntryId, handler: HandlerId) -> bool {
        self.entry_mut(id)
            .kind
            .base_mut()
            .is_some_and(|base| base.remove_handler(handler))
    }
}

impl Entry {
    fn namespace_deleted(&self) -> bool {
        matches!(self.kind, EntryKind::Namespace) && self.namespace_flags.deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::NullBackupStore;

    fn tree() -> ResourceTree {
        ResourceTree::new(HubConfig::default())
    }

    #[test]
    fn create_input_and_push_coerces_and_fires_handler() {
        let mut t = tree();
        let root = t.root();
        let input = t
            .get_io(root, "/sensors/t", IoKind::Input, DataType::Numeric, "degC")
            .unwrap();
        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let seen2 = std::rc::Rc::clone(&seen);
        t.add_handler(input, DataType::Numeric, move |s| {
            seen2.borrow_mut().push((s.timestamp(), s.as_numeric().unwrap()));
        })
        .unwrap();

        let store = NullBackupStore;
        t.push(input, Sample::numeric(1.0, 21.5), &store).unwrap();
        assert_eq!(*seen.borrow(), vec![(1.0, 21.5)]);

        t.push(input, Sample::string(2.0, "cold"), &store).unwrap();
        assert_eq!(seen.borrow()[1], (2.0, 1.0));
    }

    #[test]
    fn observation_filters_and_forwards_from_source() {
        let mut t = tree();
        let root = t.root();
        let input = t
            .get_io(root, "/sensors/t", IoKind::Input, DataType::Numeric, "degC")
            .unwrap();
        let obs = t.get_observation(root, "/obs/t").unwrap();
        t.set_source(obs, Some(input)).unwrap();
        t.with_observation_mut(obs, |o| {
            o.set_min_period(10.0);
            o.set_low_limit(-50.0);
            o.set_high_limit(50.0);
        });

        let store = NullBackupStore;
        for (ts, v) in [(0.0, 20.0), (1.0, 21.0), (11.0, 22.0), (12.0, 100.0)] {
            t.push(input, Sample::numeric(ts, v), &store).unwrap();
        }
        let current = t.current_value(obs).unwrap();
        assert_eq!(current.as_numeric(), Some(22.0));
        assert_eq!(current.timestamp(), 11.0);
    }

    #[test]
    fn cyclic_source_assignment_is_rejected() {
        let mut t = tree();
        let root = t.root();
        let a = t.get_observation(root, "/obs/a").unwrap();
        let b = t.get_observation(root, "/obs/b").unwrap();
        t.set_source(a, Some(b)).unwrap();
        assert!(matches!(t.set_source(b, Some(a)), Err(HubError::Duplicate(_))));
    }

    #[test]
    fn self_source_is_rejected() {
        let mut t = tree();
        let root = t.root();
        let a = t.get_observation(root, "/obs/a").unwrap();
        assert!(matches!(t.set_source(a, Some(a)), Err(HubError::Duplicate(_))));
    }

    #[test]
    fn render_path_scenarios() {
        let mut t = tree();
        let root = t.root();
        let app_x = t.get_observation(root, "/app/x/led").unwrap();
        let base = t.find_entry(root, "/app/x").unwrap();
        assert_eq!(t.render_path(app_x, base).unwrap(), "led");
        assert_eq!(t.render_path(app_x, root).unwrap(), "/app/x/led");

        let elsewhere = t.get_observation(root, "/other").unwrap();
        assert!(matches!(
            t.render_path(app_x, elsewhere),
            Err(HubError::NotFound(_))
        ));
    }

    #[test]
    fn idempotent_get_io_same_type_ok_different_type_duplicate() {
        let mut t = tree();
        let root = t.root();
        let a = t
            .get_io(root, "/s/a", IoKind::Input, DataType::Numeric, "degC")
            .unwrap();
        let again = t
            .get_io(root, "/s/a", IoKind::Input, DataType::Numeric, "degC")
            .unwrap();
        assert_eq!(a, again);
        assert!(matches!(
            t.get_io(root, "/s/a", IoKind::Input, DataType::String, "degC"),
            Err(HubError::Duplicate(_))
        ));
    }

    #[test]
    fn delete_with_default_demotes_to_placeholder_and_restores_on_recreate() {
        let mut t = tree();
        let root = t.root();
        let input = t
            .get_io(root, "/s/a", IoKind::Input, DataType::Numeric, "degC")
            .unwrap();
        t.set_default(input, Some(Sample::numeric(0.0, 5.0))).unwrap();
        t.delete_io(input).unwrap();
        assert!(t.with_io(input, |_| ()).is_none());

        let recreated = t
            .get_io(root, "/s/a", IoKind::Input, DataType::Numeric, "degC")
            .unwrap();
        assert_eq!(recreated, input);
        let current = t.current_value(recreated).unwrap();
        assert_eq!(current.as_numeric(), Some(5.0));
    }

    #[test]
    fn delete_without_settings_tombstones_and_flushes() {
        let mut t = tree();
        let root = t.root();
        let input = t
            .get_io(root, "/s/a", IoKind::Input, DataType::Numeric, "degC")
            .unwrap();
        t.clear_all_new_flags();
        t.delete_io(input).unwrap();
        assert!(t.flags(input).deleted);
        assert_eq!(t.children(root), Vec::<EntryId>::new());
        assert_eq!(t.children_with_zombies(root), vec![input]);
        t.flush_zombies();
        assert_eq!(t.children_with_zombies(root), Vec::<EntryId>::new());
    }

    #[test]
    fn suspended_resource_coalesces_to_one_pending_delivery() {
        let mut t = tree();
        let root = t.root();
        let input = t
            .get_io(root, "/s/a", IoKind::Input, DataType::Numeric, "degC")
            .unwrap();
        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let seen2 = std::rc::Rc::clone(&seen);
        t.add_handler(input, DataType::Numeric, move |s| {
            seen2.borrow_mut().push(s.as_numeric().unwrap());
        })
        .unwrap();

        t.set_update_window_open(true);
        t.set_override(input, Some(Sample::numeric(0.0, 0.0))).unwrap(); // mutate to suspend
        t.set_override(input, None).unwrap();

        let store = NullBackupStore;
        t.push(input, Sample::numeric(100.0, 1.0), &store).unwrap();
        t.push(input, Sample::numeric(101.0, 2.0), &store).unwrap();
        t.push(input, Sample::numeric(102.0, 3.0), &store).unwrap();
        assert!(seen.borrow().is_empty());

        for suspended in t.suspended_entries() {
            if let Some(sample) = t
                .entry_mut(suspended)
                .kind
                .base_mut()
                .and_then(ResourceState::take_pending)
            {
                t.push_inner(suspended, sample, &store, false, 0).unwrap();
            }
        }
        t.set_update_window_open(false);
        assert_eq!(*seen.borrow(), vec![3.0]);
    }

    #[test]
    fn current_value_on_an_unpushed_input_is_unavailable() {
        let mut t = tree();
        let root = t.root();
        let input = t
            .get_io(root, "/s/a", IoKind::Input, DataType::Numeric, "degC")
            .unwrap();
        assert!(matches!(t.current_value(input), Err(HubError::Unavailable)));
    }

    #[test]
    fn current_value_on_a_namespace_is_unavailable() {
        let t = tree();
        let root = t.root();
        assert!(matches!(t.current_value(root), Err(HubError::Unavailable)));
    }

    #[test]
    fn string_push_exceeding_max_sample_len_is_rejected() {
        let mut t = ResourceTree::new(HubConfig {
            max_string_sample_len: 4,
            ..HubConfig::default()
        });
        let root = t.root();
        let input = t
            .get_io(root, "/s/a", IoKind::Input, DataType::String, "")
            .unwrap();
        let store = NullBackupStore;
        assert!(matches!(
            t.push(input, Sample::string(0.0, "too long"), &store),
            Err(HubError::Overflow)
        ));
    }

    #[test]
    fn json_push_exceeding_max_sample_len_is_rejected() {
        let mut t = ResourceTree::new(HubConfig {
            max_json_sample_len: 4,
            ..HubConfig::default()
        });
        let root = t.root();
        let input = t
            .get_io(root, "/s/a", IoKind::Input, DataType::Json, "")
            .unwrap();
        let store = NullBackupStore;
        assert!(matches!(
            t.push(input, Sample::json(0.0, "[1,2,3,4,5]").unwrap(), &store),
            Err(HubError::Overflow)
        ));
    }

    #[test]
    fn new_observation_adopts_the_configured_default_buffer_cap() {
        let mut t = ResourceTree::new(HubConfig {
            default_buffer_max_count: 2,
            ..HubConfig::default()
        });
        let root = t.root();
        let obs = t.get_observation(root, "/obs/t").unwrap();
        let store = NullBackupStore;
        for v in [1.0, 2.0, 3.0] {
            t.push(obs, Sample::numeric(v, v), &store).unwrap();
        }
        assert_eq!(t.with_observation(obs, |o| o.buffer_len()).unwrap(), 2);
    }
}
