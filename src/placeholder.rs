//! `Placeholder`: a resource that holds only admin settings —
//! default, override, source route — so they survive a delete/recreate
//! of a typed IO resource at the same path. Accepts pushes without any
//! type enforcement, adopting whatever type is pushed.

use crate::resource::ResourceState;

#[derive(Default)]
pub struct Placeholder {
    pub base: ResourceState,
}

impl Placeholder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn has_admin_settings(&self) -> bool {
        self.base.has_local_admin_settings()
    }
}
