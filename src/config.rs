//! Tunable limits for a `DataHub` instance.

use serde::{Deserialize, Serialize};

/// Bounds enforced across the tree: path element length, rendered
/// string/JSON sample length, and the default ceiling applied to a
/// newly created observation's ring buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub max_name_len: usize,
    pub max_string_sample_len: usize,
    pub max_json_sample_len: usize,
    pub default_buffer_max_count: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_name_len: 128,
            max_string_sample_len: 4096,
            max_json_sample_len: 65536,
            default_buffer_max_count: 0,
        }
    }
}
