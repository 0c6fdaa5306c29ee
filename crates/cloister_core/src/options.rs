//! Inspection options passed to the sandbox-side formatter.
//!
//! Every field is optional. Unset fields are omitted from the encoded
//! object so the inspection module's own defaults apply.

use crate::error::CoreResult;
use serde::{Deserialize, Serialize};

/// Options understood by `inspect` and `formatWithOptions`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectOptions {
    /// Wrap output in ANSI color codes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colors: Option<bool>,
    /// Honour custom inspect functions on values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_inspect: Option<bool>,
    /// Include non-enumerable properties
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_hidden: Option<bool>,
    /// Show proxy target and handler
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_proxy: Option<bool>,
    /// Recursion depth, `None` leaves the default of 2
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    /// Line width before entries are split across lines
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_length: Option<u32>,
    /// Maximum number of array items shown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_array_length: Option<u32>,
    /// Maximum number of string characters shown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_string_length: Option<u32>,
    /// Number of innermost levels combined on one line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compact: Option<u32>,
    /// Sort object keys
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sorted: Option<bool>,
}

impl InspectOptions {
    /// Create empty options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set colors
    #[must_use]
    pub fn with_colors(mut self, colors: bool) -> Self {
        self.colors = Some(colors);
        self
    }

    /// Set custom inspect
    #[must_use]
    pub fn with_custom_inspect(mut self, custom_inspect: bool) -> Self {
        self.custom_inspect = Some(custom_inspect);
        self
    }

    /// Set show hidden
    #[must_use]
    pub fn with_show_hidden(mut self, show_hidden: bool) -> Self {
        self.show_hidden = Some(show_hidden);
        self
    }

    /// Set show proxy
    #[must_use]
    pub fn with_show_proxy(mut self, show_proxy: bool) -> Self {
        self.show_proxy = Some(show_proxy);
        self
    }

    /// Set depth
    #[must_use]
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    /// Set break length
    #[must_use]
    pub fn with_break_length(mut self, break_length: u32) -> Self {
        self.break_length = Some(break_length);
        self
    }

    /// Set max array length
    #[must_use]
    pub fn with_max_array_length(mut self, max: u32) -> Self {
        self.max_array_length = Some(max);
        self
    }

    /// Set max string length
    #[must_use]
    pub fn with_max_string_length(mut self, max: u32) -> Self {
        self.max_string_length = Some(max);
        self
    }

    /// Set compact
    #[must_use]
    pub fn with_compact(mut self, compact: u32) -> Self {
        self.compact = Some(compact);
        self
    }

    /// Set sorted
    #[must_use]
    pub fn with_sorted(mut self, sorted: bool) -> Self {
        self.sorted = Some(sorted);
        self
    }

    /// Encode as the JSON object handed to the sandbox
    ///
    /// # Errors
    ///
    /// Returns error if encoding fails.
    pub fn to_json(&self) -> CoreResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}
