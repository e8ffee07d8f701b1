//! Standard property view labels

/// Well-known view names
pub struct PropertyView;

impl PropertyView {
    /// Properties visible to anonymous callers
    pub const PUBLIC: &'static str = "public";
    /// Properties rendered by the UI layer
    pub const UI: &'static str = "ui";
    /// Every property of the type
    pub const ALL: &'static str = "all";
}
