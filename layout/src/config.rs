//! Options for [crate::Schema::report].

/// Configuration for a diagnostic decode.
///
/// # Examples
///
/// ```
/// use commonware_layout::Config;
///
/// let cfg = Config {
///     monitor_usage: true,
///     ..Default::default()
/// };
/// assert!(!cfg.hide_pointer_fields);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Config {
    /// Count how many times each byte of the buffer is read (saturating at 255).
    pub monitor_usage: bool,

    /// Drop fields that only serve as the count or offset source of an array or reference from
    /// the decoded records.
    pub hide_pointer_fields: bool,
}

impl Config {
    /// Returns a configuration with usage monitoring enabled.
    pub fn monitored() -> Self {
        Self {
            monitor_usage: true,
            hide_pointer_fields: false,
        }
    }
}
