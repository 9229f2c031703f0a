//! Per-call tuning hints for write paths.
//!
//! A [`TuningContext`] travels explicitly into every write-path operation
//! (`Table::insert`, `Table::replace`, `Index::set`). Backends read the hints
//! they understand and ignore the rest; no hint is ever persisted.
//!
//! The only hint today is [`FILL_PERCENT`]: how full a storage page may be
//! packed before it is split. A higher value packs more entries per page,
//! which suits append-mostly workloads; a lower value leaves room for
//! random inserts without immediate splits.

/// Name of the page-fill-ratio hint.
pub const FILL_PERCENT: &str = "fill_percent";

/// Fill ratio used by backends when no hint is attached.
pub const DEFAULT_FILL_PERCENT: f64 = 0.5;

/// An immutable bundle of tuning hints for a single call.
///
/// Deriving never mutates the receiver: `with_fill_percent` returns a new
/// context, and the most recently applied value wins on lookup.
///
/// This layer does not validate hint values. `fill_percent` is expected in
/// `(0, 1]`; backends decide how to treat values outside that range.
///
/// # Example
///
/// ```rust
/// use quill_core::TuningContext;
///
/// let base = TuningContext::new();
/// let packed = base.with_fill_percent(0.9);
///
/// assert_eq!(base.fill_percent(), None);
/// assert_eq!(packed.fill_percent(), Some(0.9));
/// assert_eq!(packed.with_fill_percent(0.7).fill_percent(), Some(0.7));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TuningContext {
    fill_percent: Option<f64>,
}

impl TuningContext {
    /// Creates a context carrying no hints.
    #[must_use]
    pub const fn new() -> Self {
        Self { fill_percent: None }
    }

    /// Returns a derived context carrying fill-percent hint `p`.
    #[must_use]
    pub const fn with_fill_percent(self, p: f64) -> Self {
        Self {
            fill_percent: Some(p),
        }
    }

    /// Returns the fill-percent hint, if one is attached.
    ///
    /// `None` means the backend should use its own default.
    #[must_use]
    pub const fn fill_percent(&self) -> Option<f64> {
        self.fill_percent
    }

    /// Returns true if no hint is attached.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.fill_percent.is_none()
    }
}
