/// Options controlling how a compound file is opened and grown.
///
/// # Examples
///
/// ```rust
/// use msole::ole::OleOptions;
///
/// // Create with defaults
/// let options = OleOptions::default();
///
/// // Or customize
/// let options = OleOptions::new()
///     .with_growth_sectors(8)
///     .with_lenient(false);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OleOptions {
    /// Sectors appended to the file each time the allocator runs out of space
    pub growth_sectors: u32,
    /// Recover from non-conformant structure with a warning instead of failing
    pub lenient: bool,
    /// Refuse write-mode streams and structural edits
    pub read_only: bool,
}

/// Upper bound for [`OleOptions::growth_sectors`]; keeps one growth step within
/// a single additional allocation-table sector.
pub const MAX_GROWTH_SECTORS: u32 = 64;

impl Default for OleOptions {
    fn default() -> Self {
        Self {
            growth_sectors: 1,
            lenient: true,
            read_only: false,
        }
    }
}

impl OleOptions {
    /// Create a new `OleOptions` with default values.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how many sectors each file growth adds (clamped to `1..=64`).
    #[inline]
    pub fn with_growth_sectors(mut self, sectors: u32) -> Self {
        self.growth_sectors = sectors;
        self
    }

    /// Set whether recoverable structural damage is tolerated.
    ///
    /// When disabled, every condition that would otherwise be logged as a
    /// warning is reported as `OleError::CorruptedFile`.
    #[inline]
    pub fn with_lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    /// Set whether the container is opened read-only.
    #[inline]
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Growth step actually used by the allocator
    #[inline]
    pub(crate) fn growth_step(&self) -> u32 {
        self.growth_sectors.clamp(1, MAX_GROWTH_SECTORS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = OleOptions::default();
        assert_eq!(options.growth_sectors, 1);
        assert!(options.lenient);
        assert!(!options.read_only);
    }

    #[test]
    fn test_growth_step_clamped() {
        assert_eq!(OleOptions::new().with_growth_sectors(0).growth_step(), 1);
        assert_eq!(OleOptions::new().with_growth_sectors(16).growth_step(), 16);
        assert_eq!(
            OleOptions::new().with_growth_sectors(10_000).growth_step(),
            MAX_GROWTH_SECTORS
        );
    }

    #[test]
    fn test_deserialize_partial() {
        let options: OleOptions = serde_json::from_str(r#"{"lenient": false}"#).unwrap();
        assert!(!options.lenient);
        assert_eq!(options.growth_sectors, 1);
    }
}
