//! Runtime configuration structs.
//!
//! Plain `Default`-able structs, constructible directly by an embedder or,
//! with the `serde` feature enabled, parsed from a `toml` document the way
//! `ember-cli` does.

/// Tunables for [`crate::gc::Gc`]'s pacing: pause, stepmul, and the
/// emergency-collection behavior a host may want to control.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GcConfig {
    /// Percentage of live size to wait through between cycles.
    pub pause_percent: u32,
    /// Percentage multiplier applied to collection debt to size a step.
    pub step_multiplier: u32,
    /// Minimum bytes allocated before the first automatic step fires.
    pub step_size: usize,
    /// If true, every allocation failure forces a full collect-and-retry
    /// before raising `ERRMEM`.
    pub emergency_mode: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            pause_percent: 200,
            step_multiplier: 100,
            step_size: 1024,
            emergency_mode: true,
        }
    }
}

/// Per-instance sizing knobs that are not GC-related.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RuntimeConfig {
    pub initial_stack_size: usize,
    pub max_stack_size: usize,
    /// Strings at or under this length are interned.
    pub short_string_intern_threshold: usize,
    pub registry_presize: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            initial_stack_size: crate::stack::DEFAULT_STACK_SIZE,
            max_stack_size: 1_000_000,
            short_string_intern_threshold: crate::string_store::SHORT_STRING_MAX,
            registry_presize: 8,
        }
    }
}
