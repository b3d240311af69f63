//! Logging context shared by the stages of a pipeline

use log::{Level, LevelFilter};
use std::fmt::Display;

/// Default log target for pipeline messages
pub const DEFAULT_TARGET: &str = "tabular_etl";

/// Logging handle passed into every stage call
///
/// The pipeline owns one context and lends it to the extractor, the
/// transformation and the loader, so all three log under the same target
/// and level. Messages above the context level are dropped before they
/// reach the global logger.
///
/// # Example
/// ```
/// use tabular_etl::etl::EtlContext;
/// use log::LevelFilter;
///
/// let ctx = EtlContext::new()
///     .with_target("governo")
///     .with_level(LevelFilter::Debug)
///     .verbose(true);
///
/// ctx.info(format_args!("Extracted {} rows", 3));
/// assert!(ctx.verbosity());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EtlContext {
    target: String,
    level: LevelFilter,
    verbosity: bool,
    source: Option<String>,
}

impl Default for EtlContext {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            level: LevelFilter::Info,
            verbosity: false,
            source: None,
        }
    }
}

impl EtlContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log under a custom target, e.g. to route messages to an
    /// application logger
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Maximum level emitted by the stages
    pub fn with_level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    /// Enable verbose messages
    pub fn verbose(mut self, verbosity: bool) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Free-form description of where the data comes from
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Copy of this context with verbosity overridden
    pub fn with_verbosity(&self, verbosity: bool) -> Self {
        Self {
            verbosity,
            ..self.clone()
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    pub fn verbosity(&self) -> bool {
        self.verbosity
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Whether a message at `level` would be emitted
    pub fn enabled(&self, level: Level) -> bool {
        level <= self.level
    }

    pub fn log(&self, level: Level, message: impl Display) {
        if self.enabled(level) {
            log::log!(target: self.target.as_str(), level, "{}", message);
        }
    }

    pub fn error(&self, message: impl Display) {
        self.log(Level::Error, message);
    }

    pub fn warn(&self, message: impl Display) {
        self.log(Level::Warn, message);
    }

    pub fn info(&self, message: impl Display) {
        self.log(Level::Info, message);
    }

    pub fn debug(&self, message: impl Display) {
        self.log(Level::Debug, message);
    }

    pub fn trace(&self, message: impl Display) {
        self.log(Level::Trace, message);
    }

    /// Info message emitted only when verbosity is on
    pub fn verbose_info(&self, message: impl Display) {
        if self.verbosity {
            self.info(message);
        }
    }
}
