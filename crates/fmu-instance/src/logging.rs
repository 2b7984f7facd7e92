//! Per-instance log categories.
//!
//! Models log through an [`InstanceLogger`]. Each message is tagged with a
//! category; messages whose category is masked off are dropped, the rest go
//! to `tracing` at a level matching the category.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogCategory {
    Events,
    Warning,
    Discard,
    Error,
    Fatal,
    Pending,
    All,
}

impl LogCategory {
    const NAMED: [LogCategory; 7] = [
        LogCategory::Events,
        LogCategory::Warning,
        LogCategory::Discard,
        LogCategory::Error,
        LogCategory::Fatal,
        LogCategory::Pending,
        LogCategory::All,
    ];

    pub fn bits(self) -> u32 {
        match self {
            LogCategory::Events => 1 << 0,
            LogCategory::Warning => 1 << 1,
            LogCategory::Discard => 1 << 2,
            LogCategory::Error => 1 << 3,
            LogCategory::Fatal => 1 << 4,
            LogCategory::Pending => 1 << 5,
            LogCategory::All => (1 << 6) - 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LogCategory::Events => "logEvents",
            LogCategory::Warning => "logStatusWarning",
            LogCategory::Discard => "logStatusDiscard",
            LogCategory::Error => "logStatusError",
            LogCategory::Fatal => "logStatusFatal",
            LogCategory::Pending => "logStatusPending",
            LogCategory::All => "logAll",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMED.into_iter().find(|c| c.name() == name)
    }
}

/// Logger handed to a model at instantiation.
///
/// Cheap to clone; clones share the category mask, so `setDebugLogging` on
/// the handle takes effect in the model immediately.
#[derive(Clone, Debug)]
pub struct InstanceLogger {
    instance: Arc<str>,
    mask: Arc<AtomicU32>,
}

impl InstanceLogger {
    pub fn new(instance: &str, logging_on: bool) -> Self {
        let mut mask = LogCategory::Error.bits() | LogCategory::Fatal.bits();
        if logging_on {
            mask |= LogCategory::Events.bits();
        }
        Self {
            instance: Arc::from(instance),
            mask: Arc::new(AtomicU32::new(mask)),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn is_enabled(&self, category: LogCategory) -> bool {
        self.mask.load(Ordering::Relaxed) & category.bits() != 0
    }

    /// Replace the category mask.
    ///
    /// `logging_on = false` disables everything; an empty list enables every
    /// category. Unknown names are rejected without touching the mask.
    pub fn set_debug_logging(&self, logging_on: bool, categories: &[&str]) -> Result<(), String> {
        let mask = if !logging_on {
            0
        } else if categories.is_empty() {
            LogCategory::All.bits()
        } else {
            let mut mask = 0;
            for name in categories {
                let category = LogCategory::from_name(name)
                    .ok_or_else(|| format!("unknown log category '{name}'"))?;
                mask |= category.bits();
            }
            mask
        };
        self.mask.store(mask, Ordering::Relaxed);
        Ok(())
    }

    pub fn log(&self, category: LogCategory, message: &str) {
        if !self.is_enabled(category) {
            return;
        }
        let instance = &*self.instance;
        let tag = category.name();
        match category {
            LogCategory::Error | LogCategory::Fatal => {
                tracing::error!(instance, category = tag, "{}", message)
            }
            LogCategory::Warning | LogCategory::Discard => {
                tracing::warn!(instance, category = tag, "{}", message)
            }
            LogCategory::Events | LogCategory::Pending | LogCategory::All => {
                tracing::info!(instance, category = tag, "{}", message)
            }
        }
    }

    pub fn event(&self, message: &str) {
        self.log(LogCategory::Events, message);
    }

    pub fn warning(&self, message: &str) {
        self.log(LogCategory::Warning, message);
    }

    pub fn discard(&self, message: &str) {
        self.log(LogCategory::Discard, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogCategory::Error, message);
    }

    pub fn fatal(&self, message: &str) {
        self.log(LogCategory::Fatal, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn default_mask_follows_logging_on() {
        let quiet = InstanceLogger::new("a", false);
        assert!(quiet.is_enabled(LogCategory::Error));
        assert!(quiet.is_enabled(LogCategory::Fatal));
        assert!(!quiet.is_enabled(LogCategory::Events));

        let chatty = InstanceLogger::new("b", true);
        assert!(chatty.is_enabled(LogCategory::Events));
        assert!(!chatty.is_enabled(LogCategory::Warning));
    }

    #[test]
    fn set_debug_logging_rules() {
        let log = InstanceLogger::new("a", false);
        log.set_debug_logging(true, &[]).unwrap();
        assert!(log.is_enabled(LogCategory::Pending));

        log.set_debug_logging(true, &["logStatusWarning"]).unwrap();
        assert!(log.is_enabled(LogCategory::Warning));
        assert!(!log.is_enabled(LogCategory::Error));

        log.set_debug_logging(false, &["logAll"]).unwrap();
        assert!(!log.is_enabled(LogCategory::Fatal));

        let err = log.set_debug_logging(true, &["logNonsense"]).unwrap_err();
        assert!(err.contains("logNonsense"));
        assert!(!log.is_enabled(LogCategory::Fatal));
    }

    #[test]
    fn clones_share_the_mask() {
        let log = InstanceLogger::new("a", false);
        let model_side = log.clone();
        log.set_debug_logging(true, &["logEvents"]).unwrap();
        assert!(model_side.is_enabled(LogCategory::Events));
    }

    #[test]
    fn names_round_trip() {
        for c in LogCategory::NAMED {
            assert_eq!(LogCategory::from_name(c.name()), Some(c));
        }
        assert_eq!(LogCategory::from_name("events"), None);
    }

    #[traced_test]
    #[test]
    fn masked_messages_are_dropped() {
        let log = InstanceLogger::new("ball", false);
        log.event("bounce at 0.45");
        log.error("state went NaN");
        assert!(!logs_contain("bounce at 0.45"));
        assert!(logs_contain("state went NaN"));
        assert!(logs_contain("logStatusError"));
    }
}
