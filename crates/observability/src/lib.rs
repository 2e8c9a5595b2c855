//! Process-wide tracing and logging setup.

use shopcast_core::LogSettings;

/// Initialize process-wide logging from settings.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init(settings: &LogSettings) {
    tracing::init(&settings.level, settings.format);
}

/// Subscriber construction (filters, output format).
pub mod tracing;
