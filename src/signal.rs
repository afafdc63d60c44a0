//! Ctrl+C handling.
//!
//! A shared `AtomicBool` is set when the user interrupts. The scanner checks it
//! between batches and the walker checks it per entry, so an interrupted scan
//! stops at a batch boundary with every completed batch written.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Shared shutdown flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// The flag itself, for [`DedupEngine::with_shutdown_flag`](crate::engine::DedupEngine::with_shutdown_flag).
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();

/// Install the Ctrl+C hook, or reuse the one installed earlier in this process.
///
/// If the hook cannot be registered (another handler owns the signal), an
/// unhooked handler is returned; it still honors [`ShutdownHandler::request_shutdown`].
pub fn install_handler() -> ShutdownHandler {
    if let Some(handler) = GLOBAL_HANDLER.get() {
        handler.reset();
        return handler.clone();
    }

    let handler = ShutdownHandler::new();
    let flag = handler.get_flag();
    let hooked = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
        let _ = writeln!(std::io::stderr(), "\nInterrupted. Finishing the current batch...");
        let _ = std::io::stderr().flush();
    });
    if let Err(e) = hooked {
        log::debug!("Ctrl+C handler not installed: {e}");
    }

    GLOBAL_HANDLER.get_or_init(|| handler).clone()
}
