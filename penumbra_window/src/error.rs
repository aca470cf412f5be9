use tracing::{error, warn};

#[cfg(not(target_arch = "wasm32"))]
pub fn show_error_popup(message: &str) {
    use native_dialog::{DialogBuilder, MessageLevel};

    let shown = DialogBuilder::message()
        .set_level(MessageLevel::Error)
        .set_title("Error")
        .set_text(message)
        .alert()
        .show();
    if let Err(e) = shown {
        warn!("Failed to show error popup: {e}");
    }
}

#[cfg(target_arch = "wasm32")]
pub fn show_error_popup(_message: &str) {}

/// Logs the error, shows it in a popup and aborts the current thread.
pub fn handle_fatal_error<E: std::fmt::Display>(error: E, context: &str) -> ! {
    let message = format!("{}: {}", context, error);
    error!("{message}");
    show_error_popup(&message);
    panic!("{}", message);
}
