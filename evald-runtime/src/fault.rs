//! Process-wide fault boundary
//!
//! Installed once at process entry; any panic escaping other handlers is
//! formatted and forwarded into the runtime's failure-reporting path. This
//! is the last line of defense against silent worker death.

use std::panic::PanicHookInfo;

use tracing::error;

use crate::events::EventSender;

/// Install the process-wide panic hook.
///
/// The previous hook still runs afterwards so default backtrace printing is
/// preserved.
pub fn install_fault_hook(sender: EventSender) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let description = describe_panic(info);
        error!("Uncaught fault: {}", description);
        sender.send_fault(description);
        previous(info);
    }));
}

fn describe_panic(info: &PanicHookInfo<'_>) -> String {
    let message = info
        .payload()
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| info.payload().downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());

    match info.location() {
        Some(location) => format!(
            "panic at {}:{}: {}",
            location.file(),
            location.line(),
            message
        ),
        None => format!("panic: {}", message),
    }
}
