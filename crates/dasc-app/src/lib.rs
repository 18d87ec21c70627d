pub mod settings;

pub use settings::Settings;

/// Walks a `std::error::Error`'s `source()` chain into one multi-line
/// string, the way the top-level wrapper in spec.md §7 "formats the stack"
/// before forwarding it to the log (and, in a deployment with an alerting
/// channel wired up, an out-of-band notifier — not implemented here).
pub fn format_error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str("\ncaused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
