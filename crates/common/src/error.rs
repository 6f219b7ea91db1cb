// ── Error codes ─────────────────────────────────────────────────────────────

/// Stable, machine-readable identifier for an error.
///
/// Codes are UPPER_SNAKE_CASE and never change once published; callers may
/// match on them instead of on message text. Wrapping errors forward the
/// code of the error they wrap.
pub trait ErrorCode {
    fn code(&self) -> &'static str;
}

impl ErrorCode for std::io::Error {
    fn code(&self) -> &'static str {
        "IO"
    }
}
