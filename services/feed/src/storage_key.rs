use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

/// Generates blob keys of the form `<timestamp><extension>`.
///
/// The timestamp is milliseconds since the Unix epoch, bumped forward when two
/// uploads land in the same millisecond (or the wall clock steps back), so keys
/// handed out by one generator are strictly increasing and never repeat.
pub struct StorageKeyGenerator {
    last: AtomicI64,
    clock: Clock,
}

impl StorageKeyGenerator {
    pub fn new() -> Self {
        Self::with_clock(|| Utc::now().timestamp_millis())
    }

    /// Create a generator reading time from `clock` (milliseconds)
    pub fn with_clock(clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        Self {
            last: AtomicI64::new(i64::MIN),
            clock: Box::new(clock),
        }
    }

    /// Next unique timestamp
    pub fn next_timestamp(&self) -> i64 {
        let now = (self.clock)();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = if now > last { now } else { last + 1 };
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }

    /// Derive a key for an upload whose client file name was `file_name_hint`
    pub fn generate(&self, file_name_hint: Option<&str>) -> String {
        let extension = file_name_hint.map(extension_of).unwrap_or_default();
        format!("{}{}", self.next_timestamp(), extension)
    }
}

impl Default for StorageKeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Extension of a client-supplied file name, including the leading dot.
///
/// Only the final path component is considered. The result is lowercased and
/// empty unless the extension is plain ASCII alphanumerics, which keeps keys
/// inside the flat blob namespace.
pub fn extension_of(file_name: &str) -> String {
    let base = file_name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(file_name);

    match base.rfind('.') {
        // A leading dot marks a hidden file, not an extension
        Some(0) | None => String::new(),
        Some(pos) => {
            let ext = &base[pos + 1..];
            if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
                String::new()
            } else {
                format!(".{}", ext.to_ascii_lowercase())
            }
        }
    }
}

/// Get content type for a key's extension
pub fn content_type_for(key: &str) -> &'static str {
    match extension_of(key).as_str() {
        ".mp4" | ".m4v" => "video/mp4",
        ".webm" => "video/webm",
        ".mov" => "video/quicktime",
        ".mkv" => "video/x-matroska",
        ".avi" => "video/x-msvideo",
        ".ogv" => "video/ogg",
        ".3gp" => "video/3gpp",
        _ => "application/octet-stream",
    }
}
