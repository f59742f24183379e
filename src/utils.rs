use percent_encoding::percent_decode_str;

/// Extension trait for extracting the relay's stream name from request URLs.
pub trait UrlExt {
    /// The percent-decoded first path segment.
    ///
    /// `None` if there is no such segment, if it is empty or if it decodes to something that
    /// can't be used as a single path segment.
    fn stream_name(&self) -> Option<String>;
}

impl UrlExt for url::Url {
    fn stream_name(&self) -> Option<String> {
        if self.cannot_be_a_base() {
            return None;
        }

        let first = self.path_segments()?.next()?;
        let name = percent_decode_str(first).decode_utf8().ok()?;

        if name.is_empty() || name.contains('/') {
            return None;
        }

        Some(name.into_owned())
    }
}
