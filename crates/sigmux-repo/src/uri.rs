/// Join a reference against a base URI.
///
/// Limited to what definition texts need: absolute references pass
/// through untouched, everything else is appended to the base path.
pub fn resolve(base: &str, reference: &str) -> String {
    if reference.contains("://") || reference.starts_with("urn:") {
        return reference.to_string();
    }
    let base = base.trim_end_matches('/');
    if reference.is_empty() {
        return base.to_string();
    }
    format!("{base}/{}", reference.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_references_pass_through() {
        assert_eq!(
            resolve("http://example.org/rec", "http://other.org/sig"),
            "http://other.org/sig"
        );
        assert_eq!(resolve("http://example.org/rec", "urn:x:1"), "urn:x:1");
    }

    #[test]
    fn relative_references_join_the_base() {
        assert_eq!(
            resolve("http://example.org/rec/", "ecg"),
            "http://example.org/rec/ecg"
        );
        assert_eq!(
            resolve("http://example.org/rec", "/ecg"),
            "http://example.org/rec/ecg"
        );
    }

    #[test]
    fn empty_reference_is_the_base() {
        assert_eq!(resolve("http://example.org/rec/", ""), "http://example.org/rec");
    }
}
