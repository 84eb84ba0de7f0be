/// Reduce a stored profile reference to a bare handle.
///
/// Accepts a handle (`brand`), a profile URL (`https://instagram.com/brand`) or a
/// profile URL with a trailing slash (`https://instagram.com/brand/`).
///
/// ```
/// use igscrape_social::instagram::resolve_username;
///
/// assert_eq!(resolve_username("https://instagram.com/foo"), "foo");
/// assert_eq!(resolve_username("https://instagram.com/foo/"), "foo");
/// assert_eq!(resolve_username("foo"), "foo");
/// ```
pub fn resolve_username(reference: &str) -> &str {
    let Some(last) = reference.rfind('/') else {
        return reference;
    };

    if last + 1 == reference.len() {
        let trimmed = &reference[..last];
        match trimmed.rfind('/') {
            Some(prev) => &trimmed[prev + 1..],
            None => trimmed,
        }
    } else {
        &reference[last + 1..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_without_trailing_slash() {
        assert_eq!(resolve_username("https://instagram.com/foo"), "foo");
        assert_eq!(resolve_username("https://www.instagram.com/brand.co"), "brand.co");
    }

    #[test]
    fn url_with_trailing_slash() {
        assert_eq!(resolve_username("https://instagram.com/foo/"), "foo");
        assert_eq!(resolve_username("http://www.instagram.com/under_score/"), "under_score");
    }

    #[test]
    fn bare_handle_is_unchanged() {
        assert_eq!(resolve_username("foo"), "foo");
        assert_eq!(resolve_username(""), "");
    }

    #[test]
    fn handle_with_only_trailing_slash() {
        assert_eq!(resolve_username("foo/"), "foo");
    }

    #[test]
    fn relative_path_forms() {
        assert_eq!(resolve_username("instagram.com/foo"), "foo");
        assert_eq!(resolve_username("/foo/"), "foo");
    }
}
