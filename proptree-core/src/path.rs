//! Path arguments and segment-boundary matching.
//!
//! Paths are accepted either as dot strings (`"address.city"`) or as explicit
//! segment lists (for keys that themselves contain dots). Internally both are
//! normalized to `Vec<String>`; the empty path denotes the node itself.

/// Conversion into a list of path segments.
pub trait IntoPath {
    fn into_segments(self) -> Vec<String>;
}

impl IntoPath for &str {
    fn into_segments(self) -> Vec<String> {
        split_path(self)
    }
}

impl IntoPath for &String {
    fn into_segments(self) -> Vec<String> {
        split_path(self)
    }
}

impl IntoPath for String {
    fn into_segments(self) -> Vec<String> {
        split_path(&self)
    }
}

impl IntoPath for Vec<String> {
    fn into_segments(self) -> Vec<String> {
        self
    }
}

impl IntoPath for &[String] {
    fn into_segments(self) -> Vec<String> {
        self.to_vec()
    }
}

impl IntoPath for &[&str] {
    fn into_segments(self) -> Vec<String> {
        self.iter().map(|s| s.to_string()).collect()
    }
}

impl<const N: usize> IntoPath for [&str; N] {
    fn into_segments(self) -> Vec<String> {
        self.iter().map(|s| s.to_string()).collect()
    }
}

/// Split a dot path, dropping empty segments so `""` and `"a..b"` behave
/// like the empty path and `"a.b"`.
pub fn split_path(path: &str) -> Vec<String> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn join_path(segments: &[String]) -> String {
    segments.join(".")
}

/// Prefix `path` with `key`; the empty path means "the node itself".
pub fn prefix_path(key: &str, path: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{key}.{path}")
    }
}

/// Segment-boundary prefix match: `"a.b"` matches `"a.b"` and `"a.b.c"` but
/// not `"a.bc"`. The empty prefix matches every path.
pub fn path_matches(prefix: &str, path: &str) -> bool {
    if prefix.is_empty() || prefix == path {
        return true;
    }
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_join() {
        assert!(split_path("").is_empty());
        assert_eq!(split_path("a.b.c"), vec!["a", "b", "c"]);
        assert_eq!(split_path("a..b"), vec!["a", "b"]);
        assert_eq!(join_path(&split_path("x.y")), "x.y");
    }

    #[test]
    fn prefixing() {
        assert_eq!(prefix_path("a", ""), "a");
        assert_eq!(prefix_path("a", "b.c"), "a.b.c");
    }

    #[test]
    fn matches_on_segment_boundaries() {
        assert!(path_matches("a.b", "a.b"));
        assert!(path_matches("a.b", "a.b.c"));
        assert!(!path_matches("a.b", "a.bc"));
        assert!(!path_matches("a.b", "a"));
        assert!(path_matches("", "anything"));
        assert!(path_matches("", ""));
    }

    #[test]
    fn segment_lists_keep_dotted_keys() {
        let segs = ["user.name", "first"].into_segments();
        assert_eq!(segs, vec!["user.name", "first"]);
    }
}
