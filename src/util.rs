use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Shortens a label to at most `max_chars` characters, ending in an ellipsis when cut.
pub fn truncate_label(label: &str, max_chars: usize) -> String {
    if label.chars().count() <= max_chars {
        return label.to_owned();
    }
    let keep = max_chars.saturating_sub(1);
    let mut out = label.chars().take(keep).collect::<String>();
    out.push('…');
    out
}

/// Last segment of a slash- or backslash-separated path.
pub fn short_path(path: &str) -> &str {
    path.rsplit(['/', '\\'])
        .find(|segment| !segment.is_empty())
        .unwrap_or(path)
}

/// Deterministic pseudo-random pair in `[-1, 1]` derived from `id`.
pub fn stable_pair(id: &str) -> (f32, f32) {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    let hash = hasher.finish();

    let x = ((hash & 0xffff_ffff) as f64 / u32::MAX as f64) as f32;
    let y = (((hash >> 32) & 0xffff_ffff) as f64 / u32::MAX as f64) as f32;
    ((x * 2.0) - 1.0, (y * 2.0) - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_marks_cut_labels() {
        assert_eq!(truncate_label("short", 10), "short");
        assert_eq!(truncate_label("a_rather_long_name", 8), "a_rathe…");
    }

    #[test]
    fn short_path_takes_last_segment() {
        assert_eq!(short_path("src/app/main.py"), "main.py");
        assert_eq!(short_path("C:\\work\\lib.rs"), "lib.rs");
        assert_eq!(short_path("dir/"), "dir");
        assert_eq!(short_path("plain"), "plain");
    }

    #[test]
    fn stable_pair_is_deterministic() {
        assert_eq!(stable_pair("node-1"), stable_pair("node-1"));
        let (x, y) = stable_pair("node-2");
        assert!((-1.0..=1.0).contains(&x) && (-1.0..=1.0).contains(&y));
    }
}
