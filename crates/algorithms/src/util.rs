//! Small formatting helpers

use std::fmt::Display;

fn abbr_join<T: Display>(items: &[T], limit: usize) -> String {
    let render = |xs: &[T]| xs.iter().map(ToString::to_string).collect::<Vec<_>>();
    if items.len() <= limit {
        return render(items).join(", ");
    }
    let right = limit / 2;
    let left = limit - right;
    let mut parts = render(&items[..left]);
    parts.push("...".to_string());
    parts.extend(render(&items[items.len() - right..]));
    parts.join(", ")
}

/// List rendered as `[a, b, ..., y, z]`, abbreviated beyond `limit` items.
///
/// With an odd `limit`, the left side shows the extra item.
pub fn abbr_str<T: Display>(items: &[T], limit: usize) -> String {
    format!("[{}]", abbr_join(items, limit))
}

/// Same as [`abbr_str`], but with set braces
pub fn abbr_set_str<T: Display>(items: &[T], limit: usize) -> String {
    format!("{{{}}}", abbr_join(items, limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbr_str() {
        let items: Vec<i64> = (0..19).collect();
        assert_eq!(abbr_str(&items, 4), "[0, 1, ..., 17, 18]");
        assert_eq!(abbr_str(&items, 5), "[0, 1, 2, ..., 17, 18]");
        assert_eq!(abbr_str(&items[..3], 4), "[0, 1, 2]");
        assert_eq!(abbr_str::<i64>(&[], 4), "[]");
    }

    #[test]
    fn test_abbr_set_str() {
        assert_eq!(abbr_set_str(&[0, 1, 2], 15), "{0, 1, 2}");
        assert_eq!(abbr_set_str(&[1], 15), "{1}");
    }
}
