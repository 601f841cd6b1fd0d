// src/slug.rs

/// URL-safe form of a display name: lowercase ASCII letters and digits
/// separated by single hyphens.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("list");
    }
    slug
}

/// `slugify(name)`, with `-2`, `-3`, ... appended until it is not in `taken`.
pub fn unique_slug(name: &str, taken: &[String]) -> String {
    let base = slugify(name);
    if !taken.iter().any(|s| *s == base) {
        return base;
    }
    (2..)
        .map(|n| format!("{}-{}", base, n))
        .find(|candidate| !taken.iter().any(|s| s == candidate))
        .unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("John Muir Trail 2024!"), "john-muir-trail-2024");
        assert_eq!(slugify("  --Winter   Kit-- "), "winter-kit");
        assert_eq!(slugify("Über Pack"), "ber-pack");
        assert_eq!(slugify("???"), "list");
    }

    #[test]
    fn unique_slug_appends_suffix() {
        let taken = vec!["pct".to_string(), "pct-2".to_string()];
        assert_eq!(unique_slug("PCT", &taken), "pct-3");
        assert_eq!(unique_slug("AT", &taken), "at");
    }
}
