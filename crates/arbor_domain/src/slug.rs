pub fn sanitize_slug(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_dash = false;

    for ch in input.chars() {
        let mapped = match ch {
            'a'..='z' | '0'..='9' => Some(ch),
            'A'..='Z' => Some(ch.to_ascii_lowercase()),
            _ => None,
        };

        match mapped {
            Some(ch) => {
                out.push(ch);
                prev_dash = false;
            }
            None => {
                if !prev_dash && !out.is_empty() {
                    out.push('-');
                    prev_dash = true;
                }
            }
        }
    }

    while out.ends_with('-') {
        out.pop();
    }

    if out.is_empty() {
        "workspace".to_owned()
    } else {
        out
    }
}

/// Joins a user-configured branch prefix with a workspace slug. An empty
/// prefix yields the bare slug.
pub fn branch_name_for(prefix: &str, slug: &str) -> String {
    let prefix = prefix.trim().trim_matches('/');
    if prefix.is_empty() {
        slug.to_owned()
    } else {
        format!("{prefix}/{slug}")
    }
}

#[cfg(test)]
mod tests {
    use super::{branch_name_for, sanitize_slug};

    #[test]
    fn sanitize_slug_lowercases_and_collapses_separators() {
        assert_eq!(sanitize_slug("Hello, World!"), "hello-world");
        assert_eq!(sanitize_slug("Hello---World"), "hello-world");
        assert_eq!(sanitize_slug("São Paulo"), "s-o-paulo");
    }

    #[test]
    fn sanitize_slug_returns_fallback_when_empty() {
        assert_eq!(sanitize_slug(""), "workspace");
        assert_eq!(sanitize_slug("!!!"), "workspace");
    }

    #[test]
    fn branch_name_joins_prefix_and_slug() {
        assert_eq!(branch_name_for("arbor", "tokyo"), "arbor/tokyo");
        assert_eq!(branch_name_for(" arbor/ ", "tokyo"), "arbor/tokyo");
        assert_eq!(branch_name_for("", "tokyo"), "tokyo");
    }
}
