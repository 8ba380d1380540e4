use arbor_domain::{FileChange, FileChangeKind};

/// Parses `git status --porcelain=v1` output. Unknown lines are skipped.
pub(crate) fn parse_porcelain_v1(text: &str) -> Vec<FileChange> {
    let mut changes = Vec::new();
    for line in text.lines() {
        if line.len() < 4 {
            continue;
        }
        let mut chars = line.chars();
        let x = chars.next().unwrap_or(' ');
        let y = chars.next().unwrap_or(' ');
        let Some(rest) = line.get(3..) else {
            continue;
        };
        let path = match rest.split_once(" -> ") {
            Some((_, new_path)) => new_path,
            None => rest,
        };
        let path = path.trim_matches('"').to_owned();

        let kind = match (x, y) {
            ('?', '?') => FileChangeKind::Untracked,
            ('U', _) | (_, 'U') | ('A', 'A') | ('D', 'D') => FileChangeKind::Conflicted,
            ('R', _) | (_, 'R') | ('C', _) => FileChangeKind::Renamed,
            ('A', _) => FileChangeKind::Added,
            ('D', _) | (_, 'D') => FileChangeKind::Deleted,
            ('!', '!') => continue,
            _ => FileChangeKind::Modified,
        };
        let staged = !matches!(x, ' ' | '?' | '!');

        changes.push(FileChange { path, kind, staged });
    }
    changes
}

/// Parses `git rev-list --left-right --count HEAD...@{upstream}` output into
/// `(ahead, behind)`.
pub(crate) fn parse_left_right_count(text: &str) -> Option<(u32, u32)> {
    let mut parts = text.split_whitespace();
    let ahead = parts.next()?.parse().ok()?;
    let behind = parts.next()?.parse().ok()?;
    Some((ahead, behind))
}

/// Parses `git diff --shortstat` output into `(insertions, deletions)`.
/// Empty output means no changes.
pub(crate) fn parse_shortstat(text: &str) -> (u64, u64) {
    let mut additions = 0;
    let mut deletions = 0;
    for part in text.split(',') {
        let part = part.trim();
        let Some((count, label)) = part.split_once(' ') else {
            continue;
        };
        let Ok(count) = count.parse::<u64>() else {
            continue;
        };
        if label.starts_with("insertion") {
            additions = count;
        } else if label.starts_with("deletion") {
            deletions = count;
        }
    }
    (additions, deletions)
}

pub(crate) fn count_lines(bytes: &[u8]) -> u64 {
    if bytes.is_empty() {
        return 0;
    }
    let newlines = bytes.iter().filter(|b| **b == b'\n').count() as u64;
    if bytes.last() == Some(&b'\n') {
        newlines
    } else {
        newlines + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn porcelain_v1_classifies_entries() {
        let text = " M src/lib.rs\nA  new.rs\n?? notes.txt\nR  old.rs -> renamed.rs\n D gone.rs\nUU both.rs\n";
        let changes = parse_porcelain_v1(text);
        let summary = changes
            .iter()
            .map(|c| (c.path.as_str(), c.kind, c.staged))
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![
                ("src/lib.rs", FileChangeKind::Modified, false),
                ("new.rs", FileChangeKind::Added, true),
                ("notes.txt", FileChangeKind::Untracked, false),
                ("renamed.rs", FileChangeKind::Renamed, true),
                ("gone.rs", FileChangeKind::Deleted, false),
                ("both.rs", FileChangeKind::Conflicted, true),
            ]
        );
    }

    #[test]
    fn porcelain_v1_ignores_garbage() {
        assert!(parse_porcelain_v1("xx\n\n").is_empty());
    }

    #[test]
    fn left_right_count_parses_tab_separated_pair() {
        assert_eq!(parse_left_right_count("3\t1\n"), Some((3, 1)));
        assert_eq!(parse_left_right_count(""), None);
        assert_eq!(parse_left_right_count("x\ty"), None);
    }

    #[test]
    fn shortstat_parses_all_shapes() {
        assert_eq!(
            parse_shortstat(" 3 files changed, 10 insertions(+), 2 deletions(-)"),
            (10, 2)
        );
        assert_eq!(parse_shortstat(" 1 file changed, 1 insertion(+)"), (1, 0));
        assert_eq!(parse_shortstat(" 1 file changed, 4 deletions(-)"), (0, 4));
        assert_eq!(parse_shortstat(""), (0, 0));
    }

    #[test]
    fn count_lines_handles_missing_trailing_newline() {
        assert_eq!(count_lines(b""), 0);
        assert_eq!(count_lines(b"a\nb\n"), 2);
        assert_eq!(count_lines(b"a\nb"), 2);
        assert_eq!(count_lines(b"single"), 1);
    }
}
