use console::style;
use similar::TextDiff;

const CONTEXT_LINES: usize = 3;

/// Renders the unified diff that turns `old` into `new`, with `a/` and `b/` headers.
///
/// An empty `old` is treated as file creation and gets a `/dev/null` source header.
pub fn unified_diff(path: &str, old: &str, new: &str) -> String {
    if old == new {
        return "No changes detected.".to_string();
    }

    let source = if old.is_empty() {
        crate::patch::NULL_PATH.to_string()
    } else {
        format!("a/{path}")
    };
    let target = format!("b/{path}");

    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(CONTEXT_LINES)
        .header(&source, &target)
        .to_string()
}

/// Colours a unified diff for the terminal: removals red, additions green, hunk headers cyan.
pub fn colorize(diff: &str) -> String {
    diff.lines()
        .map(|line| {
            if line.starts_with("+++") || line.starts_with("---") {
                style(line).bold().to_string()
            } else if line.starts_with("@@") {
                style(line).cyan().to_string()
            } else if line.starts_with('+') {
                style(line).green().to_string()
            } else if line.starts_with('-') {
                style(line).red().to_string()
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_changes() {
        assert_eq!(unified_diff("a.txt", "same\n", "same\n"), "No changes detected.");
    }

    #[test]
    fn test_modification_headers_and_lines() {
        let diff = unified_diff("a.txt", "hello\n", "hello\nworld\n");

        assert!(diff.starts_with("--- a/a.txt\n+++ b/a.txt\n"));
        assert!(diff.contains(" hello\n"));
        assert!(diff.contains("+world\n"));
    }

    #[test]
    fn test_new_file_uses_null_source() {
        let diff = unified_diff("new.txt", "", "line\n");

        assert!(diff.starts_with("--- /dev/null\n+++ b/new.txt\n"));
        assert!(diff.contains("+line"));
    }

    #[test]
    fn test_colorize_keeps_text() {
        let colored = colorize("--- a/x\n+++ b/x\n@@ -1 +1 @@\n-a\n+b\n c");
        let plain = strip_ansi_escapes::strip_str(&colored);

        assert_eq!(plain, "--- a/x\n+++ b/x\n@@ -1 +1 @@\n-a\n+b\n c");
    }
}
