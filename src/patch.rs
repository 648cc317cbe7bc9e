//! # Patch Engine
//!
//! Parses unified-diff text into a [`Patch`] and applies it against a [`FileStore`].
//!
//! Matching is strict: every context and removed line of a hunk must match the file
//! at the expected position (the hunk's declared source line, shifted by the net line
//! delta of earlier hunks in the same file). There is no fuzzy search.
//!
//! Application is all-or-nothing. Every file-diff is computed against a staging
//! buffer first, and the store is only written once all of them have applied cleanly.

use crate::error::PatchError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// Sentinel path marking file creation (as source) or deletion (as target).
pub const NULL_PATH: &str = "/dev/null";

static HUNK_HEADER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("Invalid regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    Context(String),
    Add(String),
    Remove(String),
}

/// A contiguous change region. Line numbers are 1-based as written in the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    pub lines: Vec<HunkLine>,
    /// Set by a `\ No newline at end of file` marker after a removed or context line.
    pub old_missing_newline: bool,
    /// Set by a `\ No newline at end of file` marker after an added or context line.
    pub new_missing_newline: bool,
}

impl Hunk {
    /// Zero-based index of the first source line this hunk touches.
    ///
    /// A hunk with an empty source range inserts *after* line `old_start`.
    pub fn source_index(&self) -> usize {
        if self.old_len == 0 {
            self.old_start
        } else {
            self.old_start - 1
        }
    }

    fn source_end(&self) -> usize {
        self.source_index() + self.old_len
    }

    /// Lines the hunk expects to find in the current file.
    pub fn old_lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|line| match line {
            HunkLine::Context(text) | HunkLine::Remove(text) => Some(text.as_str()),
            HunkLine::Add(_) => None,
        })
    }

    /// Lines the hunk leaves behind once applied.
    pub fn new_lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|line| match line {
            HunkLine::Context(text) | HunkLine::Add(text) => Some(text.as_str()),
            HunkLine::Remove(_) => None,
        })
    }
}

/// All hunks for a single file. `None` paths stand for [`NULL_PATH`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub old_path: Option<String>,
    pub new_path: Option<String>,
    pub hunks: Vec<Hunk>,
}

impl FileDiff {
    pub fn is_creation(&self) -> bool {
        self.old_path.is_none()
    }

    pub fn is_deletion(&self) -> bool {
        self.new_path.is_none()
    }

    /// The path reported to callers: the target, or the source for deletions.
    pub fn display_path(&self) -> &str {
        self.new_path
            .as_deref()
            .or(self.old_path.as_deref())
            .unwrap_or(NULL_PATH)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Patch {
    pub files: Vec<FileDiff>,
}

impl Patch {
    /// Every real (non-sentinel) path named by the patch, sources and targets alike.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths = Vec::new();
        for file in &self.files {
            for path in [&file.old_path, &file.new_path].into_iter().flatten() {
                if !paths.contains(&path.as_str()) {
                    paths.push(path.as_str());
                }
            }
        }
        paths
    }
}

/// Storage the patch is applied against.
///
/// `read` returns `Ok(None)` for a file that does not exist.
pub trait FileStore {
    fn read(&self, path: &str) -> Result<Option<String>, PatchError>;
    fn write(&mut self, path: &str, contents: &str) -> Result<(), PatchError>;
    fn remove(&mut self, path: &str) -> Result<(), PatchError>;
}

/// In-memory store keyed by path.
impl FileStore for BTreeMap<String, String> {
    fn read(&self, path: &str) -> Result<Option<String>, PatchError> {
        Ok(self.get(path).cloned())
    }

    fn write(&mut self, path: &str, contents: &str) -> Result<(), PatchError> {
        self.insert(path.to_string(), contents.to_string());
        Ok(())
    }

    fn remove(&mut self, path: &str) -> Result<(), PatchError> {
        BTreeMap::remove(self, path);
        Ok(())
    }
}

/// Parses unified-diff text.
///
/// Lines before the first `---` header (`diff --git`, `index ...`) are ignored.
pub fn parse(text: &str) -> Result<Patch, PatchError> {
    let lines = split_lines(text);
    let mut files = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if let Some(rest) = line.strip_prefix("--- ") {
            let old_path = header_path(rest, "a/", i + 1)?;
            let new_rest = lines
                .get(i + 1)
                .and_then(|next| next.strip_prefix("+++ "))
                .ok_or_else(|| PatchError::malformed(i + 2, "expected '+++ b/path' after '---' header"))?;
            let new_path = header_path(new_rest, "b/", i + 2)?;
            if old_path.is_none() && new_path.is_none() {
                return Err(PatchError::malformed(i + 1, "both file paths are /dev/null"));
            }
            i += 2;

            let mut hunks: Vec<Hunk> = Vec::new();
            while i < lines.len() && lines[i].starts_with("@@") {
                let header_line = i + 1;
                let (hunk, next) = parse_hunk(&lines, i)?;
                if let Some(previous) = hunks.last() {
                    if hunk.source_index() < previous.source_end() {
                        return Err(PatchError::malformed(
                            header_line,
                            format!(
                                "hunk {} overlaps or precedes hunk {}",
                                hunks.len() + 1,
                                hunks.len()
                            ),
                        ));
                    }
                }
                hunks.push(hunk);
                i = next;
            }
            if hunks.is_empty() {
                return Err(PatchError::malformed(i + 1, "file diff has no hunks"));
            }
            files.push(FileDiff {
                old_path,
                new_path,
                hunks,
            });
        } else if line.starts_with("+++ ") {
            return Err(PatchError::malformed(i + 1, "'+++' header without preceding '---'"));
        } else if line.starts_with("@@") {
            return Err(PatchError::malformed(i + 1, "hunk header before file headers"));
        } else if !files.is_empty() && (line.starts_with('+') || line.starts_with('-')) {
            return Err(PatchError::malformed(i + 1, "change line outside of any hunk"));
        } else {
            i += 1;
        }
    }

    if files.is_empty() {
        return Err(PatchError::malformed(1, "no '--- a/path' / '+++ b/path' headers found"));
    }
    Ok(Patch { files })
}

/// Splits on `\n` only, so a `\r` stays part of its line and CRLF files still match.
fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    let body = text.strip_suffix('\n').unwrap_or(text);
    body.split('\n').collect()
}

fn header_path(rest: &str, prefix: &str, line: usize) -> Result<Option<String>, PatchError> {
    // Drop a tab-separated timestamp as emitted by `diff -u`.
    let raw = rest.split('\t').next().unwrap_or_default().trim_end();
    if raw == NULL_PATH {
        return Ok(None);
    }
    let path = raw.strip_prefix(prefix).unwrap_or(raw);
    if path.is_empty() {
        return Err(PatchError::malformed(line, "empty file path in header"));
    }
    Ok(Some(path.to_string()))
}

fn parse_number(text: Option<regex::Match<'_>>, default: usize, line: usize) -> Result<usize, PatchError> {
    match text {
        Some(m) => m
            .as_str()
            .parse()
            .map_err(|_| PatchError::malformed(line, format!("line number '{}' out of range", m.as_str()))),
        None => Ok(default),
    }
}

fn parse_hunk(lines: &[&str], start: usize) -> Result<(Hunk, usize), PatchError> {
    let header = lines[start];
    let header_line = start + 1;
    let caps = HUNK_HEADER_REGEX.captures(header).ok_or_else(|| {
        PatchError::malformed(header_line, format!("invalid hunk header '{}'", header.trim_end()))
    })?;

    let old_start = parse_number(caps.get(1), 0, header_line)?;
    let old_len = parse_number(caps.get(2), 1, header_line)?;
    let new_start = parse_number(caps.get(3), 0, header_line)?;
    let new_len = parse_number(caps.get(4), 1, header_line)?;
    if old_len > 0 && old_start == 0 {
        return Err(PatchError::malformed(header_line, "source range starts at line 0"));
    }
    // Keeps `source_end` and the signed offsets used while applying free of overflow.
    let fits = |start: usize, len: usize| start.checked_add(len).is_some_and(|end| end <= isize::MAX as usize);
    if !fits(old_start, old_len) || !fits(new_start, new_len) {
        return Err(PatchError::malformed(header_line, "hunk range exceeds the maximum line number"));
    }

    let mut hunk = Hunk {
        old_start,
        old_len,
        new_start,
        new_len,
        lines: Vec::new(),
        old_missing_newline: false,
        new_missing_newline: false,
    };
    let mut remaining_old = old_len;
    let mut remaining_new = new_len;
    let mut i = start + 1;

    while remaining_old > 0 || remaining_new > 0 {
        let Some(&line) = lines.get(i) else {
            return Err(PatchError::malformed(
                i + 1,
                format!(
                    "hunk ended early: {remaining_old} source and {remaining_new} target lines missing"
                ),
            ));
        };
        let mut chars = line.chars();
        let tag = chars.next();
        let text = chars.as_str().to_string();
        match tag {
            // Some generators strip the single space of an empty context line.
            None | Some(' ') => {
                if remaining_old == 0 || remaining_new == 0 {
                    return Err(PatchError::malformed(i + 1, "hunk has more lines than its header declares"));
                }
                remaining_old -= 1;
                remaining_new -= 1;
                hunk.lines.push(HunkLine::Context(text));
            }
            Some('-') => {
                if remaining_old == 0 {
                    return Err(PatchError::malformed(i + 1, "hunk removes more lines than its header declares"));
                }
                remaining_old -= 1;
                hunk.lines.push(HunkLine::Remove(text));
            }
            Some('+') => {
                if remaining_new == 0 {
                    return Err(PatchError::malformed(i + 1, "hunk adds more lines than its header declares"));
                }
                remaining_new -= 1;
                hunk.lines.push(HunkLine::Add(text));
            }
            Some('\\') => mark_missing_newline(&mut hunk, i + 1)?,
            Some(_) => {
                return Err(PatchError::malformed(
                    i + 1,
                    format!("unexpected line in hunk body: '{line}'"),
                ));
            }
        }
        i += 1;
    }

    while i < lines.len() && lines[i].starts_with('\\') {
        mark_missing_newline(&mut hunk, i + 1)?;
        i += 1;
    }

    Ok((hunk, i))
}

fn mark_missing_newline(hunk: &mut Hunk, line: usize) -> Result<(), PatchError> {
    match hunk.lines.last() {
        Some(HunkLine::Context(_)) => {
            hunk.old_missing_newline = true;
            hunk.new_missing_newline = true;
        }
        Some(HunkLine::Remove(_)) => hunk.old_missing_newline = true,
        Some(HunkLine::Add(_)) => hunk.new_missing_newline = true,
        None => return Err(PatchError::malformed(line, "'\\' marker without a preceding line")),
    }
    Ok(())
}

/// Applies every file-diff of `patch` to `store` and returns the applied paths in order.
///
/// Nothing is written unless every file-diff applies cleanly.
pub fn apply<S: FileStore + ?Sized>(patch: &Patch, store: &mut S) -> Result<Vec<String>, PatchError> {
    let mut staged = Staging::default();
    let mut applied = Vec::with_capacity(patch.files.len());

    for file in &patch.files {
        let current = match (&file.old_path, &file.new_path) {
            (None, Some(new_path)) => {
                if staged.read(&*store, new_path)?.is_some() {
                    return Err(PatchError::AlreadyExists {
                        path: new_path.clone(),
                    });
                }
                String::new()
            }
            (Some(old_path), _) => staged
                .read(&*store, old_path)?
                .ok_or_else(|| PatchError::MissingFile {
                    path: old_path.clone(),
                })?,
            (None, None) => continue,
        };

        let patched = apply_file(file, &current)?;

        match (&file.old_path, &file.new_path) {
            (Some(old_path), None) => {
                if !patched.is_empty() {
                    return Err(PatchError::Conflict {
                        path: old_path.clone(),
                        hunk: file.hunks.len(),
                    });
                }
                staged.stage(old_path, None);
            }
            (Some(old_path), Some(new_path)) if old_path != new_path => {
                staged.stage(new_path, Some(patched));
                staged.stage(old_path, None);
            }
            (_, Some(new_path)) => staged.stage(new_path, Some(patched)),
            (None, None) => {}
        }
        applied.push(file.display_path().to_string());
    }

    staged.commit(store)?;
    Ok(applied)
}

/// Pending changes in first-touched order; `None` means remove.
#[derive(Default)]
struct Staging {
    changes: Vec<(String, Option<String>)>,
}

impl Staging {
    fn read<S: FileStore + ?Sized>(&self, store: &S, path: &str) -> Result<Option<String>, PatchError> {
        match self.changes.iter().find(|(p, _)| p == path) {
            Some((_, change)) => Ok(change.clone()),
            None => store.read(path),
        }
    }

    fn stage(&mut self, path: &str, change: Option<String>) {
        match self.changes.iter_mut().find(|(p, _)| p == path) {
            Some(entry) => entry.1 = change,
            None => self.changes.push((path.to_string(), change)),
        }
    }

    fn commit<S: FileStore + ?Sized>(self, store: &mut S) -> Result<(), PatchError> {
        for (path, change) in self.changes {
            match change {
                Some(contents) => store.write(&path, &contents)?,
                None => store.remove(&path)?,
            }
        }
        Ok(())
    }
}

fn apply_file(file: &FileDiff, current: &str) -> Result<String, PatchError> {
    let path = file.display_path();
    let mut lines: Vec<String> = split_lines(current).into_iter().map(String::from).collect();
    let mut trailing_newline = current.is_empty() || current.ends_with('\n');
    let mut offset: isize = 0;

    for (index, hunk) in file.hunks.iter().enumerate() {
        let conflict = || PatchError::Conflict {
            path: path.to_string(),
            hunk: index + 1,
        };

        let Some(start) = (hunk.source_index() as isize)
            .checked_add(offset)
            .and_then(|start| usize::try_from(start).ok())
        else {
            return Err(conflict());
        };
        let Some(end) = start.checked_add(hunk.old_len).filter(|end| *end <= lines.len()) else {
            return Err(conflict());
        };
        if !lines[start..end].iter().map(String::as_str).eq(hunk.old_lines()) {
            return Err(conflict());
        }

        let replacement: Vec<String> = hunk.new_lines().map(String::from).collect();
        offset += replacement.len() as isize - hunk.old_len as isize;
        lines.splice(start..end, replacement);

        if hunk.new_missing_newline {
            trailing_newline = false;
        } else if hunk.old_missing_newline {
            trailing_newline = true;
        }
    }

    if lines.is_empty() {
        return Ok(String::new());
    }
    let mut result = lines.join("\n");
    if trailing_newline {
        result.push('\n');
    }
    Ok(result)
}
