//! Context assembly.
//!
//! Renders a snapshot, plus any fetched file bodies, into the single text
//! block handed to the model. Sections appear in a fixed order that puts the
//! highest-signal information first:
//!
//! | # | Section | Cap |
//! |---|---------|-----|
//! | 1 | header (name, description, language, counts, topics) | |
//! | 2 | languages | top 5 by bytes |
//! | 3 | file structure | 30 important files, 15 top-level dirs |
//! | 4 | README excerpt | 2000 chars |
//! | 5 | contributing excerpt | 1000 chars |
//! | 6 | good first / help wanted / recent issues | 5 / 5 / 10 |
//! | 7 | open pull requests | 5 |
//! | 8 | file contents, or a no-files notice | |
//!
//! A section whose data is empty is left out entirely. Output is a pure
//! function of its inputs.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;

use crate::models::{EntryKind, FileEntry, IssueSummary, PullRequestSummary, RepositorySnapshot};
use crate::snapshot::truncate_chars;

pub const MAX_LANGUAGES: usize = 5;
pub const MAX_IMPORTANT_FILES: usize = 30;
pub const MAX_TOP_LEVEL_DIRS: usize = 15;
pub const README_EXCERPT_CHARS: usize = 2000;
pub const CONTRIBUTING_EXCERPT_CHARS: usize = 1000;
pub const MAX_GOOD_FIRST_ISSUES: usize = 5;
pub const MAX_HELP_WANTED_ISSUES: usize = 5;
pub const MAX_RECENT_ISSUES: usize = 10;
pub const ISSUE_EXCERPT_CHARS: usize = 150;
pub const MAX_PULL_REQUESTS: usize = 5;

pub const GOOD_FIRST_ISSUES_HEADING: &str = "## Good First Issues";
pub const HELP_WANTED_HEADING: &str = "## Help Wanted Issues";
pub const RECENT_ISSUES_HEADING: &str = "## Recent Open Issues";
pub const PULL_REQUESTS_HEADING: &str = "## Open Pull Requests";
pub const FILE_CONTENTS_HEADING: &str = "## File Contents";

const NO_FILES_NOTICE: &str = "## File Contents\n\
No file contents were fetched for this question. Do not invent, guess, or reconstruct code. \
Answer from the repository information above, and say so when reading the source would be \
needed to answer precisely.";

/// Document names matched case-insensitively by prefix.
const DOC_PREFIXES: &[&str] = &["readme", "contributing", "changelog", "license"];

/// Manifest and tooling files matched by exact name.
const MANIFEST_NAMES: &[&str] = &[
    "package.json",
    "tsconfig.json",
    "jsconfig.json",
    ".eslintrc",
    ".eslintrc.js",
    ".eslintrc.json",
    "eslint.config.js",
    ".prettierrc",
    "vite.config.ts",
    "vite.config.js",
    "webpack.config.js",
    "next.config.js",
    "next.config.mjs",
    "babel.config.js",
    "Cargo.toml",
    "pyproject.toml",
    "setup.py",
    "requirements.txt",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "Gemfile",
    "composer.json",
    "Makefile",
    "CMakeLists.txt",
    "Dockerfile",
    "docker-compose.yml",
];

static ENTRY_POINT: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"^(main|index|app|server|cli|lib)\.(rs|go|py|js|jsx|ts|tsx|mjs|java|rb|c|cpp)$")
        .case_insensitive(true)
        .build()
        .expect("valid regex")
});

static CI_WORKFLOW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\.github/workflows/[^/]+\.ya?ml$").expect("valid regex"));

/// Whether a file belongs in the "important files" list.
pub fn is_important_file(entry: &FileEntry) -> bool {
    if !entry.is_file() {
        return false;
    }
    let name = entry.name();
    let lower = name.to_lowercase();
    DOC_PREFIXES.iter().any(|p| lower.starts_with(p))
        || MANIFEST_NAMES.contains(&name)
        || ENTRY_POINT.is_match(name)
        || CI_WORKFLOW.is_match(&entry.path)
}

/// Assemble the model context for one question.
///
/// `files` maps path to (already truncated) body; an empty map yields the
/// no-files notice instead of a contents section.
pub fn assemble_context(snapshot: &RepositorySnapshot, files: &BTreeMap<String, String>) -> String {
    let sections = [
        Some(header(snapshot)),
        languages(snapshot),
        file_structure(snapshot),
        excerpt("## README", snapshot.readme.as_deref(), README_EXCERPT_CHARS),
        excerpt(
            "## Contributing Guide",
            snapshot.contributing.as_deref(),
            CONTRIBUTING_EXCERPT_CHARS,
        ),
        issue_section(
            GOOD_FIRST_ISSUES_HEADING,
            snapshot
                .issues
                .iter()
                .filter(|i| i.has_label_containing("good first issue")),
            MAX_GOOD_FIRST_ISSUES,
        ),
        issue_section(
            HELP_WANTED_HEADING,
            snapshot
                .issues
                .iter()
                .filter(|i| i.has_label_containing("help wanted")),
            MAX_HELP_WANTED_ISSUES,
        ),
        issue_section(RECENT_ISSUES_HEADING, snapshot.issues.iter(), MAX_RECENT_ISSUES),
        pull_requests(&snapshot.pull_requests),
        Some(file_contents(files)),
    ];

    sections.into_iter().flatten().collect::<Vec<_>>().join("\n\n")
}

fn header(snapshot: &RepositorySnapshot) -> String {
    let meta = &snapshot.metadata;
    let mut out = format!(
        "# Repository: {}\nURL: {}\nDescription: {}\nPrimary language: {}\nStars: {} | Forks: {} | Open issues: {}",
        meta.full_name,
        meta.url,
        meta.description.as_deref().unwrap_or("No description"),
        meta.language.as_deref().unwrap_or("Unknown"),
        meta.stars,
        meta.forks,
        meta.open_issues,
    );
    if !meta.topics.is_empty() {
        let topics: Vec<&str> = meta.topics.iter().map(|t| t.as_str()).collect();
        out.push_str(&format!("\nTopics: {}", topics.join(", ")));
    }
    out
}

fn languages(snapshot: &RepositorySnapshot) -> Option<String> {
    let total: u64 = snapshot.languages.values().sum();
    if total == 0 {
        return None;
    }

    let mut ranked: Vec<(&String, &u64)> = snapshot.languages.iter().collect();
    // BTreeMap order breaks ties by name
    ranked.sort_by(|a, b| b.1.cmp(a.1));

    let lines: Vec<String> = ranked
        .into_iter()
        .take(MAX_LANGUAGES)
        .map(|(name, bytes)| format!("- {}: {:.1}%", name, *bytes as f64 * 100.0 / total as f64))
        .collect();
    Some(format!("## Languages\n{}", lines.join("\n")))
}

fn file_structure(snapshot: &RepositorySnapshot) -> Option<String> {
    let important: Vec<&str> = snapshot
        .file_tree
        .iter()
        .filter(|e| is_important_file(e))
        .take(MAX_IMPORTANT_FILES)
        .map(|e| e.path.as_str())
        .collect();
    let top_dirs: Vec<&str> = snapshot
        .file_tree
        .iter()
        .filter(|e| e.kind == EntryKind::Directory && !e.path.contains('/'))
        .take(MAX_TOP_LEVEL_DIRS)
        .map(|e| e.path.as_str())
        .collect();

    if important.is_empty() && top_dirs.is_empty() {
        return None;
    }

    let mut out = String::from("## File Structure");
    if !important.is_empty() {
        out.push_str("\nKey files:");
        for path in important {
            out.push_str(&format!("\n- {}", path));
        }
    }
    if !top_dirs.is_empty() {
        out.push_str("\nTop-level directories:");
        for dir in top_dirs {
            out.push_str(&format!("\n- {}/", dir));
        }
    }
    Some(out)
}

fn excerpt(heading: &str, text: Option<&str>, max: usize) -> Option<String> {
    let text = text?.trim();
    if text.is_empty() {
        return None;
    }
    Some(format!("{}\n{}", heading, truncate_chars(text, max)))
}

/// Body flattened to one line and capped at [`ISSUE_EXCERPT_CHARS`].
pub fn one_line_excerpt(body: &str) -> String {
    let flat = body.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&flat, ISSUE_EXCERPT_CHARS)
}

fn issue_section<'a>(
    heading: &str,
    issues: impl Iterator<Item = &'a IssueSummary>,
    max: usize,
) -> Option<String> {
    let rendered: Vec<String> = issues.take(max).map(render_issue).collect();
    if rendered.is_empty() {
        return None;
    }
    Some(format!("{}\n{}", heading, rendered.join("\n")))
}

fn render_issue(issue: &IssueSummary) -> String {
    let labels = if issue.labels.is_empty() {
        "none".to_string()
    } else {
        issue.labels.join(", ")
    };
    let mut out = format!(
        "- #{} {}\n  Link: {}\n  Labels: {} | Comments: {}",
        issue.number, issue.title, issue.url, labels, issue.comments
    );
    if let Some(body) = issue.body.as_deref() {
        let line = one_line_excerpt(body);
        if !line.is_empty() {
            out.push_str(&format!("\n  Summary: {}", line));
        }
    }
    out
}

fn pull_requests(prs: &[PullRequestSummary]) -> Option<String> {
    if prs.is_empty() {
        return None;
    }
    let rendered: Vec<String> = prs
        .iter()
        .take(MAX_PULL_REQUESTS)
        .map(|pr| {
            format!(
                "- #{} {}{}\n  Link: {}\n  Author: @{}",
                pr.number,
                pr.title,
                if pr.draft { " [draft]" } else { "" },
                pr.url,
                pr.author
            )
        })
        .collect();
    Some(format!("{}\n{}", PULL_REQUESTS_HEADING, rendered.join("\n")))
}

fn fence_language(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext,
        _ => "",
    }
}

fn file_contents(files: &BTreeMap<String, String>) -> String {
    if files.is_empty() {
        return NO_FILES_NOTICE.to_string();
    }
    let mut out = String::from(FILE_CONTENTS_HEADING);
    for (path, body) in files {
        out.push_str(&format!(
            "\n\n### {}\n```{}\n{}\n```",
            path,
            fence_language(path),
            body.trim_end()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn important_file_patterns() {
        let yes = [
            "README.md",
            "docs/CONTRIBUTING.md",
            "LICENSE-MIT",
            "package.json",
            "Cargo.toml",
            "src/main.rs",
            "src/index.tsx",
            "app.py",
            ".github/workflows/ci.yml",
        ];
        for path in yes {
            assert!(is_important_file(&FileEntry::file(path, None)), "{}", path);
        }
        let no = ["src/util.rs", "docs/guide.md", "packages.json", "main.txt"];
        for path in no {
            assert!(!is_important_file(&FileEntry::file(path, None)), "{}", path);
        }
        assert!(!is_important_file(&FileEntry::directory("README")));
    }

    #[test]
    fn excerpt_flattens_and_caps() {
        let body = format!("line one\r\nline two\n\n{}", "x".repeat(400));
        let line = one_line_excerpt(&body);
        assert!(!line.contains('\n'));
        assert!(line.starts_with("line one line two "));
        assert_eq!(line.chars().count(), ISSUE_EXCERPT_CHARS);
    }

    #[test]
    fn fence_language_from_extension() {
        assert_eq!(fence_language("src/lib.rs"), "rs");
        assert_eq!(fence_language("Makefile"), "");
        assert_eq!(fence_language(".env"), "");
        assert_eq!(fence_language("a.b/c"), "");
    }

    fn issue(number: u64, labels: &[&str]) -> IssueSummary {
        IssueSummary {
            number,
            title: format!("Issue {}", number),
            body: Some("body".to_string()),
            labels: labels.iter().map(|s| s.to_string()).collect(),
            author: "a".to_string(),
            created_at: chrono::Utc::now(),
            comments: 0,
            url: format!("https://github.com/o/r/issues/{}", number),
        }
    }

    fn overfull_snapshot() -> RepositorySnapshot {
        use crate::models::{RepoKey, RepoMetadata};

        let mut file_tree = Vec::new();
        for i in 0..20 {
            file_tree.push(FileEntry::directory(format!("d{:02}", i)));
            file_tree.push(FileEntry::directory(format!("d{:02}/nested", i)));
        }
        for i in 0..35 {
            file_tree.push(FileEntry::file(format!("pkg{:02}/package.json", i), Some(10)));
            file_tree.push(FileEntry::file(format!("pkg{:02}/util.js", i), Some(10)));
        }

        let mut issues = Vec::new();
        for n in 1..=6 {
            issues.push(issue(n, &["good first issue"]));
        }
        for n in 7..=12 {
            issues.push(issue(n, &["help wanted"]));
        }

        let pull_requests = (1..=7)
            .map(|n| PullRequestSummary {
                number: 100 + n,
                title: format!("PR {}", n),
                body: None,
                author: "b".to_string(),
                created_at: chrono::Utc::now(),
                url: format!("https://github.com/o/r/pull/{}", 100 + n),
                draft: false,
            })
            .collect();

        RepositorySnapshot {
            key: RepoKey::new("o", "r"),
            metadata: RepoMetadata {
                full_name: "o/r".to_string(),
                url: "https://github.com/o/r".to_string(),
                default_branch: "main".to_string(),
                description: None,
                language: Some("Rust".to_string()),
                topics: Default::default(),
                stars: 1,
                forks: 0,
                open_issues: 12,
            },
            languages: (0..7u64)
                .map(|i| (format!("Lang{}", i), (7 - i) * 100))
                .collect(),
            readme: Some("q".repeat(5000)),
            contributing: Some("z".repeat(1500)),
            file_tree,
            issues,
            pull_requests,
            indexed_at: chrono::Utc::now(),
        }
    }

    /// Text of the section under `heading`, up to the next `## ` heading.
    fn section<'a>(context: &'a str, heading: &str) -> &'a str {
        let start = context
            .find(&format!("{}\n", heading))
            .unwrap_or_else(|| panic!("missing {}", heading));
        let rest = &context[start + heading.len()..];
        let end = rest.find("\n\n## ").unwrap_or(rest.len());
        &rest[..end]
    }

    fn entries(section: &str) -> usize {
        section.lines().filter(|l| l.starts_with("- #")).count()
    }

    #[test]
    fn every_section_respects_its_cap() {
        let files = BTreeMap::from([("src/lib.rs".to_string(), "pub fn a() {}".to_string())]);
        let context = assemble_context(&overfull_snapshot(), &files);

        let langs = section(&context, "## Languages");
        assert_eq!(langs.lines().filter(|l| l.starts_with("- ")).count(), MAX_LANGUAGES);
        assert!(langs.contains("Lang0"));
        assert!(!langs.contains("Lang5"));

        let structure = section(&context, "## File Structure");
        let (key_files, dirs) = structure.split_once("\nTop-level directories:").unwrap();
        let key_count = key_files.lines().filter(|l| l.starts_with("- ")).count();
        assert_eq!(key_count, MAX_IMPORTANT_FILES);
        assert!(!key_files.contains("util.js"));
        let dir_lines: Vec<&str> = dirs.lines().filter(|l| l.starts_with("- ")).collect();
        assert_eq!(dir_lines.len(), MAX_TOP_LEVEL_DIRS);
        assert!(dir_lines.iter().all(|l| !l.contains("nested")));

        assert!(context.contains(&"q".repeat(README_EXCERPT_CHARS)));
        assert!(!context.contains(&"q".repeat(README_EXCERPT_CHARS + 1)));
        assert!(context.contains(&"z".repeat(CONTRIBUTING_EXCERPT_CHARS)));
        assert!(!context.contains(&"z".repeat(CONTRIBUTING_EXCERPT_CHARS + 1)));

        assert_eq!(entries(section(&context, GOOD_FIRST_ISSUES_HEADING)), MAX_GOOD_FIRST_ISSUES);
        assert_eq!(entries(section(&context, HELP_WANTED_HEADING)), MAX_HELP_WANTED_ISSUES);
        assert_eq!(entries(section(&context, RECENT_ISSUES_HEADING)), MAX_RECENT_ISSUES);
        assert_eq!(entries(section(&context, PULL_REQUESTS_HEADING)), MAX_PULL_REQUESTS);
    }

    #[test]
    fn sections_appear_in_fixed_order() {
        let files = BTreeMap::from([("src/lib.rs".to_string(), "pub fn a() {}".to_string())]);
        let context = assemble_context(&overfull_snapshot(), &files);

        let headings = [
            "# Repository: ",
            "\n## Languages\n",
            "\n## File Structure\n",
            "\n## README\n",
            "\n## Contributing Guide\n",
            "\n## Good First Issues\n",
            "\n## Help Wanted Issues\n",
            "\n## Recent Open Issues\n",
            "\n## Open Pull Requests\n",
            "\n## File Contents\n",
        ];
        let offsets: Vec<usize> = headings
            .iter()
            .map(|h| context.find(h).unwrap_or_else(|| panic!("missing {:?}", h)))
            .collect();
        assert_eq!(offsets[0], 0);
        assert!(
            offsets.windows(2).all(|w| w[0] < w[1]),
            "sections out of order: {:?}",
            offsets
        );
    }

    #[test]
    fn empty_files_yield_notice() {
        let notice = file_contents(&BTreeMap::new());
        assert!(notice.starts_with(FILE_CONTENTS_HEADING));
        assert!(notice.contains("Do not invent"));
    }
}
