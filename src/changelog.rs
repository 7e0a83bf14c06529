//! "What's new" notes reported after an update has been applied.

use serde::Serialize;

const CHANGELOG: &str = include_str!("../CHANGELOG.md");

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangelogEntry {
    pub category: String,
    pub items: Vec<String>,
}

/// Extract the changelog section for a specific version.
///
/// Finds the `## [version]` header and returns everything until the next
/// `## [` header or end of file. Returns `None` if the version isn't found.
fn extract_version_section(changelog: &str, version: &str) -> Option<String> {
    let target = format!("## [{version}]");
    let mut lines = changelog.lines();

    lines.find(|line| line.trim().starts_with(&target))?;

    let mut section = String::new();
    for line in lines {
        if line.trim().starts_with("## [") {
            break;
        }
        section.push_str(line);
        section.push('\n');
    }

    let trimmed = section.trim();
    if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}

/// Parse a changelog section body into structured entries grouped by category.
fn parse_changelog_sections(md: &str) -> Vec<ChangelogEntry> {
    let mut entries: Vec<ChangelogEntry> = Vec::new();
    let mut current_category: Option<String> = None;
    let mut current_items: Vec<String> = Vec::new();

    for line in md.lines() {
        let trimmed = line.trim();
        if let Some(header) = trimmed.strip_prefix("### ") {
            if let Some(cat) = current_category.take()
                && !current_items.is_empty()
            {
                entries.push(ChangelogEntry {
                    category: cat,
                    items: std::mem::take(&mut current_items),
                });
            }
            current_category = Some(header.trim().to_string());
        } else if let Some(item) = trimmed.strip_prefix("- ") {
            current_items.push(item.to_string());
        }
    }

    if let Some(cat) = current_category
        && !current_items.is_empty()
    {
        entries.push(ChangelogEntry { category: cat, items: current_items });
    }
    entries
}

/// Categorised notes for `version` from the bundled CHANGELOG, empty if it has none.
pub fn whats_new(version: &str) -> Vec<ChangelogEntry> {
    extract_version_section(CHANGELOG, version)
        .map(|section| parse_changelog_sections(&section))
        .unwrap_or_default()
}
