//! Markdown cleaning: strips images and empty links, collapses blank runs,
//! and trims whitespace. Idempotent: `clean(clean(x)) == clean(x)`.

use once_cell::sync::Lazy;
use regex::Regex;

static IMAGE_MARKDOWN: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[.*?\]\(.*?\)").unwrap());
static IMAGE_HTML: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<img[^>]*>").unwrap());
static EMPTY_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\]\([^)]*\)").unwrap());
static BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n\s*\n+").unwrap());

/// Clean raw markdown into the stored form: no images, no image-links,
/// collapsed blank runs, trimmed lines, trimmed leading/trailing blanks.
pub fn clean_markdown(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let mut text = IMAGE_MARKDOWN.replace_all(raw, "").into_owned();
    text = IMAGE_HTML.replace_all(&text, "").into_owned();
    text = EMPTY_LINK.replace_all(&text, "").into_owned();
    text = BLANK_RUN.replace_all(&text, "\n\n").into_owned();

    let mut lines: Vec<&str> = text.lines().map(|line| line.trim_end()).collect();
    while lines.first().is_some_and(|l| l.trim().is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }

    lines.join("\n")
}

/// Extract a title from metadata (`title` / `og:title`), falling back to
/// the first markdown `# ` heading.
pub fn extract_title(meta_title: Option<&str>, meta_og_title: Option<&str>, markdown: &str) -> Option<String> {
    if let Some(t) = meta_title.filter(|t| !t.trim().is_empty()) {
        return Some(t.trim().to_string());
    }
    if let Some(t) = meta_og_title.filter(|t| !t.trim().is_empty()) {
        return Some(t.trim().to_string());
    }
    markdown
        .lines()
        .find(|line| line.trim_start().starts_with("# "))
        .map(|line| line.trim_start().trim_start_matches("# ").trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_images() {
        assert_eq!(clean_markdown("before ![alt](img.png) after"), "before  after");
    }

    #[test]
    fn strips_html_images() {
        assert_eq!(clean_markdown("before <img src=\"x.png\"> after"), "before  after");
    }

    #[test]
    fn strips_empty_links() {
        assert_eq!(clean_markdown("before [](http://x) after"), "before  after");
    }

    #[test]
    fn collapses_blank_runs() {
        let input = "a\n\n\n\n\nb";
        assert_eq!(clean_markdown(input), "a\n\nb");
    }

    #[test]
    fn trims_leading_and_trailing_blank_lines() {
        assert_eq!(clean_markdown("\n\n  a  \n\n"), "a");
    }

    #[test]
    fn is_idempotent() {
        let input = "# Title\n\n![img](x.png)\n\nBody text.   \n\n\n\nMore.\n\n";
        let once = clean_markdown(input);
        let twice = clean_markdown(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn title_prefers_metadata_then_heading() {
        assert_eq!(
            extract_title(Some("Meta Title"), None, "# Heading"),
            Some("Meta Title".to_string())
        );
        assert_eq!(
            extract_title(None, Some("OG Title"), "# Heading"),
            Some("OG Title".to_string())
        );
        assert_eq!(extract_title(None, None, "# Heading\nBody"), Some("Heading".to_string()));
        assert_eq!(extract_title(None, None, "no heading here"), None);
    }
}
