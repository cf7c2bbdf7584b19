//! Deterministic cleanup of model-generated Markdown.
//!
//! Hosted and local VLMs leave the same handful of artefacts behind: outer
//! ```` ```markdown ```` fences, CRLF endings, `<think>` blocks from
//! reasoning models, invented `![figure](chart.png)` links, and tables with a
//! missing or repeated separator row. Each rule below fixes one of them
//! without touching the content itself.
//!
//! Rule order matters: reasoning blocks and fences go first so the rest see
//! the real answer, line endings are normalised before any line-based rule,
//! and the final-newline pass runs last.

use once_cell::sync::Lazy;
use regex::Regex;

type Rule = fn(&str) -> String;

/// Rules applied to every page a VLM returns.
const VLM_RULES: &[Rule] = &[
    strip_reasoning_blocks,
    strip_markdown_fences,
    normalise_line_endings,
    trim_trailing_whitespace,
    collapse_blank_lines,
    normalise_heading_spacing,
    fix_broken_tables,
    remove_mid_table_separators,
    remove_hallucinated_images,
    remove_invisible_chars,
    ensure_final_newline,
];

/// Rules for text pulled from the PDF text layer, which has no markup to repair.
const TEXT_LAYER_RULES: &[Rule] = &[
    normalise_line_endings,
    remove_invisible_chars,
    trim_trailing_whitespace,
    collapse_blank_lines,
    ensure_final_newline,
];

fn apply(rules: &[Rule], input: &str) -> String {
    rules
        .iter()
        .fold(input.to_string(), |text, rule| rule(&text))
}

/// Clean the raw Markdown of one VLM-converted page.
pub fn clean_markdown(input: &str) -> String {
    apply(VLM_RULES, input)
}

/// Clean text-layer output before it is assembled into a document.
pub fn clean_text_layer(input: &str) -> String {
    apply(TEXT_LAYER_RULES, input)
}

// ── Reasoning blocks ─────────────────────────────────────────────────────────

static RE_THINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>\s*").unwrap());

fn strip_reasoning_blocks(input: &str) -> String {
    RE_THINK.replace_all(input, "").into_owned()
}

// ── Outer fences ─────────────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\r?\n(.*)\n```\s*$").unwrap());

fn strip_markdown_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Whitespace ───────────────────────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

/// At most two blank lines in a row.
fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").into_owned()
}

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

// ── Headings ─────────────────────────────────────────────────────────────────

fn is_heading(line: &str) -> bool {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    (1..=6).contains(&hashes) && line[hashes..].starts_with(' ')
}

/// Blank line before every ATX heading except one on the first line.
fn normalise_heading_spacing(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 64);
    for (i, line) in input.lines().enumerate() {
        if i > 0 && is_heading(line) {
            let kept = out.trim_end_matches('\n').len();
            out.truncate(kept);
            out.push_str("\n\n");
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

// ── Tables ───────────────────────────────────────────────────────────────────

fn is_table_row(line: &str) -> bool {
    let t = line.trim();
    t.len() > 2 && t.starts_with('|') && t.ends_with('|')
}

fn is_separator_row(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|') && t.contains('-') && t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

/// Insert a `| --- |` row after a header row that lacks one.
fn fix_broken_tables(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 4);

    for (i, line) in lines.iter().enumerate() {
        out.push(line.to_string());

        let starts_table = is_table_row(line)
            && !is_separator_row(line)
            && !lines
                .get(i.wrapping_sub(1))
                .is_some_and(|prev| i > 0 && is_table_row(prev));
        let next = lines.get(i + 1).copied().unwrap_or("");
        if starts_table && is_table_row(next) && !is_separator_row(next) {
            let columns = line.trim().matches('|').count().saturating_sub(1).max(1);
            out.push(format!("|{}", " --- |".repeat(columns)));
        }
    }

    out.join("\n")
}

/// Keep only the separator directly under the header row.
fn remove_mid_table_separators(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut row_in_table = 0usize;

    for line in input.lines() {
        if is_table_row(line) {
            row_in_table += 1;
            if is_separator_row(line) && row_in_table != 2 {
                continue;
            }
        } else {
            row_in_table = 0;
        }
        out.push(line);
    }

    out.join("\n")
}

// ── Invented image links ─────────────────────────────────────────────────────
//
// A page image has no sibling files, so any relative link a VLM writes is
// invented. Absolute http(s) links outside placeholder hosts and inline
// `data:image/` payloads are kept; the rest become an italic caption.

static RE_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").unwrap());

const PLACEHOLDER_HOSTS: &[&str] = &[
    "example.com",
    "placeholder.com",
    "dummyimage.com",
    "lorempixel.com",
    "picsum.photos",
    "placehold.it",
];

fn is_invented_url(url: &str) -> bool {
    let u = url.trim();
    if u.starts_with("data:image/") {
        return false;
    }
    if !(u.starts_with("http://") || u.starts_with("https://")) {
        return true;
    }
    PLACEHOLDER_HOSTS.iter().any(|h| u.contains(h))
}

fn remove_hallucinated_images(input: &str) -> String {
    RE_IMAGE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            if !is_invented_url(&caps[2]) {
                return caps[0].to_string();
            }
            match caps[1].trim() {
                "" => String::new(),
                alt => format!("*{}*", alt),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences_with_and_without_language() {
        assert_eq!(strip_markdown_fences("```markdown\n# A\nB\n```"), "# A\nB");
        assert_eq!(strip_markdown_fences("```\n# A\n```\n"), "# A");
        assert_eq!(strip_markdown_fences("# A\nB"), "# A\nB");
    }

    #[test]
    fn strips_reasoning_blocks() {
        let input = "<think>\nthe page shows a table\n</think>\n\n# Results";
        assert_eq!(strip_reasoning_blocks(input), "# Results");
    }

    #[test]
    fn whitespace_rules() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
        assert_eq!(trim_trailing_whitespace("  a   \nb  "), "  a\nb");
        assert_eq!(collapse_blank_lines("a\n\n\n\n\n\nb"), "a\n\n\nb");
        assert_eq!(ensure_final_newline("a\n\n\n"), "a\n");
        assert_eq!(ensure_final_newline(""), "\n");
        assert_eq!(remove_invisible_chars("a\u{200B}b\u{FEFF}c\u{00AD}d"), "abcd");
    }

    #[test]
    fn heading_gets_blank_line_before_it() {
        let out = normalise_heading_spacing("intro\n## Methods\nbody");
        assert_eq!(out, "intro\n\n## Methods\nbody\n");
        // `#hashtag` is not a heading
        assert_eq!(normalise_heading_spacing("a\n#tag"), "a\n#tag\n");
    }

    #[test]
    fn missing_table_separator_is_inserted_once() {
        let out = fix_broken_tables("| A | B |\n| 1 | 2 |\n| 3 | 4 |");
        assert_eq!(out, "| A | B |\n| --- | --- |\n| 1 | 2 |\n| 3 | 4 |");
    }

    #[test]
    fn well_formed_table_is_untouched() {
        let table = "| A | B |\n| --- | --- |\n| 1 | 2 |";
        assert_eq!(fix_broken_tables(table), table);
        assert_eq!(remove_mid_table_separators(table), table);
    }

    #[test]
    fn body_separators_are_dropped() {
        let out = remove_mid_table_separators("| A |\n| --- |\n| 1 |\n| --- |\n| 2 |");
        assert_eq!(out, "| A |\n| --- |\n| 1 |\n| 2 |");
    }

    #[test]
    fn invented_images_become_captions() {
        assert_eq!(
            remove_hallucinated_images("x ![Chart](chart.png) y"),
            "x *Chart* y"
        );
        assert_eq!(remove_hallucinated_images("![](image-url)"), "");
        assert_eq!(
            remove_hallucinated_images("![F](https://example.com/f.png)"),
            "*F*"
        );
    }

    #[test]
    fn real_and_inline_images_survive() {
        let real = "![Fig 1](https://arxiv.org/html/fig1.png)";
        assert_eq!(remove_hallucinated_images(real), real);
        let inline = "![Image](data:image/png;base64,iVBORw0KGgo=)";
        assert_eq!(remove_hallucinated_images(inline), inline);
    }

    #[test]
    fn clean_markdown_end_to_end() {
        let input = "```markdown\n# Title\r\n\r\nSome text   \n\n\n\n\n\n## Section\n| A | B |\n| 1 | 2 |\n```";
        let out = clean_markdown(input);
        assert!(out.starts_with("# Title\n"));
        assert!(out.contains("\n\n## Section\n"));
        assert!(out.contains("| --- | --- |"));
        assert!(!out.contains("\n\n\n\n"));
        assert!(out.ends_with("|\n"));
    }

    #[test]
    fn clean_text_layer_keeps_markup_like_text() {
        let out = clean_text_layer("| not a table |\r\n| really |\r\n\r\n\r\n\r\n\r\nend");
        assert_eq!(out, "| not a table |\n| really |\n\n\nend\n");
    }
}
