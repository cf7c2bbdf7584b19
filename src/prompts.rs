//! Prompts sent with page images.
//!
//! Small local models (InternVL, Qwen-VL on LM Studio) do best with a
//! one-line instruction; hosted models follow a longer checklist. The
//! provider backend additionally gets a structured system prompt.
//! All of them can be overridden through [`crate::BatchConfig`].

/// User prompt for local models served over an OpenAI-compatible API.
pub const OCR_PAGE_PROMPT: &str = "OCR the full page to markdown.";

/// User prompt for hosted models.
pub const DOCUMENT_TO_MARKDOWN_PROMPT: &str = "Convert the following document to Markdown, including: \
1. the complete text content \
2. mathematical formulas (in LaTeX) \
3. figure and table captions with their references \
4. table contents \
5. any other important information";

/// Default system prompt for the provider backend.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an expert document converter. Convert the PDF page image to clean, well-structured Markdown.

Follow these rules precisely:

1. TEXT
   - Preserve ALL text content completely and accurately
   - Keep the reading order a human would follow (columns left to right)

2. STRUCTURE
   - Use # for the page title (at most one per page), ## and ### for sections
   - Use - for unordered lists and 1. 2. 3. for ordered lists, keeping nesting
   - Use **bold** and *italic* to match visual emphasis

3. TABLES
   - Convert tables to GFM pipe format
   - Fall back to HTML table markup when cells span rows or columns

4. FORMULAS
   - Write mathematics in LaTeX: $inline$ and $$display$$

5. FIGURES
   - Keep figure captions and their numbering as plain text
   - Do NOT invent image links

6. IGNORE
   - Page numbers, running headers and footers, decorative rules

7. OUTPUT
   - Output ONLY the Markdown content
   - Do NOT wrap it in ```markdown fences
   - Do NOT add commentary"#;

/// Context message carrying the previous page when `maintain_format` is on.
pub fn maintain_format_context(prior_page: &str) -> String {
    format!(
        "Markdown must maintain consistent formatting with the following page:\n\n\"\"\"{}\"\"\"",
        prior_page
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosted_prompt_lists_every_item() {
        for needle in ["text content", "LaTeX", "captions", "table contents", "important"] {
            assert!(DOCUMENT_TO_MARKDOWN_PROMPT.contains(needle), "missing {needle}");
        }
    }

    #[test]
    fn context_wraps_prior_page() {
        let ctx = maintain_format_context("# Page 1");
        assert!(ctx.ends_with("\"\"\"# Page 1\"\"\""));
    }
}
