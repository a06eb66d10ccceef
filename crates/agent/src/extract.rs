//! Code extraction from model responses.

use regex_lite::Regex;

/// Fence tags recognised when none are configured.
pub const DEFAULT_LANGUAGES: &[&str] = &["python3", "python", "py"];

/// What a response contained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Text before the first tagged fence, trimmed.
    pub description: String,

    /// Bodies of every tagged fence, in order.
    pub code_blocks: Vec<String>,
}

impl Extraction {
    pub fn has_code(&self) -> bool {
        !self.code_blocks.is_empty()
    }
}

/// Finds fenced code blocks tagged with one of a set of languages.
#[derive(Debug, Clone)]
pub struct CodeExtractor {
    pattern: Regex,
}

impl CodeExtractor {
    /// Build an extractor for the given fence tags. Blank tags are ignored;
    /// an empty list falls back to [`DEFAULT_LANGUAGES`].
    pub fn new<S: AsRef<str>>(languages: &[S]) -> Self {
        let mut tags: Vec<&str> = languages
            .iter()
            .map(|l| l.as_ref().trim())
            .filter(|l| !l.is_empty())
            .collect();
        if tags.is_empty() {
            tags = DEFAULT_LANGUAGES.to_vec();
        }
        // Sorted so duplicates sit together for dedup.
        tags.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        tags.dedup();

        let alternation = tags
            .iter()
            .map(|t| regex_lite::escape(t))
            .collect::<Vec<_>>()
            .join("|");
        // The tag must end at whitespace, so "py" does not claim "```pycon".
        let pattern = format!(r"(?s)```(?:{alternation})(?:[ \t]+\r?\n?|\r?\n)(.*?)```");

        Self {
            pattern: Regex::new(&pattern).expect("fence tags are escaped"),
        }
    }

    pub fn extract(&self, response: &str) -> Extraction {
        let mut description = None;
        let mut code_blocks = Vec::new();

        for caps in self.pattern.captures_iter(response) {
            let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if description.is_none() {
                description = Some(response[..whole.start()].trim().to_string());
            }
            code_blocks.push(body.as_str().to_string());
        }

        Extraction {
            description: description.unwrap_or_default(),
            code_blocks,
        }
    }
}

impl Default for CodeExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_LANGUAGES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_block_and_description() {
        let response = "Prints one to five.\n\n```python\nfor i in range(1, 6):\n    print(i)\n```\nDone.";
        let extraction = CodeExtractor::default().extract(response);
        assert_eq!(extraction.description, "Prints one to five.");
        assert_eq!(extraction.code_blocks, vec!["for i in range(1, 6):\n    print(i)\n"]);
    }

    #[test]
    fn no_fence_yields_nothing() {
        let extraction = CodeExtractor::default().extract("I cannot help with that.");
        assert!(!extraction.has_code());
        assert!(extraction.description.is_empty());
    }

    #[test]
    fn untagged_and_foreign_fences_are_ignored() {
        let response = "```\nplain\n```\n```rust\nfn main() {}\n```";
        assert!(!CodeExtractor::default().extract(response).has_code());
    }

    #[test]
    fn multiple_blocks_in_order() {
        let response = "intro\n```python\na = 1\n```\nmiddle\n```py\nb = 2\n```";
        let extraction = CodeExtractor::default().extract(response);
        assert_eq!(extraction.description, "intro");
        assert_eq!(extraction.code_blocks, vec!["a = 1\n", "b = 2\n"]);
    }

    #[test]
    fn longest_tag_wins() {
        let extraction = CodeExtractor::default().extract("```python3\nprint(3)\n```");
        assert_eq!(extraction.code_blocks, vec!["print(3)\n"]);
    }

    #[test]
    fn same_line_body_is_kept() {
        let extraction = CodeExtractor::default().extract("```python print(1)```");
        assert_eq!(extraction.code_blocks, vec!["print(1)"]);
    }

    #[test]
    fn tag_must_end_at_whitespace() {
        let extractor = CodeExtractor::default();
        assert!(!extractor.extract("```pycon\n>>> 1 + 1\n2\n```").has_code());
        assert!(!extractor.extract("```pyspark\ndf.show()\n```").has_code());

        let extraction = extractor.extract("```pycon\n>>> x\n```\nThen:\n```py\nx = 1\n```");
        assert_eq!(extraction.code_blocks, vec!["x = 1\n"]);
    }

    #[test]
    fn crlf_after_tag_is_stripped() {
        let extraction = CodeExtractor::default().extract("```python\r\nprint(1)\r\n```");
        assert_eq!(extraction.code_blocks, vec!["print(1)\r\n"]);
    }

    #[test]
    fn unterminated_fence_is_not_a_block() {
        assert!(!CodeExtractor::default().extract("```python\nprint(1)\n").has_code());
    }

    #[test]
    fn custom_languages() {
        let extractor = CodeExtractor::new(&["sh", " "]);
        let extraction = extractor.extract("run it:\n```sh\necho hi\n```\n```python\nx\n```");
        assert_eq!(extraction.code_blocks, vec!["echo hi\n"]);
        assert_eq!(extraction.description, "run it:");
    }

    #[test]
    fn empty_language_list_uses_defaults() {
        let extractor = CodeExtractor::new::<&str>(&[]);
        assert!(extractor.extract("```py\nx\n```").has_code());
    }
}
