//! Pluggable handler strategies for the non-`ai_interaction` task types.

pub mod file_edit;
pub mod generation;
pub mod planning;
pub mod validation;

use std::sync::OnceLock;

use regex::Regex;

pub use file_edit::FileEditHandler;
pub use generation::GenerationHandler;
pub use planning::PlanningHandler;
pub use validation::ValidationHandler;

fn fence_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```([A-Za-z0-9_+.-]*)[ \t]*\r?\n(.*?)\r?\n?```").ok())
        .as_ref()
}

/// Body of the first fenced block, preferring one tagged `lang`.
pub fn extract_fenced(text: &str, lang: Option<&str>) -> Option<String> {
    let blocks: Vec<(String, String)> = fence_re()?
        .captures_iter(text)
        .map(|c| {
            (
                c.get(1).map(|m| m.as_str().to_ascii_lowercase()).unwrap_or_default(),
                c.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
            )
        })
        .collect();

    if let Some(lang) = lang {
        if let Some((_, body)) = blocks.iter().find(|(tag, _)| tag == lang) {
            return Some(body.clone());
        }
    }
    blocks.into_iter().next().map(|(_, body)| body)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_tagged_block_first() {
        let text = "intro\n```text\nnotes\n```\nthen\n```rust\nfn main() {}\n```\n";
        assert_eq!(extract_fenced(text, Some("rust")).as_deref(), Some("fn main() {}"));
        assert_eq!(extract_fenced(text, None).as_deref(), Some("notes"));
        assert_eq!(extract_fenced("no fences", None), None);
    }
}
