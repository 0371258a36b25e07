use super::{Pass, PassContext, is_live};
use crate::capability::Capability;
use crate::error::PassError;
use crate::text::{first_sentence, keywords, truncate_chars};

pub const KEYWORD_LIMIT: usize = 5;
const HINT_TITLE_CHARS: usize = 60;

/// Retrieval hints: `keywords`, `token_estimate`, `embedding_hint`.
pub struct EmbeddingMetadata;

impl Capability for EmbeddingMetadata {
    fn name(&self) -> &'static str {
        "embedding-metadata"
    }
}

impl Pass for EmbeddingMetadata {
    fn run(&self, cx: &mut PassContext<'_>) -> Result<(), PassError> {
        let frozen = cx.frozen;
        for block in cx.blocks.blocks_mut() {
            if !is_live(frozen, block.chapter.as_ref()) {
                continue;
            }
            let text = match block.title() {
                Some(title) => format!("{} {}", title, block.body),
                None => block.body.clone(),
            };
            let words = keywords(&text, KEYWORD_LIMIT);
            let title = block
                .title()
                .or(block.meta("section"))
                .map(str::to_string)
                .unwrap_or_else(|| first_sentence(&block.body));
            let hint = format!(
                "{}/{}/{}",
                block.block_type(),
                block.chapter.as_ref().map(|c| c.as_str()).unwrap_or("-"),
                truncate_chars(&title, HINT_TITLE_CHARS)
            );
            let tokens = block.body.chars().count().div_ceil(4);

            if !words.is_empty() {
                block.set_meta("keywords", words.join(", "));
            }
            block.set_meta("token_estimate", tokens.to_string());
            block.set_meta("embedding_hint", hint);
        }
        Ok(())
    }
}
