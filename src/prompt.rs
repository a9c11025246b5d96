//! Generation prompt assembly.
//!
//! A pure function from retrieved context, conversation history, and the
//! question to the prompt string handed to a [`Generator`]. Identical
//! inputs always produce byte-identical prompts; nothing here mutates its
//! arguments or consults ambient state.
//!
//! [`Generator`]: crate::generate::Generator

use crate::models::{ConversationTurn, DocumentChunk};

/// Number of trailing history turns included in a prompt.
pub const HISTORY_TURNS: usize = 3;

/// Build the generation prompt.
///
/// Chunk texts are concatenated in the order received — the retriever's
/// similarity ranking — each under a header naming its source and date.
/// At most the last [`HISTORY_TURNS`] turns are rendered, oldest first.
pub fn build_prompt(
    chunks: &[DocumentChunk],
    question: &str,
    history: &[ConversationTurn],
) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "You are an assistant that answers questions strictly from the provided context.\n\
         If the context does not contain the answer, say that you do not know.\n\n",
    );

    prompt.push_str("Context:\n");
    for chunk in chunks {
        prompt.push_str(&format!("[source: {}, date: {}]\n", chunk.id, chunk.date));
        prompt.push_str(&chunk.text);
        prompt.push_str("\n\n");
    }

    let start = history.len().saturating_sub(HISTORY_TURNS);
    let recent = &history[start..];
    if !recent.is_empty() {
        prompt.push_str("Conversation so far:\n");
        for turn in recent {
            prompt.push_str(&format!("Q: {}\nA: {}\n", turn.question, turn.answer));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("Question:\n{}\n", question));

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;

    fn chunk(id: &str, text: &str) -> DocumentChunk {
        DocumentChunk {
            id: id.to_string(),
            source_path: format!("data/{}", id),
            source_type: SourceType::Text,
            date: "2024-01-01".to_string(),
            chunk_index: 0,
            text: text.to_string(),
        }
    }

    fn turn(q: &str, a: &str) -> ConversationTurn {
        ConversationTurn {
            question: q.to_string(),
            answer: a.to_string(),
        }
    }

    #[test]
    fn identical_inputs_produce_identical_prompts() {
        let chunks = vec![chunk("a.txt_chunk0", "alpha"), chunk("b.txt_chunk0", "beta")];
        let history = vec![turn("q1", "a1")];

        let p1 = build_prompt(&chunks, "what is alpha?", &history);
        let p2 = build_prompt(&chunks, "what is alpha?", &history);
        assert_eq!(p1, p2);
    }

    #[test]
    fn chunks_appear_in_ranked_order() {
        let chunks = vec![chunk("best.txt_chunk0", "FIRST"), chunk("next.txt_chunk0", "SECOND")];
        let prompt = build_prompt(&chunks, "q", &[]);

        let first = prompt.find("FIRST").unwrap();
        let second = prompt.find("SECOND").unwrap();
        assert!(first < second);
    }

    #[test]
    fn history_capped_to_last_three_oldest_first() {
        let history: Vec<ConversationTurn> = (0..5)
            .map(|i| turn(&format!("q{}", i), &format!("a{}", i)))
            .collect();
        let prompt = build_prompt(&[], "q", &history);

        assert!(!prompt.contains("q0"));
        assert!(!prompt.contains("q1"));
        let p2 = prompt.find("q2").unwrap();
        let p3 = prompt.find("q3").unwrap();
        let p4 = prompt.find("q4").unwrap();
        assert!(p2 < p3 && p3 < p4);
    }

    #[test]
    fn question_and_metadata_present() {
        let chunks = vec![chunk("notes.md_chunk2", "content")];
        let prompt = build_prompt(&chunks, "the actual question", &[]);
        assert!(prompt.contains("the actual question"));
        assert!(prompt.contains("[source: notes.md_chunk2, date: 2024-01-01]"));
    }

    #[test]
    fn no_history_section_when_empty() {
        let prompt = build_prompt(&[], "q", &[]);
        assert!(!prompt.contains("Conversation so far"));
    }
}
