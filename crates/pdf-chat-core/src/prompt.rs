//! Prompt composition for grounded and ungrounded answers.
//!
//! With retrieved context, the prompt tells the model to answer from that
//! context only, lists the chunks in rank order between numbered
//! delimiters, and ends with the question. Without context the prompt is
//! the bare question.
//!
//! ```text
//! Answer the question based only on the following document content. ...
//!
//! --- context 1 ---
//! <best chunk>
//! --- context 2 ---
//! <second chunk>
//! --- end of context ---
//!
//! Question: <question>
//! ```

/// Instruction placed at the top of every grounded prompt.
pub const GROUNDING_INSTRUCTION: &str = "Answer the question based only on the following \
document content. If the content does not contain the answer, say that you do not know.";

/// Build the generator prompt from ranked context chunks and a question.
pub fn compose_prompt<S: AsRef<str>>(context: &[S], question: &str) -> String {
    if context.is_empty() {
        return question.to_string();
    }

    let body_len: usize = context.iter().map(|c| c.as_ref().len() + 24).sum();
    let mut prompt =
        String::with_capacity(GROUNDING_INSTRUCTION.len() + body_len + question.len() + 48);
    prompt.push_str(GROUNDING_INSTRUCTION);
    prompt.push_str("\n\n");
    for (i, chunk) in context.iter().enumerate() {
        prompt.push_str(&format!("--- context {} ---\n", i + 1));
        let chunk = chunk.as_ref();
        prompt.push_str(chunk);
        if !chunk.ends_with('\n') {
            prompt.push('\n');
        }
    }
    prompt.push_str("--- end of context ---\n\nQuestion: ");
    prompt.push_str(question);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_context_is_bare_question() {
        let none: [&str; 0] = [];
        assert_eq!(compose_prompt(&none, "What is Rust?"), "What is Rust?");
    }

    #[test]
    fn test_grounded_prompt_layout() {
        let prompt = compose_prompt(&["first chunk", "second chunk"], "Why?");
        let expected = format!(
            "{}\n\n--- context 1 ---\nfirst chunk\n--- context 2 ---\nsecond chunk\n--- end of context ---\n\nQuestion: Why?",
            GROUNDING_INSTRUCTION
        );
        assert_eq!(prompt, expected);
    }

    #[test]
    fn test_context_precedes_question_in_rank_order() {
        let context = vec!["BBBB".to_string(), "AAAA".to_string()];
        let prompt = compose_prompt(&context, "Which block?");
        let b = prompt.find("BBBB").unwrap();
        let a = prompt.find("AAAA").unwrap();
        let q = prompt.find("Question: Which block?").unwrap();
        assert!(b < a && a < q);
        assert!(prompt.starts_with(GROUNDING_INSTRUCTION));
    }

    #[test]
    fn test_chunks_are_embedded_verbatim() {
        let chunks =
            crate::chunk::chunk_text("d", "Refunds take 14 days.  Shipping is free.", 23, 0)
                .unwrap();
        let first = chunks[0].text.as_str();
        assert_eq!(first, "Refunds take 14 days.  ");

        let prompt = compose_prompt(&[first, "ends with newline\n"], "How long?");
        assert!(prompt.contains("--- context 1 ---\nRefunds take 14 days.  \n--- context 2 ---"));
        assert!(prompt.contains("ends with newline\n--- end of context ---"));
    }
}
