//! Prompt assembly.

use std::fmt::Write as _;

use grove_index::RetrievalCandidate;
use grove_llm::Message;

pub const SYSTEM_PROMPT: &str = "You are an expert assistant for a software repository. \
Answer the user's question using the provided repository context and conversation \
history. Cite file paths when you rely on them. If the context does not contain the \
answer, say so instead of guessing. Format the answer in Markdown.";

const CONTEXT_OMITTED: &str = "Note: repository context, conversation history and file \
content were omitted from this request. Answer from general knowledge and say that \
repository context was unavailable.";

/// A file the user is looking at, included verbatim in the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub path: String,
    pub content: String,
}

/// Everything a full prompt is built from.
#[derive(Debug, Default)]
pub struct PromptInput<'a> {
    pub history: &'a str,
    pub file: Option<&'a FileContent>,
    pub context: &'a [RetrievalCandidate],
    pub query: &'a str,
}

/// System message plus one user message carrying history, file, context and query.
#[must_use]
pub fn build_prompt(input: &PromptInput<'_>) -> Vec<Message> {
    let mut body = String::new();

    if !input.history.trim().is_empty() {
        let _ = write!(
            body,
            "<conversation_history>\n{}</conversation_history>\n\n",
            input.history
        );
    }

    if let Some(file) = input.file {
        let _ = write!(
            body,
            "<currentFileContent path=\"{}\">\n{}\n</currentFileContent>\n\n",
            file.path, file.content
        );
    }

    if !input.context.is_empty() {
        body.push_str("<context>\n");
        for candidate in input.context {
            let _ = write!(
                body,
                "## File Path: {}\n\n{}\n\n",
                candidate.document.metadata().file_path,
                candidate.document.text()
            );
        }
        body.push_str("</context>\n\n");
    }

    let _ = write!(body, "<query>\n{}\n</query>", input.query);

    vec![Message::system(SYSTEM_PROMPT), Message::user(body)]
}

/// Fallback prompt: the query alone, with a note that context was dropped.
#[must_use]
pub fn build_reduced_prompt(query: &str) -> Vec<Message> {
    vec![
        Message::system(SYSTEM_PROMPT),
        Message::user(format!("{CONTEXT_OMITTED}\n\n<query>\n{query}\n</query>")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_index::{Document, DocumentMetadata};
    use grove_llm::Role;
    use proptest::prelude::*;

    fn candidate(path: &str, text: &str) -> RetrievalCandidate {
        RetrievalCandidate {
            document: Document::new(path, text, DocumentMetadata::new(path)),
            score: 1.0,
        }
    }

    #[test]
    fn full_prompt_sections_in_order() {
        let file = FileContent {
            path: "src/main.rs".into(),
            content: "fn main() {}".into(),
        };
        let context = vec![candidate("src/auth.rs", "fn login() {}")];
        let messages = build_prompt(&PromptInput {
            history: "<turn>\n<user>hi</user>\n<assistant>hello</assistant>\n</turn>\n",
            file: Some(&file),
            context: &context,
            query: "how does login work?",
        });

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        let body = &messages[1].content;
        let history = body.find("<conversation_history>").unwrap();
        let file_at = body.find("<currentFileContent path=\"src/main.rs\">").unwrap();
        let context_at = body.find("## File Path: src/auth.rs").unwrap();
        let query_at = body.find("<query>\nhow does login work?\n</query>").unwrap();
        assert!(history < file_at && file_at < context_at && context_at < query_at);
    }

    #[test]
    fn empty_sections_are_left_out() {
        let messages = build_prompt(&PromptInput {
            query: "q",
            ..PromptInput::default()
        });
        let body = &messages[1].content;
        assert!(!body.contains("<conversation_history>"));
        assert!(!body.contains("<context>"));
        assert!(!body.contains("<currentFileContent"));
        assert!(body.ends_with("<query>\nq\n</query>"));
    }

    #[test]
    fn reduced_prompt_drops_context() {
        let messages = build_reduced_prompt("what is this?");
        let body = &messages[1].content;
        assert!(body.contains("omitted"));
        assert!(body.contains("what is this?"));
        assert!(!body.contains("<context>"));
    }

    proptest! {
        #[test]
        fn query_always_closes_the_prompt(
            query in "[a-zA-Z0-9 ?]{1,60}",
            history in "[a-z ]{0,40}",
        ) {
            let context = vec![candidate("a.md", "alpha")];
            let messages = build_prompt(&PromptInput {
                history: &history,
                file: None,
                context: &context,
                query: &query,
            });
            let expected = format!("<query>\n{query}\n</query>");
            prop_assert!(messages[1].content.ends_with(&expected));
            prop_assert_eq!(messages[0].content.as_str(), SYSTEM_PROMPT);
        }
    }
}
