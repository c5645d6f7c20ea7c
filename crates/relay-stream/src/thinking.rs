/// Where the parser currently is relative to a thinking block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// No start tag seen yet (or no tags configured).
    Idle,
    /// Start tag consumed, end tag not yet seen.
    Thinking,
    /// End tag consumed; everything further goes to `content`.
    Done,
}

/// Single-pass incremental state machine that separates a model's "thinking"
/// segment (bracketed by a configurable start/end tag pair) from its
/// user-facing content, one chunk at a time.
#[derive(Debug, Clone)]
pub struct ThinkingParser {
    start_tag: Option<String>,
    end_tag: Option<String>,
    thoughts: String,
    content: String,
    thinking_started: bool,
    thinking_finished: bool,
}

impl ThinkingParser {
    pub fn new(tags: Option<(String, String)>) -> Self {
        let (start_tag, end_tag) = match tags {
            Some((s, e)) => (Some(s), Some(e)),
            None => (None, None),
        };
        Self {
            start_tag,
            end_tag,
            thoughts: String::new(),
            content: String::new(),
            thinking_started: false,
            thinking_finished: false,
        }
    }

    pub fn thoughts(&self) -> &str {
        &self.thoughts
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn thinking_in_progress(&self) -> bool {
        self.thinking_started && !self.thinking_finished
    }

    pub fn state(&self) -> ParserState {
        if !self.thinking_started {
            ParserState::Idle
        } else if !self.thinking_finished {
            ParserState::Thinking
        } else {
            ParserState::Done
        }
    }

    /// Feed the next chunk of raw text from the backend.
    pub fn append(&mut self, chunk: &str) {
        let thinking_processed = self.process_thinking(chunk);
        if !self.thinking_in_progress() && !thinking_processed {
            self.content.push_str(chunk);
        }
    }

    fn process_thinking(&mut self, chunk: &str) -> bool {
        if self.thinking_finished {
            return false;
        }
        let (Some(start_tag), Some(end_tag)) = (self.start_tag.as_deref(), self.end_tag.as_deref())
        else {
            return false;
        };

        let thinking_start = chunk.find(start_tag).map(|p| p + start_tag.len());
        let thinking_end = chunk.find(end_tag);
        let mut content_start = thinking_end.map(|e| e + end_tag.len());
        if matches!(content_start, Some(c) if c >= chunk.len()) {
            content_start = None;
        }

        let mut chunk_processed = false;

        if let Some(start) = thinking_start {
            match thinking_end {
                Some(end) if end >= start => {
                    self.thoughts.push_str(chunk[start..end].trim());
                }
                Some(_) => {
                    // end tag position precedes the start tag's span (e.g. end
                    // tag text appears earlier in the chunk) — nothing to add.
                }
                None => {
                    self.thoughts.push_str(chunk[start..].trim_start());
                }
            }
            self.thinking_started = true;
            chunk_processed = true;
        }

        if let Some(end) = thinking_end {
            if !chunk_processed {
                self.thoughts.push_str(chunk[..end].trim_end());
                chunk_processed = true;
            }
            self.thinking_finished = true;
        }

        if self.thinking_in_progress() && !chunk_processed {
            self.thoughts.push_str(chunk);
            return true;
        }

        if let Some(start) = content_start {
            self.content.push_str(chunk[start..].trim_start());
            return true;
        }

        chunk_processed
    }
}

/// Render policy for the streaming pipeline: combine thoughts/content per
/// their presence.
pub fn render(parser: &ThinkingParser) -> String {
    let thoughts = parser.thoughts();
    let content = parser.content();
    match (content.is_empty(), thoughts.is_empty()) {
        (false, false) => format!("*{}*\n\n{}", thoughts, content),
        (false, true) => content.to_string(),
        (true, false) => format!("*{}*", thoughts),
        (true, true) => "*Waiting for response...*".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags() -> Option<(String, String)> {
        Some(("<think>".to_string(), "</think>".to_string()))
    }

    #[test]
    fn no_tags_configured_goes_straight_to_content() {
        let mut parser = ThinkingParser::new(None);
        parser.append("hello ");
        parser.append("world");
        assert_eq!(parser.content(), "hello world");
        assert_eq!(parser.thoughts(), "");
    }

    #[test]
    fn start_tag_without_end_tag_leaves_thinking_in_progress() {
        let mut parser = ThinkingParser::new(tags());
        parser.append("<think>pondering");
        assert!(parser.thinking_in_progress());
        assert_eq!(parser.content(), "");
        assert_eq!(parser.thoughts(), "pondering");
    }

    #[test]
    fn both_tags_in_one_chunk() {
        let mut parser = ThinkingParser::new(tags());
        parser.append("<think> deep thought </think>  here's the answer");
        assert!(!parser.thinking_in_progress());
        assert_eq!(parser.thoughts(), "deep thought");
        assert_eq!(parser.content(), "here's the answer");
    }

    #[test]
    fn end_tag_arrives_in_a_later_chunk() {
        let mut parser = ThinkingParser::new(tags());
        parser.append("<think>step one, ");
        parser.append("step two ");
        parser.append("</think>the answer");
        assert_eq!(parser.thoughts(), "step one, step two");
        assert_eq!(parser.content(), "the answer");
    }

    #[test]
    fn split_across_chunks_matches_single_chunk_result() {
        let whole = "<think>because X</think>the answer is Y";
        let mut whole_parser = ThinkingParser::new(tags());
        whole_parser.append(whole);

        let pieces = ["<think>becau", "se X", "</think>the answer is Y"];
        let mut split_parser = ThinkingParser::new(tags());
        for piece in pieces {
            split_parser.append(piece);
        }

        assert_eq!(whole_parser.thoughts(), split_parser.thoughts());
        assert_eq!(whole_parser.content(), split_parser.content());
    }

    #[test]
    fn render_policy_covers_all_four_cases() {
        let mut empty = ThinkingParser::new(tags());
        assert_eq!(render(&empty), "*Waiting for response...*");

        empty.append("<think>hmm");
        assert_eq!(render(&empty), "*hmm*");

        let mut both = ThinkingParser::new(tags());
        both.append("<think>hmm</think>answer");
        assert_eq!(render(&both), "*hmm*\n\nanswer");

        let mut content_only = ThinkingParser::new(None);
        content_only.append("answer");
        assert_eq!(render(&content_only), "answer");
    }
}
