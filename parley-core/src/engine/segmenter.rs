//! Sentence segmentation of a streamed reply.

/// `. ! ? 。 ！ ？` and newline.
pub const DEFAULT_DELIMITERS: &[char] = &['.', '!', '?', '。', '！', '？', '\n'];

/// Accumulates text deltas and cuts a segment at each sentence-terminal
/// character. A run of delimiters (`"?!"`, `"..."`) stays with its sentence.
#[derive(Debug, Clone)]
pub struct SentenceSegmenter {
    delimiters: Vec<char>,
    buffer: String,
}

impl Default for SentenceSegmenter {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITERS)
    }
}

impl SentenceSegmenter {
    pub fn new(delimiters: &[char]) -> Self {
        Self {
            delimiters: delimiters.to_vec(),
            buffer: String::new(),
        }
    }

    /// Append a delta and return every segment it completed, in order.
    /// Whitespace-only pieces are dropped.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buffer.push_str(delta);
        let mut out = Vec::new();
        while let Some(end) = self.next_cut() {
            let rest = self.buffer.split_off(end);
            let segment = std::mem::replace(&mut self.buffer, rest);
            if !segment.trim().is_empty() {
                out.push(segment);
            }
        }
        out
    }

    /// Whatever is left once the stream has ended, if it has content.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest)
        }
    }

    pub fn pending(&self) -> &str {
        &self.buffer
    }

    fn is_delimiter(&self, c: char) -> bool {
        self.delimiters.contains(&c)
    }

    /// Byte offset just past the first delimiter run, if any.
    fn next_cut(&self) -> Option<usize> {
        let mut chars = self.buffer.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if !self.is_delimiter(c) {
                continue;
            }
            let mut end = i + c.len_utf8();
            while let Some(&(j, d)) = chars.peek() {
                if !self.is_delimiter(d) {
                    break;
                }
                end = j + d.len_utf8();
                chars.next();
            }
            return Some(end);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(deltas: &[&str]) -> Vec<String> {
        let mut seg = SentenceSegmenter::default();
        let mut out = Vec::new();
        for d in deltas {
            out.extend(seg.push(d));
        }
        out.extend(seg.finish());
        out
    }

    #[test]
    fn two_sentences_across_four_deltas() {
        assert_eq!(
            run(&["Hello", " world.", " Next", " sentence."]),
            vec!["Hello world.".to_string(), " Next sentence.".to_string()]
        );
    }

    #[test]
    fn segment_is_released_as_soon_as_its_delimiter_arrives() {
        let mut seg = SentenceSegmenter::default();
        assert!(seg.push("Hello").is_empty());
        assert_eq!(seg.push(" world. Next"), vec!["Hello world.".to_string()]);
        assert_eq!(seg.pending(), " Next");
    }

    #[test]
    fn trailing_text_without_delimiter_is_final_segment() {
        assert_eq!(
            run(&["One.", " and two"]),
            vec!["One.".to_string(), " and two".to_string()]
        );
        assert_eq!(run(&["Done.", "   "]), vec!["Done.".to_string()]);
    }

    #[test]
    fn delimiter_runs_and_cjk_punctuation() {
        assert_eq!(
            run(&["Really?!", " 你好。", "再见！"]),
            vec![
                "Really?!".to_string(),
                " 你好。".to_string(),
                "再见！".to_string()
            ]
        );
    }

    #[test]
    fn newline_splits_and_blank_lines_vanish() {
        assert_eq!(
            run(&["line one\n\n", "line two"]),
            vec!["line one\n\n".to_string(), "line two".to_string()]
        );
        assert!(run(&["\n", " \n"]).is_empty());
    }

    #[test]
    fn custom_delimiters() {
        let mut seg = SentenceSegmenter::new(&[';']);
        assert_eq!(seg.push("a. b; c"), vec!["a. b;".to_string()]);
        assert_eq!(seg.finish(), Some(" c".to_string()));
    }
}
