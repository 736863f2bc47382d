//! Readability segmentation of a script into subtitle cues.
//!
//! Words are never split. A cue holds at most `max_lines_per_cue` lines of at
//! most `max_chars_per_line` characters and at most `max_words_per_cue` words.
//! A sentence end always closes the cue; clause punctuation closes it once it
//! is at least half full. A single word longer than a line gets a line of its
//! own.

use reelsmith_common::config::SubtitleConfig;

/// Display limits for one cue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CuePolicy {
    pub max_chars_per_line: usize,
    pub max_lines_per_cue: usize,
    pub max_words_per_cue: usize,
}

impl Default for CuePolicy {
    fn default() -> Self {
        Self::from(&SubtitleConfig::default())
    }
}

impl From<&SubtitleConfig> for CuePolicy {
    fn from(config: &SubtitleConfig) -> Self {
        Self {
            max_chars_per_line: config.max_chars_per_line.max(1),
            max_lines_per_cue: config.max_lines_per_cue.max(1),
            max_words_per_cue: config.max_words_per_cue.max(1),
        }
    }
}

impl CuePolicy {
    fn char_capacity(&self) -> usize {
        self.max_chars_per_line * self.max_lines_per_cue
    }
}

/// How a cue's last word ends, used for pause priors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Sentence,
    Clause,
    Word,
}

impl Boundary {
    fn of(word: &str) -> Self {
        let trimmed = word.trim_end_matches(['"', '\'', ')', ']', '”', '’']);
        match trimmed.chars().last() {
            Some('.' | '!' | '?' | '…') => Self::Sentence,
            Some(',' | ';' | ':' | '—' | '–') => Self::Clause,
            _ => Self::Word,
        }
    }
}

/// One cue's text before timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueText {
    pub lines: Vec<String>,
    /// Index of the cue's first word in the whitespace-split script.
    pub first_word: usize,
    pub word_count: usize,
    pub boundary: Boundary,
}

impl CueText {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Characters excluding whitespace.
    pub fn visible_chars(&self) -> usize {
        self.lines
            .iter()
            .flat_map(|l| l.split_whitespace())
            .map(|w| w.chars().count())
            .sum()
    }
}

/// Split `script` into cues according to `policy`.
///
/// Empty or whitespace-only scripts produce no cues.
pub fn segment(script: &str, policy: &CuePolicy) -> Vec<CueText> {
    let mut builder = CueBuilder::new(*policy);
    for (index, word) in script.split_whitespace().enumerate() {
        builder.push(index, word);
    }
    builder.finish()
}

struct CueBuilder {
    policy: CuePolicy,
    cues: Vec<CueText>,
    lines: Vec<String>,
    line: String,
    line_chars: usize,
    cue_chars: usize,
    first_word: usize,
    word_count: usize,
    last_boundary: Boundary,
}

impl CueBuilder {
    fn new(policy: CuePolicy) -> Self {
        Self {
            policy,
            cues: Vec::new(),
            lines: Vec::new(),
            line: String::new(),
            line_chars: 0,
            cue_chars: 0,
            first_word: 0,
            word_count: 0,
            last_boundary: Boundary::Word,
        }
    }

    fn push(&mut self, index: usize, word: &str) {
        let word_chars = word.chars().count();

        if self.word_count >= self.policy.max_words_per_cue {
            self.flush();
        }

        if self.word_count > 0 {
            let fits_line = self.line_chars + 1 + word_chars <= self.policy.max_chars_per_line;
            if !fits_line {
                if self.lines.len() + 1 < self.policy.max_lines_per_cue {
                    self.break_line();
                } else {
                    self.flush();
                }
            }
        }

        if self.word_count == 0 {
            self.first_word = index;
        }
        if !self.line.is_empty() {
            self.line.push(' ');
            self.line_chars += 1;
        }
        self.line.push_str(word);
        self.line_chars += word_chars;
        self.cue_chars += word_chars;
        self.word_count += 1;
        self.last_boundary = Boundary::of(word);

        match self.last_boundary {
            Boundary::Sentence => self.flush(),
            Boundary::Clause if self.cue_chars * 2 >= self.policy.char_capacity() => self.flush(),
            _ => {}
        }
    }

    fn break_line(&mut self) {
        if !self.line.is_empty() {
            self.lines.push(std::mem::take(&mut self.line));
        }
        self.line_chars = 0;
    }

    fn flush(&mut self) {
        self.break_line();
        if self.word_count > 0 {
            self.cues.push(CueText {
                lines: std::mem::take(&mut self.lines),
                first_word: self.first_word,
                word_count: self.word_count,
                boundary: self.last_boundary,
            });
        }
        self.lines.clear();
        self.cue_chars = 0;
        self.word_count = 0;
        self.last_boundary = Boundary::Word;
    }

    fn finish(mut self) -> Vec<CueText> {
        self.flush();
        self.cues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn texts(cues: &[CueText]) -> Vec<String> {
        cues.iter().map(CueText::text).collect()
    }

    #[test]
    fn test_short_sentence_is_one_cue_on_two_lines() {
        let cues = segment(
            "This is a short test sentence for subtitle timing.",
            &CuePolicy::default(),
        );
        assert_eq!(cues.len(), 1);
        assert_eq!(
            cues[0].lines,
            vec![
                "This is a short test sentence for".to_string(),
                "subtitle timing.".to_string()
            ]
        );
        assert_eq!(cues[0].boundary, Boundary::Sentence);
        assert_eq!(cues[0].word_count, 9);
    }

    #[test]
    fn test_sentence_end_closes_cue() {
        let cues = segment("Hi there. How are you?", &CuePolicy::default());
        assert_eq!(texts(&cues), vec!["Hi there.", "How are you?"]);
        assert_eq!(cues[1].first_word, 2);
    }

    #[test]
    fn test_word_limit_is_respected() {
        let policy = CuePolicy {
            max_chars_per_line: 100,
            max_lines_per_cue: 1,
            max_words_per_cue: 3,
        };
        let cues = segment("one two three four five six seven", &policy);
        assert_eq!(
            texts(&cues),
            vec!["one two three", "four five six", "seven"]
        );
    }

    #[test]
    fn test_long_word_gets_own_line_unsplit() {
        let policy = CuePolicy {
            max_chars_per_line: 5,
            max_lines_per_cue: 1,
            max_words_per_cue: 10,
        };
        let cues = segment("a supercalifragilistic b", &policy);
        assert_eq!(texts(&cues), vec!["a", "supercalifragilistic", "b"]);
    }

    #[test]
    fn test_clause_breaks_only_when_half_full() {
        let policy = CuePolicy {
            max_chars_per_line: 20,
            max_lines_per_cue: 1,
            max_words_per_cue: 10,
        };
        let early = segment("So, we left the party early", &policy);
        assert_eq!(early[0].lines[0], "So, we left the");

        let late = segment("After the party, we left", &policy);
        assert_eq!(texts(&late), vec!["After the party,", "we left"]);
    }

    #[test]
    fn test_quoted_sentence_end_is_detected() {
        assert_eq!(Boundary::of("\"Really?\""), Boundary::Sentence);
        assert_eq!(Boundary::of("(yes),"), Boundary::Clause);
        assert_eq!(Boundary::of("word"), Boundary::Word);
    }

    #[test]
    fn test_empty_script_has_no_cues() {
        assert!(segment("   \n\t ", &CuePolicy::default()).is_empty());
    }

    proptest! {
        #[test]
        fn prop_segmentation_preserves_words_and_limits(
            words in proptest::collection::vec("[a-zA-Z]{1,12}[.,!?]?", 1..80),
            max_chars in 8usize..50,
            max_lines in 1usize..3,
            max_words in 1usize..12,
        ) {
            let policy = CuePolicy {
                max_chars_per_line: max_chars,
                max_lines_per_cue: max_lines,
                max_words_per_cue: max_words,
            };
            let script = words.join(" ");
            let cues = segment(&script, &policy);

            let rejoined = cues
                .iter()
                .flat_map(|c| c.lines.iter().flat_map(|l| l.split_whitespace()))
                .collect::<Vec<_>>()
                .join(" ");
            prop_assert_eq!(rejoined, script);

            let mut next_word = 0;
            for cue in &cues {
                prop_assert_eq!(cue.first_word, next_word);
                next_word += cue.word_count;
                prop_assert!(cue.word_count <= max_words);
                prop_assert!(cue.lines.len() <= max_lines);
                for line in &cue.lines {
                    let single_word = !line.contains(' ');
                    prop_assert!(single_word || line.chars().count() <= max_chars);
                }
            }
        }
    }
}
