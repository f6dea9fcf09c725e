// ============================================================
// Layer 4 — Utterance Preprocessor
// ============================================================
// Transcribed dialogue carries a lot of noise that should not
// reach the tokenizer:
//   - typographic quotes and dashes from subtitle files
//   - non-breaking / zero-width spaces
//   - stray control characters and line breaks inside a turn
//
// Cleaning steps (applied in order):
//   1. Map typographic punctuation to ASCII
//   2. Map every whitespace or control character to a space
//   3. Collapse runs of spaces and trim

pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Normalise one utterance to a single clean line
    pub fn clean(&self, text: &str) -> String {
        let mut out        = String::with_capacity(text.len());
        let mut last_space = true;

        for c in text.chars() {
            let c = match c {
                '\u{2018}' | '\u{2019}' | '\u{0092}' => '\'',
                '\u{201C}' | '\u{201D}' => '"',
                '\u{2013}' | '\u{2014}' | '\u{0097}' => '-',
                '\u{00A0}' | '\u{200B}' | '\u{FEFF}' => ' ',
                c if c.is_whitespace() || c.is_control() => ' ',
                c => c,
            };

            if c == ' ' {
                if !last_space {
                    out.push(' ');
                }
                last_space = true;
            } else {
                out.push(c);
                last_space = false;
            }
        }

        out.trim_end().to_string()
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}
