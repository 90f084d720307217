//! Tokenizer for GridLAB-D model text.
//!
//! Tokenizing is purely textual: the output is a flat list of string tokens
//! with no kinds attached. Block and statement delimiters (`;`, `{`, `}`) are
//! their own tokens, macro references (`${...}`) are kept whole, and every run
//! of whitespace containing a line break collapses to one [`NEWLINE`] marker.

use std::fs;
use std::io;
use std::path::Path;

/// Marker token standing in for a line break.
pub const NEWLINE: &str = "\n";

/// URL schemes removed before comment stripping (their `//` would read as a comment).
const URL_SCHEMES: &[&str] = &["http://", "https://"];

/// Reads a model file and tokenizes it.
///
/// # Errors
///
/// Returns an `io::Error` if the file cannot be read.
pub fn tokenize_file(path: &Path) -> io::Result<Vec<String>> {
    let text = fs::read_to_string(path)?;
    Ok(tokenize(&text))
}

/// Splits model text into tokens.
///
/// Never fails: any text tokenizes, even if the parser later rejects it.
///
/// # Examples
///
/// ```
/// use glm_manager::glm::token::tokenize;
///
/// let tokens = tokenize("clock {timezone EST;} // trailing");
/// assert_eq!(tokens, vec!["clock", "{", "timezone", "EST", ";", "}"]);
/// ```
pub fn tokenize(input: &str) -> Vec<String> {
    let cleaned = preprocess(input);
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut chars = cleaned.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            ';' | '{' | '}' => {
                flush(&mut word, &mut tokens);
                tokens.push(c.to_string());
            }
            '$' if chars.peek() == Some(&'{') => {
                flush(&mut word, &mut tokens);
                let mut reference = String::from("$");
                for next in chars.by_ref() {
                    reference.push(next);
                    if next == '}' {
                        break;
                    }
                }
                tokens.push(reference);
            }
            c if c.is_whitespace() => {
                flush(&mut word, &mut tokens);
                let mut saw_newline = c == '\n';
                while let Some(&next) = chars.peek() {
                    if !next.is_whitespace() {
                        break;
                    }
                    saw_newline |= next == '\n';
                    chars.next();
                }
                if saw_newline {
                    tokens.push(NEWLINE.to_string());
                }
            }
            c => word.push(c),
        }
    }
    flush(&mut word, &mut tokens);
    tokens
}

/// Removes URL schemes and `//` comments, drops carriage returns and turns
/// tabs into spaces. Line breaks are preserved.
fn preprocess(input: &str) -> String {
    let mut text = input.replace('\r', "").replace('\t', " ");
    for scheme in URL_SCHEMES {
        text = text.replace(scheme, "");
    }

    let mut out = String::with_capacity(text.len());
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        match line.find("//") {
            Some(idx) => out.push_str(&line[..idx]),
            None => out.push_str(line),
        }
    }
    out
}

fn flush(word: &mut String, tokens: &mut Vec<String>) {
    if !word.is_empty() {
        tokens.push(std::mem::take(word));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_delimiters_and_whitespace() {
        let tokens = tokenize("object meter { name m1; phases AB; }");
        assert_eq!(
            tokens,
            vec![
                "object", "meter", "{", "name", "m1", ";", "phases", "AB", ";", "}"
            ]
        );
    }

    #[test]
    fn newline_runs_collapse_to_one_marker() {
        let tokens = tokenize("#set a=1\n\n   \n#set b=2");
        assert_eq!(tokens, vec!["#set", "a=1", NEWLINE, "#set", "b=2"]);
    }

    #[test]
    fn comments_are_stripped_but_line_breaks_kept() {
        let tokens = tokenize("#define X=1 // the x\nmodule tape;");
        assert_eq!(tokens, vec!["#define", "X=1", NEWLINE, "module", "tape", ";"]);
    }

    #[test]
    fn url_schemes_do_not_read_as_comments() {
        let tokens = tokenize("#include http://example.org/feeder.glm;");
        assert_eq!(tokens, vec!["#include", "example.org/feeder.glm", ";"]);
    }

    #[test]
    fn macro_reference_is_a_single_token() {
        let tokens = tokenize("#include \"${DIR}/base.glm\";");
        assert_eq!(tokens, vec!["#include", "\"", "${DIR}", "/base.glm\"", ";"]);
    }

    #[test]
    fn carriage_returns_and_tabs_normalize() {
        let tokens = tokenize("clock {\r\n\ttimezone\tEST;\r\n}");
        assert_eq!(
            tokens,
            vec!["clock", "{", NEWLINE, "timezone", "EST", ";", NEWLINE, "}"]
        );
    }

    #[test]
    fn empty_input_yields_no_tokens() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   // only a comment").is_empty());
    }

    #[test]
    fn tokenize_file_reads_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("tiny.glm");
        fs::write(&path, "module powerflow;").expect("write should succeed");
        let tokens = tokenize_file(&path).expect("tokenize should succeed");
        assert_eq!(tokens, vec!["module", "powerflow", ";"]);
    }
}
