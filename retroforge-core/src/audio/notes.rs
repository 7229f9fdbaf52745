//! Note-token grammar and note-to-frequency conversion (§4.5).
//!
//! A token is `[octave][name][accidental?][length]`: octave is a single digit
//! `'0'..'9'` (default 4 when omitted), name is one of `C D E F G A B`, an optional
//! `#` raises it a semitone, and length is the trailing digit `'1'..'9'` in beats
//! (default 1 when omitted — a token ends as soon as the grammar is satisfied).
//! The literal letter `R` is a rest. Unknown tokens parse as a rest of length 1 so
//! playback can silently consume one beat rather than aborting the sequence.

/// One parsed note-sequence token.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Token {
    /// A rest lasting `length` beats.
    Rest { length: u32 },
    /// A pitched note at `freq_hz` lasting `length` beats.
    Note { freq_hz: f64, length: u32 },
}

/// Frequency in Hz of a given octave/semitone-offset pair, per
/// `440 * 2^((octave-4)*12 + (offset-9)) / 12`.
pub fn note_to_freq(octave: i32, offset: i32) -> f64 {
    440.0 * 2f64.powf(((octave - 4) * 12 + (offset - 9)) as f64 / 12.0)
}

fn note_offset(name: char) -> Option<i32> {
    match name {
        'C' => Some(0),
        'D' => Some(2),
        'E' => Some(4),
        'F' => Some(5),
        'G' => Some(7),
        'A' => Some(9),
        'B' => Some(11),
        _ => None,
    }
}

/// Parse a single token string, e.g. `"4C#2"` or `"R3"`. Returns a rest of length 1
/// for anything that does not match the grammar.
pub fn parse_token(token: &str) -> Token {
    let chars: Vec<char> = token.chars().collect();
    if chars.is_empty() {
        return Token::Rest { length: 1 };
    }

    if chars.len() >= 1 && chars[0].eq_ignore_ascii_case(&'R') {
        let length = chars
            .get(1)
            .and_then(|c| c.to_digit(10))
            .filter(|d| (1..=9).contains(d))
            .unwrap_or(1);
        return Token::Rest { length };
    }

    let mut idx = 0usize;
    let octave = if chars.first().is_some_and(|c| c.is_ascii_digit()) {
        let d = chars[0].to_digit(10).unwrap() as i32;
        idx += 1;
        d
    } else {
        4
    };

    let Some(&name_char) = chars.get(idx) else {
        return Token::Rest { length: 1 };
    };
    let Some(base_offset) = note_offset(name_char.to_ascii_uppercase()) else {
        return Token::Rest { length: 1 };
    };
    idx += 1;

    let mut offset = base_offset;
    if chars.get(idx) == Some(&'#') {
        offset += 1;
        idx += 1;
    }

    // The length digit is optional: a bare "4A" is a valid one-beat A4, not a rest.
    // A trailing character that *is* present but isn't a `1..=9` digit is still
    // malformed and falls back to a rest, same as any other unrecognized token.
    let length = match chars.get(idx) {
        None => 1,
        Some(c) => match c.to_digit(10) {
            Some(d) if (1..=9).contains(&d) => d,
            _ => return Token::Rest { length: 1 },
        },
    };

    Token::Note {
        freq_hz: note_to_freq(octave, offset),
        length,
    }
}

/// Parses a note token and returns its frequency directly, ignoring length —
/// `None` for a rest or unrecognized token. Satisfies §8 invariant 6's literal
/// `noteToFreq("4A") == 440.0` / `noteToFreq("5A") == 880.0` contract, which is
/// stated in terms of the token string rather than the pre-split octave/offset
/// pair that [`note_to_freq`] takes.
pub fn note_to_freq_token(token: &str) -> Option<f64> {
    match parse_token(token) {
        Token::Note { freq_hz, .. } => Some(freq_hz),
        Token::Rest { .. } => None,
    }
}

/// Parse a whitespace-separated sequence of tokens.
pub fn parse_sequence(tokens: &str) -> Vec<Token> {
    tokens.split_whitespace().map(parse_token).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn middle_a_is_440() {
        assert!((note_to_freq(4, 9) - 440.0).abs() < 1e-9);
    }

    #[test]
    fn octave_up_doubles_frequency() {
        let a4 = note_to_freq(4, 9);
        let a5 = note_to_freq(5, 9);
        assert!((a5 - a4 * 2.0).abs() < 1e-6);
    }

    #[test]
    fn parses_default_octave_and_length() {
        match parse_token("C4") {
            Token::Note { freq_hz, length } => {
                assert!((freq_hz - note_to_freq(4, 0)).abs() < 1e-9);
                assert_eq!(length, 4);
            }
            _ => panic!("expected a note"),
        }
    }

    #[test]
    fn parses_explicit_octave_and_sharp() {
        match parse_token("5C#3") {
            Token::Note { freq_hz, length } => {
                assert!((freq_hz - note_to_freq(5, 1)).abs() < 1e-9);
                assert_eq!(length, 3);
            }
            _ => panic!("expected a note"),
        }
    }

    #[test]
    fn rest_token_parses_with_length() {
        assert_eq!(parse_token("R3"), Token::Rest { length: 3 });
        assert_eq!(parse_token("R"), Token::Rest { length: 1 });
    }

    #[test]
    fn unknown_token_is_a_one_beat_rest() {
        assert_eq!(parse_token("????"), Token::Rest { length: 1 });
        assert_eq!(parse_token(""), Token::Rest { length: 1 });
    }

    #[test]
    fn token_without_trailing_length_defaults_to_one_beat_note() {
        match parse_token("4A") {
            Token::Note { freq_hz, length } => {
                assert!((freq_hz - 440.0).abs() < 1.0);
                assert_eq!(length, 1);
            }
            Token::Rest { .. } => panic!("\"4A\" must parse as a note, not a rest"),
        }
    }

    #[test]
    fn note_to_freq_token_matches_invariant_6_literally() {
        assert!((note_to_freq_token("4A").unwrap() - 440.0).abs() < 1.0);
        assert!((note_to_freq_token("5A").unwrap() - 880.0).abs() < 1.0);
        assert_eq!(note_to_freq_token("R"), None);
    }

    #[test]
    fn sequence_splits_on_whitespace() {
        let seq = parse_sequence("4C4 R2 4E4");
        assert_eq!(seq.len(), 3);
    }
}
