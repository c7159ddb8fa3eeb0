//! Ink-length estimate for SVG path data.
//!
//! This is an approximation that downstream ink accounting depends on, so it
//! must stay stable: only absolute `M`, `L`, `C`, `Q` and `Z`/`z` contribute,
//! and curves count as their start-to-end chord times [`CURVE_FACTOR`].

use crate::error::{LinecraftError, Result};

/// Empirical stretch applied to the chord of a Bezier segment.
pub const CURVE_FACTOR: f64 = 1.2;

const COMMANDS: &[&str] = &["M", "L", "C", "Q", "A", "Z", "m", "l", "c", "q", "a", "z"];

/// Splits path data into single ASCII letters and numbers of the form
/// `[-+]?[0-9]*\.?[0-9]+`. Anything else is skipped.
pub fn tokenize(data: &str) -> Vec<&str> {
    let bytes = data.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_alphabetic() {
            tokens.push(&data[i..i + 1]);
            i += 1;
            continue;
        }
        match number_len(&bytes[i..]) {
            Some(len) => {
                tokens.push(&data[i..i + len]);
                i += len;
            }
            None => i += 1,
        }
    }
    tokens
}

fn digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

fn number_len(bytes: &[u8]) -> Option<usize> {
    let sign = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int = digits(&bytes[sign..]);
    let after_int = sign + int;
    if bytes.get(after_int) == Some(&b'.') {
        let frac = digits(&bytes[after_int + 1..]);
        if frac > 0 {
            return Some(after_int + 1 + frac);
        }
    }
    (int > 0).then_some(after_int)
}

fn coordinate(tokens: &[&str], index: usize) -> Result<f64> {
    tokens[index].parse::<f64>().map_err(|_| {
        LinecraftError::Validation(format!(
            "expected a coordinate in path data, found {:?}",
            tokens[index]
        ))
    })
}

fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt()
}

/// Estimated stroke length of `data`, in path units.
pub fn estimate_length(data: &str) -> Result<f64> {
    let tokens = tokenize(data);
    let mut total = 0.0;
    let mut current = (0.0, 0.0);
    let mut start = (0.0, 0.0);
    let mut i = 0;

    while i < tokens.len() {
        let cmd = tokens[i];
        i += 1;
        if !COMMANDS.contains(&cmd) {
            continue;
        }
        match cmd {
            "M" => {
                if i + 1 < tokens.len() {
                    current = (coordinate(&tokens, i)?, coordinate(&tokens, i + 1)?);
                    start = current;
                    i += 2;
                }
            }
            "L" => {
                if i + 1 < tokens.len() {
                    let target = (coordinate(&tokens, i)?, coordinate(&tokens, i + 1)?);
                    total += distance(current, target);
                    current = target;
                    i += 2;
                }
            }
            "C" | "Q" => {
                let operands = if cmd == "C" { 6 } else { 4 };
                if i + operands - 1 < tokens.len() {
                    let target = (
                        coordinate(&tokens, i + operands - 2)?,
                        coordinate(&tokens, i + operands - 1)?,
                    );
                    total += distance(current, target) * CURVE_FACTOR;
                    current = target;
                    i += operands;
                }
            }
            "Z" | "z" => {
                total += distance(current, start);
                current = start;
            }
            _ => {}
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn tokenizer_matches_number_grammar() {
        assert_eq!(
            tokenize("M-1.5,2 L.5-3e4 10."),
            vec!["M", "-1.5", "2", "L", ".5", "-3", "e", "4", "10"]
        );
        assert_eq!(tokenize("1.2.3"), vec!["1.2", ".3"]);
    }

    #[test]
    fn straight_lines_are_exact() {
        assert!(approx(estimate_length("M 0 0 L 3 4").unwrap(), 5.0));
        assert!(approx(estimate_length("M 0 0 L 3 4 L 3 0").unwrap(), 9.0));
    }

    #[test]
    fn curves_use_scaled_chord() {
        let cubic = estimate_length("M 0 0 C 5 5 10 5 3 4").unwrap();
        assert!(approx(cubic, 6.0));
        let quad = estimate_length("M 0 0 Q 50 50 0 10").unwrap();
        assert!(approx(quad, 12.0));
    }

    #[test]
    fn close_returns_to_subpath_start() {
        let square = estimate_length("M 0 0 L 10 0 L 10 10 L 0 10 Z").unwrap();
        assert!(approx(square, 40.0));
        let second = estimate_length("M 0 0 L 1 0 M 5 5 L 5 8 z").unwrap();
        assert!(approx(second, 1.0 + 3.0 + 3.0));
    }

    #[test]
    fn relative_and_other_commands_contribute_nothing() {
        assert!(approx(estimate_length("m 0 0 l 10 10 h 5 v 5").unwrap(), 0.0));
        assert!(approx(estimate_length("M 0 0 A 5 5 0 0 1 10 0").unwrap(), 0.0));
    }

    #[test]
    fn implicit_repeats_are_ignored() {
        assert!(approx(estimate_length("M 0 0 L 3 4 6 8").unwrap(), 5.0));
    }

    #[test]
    fn truncated_segments_are_skipped() {
        assert!(approx(estimate_length("M 0 0 L 3").unwrap(), 0.0));
        assert!(approx(estimate_length("M 0 0 C 1 1 2 2").unwrap(), 0.0));
    }

    #[test]
    fn non_numeric_operand_is_rejected() {
        let err = estimate_length("M 0 0 L Z 4").unwrap_err();
        assert!(matches!(err, LinecraftError::Validation(_)));
    }
}
