//! # Selection Range Parser
//!
//! Turns operator-typed index expressions such as `1..8` or `1-3,5` into a
//! sorted, duplicate-free list of 1-based indices.
//!
//! ## Grammar
//!
//! ```text
//! selection := token ("," token)*
//! token     := N | N ".." N | N "-" N
//! ```
//!
//! Range endpoints above `max_index` are clipped to `max_index` instead of
//! rejected, so `7-100` against ten tracks selects `7..=10`. A range that is
//! descending once clipped (including a single index above `max_index`) is an
//! [`SelectionError::InvalidRange`].

use std::collections::BTreeSet;
use thiserror::Error;

/// Errors produced while parsing a selection expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    /// Nothing but whitespace was entered.
    #[error("empty selection")]
    EmptyInput,
    /// A token was malformed, or its range is empty once clipped.
    #[error("invalid range `{0}`")]
    InvalidRange(String),
}

/// Parse `input` into ascending indices in `1..=max_index`.
///
/// Tokens are separated by commas and may overlap; every index appears once
/// in the result. Whitespace around tokens is ignored.
///
/// # Examples
///
/// ```
/// use curator::range::{parse_selection, SelectionError};
///
/// assert_eq!(parse_selection("1..3,5", 10).unwrap(), vec![1, 2, 3, 5]);
/// assert_eq!(parse_selection("7-100", 10).unwrap(), vec![7, 8, 9, 10]);
/// assert_eq!(parse_selection("3, 1-2, 2", 10).unwrap(), vec![1, 2, 3]);
/// assert!(matches!(parse_selection("5..2", 10), Err(SelectionError::InvalidRange(_))));
/// ```
///
/// # Errors
///
/// - [`SelectionError::EmptyInput`] when `input` is blank
/// - [`SelectionError::InvalidRange`] for a malformed token, a zero index, a
///   descending range, or a range lying entirely above `max_index`
///
/// # Design Notes
///
/// Only the upper bound is clipped: `12` against ten rows is an error, not
/// row 10.
pub fn parse_selection(input: &str, max_index: usize) -> Result<Vec<usize>, SelectionError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(SelectionError::EmptyInput);
    }

    let mut picked = BTreeSet::new();
    for token in input.split(',') {
        let (start, end) = parse_token(token.trim())?;
        let end = end.min(max_index);
        if start == 0 || start > end {
            return Err(SelectionError::InvalidRange(token.trim().to_string()));
        }
        picked.extend(start..=end);
    }

    Ok(picked.into_iter().collect())
}

/// Split a single token into inclusive bounds, without clipping.
fn parse_token(token: &str) -> Result<(usize, usize), SelectionError> {
    let invalid = || SelectionError::InvalidRange(token.to_string());

    let bounds = token
        .split_once("..")
        .or_else(|| token.split_once('-'));

    match bounds {
        Some((lo, hi)) => {
            let lo = parse_index(lo).ok_or_else(invalid)?;
            let hi = parse_index(hi).ok_or_else(invalid)?;
            Ok((lo, hi))
        }
        None => {
            let single = parse_index(token).ok_or_else(invalid)?;
            Ok((single, single))
        }
    }
}

fn parse_index(text: &str) -> Option<usize> {
    let text = text.trim();
    // `usize::from_str` accepts a leading `+`; indices are digits only.
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
