//! Text and items tokenization
//!
//! Tokens are maximal runs of alphanumeric characters. Term matching counts
//! non-overlapping occurrences bounded by non-alphanumeric characters.

use serde::Deserialize;

/// How text fields were tokenized at training time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenMode {
    /// Only individual tokens are terms
    TokensOnly,
    /// Only the whole field value is a term
    FullTermsOnly,
    /// Both tokens and the whole value are terms
    #[default]
    All,
}

/// Split `text` into tokens, lowercasing them unless `case_sensitive`.
pub fn parse_terms(text: &str, case_sensitive: bool) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| {
            if case_sensitive {
                token.to_string()
            } else {
                token.to_lowercase()
            }
        })
        .collect()
}

/// Split an items field value on `separator`, trimming each item.
pub fn parse_items(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return vec![text.trim().to_string()];
    }
    text.split(separator)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Number of times any of `forms` occurs in `text`.
///
/// The first form is the term itself; the rest are its alternate forms.
pub fn count_term_matches(
    text: &str,
    forms: &[String],
    token_mode: TokenMode,
    case_sensitive: bool,
) -> usize {
    let Some(first) = forms.first() else {
        return 0;
    };
    if token_mode == TokenMode::FullTermsOnly {
        return full_term_match(text, first, case_sensitive);
    }
    // multi-token terms in "all" mode can only be full terms
    if token_mode == TokenMode::All && forms.len() == 1 && is_multi_token(first) {
        return full_term_match(text, first, case_sensitive);
    }
    count_token_matches(text, forms, case_sensitive)
}

/// Number of times `item` appears in the `separator` delimited `text`
pub fn count_item_matches(text: &str, item: &str, separator: &str) -> usize {
    parse_items(text, separator)
        .iter()
        .filter(|candidate| candidate.as_str() == item)
        .count()
}

fn full_term_match(text: &str, term: &str, case_sensitive: bool) -> usize {
    let matches = if case_sensitive {
        text == term
    } else {
        text.to_lowercase() == term.to_lowercase()
    };
    usize::from(matches)
}

fn is_multi_token(term: &str) -> bool {
    let trimmed = term.trim();
    let first_and_last_are_words = trimmed.chars().next().is_some_and(char::is_alphanumeric)
        && trimmed.chars().last().is_some_and(char::is_alphanumeric);
    first_and_last_are_words && trimmed.chars().any(|c| !c.is_alphanumeric())
}

fn count_token_matches(text: &str, forms: &[String], case_sensitive: bool) -> usize {
    let normalize = |s: &str| -> Vec<char> {
        if case_sensitive {
            s.chars().collect()
        } else {
            s.to_lowercase().chars().collect()
        }
    };
    let text = normalize(text);
    let forms: Vec<Vec<char>> = forms
        .iter()
        .map(|f| normalize(f))
        .filter(|f| !f.is_empty())
        .collect();

    let is_word = |c: char| c.is_alphanumeric() && c != '_';
    let mut count = 0;
    let mut position = 0;
    while position < text.len() {
        let boundary_before = position == 0 || !is_word(text[position - 1]);
        let matched = boundary_before
            .then(|| {
                forms.iter().find(|form| {
                    let end = position + form.len();
                    end <= text.len()
                        && text[position..end] == form[..]
                        && (end == text.len() || !is_word(text[end]))
                })
            })
            .flatten();
        match matched {
            Some(form) => {
                count += 1;
                position += form.len();
            }
            None => position += 1,
        }
    }
    count
}
