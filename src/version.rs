//! Version comparison with the host platform's rules.
//!
//! Versions are canonicalised first: `-`, `_` and `+` become `.`, and a `.`
//! is inserted wherever digits meet letters, so `1.0rc1` reads as
//! `1.0.rc.1`. Parts then compare pairwise. Numbers compare numerically and
//! word parts by rank: `dev < alpha = a < beta = b < RC = rc < (number) <
//! pl = p`. Anything else ranks below `dev`.

use std::cmp::Ordering;

/// Stand-in part for "a number" when ranking word parts.
const NUMBER: &str = "#";

pub fn compare(a: &str, b: &str) -> Ordering {
    let a = canonicalize(a);
    let b = canonicalize(b);
    let mut left = a.split('.').filter(|p| !p.is_empty());
    let mut right = b.split('.').filter(|p| !p.is_empty());

    loop {
        match (left.next(), right.next()) {
            (Some(l), Some(r)) => {
                let ord = compare_part(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(l), None) => return compare_part(l, NUMBER).then(Ordering::Greater),
            (None, Some(r)) => return compare_part(NUMBER, r).then(Ordering::Less),
            (None, None) => return Ordering::Equal,
        }
    }
}

/// True when `current` is strictly older than `candidate`.
pub fn is_older(current: &str, candidate: &str) -> bool {
    compare(current, candidate) == Ordering::Less
}

fn canonicalize(version: &str) -> String {
    let mut out = String::with_capacity(version.len() * 2);
    let mut prev: Option<char> = None;

    for c in version.trim().chars() {
        if c.is_ascii_alphanumeric() {
            if let Some(p) = prev
                && p.is_ascii_alphanumeric()
                && p.is_ascii_digit() != c.is_ascii_digit()
            {
                out.push('.');
            }
            out.push(c);
            prev = Some(c);
        } else if prev.is_some_and(|p| p != '.') {
            out.push('.');
            prev = Some('.');
        }
    }

    out
}

fn is_number(part: &str) -> bool {
    part.bytes().all(|b| b.is_ascii_digit())
}

fn compare_part(a: &str, b: &str) -> Ordering {
    match (is_number(a), is_number(b)) {
        (true, true) => compare_numbers(a, b),
        (true, false) => special_rank(NUMBER).cmp(&special_rank(b)),
        (false, true) => special_rank(a).cmp(&special_rank(NUMBER)),
        (false, false) => special_rank(a).cmp(&special_rank(b)),
    }
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn special_rank(part: &str) -> i8 {
    const FORMS: &[(&str, i8)] = &[
        ("dev", 0),
        ("alpha", 1),
        ("a", 1),
        ("beta", 2),
        ("b", 2),
        ("RC", 3),
        ("rc", 3),
        (NUMBER, 4),
        ("pl", 5),
        ("p", 5),
    ];

    FORMS
        .iter()
        .find(|(form, _)| part.starts_with(form))
        .map(|(_, rank)| *rank)
        .unwrap_or(-6)
}
