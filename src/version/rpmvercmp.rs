// src/version/rpmvercmp.rs

//! Segment comparison of RPM version strings

use std::cmp::Ordering;

/// Compare two version or release strings the way rpm does.
///
/// The strings are split into runs of digits and runs of letters, with any
/// other character acting as a separator. Digit runs compare numerically,
/// letter runs compare as bytes, and a digit run is always newer than a
/// letter run. A `~` sorts before everything, even the end of the string.
/// When all common segments are equal the string with characters left wins.
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let one = a.as_bytes();
    let two = b.as_bytes();
    let (mut i, mut j) = (0, 0);

    loop {
        while i < one.len() && !one[i].is_ascii_alphanumeric() && one[i] != b'~' {
            i += 1;
        }
        while j < two.len() && !two[j].is_ascii_alphanumeric() && two[j] != b'~' {
            j += 1;
        }

        let tilde_one = one.get(i) == Some(&b'~');
        let tilde_two = two.get(j) == Some(&b'~');
        if tilde_one || tilde_two {
            if !tilde_one {
                return Ordering::Greater;
            }
            if !tilde_two {
                return Ordering::Less;
            }
            i += 1;
            j += 1;
            continue;
        }

        if i >= one.len() || j >= two.len() {
            break;
        }

        let start_one = i;
        let start_two = j;
        let is_num = one[i].is_ascii_digit();
        if is_num {
            while i < one.len() && one[i].is_ascii_digit() {
                i += 1;
            }
            while j < two.len() && two[j].is_ascii_digit() {
                j += 1;
            }
        } else {
            while i < one.len() && one[i].is_ascii_alphabetic() {
                i += 1;
            }
            while j < two.len() && two[j].is_ascii_alphabetic() {
                j += 1;
            }
        }

        // Segments of different kinds: numeric is newer
        if j == start_two {
            return if is_num {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let seg_one = &one[start_one..i];
        let seg_two = &two[start_two..j];
        let ord = if is_num {
            compare_numeric(seg_one, seg_two)
        } else {
            seg_one.cmp(seg_two)
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    match (i >= one.len(), j >= two.len()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        _ => Ordering::Greater,
    }
}

fn compare_numeric(a: &[u8], b: &[u8]) -> Ordering {
    let a = strip_leading_zeros(a);
    let b = strip_leading_zeros(b);
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn strip_leading_zeros(s: &[u8]) -> &[u8] {
    let first = s.iter().position(|&c| c != b'0').unwrap_or(s.len());
    &s[first..]
}
