//! A1-style cell references

/// Converts a reference such as `B3` to zero-based `(row, col)`.
/// Absolute markers (`$B$3`) are accepted.
pub(crate) fn reference_to_index(reference: &str) -> Option<(usize, usize)> {
    let reference = reference.trim().replace('$', "");
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let col = letters
        .chars()
        .try_fold(0usize, |acc, c| acc.checked_mul(26)?.checked_add((c.to_ascii_uppercase() as u8 - b'A') as usize + 1))?;
    let row = digits.parse::<usize>().ok()?;
    if row == 0 {
        return None;
    }
    Some((row - 1, col - 1))
}

/// Converts zero-based `(row, col)` to an A1-style reference.
pub(crate) fn index_to_reference(row: usize, col: usize) -> String {
    let mut letters = Vec::new();
    let mut col = col + 1;
    while col > 0 {
        let remainder = (col - 1) % 26;
        letters.push((b'A' + remainder as u8) as char);
        col = (col - 1) / 26;
    }
    letters.iter().rev().collect::<String>() + &(row + 1).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_references() {
        assert_eq!(reference_to_index("A1"), Some((0, 0)));
        assert_eq!(reference_to_index("B3"), Some((2, 1)));
        assert_eq!(reference_to_index("AA10"), Some((9, 26)));
        assert_eq!(reference_to_index("$C$2"), Some((1, 2)));
        assert_eq!(reference_to_index("A0"), None);
        assert_eq!(reference_to_index("12"), None);
        assert_eq!(reference_to_index("A"), None);
    }

    #[test]
    fn format_references() {
        assert_eq!(index_to_reference(0, 0), "A1");
        assert_eq!(index_to_reference(9, 26), "AA10");
        assert_eq!(index_to_reference(1, 701), "ZZ2");
    }
}
