use memchr::memchr2_iter;

/// Splits `line` on runs of spaces and tabs, storing `(start, end)` byte spans
/// of every non-empty field into `spans` (cleared first).
///
/// Leading and trailing separators produce no empty fields, so a line without
/// separators yields a single field covering the whole line.
pub fn split_fields(line: &[u8], spans: &mut Vec<(usize, usize)>) {
    spans.clear();
    let mut start = 0;
    for sep in memchr2_iter(b' ', b'\t', line) {
        if sep > start {
            spans.push((start, sep));
        }
        start = sep + 1;
    }
    if start < line.len() {
        spans.push((start, line.len()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(line: &str) -> Vec<&str> {
        let mut spans = Vec::new();
        split_fields(line.as_bytes(), &mut spans);
        spans.iter().map(|&(s, e)| &line[s..e]).collect()
    }

    #[test]
    fn test_single_field_is_whole_line() {
        assert_eq!(fields("AAPL"), vec!["AAPL"]);
    }

    #[test]
    fn test_runs_of_separators() {
        assert_eq!(fields("  a \t b\t\tc  "), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_and_blank_lines() {
        assert!(fields("").is_empty());
        assert!(fields(" \t ").is_empty());
    }
}
