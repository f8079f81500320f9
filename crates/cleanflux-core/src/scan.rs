//! Depth/quote-aware scanning helpers shared by the tokenizer and the
//! modifier's column/group-by splitting. Operates on `Vec<char>` rather
//! than byte offsets so multi-byte unit suffixes (`µ`) never split a
//! boundary mid-character.

/// For each character in `s`, whether it sits at paren depth 0 and outside
/// any quoted string. The opening `(` itself (and the quote character that
/// opens a string) are reported as top-level — it's the characters
/// *between* the delimiters that are nested.
pub fn top_level_mask(chars: &[char]) -> Vec<bool> {
    let mut mask = Vec::with_capacity(chars.len());
    let mut depth: i32 = 0;
    let mut quote: Option<char> = None;
    for &c in chars {
        let is_top = depth == 0 && quote.is_none();
        mask.push(is_top);
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => depth = (depth - 1).max(0),
            _ => {}
        }
    }
    mask
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Split `chars` on top-level occurrences of `sep`, trimming nothing.
pub fn split_top_level(chars: &[char], sep: char) -> Vec<String> {
    let mask = top_level_mask(chars);
    let mut parts = Vec::new();
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
        if c == sep && mask[i] {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

/// Find the first top-level, case-insensitive, word-boundary match of
/// `keyword` in `chars` starting the search at char index `from`. Returns
/// the `[start, end)` char range of the match.
pub fn find_keyword_ci(chars: &[char], from: usize, keyword: &str) -> Option<(usize, usize)> {
    let mask = top_level_mask(chars);
    let kw: Vec<char> = keyword.chars().collect();
    let n = kw.len();
    if n == 0 || from >= chars.len() {
        return None;
    }
    let mut i = from;
    while i + n <= chars.len() {
        if mask[i] && matches_ci(&chars[i..i + n], &kw) {
            let before_ok = i == 0 || !is_word_char(chars[i - 1]);
            let after_ok = i + n == chars.len() || !is_word_char(chars[i + n]);
            if before_ok && after_ok {
                return Some((i, i + n));
            }
        }
        i += 1;
    }
    None
}

/// Find the earliest top-level match among several candidate keywords.
/// Returns (start, end, candidate_index).
pub fn find_first_keyword_ci(
    chars: &[char],
    from: usize,
    keywords: &[&str],
) -> Option<(usize, usize, usize)> {
    keywords
        .iter()
        .enumerate()
        .filter_map(|(idx, kw)| find_keyword_ci(chars, from, kw).map(|(s, e)| (s, e, idx)))
        .min_by_key(|&(s, _, _)| s)
}

/// Does `chars` starting exactly at `at` match `keyword` (case-insensitive,
/// word-bounded)? Used to confirm "BY" immediately follows "GROUP".
pub fn matches_keyword_at(chars: &[char], at: usize, keyword: &str) -> Option<usize> {
    let kw: Vec<char> = keyword.chars().collect();
    let n = kw.len();
    if at + n > chars.len() || !matches_ci(&chars[at..at + n], &kw) {
        return None;
    }
    let after_ok = at + n == chars.len() || !is_word_char(chars[at + n]);
    if after_ok {
        Some(at + n)
    } else {
        None
    }
}

fn matches_ci(a: &[char], b: &[char]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|(x, y)| x.to_ascii_lowercase() == y.to_ascii_lowercase())
}

/// Index of the first non-whitespace character at or after `from`.
pub fn skip_whitespace(chars: &[char], from: usize) -> usize {
    let mut i = from;
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

pub fn chars_to_string(chars: &[char]) -> String {
    chars.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_respecting_parens() {
        let chars: Vec<char> = "mean(x), non_negative_derivative(sum(y), 1m)".chars().collect();
        let parts = split_top_level(&chars, ',');
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], "mean(x)");
        assert_eq!(parts[1], " non_negative_derivative(sum(y), 1m)");
    }

    #[test]
    fn finds_keyword_outside_parens() {
        let chars: Vec<char> = "SELECT f(from_x) FROM m".chars().collect();
        let (s, e) = find_keyword_ci(&chars, 0, "FROM").unwrap();
        assert_eq!(chars_to_string(&chars[s..e]), "FROM");
    }
}
