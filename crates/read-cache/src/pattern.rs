//! Redis-style glob matching for key invalidation.

/// Matches `key` against a Redis `KEYS`/`SCAN MATCH` glob.
///
/// Supports `*`, `?`, character classes (`[abc]`, `[a-z]`, `[^a]`, `[!a]`)
/// and `\` escapes. An unterminated class matches a literal `[`.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();

    let (mut pi, mut ki) = (0, 0);
    // Pattern position after the last `*`, and the key position it is tried at.
    let mut star: Option<(usize, usize)> = None;

    while ki < key.len() {
        if let Some(next) = step(&pattern, pi, key[ki]) {
            pi = next;
            ki += 1;
            continue;
        }
        if pattern.get(pi) == Some(&'*') {
            star = Some((pi + 1, ki));
            pi += 1;
            continue;
        }
        match star {
            Some((resume, tried)) => {
                pi = resume;
                ki = tried + 1;
                star = Some((resume, tried + 1));
            }
            None => return false,
        }
    }

    pattern[pi..].iter().all(|&c| c == '*')
}

/// Tries to consume one key character at pattern position `pi`.
/// Returns the next pattern position on success. `*` never matches here.
fn step(pattern: &[char], pi: usize, ch: char) -> Option<usize> {
    match *pattern.get(pi)? {
        '*' => None,
        '?' => Some(pi + 1),
        '[' => match match_class(pattern, pi, ch) {
            Some((true, next)) => Some(next),
            Some((false, _)) => None,
            None => (ch == '[').then_some(pi + 1),
        },
        '\\' if pi + 1 < pattern.len() => (pattern[pi + 1] == ch).then_some(pi + 2),
        literal => (literal == ch).then_some(pi + 1),
    }
}

/// Evaluates the class starting at `pattern[start] == '['`.
/// Returns `(matched, position after ']')`, or `None` if unterminated.
fn match_class(pattern: &[char], start: usize, ch: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negate = matches!(pattern.get(i), Some('^') | Some('!'));
    if negate {
        i += 1;
    }

    let mut matched = false;
    loop {
        let c = *pattern.get(i)?;
        match c {
            ']' => break,
            '\\' => {
                if *pattern.get(i + 1)? == ch {
                    matched = true;
                }
                i += 2;
            }
            _ if pattern.get(i + 1) == Some(&'-')
                && pattern.get(i + 2).is_some_and(|&end| end != ']') =>
            {
                let (lo, hi) = (c.min(pattern[i + 2]), c.max(pattern[i + 2]));
                if (lo..=hi).contains(&ch) {
                    matched = true;
                }
                i += 3;
            }
            _ => {
                if c == ch {
                    matched = true;
                }
                i += 1;
            }
        }
    }

    Some((matched != negate, i + 1))
}
