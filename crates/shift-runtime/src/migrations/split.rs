//! Statement splitting for multi-statement scripts.
//!
//! Scripts are split on `;` so each statement runs separately and a failure can
//! be pinned to one of them. Semicolons inside string literals, quoted
//! identifiers, dollar-quoted bodies (`$$ ... $$`, `$fn$ ... $fn$`) and
//! comments do not split.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State<'a> {
    Code,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment(u32),
    DollarQuoted(&'a [u8]),
}

/// Split SQL into individual statements, without their trailing `;`.
///
/// Fragments holding only whitespace or comments are dropped.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let bytes = sql.as_bytes();
    let mut statements = Vec::new();
    let mut state = State::Code;
    let mut start = 0;
    let mut has_code = false;
    let mut i = 0;

    while i < bytes.len() {
        let rest = &bytes[i..];
        match state {
            State::Code => {
                if rest.starts_with(b"--") {
                    state = State::LineComment;
                    i += 2;
                    continue;
                }
                if rest.starts_with(b"/*") {
                    state = State::BlockComment(1);
                    i += 2;
                    continue;
                }
                match bytes[i] {
                    b';' => {
                        if has_code {
                            statements.push(sql[start..i].trim().to_string());
                        }
                        start = i + 1;
                        has_code = false;
                    }
                    b'\'' => {
                        state = State::SingleQuoted;
                        has_code = true;
                    }
                    b'"' => {
                        state = State::DoubleQuoted;
                        has_code = true;
                    }
                    b'$' => {
                        has_code = true;
                        if let Some(tag) = dollar_tag(rest) {
                            state = State::DollarQuoted(tag);
                            i += tag.len();
                            continue;
                        }
                    }
                    c if !c.is_ascii_whitespace() => has_code = true,
                    _ => {}
                }
                i += 1;
            }
            // '' inside a literal ends and immediately reopens it, which is equivalent
            State::SingleQuoted => {
                if bytes[i] == b'\'' {
                    state = State::Code;
                }
                i += 1;
            }
            State::DoubleQuoted => {
                if bytes[i] == b'"' {
                    state = State::Code;
                }
                i += 1;
            }
            State::LineComment => {
                if bytes[i] == b'\n' {
                    state = State::Code;
                }
                i += 1;
            }
            // Postgres block comments nest
            State::BlockComment(depth) => {
                if rest.starts_with(b"*/") {
                    state = if depth == 1 {
                        State::Code
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    i += 2;
                } else if rest.starts_with(b"/*") {
                    state = State::BlockComment(depth + 1);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            State::DollarQuoted(tag) => {
                if rest.starts_with(tag) {
                    state = State::Code;
                    i += tag.len();
                } else {
                    i += 1;
                }
            }
        }
    }

    if has_code {
        statements.push(sql[start..].trim().to_string());
    }

    statements
}

/// Match a dollar-quote delimiter (`$$` or `$tag$`) at the start of `rest`.
///
/// Positional parameters such as `$1` are not delimiters because a tag can
/// not start with a digit.
fn dollar_tag(rest: &[u8]) -> Option<&[u8]> {
    debug_assert_eq!(rest.first(), Some(&b'$'));

    match rest.get(1) {
        Some(b'$') => return Some(&rest[..2]),
        Some(c) if c.is_ascii_alphabetic() || *c == b'_' => {}
        _ => return None,
    }

    let end = rest[1..]
        .iter()
        .position(|c| !(c.is_ascii_alphanumeric() || *c == b'_'))
        .map(|p| p + 1)?;

    if rest[end] == b'$' {
        Some(&rest[..=end])
    } else {
        None
    }
}
