//! Light JavaScript minifier
//!
//! Strips comments with a small lexer that understands string, template and
//! regex literals, then trims per-line whitespace. Newlines are preserved so
//! automatic semicolon insertion is never broken. When the lexer loses track
//! of the input (unterminated literal), the task falls back to trimmed lines
//! with whole-line comments dropped rather than risk corrupting the bundle.

/// Minify a script buffer. Never fails; the output is at worst the input
/// with blank lines trimmed.
pub fn minify_js(input: &str) -> String {
    match strip_comments(input) {
        Some(stripped) => trim_lines(&stripped),
        None => fallback(input),
    }
}

/// Trim every line and drop the blank ones
fn trim_lines(input: &str) -> String {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Conservative fallback: trimmed lines minus whole-line comments
fn fallback(input: &str) -> String {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("//"))
        .filter(|line| !line.starts_with("/*"))
        .filter(|line| !line.starts_with('*'))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Remove `//` and `/* */` comments, copying string, template and regex
/// literals verbatim. Returns `None` when a literal is unterminated.
fn strip_comments(input: &str) -> Option<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    // Last non-whitespace char emitted, used to tell regex from division
    let mut prev: Option<char> = None;

    while let Some(c) = chars.next() {
        match c {
            '/' => match chars.peek() {
                Some('/') => {
                    while let Some(&n) = chars.peek() {
                        if n == '\n' {
                            break;
                        }
                        chars.next();
                    }
                }
                Some('*') => {
                    chars.next();
                    loop {
                        let n = chars.next()?;
                        if n == '*' && chars.peek() == Some(&'/') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ if regex_can_start(prev) => {
                    out.push('/');
                    let mut in_class = false;
                    loop {
                        let n = chars.next()?;
                        if n == '\n' {
                            return None;
                        }
                        out.push(n);
                        match n {
                            '\\' => out.push(chars.next()?),
                            '[' => in_class = true,
                            ']' => in_class = false,
                            '/' if !in_class => break,
                            _ => {}
                        }
                    }
                    prev = Some('/');
                }
                _ => {
                    out.push('/');
                    prev = Some('/');
                }
            },
            '"' | '\'' => {
                out.push(c);
                loop {
                    let n = chars.next()?;
                    if n == '\n' {
                        return None;
                    }
                    out.push(n);
                    match n {
                        '\\' => out.push(chars.next()?),
                        _ if n == c => break,
                        _ => {}
                    }
                }
                prev = Some(c);
            }
            '`' => {
                out.push(c);
                loop {
                    let n = chars.next()?;
                    out.push(n);
                    match n {
                        '\\' => out.push(chars.next()?),
                        '`' => break,
                        _ => {}
                    }
                }
                prev = Some('`');
            }
            _ => {
                out.push(c);
                if !c.is_whitespace() {
                    prev = Some(c);
                }
            }
        }
    }

    Some(out)
}

/// A `/` after these characters (or at the start of input) begins a regex
/// literal rather than a division.
fn regex_can_start(prev: Option<char>) -> bool {
    match prev {
        None => true,
        Some(c) => matches!(
            c,
            '(' | ',' | '=' | ':' | '[' | '!' | '&' | '|' | '?' | '{' | '}' | ';' | '<' | '>'
                | '+' | '-' | '*' | '%' | '~' | '^'
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_line_and_block_comments() {
        let js = "// header\nvar a = 1; // trailing\n/* block\n   spanning */\nvar b = 2;";
        assert_eq!(minify_js(js), "var a = 1;\nvar b = 2;");
    }

    #[test]
    fn test_preserves_slashes_inside_strings() {
        let js = "var url = \"http://example.com//x\";";
        assert_eq!(minify_js(js), js);
    }

    #[test]
    fn test_preserves_regex_literals() {
        let js = "var re = /a\\/\\/b/; var half = total / 2;";
        assert_eq!(minify_js(js), js);
    }

    #[test]
    fn test_regex_character_class_may_contain_slash() {
        let js = "var re = /[/]/;";
        assert_eq!(minify_js(js), js);
    }

    #[test]
    fn test_template_literals_keep_their_newlines() {
        let js = "var t = `line one\nline two`;";
        assert_eq!(minify_js(js), js);
    }

    #[test]
    fn test_trims_indentation_and_blank_lines() {
        let js = "function f() {\n    return 1;\n\n}\n";
        assert_eq!(minify_js(js), "function f() {\nreturn 1;\n}");
    }

    #[test]
    fn test_unterminated_string_uses_fallback() {
        let js = "// gone\nvar broken = \"oops;\nvar kept = 1;";
        let out = minify_js(js);
        assert!(!out.contains("// gone"));
        assert!(out.contains("var kept = 1;"));
        assert!(out.contains("var broken"));
    }

    #[test]
    fn test_division_after_identifier_is_untouched() {
        let js = "var rate = speed / time;";
        assert_eq!(minify_js(js), js);
    }
}
