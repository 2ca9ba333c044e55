//! Delimiter-balance check for files without a known grammar.
//!
//! Tracks `()[]{}` outside string literals and comments. Strings do not span
//! lines here, so a stray apostrophe in prose cannot swallow the rest of the
//! file.

use crate::syntax::ErrorLocation;

pub fn check(source: &str) -> Vec<ErrorLocation> {
    let mut errors = Vec::new();
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut chars = source.char_indices().peekable();
    let mut at_line_start = true;
    let mut prev = '\n';

    while let Some((i, c)) = chars.next() {
        match c {
            '\n' => {
                at_line_start = true;
                prev = c;
                continue;
            }
            '#' if at_line_start => skip_line(&mut chars),
            '/' if matches!(chars.peek(), Some((_, '/'))) => skip_line(&mut chars),
            '/' if matches!(chars.peek(), Some((_, '*'))) => {
                chars.next();
                let mut last = '\0';
                for (_, c) in chars.by_ref() {
                    if last == '*' && c == '/' {
                        break;
                    }
                    last = c;
                }
            }
            '\'' if prev.is_alphanumeric() => {}
            '"' | '\'' | '`' => {
                let quote = c;
                while let Some(&(_, c)) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                    if c == '\\' {
                        chars.next();
                    } else if c == quote {
                        break;
                    }
                }
            }
            '(' | '[' | '{' => stack.push((c, i)),
            ')' | ']' | '}' => {
                let opener = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match stack.pop() {
                    Some((open, _)) if open == opener => {}
                    Some((open, at)) => {
                        errors.push(ErrorLocation::at(
                            source,
                            i,
                            i + 1,
                            format!("'{c}' closes '{open}' opened at byte {at}"),
                        ));
                    }
                    None => {
                        errors.push(ErrorLocation::at(source, i, i + 1, format!("unmatched '{c}'")));
                    }
                }
            }
            _ => {}
        }
        if !c.is_whitespace() {
            at_line_start = false;
        }
        prev = c;
    }

    for (open, at) in stack {
        errors.push(ErrorLocation::at(source, at, at + 1, format!("unclosed '{open}'")));
    }
    errors
}

fn skip_line(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>) {
    while let Some(&(_, c)) = chars.peek() {
        if c == '\n' {
            break;
        }
        chars.next();
    }
}
