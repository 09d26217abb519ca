//! Line-based preprocessor.
//!
//! Handles `#define`, `#undef`, `#ifdef`, `#ifndef`, `#if`, `#else` and
//! `#endif`. Directive lines and lines in disabled blocks are replaced by
//! empty lines so that line numbers in later diagnostics stay correct.
//! Defined names are substituted as whole words in enabled lines.

use std::collections::BTreeMap;

use crate::error::{NetlistError, Result};

#[derive(Debug, Clone, Copy)]
struct Block {
    /// Enclosing block is enabled
    parent: bool,
    /// This branch is enabled
    on: bool,
    seen_else: bool,
}

/// Preprocessor state for one source text.
#[derive(Debug, Clone)]
pub struct Preprocessor<'a> {
    origin: &'a str,
    defines: BTreeMap<String, String>,
    stack: Vec<Block>,
}

impl<'a> Preprocessor<'a> {
    pub fn new(origin: &'a str, defines: &BTreeMap<String, String>) -> Self {
        Self {
            origin,
            defines: defines.clone(),
            stack: Vec::new(),
        }
    }

    fn enabled(&self) -> bool {
        self.stack.last().map_or(true, |b| b.parent && b.on)
    }

    fn err(&self, line: usize, msg: impl Into<String>) -> NetlistError {
        NetlistError::parse(self.origin, line, msg)
    }

    /// Run over `text`; the result has the same number of lines.
    pub fn process(mut self, text: &str) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        for (idx, line) in text.lines().enumerate() {
            let lineno = idx + 1;
            let trimmed = line.trim_start();
            if let Some(directive) = trimmed.strip_prefix('#') {
                self.directive(directive.trim(), lineno)?;
            } else if self.enabled() {
                out.push_str(&self.substitute(line));
            }
            out.push('\n');
        }
        if !self.stack.is_empty() {
            return Err(self.err(text.lines().count(), "missing #endif"));
        }
        Ok(out)
    }

    fn directive(&mut self, d: &str, line: usize) -> Result<()> {
        let (cmd, rest) = match d.split_once(char::is_whitespace) {
            Some((c, r)) => (c, r.trim()),
            None => (d, ""),
        };
        let enabled = self.enabled();
        match cmd {
            "define" if enabled => {
                if rest.is_empty() {
                    return Err(self.err(line, "#define without a name"));
                }
                let (name, value) = match rest.split_once(char::is_whitespace) {
                    Some((n, v)) => (n, v.trim()),
                    None => (rest, "1"),
                };
                self.defines.insert(name.to_string(), value.to_string());
            }
            "undef" if enabled => {
                self.defines.remove(rest);
            }
            "define" | "undef" => {}
            "ifdef" | "ifndef" | "if" => {
                let cond = match cmd {
                    "ifdef" => self.defines.contains_key(rest),
                    "ifndef" => !self.defines.contains_key(rest),
                    _ => self.eval(rest, line)?,
                };
                self.stack.push(Block {
                    parent: enabled,
                    on: cond,
                    seen_else: false,
                });
            }
            "else" => {
                let Some(top) = self.stack.last_mut() else {
                    return Err(self.err(line, "#else without #if"));
                };
                if top.seen_else {
                    return Err(self.err(line, "duplicate #else"));
                }
                top.seen_else = true;
                top.on = !top.on;
            }
            "endif" => {
                if self.stack.pop().is_none() {
                    return Err(self.err(line, "#endif without #if"));
                }
            }
            _ if !enabled => {}
            _ => return Err(self.err(line, format!("unknown directive '#{}'", cmd))),
        }
        Ok(())
    }

    /// `#if` takes a number or a defined name; non-zero is true.
    fn eval(&self, expr: &str, line: usize) -> Result<bool> {
        let text = self.substitute(expr);
        let text = text.trim();
        if let Ok(v) = text.parse::<f64>() {
            return Ok(v != 0.0);
        }
        if is_ident(text) {
            // undefined names evaluate to 0
            return Ok(false);
        }
        Err(self.err(line, format!("cannot evaluate '{}'", expr)))
    }

    fn substitute(&self, line: &str) -> String {
        if self.defines.is_empty() {
            return line.to_string();
        }
        let mut out = String::with_capacity(line.len());
        let mut word = String::new();
        let mut in_string = false;
        for c in line.chars() {
            if !in_string && (c.is_alphanumeric() || c == '_') {
                word.push(c);
                continue;
            }
            self.flush_word(&mut word, &mut out);
            if c == '"' {
                in_string = !in_string;
            }
            out.push(c);
        }
        self.flush_word(&mut word, &mut out);
        out
    }

    fn flush_word(&self, word: &mut String, out: &mut String) {
        if word.is_empty() {
            return;
        }
        match self.defines.get(word.as_str()) {
            Some(v) => out.push_str(v),
            None => out.push_str(word),
        }
        word.clear();
    }
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str, defs: &[(&str, &str)]) -> Result<String> {
        let defines = defs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Preprocessor::new("test", &defines).process(text)
    }

    #[test]
    fn test_keeps_line_count() {
        let out = run("a\n#ifdef X\nb\n#else\nc\n#endif\nd", &[]).unwrap();
        assert_eq!(out, "a\n\n\n\nc\n\nd\n");
    }

    #[test]
    fn test_define_substitutes_whole_words() {
        let out = run("#define R 1k\nRES(R1, R)", &[]).unwrap();
        assert_eq!(out, "\nRES(R1, 1k)\n");
    }

    #[test]
    fn test_no_substitution_in_strings() {
        let out = run("NET_MODEL(\"X D\")\nX", &[("X", "Y")]).unwrap();
        assert_eq!(out, "NET_MODEL(\"X D\")\nY\n");
    }

    #[test]
    fn test_if_and_external_defines() {
        let out = run("#if FAST\nfast\n#else\nslow\n#endif", &[("FAST", "1")]).unwrap();
        assert_eq!(out, "\nfast\n\n\n\n");
        let out = run("#if FAST\nfast\n#endif", &[]).unwrap();
        assert_eq!(out, "\n\n\n");
    }

    #[test]
    fn test_nested_disabled_block() {
        let text = "#ifdef A\n#ifndef B\nx\n#endif\n#else\ny\n#endif";
        assert_eq!(run(text, &[]).unwrap(), "\n\n\n\n\ny\n\n");
    }

    #[test]
    fn test_unbalanced() {
        assert!(matches!(
            run("#ifdef A\nx", &[]),
            Err(NetlistError::ParseError { .. })
        ));
        assert!(matches!(
            run("#endif", &[]),
            Err(NetlistError::ParseError { line: 1, .. })
        ));
    }
}
