//! Lexer (tokenizer) for netlist descriptions.

use crate::error::{NetlistError, Result};

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The token's text; strings without their quotes
    pub text: String,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
}

/// Token types of the description language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A name: statement keyword, device, terminal (`R1.1`), model
    Identifier,
    /// A number, possibly with sign, exponent and SI suffix
    Number,
    /// A double-quoted string
    String,
    /// Open parenthesis '('
    LParen,
    /// Close parenthesis ')'
    RParen,
    /// ','
    Comma,
    /// End of input
    Eof,
}

/// Lexer over a preprocessed description.
pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the whole input. The last token is always [`TokenKind::Eof`].
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if eof {
                return Ok(tokens);
            }
        }
    }

    /// Get the next token.
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace_and_comments()?;

        let (line, column) = (self.line, self.column);
        let token = |kind, text: String| Token {
            kind,
            text,
            line,
            column,
        };

        let Some(&ch) = self.chars.peek() else {
            return Ok(token(TokenKind::Eof, String::new()));
        };

        let tok = match ch {
            '(' | ')' | ',' => {
                self.advance();
                let kind = match ch {
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    _ => TokenKind::Comma,
                };
                token(kind, ch.to_string())
            }
            '"' => {
                self.advance();
                let text = self.read_string(line, column)?;
                token(TokenKind::String, text)
            }
            '-' | '+' | '.' | '0'..='9' => token(TokenKind::Number, self.read_number()),
            _ if ch.is_alphabetic() || ch == '_' => token(TokenKind::Identifier, self.read_identifier()),
            _ => {
                return Err(NetlistError::lexer(
                    line,
                    column,
                    format!("unexpected character '{}'", ch),
                ));
            }
        };
        Ok(tok)
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<()> {
        while let Some(&ch) = self.chars.peek() {
            if ch.is_whitespace() || ch == ';' {
                self.advance();
                continue;
            }
            if ch != '/' {
                break;
            }
            let (line, column) = (self.line, self.column);
            let mut ahead = self.chars.clone();
            ahead.next();
            match ahead.peek() {
                Some('/') => {
                    while let Some(&c) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('*') => {
                    self.advance();
                    self.advance();
                    let mut prev = '\0';
                    loop {
                        match self.advance() {
                            Some('/') if prev == '*' => break,
                            Some(c) => prev = c,
                            None => return Err(NetlistError::lexer(line, column, "unterminated comment")),
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn read_string(&mut self, line: usize, column: usize) -> Result<String> {
        let mut text = String::new();
        loop {
            match self.advance() {
                Some('"') => return Ok(text),
                Some('\n') | None => return Err(NetlistError::lexer(line, column, "unterminated string")),
                Some(c) => text.push(c),
            }
        }
    }

    /// Identifiers may contain dots so that `R1.1` and `X.Q` are one token.
    fn read_identifier(&mut self) -> String {
        let mut text = String::new();
        while let Some(&ch) = self.chars.peek() {
            if ch.is_alphanumeric() || ch == '_' || ch == '.' {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        text
    }

    /// Numbers are taken loosely; [`parse_value`] decides what they mean.
    fn read_number(&mut self) -> String {
        let mut text = String::new();
        while let Some(&ch) = self.chars.peek() {
            let exp_sign = (ch == '-' || ch == '+') && (text.is_empty() || text.ends_with(['e', 'E']));
            if ch.is_alphanumeric() || ch == '.' || ch == '_' || exp_sign {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        text
    }
}

/// Parse a number with an optional SI suffix: `f p n u m k M G`, plus `a`
/// for atto.
pub fn parse_value(text: &str) -> Option<f64> {
    let text = text.trim();
    let last = text.chars().last()?;

    let mult = match last {
        'a' => 1e-18,
        'f' => 1e-15,
        'p' => 1e-12,
        'n' => 1e-9,
        'u' | 'µ' => 1e-6,
        'm' => 1e-3,
        'k' | 'K' => 1e3,
        'M' => 1e6,
        'G' => 1e9,
        _ => 1.0,
    };
    let num = if mult != 1.0 {
        &text[..text.len() - last.len_utf8()]
    } else {
        text
    };

    num.parse::<f64>().ok().map(|v| v * mult)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: Option<f64>, b: Option<f64>) -> bool {
        match (a, b) {
            (Some(x), Some(y)) => (x - y).abs() < x.abs() * 1e-10 + 1e-30,
            (None, None) => true,
            _ => false,
        }
    }

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_parse_value() {
        assert!(approx_eq(parse_value("10k"), Some(10_000.0)));
        assert!(approx_eq(parse_value("100n"), Some(100e-9)));
        assert!(approx_eq(parse_value("4.7u"), Some(4.7e-6)));
        assert!(approx_eq(parse_value("1M"), Some(1_000_000.0)));
        assert!(approx_eq(parse_value("2.2"), Some(2.2)));
        assert!(approx_eq(parse_value("1e-9"), Some(1e-9)));
        assert!(approx_eq(parse_value("3f"), Some(3e-15)));
        assert!(approx_eq(parse_value("-5"), Some(-5.0)));
        assert_eq!(parse_value("abc"), None);
        assert_eq!(parse_value(""), None);
    }

    #[test]
    fn test_lexer_statement() {
        use TokenKind::*;
        assert_eq!(
            kinds("RES(R1, 1k)"),
            vec![Identifier, LParen, Identifier, Comma, Number, RParen, Eof]
        );
    }

    #[test]
    fn test_lexer_dotted_names_and_strings() {
        let toks = Lexer::new("NET_C(R1.1, X.Q)\nNET_MODEL(\"D1 D(IS=1e-15)\")")
            .tokenize()
            .unwrap();
        assert_eq!(toks[2].text, "R1.1");
        assert_eq!(toks[4].text, "X.Q");
        let s = toks.iter().find(|t| t.kind == TokenKind::String).unwrap();
        assert_eq!(s.text, "D1 D(IS=1e-15)");
        assert_eq!(s.line, 2);
    }

    #[test]
    fn test_lexer_comments() {
        use TokenKind::*;
        assert_eq!(
            kinds("// line\nA /* block\n comment */ ( ) ;"),
            vec![Identifier, LParen, RParen, Eof]
        );
    }

    #[test]
    fn test_lexer_exponent_sign() {
        let toks = Lexer::new("1.5e-3,-2").tokenize().unwrap();
        assert_eq!(toks[0].text, "1.5e-3");
        assert_eq!(toks[2].text, "-2");
    }

    #[test]
    fn test_lexer_errors() {
        assert!(matches!(
            Lexer::new("A\n  @").tokenize(),
            Err(NetlistError::LexerError { line: 2, column: 3, .. })
        ));
        assert!(Lexer::new("\"open").tokenize().is_err());
        assert!(Lexer::new("/* open").tokenize().is_err());
    }
}
