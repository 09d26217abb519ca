//! Parser for netlist descriptions.
//!
//! The parser does not build a tree: every statement is turned into the
//! matching [`Setup`] registration call as soon as it is read.

use std::sync::Arc;

use tracing::trace;

use super::lexer::{parse_value, Token, TokenKind};
use crate::devices::truthtable::TtDesc;
use crate::error::{NetlistError, Result};
use crate::setup::{Setup, Source};

/// Parser over the tokens of one source text.
pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    origin: &'a str,
    text: &'a Arc<str>,
}

impl<'a> Parser<'a> {
    /// `text` is the raw source; `LOCAL_SOURCE` registers it again under the
    /// same origin.
    pub fn new(tokens: Vec<Token>, origin: &'a str, text: &'a Arc<str>) -> Self {
        Self {
            tokens,
            pos: 0,
            origin,
            text,
        }
    }

    fn peek(&self) -> &Token {
        // tokenize() always ends with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn next(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn err(&self, line: usize, msg: impl Into<String>) -> NetlistError {
        NetlistError::parse(self.origin, line, msg)
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token> {
        let tok = self.next();
        if tok.kind != kind {
            return Err(self.err(tok.line, format!("expected {}, found '{}'", what, tok.text)));
        }
        Ok(tok)
    }

    /// `( [value {, value}] )`
    fn args(&mut self) -> Result<Vec<Token>> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if self.peek().kind == TokenKind::RParen {
            self.next();
            return Ok(args);
        }
        loop {
            let tok = self.next();
            match tok.kind {
                TokenKind::Identifier | TokenKind::Number | TokenKind::String => args.push(tok),
                _ => return Err(self.err(tok.line, format!("expected a value, found '{}'", tok.text))),
            }
            let sep = self.next();
            match sep.kind {
                TokenKind::Comma => continue,
                TokenKind::RParen => return Ok(args),
                _ => return Err(self.err(sep.line, format!("expected ',' or ')', found '{}'", sep.text))),
            }
        }
    }

    fn arg_count(&self, kw: &Token, args: &[Token], n: usize) -> Result<()> {
        if args.len() != n {
            return Err(self.err(
                kw.line,
                format!("{} expects {} argument(s), got {}", kw.text, n, args.len()),
            ));
        }
        Ok(())
    }

    fn number(&self, tok: &Token) -> Result<f64> {
        parse_value(&tok.text).ok_or_else(|| self.err(tok.line, format!("'{}' is not a number", tok.text)))
    }

    fn count(&self, tok: &Token) -> Result<usize> {
        tok.text
            .parse()
            .map_err(|_| self.err(tok.line, format!("'{}' is not a count", tok.text)))
    }

    /// Find netlist `name` at the top level, or the first one if `name` is
    /// empty, and register its content. Returns false if the text has no
    /// such netlist.
    pub fn parse(&mut self, setup: &mut Setup, name: &str) -> Result<bool> {
        loop {
            let tok = self.next();
            match tok.kind {
                TokenKind::Eof => return Ok(false),
                TokenKind::Identifier if tok.text == "NETLIST_START" => {
                    let args = self.args()?;
                    self.arg_count(&tok, &args, 1)?;
                    if name.is_empty() || args[0].text == name {
                        self.body(setup)?;
                        return Ok(true);
                    }
                    self.skip_netlist(tok.line)?;
                }
                _ => {
                    return Err(self.err(tok.line, format!("expected NETLIST_START, found '{}'", tok.text)));
                }
            }
        }
    }

    fn skip_netlist(&mut self, start: usize) -> Result<()> {
        loop {
            let tok = self.next();
            match tok.kind {
                TokenKind::Eof => return Err(self.err(start, "missing NETLIST_END")),
                TokenKind::Identifier if tok.text == "NETLIST_END" => {
                    self.args()?;
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    fn body(&mut self, setup: &mut Setup) -> Result<()> {
        loop {
            let kw = self.next();
            match kw.kind {
                TokenKind::Identifier => {
                    if !self.statement(setup, &kw)? {
                        return Ok(());
                    }
                }
                TokenKind::Eof => return Err(self.err(kw.line, "missing NETLIST_END")),
                _ => return Err(self.err(kw.line, format!("unexpected '{}'", kw.text))),
            }
        }
    }

    /// One statement; false at `NETLIST_END`.
    fn statement(&mut self, setup: &mut Setup, kw: &Token) -> Result<bool> {
        let args = self.args()?;
        trace!(line = kw.line, statement = %kw.text, "parse");
        let texts: Vec<String> = args.iter().map(|t| t.text.clone()).collect();
        match kw.text.as_str() {
            "NETLIST_END" => {
                self.arg_count(kw, &args, 0)?;
                return Ok(false);
            }
            "NET_C" => setup.register_link_arr(&texts)?,
            "ALIAS" => {
                self.arg_count(kw, &args, 2)?;
                setup.register_alias(&texts[0], &texts[1])?;
            }
            "PARAM" => {
                self.arg_count(kw, &args, 2)?;
                setup.register_param(&texts[0], &texts[1]);
            }
            "NET_MODEL" => {
                self.arg_count(kw, &args, 1)?;
                setup.register_model(&texts[0])?;
            }
            "INCLUDE" => {
                self.arg_count(kw, &args, 1)?;
                setup.include(&texts[0])?;
            }
            "SUBMODEL" => {
                self.arg_count(kw, &args, 2)?;
                setup.namespace_push(&texts[1]);
                let r = setup.include(&texts[0]);
                setup.namespace_pop();
                r?;
            }
            "LOCAL_SOURCE" | "LOCAL_LIB_ENTRY" => {
                self.arg_count(kw, &args, 1)?;
                setup.register_source(Source::Text {
                    origin: self.origin.to_string(),
                    text: Arc::clone(self.text),
                });
                if kw.text == "LOCAL_LIB_ENTRY" {
                    setup.register_lib_entry(&texts[0]);
                }
            }
            "NET_REGISTER_DEV" => {
                self.arg_count(kw, &args, 2)?;
                setup.register_dev(&texts[0], &texts[1])?;
            }
            "DIPPINS" => setup.register_dippins_arr(&texts)?,
            "OPTIMIZE_FRONTIER" => {
                self.arg_count(kw, &args, 3)?;
                let (r_in, r_out) = (self.number(&args[1])?, self.number(&args[2])?);
                setup.register_frontier(&texts[0], r_in, r_out)?;
            }
            "TRUTHTABLE_START" => {
                self.arg_count(kw, &args, 4)?;
                let desc = TtDesc::new(
                    texts[0].clone(),
                    self.count(&args[1])?,
                    self.count(&args[2])?,
                    texts[3].clone(),
                );
                let desc = self.truthtable(desc, kw.line)?;
                setup.register_truthtable(&desc)?;
            }
            _ => self.device(setup, kw, &args)?,
        }
        Ok(true)
    }

    fn truthtable(&mut self, mut desc: TtDesc, start: usize) -> Result<TtDesc> {
        loop {
            let kw = self.next();
            if kw.kind == TokenKind::Eof {
                return Err(self.err(start, "missing TRUTHTABLE_END"));
            }
            if kw.kind != TokenKind::Identifier {
                return Err(self.err(kw.line, format!("unexpected '{}' in truthtable", kw.text)));
            }
            let args = self.args()?;
            match kw.text.as_str() {
                "TRUTHTABLE_END" => {
                    self.arg_count(&kw, &args, 0)?;
                    return Ok(desc);
                }
                "TT_HEAD" | "TT_LINE" => {
                    self.arg_count(&kw, &args, 1)?;
                    if (kw.text == "TT_HEAD") != desc.desc.is_empty() {
                        return Err(self.err(kw.line, "TT_HEAD must come first and only once"));
                    }
                    desc.desc.push(args[0].text.clone());
                }
                "TT_FAMILY" => {
                    self.arg_count(&kw, &args, 1)?;
                    desc.family = args[0].text.clone();
                }
                _ => {
                    return Err(self.err(kw.line, format!("unexpected '{}' in truthtable", kw.text)));
                }
            }
        }
    }

    /// `CLASS(name [, values])`: positional values are either all the pins
    /// of a `+` default list, or leading default parameters.
    fn device(&mut self, setup: &mut Setup, kw: &Token, args: &[Token]) -> Result<()> {
        let Some((name, rest)) = args.split_first() else {
            return Err(self.err(kw.line, format!("{} needs a device name", kw.text)));
        };
        setup.register_dev(&kw.text, &name.text)?;
        if rest.is_empty() {
            return Ok(());
        }

        let Some(entry) = setup.factory().get(&kw.text) else {
            return Err(self.err(kw.line, format!("{} takes no positional values", kw.text)));
        };
        let (pins, params) = (entry.term_params(), entry.def_params());
        if !pins.is_empty() {
            if rest.len() != pins.len() {
                return Err(self.err(
                    kw.line,
                    format!("{} expects {} pin(s), got {}", kw.text, pins.len(), rest.len()),
                ));
            }
            for (pin, target) in pins.iter().zip(rest) {
                setup.register_link(&format!("{}.{}", name.text, pin), &target.text);
            }
            return Ok(());
        }

        if rest.len() > params.len() {
            return Err(self.err(
                kw.line,
                format!("{} takes at most {} value(s), got {}", kw.text, params.len(), rest.len()),
            ));
        }
        for (param, value) in params.iter().zip(rest) {
            setup.register_param(&format!("{}.{}", name.text, param), &value.text);
        }
        Ok(())
    }
}
