//! A parser for the literal values search logs print: dicts, tuples, lists, strings, numbers,
//! `None`, booleans, `range(...)` and `Genotype(...)`. Nothing in the text is ever executed;
//! anything outside this grammar is an error.

use crate::{AnalyzerErr, Result};

/// Name of the only record constructor accepted in the text.
pub const GENOTYPE_CALL: &str = "Genotype";
const RANGE_CALL: &str = "range";

/// A parsed literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Number(f64),
    Str(String),
    List(Vec<Literal>),
    Tuple(Vec<Literal>),
    /// Key-value pairs in text order.
    Dict(Vec<(Literal, Literal)>),
    /// The keyword arguments of a `Genotype(...)` record, in text order.
    Genotype(Vec<(String, Literal)>),
}

impl Literal {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The elements of a list or tuple.
    pub fn as_items(&self) -> Option<&[Literal]> {
        match self {
            Literal::List(items) | Literal::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&[(Literal, Literal)]> {
        match self {
            Literal::Dict(pairs) => Some(pairs),
            _ => None,
        }
    }

    /// Looks up a string key of a dict, or a keyword argument of a genotype record.
    pub fn get(&self, key: &str) -> Option<&Literal> {
        match self {
            Literal::Dict(pairs) => pairs
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
            Literal::Genotype(kwargs) => kwargs.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

/// Parses a single literal spanning the whole text, surrounding whitespace aside.
///
/// # Errors
/// Returns `AnalyzerErr::Parse` at the first byte that doesn't fit the grammar.
pub fn parse(text: &str) -> Result<Literal> {
    let mut parser = Parser { text, pos: 0 };
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos != text.len() {
        return Err(parser.error("unexpected trailing characters"));
    }
    Ok(value)
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, msg: impl Into<String>) -> AnalyzerErr {
        AnalyzerErr::Parse {
            offset: self.pos,
            msg: msg.into(),
        }
    }

    fn rest(&self) -> &str {
        &self.text[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        self.skip_ws();
        match self.peek() {
            Some(c) if c == expected => {
                self.bump();
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected '{expected}', found '{c}'"))),
            None => Err(self.error(format!("expected '{expected}', found end of text"))),
        }
    }

    /// Consumes `c` if it is the next non-blank character.
    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn value(&mut self) -> Result<Literal> {
        self.skip_ws();
        match self.peek() {
            Some('{') => self.dict(),
            Some('[') => {
                self.bump();
                Ok(Literal::List(self.items(']')?))
            }
            Some('(') => self.tuple_or_group(),
            Some(q @ ('\'' | '"')) => self.string(q).map(Literal::Str),
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.name(),
            Some(c) => Err(self.error(format!("unexpected character '{c}'"))),
            None => Err(self.error("unexpected end of text")),
        }
    }

    /// Comma separated values up to `close`, which is consumed. A trailing comma is allowed.
    fn items(&mut self, close: char) -> Result<Vec<Literal>> {
        let mut items = Vec::new();
        loop {
            if self.eat(close) {
                return Ok(items);
            }
            items.push(self.value()?);
            if !self.eat(',') {
                self.expect(close)?;
                return Ok(items);
            }
        }
    }

    fn dict(&mut self) -> Result<Literal> {
        self.expect('{')?;
        let mut pairs = Vec::new();
        loop {
            if self.eat('}') {
                return Ok(Literal::Dict(pairs));
            }
            let key = self.value()?;
            self.expect(':')?;
            let value = self.value()?;
            pairs.push((key, value));
            if !self.eat(',') {
                self.expect('}')?;
                return Ok(Literal::Dict(pairs));
            }
        }
    }

    fn tuple_or_group(&mut self) -> Result<Literal> {
        self.expect('(')?;
        if self.eat(')') {
            return Ok(Literal::Tuple(Vec::new()));
        }

        let first = self.value()?;
        if self.eat(')') {
            return Ok(first);
        }
        self.expect(',')?;

        let mut items = vec![first];
        items.extend(self.items(')')?);
        Ok(Literal::Tuple(items))
    }

    fn string(&mut self, quote: char) -> Result<String> {
        let start = self.pos;
        self.bump();

        let mut out = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('0') => out.push('\0'),
                    Some(c @ ('\\' | '\'' | '"')) => out.push(c),
                    Some(c) => {
                        out.push('\\');
                        out.push(c);
                    }
                    None => break,
                },
                Some(c) => out.push(c),
                None => break,
            }
        }

        self.pos = start;
        Err(self.error("unterminated string"))
    }

    fn number(&mut self) -> Result<Literal> {
        let start = self.pos;
        let negative = match self.peek() {
            Some('-') => {
                self.bump();
                true
            }
            Some('+') => {
                self.bump();
                false
            }
            _ => false,
        };

        if self.peek().is_some_and(char::is_alphabetic) {
            let value = match self.identifier() {
                "inf" => f64::INFINITY,
                "nan" => f64::NAN,
                other => {
                    let msg = format!("expected a number, found '{other}'");
                    self.pos = start;
                    return Err(self.error(msg));
                }
            };
            return Ok(Literal::Number(if negative { -value } else { value }));
        }

        let mut prev = None;
        while let Some(c) = self.peek() {
            let exponent_sign = (c == '-' || c == '+') && matches!(prev, Some('e' | 'E'));
            if !(c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || c == '_' || exponent_sign) {
                break;
            }
            prev = Some(c);
            self.bump();
        }

        let digits: String = self.text[start..self.pos].chars().filter(|&c| c != '_').collect();
        digits.parse::<f64>().map(Literal::Number).map_err(|_| {
            self.pos = start;
            self.error(format!("invalid number '{digits}'"))
        })
    }

    fn identifier(&mut self) -> &str {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.bump();
        }
        &self.text[start..self.pos]
    }

    fn name(&mut self) -> Result<Literal> {
        let start = self.pos;
        let name = self.identifier().to_string();
        match name.as_str() {
            "None" => Ok(Literal::None),
            "True" => Ok(Literal::Bool(true)),
            "False" => Ok(Literal::Bool(false)),
            "inf" => Ok(Literal::Number(f64::INFINITY)),
            "nan" => Ok(Literal::Number(f64::NAN)),
            RANGE_CALL => self.range(),
            GENOTYPE_CALL => self.genotype(),
            _ => {
                self.pos = start;
                Err(self.error(format!("unsupported name '{name}'")))
            }
        }
    }

    /// `range(stop)`, `range(start, stop)` or `range(start, stop, step)` over integers.
    fn range(&mut self) -> Result<Literal> {
        let start_pos = self.pos;
        self.expect('(')?;
        let args = self.items(')')?;

        let mut bounds = Vec::with_capacity(args.len());
        for arg in &args {
            match arg.as_f64() {
                Some(n) if n.fract() == 0. && n.is_finite() => bounds.push(n as i64),
                _ => {
                    self.pos = start_pos;
                    return Err(self.error("range arguments must be integers"));
                }
            }
        }

        let (start, stop, step) = match bounds[..] {
            [stop] => (0, stop, 1),
            [start, stop] => (start, stop, 1),
            [start, stop, step] if step != 0 => (start, stop, step),
            _ => {
                self.pos = start_pos;
                return Err(self.error("range takes 1 to 3 arguments and a non-zero step"));
            }
        };

        let mut values = Vec::new();
        let mut i = start;
        while (step > 0 && i < stop) || (step < 0 && i > stop) {
            values.push(Literal::Number(i as f64));
            i += step;
        }
        Ok(Literal::List(values))
    }

    /// `Genotype(key=value, ...)`, keyword arguments only.
    fn genotype(&mut self) -> Result<Literal> {
        self.expect('(')?;
        let mut kwargs = Vec::new();
        loop {
            if self.eat(')') {
                return Ok(Literal::Genotype(kwargs));
            }

            self.skip_ws();
            let key = self.identifier().to_string();
            if key.is_empty() {
                return Err(self.error("expected a keyword argument"));
            }
            self.expect('=')?;
            kwargs.push((key, self.value()?));

            if !self.eat(',') {
                self.expect(')')?;
                return Ok(Literal::Genotype(kwargs));
            }
        }
    }
}
