use crate::error::{Error, Result};
use crate::table::{Number, TableKey, TableValue};
use indexmap::IndexMap;
use pest::iterators::Pair;
use pest::Parser;

use std::fs;
use std::path::Path;

#[derive(Parser)]
#[grammar = "table.pest"]
pub struct TableParser;

/// Parse a SavedVariables file into a map of its top-level globals.
pub fn parse_file(path: &Path) -> Result<TableValue> {
    let fcontent = fs::read_to_string(path).map_err(Error::io(path))?;
    parse(&fcontent)
}

/// Parse a sequence of `Name = value` assignments into a map keyed by name.
pub fn parse(input: &str) -> Result<TableValue> {
    assemble(input, Frame::document())
}

/// Parse a single value, e.g. `{ [1] = "a", b = true }`.
pub fn parse_value(input: &str) -> Result<TableValue> {
    let mut root = assemble(input, Frame::table(0))?;
    match &mut root {
        TableValue::Sequence(values) if values.len() == 1 => Ok(values.remove(0)),
        _ => Err(Error::malformed(0, "expected exactly one value")),
    }
}

/// One open container. Keys and values arrive as separate tokens, so a
/// frame remembers the key waiting for its value.
struct Frame {
    entries: IndexMap<TableKey, TableValue>,
    next_index: i64,
    pending: Option<(TableKey, usize)>,
    needs_separator: bool,
    statements: bool,
    opened_at: usize,
}

impl Frame {
    fn table(opened_at: usize) -> Frame {
        Frame {
            entries: IndexMap::new(),
            next_index: 1,
            pending: None,
            needs_separator: false,
            statements: false,
            opened_at,
        }
    }

    fn document() -> Frame {
        Frame {
            statements: true,
            ..Frame::table(0)
        }
    }

    fn accept_key(&mut self, key: TableKey, offset: usize) -> Result<()> {
        if self.pending.is_some() {
            return Err(Error::malformed(offset, "key follows key without a value"));
        }
        if self.needs_separator {
            return Err(Error::malformed(offset, "missing separator before key"));
        }
        self.pending = Some((key, offset));
        Ok(())
    }

    fn expect_value(&self, offset: usize) -> Result<()> {
        if self.needs_separator {
            return Err(Error::malformed(offset, "missing separator before value"));
        }
        if self.statements && self.pending.is_none() {
            return Err(Error::malformed(offset, "top-level value without a name"));
        }
        Ok(())
    }

    fn push_value(&mut self, value: TableValue) {
        let key = match self.pending.take() {
            Some((key, _)) => key,
            None => {
                let key = TableKey::Int(self.next_index);
                self.next_index += 1;
                key
            }
        };
        self.entries.insert(key, value);
        self.needs_separator = !self.statements;
    }

    fn separator(&mut self, offset: usize) -> Result<()> {
        if self.pending.is_some() {
            return Err(Error::malformed(offset, "separator between key and value"));
        }
        if !self.needs_separator && !self.statements {
            return Err(Error::malformed(offset, "unexpected separator"));
        }
        self.needs_separator = false;
        Ok(())
    }

    fn finish(self) -> Result<TableValue> {
        if let Some((_, offset)) = self.pending {
            return Err(Error::malformed(offset, "key without a value"));
        }
        Ok(TableValue::from_entries(self.entries))
    }
}

fn assemble(input: &str, root: Frame) -> Result<TableValue> {
    let mut tokens = TableParser::parse(Rule::file, input).map_err(|e| {
        let offset = match e.location {
            pest::error::InputLocation::Pos(pos) => pos,
            pest::error::InputLocation::Span((start, _)) => start,
        };
        Error::malformed(offset, format!("unexpected token: {}", e.variant.message()))
    })?;
    let file = tokens
        .next()
        .ok_or_else(|| Error::malformed(0, "empty token stream"))?;

    let mut stack = vec![root];

    for token in file.into_inner() {
        let offset = token.as_span().start();
        let frame = stack
            .last_mut()
            .ok_or_else(|| Error::malformed(offset, "container stack underflow"))?;

        match token.as_rule() {
            Rule::EOI => break,
            Rule::open => {
                frame.expect_value(offset)?;
                stack.push(Frame::table(offset));
            }
            Rule::close => {
                if stack.len() == 1 {
                    return Err(Error::malformed(offset, "unbalanced '}'"));
                }
                let closed = stack.pop().map(Frame::finish).transpose()?;
                if let (Some(value), Some(parent)) = (closed, stack.last_mut()) {
                    parent.push_value(value);
                }
            }
            Rule::separator => frame.separator(offset)?,
            Rule::bracket_key | Rule::name_key => {
                let key = parse_key(token)?;
                frame.accept_key(key, offset)?;
            }
            _ => {
                frame.expect_value(offset)?;
                let value = parse_scalar(token)?;
                frame.push_value(value);
            }
        }
    }

    if stack.len() > 1 {
        let opened_at = stack.last().map(|f| f.opened_at).unwrap_or_default();
        return Err(Error::malformed(
            input.len(),
            format!("unclosed '{{' opened at byte {}", opened_at),
        ));
    }

    stack
        .pop()
        .ok_or_else(|| Error::malformed(input.len(), "container stack underflow"))?
        .finish()
}

fn parse_key(token: Pair<Rule>) -> Result<TableKey> {
    let offset = token.as_span().start();
    let inner = token
        .into_inner()
        .next()
        .ok_or_else(|| Error::malformed(offset, "empty key"))?;

    match inner.as_rule() {
        Rule::ident => Ok(TableKey::Str(inner.as_str().to_string())),
        Rule::string => Ok(TableKey::Str(parse_string(inner)?)),
        Rule::integer => inner
            .as_str()
            .parse::<i64>()
            .map(TableKey::Int)
            .map_err(|e| Error::malformed(offset, format!("invalid integer key: {}", e))),
        _ => Err(Error::malformed(offset, "unsupported key type")),
    }
}

fn parse_scalar(token: Pair<Rule>) -> Result<TableValue> {
    let offset = token.as_span().start();
    let text = token.as_str();

    match token.as_rule() {
        Rule::string => Ok(TableValue::String(parse_string(token)?)),
        Rule::integer => Ok(TableValue::Number(match text.parse::<i64>() {
            Ok(i) => Number::Int(i),
            // out of i64 range, keep the magnitude
            Err(_) => Number::Float(parse_float(text, offset)?),
        })),
        Rule::hex => {
            let (negative, digits) = match text.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, text),
            };
            let value = i64::from_str_radix(&digits[2..], 16)
                .map_err(|e| Error::malformed(offset, format!("invalid hex literal: {}", e)))?;
            Ok(TableValue::Number(Number::Int(if negative {
                -value
            } else {
                value
            })))
        }
        Rule::float => Ok(TableValue::Number(Number::Float(parse_float(text, offset)?))),
        Rule::boolean => Ok(TableValue::Boolean(text == "true")),
        Rule::nil => Ok(TableValue::Nil),
        _ => Err(Error::malformed(
            offset,
            format!("unexpected token: '{}'", text),
        )),
    }
}

fn parse_float(text: &str, offset: usize) -> Result<f64> {
    text.parse::<f64>()
        .map_err(|e| Error::malformed(offset, format!("invalid number: {}", e)))
}

fn parse_string(token: Pair<Rule>) -> Result<String> {
    let offset = token.as_span().start();
    let inner = token
        .into_inner()
        .next()
        .ok_or_else(|| Error::malformed(offset, "string without body"))?;
    unescape(inner.as_str(), inner.as_span().start())
}

/// Resolve Lua escape sequences. `base` is the byte offset of `raw` in the
/// full input, used for error reporting.
fn unescape(raw: &str, base: usize) -> Result<String> {
    let bytes = raw.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut idx = 0;

    while idx < bytes.len() {
        if bytes[idx] != b'\\' {
            out.push(bytes[idx]);
            idx += 1;
            continue;
        }

        let at = base + idx;
        let escaped = *bytes
            .get(idx + 1)
            .ok_or_else(|| Error::malformed(at, "dangling escape"))?;
        idx += 2;

        match escaped {
            b'n' | b'\n' => out.push(b'\n'),
            b't' => out.push(b'\t'),
            b'r' => out.push(b'\r'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'v' => out.push(0x0b),
            b'\\' | b'"' | b'\'' => out.push(escaped),
            b'z' => {
                while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
                    idx += 1;
                }
            }
            b'x' => {
                let hex = raw
                    .get(idx..idx + 2)
                    .ok_or_else(|| Error::malformed(at, "truncated \\x escape"))?;
                let byte = u8::from_str_radix(hex, 16)
                    .map_err(|_| Error::malformed(at, "invalid \\x escape"))?;
                out.push(byte);
                idx += 2;
            }
            b'0'..=b'9' => {
                let start = idx - 1;
                let mut end = start;
                while end < bytes.len() && end < start + 3 && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                let value: u32 = raw[start..end]
                    .parse()
                    .map_err(|_| Error::malformed(at, "invalid decimal escape"))?;
                let byte =
                    u8::try_from(value).map_err(|_| Error::malformed(at, "decimal escape too large"))?;
                out.push(byte);
                idx = end;
            }
            _ => {
                return Err(Error::malformed(
                    at,
                    format!("unknown escape '\\{}'", escaped as char),
                ))
            }
        }
    }

    Ok(String::from_utf8_lossy(&out).into_owned())
}
