//! The variant wire format.
//!
//! A printable, round-trippable rendering of data values used at the
//! boundary with foreign or dynamically typed consumers. Constructors:
//!
//! ```text
//! UNIT | BOOL b | INT n | REAL r | CHAR 'c' | STRING "s"
//! LIST [v, …] | BAG [v, …] | VECTOR [v, …] | RECORD {k=v, …}
//! NONE | SOME v | CONSTANT name | CONSTRUCT name v
//! ```
//!
//! `parse (print v) = v` holds for every data value. Functions have no
//! wire rendering and [`print`] rejects them.

use crate::value::Value;
use quill_util::{Label, Symbol};
use std::fmt::Write as _;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VariantError {
    #[error("function values have no wire format")]
    Unprintable,
    #[error("unexpected input at offset {0}")]
    Unexpected(usize),
    #[error("unexpected end of input")]
    Eof,
}

/// Print a data value in the wire format
pub fn print(value: &Value) -> Result<String, VariantError> {
    let mut out = String::new();
    write_value(&mut out, value)?;
    Ok(out)
}

fn write_value(out: &mut String, value: &Value) -> Result<(), VariantError> {
    match &value.deref() {
        Value::Unit => out.push_str("UNIT"),
        Value::Bool(b) => {
            let _ = write!(out, "BOOL {}", b);
        }
        Value::Int(n) => {
            let _ = write!(out, "INT {}", n);
        }
        Value::Real(r) => {
            // {:?} of f64 round-trips exactly.
            let _ = write!(out, "REAL {:?}", r);
        }
        Value::Char(c) => {
            out.push_str("CHAR '");
            write_escaped_char(out, *c, '\'');
            out.push('\'');
        }
        Value::Str(s) => {
            out.push_str("STRING \"");
            for c in s.chars() {
                write_escaped_char(out, c, '"');
            }
            out.push('"');
        }
        Value::List(items) => write_seq(out, "LIST", items)?,
        Value::Bag(items) => write_seq(out, "BAG", items)?,
        Value::Vector(items) => write_seq(out, "VECTOR", items)?,
        Value::Tuple(items) => {
            // Tuples are records with ordinal labels on the wire.
            out.push_str("RECORD {");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{}=", i + 1);
                write_value(out, item)?;
            }
            out.push('}');
        }
        Value::Record(fields) => {
            out.push_str("RECORD {");
            for (i, (label, item)) in fields.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{}=", label);
                write_value(out, item)?;
            }
            out.push('}');
        }
        Value::Constructed { ctor, arg } => match (ctor.as_str(), arg) {
            ("NONE", None) => out.push_str("NONE"),
            ("SOME", Some(arg)) => {
                out.push_str("SOME ");
                write_value(out, arg)?;
            }
            (name, None) => {
                let _ = write!(out, "CONSTANT {}", name);
            }
            (name, Some(arg)) => {
                let _ = write!(out, "CONSTRUCT {} ", name);
                write_value(out, arg)?;
            }
        },
        _ => return Err(VariantError::Unprintable),
    }
    Ok(())
}

fn write_seq(out: &mut String, head: &str, items: &[Value]) -> Result<(), VariantError> {
    out.push_str(head);
    out.push_str(" [");
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_value(out, item)?;
    }
    out.push(']');
    Ok(())
}

fn write_escaped_char(out: &mut String, c: char, quote: char) {
    match c {
        '\\' => out.push_str("\\\\"),
        '\n' => out.push_str("\\n"),
        '\t' => out.push_str("\\t"),
        '\r' => out.push_str("\\r"),
        c if c == quote => {
            out.push('\\');
            out.push(quote);
        }
        c if c.is_control() => {
            let _ = write!(out, "\\u{{{:x}}}", c as u32);
        }
        c => out.push(c),
    }
}

/// Parse a wire-format rendering back to a value
pub fn parse(input: &str) -> Result<Value, VariantError> {
    let mut parser = WireParser {
        input: input.as_bytes(),
        pos: 0,
    };
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos != parser.input.len() {
        return Err(VariantError::Unexpected(parser.pos));
    }
    Ok(value)
}

struct WireParser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl WireParser<'_> {
    fn skip_ws(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<(), VariantError> {
        self.skip_ws();
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else if self.pos >= self.input.len() {
            Err(VariantError::Eof)
        } else {
            Err(VariantError::Unexpected(self.pos))
        }
    }

    fn word(&mut self) -> Result<&str, VariantError> {
        self.skip_ws();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            self.pos += 1;
        }
        if self.pos == start {
            return if self.pos >= self.input.len() {
                Err(VariantError::Eof)
            } else {
                Err(VariantError::Unexpected(self.pos))
            };
        }
        std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| VariantError::Unexpected(start))
    }

    fn value(&mut self) -> Result<Value, VariantError> {
        let start = self.pos;
        let head = self.word()?.to_string();
        match head.as_str() {
            "UNIT" => Ok(Value::Unit),
            "BOOL" => match self.word()? {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(VariantError::Unexpected(self.pos)),
            },
            "INT" => self.int().map(Value::Int),
            "REAL" => self.real().map(Value::Real),
            "CHAR" => self.char_literal(),
            "STRING" => self.string_literal().map(Value::str),
            "LIST" => self.seq().map(Value::list),
            "BAG" => self.seq().map(Value::bag),
            "VECTOR" => self.seq().map(|items| Value::Vector(Rc::new(items))),
            "RECORD" => self.record(),
            "NONE" => Ok(Value::Constructed {
                ctor: Symbol::intern("NONE"),
                arg: None,
            }),
            "SOME" => {
                let inner = self.value()?;
                Ok(Value::Constructed {
                    ctor: Symbol::intern("SOME"),
                    arg: Some(Rc::new(inner)),
                })
            }
            "CONSTANT" => {
                let name = self.word()?;
                Ok(Value::Constructed {
                    ctor: Symbol::intern(name),
                    arg: None,
                })
            }
            "CONSTRUCT" => {
                let name = Symbol::intern(self.word()?);
                let inner = self.value()?;
                Ok(Value::Constructed {
                    ctor: name,
                    arg: Some(Rc::new(inner)),
                })
            }
            _ => Err(VariantError::Unexpected(start)),
        }
    }

    fn int(&mut self) -> Result<i64, VariantError> {
        self.skip_ws();
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        std::str::from_utf8(&self.input[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(VariantError::Unexpected(start))
    }

    fn real(&mut self) -> Result<f64, VariantError> {
        self.skip_ws();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E'))
        {
            self.pos += 1;
        }
        // `inf`/`NaN` spellings from {:?}
        if self.pos == start {
            let rest = &self.input[self.pos..];
            for spelling in ["inf", "-inf", "NaN"] {
                if rest.starts_with(spelling.as_bytes()) {
                    self.pos += spelling.len();
                    return Ok(match spelling {
                        "inf" => f64::INFINITY,
                        "-inf" => f64::NEG_INFINITY,
                        _ => f64::NAN,
                    });
                }
            }
        }
        std::str::from_utf8(&self.input[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(VariantError::Unexpected(start))
    }

    fn char_literal(&mut self) -> Result<Value, VariantError> {
        self.expect(b'\'')?;
        let c = self.escaped_char(b'\'')?;
        self.expect(b'\'')?;
        Ok(Value::Char(c))
    }

    fn string_literal(&mut self) -> Result<String, VariantError> {
        self.expect(b'"')?;
        let mut out = String::new();
        loop {
            match self.peek() {
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(_) => out.push(self.escaped_char(b'"')?),
                None => return Err(VariantError::Eof),
            }
        }
    }

    fn escaped_char(&mut self, quote: u8) -> Result<char, VariantError> {
        let rest = &self.input[self.pos..];
        let text = std::str::from_utf8(rest).map_err(|_| VariantError::Unexpected(self.pos))?;
        let mut chars = text.chars();
        let c = chars.next().ok_or(VariantError::Eof)?;
        if c != '\\' {
            self.pos += c.len_utf8();
            return Ok(c);
        }
        self.pos += 1;
        let escape = text.chars().nth(1).ok_or(VariantError::Eof)?;
        self.pos += escape.len_utf8();
        match escape {
            'n' => Ok('\n'),
            't' => Ok('\t'),
            'r' => Ok('\r'),
            '\\' => Ok('\\'),
            'u' => {
                // \u{hex}
                if self.peek() != Some(b'{') {
                    return Err(VariantError::Unexpected(self.pos));
                }
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|b| b.is_ascii_hexdigit()) {
                    self.pos += 1;
                }
                let code = std::str::from_utf8(&self.input[start..self.pos])
                    .ok()
                    .and_then(|s| u32::from_str_radix(s, 16).ok())
                    .ok_or(VariantError::Unexpected(start))?;
                if self.peek() != Some(b'}') {
                    return Err(VariantError::Unexpected(self.pos));
                }
                self.pos += 1;
                char::from_u32(code).ok_or(VariantError::Unexpected(start))
            }
            c if c as u8 == quote => Ok(c),
            _ => Err(VariantError::Unexpected(self.pos)),
        }
    }

    fn seq(&mut self) -> Result<Vec<Value>, VariantError> {
        self.expect(b'[')?;
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(items);
        }
        loop {
            items.push(self.value()?);
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    return Ok(items);
                }
                Some(_) => return Err(VariantError::Unexpected(self.pos)),
                None => return Err(VariantError::Eof),
            }
        }
    }

    fn record(&mut self) -> Result<Value, VariantError> {
        self.expect(b'{')?;
        let mut fields: Vec<(Label, Value)> = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(Value::record(fields.into_iter().collect()));
        }
        loop {
            let label = Label::from(self.word()?);
            self.expect(b'=')?;
            let value = self.value()?;
            fields.push((label, value));
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => return Err(VariantError::Unexpected(self.pos)),
                None => return Err(VariantError::Eof),
            }
        }
        // Records with exactly the labels 1..n are tuples.
        let map: quill_util::LabelMap<Value> = fields.into_iter().collect();
        if map.is_tuple_shaped() {
            Ok(Value::tuple(map.values().cloned().collect()))
        } else {
            Ok(Value::record(map))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::value_eq;

    fn round_trip(value: Value) {
        let printed = print(&value).unwrap();
        let parsed = parse(&printed).unwrap_or_else(|e| panic!("parse {:?}: {}", printed, e));
        assert!(
            value_eq(&parsed, &value),
            "round trip changed {:?} (printed {:?})",
            value,
            printed
        );
    }

    #[test]
    fn test_primitives() {
        round_trip(Value::Unit);
        round_trip(Value::Bool(true));
        round_trip(Value::Int(42));
        round_trip(Value::Int(-7));
        round_trip(Value::Real(2.5));
        round_trip(Value::Real(-0.125));
        round_trip(Value::Char('x'));
        round_trip(Value::Char('\n'));
        round_trip(Value::str("hello"));
        round_trip(Value::str("with \"quotes\" and \\slash"));
    }

    #[test]
    fn test_collections() {
        round_trip(Value::list(vec![Value::Int(1), Value::Int(2)]));
        round_trip(Value::bag(vec![Value::str("a")]));
        round_trip(Value::Vector(Rc::new(vec![Value::Bool(false)])));
        round_trip(Value::list(vec![]));
    }

    #[test]
    fn test_records_and_tuples() {
        round_trip(Value::record(
            [
                (Label::from("deptno"), Value::Int(10)),
                (Label::from("name"), Value::str("SALES")),
            ]
            .into_iter()
            .collect(),
        ));
        round_trip(Value::tuple(vec![Value::Int(1), Value::str("a")]));
    }

    #[test]
    fn test_option_and_constructors() {
        round_trip(Value::Constructed {
            ctor: Symbol::intern("NONE"),
            arg: None,
        });
        round_trip(Value::Constructed {
            ctor: Symbol::intern("SOME"),
            arg: Some(Rc::new(Value::Int(3))),
        });
        round_trip(Value::Constructed {
            ctor: Symbol::intern("RED"),
            arg: None,
        });
        round_trip(Value::Constructed {
            ctor: Symbol::intern("NODE"),
            arg: Some(Rc::new(Value::tuple(vec![Value::Int(1), Value::Int(2)]))),
        });
    }

    #[test]
    fn test_nested() {
        round_trip(Value::list(vec![Value::record(
            [
                (Label::from("x"), Value::Int(1)),
                (
                    Label::from("opt"),
                    Value::Constructed {
                        ctor: Symbol::intern("SOME"),
                        arg: Some(Rc::new(Value::list(vec![Value::Int(9)]))),
                    },
                ),
            ]
            .into_iter()
            .collect(),
        )]));
    }

    #[test]
    fn test_print_example() {
        let v = Value::list(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(print(&v).unwrap(), "LIST [INT 1, INT 2]");
    }

    #[test]
    fn test_functions_are_unprintable() {
        let f = crate::builtins::BuiltinClosure::value(crate::builtins::BuiltinKind::Not);
        assert_eq!(print(&f), Err(VariantError::Unprintable));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("NOPE").is_err());
        assert!(parse("INT").is_err());
        assert!(parse("LIST [INT 1").is_err());
        assert!(parse("INT 1 trailing").is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::value::value_eq;
    use proptest::prelude::*;

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Unit),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            any::<i32>().prop_map(|n| Value::Real(f64::from(n) / 8.0)),
            proptest::char::range('a', 'z').prop_map(Value::Char),
            "[a-zA-Z0-9 ]{0,12}".prop_map(Value::str),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::list),
                proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::bag),
                proptest::collection::vec(inner.clone(), 1..4)
                    .prop_map(|items| Value::tuple(items)),
                (proptest::collection::vec(inner.clone(), 1..4)).prop_map(|items| {
                    Value::record(
                        items
                            .into_iter()
                            .enumerate()
                            .map(|(i, v)| (quill_util::Label::from(format!("f{}", i).as_str()), v))
                            .collect(),
                    )
                }),
                inner.prop_map(|v| Value::Constructed {
                    ctor: quill_util::Symbol::intern("SOME"),
                    arg: Some(std::rc::Rc::new(v)),
                }),
            ]
        })
    }

    proptest! {
        /// The round-trip property the wire format promises.
        #[test]
        fn prop_parse_print_round_trip(value in arb_value()) {
            let printed = print(&value).unwrap();
            let parsed = parse(&printed).unwrap();
            prop_assert!(value_eq(&parsed, &value));
        }
    }
}
