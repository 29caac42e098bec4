//! Raw Part 21 entity graph.
//!
//! The kernel's B-rep table resolves geometry and topology but drops solid
//! membership, shell orientation and placement entities. This module reads
//! the first DATA section into untyped records so those can be recovered.
//! Complex instances (`#1 = (A() B());`) keep one record per partial type.

use std::collections::HashMap;

use thiserror::Error;

/// Malformed Part 21 text.
#[derive(Debug, Error)]
#[error("STEP syntax error on line {line}: {message}")]
pub(crate) struct SyntaxError {
    line: usize,
    message: String,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Keyword(String),
    Ref(u64),
    Str(String),
    Real(f64),
    Integer(i64),
    Enum(String),
    LParen,
    RParen,
    Comma,
    Semicolon,
    Equals,
    Asterisk,
    Dollar,
}

/// One attribute value.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    Ref(u64),
    Str(String),
    Real(f64),
    Integer(i64),
    Enum(String),
    List(Vec<Value>),
    /// `*`
    Derived,
    /// `$`
    Null,
    Typed { type_name: String, args: Vec<Value> },
}

impl Value {
    pub(crate) fn as_ref_id(&self) -> Option<u64> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// Reals, accepting integers.
    pub(crate) fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub(crate) fn as_enum(&self) -> Option<&str> {
        match self {
            Value::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }
}

/// `TYPE_NAME(args)`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Record {
    pub(crate) type_name: String,
    pub(crate) args: Vec<Value>,
}

#[derive(Debug, Clone)]
struct Entity {
    records: Vec<Record>,
}

/// DATA section entities by id.
#[derive(Debug, Default)]
pub(crate) struct EntityGraph {
    entities: HashMap<u64, Entity>,
}

impl EntityGraph {
    /// Parse the first DATA section of a STEP file.
    pub(crate) fn parse(text: &str) -> Result<Self, SyntaxError> {
        let tokens = Lexer::new(text).tokenize()?;
        Parser { tokens, pos: 0 }.parse_data()
    }

    /// Number of entity instances.
    pub(crate) fn len(&self) -> usize {
        self.entities.len()
    }

    /// The record of `type_name` in entity `id`, simple or complex.
    pub(crate) fn record(&self, id: u64, type_name: &str) -> Option<&Record> {
        self.entities
            .get(&id)?
            .records
            .iter()
            .find(|r| r.type_name == type_name)
    }

    /// Every record of `type_name`, by ascending entity id.
    pub(crate) fn records_of_type(&self, type_name: &str) -> Vec<(u64, &Record)> {
        let mut found: Vec<(u64, &Record)> = self
            .entities
            .iter()
            .flat_map(|(&id, e)| {
                e.records
                    .iter()
                    .filter(move |r| r.type_name == type_name)
                    .map(move |r| (id, r))
            })
            .collect();
        found.sort_unstable_by_key(|(id, _)| *id);
        found
    }
}

struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            input: text.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            line: self.line,
            message: message.into(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<(Token, usize)>, SyntaxError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push((token, self.line));
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> String {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_whitespace() => {
                    self.bump();
                }
                Some(b'/') if self.input.get(self.pos + 1) == Some(&b'*') => {
                    self.pos += 2;
                    while let Some(c) = self.bump() {
                        if c == b'*' && self.peek() == Some(b'/') {
                            self.pos += 1;
                            break;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, SyntaxError> {
        self.skip_trivia();
        let Some(c) = self.peek() else {
            return Ok(None);
        };
        let token = match c {
            b'(' | b')' | b',' | b';' | b'=' | b'*' | b'$' => {
                self.pos += 1;
                match c {
                    b'(' => Token::LParen,
                    b')' => Token::RParen,
                    b',' => Token::Comma,
                    b';' => Token::Semicolon,
                    b'=' => Token::Equals,
                    b'*' => Token::Asterisk,
                    _ => Token::Dollar,
                }
            }
            b'#' => {
                self.pos += 1;
                let digits = self.take_while(|c| c.is_ascii_digit());
                let id = digits
                    .parse()
                    .map_err(|_| self.error("malformed entity reference"))?;
                Token::Ref(id)
            }
            b'\'' => self.string()?,
            b'"' => {
                self.pos += 1;
                let bits = self.take_while(|c| c != b'"');
                if self.bump() != Some(b'"') {
                    return Err(self.error("unterminated binary literal"));
                }
                Token::Str(bits)
            }
            b'.' => {
                self.pos += 1;
                let name = self.take_while(|c| c.is_ascii_alphanumeric() || c == b'_');
                if self.bump() != Some(b'.') {
                    return Err(self.error(format!("unterminated enumeration .{name}")));
                }
                Token::Enum(name)
            }
            b'+' | b'-' | b'0'..=b'9' => self.number()?,
            c if c.is_ascii_alphabetic() || c == b'_' || c == b'!' => Token::Keyword(
                self.take_while(|c| c.is_ascii_alphanumeric() || matches!(c, b'_' | b'-' | b'!')),
            ),
            other => {
                return Err(self.error(format!("unexpected character '{}'", other as char)));
            }
        };
        Ok(Some(token))
    }

    fn string(&mut self) -> Result<Token, SyntaxError> {
        self.pos += 1;
        let mut bytes = Vec::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some(b'\'') if self.peek() == Some(b'\'') => {
                    self.pos += 1;
                    bytes.push(b'\'');
                }
                Some(b'\'') => break,
                Some(c) => bytes.push(c),
            }
        }
        Ok(Token::Str(String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn number(&mut self) -> Result<Token, SyntaxError> {
        let start = self.pos;
        if matches!(self.peek(), Some(b'+' | b'-')) {
            self.pos += 1;
        }
        self.take_while(|c| c.is_ascii_digit());
        let mut real = false;
        if self.peek() == Some(b'.') {
            real = true;
            self.pos += 1;
            self.take_while(|c| c.is_ascii_digit());
        }
        if matches!(self.peek(), Some(b'E' | b'e')) {
            real = true;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            self.take_while(|c| c.is_ascii_digit());
        }
        let text = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
        let token = if real {
            text.parse().map(Token::Real).ok()
        } else {
            text.parse().map(Token::Integer).ok()
        };
        token.ok_or_else(|| self.error(format!("malformed number '{text}'")))
    }
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn error(&self, message: impl Into<String>) -> SyntaxError {
        let line = self
            .tokens
            .get(self.pos)
            .or(self.tokens.last())
            .map_or(1, |(_, line)| *line);
        SyntaxError {
            line,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<(), SyntaxError> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected {expected:?}, found {:?}", self.peek())))
        }
    }

    fn parse_data(mut self) -> Result<EntityGraph, SyntaxError> {
        let data = Token::Keyword("DATA".into());
        while self.peek().is_some_and(|t| *t != data) {
            self.pos += 1;
        }
        self.expect(&data)?;
        if self.peek() == Some(&Token::LParen) {
            self.parse_args()?;
        }
        self.expect(&Token::Semicolon)?;

        let mut graph = EntityGraph::default();
        loop {
            match self.advance() {
                Some(Token::Keyword(k)) if k == "ENDSEC" => return Ok(graph),
                Some(Token::Ref(id)) => {
                    self.expect(&Token::Equals)?;
                    let records = self.parse_instance()?;
                    self.expect(&Token::Semicolon)?;
                    graph.entities.insert(id, Entity { records });
                }
                other => {
                    self.pos = self.pos.saturating_sub(1);
                    return Err(self.error(format!("expected entity instance, found {other:?}")));
                }
            }
        }
    }

    fn parse_instance(&mut self) -> Result<Vec<Record>, SyntaxError> {
        if self.peek() != Some(&Token::LParen) {
            return Ok(vec![self.parse_record()?]);
        }
        self.pos += 1;
        let mut records = Vec::new();
        while matches!(self.peek(), Some(Token::Keyword(_))) {
            records.push(self.parse_record()?);
        }
        self.expect(&Token::RParen)?;
        Ok(records)
    }

    fn parse_record(&mut self) -> Result<Record, SyntaxError> {
        match self.advance() {
            Some(Token::Keyword(type_name)) => Ok(Record {
                type_name,
                args: self.parse_args()?,
            }),
            other => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.error(format!("expected type name, found {other:?}")))
            }
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Value>, SyntaxError> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.parse_value()?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                other => {
                    self.pos = self.pos.saturating_sub(1);
                    return Err(self.error(format!("expected ',' or ')', found {other:?}")));
                }
            }
        }
    }

    fn parse_value(&mut self) -> Result<Value, SyntaxError> {
        match self.peek() {
            Some(Token::LParen) => return self.parse_args().map(Value::List),
            Some(Token::Keyword(_)) => {
                let record = self.parse_record()?;
                return Ok(Value::Typed {
                    type_name: record.type_name,
                    args: record.args,
                });
            }
            _ => {}
        }
        let value = match self.advance() {
            Some(Token::Ref(id)) => Value::Ref(id),
            Some(Token::Str(s)) => Value::Str(s),
            Some(Token::Real(v)) => Value::Real(v),
            Some(Token::Integer(v)) => Value::Integer(v),
            Some(Token::Enum(s)) => Value::Enum(s),
            Some(Token::Asterisk) => Value::Derived,
            Some(Token::Dollar) => Value::Null,
            other => {
                self.pos = self.pos.saturating_sub(1);
                return Err(self.error(format!("unexpected value {other:?}")));
            }
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "ISO-10303-21;
HEADER;
FILE_DESCRIPTION(('DATA in a string'),'2;1');
ENDSEC;
DATA;
/* a comment; with punctuation */
#1 = CARTESIAN_POINT('it''s', (0., -1.5E1, 2));
#2 = DIRECTION('', (0.0, 0.0, 1.0));
#3 = AXIS2_PLACEMENT_3D('', #1, #2, $);
#4 = ORIENTED_CLOSED_SHELL('', *, #9, .F.);
#5 = ( GEOMETRIC_REPRESENTATION_CONTEXT(3) REPRESENTATION_CONTEXT('', '3D') );
#6 = MEASURE_WITH_UNIT(LENGTH_MEASURE(1.E-3), #5);
ENDSEC;
END-ISO-10303-21;
";

    #[test]
    fn test_parse_simple_records() {
        let graph = EntityGraph::parse(DOC).unwrap();
        assert_eq!(graph.len(), 6);

        let point = graph.record(1, "CARTESIAN_POINT").unwrap();
        assert_eq!(point.args[0], Value::Str("it's".into()));
        let coords: Vec<f64> = point.args[1]
            .as_list()
            .unwrap()
            .iter()
            .filter_map(Value::as_real)
            .collect();
        assert_eq!(coords, vec![0.0, -15.0, 2.0]);

        let placement = graph.record(3, "AXIS2_PLACEMENT_3D").unwrap();
        assert_eq!(placement.args[1].as_ref_id(), Some(1));
        assert_eq!(placement.args[3], Value::Null);

        let oriented = graph.record(4, "ORIENTED_CLOSED_SHELL").unwrap();
        assert_eq!(oriented.args[1], Value::Derived);
        assert_eq!(oriented.args[3].as_enum(), Some("F"));
    }

    #[test]
    fn test_complex_and_typed() {
        let graph = EntityGraph::parse(DOC).unwrap();
        assert!(graph.record(5, "REPRESENTATION_CONTEXT").is_some());
        assert!(graph.record(5, "GEOMETRIC_REPRESENTATION_CONTEXT").is_some());
        assert!(graph.record(5, "CARTESIAN_POINT").is_none());

        let measure = graph.record(6, "MEASURE_WITH_UNIT").unwrap();
        assert!(matches!(
            &measure.args[0],
            Value::Typed { type_name, args } if type_name == "LENGTH_MEASURE" && args[0] == Value::Real(1e-3)
        ));
    }

    #[test]
    fn test_records_of_type_sorted() {
        let text = "DATA;\n#9 = A(1);\n#2 = A(2);\n#5 = (A(3) B());\nENDSEC;";
        let graph = EntityGraph::parse(text).unwrap();
        let ids: Vec<u64> = graph.records_of_type("A").iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[test]
    fn test_errors_report_line() {
        let err = EntityGraph::parse("DATA;\n#1 = A(1);\n#2 = B('open);\nENDSEC;").unwrap_err();
        assert!(err.to_string().contains("unterminated string"), "{err}");

        let err = EntityGraph::parse("DATA;\n#1 = A(1);\n#2 = B(1 2);\nENDSEC;").unwrap_err();
        assert_eq!(err.line, 3);

        assert!(EntityGraph::parse("HEADER; ENDSEC;").is_err());
    }
}
