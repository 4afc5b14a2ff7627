//! Expression Evaluator (spec §4.2): a small hand-written recursive-descent
//! parser and evaluator for `when`/`assert`/`condition` strings, evaluated
//! purely against a [`VariableStore`] snapshot.

use crate::store::VariableStore;
use regex::Regex;
use testmesh_domain::Value;
use testmesh_foundation::Error;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

fn lex(input: &str) -> Result<Vec<Token>, Error> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '(' {
            tokens.push(Token::LParen);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::RParen);
            i += 1;
        } else if c == ',' {
            tokens.push(Token::Comma);
            i += 1;
        } else if c == '"' || c == '\'' {
            let quote = c;
            let start = i + 1;
            let mut j = start;
            while j < chars.len() && chars[j] != quote {
                j += 1;
            }
            if j >= chars.len() {
                return Err(Error::config_invalid(format!(
                    "unterminated string literal in expression: {input}"
                )));
            }
            tokens.push(Token::Str(chars[start..j].iter().collect()));
            i = j + 1;
        } else if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let num = text
                .parse::<f64>()
                .map_err(|_| Error::config_invalid(format!("invalid number literal: {text}")))?;
            tokens.push(Token::Num(num));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else {
            let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
            let op = match two.as_str() {
                "==" | "!=" | "<=" | ">=" | "&&" | "||" => {
                    i += 2;
                    match two.as_str() {
                        "==" => "==",
                        "!=" => "!=",
                        "<=" => "<=",
                        ">=" => ">=",
                        "&&" => "&&",
                        "||" => "||",
                        _ => unreachable!(),
                    }
                }
                _ => {
                    i += 1;
                    match c {
                        '<' => "<",
                        '>' => ">",
                        '!' => "!",
                        '+' => "+",
                        '-' => "-",
                        '*' => "*",
                        '/' => "/",
                        _ => {
                            return Err(Error::config_invalid(format!(
                                "unexpected character '{c}' in expression: {input}"
                            )))
                        }
                    }
                }
            };
            tokens.push(Token::Op(op));
        }
    }
    Ok(tokens)
}

/// The parsed form of an expression string, reusable across evaluations
/// (e.g. a `for_each` body's `assert` is parsed once, evaluated per item).
pub struct Expr {
    tokens: Vec<Token>,
}

impl Expr {
    pub fn parse(source: &str) -> Result<Self, Error> {
        let tokens = lex(source)?;
        // Validate eagerly so malformed expressions fail at flow-load time.
        let mut parser = Parser { tokens: &tokens, pos: 0 };
        parser.parse_or()?;
        if parser.pos != tokens.len() {
            return Err(Error::config_invalid(format!(
                "trailing tokens in expression: {source}"
            )));
        }
        Ok(Self { tokens })
    }

    pub fn evaluate(&self, store: &VariableStore) -> Result<Value, Error> {
        let mut parser = Parser {
            tokens: &self.tokens,
            pos: 0,
        };
        parser.parse_or_eval(store)
    }

    /// Evaluate and coerce to bool, the form `when`/`assert`/`wait_until`
    /// conditions need.
    pub fn evaluate_bool(&self, store: &VariableStore) -> Result<bool, Error> {
        match self.evaluate(store)? {
            Value::Bool(b) => Ok(b),
            other => Err(Error::assertion_failed(format!(
                "expression did not evaluate to a boolean: {other}"
            ))),
        }
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        self.pos += 1;
        t
    }

    fn expect_op(&mut self, op: &'static str) -> bool {
        if self.peek() == Some(&Token::Op(op)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op_rparen(&mut self) -> bool {
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    // Grammar, lowest to highest precedence:
    //   or := and ('||' and)*
    //   and := equality ('&&' equality)*
    //   equality := relational (('==' | '!=') relational)*
    //   relational := additive (('<'|'<='|'>'|'>='|'in'|'contains') additive)*
    //   additive := multiplicative (('+' | '-') multiplicative)*
    //   multiplicative := unary (('*' | '/') unary)*
    //   unary := ('!' | '-')? primary
    //   primary := literal | ident | call | '(' or ')'

    fn parse_or(&mut self) -> Result<(), Error> {
        self.parse_and()?;
        while self.expect_op("||") {
            self.parse_and()?;
        }
        Ok(())
    }

    fn parse_and(&mut self) -> Result<(), Error> {
        self.parse_equality()?;
        while self.expect_op("&&") {
            self.parse_equality()?;
        }
        Ok(())
    }

    fn parse_equality(&mut self) -> Result<(), Error> {
        self.parse_relational()?;
        while self.expect_op("==") || self.expect_op("!=") {
            self.parse_relational()?;
        }
        Ok(())
    }

    fn parse_relational(&mut self) -> Result<(), Error> {
        self.parse_additive()?;
        loop {
            if self.expect_op("<") || self.expect_op("<=") || self.expect_op(">") || self.expect_op(">=") {
                self.parse_additive()?;
            } else if matches!(self.peek(), Some(Token::Ident(s)) if s == "in" || s == "contains") {
                self.pos += 1;
                self.parse_additive()?;
            } else {
                break;
            }
        }
        Ok(())
    }

    fn parse_additive(&mut self) -> Result<(), Error> {
        self.parse_multiplicative()?;
        while self.expect_op("+") || self.expect_op("-") {
            self.parse_multiplicative()?;
        }
        Ok(())
    }

    fn parse_multiplicative(&mut self) -> Result<(), Error> {
        self.parse_unary()?;
        while self.expect_op("*") || self.expect_op("/") {
            self.parse_unary()?;
        }
        Ok(())
    }

    fn parse_unary(&mut self) -> Result<(), Error> {
        if self.expect_op("!") || self.expect_op("-") {
            return self.parse_unary();
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<(), Error> {
        match self.advance().cloned() {
            Some(Token::Num(_)) | Some(Token::Str(_)) => Ok(()),
            Some(Token::Ident(_)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    if self.peek() != Some(&Token::RParen) {
                        self.parse_or()?;
                        while self.peek() == Some(&Token::Comma) {
                            self.pos += 1;
                            self.parse_or()?;
                        }
                    }
                    if self.peek() != Some(&Token::RParen) {
                        return Err(Error::config_invalid("unterminated call expression"));
                    }
                    self.pos += 1;
                }
                Ok(())
            }
            Some(Token::LParen) => {
                self.parse_or()?;
                if self.peek() != Some(&Token::RParen) {
                    return Err(Error::config_invalid("unbalanced parentheses in expression"));
                }
                self.pos += 1;
                Ok(())
            }
            other => Err(Error::config_invalid(format!(
                "unexpected token in expression: {other:?}"
            ))),
        }
    }

    // --- evaluating variants, mirroring the grammar above ---

    fn parse_or_eval(&mut self, store: &VariableStore) -> Result<Value, Error> {
        let mut left = self.parse_and_eval(store)?;
        while self.expect_op("||") {
            let right = self.parse_and_eval(store)?;
            left = Value::Bool(truthy(&left) || truthy(&right));
        }
        Ok(left)
    }

    fn parse_and_eval(&mut self, store: &VariableStore) -> Result<Value, Error> {
        let mut left = self.parse_equality_eval(store)?;
        while self.expect_op("&&") {
            let right = self.parse_equality_eval(store)?;
            left = Value::Bool(truthy(&left) && truthy(&right));
        }
        Ok(left)
    }

    fn parse_equality_eval(&mut self, store: &VariableStore) -> Result<Value, Error> {
        let mut left = self.parse_relational_eval(store)?;
        loop {
            if self.expect_op("==") {
                let right = self.parse_relational_eval(store)?;
                left = Value::Bool(values_equal(&left, &right));
            } else if self.expect_op("!=") {
                let right = self.parse_relational_eval(store)?;
                left = Value::Bool(!values_equal(&left, &right));
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_relational_eval(&mut self, store: &VariableStore) -> Result<Value, Error> {
        let mut left = self.parse_additive_eval(store)?;
        loop {
            if self.expect_op("<") {
                let right = self.parse_additive_eval(store)?;
                left = Value::Bool(compare(&left, &right)? == std::cmp::Ordering::Less);
            } else if self.expect_op("<=") {
                let right = self.parse_additive_eval(store)?;
                left = Value::Bool(compare(&left, &right)? != std::cmp::Ordering::Greater);
            } else if self.expect_op(">") {
                let right = self.parse_additive_eval(store)?;
                left = Value::Bool(compare(&left, &right)? == std::cmp::Ordering::Greater);
            } else if self.expect_op(">=") {
                let right = self.parse_additive_eval(store)?;
                left = Value::Bool(compare(&left, &right)? != std::cmp::Ordering::Less);
            } else if matches!(self.peek(), Some(Token::Ident(s)) if s == "in") {
                self.pos += 1;
                let right = self.parse_additive_eval(store)?;
                left = Value::Bool(contains(&right, &left));
            } else if matches!(self.peek(), Some(Token::Ident(s)) if s == "contains") {
                self.pos += 1;
                let right = self.parse_additive_eval(store)?;
                left = Value::Bool(contains(&left, &right));
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_additive_eval(&mut self, store: &VariableStore) -> Result<Value, Error> {
        let mut left = self.parse_multiplicative_eval(store)?;
        loop {
            if self.expect_op("+") {
                let right = self.parse_multiplicative_eval(store)?;
                left = add(&left, &right)?;
            } else if self.expect_op("-") {
                let right = self.parse_multiplicative_eval(store)?;
                left = Value::Num(num(&left)? - num(&right)?);
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_multiplicative_eval(&mut self, store: &VariableStore) -> Result<Value, Error> {
        let mut left = self.parse_unary_eval(store)?;
        loop {
            if self.expect_op("*") {
                let right = self.parse_unary_eval(store)?;
                left = Value::Num(num(&left)? * num(&right)?);
            } else if self.expect_op("/") {
                let right = self.parse_unary_eval(store)?;
                left = Value::Num(num(&left)? / num(&right)?);
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_unary_eval(&mut self, store: &VariableStore) -> Result<Value, Error> {
        if self.expect_op("!") {
            let v = self.parse_unary_eval(store)?;
            return Ok(Value::Bool(!truthy(&v)));
        }
        if self.expect_op("-") {
            let v = self.parse_unary_eval(store)?;
            return Ok(Value::Num(-num(&v)?));
        }
        self.parse_primary_eval(store)
    }

    fn parse_primary_eval(&mut self, store: &VariableStore) -> Result<Value, Error> {
        match self.advance().cloned() {
            Some(Token::Num(n)) => Ok(Value::Num(n)),
            Some(Token::Str(s)) => Ok(Value::Str(s)),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    // exists() takes a variable path, not its evaluated value, so an
                    // undefined path must not error out from eager evaluation below.
                    if name == "exists" {
                        let path = match self.advance().cloned() {
                            Some(Token::Ident(p)) => p,
                            Some(Token::Str(p)) => p,
                            other => {
                                return Err(Error::config_invalid(format!(
                                    "exists() requires a path argument, got {other:?}"
                                )))
                            }
                        };
                        if !self.expect_op_rparen() {
                            return Err(Error::config_invalid("exists() takes exactly one argument"));
                        }
                        return Ok(Value::Bool(store.exists(&path)));
                    }
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        args.push(self.parse_or_eval(store)?);
                        while self.peek() == Some(&Token::Comma) {
                            self.pos += 1;
                            args.push(self.parse_or_eval(store)?);
                        }
                    }
                    self.pos += 1; // RParen, validated during parse_primary
                    return call(&name, &args);
                }
                match name.as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    "null" => Ok(Value::Null),
                    _ => store
                        .get(&name)
                        .ok_or_else(|| Error::variable_undefined(name.clone())),
                }
            }
            Some(Token::LParen) => {
                let v = self.parse_or_eval(store)?;
                self.pos += 1; // RParen
                Ok(v)
            }
            other => Err(Error::config_invalid(format!(
                "unexpected token in expression: {other:?}"
            ))),
        }
    }
}

fn call(name: &str, args: &[Value]) -> Result<Value, Error> {
    match name {
        "matches" => {
            let subject = args
                .first()
                .ok_or_else(|| Error::config_invalid("matches(string, regex) requires 2 arguments"))?;
            let pattern = args
                .get(1)
                .and_then(Value::as_str)
                .ok_or_else(|| Error::config_invalid("matches(string, regex) requires a string pattern"))?;
            let re = Regex::new(pattern)
                .map_err(|e| Error::config_invalid(format!("invalid regex in matches(): {e}")))?;
            Ok(Value::Bool(re.is_match(&subject.to_string())))
        }
        "len" => {
            let value = args
                .first()
                .ok_or_else(|| Error::config_invalid("len(x) requires 1 argument"))?;
            let length = match value {
                Value::Str(s) => s.chars().count(),
                Value::Array(a) => a.len(),
                Value::Object(o) => o.len(),
                _ => return Err(Error::config_invalid("len() requires a string, array, or object")),
            };
            Ok(Value::Num(length as f64))
        }
        other => Err(Error::config_invalid(format!("unknown function: {other}"))),
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Num(n) => *n != 0.0,
        Value::Str(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn num(v: &Value) -> Result<f64, Error> {
    v.as_f64()
        .ok_or_else(|| Error::assertion_failed(format!("expected a number, got {v}")))
}

fn add(a: &Value, b: &Value) -> Result<Value, Error> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(Value::Str(format!("{x}{y}"))),
        _ => Ok(Value::Num(num(a)? + num(b)?)),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    a == b
}

fn compare(a: &Value, b: &Value) -> Result<std::cmp::Ordering, Error> {
    match (a, b) {
        (Value::Num(x), Value::Num(y)) => x
            .partial_cmp(y)
            .ok_or_else(|| Error::assertion_failed("NaN is not orderable")),
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        _ => Err(Error::assertion_failed(format!(
            "cannot compare {a} and {b}"
        ))),
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.contains(needle),
        Value::Str(s) => needle.as_str().is_some_and(|n| s.contains(n)),
        Value::Object(map) => needle.as_str().is_some_and(|k| map.contains_key(k)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ScopeKind;
    use std::sync::Arc;
    use testmesh_foundation::SystemClock;

    fn store() -> VariableStore {
        VariableStore::new(Arc::new(SystemClock))
    }

    fn eval(source: &str, store: &VariableStore) -> Value {
        Expr::parse(source).unwrap().evaluate(store).unwrap()
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(eval("1 + 2 * 3", &store()), Value::Num(7.0));
        assert_eq!(eval("(1 + 2) * 3", &store()), Value::Num(9.0));
    }

    #[test]
    fn comparisons_and_boolean_ops() {
        assert_eq!(eval("1 < 2 && 2 < 3", &store()), Value::Bool(true));
        assert_eq!(eval("1 > 2 || 3 == 3", &store()), Value::Bool(true));
        assert_eq!(eval("!(1 == 1)", &store()), Value::Bool(false));
    }

    #[test]
    fn membership_and_containment() {
        assert_eq!(eval("2 in (1 + 1)", &store()), Value::Bool(false));
        let mut s = store();
        s.set(
            ScopeKind::FlowInitial,
            "list",
            Value::Array(vec![Value::Num(1.0), Value::Num(2.0)]),
        );
        assert_eq!(eval("list contains 2", &s), Value::Bool(true));
    }

    #[test]
    fn exists_and_matches_builtins() {
        let mut s = store();
        s.set(ScopeKind::FlowInitial, "email", Value::Str("a@b.com".into()));
        assert_eq!(eval("exists(email)", &s), Value::Bool(true));
        assert_eq!(eval("exists(nope)", &s), Value::Bool(false));
        assert_eq!(eval("matches(email, \"^a@\")", &s), Value::Bool(true));
    }

    #[test]
    fn undefined_variable_is_an_error() {
        let err = Expr::parse("missing == 1").unwrap().evaluate(&store()).unwrap_err();
        assert_eq!(err.kind(), testmesh_foundation::ErrorKind::VariableUndefined);
    }

    #[test]
    fn string_length_via_len() {
        assert_eq!(eval("len(\"hello\")", &store()), Value::Num(5.0));
    }
}
