//! Recursive-descent parser from tokens to a [`Filter`] tree.
//!
//! Precedence, lowest first:
//!
//! | Level | Operators | Associativity |
//! |-------|-----------|---------------|
//! | 1 | `\|` | right |
//! | 2 | `,` | left |
//! | 3 | `//` | right |
//! | 4 | `=` `\|=` `+=` `-=` `*=` `/=` `%=` `//=` | none |
//! | 5 | `or` | left |
//! | 6 | `and` | left |
//! | 7 | `==` `!=` `<` `<=` `>` `>=` | none |
//! | 8 | `+` `-` | left |
//! | 9 | `*` `/` `%` | left |
//! | 10 | unary `-`, prefix `not` | |
//! | 11 | postfix `.x` `[e]` `[]` `[a:b]` `?` | |
//!
//! Function calls are checked against the builtin arity table and variable
//! references against the enclosing `reduce`/`foreach` bindings and the
//! globals, so a successfully parsed filter never fails on a missing name.

use crate::ast::{ArithOp, AssignOp, CompareOp, Filter, ObjectKey, StringPart};
use crate::builtins;
use crate::error::{Error, Result};
use crate::format;
use crate::lexer::{self, ArithToken, Keyword, Span, Spanned, StrPart, Token};
use crate::value::Value;

/// Parse filter source with only `$ENV` predefined.
pub fn parse(source: &str) -> Result<Filter> {
    parse_with_globals(source, &[])
}

/// Parse filter source where each of `globals` names a predefined variable
/// (without the `$`).
pub fn parse_with_globals(source: &str, globals: &[&str]) -> Result<Filter> {
    let tokens = lexer::lex(source)?;
    let end = end_span(source);
    let mut scope: Vec<String> = globals.iter().map(|g| g.to_string()).collect();
    scope.push("ENV".to_string());
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        scope,
        end,
    };
    let filter = parser.parse_pipe()?;
    parser.expect_end()?;
    Ok(filter)
}

fn end_span(source: &str) -> Span {
    let line = source.matches('\n').count() + 1;
    let last_line = source.rsplit('\n').next().unwrap_or("");
    Span {
        line,
        column: last_line.chars().count() + 1,
    }
}

struct Parser<'t> {
    tokens: &'t [Spanned],
    pos: usize,
    /// Variables visible at the current position, innermost last.
    scope: Vec<String>,
    /// Reported for errors at end of input.
    end: Span,
}

impl<'t> Parser<'t> {
    // ─── token cursor ───────────────────────────────────────────────────

    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&'t Token> {
        self.tokens.get(self.pos + offset).map(|s| &s.token)
    }

    fn span(&self) -> Span {
        self.tokens.get(self.pos).map_or(self.end, |s| s.span)
    }

    fn bump(&mut self) -> Option<&'t Token> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error_at(&self, span: Span, message: impl Into<String>) -> Error {
        Error::Parse {
            line: span.line,
            column: span.column,
            message: message.into(),
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        self.error_at(self.span(), message)
    }

    fn unexpected(&self, expected: &str) -> Error {
        match self.peek() {
            Some(token) => self.error(format!("unexpected {}, expected {}", token, expected)),
            None => self.error(format!("unexpected end of input, expected {}", expected)),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.unexpected(&expected.to_string()))
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<()> {
        self.expect(Token::Keyword(keyword))
    }

    fn expect_end(&self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(self.error(format!("unexpected {}", token))),
        }
    }

    // ─── binary levels ──────────────────────────────────────────────────

    fn parse_pipe(&mut self) -> Result<Filter> {
        let lhs = self.parse_comma()?;
        if self.peek() == Some(&Token::Keyword(Keyword::As)) {
            return Err(self.error("variable bindings are only supported in reduce and foreach"));
        }
        if self.eat(&Token::Pipe) {
            let rhs = self.parse_pipe()?;
            return Ok(Filter::pipe(lhs, rhs));
        }
        Ok(lhs)
    }

    fn parse_comma(&mut self) -> Result<Filter> {
        let mut lhs = self.parse_alternative()?;
        while self.eat(&Token::Comma) {
            let rhs = self.parse_alternative()?;
            lhs = Filter::Comma(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_alternative(&mut self) -> Result<Filter> {
        let lhs = self.parse_assignment()?;
        if self.eat(&Token::Alt) {
            let rhs = self.parse_alternative()?;
            return Ok(Filter::Alternative(Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_assignment(&mut self) -> Result<Filter> {
        let lhs = self.parse_or()?;
        let op = match self.peek() {
            Some(Token::Assign) => AssignOp::Set,
            Some(Token::UpdateAssign) => AssignOp::Update,
            Some(Token::AltAssign) => AssignOp::Alternative,
            Some(Token::ArithAssign(op)) => AssignOp::Arith(arith_op(*op)),
            _ => return Ok(lhs),
        };
        self.bump();
        let rhs = self.parse_or()?;
        if matches!(
            self.peek(),
            Some(
                Token::Assign | Token::UpdateAssign | Token::AltAssign | Token::ArithAssign(_)
            )
        ) {
            return Err(self.error("assignment operators are non-associative"));
        }
        Ok(Filter::Assign(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_or(&mut self) -> Result<Filter> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Keyword(Keyword::Or)) {
            let rhs = self.parse_and()?;
            lhs = Filter::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Filter> {
        let mut lhs = self.parse_comparison()?;
        while self.eat(&Token::Keyword(Keyword::And)) {
            let rhs = self.parse_comparison()?;
            lhs = Filter::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Filter> {
        let lhs = self.parse_additive()?;
        let Some(op) = self.peek().and_then(compare_op) else {
            return Ok(lhs);
        };
        self.bump();
        let rhs = self.parse_additive()?;
        if self.peek().and_then(compare_op).is_some() {
            return Err(self.error("comparison operators are non-associative"));
        }
        Ok(Filter::Compare(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_additive(&mut self) -> Result<Filter> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.parse_multiplicative()?;
            lhs = Filter::Arith(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Filter> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => ArithOp::Mul,
                Some(Token::Slash) => ArithOp::Div,
                Some(Token::Percent) => ArithOp::Rem,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = Filter::Arith(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_unary(&mut self) -> Result<Filter> {
        match self.peek() {
            Some(Token::Minus) => {
                self.bump();
                let operand = self.parse_unary()?;
                Ok(Filter::Neg(Box::new(operand)))
            }
            Some(Token::Keyword(Keyword::Not)) if self.peek_at(1).is_some_and(starts_term) => {
                self.bump();
                let operand = self.parse_unary()?;
                Ok(Filter::pipe(operand, Filter::call("not", Vec::new())))
            }
            _ => self.parse_postfix(),
        }
    }

    // ─── postfix and atoms ──────────────────────────────────────────────

    fn parse_postfix(&mut self) -> Result<Filter> {
        let mut term = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Field(name)) => {
                    self.bump();
                    term = Filter::Index(
                        Box::new(term),
                        Box::new(Filter::Literal(Value::String(name.clone()))),
                    );
                }
                Some(Token::Dot) if self.peek_at(1) == Some(&Token::LBracket) => {
                    self.bump();
                    self.bump();
                    term = self.parse_bracket_suffix(term)?;
                }
                Some(Token::LBracket) => {
                    self.bump();
                    term = self.parse_bracket_suffix(term)?;
                }
                Some(Token::Question) => {
                    self.bump();
                    term = Filter::Try {
                        body: Box::new(term),
                        handler: None,
                    };
                }
                _ => return Ok(term),
            }
        }
    }

    /// After `[`: `[]`, `[e]`, `[e:]`, `[:e]` or `[e:e]`.
    fn parse_bracket_suffix(&mut self, target: Filter) -> Result<Filter> {
        let target = Box::new(target);
        if self.eat(&Token::RBracket) {
            return Ok(Filter::Iterate(target));
        }
        if self.eat(&Token::Colon) {
            let to = self.parse_pipe()?;
            self.expect(Token::RBracket)?;
            return Ok(Filter::Slice(target, None, Some(Box::new(to))));
        }
        let index = self.parse_pipe()?;
        if self.eat(&Token::Colon) {
            if self.eat(&Token::RBracket) {
                return Ok(Filter::Slice(target, Some(Box::new(index)), None));
            }
            let to = self.parse_pipe()?;
            self.expect(Token::RBracket)?;
            return Ok(Filter::Slice(
                target,
                Some(Box::new(index)),
                Some(Box::new(to)),
            ));
        }
        self.expect(Token::RBracket)?;
        Ok(Filter::Index(target, Box::new(index)))
    }

    fn parse_primary(&mut self) -> Result<Filter> {
        let span = self.span();
        let Some(token) = self.bump() else {
            return Err(self.unexpected("a filter"));
        };
        match token {
            Token::Number(n) => Ok(Filter::Literal(Value::Number(*n))),
            Token::Str(parts) => self.string_filter(parts, None),
            Token::Format(name) => {
                if !format::is_format(name) {
                    return Err(self.error_at(span, format!("{} is not a valid format", name)));
                }
                if let Some(Token::Str(parts)) = self.peek() {
                    self.bump();
                    return self.string_filter(parts, Some(name.clone()));
                }
                Ok(Filter::Format(name.clone()))
            }
            Token::Dot => Ok(Filter::Identity),
            Token::DotDot => Ok(Filter::RecurseDefault),
            Token::Field(name) => Ok(Filter::field(name.clone())),
            Token::Variable(name) => {
                self.check_variable(name, span)?;
                Ok(Filter::Var(name.clone()))
            }
            Token::LParen => {
                let inner = self.parse_pipe()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => {
                if self.eat(&Token::RBracket) {
                    return Ok(Filter::Array(None));
                }
                let inner = self.parse_pipe()?;
                self.expect(Token::RBracket)?;
                Ok(Filter::Array(Some(Box::new(inner))))
            }
            Token::LBrace => self.parse_object(),
            Token::Keyword(Keyword::If) => self.parse_if_rest(),
            Token::Keyword(Keyword::Try) => self.parse_try(),
            Token::Keyword(Keyword::Reduce) => self.parse_reduce(),
            Token::Keyword(Keyword::Foreach) => self.parse_foreach(),
            Token::Keyword(Keyword::Not) => Ok(Filter::call("not", Vec::new())),
            Token::Keyword(Keyword::Def) => {
                Err(self.error_at(span, "function definitions are not supported"))
            }
            Token::Keyword(k @ (Keyword::Label | Keyword::Import | Keyword::Include)) => {
                Err(self.error_at(span, format!("'{}' is not supported", k.as_str())))
            }
            Token::Ident(name) => self.parse_call(name, span),
            other => Err(self.error_at(span, format!("unexpected {}", other))),
        }
    }

    fn parse_call(&mut self, name: &str, span: Span) -> Result<Filter> {
        let mut args = Vec::new();
        if self.eat(&Token::LParen) {
            loop {
                args.push(self.parse_pipe()?);
                if self.eat(&Token::Semicolon) {
                    continue;
                }
                self.expect(Token::RParen)?;
                break;
            }
        }
        if args.is_empty() {
            match name {
                "null" => return Ok(Filter::Literal(Value::Null)),
                "true" => return Ok(Filter::Literal(Value::Bool(true))),
                "false" => return Ok(Filter::Literal(Value::Bool(false))),
                _ => {}
            }
        }
        if !builtins::is_defined(name, args.len()) {
            return Err(self.error_at(span, format!("{}/{} is not defined", name, args.len())));
        }
        Ok(Filter::call(name, args))
    }

    fn check_variable(&self, name: &str, span: Span) -> Result<()> {
        if self.scope.iter().any(|v| v == name) {
            Ok(())
        } else {
            Err(self.error_at(span, format!("${} is not defined", name)))
        }
    }

    fn string_filter(&self, parts: &[StrPart], format: Option<String>) -> Result<Filter> {
        let mut out = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                StrPart::Lit(text) => out.push(StringPart::Literal(text.clone())),
                StrPart::Interp(tokens) => out.push(StringPart::Interp(self.sub_parse(tokens)?)),
            }
        }
        // A plain literal string is a constant.
        match (out.as_slice(), &format) {
            ([], None) => Ok(Filter::Literal(Value::String(String::new()))),
            ([StringPart::Literal(text)], None) => Ok(Filter::Literal(Value::String(text.clone()))),
            _ => Ok(Filter::Str(out, format)),
        }
    }

    /// Parse the token list of a string interpolation in the current scope.
    fn sub_parse(&self, tokens: &[Spanned]) -> Result<Filter> {
        let mut inner = Parser {
            tokens,
            pos: 0,
            scope: self.scope.clone(),
            end: self.span(),
        };
        let filter = inner.parse_pipe()?;
        inner.expect_end()?;
        Ok(filter)
    }

    // ─── compound forms ─────────────────────────────────────────────────

    fn parse_object(&mut self) -> Result<Filter> {
        let mut entries = Vec::new();
        if self.eat(&Token::RBrace) {
            return Ok(Filter::Object(entries));
        }
        loop {
            entries.push(self.parse_object_entry()?);
            if self.eat(&Token::RBrace) {
                return Ok(Filter::Object(entries));
            }
            self.expect(Token::Comma)?;
            if self.peek() == Some(&Token::RBrace) {
                return Err(self.error("trailing comma in object construction"));
            }
        }
    }

    fn parse_object_entry(&mut self) -> Result<(ObjectKey, Filter)> {
        let span = self.span();
        let Some(token) = self.bump() else {
            return Err(self.unexpected("an object key"));
        };
        let (key, shorthand) = match token {
            Token::Ident(name) => (
                ObjectKey::Literal(name.clone()),
                Some(Filter::field(name.clone())),
            ),
            Token::Keyword(k) => (
                ObjectKey::Literal(k.as_str().to_string()),
                Some(Filter::field(k.as_str())),
            ),
            Token::Variable(name) => {
                self.check_variable(name, span)?;
                if self.peek() == Some(&Token::Colon) {
                    (ObjectKey::Dynamic(Filter::Var(name.clone())), None)
                } else {
                    (
                        ObjectKey::Literal(name.clone()),
                        Some(Filter::Var(name.clone())),
                    )
                }
            }
            Token::Str(parts) => self.string_key(parts, None)?,
            Token::Format(name) => match self.bump() {
                Some(Token::Str(parts)) if format::is_format(name) => {
                    self.string_key(parts, Some(name.clone()))?
                }
                _ => return Err(self.error_at(span, "expected a string after format in object key")),
            },
            Token::LParen => {
                let key = self.parse_pipe()?;
                self.expect(Token::RParen)?;
                (ObjectKey::Dynamic(key), None)
            }
            other => {
                return Err(self.error_at(span, format!("unexpected {} in object key", other)));
            }
        };
        if self.eat(&Token::Colon) {
            return Ok((key, self.parse_object_value()?));
        }
        match shorthand {
            Some(value) => Ok((key, value)),
            None => Err(self.unexpected("':'")),
        }
    }

    /// A string key and the `.[key]` filter its shorthand form stands for.
    fn string_key(
        &self,
        parts: &[StrPart],
        format: Option<String>,
    ) -> Result<(ObjectKey, Option<Filter>)> {
        let key_filter = self.string_filter(parts, format)?;
        let shorthand = Filter::Index(Box::new(Filter::Identity), Box::new(key_filter.clone()));
        let key = match key_filter {
            Filter::Literal(Value::String(text)) => ObjectKey::Literal(text),
            other => ObjectKey::Dynamic(other),
        };
        Ok((key, Some(shorthand)))
    }

    /// Object values bind tighter than `,` but may be chained with `|`.
    fn parse_object_value(&mut self) -> Result<Filter> {
        let mut value = self.parse_alternative()?;
        while self.eat(&Token::Pipe) {
            let rhs = self.parse_alternative()?;
            value = Filter::pipe(value, rhs);
        }
        Ok(value)
    }

    /// After `if` or `elif`.
    fn parse_if_rest(&mut self) -> Result<Filter> {
        let cond = self.parse_pipe()?;
        self.expect_keyword(Keyword::Then)?;
        let then_branch = self.parse_pipe()?;
        let else_branch = match self.peek() {
            Some(Token::Keyword(Keyword::Elif)) => {
                self.bump();
                Some(Box::new(self.parse_if_rest()?))
            }
            Some(Token::Keyword(Keyword::Else)) => {
                self.bump();
                let branch = self.parse_pipe()?;
                self.expect_keyword(Keyword::End)?;
                Some(Box::new(branch))
            }
            Some(Token::Keyword(Keyword::End)) => {
                self.bump();
                None
            }
            _ => return Err(self.unexpected("'elif', 'else' or 'end'")),
        };
        Ok(Filter::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch,
        })
    }

    fn parse_try(&mut self) -> Result<Filter> {
        let body = self.parse_postfix()?;
        let handler = if self.eat(&Token::Keyword(Keyword::Catch)) {
            Some(Box::new(self.parse_postfix()?))
        } else {
            None
        };
        Ok(Filter::Try {
            body: Box::new(body),
            handler,
        })
    }

    /// `SOURCE as $name (`; returns the source and the variable name.
    fn parse_loop_head(&mut self) -> Result<(Filter, String)> {
        let source = self.parse_postfix()?;
        self.expect_keyword(Keyword::As)?;
        let name = match self.peek() {
            Some(Token::Variable(name)) => name.clone(),
            _ => return Err(self.unexpected("a variable")),
        };
        self.bump();
        self.expect(Token::LParen)?;
        Ok((source, name))
    }

    fn parse_reduce(&mut self) -> Result<Filter> {
        let (source, var) = self.parse_loop_head()?;
        let init = self.parse_pipe()?;
        self.expect(Token::Semicolon)?;
        self.scope.push(var.clone());
        let update = self.parse_pipe();
        self.scope.pop();
        let update = update?;
        self.expect(Token::RParen)?;
        Ok(Filter::Reduce {
            source: Box::new(source),
            var,
            init: Box::new(init),
            update: Box::new(update),
        })
    }

    fn parse_foreach(&mut self) -> Result<Filter> {
        let (source, var) = self.parse_loop_head()?;
        let init = self.parse_pipe()?;
        self.expect(Token::Semicolon)?;
        self.scope.push(var.clone());
        let rest = self.parse_foreach_body();
        self.scope.pop();
        let (update, extract) = rest?;
        self.expect(Token::RParen)?;
        Ok(Filter::Foreach {
            source: Box::new(source),
            var,
            init: Box::new(init),
            update: Box::new(update),
            extract: extract.map(Box::new),
        })
    }

    fn parse_foreach_body(&mut self) -> Result<(Filter, Option<Filter>)> {
        let update = self.parse_pipe()?;
        let extract = if self.eat(&Token::Semicolon) {
            Some(self.parse_pipe()?)
        } else {
            None
        };
        Ok((update, extract))
    }
}

fn arith_op(op: ArithToken) -> ArithOp {
    match op {
        ArithToken::Add => ArithOp::Add,
        ArithToken::Sub => ArithOp::Sub,
        ArithToken::Mul => ArithOp::Mul,
        ArithToken::Div => ArithOp::Div,
        ArithToken::Rem => ArithOp::Rem,
    }
}

fn compare_op(token: &Token) -> Option<CompareOp> {
    Some(match token {
        Token::Eq => CompareOp::Eq,
        Token::Ne => CompareOp::Ne,
        Token::Lt => CompareOp::Lt,
        Token::Le => CompareOp::Le,
        Token::Gt => CompareOp::Gt,
        Token::Ge => CompareOp::Ge,
        _ => return None,
    })
}

fn starts_term(token: &Token) -> bool {
    matches!(
        token,
        Token::Number(_)
            | Token::Str(_)
            | Token::Format(_)
            | Token::Dot
            | Token::DotDot
            | Token::Field(_)
            | Token::Variable(_)
            | Token::LParen
            | Token::LBracket
            | Token::LBrace
            | Token::Ident(_)
            | Token::Minus
            | Token::Keyword(
                Keyword::If | Keyword::Try | Keyword::Reduce | Keyword::Foreach | Keyword::Not
            )
    )
}
