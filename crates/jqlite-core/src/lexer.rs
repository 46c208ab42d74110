//! Tokeniser for filter source text.
//!
//! String literals are lexed into [`StrPart`]s: interpolations `\( ... )` are
//! tokenised recursively so the parser can treat them as nested filters.

use std::fmt;

use crate::error::{Error, Result};

/// 1-based source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

/// Reserved words. They cannot be used as function names but are accepted
/// as object keys and after `.`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    If,
    Then,
    Elif,
    Else,
    End,
    As,
    Reduce,
    Foreach,
    Try,
    Catch,
    Label,
    Import,
    Include,
    Def,
    And,
    Or,
    Not,
}

impl Keyword {
    fn from_ident(ident: &str) -> Option<Keyword> {
        Some(match ident {
            "if" => Keyword::If,
            "then" => Keyword::Then,
            "elif" => Keyword::Elif,
            "else" => Keyword::Else,
            "end" => Keyword::End,
            "as" => Keyword::As,
            "reduce" => Keyword::Reduce,
            "foreach" => Keyword::Foreach,
            "try" => Keyword::Try,
            "catch" => Keyword::Catch,
            "label" => Keyword::Label,
            "import" => Keyword::Import,
            "include" => Keyword::Include,
            "def" => Keyword::Def,
            "and" => Keyword::And,
            "or" => Keyword::Or,
            "not" => Keyword::Not,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::If => "if",
            Keyword::Then => "then",
            Keyword::Elif => "elif",
            Keyword::Else => "else",
            Keyword::End => "end",
            Keyword::As => "as",
            Keyword::Reduce => "reduce",
            Keyword::Foreach => "foreach",
            Keyword::Try => "try",
            Keyword::Catch => "catch",
            Keyword::Label => "label",
            Keyword::Import => "import",
            Keyword::Include => "include",
            Keyword::Def => "def",
            Keyword::And => "and",
            Keyword::Or => "or",
            Keyword::Not => "not",
        }
    }
}

/// A piece of a string literal.
#[derive(Debug, Clone, PartialEq)]
pub enum StrPart {
    Lit(String),
    /// Tokens of an interpolated `\( ... )` expression.
    Interp(Vec<Spanned>),
}

/// Arithmetic operator carried by an `op=` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithToken {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(Vec<StrPart>),
    Ident(String),
    Keyword(Keyword),
    /// `.name` or `."name"`.
    Field(String),
    /// `$name`, without the sigil.
    Variable(String),
    /// `@name`, without the sigil.
    Format(String),
    Dot,
    DotDot,
    Pipe,
    Comma,
    Semicolon,
    Colon,
    Question,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Assign,
    UpdateAssign,
    ArithAssign(ArithToken),
    AltAssign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Alt,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Token::Number(n) => return write!(f, "{}", n),
            Token::Str(_) => "string literal",
            Token::Ident(name) => return write!(f, "'{}'", name),
            Token::Keyword(k) => return write!(f, "'{}'", k.as_str()),
            Token::Field(name) => return write!(f, "'.{}'", name),
            Token::Variable(name) => return write!(f, "'${}'", name),
            Token::Format(name) => return write!(f, "'@{}'", name),
            Token::Dot => "'.'",
            Token::DotDot => "'..'",
            Token::Pipe => "'|'",
            Token::Comma => "','",
            Token::Semicolon => "';'",
            Token::Colon => "':'",
            Token::Question => "'?'",
            Token::LParen => "'('",
            Token::RParen => "')'",
            Token::LBracket => "'['",
            Token::RBracket => "']'",
            Token::LBrace => "'{'",
            Token::RBrace => "'}'",
            Token::Eq => "'=='",
            Token::Ne => "'!='",
            Token::Lt => "'<'",
            Token::Le => "'<='",
            Token::Gt => "'>'",
            Token::Ge => "'>='",
            Token::Assign => "'='",
            Token::UpdateAssign => "'|='",
            Token::ArithAssign(ArithToken::Add) => "'+='",
            Token::ArithAssign(ArithToken::Sub) => "'-='",
            Token::ArithAssign(ArithToken::Mul) => "'*='",
            Token::ArithAssign(ArithToken::Div) => "'/='",
            Token::ArithAssign(ArithToken::Rem) => "'%='",
            Token::AltAssign => "'//='",
            Token::Plus => "'+'",
            Token::Minus => "'-'",
            Token::Star => "'*'",
            Token::Slash => "'/'",
            Token::Percent => "'%'",
            Token::Alt => "'//'",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
}

/// Tokenise `source`.
pub fn lex(source: &str) -> Result<Vec<Spanned>> {
    let mut lexer = Lexer::new(source);
    let tokens = lexer.tokens(false)?;
    Ok(tokens)
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            column: self.column,
        }
    }

    fn error(&self, span: Span, message: impl Into<String>) -> Error {
        Error::Lex {
            line: span.line,
            column: span.column,
            message: message.into(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '#' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    /// Lex until end of input, or until the `)` closing an interpolation when
    /// `interpolation` is set. Parentheses opened inside are balanced.
    fn tokens(&mut self, interpolation: bool) -> Result<Vec<Spanned>> {
        let mut out = Vec::new();
        let mut depth = 0usize;
        loop {
            self.skip_trivia();
            let span = self.span();
            let Some(c) = self.peek() else {
                if interpolation {
                    return Err(self.error(span, "unterminated string interpolation"));
                }
                return Ok(out);
            };
            if interpolation && c == ')' && depth == 0 {
                self.bump();
                return Ok(out);
            }
            let token = self.token(c, span)?;
            match token {
                Token::LParen => depth += 1,
                Token::RParen => depth = depth.saturating_sub(1),
                _ => {}
            }
            out.push(Spanned { token, span });
        }
    }

    fn token(&mut self, c: char, span: Span) -> Result<Token> {
        if c.is_ascii_digit() {
            return self.number(span);
        }
        if is_ident_start(c) {
            let ident = self.ident();
            return Ok(match Keyword::from_ident(&ident) {
                Some(keyword) => Token::Keyword(keyword),
                None => Token::Ident(ident),
            });
        }
        self.bump();
        let token = match c {
            '"' => Token::Str(self.string(span)?),
            '.' => self.after_dot(span)?,
            '$' => {
                if !self.peek().is_some_and(is_ident_start) {
                    return Err(self.error(span, "expected variable name after '$'"));
                }
                let name = self.ident();
                if name == "__loc__" {
                    return Err(self.error(span, "$__loc__ is not supported"));
                }
                Token::Variable(name)
            }
            '@' => {
                if !self.peek().is_some_and(is_ident_start) {
                    return Err(self.error(span, "expected format name after '@'"));
                }
                Token::Format(self.ident())
            }
            '|' if self.eat('=') => Token::UpdateAssign,
            '|' => Token::Pipe,
            ',' => Token::Comma,
            ';' => Token::Semicolon,
            ':' => Token::Colon,
            '?' => Token::Question,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            '=' if self.eat('=') => Token::Eq,
            '=' => Token::Assign,
            '!' if self.eat('=') => Token::Ne,
            '<' if self.eat('=') => Token::Le,
            '<' => Token::Lt,
            '>' if self.eat('=') => Token::Ge,
            '>' => Token::Gt,
            '+' if self.eat('=') => Token::ArithAssign(ArithToken::Add),
            '+' => Token::Plus,
            '-' if self.eat('=') => Token::ArithAssign(ArithToken::Sub),
            '-' => Token::Minus,
            '*' if self.eat('=') => Token::ArithAssign(ArithToken::Mul),
            '*' => Token::Star,
            '%' if self.eat('=') => Token::ArithAssign(ArithToken::Rem),
            '%' => Token::Percent,
            '/' if self.eat('/') => {
                if self.eat('=') {
                    Token::AltAssign
                } else {
                    Token::Alt
                }
            }
            '/' if self.eat('=') => Token::ArithAssign(ArithToken::Div),
            '/' => Token::Slash,
            other => {
                return Err(self.error(span, format!("unexpected character '{}'", other)));
            }
        };
        Ok(token)
    }

    fn after_dot(&mut self, span: Span) -> Result<Token> {
        match self.peek() {
            Some('.') => {
                self.bump();
                Ok(Token::DotDot)
            }
            Some('"') => {
                self.bump();
                let parts = self.string(span)?;
                match parts.as_slice() {
                    [] => Ok(Token::Field(String::new())),
                    [StrPart::Lit(name)] => Ok(Token::Field(name.clone())),
                    _ => Err(self.error(span, "field names cannot use string interpolation")),
                }
            }
            Some(c) if is_ident_start(c) => Ok(Token::Field(self.ident())),
            Some(c) if c.is_ascii_digit() => {
                // `.5` is a number literal.
                let mut text = String::from("0.");
                while let Some(d) = self.peek().filter(char::is_ascii_digit) {
                    text.push(d);
                    self.bump();
                }
                self.exponent(&mut text, span)?;
                parse_number(&text).ok_or_else(|| self.error(span, "invalid number literal"))
            }
            _ => Ok(Token::Dot),
        }
    }

    fn ident(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                name.push(c);
                self.bump();
            } else if c == ':' && self.is_module_separator() {
                // `a::b` module-qualified names lex as one identifier.
                name.push_str("::");
                self.bump();
                self.bump();
            } else {
                break;
            }
        }
        name
    }

    fn is_module_separator(&self) -> bool {
        let mut ahead = self.chars.clone();
        ahead.next() == Some(':') && ahead.next() == Some(':')
    }

    fn number(&mut self, span: Span) -> Result<Token> {
        let mut text = String::new();
        while let Some(d) = self.peek().filter(char::is_ascii_digit) {
            text.push(d);
            self.bump();
        }
        if self.peek() == Some('.') {
            text.push('.');
            self.bump();
            while let Some(d) = self.peek().filter(char::is_ascii_digit) {
                text.push(d);
                self.bump();
            }
        }
        self.exponent(&mut text, span)?;
        if self.peek().is_some_and(is_ident_start) {
            return Err(self.error(span, "invalid number literal"));
        }
        parse_number(&text).ok_or_else(|| self.error(span, "invalid number literal"))
    }

    fn exponent(&mut self, text: &mut String, span: Span) -> Result<()> {
        if !matches!(self.peek(), Some('e' | 'E')) {
            return Ok(());
        }
        text.push('e');
        self.bump();
        if let Some(sign @ ('+' | '-')) = self.peek() {
            text.push(sign);
            self.bump();
        }
        let mut digits = 0;
        while let Some(d) = self.peek().filter(char::is_ascii_digit) {
            text.push(d);
            self.bump();
            digits += 1;
        }
        if digits == 0 {
            return Err(self.error(span, "invalid number literal"));
        }
        Ok(())
    }

    /// Lex a string body; the opening quote is already consumed.
    fn string(&mut self, span: Span) -> Result<Vec<StrPart>> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(self.error(span, "unterminated string literal"));
            };
            match c {
                '"' => break,
                '\\' => {
                    let escape_span = self.span();
                    let Some(e) = self.bump() else {
                        return Err(self.error(span, "unterminated string literal"));
                    };
                    match e {
                        'n' => literal.push('\n'),
                        't' => literal.push('\t'),
                        'r' => literal.push('\r'),
                        'b' => literal.push('\u{8}'),
                        'f' => literal.push('\u{c}'),
                        '\\' => literal.push('\\'),
                        '"' => literal.push('"'),
                        '/' => literal.push('/'),
                        'u' => literal.push(self.unicode_escape(escape_span)?),
                        '(' => {
                            if !literal.is_empty() {
                                parts.push(StrPart::Lit(std::mem::take(&mut literal)));
                            }
                            parts.push(StrPart::Interp(self.tokens(true)?));
                        }
                        other => {
                            return Err(self.error(
                                escape_span,
                                format!("invalid escape '\\{}'", other),
                            ));
                        }
                    }
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            parts.push(StrPart::Lit(literal));
        }
        Ok(parts)
    }

    fn hex4(&mut self, span: Span) -> Result<u32> {
        let mut code = 0u32;
        for _ in 0..4 {
            let digit = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error(span, "invalid \\u escape"))?;
            code = code * 16 + digit;
        }
        Ok(code)
    }

    fn unicode_escape(&mut self, span: Span) -> Result<char> {
        let high = self.hex4(span)?;
        if (0xD800..0xDC00).contains(&high) {
            let mut ahead = self.chars.clone();
            if ahead.next() == Some('\\') && ahead.next() == Some('u') {
                self.bump();
                self.bump();
                let low = self.hex4(span)?;
                if (0xDC00..0xE000).contains(&low) {
                    let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                    return char::from_u32(code)
                        .ok_or_else(|| self.error(span, "invalid \\u escape"));
                }
                return Err(self.error(span, "invalid surrogate pair in \\u escape"));
            }
            return Ok(char::REPLACEMENT_CHARACTER);
        }
        Ok(char::from_u32(high).unwrap_or(char::REPLACEMENT_CHARACTER))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn parse_number(text: &str) -> Option<Token> {
    text.parse::<f64>().ok().map(Token::Number)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        lex(src).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn longest_operator_wins() {
        assert_eq!(
            kinds("//= // /= / |= | == ="),
            vec![
                Token::AltAssign,
                Token::Alt,
                Token::ArithAssign(ArithToken::Div),
                Token::Slash,
                Token::UpdateAssign,
                Token::Pipe,
                Token::Eq,
                Token::Assign,
            ]
        );
    }

    #[test]
    fn fields_and_recursion() {
        assert_eq!(
            kinds(r#". .. .foo ."a b" .[0]"#),
            vec![
                Token::Dot,
                Token::DotDot,
                Token::Field("foo".into()),
                Token::Field("a b".into()),
                Token::Dot,
                Token::LBracket,
                Token::Number(0.0),
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(kinds("1 # one\n+ 2"), vec![Token::Number(1.0), Token::Plus, Token::Number(2.0)]);
    }

    #[test]
    fn numbers_with_exponents() {
        assert_eq!(kinds("1.5e3 .25"), vec![Token::Number(1500.0), Token::Number(0.25)]);
    }

    #[test]
    fn string_escapes_and_surrogates() {
        let tokens = kinds(r#""a\tbé😀""#);
        assert_eq!(tokens, vec![Token::Str(vec![StrPart::Lit("a\tbé😀".into())])]);
    }

    #[test]
    fn interpolation_nests_tokens() {
        let tokens = kinds(r#""x\(.a + (1))y""#);
        let Token::Str(parts) = &tokens[0] else {
            panic!("expected string token");
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], StrPart::Lit("x".into()));
        let StrPart::Interp(inner) = &parts[1] else {
            panic!("expected interpolation");
        };
        assert_eq!(inner.len(), 5);
        assert_eq!(parts[2], StrPart::Lit("y".into()));
    }

    #[test]
    fn keywords_and_variables() {
        assert_eq!(
            kinds("if $x then @base64 else foo end"),
            vec![
                Token::Keyword(Keyword::If),
                Token::Variable("x".into()),
                Token::Keyword(Keyword::Then),
                Token::Format("base64".into()),
                Token::Keyword(Keyword::Else),
                Token::Ident("foo".into()),
                Token::Keyword(Keyword::End),
            ]
        );
    }

    #[test]
    fn unterminated_string_reports_position() {
        let err = lex("1 | \"abc").unwrap_err();
        match err {
            Error::Lex { line, column, .. } => assert_eq!((line, column), (1, 5)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn stray_character_is_an_error() {
        assert!(lex(".a ^ 1").is_err());
    }
}
