//! Tokenizer and recursive-descent parser for pipeline specs.
//!
//! ```text
//! Pipeline  := Stage ("=>" Stage)*
//! Stage     := Item*
//! Item      := "key" "(" Expr ")" | "sum" "(" Expr ")"
//!            | ("min" | "max") "(" Expr ("," Expr)* ")"
//!            | "count" [ "(" "distinct" "," Expr ")" ]
//!            | "filter" "(" Expr "~" Pattern ")"
//!            | Expr | ShortForm
//! Expr      := "_" Integer
//! ShortForm := k<n> | s<n> | m<n>(_<n>)* | M<n>(_<n>)* | cd<n>
//!            | f<n> "~" Pattern | f "~" Pattern | c
//! ```
//!
//! An unquoted pattern ends at whitespace, at `=>`, or at a `)` it did not open.

use std::fmt;

use crate::processor::{
    ProcessorError,
    spec::{AggregatedTable, Component, Expr, Filter, Pipeline, SimpleTable, Stage},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Arrow,
    Ident(String),
    LParen,
    RParen,
    Comma,
    Tilde,
    /// Regex text following `~`, unquoted.
    Pattern(String),
    End,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Arrow => f.write_str("'=>'"),
            TokenKind::Ident(name) => write!(f, "'{name}'"),
            TokenKind::LParen => f.write_str("'('"),
            TokenKind::RParen => f.write_str("')'"),
            TokenKind::Comma => f.write_str("','"),
            TokenKind::Tilde => f.write_str("'~'"),
            TokenKind::Pattern(p) => write!(f, "pattern {p:?}"),
            TokenKind::End => f.write_str("end of spec"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token in the spec text.
    pub position: usize,
}

fn parse_error(position: usize, message: impl Into<String>) -> ProcessorError {
    ProcessorError::Parse {
        position,
        message: message.into(),
    }
}

/// Splits spec text into tokens. The last token is always [`TokenKind::End`].
pub fn tokenize(text: &str) -> Result<Vec<Token>, ProcessorError> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    loop {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        let start = pos;
        let Some(&c) = bytes.get(pos) else {
            tokens.push(Token {
                kind: TokenKind::End,
                position: start,
            });
            return Ok(tokens);
        };

        let kind = match c {
            b'(' => {
                pos += 1;
                TokenKind::LParen
            }
            b')' => {
                pos += 1;
                TokenKind::RParen
            }
            b',' => {
                pos += 1;
                TokenKind::Comma
            }
            b'=' if bytes.get(pos + 1) == Some(&b'>') => {
                pos += 2;
                TokenKind::Arrow
            }
            b'~' => {
                tokens.push(Token {
                    kind: TokenKind::Tilde,
                    position: start,
                });
                pos += 1;
                while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                    pos += 1;
                }
                let (pattern, end) = lex_pattern(text, pos)?;
                tokens.push(Token {
                    kind: TokenKind::Pattern(pattern),
                    position: pos,
                });
                pos = end;
                continue;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_')
                {
                    pos += 1;
                }
                TokenKind::Ident(text[start..pos].to_string())
            }
            _ => {
                let ch = text[start..].chars().next().unwrap_or_default();
                return Err(parse_error(start, format!("unexpected character {ch:?}")));
            }
        };
        tokens.push(Token {
            kind,
            position: start,
        });
    }
}

/// Reads the pattern starting at `start`; returns it and the offset just past it.
fn lex_pattern(text: &str, start: usize) -> Result<(String, usize), ProcessorError> {
    let mut chars = text[start..].char_indices().peekable();
    match chars.peek() {
        None => Err(parse_error(start, "expected pattern after '~'")),
        Some(&(_, quote @ ('"' | '\''))) => {
            chars.next();
            let mut pattern = String::new();
            while let Some((_, c)) = chars.next() {
                match c {
                    '\\' => match chars.next() {
                        Some((_, e)) if e == quote || e == '\\' => pattern.push(e),
                        Some((_, e)) => {
                            pattern.push('\\');
                            pattern.push(e);
                        }
                        None => break,
                    },
                    c if c == quote => {
                        let end = chars.peek().map_or(text.len(), |&(i, _)| start + i);
                        return Ok((pattern, end));
                    }
                    c => pattern.push(c),
                }
            }
            Err(parse_error(start, "unterminated string"))
        }
        Some(_) => {
            let mut depth = 0usize;
            let mut end = text.len();
            while let Some((i, c)) = chars.next() {
                match c {
                    '\\' => {
                        chars.next();
                    }
                    '(' => depth += 1,
                    ')' if depth == 0 => {
                        end = start + i;
                        break;
                    }
                    ')' => depth -= 1,
                    '=' if matches!(chars.peek(), Some(&(_, '>'))) => {
                        end = start + i;
                        break;
                    }
                    c if c.is_whitespace() => {
                        end = start + i;
                        break;
                    }
                    _ => {}
                }
            }
            if end == start {
                return Err(parse_error(start, "expected pattern after '~'"));
            }
            Ok((text[start..end].to_string(), end))
        }
    }
}

/// Parses spec text into a [`Pipeline`]. Empty text yields one passthrough stage.
pub fn parse_pipeline(text: &str) -> Result<Pipeline, ProcessorError> {
    let mut parser = Parser {
        tokens: tokenize(text)?,
        pos: 0,
    };
    parser.pipeline()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

/// Items of one stage before deciding what kind of stage it is.
#[derive(Default)]
struct StageItems {
    filters: Vec<Filter>,
    columns: Vec<Expr>,
    components: Vec<Component>,
    first_column: Option<usize>,
    first_component: Option<usize>,
}

impl Parser {
    fn peek(&self) -> &Token {
        // `tokenize` always ends the stream with `End`, and `advance` never moves past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::End {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ProcessorError> {
        let token = self.advance();
        if token.kind == kind {
            Ok(())
        } else {
            Err(parse_error(
                token.position,
                format!("expected {kind} but found {}", token.kind),
            ))
        }
    }

    fn pipeline(&mut self) -> Result<Pipeline, ProcessorError> {
        let mut stages = vec![self.stage()?];
        while self.peek().kind == TokenKind::Arrow {
            let arrow = self.advance();
            let next = self.peek().clone();
            if matches!(next.kind, TokenKind::Arrow | TokenKind::End) {
                return Err(parse_error(
                    next.position.max(arrow.position),
                    "unterminated stage",
                ));
            }
            stages.push(self.stage()?);
        }
        let token = self.peek();
        if token.kind != TokenKind::End {
            return Err(parse_error(
                token.position,
                format!("unexpected {}", token.kind),
            ));
        }
        Ok(Pipeline { stages })
    }

    fn stage(&mut self) -> Result<Stage, ProcessorError> {
        let mut items = StageItems::default();
        loop {
            let token = self.peek().clone();
            match token.kind {
                TokenKind::End | TokenKind::Arrow => break,
                TokenKind::Ident(name) => {
                    self.advance();
                    self.item(&name, token.position, &mut items)?;
                }
                other => {
                    return Err(parse_error(token.position, format!("unexpected {other}")));
                }
            }
        }

        if let (Some(column), Some(component)) = (items.first_column, items.first_component) {
            return Err(parse_error(
                column.max(component),
                "cannot mix field projections with aggregations in one stage",
            ));
        }
        if items.components.is_empty() {
            Ok(Stage::Simple(SimpleTable {
                filters: items.filters,
                columns: items.columns,
            }))
        } else {
            Ok(Stage::Aggregated(AggregatedTable {
                filters: items.filters,
                components: items.components,
            }))
        }
    }

    fn item(
        &mut self,
        name: &str,
        position: usize,
        items: &mut StageItems,
    ) -> Result<(), ProcessorError> {
        let component = match name {
            "key" => Component::Key(self.single_argument()?),
            "sum" => Component::Sum(self.single_argument()?),
            "min" => Component::Min(self.argument_list()?),
            "max" => Component::Max(self.argument_list()?),
            "count" => self.count()?,
            "filter" => {
                self.expect(TokenKind::LParen)?;
                let expr = self.expr()?;
                let filter = self.filter_pattern(expr)?;
                self.expect(TokenKind::RParen)?;
                items.filters.push(filter);
                return Ok(());
            }
            _ if name.starts_with('_') => {
                items.columns.push(parse_expr(name, position)?);
                items.first_column.get_or_insert(position);
                return Ok(());
            }
            _ => match self.short_form(name, position)? {
                ShortForm::Component(c) => c,
                ShortForm::Filter(expr) => {
                    let filter = self.filter_pattern(expr)?;
                    items.filters.push(filter);
                    return Ok(());
                }
            },
        };
        items.components.push(component);
        items.first_component.get_or_insert(position);
        Ok(())
    }

    fn expr(&mut self) -> Result<Expr, ProcessorError> {
        let token = self.advance();
        match &token.kind {
            TokenKind::Ident(name) if name.starts_with('_') => parse_expr(name, token.position),
            other => Err(parse_error(
                token.position,
                format!("expected field reference like _1 but found {other}"),
            )),
        }
    }

    fn single_argument(&mut self) -> Result<Expr, ProcessorError> {
        self.expect(TokenKind::LParen)?;
        let expr = self.expr()?;
        self.expect(TokenKind::RParen)?;
        Ok(expr)
    }

    fn argument_list(&mut self) -> Result<Vec<Expr>, ProcessorError> {
        self.expect(TokenKind::LParen)?;
        let mut exprs = vec![self.expr()?];
        while self.peek().kind == TokenKind::Comma {
            self.advance();
            exprs.push(self.expr()?);
        }
        self.expect(TokenKind::RParen)?;
        Ok(exprs)
    }

    fn count(&mut self) -> Result<Component, ProcessorError> {
        if self.peek().kind != TokenKind::LParen {
            return Ok(Component::Count);
        }
        self.advance();
        let token = self.advance();
        if token.kind != TokenKind::Ident("distinct".into()) {
            return Err(parse_error(
                token.position,
                format!("expected 'distinct' but found {}", token.kind),
            ));
        }
        self.expect(TokenKind::Comma)?;
        let expr = self.expr()?;
        self.expect(TokenKind::RParen)?;
        Ok(Component::CountDistinct(expr))
    }

    fn filter_pattern(&mut self, expr: Expr) -> Result<Filter, ProcessorError> {
        self.expect(TokenKind::Tilde)?;
        let token = self.advance();
        match token.kind {
            TokenKind::Pattern(regexp) => Ok(Filter { expr, regexp }),
            other => Err(parse_error(
                token.position,
                format!("expected pattern but found {other}"),
            )),
        }
    }

    fn short_form(&mut self, name: &str, position: usize) -> Result<ShortForm, ProcessorError> {
        if name == "c" {
            return Ok(ShortForm::Component(Component::Count));
        }
        if name == "f" {
            return Ok(ShortForm::Filter(Expr::field(0)));
        }
        let (code, rest) = match name.strip_prefix("cd") {
            Some(rest) => ("cd", rest),
            None => name.split_at(1),
        };
        if !matches!(code, "k" | "s" | "m" | "M" | "cd" | "f") {
            return Err(parse_error(position, format!("unknown item '{name}'")));
        }
        let numbers = parse_numbers(rest, position)?;
        let single = |numbers: &[usize]| match numbers {
            [n] => Ok(Expr::field(*n)),
            _ => Err(parse_error(
                position,
                format!("'{code}' takes exactly one field number"),
            )),
        };

        let component = match code {
            "k" => Component::Key(single(&numbers)?),
            "s" => Component::Sum(single(&numbers)?),
            "cd" => Component::CountDistinct(single(&numbers)?),
            "m" => Component::Min(numbers.into_iter().map(Expr::field).collect()),
            "M" => Component::Max(numbers.into_iter().map(Expr::field).collect()),
            _ => return Ok(ShortForm::Filter(single(&numbers)?)),
        };
        Ok(ShortForm::Component(component))
    }
}

enum ShortForm {
    Component(Component),
    Filter(Expr),
}

fn parse_expr(name: &str, position: usize) -> Result<Expr, ProcessorError> {
    let digits = &name[1..];
    digits
        .parse()
        .map(Expr::field)
        .map_err(|_| parse_error(position, format!("bad field reference '{name}'")))
}

/// Parses the `1_2_3` tail of a short form into `[1, 2, 3]`.
fn parse_numbers(text: &str, position: usize) -> Result<Vec<usize>, ProcessorError> {
    if text.is_empty() {
        return Err(parse_error(position, "expected field number"));
    }
    text.split('_')
        .map(|n| {
            n.parse()
                .map_err(|_| parse_error(position, format!("bad integer '{n}'")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(text: &str) -> String {
        parse_pipeline(text).unwrap().to_string()
    }

    fn error_position(text: &str) -> usize {
        match parse_pipeline(text) {
            Err(ProcessorError::Parse { position, .. }) => position,
            other => panic!("expected parse error for {text:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_tokenize() {
        let kinds: Vec<TokenKind> = tokenize("key(_1)=>count")
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident("key".into()),
                TokenKind::LParen,
                TokenKind::Ident("_1".into()),
                TokenKind::RParen,
                TokenKind::Arrow,
                TokenKind::Ident("count".into()),
                TokenKind::End,
            ]
        );
    }

    #[test]
    fn test_tokenize_patterns() {
        let tokens = tokenize("filter(_1~^(A|B)\\)x) c").unwrap();
        assert_eq!(tokens[4].kind, TokenKind::Pattern("^(A|B)\\)x".into()));
        assert_eq!(tokens[5].kind, TokenKind::RParen);

        let tokens = tokenize(r#"f~"a \"b\" \d""#).unwrap();
        assert_eq!(tokens[2].kind, TokenKind::Pattern(r#"a "b" \d"#.into()));
        assert_eq!(tokens[3].kind, TokenKind::End);

        let tokens = tokenize(r"f~A\=>x").unwrap();
        assert_eq!(tokens[2].kind, TokenKind::Pattern(r"A\=>x".into()));
    }

    #[test]
    fn test_bare_pattern_ends_at_arrow() {
        assert_eq!(canonical("f~A=>c"), "filter(_0~A) _0 => count");
        assert_eq!(canonical("f~^(A|B)=>k0 c"), "filter(_0~^(A|B)) _0 => key(_0) count");
        assert_eq!(canonical(r#"f~"A=>B" c"#), r#"filter(_0~"A=>B") count"#);
    }

    #[test]
    fn test_long_forms() {
        assert_eq!(canonical("count key(_1) => count"), "count key(_1) => count");
        assert_eq!(canonical("count(distinct, _1)"), "count(distinct, _1)");
        assert_eq!(canonical("filter(_1~AAPL) max(_3, _2)"), "filter(_1~AAPL) max(_3, _2)");
        assert_eq!(canonical("sum(_2) min( _4 )"), "sum(_2) min(_4)");
    }

    #[test]
    fn test_short_forms() {
        assert_eq!(canonical("c k1=>c"), "count key(_1) => count");
        assert_eq!(canonical("f~AAPL c"), "filter(_0~AAPL) count");
        assert_eq!(canonical(" f1~ AAPL"), "filter(_1~AAPL) _0");
        assert_eq!(
            canonical("k0 s2 m3 M3_1_2 cd4"),
            "key(_0) sum(_2) min(_3) max(_3, _1, _2) count(distinct, _4)"
        );
    }

    #[test]
    fn test_empty_spec_is_passthrough() {
        assert_eq!(canonical(""), "_0");
        assert_eq!(canonical("   "), "_0");
        assert_eq!(
            parse_pipeline("").unwrap(),
            Pipeline {
                stages: vec![Stage::Simple(SimpleTable::default())]
            }
        );
    }

    #[test]
    fn test_projection() {
        assert_eq!(canonical("k0 c => _1 _0"), "key(_0) count => _1 _0");
    }

    #[test]
    fn test_errors() {
        assert_eq!(error_position("count =>"), 8);
        assert_eq!(error_position("key(_1"), 6);
        assert_eq!(error_position("sum(x)"), 4);
        assert_eq!(error_position("c bogus"), 2);
        assert_eq!(error_position("c _1"), 2);
        assert_eq!(error_position("k1x"), 0);
        assert_eq!(error_position("count(_1)"), 6);
        assert_eq!(error_position("c ; c"), 2);
        assert_eq!(error_position("f1~"), 3);
        assert_eq!(error_position("f~\"open"), 2);
    }
}
