//! Parsed form of a pipeline spec.
//!
//! Every node renders back to canonical spec text through `Display`, e.g.
//! `c k1=>c` renders as `count key(_1) => count`.

use std::fmt;

/// Reference to a positional input field, written `_N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expr {
    pub field: usize,
}

impl Expr {
    pub fn field(field: usize) -> Self {
        Expr { field }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_{}", self.field)
    }
}

/// One item of an aggregated stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    Key(Expr),
    Sum(Expr),
    /// Value expression first; any further expressions are carried from the
    /// row holding the minimum.
    Min(Vec<Expr>),
    Max(Vec<Expr>),
    Count,
    CountDistinct(Expr),
}

impl Component {
    pub fn num_columns(&self) -> usize {
        match self {
            Component::Min(exprs) | Component::Max(exprs) => exprs.len().saturating_sub(1).max(1),
            _ => 1,
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Key(e) => write!(f, "key({e})"),
            Component::Sum(e) => write!(f, "sum({e})"),
            Component::Min(exprs) => write!(f, "min({})", ExprList(exprs)),
            Component::Max(exprs) => write!(f, "max({})", ExprList(exprs)),
            Component::Count => f.write_str("count"),
            Component::CountDistinct(e) => write!(f, "count(distinct, {e})"),
        }
    }
}

struct ExprList<'a>(&'a [Expr]);

impl fmt::Display for ExprList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i != 0 {
                f.write_str(", ")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

/// Keeps rows whose field matches `regexp` (unanchored search).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub expr: Expr,
    pub regexp: String,
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "filter({}~", self.expr)?;
        if is_bare_pattern(&self.regexp) {
            f.write_str(&self.regexp)?;
        } else {
            f.write_str("\"")?;
            for c in self.regexp.chars() {
                if c == '"' || c == '\\' {
                    f.write_str("\\")?;
                }
                write!(f, "{c}")?;
            }
            f.write_str("\"")?;
        }
        f.write_str(")")
    }
}

/// Whether `pattern` reads back unchanged when written without quotes.
fn is_bare_pattern(pattern: &str) -> bool {
    let mut depth = 0usize;
    let mut escaped = false;
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' if chars.peek() == Some(&'>') => return false,
            '(' => depth += 1,
            ')' if depth == 0 => return false,
            ')' => depth -= 1,
            '"' | '\'' => return false,
            c if c.is_whitespace() => return false,
            _ => {}
        }
    }
    !pattern.is_empty() && !escaped && depth == 0
}

/// Filters, keys and aggregates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedTable {
    pub filters: Vec<Filter>,
    pub components: Vec<Component>,
}

/// Filters and a projection of input fields.
///
/// Without columns the stage is an implicit passthrough of field 0, which is
/// only valid as the last stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimpleTable {
    pub filters: Vec<Filter>,
    pub columns: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Simple(SimpleTable),
    Aggregated(AggregatedTable),
}

impl Stage {
    pub fn filters(&self) -> &[Filter] {
        match self {
            Stage::Simple(t) => &t.filters,
            Stage::Aggregated(t) => &t.filters,
        }
    }

    pub fn filters_mut(&mut self) -> &mut Vec<Filter> {
        match self {
            Stage::Simple(t) => &mut t.filters,
            Stage::Aggregated(t) => &mut t.filters,
        }
    }
}

impl Default for Stage {
    fn default() -> Self {
        Stage::Simple(SimpleTable::default())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for filter in self.filters() {
            write!(f, "{filter} ")?;
        }
        match self {
            Stage::Simple(t) if t.columns.is_empty() => f.write_str("_0"),
            Stage::Simple(t) => write_separated(f, &t.columns),
            Stage::Aggregated(t) => write_separated(f, &t.components),
        }
    }
}

fn write_separated<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i != 0 {
            f.write_str(" ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            if i != 0 {
                f.write_str(" => ")?;
            }
            write!(f, "{stage}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_aggregated() {
        let stage = Stage::Aggregated(AggregatedTable {
            filters: vec![Filter {
                expr: Expr::field(1),
                regexp: "AAPL".into(),
            }],
            components: vec![
                Component::Key(Expr::field(0)),
                Component::Max(vec![Expr::field(3), Expr::field(2)]),
                Component::CountDistinct(Expr::field(4)),
                Component::Count,
            ],
        });
        assert_eq!(
            stage.to_string(),
            "filter(_1~AAPL) key(_0) max(_3, _2) count(distinct, _4) count"
        );
    }

    #[test]
    fn test_render_pipeline() {
        let pipeline = Pipeline {
            stages: vec![
                Stage::Aggregated(AggregatedTable {
                    filters: vec![],
                    components: vec![Component::Key(Expr::field(1)), Component::Count],
                }),
                Stage::Simple(SimpleTable {
                    filters: vec![],
                    columns: vec![Expr::field(1), Expr::field(0)],
                }),
            ],
        };
        assert_eq!(pipeline.to_string(), "key(_1) count => _1 _0");
        assert_eq!(Stage::default().to_string(), "_0");
    }

    #[test]
    fn test_render_quotes_patterns_when_needed() {
        let render = |regexp: &str| {
            Filter {
                expr: Expr::field(0),
                regexp: regexp.into(),
            }
            .to_string()
        };
        assert_eq!(render("^(A|B)$"), "filter(_0~^(A|B)$)");
        assert_eq!(render(r"\d+\)"), r"filter(_0~\d+\))");
        assert_eq!(render("a b"), "filter(_0~\"a b\")");
        assert_eq!(render(r#"say "hi""#), r#"filter(_0~"say \"hi\"")"#);
        assert_eq!(render("x)"), "filter(_0~\"x)\")");
        assert_eq!(render("x("), "filter(_0~\"x(\")");
        assert_eq!(render("a=>b"), "filter(_0~\"a=>b\")");
    }

    #[test]
    fn test_num_columns() {
        assert_eq!(Component::Min(vec![Expr::field(1)]).num_columns(), 1);
        assert_eq!(
            Component::Max(vec![Expr::field(1), Expr::field(2), Expr::field(3)]).num_columns(),
            2
        );
        assert_eq!(Component::Count.num_columns(), 1);
    }
}
