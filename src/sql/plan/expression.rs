use std::{cmp::Ordering, fmt::Display};

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::{
    error::{Error, Result},
    sql::{
        plan::Node,
        types::{Label, Value},
    },
};

/// Expression tree evaluated against a single row
///
/// Field references are by name and must be resolved to column positions
/// (`resolve_fields`) before evaluation. Subqueries are resolved by the
/// executor, which replaces them with constants before evaluating.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Constant(Value),
    /// Column reference: optional table name or alias, column name
    Field(Option<String>, String),
    /// Reference to a column of the enclosing query's current row; makes
    /// the subquery containing it correlated.
    OuterField(Option<String>, String),
    /// Resolved column position in the input row
    Column(usize),

    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),

    Equal(Box<Expression>, Box<Expression>),
    NotEqual(Box<Expression>, Box<Expression>),
    GreaterThan(Box<Expression>, Box<Expression>),
    GreaterThanOrEqual(Box<Expression>, Box<Expression>),
    LessThan(Box<Expression>, Box<Expression>),
    LessThanOrEqual(Box<Expression>, Box<Expression>),
    IsNull(Box<Expression>),

    Add(Box<Expression>, Box<Expression>),
    Subtract(Box<Expression>, Box<Expression>),
    Multiply(Box<Expression>, Box<Expression>),
    Divide(Box<Expression>, Box<Expression>),
    Modulo(Box<Expression>, Box<Expression>),
    Negate(Box<Expression>),

    Upper(Box<Expression>),
    Lower(Box<Expression>),
    /// LIKE with `%` and `_` wildcards; the flag requests case-sensitive
    /// matching, otherwise ASCII letters match regardless of case.
    Like(Box<Expression>, Box<Expression>, bool),
    /// LIKE against a constant pattern, compiled once by `resolve_fields`
    Matches(Box<Expression>, LikePattern),

    InList(Box<Expression>, Vec<Expression>),
    InSubquery(Box<Expression>, Box<Node>),
    /// Scalar subquery: first value of a single-column result, or NULL
    Subquery(Box<Node>),
    Exists(Box<Node>),
}

impl From<Value> for Expression {
    fn from(value: Value) -> Self {
        Self::Constant(value)
    }
}

/// Finds the position of a column among the labels of a row.
pub fn lookup_column(labels: &[Label], table: Option<&str>, name: &str) -> Result<usize> {
    let mut matches = labels
        .iter()
        .enumerate()
        .filter(|(_, l)| l.matches(table, name))
        .map(|(i, _)| i);
    let field = match table {
        Some(t) => format!("{}.{}", t, name),
        None => name.to_string(),
    };
    match (matches.next(), matches.next()) {
        (Some(i), None) => Ok(i),
        (Some(_), Some(_)) => Err(Error::Query(format!("ambiguous column name: {}", field))),
        (None, _) => Err(Error::Query(format!("no such column: {}", field))),
    }
}

/// A compiled LIKE pattern
///
/// Without case sensitivity both the pattern and the matched text are
/// folded with ASCII rules only, so `é` and `É` stay distinct.
#[derive(Clone, Debug)]
pub struct LikePattern {
    pattern: String,
    case_sensitive: bool,
    regex: Regex,
}

impl LikePattern {
    pub fn new(pattern: &str, case_sensitive: bool) -> Result<Self> {
        let folded = if case_sensitive { pattern.to_string() } else { pattern.to_ascii_lowercase() };
        let mut re = String::from("^(?s)");
        for c in folded.chars() {
            match c {
                '%' => re.push_str(".*"),
                '_' => re.push('.'),
                c => re.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
            }
        }
        re.push('$');
        Ok(Self { pattern: pattern.to_string(), case_sensitive, regex: Regex::new(&re)? })
    }

    pub fn is_match(&self, text: &str) -> bool {
        if self.case_sensitive {
            self.regex.is_match(text)
        } else {
            self.regex.is_match(&text.to_ascii_lowercase())
        }
    }
}

impl PartialEq for LikePattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && self.case_sensitive == other.case_sensitive
    }
}

// Stored as the source pattern, recompiled on load
impl Serialize for LikePattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        (&self.pattern, self.case_sensitive).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for LikePattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let (pattern, case_sensitive) = <(String, bool)>::deserialize(deserializer)?;
        Self::new(&pattern, case_sensitive).map_err(de::Error::custom)
    }
}

fn compare(lhs: Value, rhs: Value, accept: fn(Ordering) -> bool) -> Result<Value> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Null);
    }
    match lhs.compare(&rhs) {
        Some(ordering) => Ok(Value::Boolean(accept(ordering))),
        None => Err(Error::Query(format!("can't compare {} and {}", lhs, rhs))),
    }
}

fn arithmetic(
    lhs: Value,
    rhs: Value,
    op: &str,
    int: fn(i64, i64) -> Option<i64>,
    real: fn(f64, f64) -> f64,
) -> Result<Value> {
    use Value::*;
    Ok(match (lhs, rhs) {
        (Null, Integer(_) | Real(_) | Null) | (Integer(_) | Real(_), Null) => Null,
        (Integer(l), Integer(r)) => match int(l, r) {
            Some(v) => Integer(v),
            // Division by zero yields NULL, overflow is an error
            None if r == 0 && (op == "/" || op == "%") => Null,
            None => return Err(Error::Query("integer overflow".into())),
        },
        (Integer(l), Real(r)) => Real(real(l as f64, r)),
        (Real(l), Integer(r)) => Real(real(l, r as f64)),
        (Real(l), Real(r)) => Real(real(l, r)),
        (l, r) => return Err(Error::Query(format!("can't compute {} {} {}", l, op, r))),
    })
}

impl Expression {
    /// Evaluates the expression against a row
    pub fn evaluate(&self, row: &[Value]) -> Result<Value> {
        use Value::*;
        Ok(match self {
            Self::Constant(c) => c.clone(),
            Self::Column(i) => row
                .get(*i)
                .cloned()
                .ok_or_else(|| Error::Query(format!("column index {} out of range", i)))?,
            Self::Field(_, name) | Self::OuterField(_, name) => {
                return Err(Error::Query(format!("unresolved column {}", name)));
            }

            // Three-valued logic: NULL is unknown
            Self::And(lhs, rhs) => match (lhs.evaluate(row)?, rhs.evaluate(row)?) {
                (Boolean(false), Boolean(_) | Null) | (Boolean(_) | Null, Boolean(false)) => {
                    Boolean(false)
                }
                (Boolean(true), Boolean(true)) => Boolean(true),
                (Boolean(_) | Null, Boolean(_) | Null) => Null,
                (l, r) => return Err(Error::Query(format!("can't AND {} and {}", l, r))),
            },
            Self::Or(lhs, rhs) => match (lhs.evaluate(row)?, rhs.evaluate(row)?) {
                (Boolean(true), Boolean(_) | Null) | (Boolean(_) | Null, Boolean(true)) => {
                    Boolean(true)
                }
                (Boolean(false), Boolean(false)) => Boolean(false),
                (Boolean(_) | Null, Boolean(_) | Null) => Null,
                (l, r) => return Err(Error::Query(format!("can't OR {} and {}", l, r))),
            },
            Self::Not(expr) => match expr.evaluate(row)? {
                Boolean(b) => Boolean(!b),
                Null => Null,
                v => return Err(Error::Query(format!("can't negate {}", v))),
            },

            Self::Equal(l, r) => compare(l.evaluate(row)?, r.evaluate(row)?, |o| o.is_eq())?,
            Self::NotEqual(l, r) => compare(l.evaluate(row)?, r.evaluate(row)?, |o| o.is_ne())?,
            Self::GreaterThan(l, r) => compare(l.evaluate(row)?, r.evaluate(row)?, |o| o.is_gt())?,
            Self::GreaterThanOrEqual(l, r) => {
                compare(l.evaluate(row)?, r.evaluate(row)?, |o| o.is_ge())?
            }
            Self::LessThan(l, r) => compare(l.evaluate(row)?, r.evaluate(row)?, |o| o.is_lt())?,
            Self::LessThanOrEqual(l, r) => {
                compare(l.evaluate(row)?, r.evaluate(row)?, |o| o.is_le())?
            }
            Self::IsNull(expr) => Boolean(expr.evaluate(row)?.is_null()),

            Self::Add(l, r) => {
                arithmetic(l.evaluate(row)?, r.evaluate(row)?, "+", i64::checked_add, |a, b| a + b)?
            }
            Self::Subtract(l, r) => {
                arithmetic(l.evaluate(row)?, r.evaluate(row)?, "-", i64::checked_sub, |a, b| a - b)?
            }
            Self::Multiply(l, r) => {
                arithmetic(l.evaluate(row)?, r.evaluate(row)?, "*", i64::checked_mul, |a, b| a * b)?
            }
            Self::Divide(l, r) => {
                arithmetic(l.evaluate(row)?, r.evaluate(row)?, "/", i64::checked_div, |a, b| a / b)?
            }
            Self::Modulo(l, r) => {
                arithmetic(l.evaluate(row)?, r.evaluate(row)?, "%", i64::checked_rem, |a, b| a % b)?
            }
            Self::Negate(expr) => match expr.evaluate(row)? {
                Integer(i) => Integer(-i),
                Real(f) => Real(-f),
                Null => Null,
                v => return Err(Error::Query(format!("can't negate {}", v))),
            },

            Self::Upper(expr) | Self::Lower(expr) => {
                let upper = matches!(self, Self::Upper(_));
                match expr.evaluate(row)? {
                    Null => Null,
                    Boolean(b) => return Err(Error::Query(format!("can't change case of {}", b))),
                    v => {
                        let s = v.to_string();
                        Text(if upper { s.to_uppercase() } else { s.to_lowercase() })
                    }
                }
            }
            Self::Like(lhs, pattern, case_sensitive) => {
                match (lhs.evaluate(row)?, pattern.evaluate(row)?) {
                    (Null, _) | (_, Null) => Null,
                    (Text(s), Text(p)) => Boolean(LikePattern::new(&p, *case_sensitive)?.is_match(&s)),
                    (l, r) => return Err(Error::Query(format!("can't LIKE {} and {}", l, r))),
                }
            }
            Self::Matches(expr, pattern) => match expr.evaluate(row)? {
                Null => Null,
                Text(s) => Boolean(pattern.is_match(&s)),
                v => return Err(Error::Query(format!("can't LIKE {} and '{}'", v, pattern.pattern))),
            },

            Self::InList(expr, list) => {
                let value = expr.evaluate(row)?;
                if value.is_null() {
                    return Ok(Null);
                }
                let mut saw_null = false;
                for item in list {
                    let item = item.evaluate(row)?;
                    if item.is_null() {
                        saw_null = true;
                    } else if value.compare(&item) == Some(Ordering::Equal) {
                        return Ok(Boolean(true));
                    }
                }
                if saw_null { Null } else { Boolean(false) }
            }
            Self::InSubquery(..) | Self::Subquery(_) | Self::Exists(_) => {
                return Err(Error::Query("unresolved subquery".into()));
            }
        })
    }

    fn children(&self) -> Vec<&Expression> {
        match self {
            Self::And(l, r)
            | Self::Or(l, r)
            | Self::Equal(l, r)
            | Self::NotEqual(l, r)
            | Self::GreaterThan(l, r)
            | Self::GreaterThanOrEqual(l, r)
            | Self::LessThan(l, r)
            | Self::LessThanOrEqual(l, r)
            | Self::Add(l, r)
            | Self::Subtract(l, r)
            | Self::Multiply(l, r)
            | Self::Divide(l, r)
            | Self::Modulo(l, r)
            | Self::Like(l, r, _) => vec![&**l, &**r],
            Self::Not(e)
            | Self::IsNull(e)
            | Self::Negate(e)
            | Self::Upper(e)
            | Self::Lower(e)
            | Self::Matches(e, _)
            | Self::InSubquery(e, _) => vec![&**e],
            Self::InList(e, list) => std::iter::once(&**e).chain(list.iter()).collect(),
            Self::Constant(_)
            | Self::Field(..)
            | Self::OuterField(..)
            | Self::Column(_)
            | Self::Subquery(_)
            | Self::Exists(_) => vec![],
        }
    }

    fn children_mut(&mut self) -> Vec<&mut Expression> {
        match self {
            Self::And(l, r)
            | Self::Or(l, r)
            | Self::Equal(l, r)
            | Self::NotEqual(l, r)
            | Self::GreaterThan(l, r)
            | Self::GreaterThanOrEqual(l, r)
            | Self::LessThan(l, r)
            | Self::LessThanOrEqual(l, r)
            | Self::Add(l, r)
            | Self::Subtract(l, r)
            | Self::Multiply(l, r)
            | Self::Divide(l, r)
            | Self::Modulo(l, r)
            | Self::Like(l, r, _) => vec![&mut **l, &mut **r],
            Self::Not(e)
            | Self::IsNull(e)
            | Self::Negate(e)
            | Self::Upper(e)
            | Self::Lower(e)
            | Self::Matches(e, _)
            | Self::InSubquery(e, _) => vec![&mut **e],
            Self::InList(e, list) => std::iter::once(&mut **e).chain(list.iter_mut()).collect(),
            Self::Constant(_)
            | Self::Field(..)
            | Self::OuterField(..)
            | Self::Column(_)
            | Self::Subquery(_)
            | Self::Exists(_) => vec![],
        }
    }

    /// Rebuilds the tree bottom-up through the closure. Subquery plans are
    /// leaves: their own expressions are not visited.
    pub fn transform<F>(mut self, f: &mut F) -> Result<Self>
    where
        F: FnMut(Expression) -> Result<Expression>,
    {
        for child in self.children_mut() {
            let expr = std::mem::replace(child, Expression::Constant(Value::Null));
            *child = expr.transform(&mut *f)?;
        }
        f(self)
    }

    /// Visits every node until the closure returns false. Does not descend
    /// into subquery plans.
    pub fn walk<F: FnMut(&Expression) -> bool>(&self, f: &mut F) -> bool {
        f(self) && self.children().into_iter().all(|c| c.walk(&mut *f))
    }

    /// Whether any node satisfies the predicate.
    pub fn contains<F: FnMut(&Expression) -> bool>(&self, f: &mut F) -> bool {
        !self.walk(&mut |e| !f(e))
    }

    pub fn has_subquery(&self) -> bool {
        self.contains(&mut |e| {
            matches!(e, Self::Subquery(_) | Self::InSubquery(..) | Self::Exists(_))
        })
    }

    /// Replaces field references with column positions in the given labels,
    /// and compiles LIKE patterns that are constant.
    pub fn resolve_fields(self, labels: &[Label]) -> Result<Self> {
        self.transform(&mut |e| match e {
            Self::Field(table, name) => {
                Ok(Self::Column(lookup_column(labels, table.as_deref(), &name)?))
            }
            Self::Like(lhs, pattern, case_sensitive) => match *pattern {
                Self::Constant(Value::Text(p)) => {
                    Ok(Self::Matches(lhs, LikePattern::new(&p, case_sensitive)?))
                }
                pattern => Ok(Self::Like(lhs, Box::new(pattern), case_sensitive)),
            },
            e => Ok(e),
        })
    }

    /// Replaces outer field references with the enclosing row's values.
    pub fn bind_outer(self, labels: &[Label], row: &[Value]) -> Result<Self> {
        self.transform(&mut |e| match e {
            Self::OuterField(table, name) => {
                let i = lookup_column(labels, table.as_deref(), &name)?;
                Ok(Self::Constant(row[i].clone()))
            }
            e => Ok(e),
        })
    }
}

/// Builders for composing plans by hand
impl Expression {
    pub fn field(name: &str) -> Self {
        Self::Field(None, name.to_string())
    }

    pub fn qualified(table: &str, name: &str) -> Self {
        Self::Field(Some(table.to_string()), name.to_string())
    }

    pub fn outer(table: Option<&str>, name: &str) -> Self {
        Self::OuterField(table.map(String::from), name.to_string())
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        Self::Constant(value.into())
    }

    pub fn and(self, rhs: Expression) -> Self {
        Self::And(Box::new(self), Box::new(rhs))
    }

    pub fn or(self, rhs: Expression) -> Self {
        Self::Or(Box::new(self), Box::new(rhs))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    pub fn equal(self, rhs: Expression) -> Self {
        Self::Equal(Box::new(self), Box::new(rhs))
    }

    pub fn not_equal(self, rhs: Expression) -> Self {
        Self::NotEqual(Box::new(self), Box::new(rhs))
    }

    pub fn gt(self, rhs: Expression) -> Self {
        Self::GreaterThan(Box::new(self), Box::new(rhs))
    }

    pub fn gte(self, rhs: Expression) -> Self {
        Self::GreaterThanOrEqual(Box::new(self), Box::new(rhs))
    }

    pub fn lt(self, rhs: Expression) -> Self {
        Self::LessThan(Box::new(self), Box::new(rhs))
    }

    pub fn lte(self, rhs: Expression) -> Self {
        Self::LessThanOrEqual(Box::new(self), Box::new(rhs))
    }

    pub fn like(self, pattern: Expression) -> Self {
        Self::Like(Box::new(self), Box::new(pattern), false)
    }

    pub fn like_case_sensitive(self, pattern: Expression) -> Self {
        Self::Like(Box::new(self), Box::new(pattern), true)
    }

    pub fn in_list(self, list: Vec<Expression>) -> Self {
        Self::InList(Box::new(self), list)
    }

    pub fn in_subquery(self, node: Node) -> Self {
        Self::InSubquery(Box::new(self), Box::new(node))
    }

    pub fn subquery(node: Node) -> Self {
        Self::Subquery(Box::new(node))
    }

    pub fn exists(node: Node) -> Self {
        Self::Exists(Box::new(node))
    }

    pub fn is_null(self) -> Self {
        Self::IsNull(Box::new(self))
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let binary = |f: &mut std::fmt::Formatter<'_>, l: &Expression, op: &str, r: &Expression| {
            write!(f, "{} {} {}", l, op, r)
        };
        match self {
            Self::Constant(Value::Text(s)) => write!(f, "'{}'", s),
            Self::Constant(v) => write!(f, "{}", v),
            Self::Field(Some(t), n) | Self::OuterField(Some(t), n) => write!(f, "{}.{}", t, n),
            Self::Field(None, n) | Self::OuterField(None, n) => write!(f, "{}", n),
            Self::Column(i) => write!(f, "#{}", i),
            Self::And(l, r) => binary(f, l, "AND", r),
            Self::Or(l, r) => binary(f, l, "OR", r),
            Self::Not(e) => write!(f, "NOT {}", e),
            Self::Equal(l, r) => binary(f, l, "=", r),
            Self::NotEqual(l, r) => binary(f, l, "!=", r),
            Self::GreaterThan(l, r) => binary(f, l, ">", r),
            Self::GreaterThanOrEqual(l, r) => binary(f, l, ">=", r),
            Self::LessThan(l, r) => binary(f, l, "<", r),
            Self::LessThanOrEqual(l, r) => binary(f, l, "<=", r),
            Self::IsNull(e) => write!(f, "{} IS NULL", e),
            Self::Add(l, r) => binary(f, l, "+", r),
            Self::Subtract(l, r) => binary(f, l, "-", r),
            Self::Multiply(l, r) => binary(f, l, "*", r),
            Self::Divide(l, r) => binary(f, l, "/", r),
            Self::Modulo(l, r) => binary(f, l, "%", r),
            Self::Negate(e) => write!(f, "-{}", e),
            Self::Upper(e) => write!(f, "upper({})", e),
            Self::Lower(e) => write!(f, "lower({})", e),
            Self::Like(l, r, _) => binary(f, l, "LIKE", r),
            Self::Matches(e, p) => write!(f, "{} LIKE '{}'", e, p.pattern),
            Self::InList(e, list) => {
                let items = list.iter().map(|i| i.to_string()).collect::<Vec<_>>();
                write!(f, "{} IN ({})", e, items.join(", "))
            }
            Self::InSubquery(e, _) => write!(f, "{} IN (subquery)", e),
            Self::Subquery(_) => write!(f, "(subquery)"),
            Self::Exists(_) => write!(f, "EXISTS (subquery)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Expression;
    use crate::{
        error::{Error, Result},
        sql::types::{Label, Value},
    };

    fn students() -> (Vec<Label>, Vec<Value>) {
        (
            vec![
                Label::qualified("students", "id"),
                Label::qualified("students", "name"),
                Label::qualified("students", "age"),
            ],
            vec![Value::Integer(3), Value::from("Charlie"), Value::Integer(18)],
        )
    }

    fn eval(expr: Expression) -> Result<Value> {
        let (labels, row) = students();
        expr.resolve_fields(&labels)?.evaluate(&row)
    }

    #[test]
    fn test_logic() -> Result<()> {
        let name = Expression::field("name");
        let age = Expression::field("age");
        assert_eq!(
            eval(name.clone().equal(Expression::constant("Charlie")).or(age.clone().gt(Expression::constant(18i64))))?,
            Value::Boolean(true)
        );
        assert_eq!(
            eval(name.equal(Expression::constant("Alice")).and(age.equal(Expression::constant(18i64))))?,
            Value::Boolean(false)
        );
        assert_eq!(
            eval(Expression::constant(Value::Null).and(Expression::constant(false)))?,
            Value::Boolean(false)
        );
        assert_eq!(
            eval(Expression::constant(Value::Null).or(Expression::constant(false)))?,
            Value::Null
        );
        Ok(())
    }

    #[test]
    fn test_in_list() -> Result<()> {
        let names = vec![Expression::constant("Alice"), Expression::constant("Charlie")];
        assert_eq!(eval(Expression::field("name").in_list(names.clone()))?, Value::Boolean(true));
        assert_eq!(
            eval(Expression::field("name").in_list(names).not())?,
            Value::Boolean(false)
        );
        assert_eq!(
            eval(Expression::field("age").in_list(vec![Expression::constant(Value::Null)]))?,
            Value::Null
        );
        Ok(())
    }

    #[test]
    fn test_like() -> Result<()> {
        let name = Expression::field("name");
        assert_eq!(eval(name.clone().like(Expression::constant("%C%")))?, Value::Boolean(true));
        assert_eq!(eval(name.clone().like(Expression::constant("%e")))?, Value::Boolean(true));
        assert_eq!(eval(name.clone().like(Expression::constant("C_arlie")))?, Value::Boolean(true));
        assert_eq!(eval(name.clone().like(Expression::constant("Charl")))?, Value::Boolean(false));
        assert_eq!(
            eval(name.clone().like_case_sensitive(Expression::constant("%c%")))?,
            Value::Boolean(false)
        );
        assert_eq!(
            eval(Expression::Upper(Box::new(name)).like_case_sensitive(Expression::Upper(
                Box::new(Expression::constant("%c%"))
            )))?,
            Value::Boolean(true)
        );
        assert_eq!(
            eval(Expression::constant("a.b").like(Expression::constant("a_b")))?,
            Value::Boolean(true)
        );
        assert_eq!(
            eval(Expression::constant("axb").like(Expression::constant("a.b")))?,
            Value::Boolean(false)
        );
        Ok(())
    }

    #[test]
    fn test_like_folds_ascii_only() -> Result<()> {
        let like = |text: &str, pattern: &str| {
            Expression::constant(text).like(Expression::constant(pattern)).evaluate(&[])
        };
        assert_eq!(like("é", "É")?, Value::Boolean(false));
        assert_eq!(like("é", "é")?, Value::Boolean(true));
        assert_eq!(like("Ärger", "ä%")?, Value::Boolean(false));
        assert_eq!(like("CAFÉ", "caf_")?, Value::Boolean(true));
        Ok(())
    }

    #[test]
    fn test_like_compiled_once() -> Result<()> {
        let (labels, row) = students();
        let resolved = Expression::field("name").like(Expression::constant("ch%")).resolve_fields(&labels)?;
        assert!(matches!(resolved, Expression::Matches(..)));
        assert_eq!(resolved.evaluate(&row)?, Value::Boolean(true));
        assert_eq!(resolved.to_string(), "#1 LIKE 'ch%'");

        // A pattern computed per row stays a plain LIKE
        let computed = Expression::field("name")
            .like(Expression::Upper(Box::new(Expression::constant("%e"))))
            .resolve_fields(&labels)?;
        assert!(matches!(computed, Expression::Like(..)));
        assert_eq!(computed.evaluate(&row)?, Value::Boolean(true));
        Ok(())
    }

    #[test]
    fn test_arithmetic() -> Result<()> {
        let id = Expression::field("id");
        assert_eq!(
            eval(Expression::Modulo(Box::new(id.clone()), Box::new(Expression::constant(2i64))))?,
            Value::Integer(1)
        );
        assert_eq!(
            eval(Expression::Divide(Box::new(id.clone()), Box::new(Expression::constant(0i64))))?,
            Value::Null
        );
        assert_eq!(
            eval(Expression::Add(Box::new(id), Box::new(Expression::constant(0.5))))?,
            Value::Real(3.5)
        );
        Ok(())
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            eval(Expression::field("missing").equal(Expression::constant(1i64))),
            Err(Error::Query(_))
        ));
        assert!(matches!(
            eval(Expression::field("name").gt(Expression::constant(1i64))),
            Err(Error::Query(_))
        ));
        assert!(matches!(
            Expression::field("age").evaluate(&[]),
            Err(Error::Query(_))
        ));
    }

    #[test]
    fn test_ambiguous_field() {
        let labels = vec![Label::qualified("s", "id"), Label::qualified("g", "id")];
        assert!(matches!(Expression::field("id").resolve_fields(&labels), Err(Error::Query(_))));
        assert_eq!(
            Expression::qualified("g", "id").resolve_fields(&labels),
            Ok(Expression::Column(1))
        );
    }
}
