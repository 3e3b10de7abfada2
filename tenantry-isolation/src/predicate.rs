//! Filter Predicates
//!
//! A small expression tree used for row-level tenant filters. Every field
//! reference carries the name of the parameter it is written against, so
//! two filters written against different parameters can be rebound onto
//! one before they are combined.
//!
//! Evaluation follows SQL three-valued logic: any comparison involving
//! `null` is unknown, and unknown rows never match.

use crate::entity::Record;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Parameter name used by [`Expr::field`]
pub const DEFAULT_PARAMETER: &str = "e";

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    fn apply(&self, ordering: Option<Ordering>) -> bool {
        match (self, ordering) {
            (CompareOp::Eq, ordering) => ordering == Some(Ordering::Equal),
            (CompareOp::Ne, ordering) => ordering != Some(Ordering::Equal),
            (_, None) => false,
            (CompareOp::Lt, Some(o)) => o == Ordering::Less,
            (CompareOp::Le, Some(o)) => o != Ordering::Greater,
            (CompareOp::Gt, Some(o)) => o == Ordering::Greater,
            (CompareOp::Ge, Some(o)) => o != Ordering::Less,
        }
    }
}

/// Filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Field of the record bound to `parameter`
    Field { parameter: String, name: String },
    Value(Value),
    /// Placeholder for the ambient tenant id, replaced by [`Expr::bind_tenant`]
    CurrentTenant,
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
}

/// Node-level rewriter.
///
/// Returning `Some` replaces the node without descending into it;
/// returning `None` keeps the node and rewrites its children.
pub trait ExprRewriter {
    fn rewrite_node(&mut self, expr: &Expr) -> Option<Expr>;
}

struct ParameterRebinder<'a> {
    parameter: &'a str,
}

impl ExprRewriter for ParameterRebinder<'_> {
    fn rewrite_node(&mut self, expr: &Expr) -> Option<Expr> {
        match expr {
            Expr::Field { name, .. } => Some(Expr::field_of(self.parameter, name.clone())),
            _ => None,
        }
    }
}

struct TenantBinder<'a> {
    tenant_id: Option<&'a str>,
}

impl ExprRewriter for TenantBinder<'_> {
    fn rewrite_node(&mut self, expr: &Expr) -> Option<Expr> {
        match expr {
            Expr::CurrentTenant => Some(match self.tenant_id {
                Some(id) => Expr::Value(Value::String(id.to_string())),
                None => Expr::Value(Value::Null),
            }),
            _ => None,
        }
    }
}

impl Expr {
    /// Field on the default parameter
    pub fn field(name: impl Into<String>) -> Self {
        Self::field_of(DEFAULT_PARAMETER, name)
    }

    pub fn field_of(parameter: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Field {
            parameter: parameter.into(),
            name: name.into(),
        }
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Expr::Value(value.into())
    }

    pub fn current_tenant() -> Self {
        Expr::CurrentTenant
    }

    fn compare(self, op: CompareOp, other: Expr) -> Self {
        Expr::Compare {
            op,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    pub fn eq(self, other: Expr) -> Self {
        self.compare(CompareOp::Eq, other)
    }

    pub fn ne(self, other: Expr) -> Self {
        self.compare(CompareOp::Ne, other)
    }

    pub fn lt(self, other: Expr) -> Self {
        self.compare(CompareOp::Lt, other)
    }

    pub fn le(self, other: Expr) -> Self {
        self.compare(CompareOp::Le, other)
    }

    pub fn gt(self, other: Expr) -> Self {
        self.compare(CompareOp::Gt, other)
    }

    pub fn ge(self, other: Expr) -> Self {
        self.compare(CompareOp::Ge, other)
    }

    pub fn and(self, other: Expr) -> Self {
        Expr::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Expr) -> Self {
        Expr::Or(Box::new(self), Box::new(other))
    }

    pub fn is_null(self) -> Self {
        Expr::IsNull(Box::new(self))
    }

    /// Parameter names referenced by field nodes
    pub fn parameters(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_parameters(&mut out);
        out
    }

    fn collect_parameters<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Field { parameter, .. } => {
                out.insert(parameter.as_str());
            }
            Expr::Value(_) | Expr::CurrentTenant => {}
            Expr::Compare { left, right, .. } | Expr::And(left, right) | Expr::Or(left, right) => {
                left.collect_parameters(out);
                right.collect_parameters(out);
            }
            Expr::Not(inner) | Expr::IsNull(inner) => inner.collect_parameters(out),
        }
    }

    /// The parameter this expression is written against: the first one
    /// met in a left-to-right walk of the tree
    pub fn primary_parameter(&self) -> &str {
        self.first_parameter().unwrap_or(DEFAULT_PARAMETER)
    }

    fn first_parameter(&self) -> Option<&str> {
        match self {
            Expr::Field { parameter, .. } => Some(parameter),
            Expr::Value(_) | Expr::CurrentTenant => None,
            Expr::Compare { left, right, .. } | Expr::And(left, right) | Expr::Or(left, right) => {
                left.first_parameter().or_else(|| right.first_parameter())
            }
            Expr::Not(inner) | Expr::IsNull(inner) => inner.first_parameter(),
        }
    }

    pub fn references_current_tenant(&self) -> bool {
        match self {
            Expr::CurrentTenant => true,
            Expr::Field { .. } | Expr::Value(_) => false,
            Expr::Compare { left, right, .. } | Expr::And(left, right) | Expr::Or(left, right) => {
                left.references_current_tenant() || right.references_current_tenant()
            }
            Expr::Not(inner) | Expr::IsNull(inner) => inner.references_current_tenant(),
        }
    }

    /// Rebuild the tree through a rewriter
    pub fn rewrite<R: ExprRewriter + ?Sized>(&self, rewriter: &mut R) -> Expr {
        if let Some(replacement) = rewriter.rewrite_node(self) {
            return replacement;
        }
        match self {
            Expr::Field { .. } | Expr::Value(_) | Expr::CurrentTenant => self.clone(),
            Expr::Compare { op, left, right } => Expr::Compare {
                op: *op,
                left: Box::new(left.rewrite(rewriter)),
                right: Box::new(right.rewrite(rewriter)),
            },
            Expr::And(left, right) => {
                Expr::And(Box::new(left.rewrite(rewriter)), Box::new(right.rewrite(rewriter)))
            }
            Expr::Or(left, right) => {
                Expr::Or(Box::new(left.rewrite(rewriter)), Box::new(right.rewrite(rewriter)))
            }
            Expr::Not(inner) => Expr::Not(Box::new(inner.rewrite(rewriter))),
            Expr::IsNull(inner) => Expr::IsNull(Box::new(inner.rewrite(rewriter))),
        }
    }

    /// Point every field reference at `parameter`
    pub fn rebind(&self, parameter: &str) -> Expr {
        self.rewrite(&mut ParameterRebinder { parameter })
    }

    /// Replace [`Expr::CurrentTenant`] with a literal (or `null` when absent)
    pub fn bind_tenant(&self, tenant_id: Option<&str>) -> Expr {
        self.rewrite(&mut TenantBinder { tenant_id })
    }

    /// AND `other` onto this expression after rebinding it to this
    /// expression's parameter
    pub fn and_rebound(self, other: &Expr) -> Expr {
        let rebound = other.rebind(self.primary_parameter());
        self.and(rebound)
    }

    /// Evaluate against a record.
    ///
    /// Logical nodes yield `Bool` or `Null` (unknown).
    pub fn evaluate(&self, record: &Record) -> Value {
        match self {
            Expr::Field { name, .. } => record.get(name).cloned().unwrap_or(Value::Null),
            Expr::Value(value) => value.clone(),
            Expr::CurrentTenant => Value::Null,
            Expr::Compare { op, left, right } => {
                let left = left.evaluate(record);
                let right = right.evaluate(record);
                if left.is_null() || right.is_null() {
                    return Value::Null;
                }
                Value::Bool(op.apply(compare_values(&left, &right)))
            }
            Expr::And(left, right) => {
                match (truth(&left.evaluate(record)), truth(&right.evaluate(record))) {
                    (Some(false), _) | (_, Some(false)) => Value::Bool(false),
                    (Some(true), Some(true)) => Value::Bool(true),
                    _ => Value::Null,
                }
            }
            Expr::Or(left, right) => {
                match (truth(&left.evaluate(record)), truth(&right.evaluate(record))) {
                    (Some(true), _) | (_, Some(true)) => Value::Bool(true),
                    (Some(false), Some(false)) => Value::Bool(false),
                    _ => Value::Null,
                }
            }
            Expr::Not(inner) => match truth(&inner.evaluate(record)) {
                Some(b) => Value::Bool(!b),
                None => Value::Null,
            },
            Expr::IsNull(inner) => Value::Bool(inner.evaluate(record).is_null()),
        }
    }

    /// Whether the record passes the filter
    pub fn matches(&self, record: &Record) -> bool {
        self.evaluate(record) == Value::Bool(true)
    }

    /// Render as a SQL boolean expression with `$n` positional parameters.
    ///
    /// Bind the tenant first; an unbound [`Expr::CurrentTenant`] renders as
    /// a `null` parameter.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sql = self.write_sql(&mut params);
        (sql, params)
    }

    fn write_sql(&self, params: &mut Vec<Value>) -> String {
        match self {
            Expr::Field { name, .. } => format!("\"{}\"", name.replace('"', "\"\"")),
            Expr::Value(Value::Null) => "NULL".to_string(),
            Expr::Value(value) => {
                params.push(value.clone());
                format!("${}", params.len())
            }
            Expr::CurrentTenant => {
                params.push(Value::Null);
                format!("${}", params.len())
            }
            Expr::Compare { op, left, right } => {
                let left = left.write_sql(params);
                let right = right.write_sql(params);
                format!("{} {} {}", left, op.sql(), right)
            }
            Expr::And(left, right) => {
                let left = left.write_sql(params);
                let right = right.write_sql(params);
                format!("({} AND {})", left, right)
            }
            Expr::Or(left, right) => {
                let left = left.write_sql(params);
                let right = right.write_sql(params);
                format!("({} OR {})", left, right)
            }
            Expr::Not(inner) => format!("NOT ({})", inner.write_sql(params)),
            Expr::IsNull(inner) => format!("{} IS NULL", inner.write_sql(params)),
        }
    }
}

impl std::ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}

fn truth(value: &Value) -> Option<bool> {
    value.as_bool()
}

fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (a, b) if a == b => Some(Ordering::Equal),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_comparisons() {
        let row = record(json!({"total": 42, "status": "open"}));

        assert!(Expr::field("total").gt(Expr::value(40)).matches(&row));
        assert!(Expr::field("total").le(Expr::value(42)).matches(&row));
        assert!(!Expr::field("total").lt(Expr::value(42)).matches(&row));
        assert!(Expr::field("status").eq(Expr::value("open")).matches(&row));
        assert!(Expr::field("status").ne(Expr::value("closed")).matches(&row));
    }

    #[test]
    fn test_null_is_unknown() {
        let row = record(json!({"tenant_id": null}));
        let filter = Expr::field("tenant_id").eq(Expr::value(Value::Null));
        assert_eq!(filter.evaluate(&row), Value::Null);
        assert!(!filter.matches(&row));
        assert!(!(!filter.clone()).matches(&row));
        assert!(Expr::field("tenant_id").is_null().matches(&row));
        assert!(Expr::field("missing").is_null().matches(&row));
    }

    #[test]
    fn test_three_valued_logic() {
        let row = record(json!({"a": 1}));
        let unknown = Expr::field("b").eq(Expr::value(1));
        let yes = Expr::field("a").eq(Expr::value(1));
        let no = Expr::field("a").eq(Expr::value(2));

        assert_eq!(unknown.clone().and(no.clone()).evaluate(&row), Value::Bool(false));
        assert_eq!(unknown.clone().and(yes.clone()).evaluate(&row), Value::Null);
        assert_eq!(unknown.clone().or(yes).evaluate(&row), Value::Bool(true));
        assert_eq!(unknown.or(no).evaluate(&row), Value::Null);
    }

    #[test]
    fn test_bind_tenant() {
        let filter = Expr::field("tenant_id").eq(Expr::current_tenant());
        assert!(filter.references_current_tenant());

        let bound = filter.bind_tenant(Some("acme"));
        assert!(!bound.references_current_tenant());
        assert!(bound.matches(&record(json!({"tenant_id": "acme"}))));
        assert!(!bound.matches(&record(json!({"tenant_id": "globex"}))));

        let unbound = filter.bind_tenant(None);
        assert!(!unbound.matches(&record(json!({"tenant_id": "acme"}))));
        assert!(!unbound.matches(&record(json!({"tenant_id": null}))));
    }

    #[test]
    fn test_and_rebound_unifies_parameters() {
        let tenant = Expr::field_of("t", "tenant_id").eq(Expr::current_tenant());
        let existing = Expr::field_of("o", "deleted").eq(Expr::value(false));

        let combined = tenant.and_rebound(&existing);
        assert_eq!(combined.parameters().into_iter().collect::<Vec<_>>(), vec!["t"]);

        let bound = combined.bind_tenant(Some("acme"));
        assert!(bound.matches(&record(json!({"tenant_id": "acme", "deleted": false}))));
        assert!(!bound.matches(&record(json!({"tenant_id": "acme", "deleted": true}))));
    }

    #[test]
    fn test_primary_parameter_follows_tree_order() {
        let filter = Expr::field_of("z", "tenant_id")
            .eq(Expr::current_tenant())
            .and(Expr::field_of("a", "total").gt(Expr::value(1)));
        assert_eq!(filter.primary_parameter(), "z");

        let combined = filter.and_rebound(&Expr::field_of("m", "deleted").eq(Expr::value(false)));
        assert!(!combined.parameters().contains("m"));
        assert!(combined.parameters().contains("z"));

        assert_eq!(Expr::value(1).primary_parameter(), DEFAULT_PARAMETER);
    }

    #[test]
    fn test_to_sql() {
        let filter = Expr::field("tenant_id")
            .eq(Expr::current_tenant())
            .and(Expr::field("total").ge(Expr::value(10)))
            .bind_tenant(Some("acme"));

        let (sql, params) = filter.to_sql();
        assert_eq!(sql, "(\"tenant_id\" = $1 AND \"total\" >= $2)");
        assert_eq!(params, vec![json!("acme"), json!(10)]);

        let (sql, params) = (!Expr::field("x").is_null()).to_sql();
        assert_eq!(sql, "NOT (\"x\" IS NULL)");
        assert!(params.is_empty());
    }
}
