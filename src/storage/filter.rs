//! Filter expressions over document collections.
//!
//! A [`Filter`] is evaluated against one collection. `HasParent` and
//! `HasChild` hop across a declared parent/child relation and evaluate the
//! inner filter in the related collection. Filters compile to parameterized
//! SQL over the shared `documents` table; field names never reach the SQL
//! text unchecked.

use crate::error::{Error, Result};
use crate::storage::documents::{CollectionSchema, FieldKind};
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A scalar a term filter compares against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TermValue {
    Text(String),
    Integer(i64),
    Bool(bool),
}

impl From<&str> for TermValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for TermValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for TermValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for TermValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl TermValue {
    fn fits(&self, kind: FieldKind) -> bool {
        match self {
            Self::Text(_) => matches!(kind, FieldKind::Keyword | FieldKind::Text),
            Self::Integer(_) => {
                matches!(kind, FieldKind::Integer | FieldKind::Float | FieldKind::Date)
            }
            Self::Bool(_) => kind == FieldKind::Boolean,
        }
    }

    fn to_sql(&self) -> SqlValue {
        match self {
            Self::Text(s) => SqlValue::Text(s.clone()),
            Self::Integer(n) => SqlValue::Integer(*n),
            Self::Bool(b) => SqlValue::Integer(i64::from(*b)),
        }
    }
}

/// Boolean filter over the documents of one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    MatchAll,
    MatchNone,
    Term { field: String, value: TermValue },
    Terms { field: String, values: Vec<TermValue> },
    /// `gte <= field < lt`; both bounds optional.
    Range {
        field: String,
        gte: Option<i64>,
        lt: Option<i64>,
    },
    Exists { field: String },
    Not(Box<Filter>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    /// Matches documents whose parent in `collection` matches `filter`.
    HasParent {
        collection: String,
        filter: Box<Filter>,
    },
    /// Matches documents with at least one child in `collection` matching `filter`.
    HasChild {
        collection: String,
        filter: Box<Filter>,
    },
}

impl Filter {
    #[must_use]
    pub fn term(field: &str, value: impl Into<TermValue>) -> Self {
        Self::Term {
            field: field.to_string(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn terms<V: Into<TermValue>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Self::Terms {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn range(field: &str, gte: Option<i64>, lt: Option<i64>) -> Self {
        Self::Range {
            field: field.to_string(),
            gte,
            lt,
        }
    }

    #[must_use]
    pub fn exists(field: &str) -> Self {
        Self::Exists {
            field: field.to_string(),
        }
    }

    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: Filter) -> Self {
        Self::Not(Box::new(filter))
    }

    #[must_use]
    pub fn has_parent(collection: &str, filter: Filter) -> Self {
        Self::HasParent {
            collection: collection.to_string(),
            filter: Box::new(filter),
        }
    }

    #[must_use]
    pub fn has_child(collection: &str, filter: Filter) -> Self {
        Self::HasChild {
            collection: collection.to_string(),
            filter: Box::new(filter),
        }
    }

    /// Conjunction of `self` and `other`, flattening nested `And`s.
    #[must_use]
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Self::MatchAll, f) | (f, Self::MatchAll) => f,
            (Self::And(mut a), Self::And(b)) => {
                a.extend(b);
                Self::And(a)
            }
            (Self::And(mut a), f) => {
                a.push(f);
                Self::And(a)
            }
            (f, Self::And(mut b)) => {
                b.insert(0, f);
                Self::And(b)
            }
            (a, b) => Self::And(vec![a, b]),
        }
    }
}

/// SQL fragment plus its positional parameters, in order.
#[derive(Debug)]
pub(crate) struct CompiledFilter {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Compile `filter` against `schema`, with the document row aliased `alias`.
pub(crate) fn compile(
    filter: &Filter,
    schema: &CollectionSchema,
    alias: &str,
    schemas: &HashMap<String, CollectionSchema>,
) -> Result<CompiledFilter> {
    let mut compiler = Compiler {
        schemas,
        params: Vec::new(),
        next_alias: 1,
    };
    let sql = compiler.emit(filter, schema, alias)?;
    Ok(CompiledFilter {
        sql,
        params: compiler.params,
    })
}

struct Compiler<'a> {
    schemas: &'a HashMap<String, CollectionSchema>,
    params: Vec<SqlValue>,
    next_alias: usize,
}

impl<'a> Compiler<'a> {
    fn emit(&mut self, filter: &Filter, schema: &CollectionSchema, alias: &str) -> Result<String> {
        let sql = match filter {
            Filter::MatchAll => "1 = 1".to_string(),
            Filter::MatchNone => "0 = 1".to_string(),

            Filter::Term { field, value } => {
                check_value(schema, field, value)?;
                let path = self.path(alias, field);
                self.params.push(value.to_sql());
                format!("{path} = ?")
            }

            Filter::Terms { field, values } => {
                field_kind(schema, field)?;
                if values.is_empty() {
                    return Ok("0 = 1".to_string());
                }
                for value in values {
                    check_value(schema, field, value)?;
                }
                let path = self.path(alias, field);
                let placeholders = vec!["?"; values.len()].join(", ");
                self.params.extend(values.iter().map(TermValue::to_sql));
                format!("{path} IN ({placeholders})")
            }

            Filter::Range { field, gte, lt } => {
                let kind = field_kind(schema, field)?;
                if !matches!(kind, FieldKind::Integer | FieldKind::Float | FieldKind::Date) {
                    return Err(Error::Query(format!(
                        "range on non-numeric field '{field}' of '{}'",
                        schema.name
                    )));
                }
                let mut parts = Vec::new();
                if let Some(lower) = gte {
                    let path = self.path(alias, field);
                    self.params.push(SqlValue::Integer(*lower));
                    parts.push(format!("{path} >= ?"));
                }
                if let Some(upper) = lt {
                    let path = self.path(alias, field);
                    self.params.push(SqlValue::Integer(*upper));
                    parts.push(format!("{path} < ?"));
                }
                if parts.is_empty() {
                    let path = self.path(alias, field);
                    parts.push(format!("{path} IS NOT NULL"));
                }
                parts.join(" AND ")
            }

            Filter::Exists { field } => {
                field_kind(schema, field)?;
                let path = self.path(alias, field);
                format!("{path} IS NOT NULL")
            }

            Filter::Not(inner) => format!("NOT ({})", self.emit(inner, schema, alias)?),

            Filter::And(parts) => self.join(parts, schema, alias, " AND ", "1 = 1")?,
            Filter::Or(parts) => self.join(parts, schema, alias, " OR ", "0 = 1")?,

            Filter::HasParent { collection, filter } => {
                if schema.parent.as_deref() != Some(collection.as_str()) {
                    return Err(Error::Query(format!(
                        "'{}' is not a child of '{collection}'",
                        schema.name
                    )));
                }
                let parent = self.lookup(collection)?;
                let p = self.alias();
                self.params.push(SqlValue::Text(collection.clone()));
                let inner = self.emit(filter, parent, &p)?;
                format!(
                    "EXISTS (SELECT 1 FROM documents {p} WHERE {p}.collection = ? \
                     AND {p}.key = {alias}.parent_key AND ({inner}))"
                )
            }

            Filter::HasChild { collection, filter } => {
                let child = self.lookup(collection)?;
                if child.parent.as_deref() != Some(schema.name.as_str()) {
                    return Err(Error::Query(format!(
                        "'{collection}' is not a child of '{}'",
                        schema.name
                    )));
                }
                let c = self.alias();
                self.params.push(SqlValue::Text(collection.clone()));
                let inner = self.emit(filter, child, &c)?;
                format!(
                    "EXISTS (SELECT 1 FROM documents {c} WHERE {c}.collection = ? \
                     AND {c}.parent_key = {alias}.key AND ({inner}))"
                )
            }
        };
        Ok(sql)
    }

    fn join(
        &mut self,
        parts: &[Filter],
        schema: &CollectionSchema,
        alias: &str,
        separator: &str,
        empty: &str,
    ) -> Result<String> {
        if parts.is_empty() {
            return Ok(empty.to_string());
        }
        let mut compiled = Vec::with_capacity(parts.len());
        for part in parts {
            compiled.push(format!("({})", self.emit(part, schema, alias)?));
        }
        Ok(compiled.join(separator))
    }

    fn path(&mut self, alias: &str, field: &str) -> String {
        self.params.push(SqlValue::Text(format!("$.\"{field}\"")));
        format!("json_extract({alias}.body, ?)")
    }

    fn alias(&mut self) -> String {
        let alias = format!("d{}", self.next_alias);
        self.next_alias += 1;
        alias
    }

    fn lookup(&self, collection: &str) -> Result<&'a CollectionSchema> {
        let schemas: &'a HashMap<String, CollectionSchema> = self.schemas;
        schemas
            .get(collection)
            .ok_or_else(|| Error::Query(format!("unknown collection '{collection}'")))
    }
}

fn field_kind(schema: &CollectionSchema, field: &str) -> Result<FieldKind> {
    schema
        .fields
        .get(field)
        .map(|spec| spec.kind)
        .ok_or_else(|| {
            Error::Query(format!(
                "unknown field '{field}' in collection '{}'",
                schema.name
            ))
        })
}

fn check_value(schema: &CollectionSchema, field: &str, value: &TermValue) -> Result<()> {
    let kind = field_kind(schema, field)?;
    if value.fits(kind) {
        Ok(())
    } else {
        Err(Error::Query(format!(
            "value {value:?} does not match {kind:?} field '{field}'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schemas() -> HashMap<String, CollectionSchema> {
        let parent = CollectionSchema::new("project").required("key", FieldKind::Keyword);
        let child = CollectionSchema::new("grant")
            .required("project", FieldKind::Keyword)
            .field("group", FieldKind::Keyword)
            .field("level", FieldKind::Integer)
            .child_of("project", Some("project"));
        [parent, child]
            .into_iter()
            .map(|s| (s.name.clone(), s))
            .collect()
    }

    #[test]
    fn test_term_binds_path_then_value() {
        let schemas = schemas();
        let compiled =
            compile(&Filter::term("group", "user"), &schemas["grant"], "d0", &schemas).unwrap();
        assert_eq!(compiled.sql, "json_extract(d0.body, ?) = ?");
        assert_eq!(
            compiled.params,
            vec![
                SqlValue::Text("$.\"group\"".to_string()),
                SqlValue::Text("user".to_string())
            ]
        );
    }

    #[test]
    fn test_unknown_field_is_query_error() {
        let schemas = schemas();
        let err = compile(&Filter::term("nope", "x"), &schemas["grant"], "d0", &schemas);
        assert!(matches!(err, Err(Error::Query(_))));
    }

    #[test]
    fn test_type_mismatch_is_query_error() {
        let schemas = schemas();
        let err = compile(&Filter::term("level", "high"), &schemas["grant"], "d0", &schemas);
        assert!(matches!(err, Err(Error::Query(_))));
        let err = compile(&Filter::range("group", Some(1), None), &schemas["grant"], "d0", &schemas);
        assert!(matches!(err, Err(Error::Query(_))));
    }

    #[test]
    fn test_relations_must_be_declared() {
        let schemas = schemas();
        let ok = compile(
            &Filter::has_child("grant", Filter::term("group", "user")),
            &schemas["project"],
            "d0",
            &schemas,
        );
        assert!(ok.is_ok());

        let wrong_way = compile(
            &Filter::has_child("project", Filter::MatchAll),
            &schemas["grant"],
            "d0",
            &schemas,
        );
        assert!(matches!(wrong_way, Err(Error::Query(_))));

        let no_parent = compile(
            &Filter::has_parent("grant", Filter::MatchAll),
            &schemas["project"],
            "d0",
            &schemas,
        );
        assert!(matches!(no_parent, Err(Error::Query(_))));
    }

    #[test]
    fn test_empty_disjunction_matches_nothing() {
        let schemas = schemas();
        let compiled = compile(&Filter::Or(vec![]), &schemas["grant"], "d0", &schemas).unwrap();
        assert_eq!(compiled.sql, "0 = 1");
        let compiled = compile(
            &Filter::terms("group", Vec::<&str>::new()),
            &schemas["grant"],
            "d0",
            &schemas,
        )
        .unwrap();
        assert_eq!(compiled.sql, "0 = 1");
    }

    #[test]
    fn test_and_flattens() {
        let f = Filter::term("group", "a")
            .and(Filter::MatchAll)
            .and(Filter::term("group", "b"))
            .and(Filter::And(vec![Filter::exists("level")]));
        match f {
            Filter::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
    }
}
