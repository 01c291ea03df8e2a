//! Parses repository method names such as `findByNameAndAgeGreaterThan` into
//! a [`QueryIntent`] the execution engine can bind parameters against and run.
//!
//! The parser never touches a database; it is a pure function over a method
//! name and the entity's known field names, so every method's intent can be
//! computed once at startup and cached (see `trellis-macros`'s `#[repository]`
//! expansion).

use std::fmt;

/// The kind of query a method name encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Find,
    Count,
    Exists,
    Delete,
}

/// How consecutive conditions in a predicate combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

/// A single comparison keyword recognized in a predicate segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOp {
    Equals,
    GreaterThan,
    GreaterThanEqual,
    LessThan,
    LessThanEqual,
    Between,
    Like,
    Containing,
    StartingWith,
    EndingWith,
    IsNull,
    IsNotNull,
    In,
    NotIn,
    Not,
    True,
    False,
}

impl ConditionOp {
    /// How many bound parameters this operator consumes from the call's
    /// argument list, in order.
    pub fn param_count(&self) -> usize {
        match self {
            ConditionOp::IsNull | ConditionOp::IsNotNull | ConditionOp::True | ConditionOp::False => 0,
            ConditionOp::Between => 2,
            _ => 1,
        }
    }

    /// `LIKE` pattern template for the string-matching operators, with `{}`
    /// standing in for the bound value. `None` for operators that don't
    /// wrap the value in wildcards.
    pub fn wildcard_template(&self) -> Option<&'static str> {
        match self {
            ConditionOp::Containing => Some("%{}%"),
            ConditionOp::StartingWith => Some("{}%"),
            ConditionOp::EndingWith => Some("%{}"),
            _ => None,
        }
    }
}

/// One predicate term: `<field> <op>`, joined to its neighbor by `connector`
/// (the connector preceding this term; `None` for the first term).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub connector: Option<Connector>,
    pub field: String,
    pub op: ConditionOp,
}

/// Ascending/descending sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub field: String,
    pub direction: Direction,
}

/// The parsed shape of a query-method name: what kind of query it is, the
/// `WHERE` predicate in left-to-right bind order, and any `ORDER BY` terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryIntent {
    pub operation: Operation,
    pub conditions: Vec<Condition>,
    pub order_by: Vec<OrderTerm>,
}

impl QueryIntent {
    /// Total number of bind parameters this intent expects, in order.
    pub fn param_count(&self) -> usize {
        self.conditions.iter().map(|c| c.op.param_count()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryParseError {
    /// The method name doesn't start with a recognized verb + `By`.
    UnrecognizedVerb { method: String },
    /// `findBy`/`countBy`/etc. with nothing after `By`.
    EmptyPredicate { method: String },
    /// A predicate segment didn't resolve to a known operator + known field.
    UnknownField { method: String, segment: String },
    /// `OrderBy` present but with no recognized field/direction pairs.
    EmptyOrdering { method: String },
}

impl fmt::Display for QueryParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryParseError::UnrecognizedVerb { method } => {
                write!(f, "'{method}' does not start with find/count/exists/delete + By")
            }
            QueryParseError::EmptyPredicate { method } => {
                write!(f, "'{method}' has no predicate after By")
            }
            QueryParseError::UnknownField { method, segment } => {
                write!(f, "'{method}': could not resolve field/operator from '{segment}'")
            }
            QueryParseError::EmptyOrdering { method } => {
                write!(f, "'{method}' has an OrderBy clause with no terms")
            }
        }
    }
}

impl std::error::Error for QueryParseError {}

const VERBS: &[(&str, Operation)] = &[
    ("findBy", Operation::Find),
    ("countBy", Operation::Count),
    ("existsBy", Operation::Exists),
    ("deleteBy", Operation::Delete),
];

// Longest-match-first so `IsNotNull` is tried before `IsNull`, `NotIn`
// before `In`, `GreaterThanEqual` before `GreaterThan`, etc.
const KEYWORDS: &[(&str, ConditionOp)] = &[
    ("IsNotNull", ConditionOp::IsNotNull),
    ("GreaterThanEqual", ConditionOp::GreaterThanEqual),
    ("LessThanEqual", ConditionOp::LessThanEqual),
    ("StartingWith", ConditionOp::StartingWith),
    ("EndingWith", ConditionOp::EndingWith),
    ("Containing", ConditionOp::Containing),
    ("GreaterThan", ConditionOp::GreaterThan),
    ("LessThan", ConditionOp::LessThan),
    ("IsNull", ConditionOp::IsNull),
    ("Between", ConditionOp::Between),
    ("NotIn", ConditionOp::NotIn),
    ("Like", ConditionOp::Like),
    ("True", ConditionOp::True),
    ("False", ConditionOp::False),
    ("Not", ConditionOp::Not),
    ("In", ConditionOp::In),
];

/// Parse a repository method name into a [`QueryIntent`].
///
/// `entity_fields` should list the entity's known field names in
/// `snake_case`; pass an empty slice to skip field validation (useful for
/// tests exercising the grammar in isolation).
pub fn parse(method_name: &str, entity_fields: &[&str]) -> Result<QueryIntent, QueryParseError> {
    let (operation, rest) = parse_verb(method_name)?;
    if rest.is_empty() {
        return Err(QueryParseError::EmptyPredicate {
            method: method_name.to_string(),
        });
    }

    let (predicate_part, order_part) = split_order_by(rest);
    if predicate_part.is_empty() {
        return Err(QueryParseError::EmptyPredicate {
            method: method_name.to_string(),
        });
    }

    let conditions = parse_predicate(predicate_part, entity_fields, method_name)?;

    let order_by = match order_part {
        Some(o) if !o.is_empty() => parse_ordering(o, entity_fields, method_name)?,
        Some(_) => {
            return Err(QueryParseError::EmptyOrdering {
                method: method_name.to_string(),
            })
        }
        None => Vec::new(),
    };

    Ok(QueryIntent {
        operation,
        conditions,
        order_by,
    })
}

fn parse_verb(method_name: &str) -> Result<(Operation, &str), QueryParseError> {
    for (verb, op) in VERBS {
        if let Some(rest) = method_name.strip_prefix(verb) {
            return Ok((*op, rest));
        }
    }
    Err(QueryParseError::UnrecognizedVerb {
        method: method_name.to_string(),
    })
}

/// Find a real word-boundary occurrence of `OrderBy`: the `O` must follow a
/// lowercase letter (end of the previous word) so that a field legitimately
/// named e.g. `Order` doesn't get mistaken for the clause.
fn split_order_by(s: &str) -> (&str, Option<&str>) {
    let bytes = s.as_bytes();
    let needle = b"OrderBy";
    let mut i = 0;
    while i + needle.len() <= bytes.len() {
        if &bytes[i..i + needle.len()] == needle {
            let boundary_ok = i == 0 || bytes[i - 1].is_ascii_lowercase();
            if boundary_ok {
                return (&s[..i], Some(&s[i + needle.len()..]));
            }
        }
        i += 1;
    }
    (s, None)
}

fn parse_predicate(
    s: &str,
    entity_fields: &[&str],
    method_name: &str,
) -> Result<Vec<Condition>, QueryParseError> {
    let segments = split_connectors(s);
    let mut conditions = Vec::with_capacity(segments.len());
    for (connector, segment) in segments {
        let (field, op) = parse_condition_segment(segment, entity_fields, method_name)?;
        conditions.push(Condition {
            connector,
            field,
            op,
        });
    }
    Ok(conditions)
}

/// Splits on word-boundary occurrences of `And`/`Or`: the keyword must be
/// preceded by a lowercase letter and followed by an uppercase letter, which
/// rejects incidental substrings inside field names (`Organization`,
/// `Origin`, `Android`) while still matching real connectors.
fn split_connectors(s: &str) -> Vec<(Option<Connector>, &str)> {
    let bytes = s.as_bytes();
    let mut splits: Vec<(usize, usize, Connector)> = Vec::new();
    for (needle, connector) in [("And", Connector::And), ("Or", Connector::Or)] {
        let nb = needle.as_bytes();
        let mut i = 0;
        while i + nb.len() < bytes.len() {
            if &bytes[i..i + nb.len()] == nb {
                let before_ok = i > 0 && bytes[i - 1].is_ascii_lowercase();
                let after_ok = bytes[i + nb.len()].is_ascii_uppercase();
                if before_ok && after_ok {
                    splits.push((i, nb.len(), connector));
                }
            }
            i += 1;
        }
    }
    splits.sort_by_key(|(i, _, _)| *i);

    let mut result = Vec::new();
    let mut cursor = 0;
    let mut pending_connector = None;
    for (start, len, connector) in splits {
        result.push((pending_connector, &s[cursor..start]));
        pending_connector = Some(connector);
        cursor = start + len;
    }
    result.push((pending_connector, &s[cursor..]));
    result
}

fn parse_condition_segment(
    segment: &str,
    entity_fields: &[&str],
    method_name: &str,
) -> Result<(String, ConditionOp), QueryParseError> {
    for (kw, op) in KEYWORDS {
        if let Some(prefix) = segment.strip_suffix(kw) {
            if prefix.is_empty() {
                continue;
            }
            let boundary_ok = prefix
                .as_bytes()
                .last()
                .map(|b| b.is_ascii_lowercase())
                .unwrap_or(false);
            if !boundary_ok {
                continue;
            }
            let field = pascal_to_snake(prefix);
            if field_is_known(&field, entity_fields) {
                return Ok((field, *op));
            }
        }
    }

    let field = pascal_to_snake(segment);
    if field_is_known(&field, entity_fields) {
        return Ok((field, ConditionOp::Equals));
    }

    Err(QueryParseError::UnknownField {
        method: method_name.to_string(),
        segment: segment.to_string(),
    })
}

fn parse_ordering(
    s: &str,
    entity_fields: &[&str],
    method_name: &str,
) -> Result<Vec<OrderTerm>, QueryParseError> {
    let mut terms = Vec::new();
    let mut rest = s;
    loop {
        if rest.is_empty() {
            break;
        }
        let (direction, cut) = if let Some(prefix) = rest.strip_suffix("Asc") {
            (Direction::Asc, prefix.len())
        } else if let Some(prefix) = rest.strip_suffix("Desc") {
            (Direction::Desc, prefix.len())
        } else {
            return Err(QueryParseError::EmptyOrdering {
                method: method_name.to_string(),
            });
        };
        let candidate = &rest[..cut];
        // The remaining, not-yet-consumed prefix may contain more than one
        // field; field names are matched back-to-front using the longest
        // known suffix that parses as a valid field.
        let (field_part, remainder) = split_last_field(candidate, entity_fields);
        let field = pascal_to_snake(field_part);
        if !field_is_known(&field, entity_fields) {
            return Err(QueryParseError::UnknownField {
                method: method_name.to_string(),
                segment: field_part.to_string(),
            });
        }
        terms.push(OrderTerm { field, direction });
        rest = remainder;
    }
    terms.reverse();
    Ok(terms)
}

/// Greedily finds the shortest trailing field name in `s` that is known, so
/// that `NameAsc` after stripping `Asc` yields field `Name` rather than
/// over-consuming into a preceding field in a multi-field ordering clause.
fn split_last_field<'a>(s: &'a str, entity_fields: &[&str]) -> (&'a str, &'a str) {
    if entity_fields.is_empty() {
        return (s, "");
    }
    // Word boundaries are at uppercase letters; try growing the trailing
    // field from the last word boundary backward until it matches.
    let boundaries: Vec<usize> = s
        .char_indices()
        .filter(|(i, c)| *i == 0 || c.is_uppercase())
        .map(|(i, _)| i)
        .collect();
    for &start in boundaries.iter().rev() {
        let candidate = &s[start..];
        if field_is_known(&pascal_to_snake(candidate), entity_fields) {
            return (candidate, &s[..start]);
        }
    }
    (s, "")
}

fn field_is_known(field: &str, entity_fields: &[&str]) -> bool {
    entity_fields.is_empty() || entity_fields.iter().any(|f| f.eq_ignore_ascii_case(field))
}

fn pascal_to_snake(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() && i > 0 {
            out.push('_');
        }
        out.extend(ch.to_lowercase());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: &[&str] = &["name", "age", "email", "active", "first_name", "origin"];

    #[test]
    fn simple_equals() {
        let intent = parse("findByName", FIELDS).unwrap();
        assert_eq!(intent.operation, Operation::Find);
        assert_eq!(intent.conditions.len(), 1);
        assert_eq!(intent.conditions[0].field, "name");
        assert_eq!(intent.conditions[0].op, ConditionOp::Equals);
        assert_eq!(intent.conditions[0].connector, None);
    }

    #[test]
    fn comparison_keyword() {
        let intent = parse("findByAgeGreaterThan", FIELDS).unwrap();
        assert_eq!(intent.conditions[0].field, "age");
        assert_eq!(intent.conditions[0].op, ConditionOp::GreaterThan);
        assert_eq!(intent.param_count(), 1);
    }

    #[test]
    fn and_conjunction_with_param_counts() {
        let intent = parse("findByNameAndAgeGreaterThan", FIELDS).unwrap();
        assert_eq!(intent.conditions.len(), 2);
        assert_eq!(intent.conditions[0].connector, None);
        assert_eq!(intent.conditions[1].connector, Some(Connector::And));
        assert_eq!(intent.conditions[1].field, "age");
        assert_eq!(intent.param_count(), 2);
    }

    #[test]
    fn or_disjunction() {
        let intent = parse("findByNameOrEmail", FIELDS).unwrap();
        assert_eq!(intent.conditions[1].connector, Some(Connector::Or));
        assert_eq!(intent.conditions[1].field, "email");
    }

    #[test]
    fn between_consumes_two_params() {
        let intent = parse("findByAgeBetween", FIELDS).unwrap();
        assert_eq!(intent.conditions[0].op, ConditionOp::Between);
        assert_eq!(intent.param_count(), 2);
    }

    #[test]
    fn is_null_consumes_zero_params() {
        let intent = parse("findByEmailIsNull", FIELDS).unwrap();
        assert_eq!(intent.conditions[0].op, ConditionOp::IsNull);
        assert_eq!(intent.param_count(), 0);
    }

    #[test]
    fn wildcard_operators() {
        let intent = parse("findByNameContaining", FIELDS).unwrap();
        assert_eq!(
            intent.conditions[0].op.wildcard_template(),
            Some("%{}%")
        );
    }

    #[test]
    fn order_by_single_field() {
        let intent = parse("findByNameOrderByAgeDesc", FIELDS).unwrap();
        assert_eq!(intent.order_by.len(), 1);
        assert_eq!(intent.order_by[0].field, "age");
        assert_eq!(intent.order_by[0].direction, Direction::Desc);
    }

    #[test]
    fn order_by_multiple_fields() {
        let intent = parse("findByActiveOrderByNameAscAgeDesc", FIELDS).unwrap();
        assert_eq!(intent.order_by.len(), 2);
        assert_eq!(intent.order_by[0].field, "name");
        assert_eq!(intent.order_by[0].direction, Direction::Asc);
        assert_eq!(intent.order_by[1].field, "age");
        assert_eq!(intent.order_by[1].direction, Direction::Desc);
    }

    #[test]
    fn count_and_exists_and_delete_verbs() {
        assert_eq!(parse("countByActive", FIELDS).unwrap().operation, Operation::Count);
        assert_eq!(parse("existsByName", FIELDS).unwrap().operation, Operation::Exists);
        assert_eq!(parse("deleteByName", FIELDS).unwrap().operation, Operation::Delete);
    }

    #[test]
    fn field_containing_or_is_not_misparsed_as_connector() {
        // "Origin" must not be split into "Orig" Or "in".
        let intent = parse("findByOrigin", FIELDS).unwrap();
        assert_eq!(intent.conditions.len(), 1);
        assert_eq!(intent.conditions[0].field, "origin");
    }

    #[test]
    fn unrecognized_verb_is_an_error() {
        let err = parse("listAllUsers", FIELDS).unwrap_err();
        assert!(matches!(err, QueryParseError::UnrecognizedVerb { .. }));
    }

    #[test]
    fn unknown_field_is_an_error() {
        let err = parse("findByNickname", FIELDS).unwrap_err();
        assert!(matches!(err, QueryParseError::UnknownField { .. }));
    }

    #[test]
    fn empty_predicate_is_an_error() {
        let err = parse("findBy", FIELDS).unwrap_err();
        assert!(matches!(err, QueryParseError::EmptyPredicate { .. }));
    }

    #[test]
    fn not_in_before_in() {
        let intent = parse("findByNameNotIn", FIELDS).unwrap();
        assert_eq!(intent.conditions[0].op, ConditionOp::NotIn);
    }

    #[test]
    fn in_keyword() {
        let intent = parse("findByNameIn", FIELDS).unwrap();
        assert_eq!(intent.conditions[0].op, ConditionOp::In);
    }

    #[test]
    fn no_field_validation_when_list_empty() {
        let intent = parse("findByWhatever", &[]).unwrap();
        assert_eq!(intent.conditions[0].field, "whatever");
    }
}
