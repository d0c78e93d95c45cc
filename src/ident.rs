//! Qualified object identifiers.
//!
//! Remote objects are addressed by multi-part, case-sensitive names. Four
//! shapes exist: account-level (one part), database-level (two parts),
//! schema-level (three parts), and schema objects that are additionally
//! discriminated by an ordered argument-type list (functions, procedures).
//!
//! Two textual surfaces are supported:
//!
//! - the **qualified form** users write (`MYDB.PUBLIC.MYFUNC(VARCHAR)`,
//!   quoting optional, `""` escapes a quote inside a quoted part);
//! - the **state encoding** persisted by the host
//!   (`MYDB|PUBLIC|MYFUNC|(VARCHAR)`), pipe-delimited because parts may
//!   legally contain `.`.
//!
//! Parsing preserves part casing verbatim; the Service's case folding of
//! unquoted tokens is applied only by [`ObjectIdentifier::canonical`], which
//! backs semantic equality and the quoting diff-suppressor.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Delimiter between parts in the state encoding.
const STATE_DELIMITER: char = '|';
/// Escape character for literal pipes (and backslashes) inside a part.
const STATE_ESCAPE: char = '\\';

/// A parse failure for a qualified name or state encoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedIdentifier {
    /// The name had zero parts or more than three name parts.
    #[error("malformed identifier {input:?}: expected 1 to 3 name parts, got {count}")]
    PartCount {
        /// The offending input.
        input: String,
        /// Number of parts found.
        count: usize,
    },

    /// A double-quoted part was never closed.
    #[error("malformed identifier {0:?}: unterminated quoted part")]
    UnterminatedQuote(String),

    /// A part between delimiters was empty.
    #[error("malformed identifier {0:?}: empty identifier part")]
    EmptyPart(String),

    /// The trailing argument list was not a balanced `( ... )` group.
    #[error("malformed identifier {0:?}: unbalanced argument list")]
    UnbalancedArguments(String),

    /// An argument list appeared on a shape that cannot carry one.
    #[error("malformed identifier {0:?}: argument list requires a three-part name")]
    MisplacedArguments(String),
}

/// A qualified, case-sensitive name for a remote object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectIdentifier {
    /// An account-level object (warehouse, role, connection).
    Account {
        /// Object name.
        name: String,
    },
    /// A database-level object (schema, database role).
    Database {
        /// Containing database.
        database: String,
        /// Object name.
        name: String,
    },
    /// A schema-level object (table, alert, dynamic table).
    Schema {
        /// Containing database.
        database: String,
        /// Containing schema.
        schema: String,
        /// Object name.
        name: String,
    },
    /// A schema-level object discriminated by its argument signature.
    SchemaObjectWithArguments {
        /// Containing database.
        database: String,
        /// Containing schema.
        schema: String,
        /// Object name.
        name: String,
        /// Ordered argument data-type tokens, upper-cased.
        arguments: Vec<String>,
    },
}

impl ObjectIdentifier {
    /// Build an account-level identifier.
    pub fn account(name: impl Into<String>) -> Self {
        Self::Account { name: name.into() }
    }

    /// Build a database-level identifier.
    pub fn database(database: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Database {
            database: database.into(),
            name: name.into(),
        }
    }

    /// Build a schema-level identifier.
    pub fn schema(
        database: impl Into<String>,
        schema: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::Schema {
            database: database.into(),
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Build a schema-object identifier with an argument signature.
    pub fn schema_object_with_arguments(
        database: impl Into<String>,
        schema: impl Into<String>,
        name: impl Into<String>,
        arguments: Vec<String>,
    ) -> Self {
        Self::SchemaObjectWithArguments {
            database: database.into(),
            schema: schema.into(),
            name: name.into(),
            arguments: arguments.into_iter().map(|a| a.to_uppercase()).collect(),
        }
    }

    /// Parse a user-facing qualified name, e.g. `"A"."B"."C"(VARCHAR,NUMBER)`.
    pub fn parse(input: &str) -> Result<Self, MalformedIdentifier> {
        let (name_text, arguments) = split_arguments(input)?;
        let parts = split_parts(input, name_text, '.')?;
        Self::from_parts(input, parts, arguments)
    }

    /// Parse the pipe-delimited state encoding, e.g. `A|B|C|(VARCHAR,NUMBER)`.
    pub fn from_state_encoding(input: &str) -> Result<Self, MalformedIdentifier> {
        let mut parts = split_encoded_parts(input)?;
        let arguments = match parts.last() {
            Some(last) if last.starts_with('(') => {
                let last = parts.pop().unwrap_or_default();
                Some(parse_argument_list(input, &last)?)
            }
            _ => None,
        };
        Self::from_parts(input, parts, arguments)
    }

    fn from_parts(
        input: &str,
        parts: Vec<String>,
        arguments: Option<Vec<String>>,
    ) -> Result<Self, MalformedIdentifier> {
        if parts.iter().any(String::is_empty) {
            return Err(MalformedIdentifier::EmptyPart(input.to_string()));
        }
        let mut parts = parts.into_iter();
        match (parts.len(), arguments) {
            (1, None) => Ok(Self::Account {
                name: parts.next().unwrap_or_default(),
            }),
            (2, None) => Ok(Self::Database {
                database: parts.next().unwrap_or_default(),
                name: parts.next().unwrap_or_default(),
            }),
            (3, None) => Ok(Self::Schema {
                database: parts.next().unwrap_or_default(),
                schema: parts.next().unwrap_or_default(),
                name: parts.next().unwrap_or_default(),
            }),
            (3, Some(arguments)) => Ok(Self::SchemaObjectWithArguments {
                database: parts.next().unwrap_or_default(),
                schema: parts.next().unwrap_or_default(),
                name: parts.next().unwrap_or_default(),
                arguments,
            }),
            (_, Some(_)) => Err(MalformedIdentifier::MisplacedArguments(input.to_string())),
            (count, None) => Err(MalformedIdentifier::PartCount {
                input: input.to_string(),
                count,
            }),
        }
    }

    /// The name parts in account → database → schema → object order.
    pub fn parts(&self) -> Vec<&str> {
        match self {
            Self::Account { name } => vec![name],
            Self::Database { database, name } => vec![database, name],
            Self::Schema {
                database,
                schema,
                name,
            }
            | Self::SchemaObjectWithArguments {
                database,
                schema,
                name,
                ..
            } => vec![database, schema, name],
        }
    }

    /// Extract a single part by index, if present.
    pub fn part(&self, index: usize) -> Option<&str> {
        self.parts().get(index).copied()
    }

    /// The unqualified object name (last part).
    pub fn name(&self) -> &str {
        match self {
            Self::Account { name }
            | Self::Database { name, .. }
            | Self::Schema { name, .. }
            | Self::SchemaObjectWithArguments { name, .. } => name,
        }
    }

    /// The argument signature, if this shape carries one.
    pub fn arguments(&self) -> Option<&[String]> {
        match self {
            Self::SchemaObjectWithArguments { arguments, .. } => Some(arguments),
            _ => None,
        }
    }

    /// Rebuild this identifier with a different object name, keeping the
    /// containing parts and argument signature. Used by rename handling.
    pub fn with_name(&self, new_name: impl Into<String>) -> Self {
        let new_name = new_name.into();
        match self {
            Self::Account { .. } => Self::Account { name: new_name },
            Self::Database { database, .. } => Self::Database {
                database: database.clone(),
                name: new_name,
            },
            Self::Schema {
                database, schema, ..
            } => Self::Schema {
                database: database.clone(),
                schema: schema.clone(),
                name: new_name,
            },
            Self::SchemaObjectWithArguments {
                database,
                schema,
                arguments,
                ..
            } => Self::SchemaObjectWithArguments {
                database: database.clone(),
                schema: schema.clone(),
                name: new_name,
                arguments: arguments.clone(),
            },
        }
    }

    /// The fully qualified form with every part double-quoted, used in
    /// diagnostics and DDL requests: `"A"."B"."C"(VARCHAR,NUMBER)`.
    pub fn fully_qualified(&self) -> String {
        let mut out = self
            .parts()
            .iter()
            .map(|p| quote_part(p))
            .collect::<Vec<_>>()
            .join(".");
        if let Some(args) = self.arguments() {
            out.push('(');
            out.push_str(&args.join(","));
            out.push(')');
        }
        out
    }

    /// The pipe-delimited encoding persisted in state. Literal pipes and
    /// backslashes inside a part are escaped with a backslash.
    pub fn to_state_encoding(&self) -> String {
        let mut out = self
            .parts()
            .iter()
            .map(|p| escape_encoded_part(p))
            .collect::<Vec<_>>()
            .join("|");
        if let Some(args) = self.arguments() {
            out.push(STATE_DELIMITER);
            out.push('(');
            out.push_str(&args.join(","));
            out.push(')');
        }
        out
    }

    /// The canonical fully qualified form: unquoted-legal parts are folded
    /// to upper case the way the Service stores them; everything else is
    /// preserved verbatim. Two identifiers denote the same object iff their
    /// canonical forms are byte-equal.
    pub fn canonical(&self) -> String {
        let mut out = self
            .parts()
            .iter()
            .map(|p| {
                if is_bare_token(p) {
                    quote_part(&p.to_uppercase())
                } else {
                    quote_part(p)
                }
            })
            .collect::<Vec<_>>()
            .join(".");
        if let Some(args) = self.arguments() {
            out.push('(');
            out.push_str(&args.join(","));
            out.push(')');
        }
        out
    }

    /// Semantic equality under the Service's case-folding rules.
    pub fn same_object(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl fmt::Display for ObjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fully_qualified())
    }
}

/// Whether `part` matches the bare-token grammar `[A-Za-z_][A-Za-z0-9_$]*`.
fn is_bare_token(part: &str) -> bool {
    let mut chars = part.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn quote_part(part: &str) -> String {
    format!("\"{}\"", part.replace('"', "\"\""))
}

fn escape_encoded_part(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for c in part.chars() {
        if c == STATE_DELIMITER || c == STATE_ESCAPE {
            out.push(STATE_ESCAPE);
        }
        out.push(c);
    }
    out
}

/// Split a trailing `(args)` group off a qualified name. Returns the name
/// text and the parsed argument list, if any.
fn split_arguments(input: &str) -> Result<(&str, Option<Vec<String>>), MalformedIdentifier> {
    let trimmed = input.trim_end();
    if !trimmed.ends_with(')') {
        if argument_open(trimmed).is_some() {
            return Err(MalformedIdentifier::UnbalancedArguments(input.to_string()));
        }
        return Ok((trimmed, None));
    }
    let open = argument_open(trimmed)
        .ok_or_else(|| MalformedIdentifier::UnbalancedArguments(input.to_string()))?;
    let args = parse_argument_list(input, &trimmed[open..])?;
    Ok((&trimmed[..open], Some(args)))
}

/// Position of the `(` opening an unquoted trailing argument group.
fn argument_open(input: &str) -> Option<usize> {
    let mut in_quotes = false;
    let mut open = None;
    for (i, c) in input.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes && open.is_none() => open = Some(i),
            _ => {}
        }
    }
    open
}

/// Parse `(VARCHAR, NUMBER)` into upper-cased type tokens. `()` is empty.
fn parse_argument_list(input: &str, group: &str) -> Result<Vec<String>, MalformedIdentifier> {
    let inner = group
        .strip_prefix('(')
        .and_then(|g| g.strip_suffix(')'))
        .ok_or_else(|| MalformedIdentifier::UnbalancedArguments(input.to_string()))?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut args = Vec::new();
    for token in inner.split(',') {
        let token = token.trim();
        if token.is_empty() {
            return Err(MalformedIdentifier::UnbalancedArguments(input.to_string()));
        }
        args.push(token.to_uppercase());
    }
    Ok(args)
}

/// Split the name portion on `delimiter`, honouring double-quoted parts with
/// `""` as the internal escape. Part casing is preserved verbatim.
fn split_parts(
    input: &str,
    text: &str,
    delimiter: char,
) -> Result<Vec<String>, MalformedIdentifier> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    let mut in_quotes = false;
    let mut was_quoted = false;

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => {
                in_quotes = true;
                was_quoted = true;
            }
            c if c == delimiter && !in_quotes => {
                if current.is_empty() && !was_quoted {
                    return Err(MalformedIdentifier::EmptyPart(input.to_string()));
                }
                parts.push(std::mem::take(&mut current));
                was_quoted = false;
            }
            c => current.push(c),
        }
    }
    if in_quotes {
        return Err(MalformedIdentifier::UnterminatedQuote(input.to_string()));
    }
    if current.is_empty() && !was_quoted {
        return Err(MalformedIdentifier::EmptyPart(input.to_string()));
    }
    parts.push(current);
    Ok(parts)
}

/// Split the state encoding on unescaped pipes.
fn split_encoded_parts(input: &str) -> Result<Vec<String>, MalformedIdentifier> {
    if input.is_empty() {
        return Err(MalformedIdentifier::EmptyPart(input.to_string()));
    }
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        match c {
            STATE_ESCAPE => match chars.next() {
                Some(escaped) => current.push(escaped),
                None => current.push(STATE_ESCAPE),
            },
            STATE_DELIMITER => parts.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    parts.push(current);
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_account_level() {
        let id = ObjectIdentifier::parse("COMPUTE_WH").unwrap();
        assert_eq!(id, ObjectIdentifier::account("COMPUTE_WH"));
        assert_eq!(id.fully_qualified(), "\"COMPUTE_WH\"");
    }

    #[test]
    fn parse_preserves_casing_verbatim() {
        let id = ObjectIdentifier::parse("mydb.public.my_alert").unwrap();
        assert_eq!(id.parts(), vec!["mydb", "public", "my_alert"]);
    }

    #[test]
    fn parse_quoted_parts_with_embedded_dot_and_quote() {
        let id = ObjectIdentifier::parse("\"my.db\".\"sch\"\"ema\".T").unwrap();
        assert_eq!(id.parts(), vec!["my.db", "sch\"ema", "T"]);
        // Round-trips through the quoted form.
        assert_eq!(ObjectIdentifier::parse(&id.fully_qualified()).unwrap(), id);
    }

    #[test]
    fn parse_arguments_are_ordered_and_uppercased() {
        let id = ObjectIdentifier::parse("\"A\".\"B\".\"C\"(varchar, number)").unwrap();
        assert_eq!(
            id.arguments().unwrap(),
            &["VARCHAR".to_string(), "NUMBER".to_string()]
        );
        let swapped = ObjectIdentifier::parse("\"A\".\"B\".\"C\"(NUMBER,VARCHAR)").unwrap();
        assert!(!id.same_object(&swapped));
    }

    #[test]
    fn parse_empty_argument_list() {
        let id = ObjectIdentifier::parse("DB.SCH.FN()").unwrap();
        assert_eq!(id.arguments().unwrap().len(), 0);
        assert_eq!(id.to_state_encoding(), "DB|SCH|FN|()");
    }

    #[test]
    fn parse_rejects_wrong_part_count() {
        let err = ObjectIdentifier::parse("A.B.C.D").unwrap_err();
        assert!(matches!(err, MalformedIdentifier::PartCount { count: 4, .. }));
    }

    #[test]
    fn parse_rejects_empty_part() {
        assert!(matches!(
            ObjectIdentifier::parse("A..C").unwrap_err(),
            MalformedIdentifier::EmptyPart(_)
        ));
        assert!(matches!(
            ObjectIdentifier::parse("").unwrap_err(),
            MalformedIdentifier::EmptyPart(_)
        ));
    }

    #[test]
    fn parse_rejects_unterminated_quote() {
        assert!(matches!(
            ObjectIdentifier::parse("\"A.B").unwrap_err(),
            MalformedIdentifier::UnterminatedQuote(_)
        ));
    }

    #[test]
    fn parse_rejects_arguments_on_short_names() {
        assert!(matches!(
            ObjectIdentifier::parse("FN(VARCHAR)").unwrap_err(),
            MalformedIdentifier::MisplacedArguments(_)
        ));
    }

    #[test]
    fn state_encoding_round_trip() {
        let cases = vec![
            ObjectIdentifier::account("WH1"),
            ObjectIdentifier::database("DB", "SCH"),
            ObjectIdentifier::schema("DB", "SCH", "ALERT_1"),
            ObjectIdentifier::schema_object_with_arguments(
                "DB",
                "SCH",
                "FN",
                vec!["VARCHAR".into(), "NUMBER".into()],
            ),
        ];
        for id in cases {
            let encoded = id.to_state_encoding();
            assert_eq!(ObjectIdentifier::from_state_encoding(&encoded).unwrap(), id);
        }
    }

    #[test]
    fn state_encoding_escapes_embedded_pipes() {
        let id = ObjectIdentifier::database("my|db", "obj\\name");
        let encoded = id.to_state_encoding();
        assert_eq!(encoded, "my\\|db|obj\\\\name");
        assert_eq!(ObjectIdentifier::from_state_encoding(&encoded).unwrap(), id);
    }

    #[test]
    fn state_encoding_example_shape() {
        let id = ObjectIdentifier::schema_object_with_arguments(
            "MYDB",
            "PUBLIC",
            "MYFUNC",
            vec!["VARCHAR".into(), "NUMBER".into()],
        );
        assert_eq!(id.to_state_encoding(), "MYDB|PUBLIC|MYFUNC|(VARCHAR,NUMBER)");
    }

    #[test]
    fn canonical_folds_unquoted_tokens_only() {
        let lower = ObjectIdentifier::parse("mydb.public.t1").unwrap();
        let upper = ObjectIdentifier::parse("\"MYDB\".\"PUBLIC\".\"T1\"").unwrap();
        assert!(lower.same_object(&upper));
        assert_ne!(lower, upper); // structural equality stays verbatim

        let exotic = ObjectIdentifier::parse("\"my db\".public.t1").unwrap();
        let folded = ObjectIdentifier::parse("\"MY DB\".public.t1").unwrap();
        assert!(!exotic.same_object(&folded));
    }

    #[test]
    fn qualified_round_trip_canonicalizes() {
        let input = "\"A\".\"B\".\"C\"(VARCHAR,NUMBER)";
        let id = ObjectIdentifier::parse(input).unwrap();
        assert_eq!(id.fully_qualified(), input);
        assert_eq!(id.to_state_encoding(), "A|B|C|(VARCHAR,NUMBER)");
    }

    #[test]
    fn with_name_keeps_container_and_signature() {
        let id = ObjectIdentifier::schema_object_with_arguments(
            "DB",
            "SCH",
            "OLD",
            vec!["FLOAT".into()],
        );
        let renamed = id.with_name("NEW");
        assert_eq!(renamed.name(), "NEW");
        assert_eq!(renamed.part(0), Some("DB"));
        assert_eq!(renamed.arguments().unwrap(), &["FLOAT".to_string()]);
    }

    #[test]
    fn part_extraction() {
        let id = ObjectIdentifier::schema("DB", "SCH", "T");
        assert_eq!(id.part(0), Some("DB"));
        assert_eq!(id.part(2), Some("T"));
        assert_eq!(id.part(3), None);
    }
}
