/// Which SQL dialect a pool speaks. Only affects quoting; `sqlx::QueryBuilder`
/// already picks the right bind-parameter syntax (`?` vs `$N`) per backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
    MySql,
}

impl Dialect {
    pub fn quote_char(&self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::Sqlite | Dialect::Postgres => '"',
        }
    }
}

/// Identifiers the parser/macros hand us should already be restricted to
/// `[A-Za-z_][A-Za-z0-9_]*`, but every identifier is re-validated here before
/// being spliced into a query string, since it never goes through a bind
/// parameter.
pub fn is_valid_identifier(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn quote_identifier(ident: &str, dialect: Dialect) -> String {
    let q = dialect.quote_char();
    format!("{q}{ident}{q}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_identifiers() {
        assert!(is_valid_identifier("name"));
        assert!(is_valid_identifier("first_name"));
        assert!(is_valid_identifier("_id"));
    }

    #[test]
    fn invalid_identifiers() {
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1name"));
        assert!(!is_valid_identifier("name; DROP TABLE users"));
        assert!(!is_valid_identifier("name-x"));
    }

    #[test]
    fn quoting_per_dialect() {
        assert_eq!(quote_identifier("name", Dialect::Postgres), "\"name\"");
        assert_eq!(quote_identifier("name", Dialect::MySql), "`name`");
    }
}
