use std::{borrow::Cow, fmt};

use sqlx::{
    any::{Any, AnyArguments},
    query::Query,
};

/// A bound argument. Kept alongside the SQL text so timed-operation
/// records can show what a statement ran with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Null,
    Int(i64),
    Text(String),
    /// Bound like `Text`, rendered as `***` in logs.
    Secret(String),
}

impl Arg {
    pub fn secret(value: impl Into<String>) -> Self {
        Arg::Secret(value.into())
    }
}

impl From<&str> for Arg {
    fn from(v: &str) -> Self {
        Arg::Text(v.to_owned())
    }
}

impl From<String> for Arg {
    fn from(v: String) -> Self {
        Arg::Text(v)
    }
}

impl From<i64> for Arg {
    fn from(v: i64) -> Self {
        Arg::Int(v)
    }
}

impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(v: Option<T>) -> Self {
        v.map_or(Arg::Null, Into::into)
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Null => f.write_str("NULL"),
            Arg::Int(v) => write!(f, "{v}"),
            Arg::Text(v) => write!(f, "{v:?}"),
            Arg::Secret(_) => f.write_str("***"),
        }
    }
}

/// SQL text plus its ordered arguments. Placeholders are `$1..$N`.
#[derive(Debug, Clone)]
pub struct Sql {
    text: Cow<'static, str>,
    args: Vec<Arg>,
    prepared: bool,
}

impl Sql {
    pub fn new(text: impl Into<Cow<'static, str>>) -> Self {
        Self {
            text: text.into(),
            args: Vec::new(),
            prepared: false,
        }
    }

    pub(crate) fn prepared(text: impl Into<Cow<'static, str>>) -> Self {
        Self {
            prepared: true,
            ..Self::new(text)
        }
    }

    pub fn bind(mut self, arg: impl Into<Arg>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Build the driver query with every argument bound in order.
    pub(crate) fn query(&self) -> Query<'_, Any, AnyArguments<'_>> {
        let mut q = sqlx::query(&self.text);
        for arg in &self.args {
            q = match arg {
                Arg::Null => q.bind(None::<String>),
                Arg::Int(v) => q.bind(*v),
                Arg::Text(v) | Arg::Secret(v) => q.bind(v.as_str()),
            };
        }
        q
    }

    /// Single-line form of the text for log records.
    pub(crate) fn compact_text(&self) -> String {
        self.text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    pub(crate) fn display_args(&self) -> DisplayArgs<'_> {
        DisplayArgs(&self.args)
    }
}

pub(crate) struct DisplayArgs<'a>(&'a [Arg]);

impl fmt::Display for DisplayArgs<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, arg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_render_with_secrets_masked() {
        let sql = Sql::new("INSERT INTO t VALUES ($1, $2, $3, $4)")
            .bind("alice@x.com")
            .bind(Arg::secret("$argon2id$v=19$..."))
            .bind(3_i64)
            .bind(None::<String>);
        assert_eq!(
            sql.display_args().to_string(),
            r#"["alice@x.com", ***, 3, NULL]"#
        );
    }

    #[test]
    fn compact_text_collapses_whitespace() {
        let sql = Sql::new(
            r#"
            SELECT password
              FROM "user"
             WHERE email = $1
            "#,
        );
        assert_eq!(sql.compact_text(), r#"SELECT password FROM "user" WHERE email = $1"#);
        assert!(!sql.is_prepared());
        assert!(Sql::prepared("SELECT 1").is_prepared());
    }
}
