use crate::{Error, Result, is_plain_identifier};
use std::fmt::{self, Display};

const SQL_TYPES: &[&str] = &[
    "BIT",
    "TINYINT",
    "SMALLINT",
    "MEDIUMINT",
    "INT",
    "INTEGER",
    "BIGINT",
    "CHAR",
    "VARCHAR",
    "NCHAR",
    "NVARCHAR",
    "TINYTEXT",
    "TEXT",
    "MEDIUMTEXT",
    "LONGTEXT",
    "CLOB",
    "BINARY",
    "VARBINARY",
    "DATE",
    "DATETIME",
    "TIME",
    "TIMESTAMP",
    "TIMESTAMPZ",
    "DECIMAL",
    "NUMERIC",
    "REAL",
    "FLOAT",
    "DOUBLE",
    "TINYBLOB",
    "BLOB",
    "MEDIUMBLOB",
    "LONGBLOB",
    "BYTEA",
    "BOOL",
    "BOOLEAN",
    "SERIAL",
    "BIGSERIAL",
    "UUID",
    "JSON",
];

/// Explicit column type from an annotation, like `VARCHAR(25)` or `DECIMAL(10,2)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlType {
    pub name: String,
    pub arguments: Vec<u32>,
}

impl Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.arguments.is_empty() {
            f.write_str("(")?;
            for (i, argument) in self.arguments.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{argument}")?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

/// Parsed field annotation.
///
/// Grammar: whitespace separated tokens, case insensitive keywords.
/// - `pk`, `autoincr`, `not null` (or `notnull`), `null`
/// - `unique`, `unique(group)`, `index`, `index(group)`
/// - `-` (never persisted), `extends`, `cascade`
/// - `created`, `updated`, `version`
/// - `default <literal>`
/// - a SQL type with optional arguments: `varchar(25)`, `decimal(10,2)`
/// - the column name, bare (`user_name`) or quoted (`'user name'`)
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FieldTag {
    pub column: Option<String>,
    pub sql_type: Option<SqlType>,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub not_null: Option<bool>,
    /// Unique group names, an empty name makes the column unique on its own.
    pub uniques: Vec<String>,
    /// Index group names, an empty name indexes the column on its own.
    pub indexes: Vec<String>,
    pub skip: bool,
    pub extends: bool,
    pub cascade: bool,
    pub created: bool,
    pub updated: bool,
    pub version: bool,
    pub default: Option<String>,
}

impl FieldTag {
    pub fn parse(tag: &str) -> Result<FieldTag> {
        let tokens = tokenize(tag)?;
        let mut result = FieldTag::default();
        let mut tokens = tokens.into_iter();
        while let Some(token) = tokens.next() {
            let (head, arguments) = split_arguments(&token)?;
            let keyword = head.to_ascii_lowercase();
            match keyword.as_str() {
                "-" if arguments.is_none() => result.skip = true,
                "pk" if arguments.is_none() => result.primary_key = true,
                "autoincr" if arguments.is_none() => result.auto_increment = true,
                "notnull" if arguments.is_none() => result.not_null = Some(true),
                "null" if arguments.is_none() => result.not_null = Some(false),
                "not" if arguments.is_none() => match tokens.next() {
                    Some(next) if next.eq_ignore_ascii_case("null") => {
                        result.not_null = Some(true)
                    }
                    _ => return Err(Error::msg("`not` must be followed by `null`")),
                },
                "extends" if arguments.is_none() => result.extends = true,
                "cascade" if arguments.is_none() => result.cascade = true,
                "created" if arguments.is_none() => result.created = true,
                "updated" if arguments.is_none() => result.updated = true,
                "version" if arguments.is_none() => result.version = true,
                "default" if arguments.is_none() => {
                    let Some(literal) = tokens.next() else {
                        return Err(Error::msg("`default` must be followed by a value"));
                    };
                    result.default = Some(literal);
                }
                "unique" | "index" => {
                    let group = match arguments {
                        None => String::new(),
                        Some(arguments) => {
                            let group = arguments.trim();
                            if !is_plain_identifier(group) {
                                return Err(Error::msg(format!(
                                    "Invalid {keyword} group name `{group}`"
                                )));
                            }
                            group.to_string()
                        }
                    };
                    if keyword == "unique" {
                        result.uniques.push(group);
                    } else {
                        result.indexes.push(group);
                    }
                }
                _ if SQL_TYPES.contains(&head.to_ascii_uppercase().as_str()) => {
                    if result.sql_type.is_some() {
                        return Err(Error::msg(format!("Duplicate SQL type `{token}`")));
                    }
                    let arguments = match arguments {
                        None => Vec::new(),
                        Some(arguments) => arguments
                            .split(',')
                            .map(|v| {
                                v.trim().parse::<u32>().map_err(|_| {
                                    Error::msg(format!("Invalid type argument in `{token}`"))
                                })
                            })
                            .collect::<Result<_>>()?,
                    };
                    result.sql_type = Some(SqlType {
                        name: head.to_ascii_uppercase(),
                        arguments,
                    });
                }
                _ => {
                    let name = if head.len() >= 2 && head.starts_with('\'') && head.ends_with('\'')
                    {
                        head[1..head.len() - 1].replace("''", "'")
                    } else if arguments.is_none() && is_plain_identifier(head) {
                        head.to_string()
                    } else {
                        return Err(Error::msg(format!("Unrecognized token `{token}`")));
                    };
                    if result.column.is_some() {
                        return Err(Error::msg(format!(
                            "Unrecognized token `{token}` (the column name was already given)"
                        )));
                    }
                    result.column = Some(name);
                }
            }
        }
        Ok(result)
    }
}

/// Whitespace separated tokens, keeping quoted text and parenthesized arguments together.
fn tokenize(tag: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut depth = 0usize;
    for c in tag.chars() {
        match c {
            '\'' => {
                quoted = !quoted;
                current.push(c);
            }
            '(' if !quoted => {
                depth += 1;
                current.push(c);
            }
            ')' if !quoted => {
                if depth == 0 {
                    return Err(Error::msg(format!("Unbalanced `)` in `{tag}`")));
                }
                depth -= 1;
                current.push(c);
            }
            c if c.is_whitespace() && !quoted && depth == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if quoted || depth > 0 {
        return Err(Error::msg(format!("Unterminated token in `{tag}`")));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

/// `index(group)` becomes `("index", Some("group"))`.
fn split_arguments(token: &str) -> Result<(&str, Option<&str>)> {
    if token.starts_with('\'') {
        return Ok((token, None));
    }
    match token.find('(') {
        None => Ok((token, None)),
        Some(open) => {
            if !token.ends_with(')') {
                return Err(Error::msg(format!("Unrecognized token `{token}`")));
            }
            Ok((&token[..open], Some(&token[open + 1..token.len() - 1])))
        }
    }
}
