use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Declared JDBC type of a statement parameter, from the `jdbcType`
/// attribute of a parameter declaration or inline placeholder.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JdbcType {
    Varchar,
    Char,
    Clob,
    Integer,
    Bigint,
    Smallint,
    Numeric,
    Decimal,
    Double,
    Real,
    Boolean,
    Date,
    Time,
    Timestamp,
    Blob,
    Other,
}

impl FromStr for JdbcType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "VARCHAR" => Ok(Self::Varchar),
            "CHAR" => Ok(Self::Char),
            "CLOB" | "LONGVARCHAR" => Ok(Self::Clob),
            "INTEGER" | "INT" => Ok(Self::Integer),
            "BIGINT" => Ok(Self::Bigint),
            "SMALLINT" => Ok(Self::Smallint),
            "NUMERIC" => Ok(Self::Numeric),
            "DECIMAL" => Ok(Self::Decimal),
            "DOUBLE" => Ok(Self::Double),
            "REAL" | "FLOAT" => Ok(Self::Real),
            "BOOLEAN" | "BIT" => Ok(Self::Boolean),
            "DATE" => Ok(Self::Date),
            "TIME" => Ok(Self::Time),
            "TIMESTAMP" => Ok(Self::Timestamp),
            "BLOB" | "BINARY" => Ok(Self::Blob),
            "OTHER" => Ok(Self::Other),
            other => Err(format!("Unknown jdbcType '{other}'")),
        }
    }
}

impl std::fmt::Display for JdbcType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Varchar => "VARCHAR",
            Self::Char => "CHAR",
            Self::Clob => "CLOB",
            Self::Integer => "INTEGER",
            Self::Bigint => "BIGINT",
            Self::Smallint => "SMALLINT",
            Self::Numeric => "NUMERIC",
            Self::Decimal => "DECIMAL",
            Self::Double => "DOUBLE",
            Self::Real => "REAL",
            Self::Boolean => "BOOLEAN",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Timestamp => "TIMESTAMP",
            Self::Blob => "BLOB",
            Self::Other => "OTHER",
        };
        write!(f, "{name}")
    }
}
