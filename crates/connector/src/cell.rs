use std::fmt;

/// One materialized column value.
///
/// Backends hand back whatever shape their driver produced; [`fmt::Display`]
/// is the single place that decides how a value reads in a result summary.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    /// Raw bytes. Some drivers return string columns this way.
    Bytes(Vec<u8>),
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => f.write_str("NULL"),
            Cell::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            Cell::Text(s) => f.write_str(s),
            Cell::Int(i) => write!(f, "{i}"),
            Cell::Float(x) => write!(f, "{x}"),
            Cell::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<i64> for Cell {
    fn from(i: i64) -> Self {
        Cell::Int(i)
    }
}
