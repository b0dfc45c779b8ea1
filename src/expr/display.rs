//! SQL-like rendering of expressions for error clauses and explain output

use std::fmt;

use super::column::ColumnRef;
use super::expr::{Expr, Literal};

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.table.is_empty(), self.name.is_empty()) {
            (_, true) => write!(f, "${}.{}", self.scope, self.index),
            (true, false) => write!(f, "{}", self.name),
            (false, false) => write!(f, "{}.{}", self.table, self.name),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "NULL"),
            Literal::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(col) => write!(f, "{}", col),
            Expr::Literal(lit) => write!(f, "{}", lit),
            Expr::Parameter(_) => write!(f, "?"),
            Expr::Compare { op, left, right } => write!(f, "{} {} {}", left, op.as_str(), right),
            Expr::Arithmetic { op, left, right } => {
                write!(f, "({} {} {})", left, op.as_str(), right)
            }
            Expr::And(terms) => {
                write!(f, "(")?;
                write_list(f, terms, " AND ")?;
                write!(f, ")")
            }
            Expr::Or(terms) => {
                write!(f, "(")?;
                write_list(f, terms, " OR ")?;
                write!(f, ")")
            }
            Expr::Function { name, args } => {
                write!(f, "{}(", name)?;
                write_list(f, args, ", ")?;
                write!(f, ")")
            }
            Expr::Aggregate {
                function,
                arg,
                distinct,
            } => match arg {
                None => write!(f, "{}(*)", function.as_str()),
                Some(arg) if *distinct => write!(f, "{}(DISTINCT {})", function.as_str(), arg),
                Some(arg) => write!(f, "{}({})", function.as_str(), arg),
            },
            Expr::OutputColumn { index, name } if name.is_empty() => write!(f, "#{}", index),
            Expr::OutputColumn { index, name } => write!(f, "#{}:{}", index, name),
        }
    }
}
