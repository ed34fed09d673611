//! Column catalog helpers.
//!
//! Every pipeline stage sees an ordered list of visible columns; these
//! helpers look columns up by name and detect duplicate names.

pub mod type_checker;

pub use type_checker::{BuiltinTypeResolver, TypeChecker, TypeResolver};

use crate::error::ClauseError;
use crate::value::Column;
use std::collections::HashSet;

/// Find a column by (case-sensitive) name
pub fn find_column<'a>(columns: &'a [Column], name: &str) -> Option<&'a Column> {
    columns.iter().find(|column| column.name == name)
}

/// Find a column by name, failing with `Can't find column '<name>'`
pub fn get_column<'a>(columns: &'a [Column], name: &str) -> Result<&'a Column, ClauseError> {
    find_column(columns, name).ok_or_else(|| ClauseError::ColumnNotFound(name.to_string()))
}

/// Return the first name that occurs more than once
pub fn find_duplicate<'a, I>(names: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    names.into_iter().find(|name| !seen.insert(*name))
}

/// Return every name that occurs more than once, in order of first repetition
pub fn find_duplicates<'a, I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    let mut duplicates: Vec<String> = Vec::new();
    for name in names {
        if !seen.insert(name) && !duplicates.iter().any(|d| d == name) {
            duplicates.push(name.to_string());
        }
    }
    duplicates
}
