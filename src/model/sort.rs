use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;

use serde::{Deserialize, Serialize};

use crate::results::Row;
use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// How two values of a sort column are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Numbers numerically, text with embedded digit runs compared by value (`a2 < a10`).
    #[default]
    Natural,
    /// Everything through its numeric view; unparsable text counts as zero.
    Numeric,
    /// Byte-wise on the display form.
    String,
    /// Case-folded first, then byte-wise.
    Locale,
    /// Case-folded only.
    CaseInsensitive,
}

/// One column of a multi-column sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
    #[serde(default)]
    pub mode: SortMode,
}

impl SortKey {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
            mode: SortMode::default(),
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            direction: SortDirection::Desc,
            ..Self::asc(column)
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: SortMode) -> Self {
        self.mode = mode;
        self
    }
}

pub(crate) fn compare_rows(a: &Row, b: &Row, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let left = a.get(&key.column).unwrap_or(&Value::Null);
        let right = b.get(&key.column).unwrap_or(&Value::Null);
        let ord = compare_values(left, right, key.mode);
        let ord = match key.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn compare_values(a: &Value, b: &Value, mode: SortMode) -> Ordering {
    // NULL sorts before everything else.
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (false, false) => {}
    }
    match mode {
        SortMode::Numeric => a.numeric().total_cmp(&b.numeric()),
        SortMode::String => a.to_string().cmp(&b.to_string()),
        SortMode::CaseInsensitive => a.to_string().to_lowercase().cmp(&b.to_string().to_lowercase()),
        SortMode::Locale => {
            let (x, y) = (a.to_string(), b.to_string());
            x.to_lowercase().cmp(&y.to_lowercase()).then_with(|| x.cmp(&y))
        }
        SortMode::Natural => match (a, b) {
            (Value::Int(x), Value::Int(y)) => x.cmp(y),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                a.numeric().total_cmp(&b.numeric())
            }
            (Value::Timestamp(x), Value::Timestamp(y)) => x.cmp(y),
            _ => natural_cmp(&a.to_string(), &b.to_string()),
        },
    }
}

fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut xs = a.chars().peekable();
    let mut ys = b.chars().peekable();
    loop {
        match (xs.peek().copied(), ys.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let left = take_digits(&mut xs);
                let right = take_digits(&mut ys);
                let (l, r) = (left.trim_start_matches('0'), right.trim_start_matches('0'));
                let ord = l.len().cmp(&r.len()).then_with(|| l.cmp(r));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                let ord = x.cmp(&y);
                if ord != Ordering::Equal {
                    return ord;
                }
                xs.next();
                ys.next();
            }
        }
    }
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.next_if(char::is_ascii_digit) {
        run.push(c);
    }
    run
}
