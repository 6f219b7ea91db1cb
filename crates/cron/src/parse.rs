//! Five-field cron expression parsing.
//!
//! Fields: minute (0-59), hour (0-23), day-of-month (1-31), month (1-12),
//! day-of-week (0-6, Sunday = 0; 7 is accepted as Sunday).
//!
//! Each field is a comma-separated list of `*`, `N`, or `A-B`, each with an
//! optional `/STEP` that keeps every STEP-th value of the expanded list.

use std::collections::BTreeSet;

use crate::error::{Error, Result};

/// A parsed cron expression: the set of matching values for each field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    pub minutes: BTreeSet<u32>,
    pub hours: BTreeSet<u32>,
    pub days_of_month: BTreeSet<u32>,
    pub months: BTreeSet<u32>,
    pub days_of_week: BTreeSet<u32>,
    source: String,
}

impl CronExpr {
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl std::str::FromStr for CronExpr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_cron(s)
    }
}

/// Parse a five-field cron expression.
pub fn parse_cron(expression: &str) -> Result<CronExpr> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(Error::cron_parse(
            expression,
            format!("expected 5 fields, got {}", fields.len()),
        ));
    }

    let field = |i: usize, name: &str, min: u32, max: u32| {
        parse_field(fields[i], min, max)
            .map_err(|reason| Error::cron_parse(expression, format!("{name}: {reason}")))
    };

    let mut days_of_week = field(4, "day-of-week", 0, 7)?;
    if days_of_week.remove(&7) {
        days_of_week.insert(0);
    }

    Ok(CronExpr {
        minutes: field(0, "minute", 0, 59)?,
        hours: field(1, "hour", 0, 23)?,
        days_of_month: field(2, "day-of-month", 1, 31)?,
        months: field(3, "month", 1, 12)?,
        days_of_week,
        source: expression.to_string(),
    })
}

fn parse_field(field: &str, min: u32, max: u32) -> std::result::Result<BTreeSet<u32>, String> {
    let mut values = BTreeSet::new();

    for part in field.split(',') {
        let (base, step) = match part.split_once('/') {
            Some((base, step)) => {
                let step: usize = step
                    .parse()
                    .map_err(|_| format!("invalid step '{step}'"))?;
                if step == 0 {
                    return Err("step must be greater than zero".into());
                }
                (base, step)
            },
            None => (part, 1),
        };

        let (start, end) = if base == "*" {
            // `*` covers 0-6 for day-of-week; 7 is only an explicit alias.
            (min, if max == 7 { 6 } else { max })
        } else if let Some((a, b)) = base.split_once('-') {
            let a = parse_value(a, min, max)?;
            let b = parse_value(b, min, max)?;
            if a > b {
                return Err(format!("range {a}-{b} is reversed"));
            }
            (a, b)
        } else {
            let v = parse_value(base, min, max)?;
            (v, v)
        };

        values.extend((start..=end).step_by(step));
    }

    Ok(values)
}

fn parse_value(s: &str, min: u32, max: u32) -> std::result::Result<u32, String> {
    let v: u32 = s.parse().map_err(|_| format!("invalid value '{s}'"))?;
    if v < min || v > max {
        return Err(format!("{v} is outside {min}-{max}"));
    }
    Ok(v)
}
