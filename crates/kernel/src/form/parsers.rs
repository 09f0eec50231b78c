//! Built-in typed-parse functions.

use serde_json::Value;

use super::types::ParseFn;

pub const MSG_INVALID_DURATION: &str = "Invalid duration, use e.g. 1h30m, 45m or 90s.";

/// Parse durations like `1h30m`, `45m`, `90s` into whole seconds.
pub fn parse_duration() -> ParseFn {
    ParseFn::new(|value| {
        duration_secs(value)
            .map(Value::from)
            .ok_or_else(|| vec![MSG_INVALID_DURATION.to_string()])
    })
}

/// Parse integers, optionally bounded (inclusive).
pub fn parse_integer(min: Option<i64>, max: Option<i64>) -> ParseFn {
    ParseFn::new(move |value| {
        let n: i64 = value
            .parse()
            .map_err(|_| vec!["Must be a whole number.".to_string()])?;
        if let Some(min) = min
            && n < min
        {
            return Err(vec![format!("Must be at least {min}.")]);
        }
        if let Some(max) = max
            && n > max
        {
            return Err(vec![format!("Must be at most {max}.")]);
        }
        Ok(Value::from(n))
    })
}

fn duration_secs(value: &str) -> Option<u64> {
    if value.is_empty() {
        return None;
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    for c in value.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return None,
        };
        let amount: u64 = digits.parse().ok()?;
        total = total.checked_add(amount.checked_mul(unit)?)?;
        digits.clear();
    }

    // trailing number without a unit
    if !digits.is_empty() {
        return None;
    }
    Some(total)
}
