//! Reservation walltime (`h:m:s`)

use crate::error::{G5kError, Result};

/// Convert a walltime (`h`, `h:m` or `h:m:s`) to seconds
pub fn to_seconds(walltime: &str) -> Result<u64> {
    let invalid = || {
        G5kError::Configuration(format!(
            "Invalid walltime '{}', expected format is 'h:m:s'",
            walltime
        ))
    };

    let parts: Vec<&str> = walltime.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return Err(invalid());
    }

    let mut values = [0u64; 3];
    for (i, part) in parts.iter().enumerate() {
        values[i] = part.parse().map_err(|_| invalid())?;
    }

    let [hours, minutes, seconds] = values;
    if minutes >= 60 || seconds >= 60 {
        return Err(invalid());
    }

    let total = hours
        .checked_mul(3600)
        .and_then(|h| h.checked_add(minutes * 60 + seconds))
        .ok_or_else(invalid)?;
    if total == 0 {
        return Err(invalid());
    }

    Ok(total)
}
