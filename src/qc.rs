use crate::error::{MrError, Result};

pub fn check_range_f64(value: f64, min: f64, max: f64, inclusive: bool, name: &str) -> Result<()> {
    if !value.is_finite() {
        return Err(MrError::InvalidArgument(format!(
            "Value of {name} should be finite"
        )));
    }
    if inclusive {
        if value < min {
            return Err(MrError::InvalidArgument(format!(
                "Value of {name} should be at least {min}"
            )));
        }
        if value > max {
            return Err(MrError::InvalidArgument(format!(
                "Value of {name} should be at most {max}"
            )));
        }
    } else {
        if value <= min {
            return Err(MrError::InvalidArgument(format!(
                "Value of {name} should be above {min}"
            )));
        }
        if value >= max {
            return Err(MrError::InvalidArgument(format!(
                "Value of {name} should be below {max}"
            )));
        }
    }
    Ok(())
}

pub fn check_positive(value: f64, name: &str) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(MrError::InvalidArgument(format!(
            "Value of {name} should be positive and finite, got {value}"
        )));
    }
    Ok(())
}

pub fn check_nonzero_count(value: usize, name: &str) -> Result<()> {
    if value == 0 {
        return Err(MrError::InvalidArgument(format!(
            "Value of {name} should be at least 1"
        )));
    }
    Ok(())
}

/// Effective minimum for an estimator: the user threshold can only raise it.
pub fn check_instruments(
    method: &'static str,
    found: usize,
    required: usize,
    user_min: Option<usize>,
) -> Result<()> {
    let required = user_min.map_or(required, |m| m.max(required));
    if found < required {
        return Err(MrError::InsufficientInstruments {
            method,
            required,
            found,
        });
    }
    Ok(())
}
