//! Local safety checks applied before anything is written to the instrument.
//!
//! Both entry points (fixed and list) and both source functions go through
//! [`check_levels`]; the only thing that varies is the ceiling, which comes from
//! [`SourceSettings::level_ceiling`].

use super::state::SourceSettings;
use crate::error::ValidationError;

/// Validate the numeric settings of a configuration.
pub fn check_settings(settings: &SourceSettings) -> Result<(), ValidationError> {
    check_positive("nplc", settings.nplc)?;
    check_positive("range", settings.range)?;
    check_positive("compliance", settings.compliance)?;
    if let Some(ceiling) = settings.voltage_ceiling {
        check_positive("voltage_ceiling", ceiling)?;
    }
    Ok(())
}

/// Validate every level against the ceiling the settings imply.
///
/// The whole list is rejected on the first bad entry.
pub fn check_levels(settings: &SourceSettings, levels: &[f64]) -> Result<(), ValidationError> {
    let function = settings.function;
    if levels.is_empty() {
        return Err(ValidationError::EmptyList { function });
    }

    let ceiling = settings.level_ceiling();
    for (index, &value) in levels.iter().enumerate() {
        if !value.is_finite() {
            return Err(ValidationError::NotFinite {
                function,
                index,
                value,
            });
        }
        if value.abs() > ceiling {
            return Err(ValidationError::ExceedsCeiling {
                function,
                index,
                value,
                ceiling,
            });
        }
    }
    Ok(())
}

fn check_positive(name: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidSetting { name, value })
    }
}
