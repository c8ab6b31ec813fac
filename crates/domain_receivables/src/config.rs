//! Engine configuration
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. an optional TOML/YAML/JSON file
//! 3. environment variables prefixed `RECEIVABLES_`, nested keys joined
//!    with `__` (e.g. `RECEIVABLES_LATE_FEES__NOTICE_1=7.50`)
//!
//! The waterfall priority is a list and can only be set from a file.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;

use core_kernel::{CoreError, Currency, Money};

use crate::dunning::{EscalationThresholds, InterestTerms, LateFeeSchedule};
use crate::waterfall::WaterfallPriority;

/// Receivables engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceivablesConfig {
    /// Ledger currency; fees and interest are booked in it
    pub currency: Currency,
    pub waterfall_priority: WaterfallPriority,
    /// Candidate charges are due within this many days of the payment date
    pub match_window_days: i64,
    pub late_fees: LateFeeSchedule,
    pub interest: InterestTerms,
    pub escalation: EscalationThresholds,
    /// Default fee for a bounced payment
    pub chargeback_fee: Decimal,
}

impl Default for ReceivablesConfig {
    fn default() -> Self {
        Self {
            currency: Currency::EUR,
            waterfall_priority: WaterfallPriority::default(),
            match_window_days: 30,
            late_fees: LateFeeSchedule::default(),
            interest: InterestTerms::default(),
            escalation: EscalationThresholds::default(),
            chargeback_fee: dec!(15),
        }
    }
}

impl ReceivablesConfig {
    /// Loads configuration from defaults, environment and no file
    pub fn from_env() -> Result<Self, CoreError> {
        Self::load(None)
    }

    /// Loads configuration, optionally layering a file under the environment
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` for unreadable sources, values of
    /// the wrong shape, or values rejected by [`ReceivablesConfig::validate`]
    pub fn load(file: Option<&Path>) -> Result<Self, CoreError> {
        let mut builder = Self::builder()?;
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }
        Self::finish(builder.add_source(Self::environment()))
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, CoreError> {
        let defaults = config::Config::try_from(&Self::default()).map_err(config_error)?;
        Ok(config::Config::builder().add_source(defaults))
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix("RECEIVABLES")
            .prefix_separator("_")
            .separator("__")
    }

    fn finish(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, CoreError> {
        let config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(config_error)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` for negative fees or rates, a zero
    /// day-count basis, a negative match window, escalation thresholds that
    /// do not strictly ascend, or a waterfall that is not a permutation
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.late_fees.fees().iter().any(|fee| fee.is_sign_negative() && !fee.is_zero()) {
            return Err(CoreError::configuration("late fees must not be negative"));
        }
        if self.chargeback_fee.is_sign_negative() && !self.chargeback_fee.is_zero() {
            return Err(CoreError::configuration("chargeback fee must not be negative"));
        }
        if self.interest.annual_rate.is_sign_negative() && !self.interest.annual_rate.is_zero() {
            return Err(CoreError::configuration("interest rate must not be negative"));
        }
        if self.interest.day_count_basis == 0 {
            return Err(CoreError::configuration("day-count basis must be positive"));
        }
        if self.match_window_days < 0 {
            return Err(CoreError::configuration("match window must not be negative"));
        }

        let t = &self.escalation;
        let ascending = 0 <= t.grace_days
            && t.grace_days < t.notice_1_days
            && t.notice_1_days < t.notice_2_days
            && t.notice_2_days < t.notice_3_days;
        if !ascending {
            return Err(CoreError::configuration(format!(
                "thresholds must ascend: grace {} < notice_1 {} < notice_2 {} < notice_3 {}",
                t.grace_days, t.notice_1_days, t.notice_2_days, t.notice_3_days
            )));
        }

        WaterfallPriority::new(self.waterfall_priority.components().to_vec())
            .map_err(|e| CoreError::configuration(e.to_string()))?;
        Ok(())
    }

    /// Default chargeback fee as money
    pub fn default_chargeback_fee(&self) -> Money {
        Money::new_rounded(self.chargeback_fee, self.currency)
    }
}

fn config_error(error: config::ConfigError) -> CoreError {
    CoreError::configuration(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charge::ChargeComponent;
    use config::{File, FileFormat};

    fn from_toml(toml: &str) -> Result<ReceivablesConfig, CoreError> {
        let builder =
            ReceivablesConfig::builder()?.add_source(File::from_str(toml, FileFormat::Toml));
        ReceivablesConfig::finish(builder)
    }

    #[test]
    fn test_defaults() {
        let config = ReceivablesConfig::default();
        assert_eq!(config.match_window_days, 30);
        assert_eq!(config.escalation.notice_2_days, 28);
        assert_eq!(config.interest.annual_rate, dec!(0.05));
        assert_eq!(config.default_chargeback_fee(), Money::new(dec!(15), Currency::EUR));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let config = from_toml(
            r#"
            match_window_days = 10
            waterfall_priority = ["cold_rent", "utility_advance", "heating_advance"]

            [late_fees]
            notice_1 = "7.50"
            "#,
        )
        .unwrap();

        assert_eq!(config.match_window_days, 10);
        assert_eq!(config.late_fees.notice_1, dec!(7.50));
        assert_eq!(config.late_fees.notice_2, dec!(10));
        assert_eq!(config.waterfall_priority.components()[0], ChargeComponent::ColdRent);
    }

    #[test]
    fn test_rejects_non_ascending_thresholds() {
        let result = from_toml(
            r#"
            [escalation]
            notice_1_days = 30
            "#,
        );
        assert!(matches!(result, Err(CoreError::Configuration(_))));
    }

    #[test]
    fn test_rejects_incomplete_waterfall() {
        let result = from_toml(r#"waterfall_priority = ["cold_rent"]"#);
        assert!(matches!(result, Err(CoreError::Configuration(_))));
    }

    #[test]
    fn test_rejects_negative_fee() {
        let mut config = ReceivablesConfig::default();
        config.late_fees.notice_3 = dec!(-1);
        assert!(config.validate().is_err());
    }
}
