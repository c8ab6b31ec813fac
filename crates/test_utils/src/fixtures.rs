//! Pre-built Test Fixtures
//!
//! Provides ready-to-use test data for common receivables entities.
//! These fixtures are designed to be consistent and predictable for unit tests.

use chrono::NaiveDate;
use core_kernel::{Currency, Money, TenantId};
use fake::faker::company::en::CompanyName;
use fake::faker::name::en::{FirstName, LastName};
use fake::Fake;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Creates a EUR amount
pub fn eur(amount: Decimal) -> Money {
    Money::new(amount, Currency::EUR)
}

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// Monthly cold rent
    pub fn cold_rent() -> Money {
        eur(dec!(800.00))
    }

    /// Monthly utility advance
    pub fn utility_advance() -> Money {
        eur(dec!(100.00))
    }

    /// Monthly heating advance
    pub fn heating_advance() -> Money {
        eur(dec!(50.00))
    }

    /// Cold rent plus both advances
    pub fn monthly_rent() -> Money {
        eur(dec!(950.00))
    }

    pub fn eur_zero() -> Money {
        Money::zero(Currency::EUR)
    }

    /// A CHF amount for currency mismatch tests
    pub fn chf_100() -> Money {
        Money::new(dec!(100.00), Currency::CHF)
    }
}

/// Fixture for calendar dates
pub struct DateFixtures;

impl DateFixtures {
    /// Builds a date, panicking on an impossible one
    pub fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid fixture date")
    }

    /// Due date of the January rent
    pub fn january_due() -> NaiveDate {
        Self::ymd(2024, 1, 3)
    }

    /// Booking date of a payment a few days after the January due date
    pub fn january_booking() -> NaiveDate {
        Self::ymd(2024, 1, 5)
    }

    /// Standard move-in date
    pub fn move_in() -> NaiveDate {
        Self::ymd(2022, 4, 1)
    }
}

/// Fixture for string identifiers and memo texts
pub struct StringFixtures;

impl StringFixtures {
    pub fn unit_number() -> &'static str {
        "EG-Links"
    }

    pub fn rent_memo() -> &'static str {
        "Rent Unit EG-Links January"
    }

    pub fn iban() -> &'static str {
        "DE89 3704 0044 0532 0130 00"
    }

    pub fn random_first_name() -> String {
        FirstName().fake()
    }

    pub fn random_last_name() -> String {
        LastName().fake()
    }

    pub fn random_company_name() -> String {
        CompanyName().fake()
    }
}

/// Fixture for identifiers
pub struct IdFixtures;

impl IdFixtures {
    pub fn tenant_id() -> TenantId {
        TenantId::new()
    }
}
