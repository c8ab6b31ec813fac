//! Test Data Builders
//!
//! Provides builder patterns for constructing ledger and directory data with
//! sensible defaults. Tests specify only the fields they care about.

use chrono::NaiveDate;
use core_kernel::{ContractId, Money, RenterId, TenantId, UnitId};
use domain_receivables::{Charge, ChargeComponent, ChargeType, Contract, Payment, Renter, Unit};

use crate::fixtures::{DateFixtures, MoneyFixtures, StringFixtures};

/// Builder for charges
///
/// Defaults to a January recurring rent of 800 cold rent, 100 utility
/// advance and 50 heating advance.
pub struct ChargeBuilder {
    tenant_id: TenantId,
    contract_id: Option<ContractId>,
    title: String,
    due_date: NaiveDate,
    charge_type: ChargeType,
    components: Vec<(ChargeComponent, Money)>,
    total: Money,
}

impl ChargeBuilder {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            contract_id: Some(ContractId::new()),
            title: "Rent January".to_string(),
            due_date: DateFixtures::january_due(),
            charge_type: ChargeType::RecurringRent,
            components: vec![
                (ChargeComponent::ColdRent, MoneyFixtures::cold_rent()),
                (ChargeComponent::UtilityAdvance, MoneyFixtures::utility_advance()),
                (ChargeComponent::HeatingAdvance, MoneyFixtures::heating_advance()),
            ],
            total: MoneyFixtures::monthly_rent(),
        }
    }

    pub fn with_contract(mut self, contract_id: ContractId) -> Self {
        self.contract_id = Some(contract_id);
        self
    }

    /// Builds a charge that belongs to no contract
    pub fn without_contract(mut self) -> Self {
        self.contract_id = None;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = due_date;
        self
    }

    /// Replaces the rent breakdown
    pub fn with_components(mut self, components: Vec<(ChargeComponent, Money)>) -> Self {
        self.charge_type = ChargeType::RecurringRent;
        self.components = components;
        self
    }

    /// Turns the charge into a flat one without components
    pub fn flat(mut self, charge_type: ChargeType, total: Money) -> Self {
        self.charge_type = charge_type;
        self.components.clear();
        self.total = total;
        self
    }

    /// Builds the charge
    ///
    /// # Panics
    ///
    /// Panics if the configured data is rejected by the domain constructors
    pub fn build(self) -> Charge {
        if self.charge_type == ChargeType::RecurringRent && !self.components.is_empty() {
            let contract_id = self.contract_id.expect("recurring rent needs a contract");
            Charge::recurring_rent(
                self.tenant_id,
                contract_id,
                self.title,
                self.due_date,
                self.components,
            )
            .expect("valid recurring rent")
        } else {
            Charge::new(
                self.tenant_id,
                self.contract_id,
                self.charge_type,
                self.title,
                self.total,
                self.due_date,
            )
            .expect("valid charge")
        }
    }
}

/// Builder for incoming payments
pub struct PaymentBuilder {
    tenant_id: TenantId,
    booking_date: NaiveDate,
    amount: Money,
    memo: String,
    account_identifier: Option<String>,
}

impl PaymentBuilder {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            booking_date: DateFixtures::january_booking(),
            amount: MoneyFixtures::monthly_rent(),
            memo: "Transfer".to_string(),
            account_identifier: None,
        }
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = memo.into();
        self
    }

    pub fn with_booking_date(mut self, date: NaiveDate) -> Self {
        self.booking_date = date;
        self
    }

    pub fn with_account_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.account_identifier = Some(identifier.into());
        self
    }

    /// Builds the payment
    ///
    /// # Panics
    ///
    /// Panics for a non-positive amount
    pub fn build(self) -> Payment {
        let payment = Payment::new(self.tenant_id, self.booking_date, self.amount, self.memo)
            .expect("valid payment");
        match self.account_identifier {
            Some(identifier) => payment.with_account_identifier(identifier),
            None => payment,
        }
    }
}

/// Builder for units
pub struct UnitBuilder {
    tenant_id: TenantId,
    unit_number: String,
}

impl UnitBuilder {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            unit_number: StringFixtures::unit_number().to_string(),
        }
    }

    pub fn with_unit_number(mut self, number: impl Into<String>) -> Self {
        self.unit_number = number.into();
        self
    }

    pub fn build(self) -> Unit {
        Unit {
            id: UnitId::new(),
            tenant_id: self.tenant_id,
            unit_number: self.unit_number,
        }
    }
}

/// Builder for renters, with random names by default
pub struct RenterBuilder {
    tenant_id: TenantId,
    first_name: String,
    last_name: String,
    company_name: Option<String>,
    bank_accounts: Vec<String>,
}

impl RenterBuilder {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            first_name: StringFixtures::random_first_name(),
            last_name: StringFixtures::random_last_name(),
            company_name: None,
            bank_accounts: Vec::new(),
        }
    }

    pub fn with_name(
        mut self,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        self.first_name = first_name.into();
        self.last_name = last_name.into();
        self
    }

    pub fn with_company_name(mut self, company_name: impl Into<String>) -> Self {
        self.company_name = Some(company_name.into());
        self
    }

    pub fn with_bank_account(mut self, identifier: impl Into<String>) -> Self {
        self.bank_accounts.push(identifier.into());
        self
    }

    pub fn build(self) -> Renter {
        Renter {
            id: RenterId::new(),
            tenant_id: self.tenant_id,
            first_name: self.first_name,
            last_name: self.last_name,
            company_name: self.company_name,
            bank_accounts: self.bank_accounts,
        }
    }
}

/// Builder for rental contracts
pub struct ContractBuilder {
    tenant_id: TenantId,
    unit_id: UnitId,
    renter_id: RenterId,
    move_in_date: NaiveDate,
    move_out_date: Option<NaiveDate>,
}

impl ContractBuilder {
    pub fn new(tenant_id: TenantId, unit_id: UnitId, renter_id: RenterId) -> Self {
        Self {
            tenant_id,
            unit_id,
            renter_id,
            move_in_date: DateFixtures::move_in(),
            move_out_date: None,
        }
    }

    pub fn with_move_in(mut self, date: NaiveDate) -> Self {
        self.move_in_date = date;
        self
    }

    pub fn with_move_out(mut self, date: NaiveDate) -> Self {
        self.move_out_date = Some(date);
        self
    }

    pub fn build(self) -> Contract {
        Contract {
            id: ContractId::new(),
            tenant_id: self.tenant_id,
            unit_id: self.unit_id,
            renter_id: self.renter_id,
            move_in_date: self.move_in_date,
            move_out_date: self.move_out_date,
        }
    }
}
