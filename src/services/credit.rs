//! Credit amortization engine.
//!
//! Credit creation computes the fixed monthly annuity payment and
//! materializes the full payment schedule; credit and schedule rows commit
//! in one atomic unit, so a partially written schedule is never observable.
//! Payments against the line debit the borrower's account in the same unit
//! that updates the credit.

use std::sync::Arc;

use chrono::{Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::BankError;
use crate::models::{Credit, CreditStatus, ScheduleEntry};
use crate::notify::Notifier;
use crate::services::LedgerService;
use crate::storage::{commit_or_rollback, AccountRepository, CreditRepository, Storage};

/// Share of the outstanding amount charged by [`CreditService::apply_penalty`].
const PENALTY_RATE: Decimal = Decimal::from_parts(10, 0, 0, false, 2); // 0.10

/// Money columns are stored with two decimal places.
const MONEY_SCALE: u32 = 2;

/// Repository-backed credit service.
pub struct CreditService<S> {
    store: Arc<S>,
    ledger: LedgerService<S>,
    notifier: Arc<dyn Notifier>,
}

impl<S> Clone for CreditService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ledger: self.ledger.clone(),
            notifier: Arc::clone(&self.notifier),
        }
    }
}

impl<S> CreditService<S>
where
    S: AccountRepository + CreditRepository,
{
    pub fn new(store: Arc<S>, ledger: LedgerService<S>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            ledger,
            notifier,
        }
    }

    /// Create a credit and materialize its full payment schedule.
    ///
    /// The credit row and all `term_months` schedule rows are written in one
    /// atomic unit; a failure anywhere leaves no trace of the credit.
    pub async fn create_credit(
        &self,
        user_id: Uuid,
        principal: Decimal,
        annual_rate: Decimal,
        term_months: i32,
    ) -> Result<Credit, BankError> {
        let now = Utc::now();
        let credit = Credit {
            id: Uuid::new_v4(),
            user_id,
            amount: principal,
            interest_rate: annual_rate,
            term_months,
            status: CreditStatus::Active,
            created_at: now,
            updated_at: now,
        };
        let schedule = build_schedule(&credit, now.date_naive())?;

        let mut tx = self.store.begin().await?;
        let out = async {
            self.store.save_credit(&mut tx, &credit).await?;
            for entry in &schedule {
                self.store.insert_schedule_row(&mut tx, entry).await?;
            }
            Ok(())
        }
        .await;
        commit_or_rollback(self.store.as_ref(), tx, out).await?;

        tracing::info!(credit_id = %credit.id, %user_id, periods = schedule.len(), "credit created");
        Ok(credit)
    }

    /// Draw `amount` against the credit line and withdraw the same amount
    /// from the borrower's account, as one atomic unit.
    ///
    /// # Errors
    ///
    /// `CreditNotActive` unless the credit is active; `CreditAmountExceeded`
    /// if `amount` exceeds the outstanding amount; ledger errors if the
    /// borrower's account cannot cover the withdrawal.
    pub async fn withdraw_payment(&self, credit_id: Uuid, amount: Decimal) -> Result<(), BankError> {
        let mut tx = self.store.begin().await?;
        let out = async {
            let mut credit = self.store.credit_by_id(&mut tx, credit_id).await?;
            let account = self.ledger.primary_account_in(&mut tx, credit.user_id).await?;

            credit.withdraw(amount)?;
            self.ledger.withdraw_in(&mut tx, account.id, amount).await?;
            self.store.save_credit(&mut tx, &credit).await
        }
        .await;
        commit_or_rollback(self.store.as_ref(), tx, out).await?;

        tracing::info!(%credit_id, %amount, "credit payment withdrawn");
        Ok(())
    }

    /// Charge the late-payment penalty: a fixed share of the outstanding
    /// amount, withdrawn from the borrower's account.
    ///
    /// There is no compensating path beyond the enclosing unit; if the
    /// withdrawal fails, nothing is charged.
    pub async fn apply_penalty(&self, credit_id: Uuid) -> Result<Decimal, BankError> {
        let mut tx = self.store.begin().await?;
        let out = async {
            let credit = self.store.credit_by_id(&mut tx, credit_id).await?;
            let account = self.ledger.primary_account_in(&mut tx, credit.user_id).await?;

            let penalty = (credit.amount * PENALTY_RATE).round_dp(MONEY_SCALE);
            self.ledger.withdraw_in(&mut tx, account.id, penalty).await?;
            Ok((credit.user_id, penalty))
        }
        .await;
        let (user_id, penalty) = commit_or_rollback(self.store.as_ref(), tx, out).await?;

        tracing::info!(%credit_id, %penalty, "penalty applied");
        self.notifier
            .notify(
                user_id,
                "Late payment penalty",
                &format!("A penalty of {penalty} was charged to your account."),
            )
            .await;

        Ok(penalty)
    }

    /// Fetch a credit by id.
    pub async fn credit(&self, credit_id: Uuid) -> Result<Credit, BankError> {
        let mut tx = self.store.begin().await?;
        let out = self.store.credit_by_id(&mut tx, credit_id).await;
        commit_or_rollback(self.store.as_ref(), tx, out).await
    }

    /// All credits taken by `user_id`, oldest first.
    pub async fn credits_for_user(&self, user_id: Uuid) -> Result<Vec<Credit>, BankError> {
        let mut tx = self.store.begin().await?;
        let out = self.store.credits_by_user(&mut tx, user_id).await;
        commit_or_rollback(self.store.as_ref(), tx, out).await
    }

    /// The credit's payment schedule, earliest due date first.
    pub async fn schedule(&self, credit_id: Uuid) -> Result<Vec<ScheduleEntry>, BankError> {
        let mut tx = self.store.begin().await?;
        let out = self.store.schedule_by_credit(&mut tx, credit_id).await;
        commit_or_rollback(self.store.as_ref(), tx, out).await
    }
}

/// Fixed monthly annuity payment for `principal` at `annual_rate` percent
/// over `term_months`.
///
/// `A = P * r * (1 + r)^n / ((1 + r)^n - 1)` with `r = annual_rate / 100 / 12`.
/// A zero rate degenerates to `P / n`; the general formula would divide by
/// zero there.
pub fn annuity_payment(
    principal: Decimal,
    annual_rate: Decimal,
    term_months: i32,
) -> Result<Decimal, BankError> {
    if principal <= Decimal::ZERO || annual_rate < Decimal::ZERO || term_months <= 0 {
        return Err(BankError::InvalidAmount);
    }

    let n = Decimal::from(term_months);
    let monthly_rate = annual_rate / Decimal::from(100) / Decimal::from(12);

    if monthly_rate.is_zero() {
        return Ok((principal / n).round_dp(MONEY_SCALE));
    }

    // (1 + r)^n by iterated multiplication; exact Decimal, no floats.
    let mut compounded = Decimal::ONE;
    for _ in 0..term_months {
        compounded *= Decimal::ONE + monthly_rate;
    }

    let payment = principal * monthly_rate * compounded / (compounded - Decimal::ONE);
    Ok(payment.round_dp(MONEY_SCALE))
}

/// Materialize the amortization schedule for `credit`, one row per month.
///
/// Each row carries the constant payment, the period's interest
/// (`balance * r`), the principal portion (`payment - interest`), and the
/// remaining balance after the payment. The final balance lands within
/// rounding distance of zero.
fn build_schedule(credit: &Credit, start: NaiveDate) -> Result<Vec<ScheduleEntry>, BankError> {
    let payment = annuity_payment(credit.amount, credit.interest_rate, credit.term_months)?;
    let monthly_rate = credit.interest_rate / Decimal::from(100) / Decimal::from(12);

    let mut entries = Vec::with_capacity(credit.term_months as usize);
    let mut balance = credit.amount;
    let now = Utc::now();

    for period in 0..credit.term_months {
        let interest = (balance * monthly_rate).round_dp(MONEY_SCALE);
        let principal = payment - interest;
        balance -= principal;

        entries.push(ScheduleEntry {
            id: Uuid::new_v4(),
            credit_id: credit.id,
            due_on: start + Months::new(period as u32 + 1),
            payment,
            principal,
            interest,
            penalty: Decimal::ZERO,
            remaining: balance,
            created_at: now,
        });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn zero_rate_degenerates_to_even_installments() {
        let payment = annuity_payment(dec!(1200), dec!(0), 12).unwrap();
        assert_eq!(payment, dec!(100));
    }

    #[test]
    fn twelve_percent_over_a_year() {
        // P = 120000, 12% annual, 12 months -> r = 0.01, A ~= 10661.85.
        let payment = annuity_payment(dec!(120000), dec!(12), 12).unwrap();
        assert!((payment - dec!(10661.85)).abs() < dec!(0.01), "payment = {payment}");
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        assert!(annuity_payment(dec!(0), dec!(12), 12).is_err());
        assert!(annuity_payment(dec!(-1), dec!(12), 12).is_err());
        assert!(annuity_payment(dec!(1000), dec!(-1), 12).is_err());
        assert!(annuity_payment(dec!(1000), dec!(12), 0).is_err());
    }

    #[test]
    fn schedule_amortizes_to_zero() {
        let credit = Credit {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            amount: dec!(120000),
            interest_rate: dec!(12),
            term_months: 12,
            status: CreditStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let schedule = build_schedule(&credit, Utc::now().date_naive()).unwrap();

        assert_eq!(schedule.len(), 12);

        let payment = schedule[0].payment;
        let total: Decimal = schedule.iter().map(|e| e.payment).sum();
        assert_eq!(total, payment * dec!(12));

        // Interest + principal always recompose the payment.
        for entry in &schedule {
            assert_eq!(entry.principal + entry.interest, entry.payment);
        }

        let last = schedule.last().unwrap();
        assert!(last.remaining.abs() < dec!(1), "residual = {}", last.remaining);

        // Due dates advance one month per period.
        assert!(schedule.windows(2).all(|w| w[0].due_on < w[1].due_on));
    }
}
