//! Who owes whom, given what every driver has paid so far.
//!
//! Drivers who paid less than the fair share are paired with the drivers who
//! paid more, top payer first. The result is a set of pairwise obligations;
//! it does not try to minimise the number of transfers beyond that.
//!
//! Amounts are settled in whole cents and the fair share is rounded down, so
//! when the group total does not divide evenly the top payer is left with a
//! remainder of at most one cent per driver that no suggestion covers.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{
    driver::Driver,
    invoice::{DriverTotal, InvoiceKind, NewInvoice},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverBalance {
    pub driver: Driver,
    pub total: f64,
    /// Positive when the group owes this driver money.
    pub balance: f64,
    /// Other drivers this one still has to pay, with amounts.
    pub to: BTreeMap<Driver, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub fair_share: f64,
    pub drivers: Vec<DriverBalance>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Suggestion {
    pub from: Driver,
    pub to: Driver,
    pub amount: f64,
}

/// Either nothing is owed, or the transfers that would settle the group.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Balanced,
    Pending(Vec<Suggestion>),
}

fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

fn from_cents(cents: i64) -> f64 {
    cents as f64 / 100.0
}

pub fn fair_share(totals: &[DriverTotal]) -> f64 {
    if totals.is_empty() {
        return 0.0;
    }
    let sum: i64 = totals.iter().map(|t| to_cents(t.total)).sum();
    from_cents(sum / totals.len() as i64)
}

impl Snapshot {
    pub fn compute(totals: &[DriverTotal], fair_share: f64) -> Self {
        let share = to_cents(fair_share);
        let mut rows: Vec<(Driver, i64, i64)> = totals
            .iter()
            .map(|t| {
                let paid = to_cents(t.total);
                (t.driver, paid, paid - share)
            })
            .collect();
        rows.sort_by_key(|(driver, _, _)| *driver);

        let mut creditors: Vec<(Driver, i64)> = rows
            .iter()
            .filter(|(_, _, balance)| *balance > 0)
            .map(|(driver, _, balance)| (*driver, *balance))
            .collect();
        creditors.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut drivers = Vec::with_capacity(rows.len());
        for (driver, paid, balance) in rows {
            let mut to = BTreeMap::new();
            let mut owed = (-balance).max(0);
            for (creditor, open) in creditors.iter_mut() {
                if owed == 0 {
                    break;
                }
                if *creditor == driver || *open == 0 {
                    continue;
                }
                let amount = owed.min(*open);
                *open -= amount;
                owed -= amount;
                to.insert(*creditor, from_cents(amount));
            }
            drivers.push(DriverBalance {
                driver,
                total: from_cents(paid),
                balance: from_cents(balance),
                to,
            });
        }

        Self {
            fair_share: from_cents(share),
            drivers,
        }
    }

    pub fn from_totals(totals: &[DriverTotal]) -> Self {
        Self::compute(totals, fair_share(totals))
    }
}

pub fn suggestions(snapshot: &Snapshot) -> Vec<Suggestion> {
    snapshot
        .drivers
        .iter()
        .flat_map(|row| {
            row.to
                .iter()
                .filter(|(to, amount)| **to != row.driver && **amount > 0.0)
                .map(move |(to, amount)| Suggestion {
                    from: row.driver,
                    to: *to,
                    amount: *amount,
                })
        })
        .collect()
}

impl Settlement {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let pending = suggestions(snapshot);
        if pending.is_empty() {
            Settlement::Balanced
        } else {
            Settlement::Pending(pending)
        }
    }
}

impl Suggestion {
    /// The expense that records this transfer once the debtor has paid.
    pub fn to_invoice(&self, date: NaiveDate) -> NewInvoice {
        NewInvoice {
            name: format!(
                "Reimbursement {} → {}",
                self.from.display_name(),
                self.to.display_name()
            ),
            date,
            amount: self.amount,
            kind: InvoiceKind::Reimbursement,
            driver: self.from,
            counter_party: Some(self.to),
            mileage: None,
            attachment: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(values: &[(Driver, f64)]) -> Vec<DriverTotal> {
        values
            .iter()
            .map(|(driver, total)| DriverTotal {
                driver: *driver,
                total: *total,
            })
            .collect()
    }

    #[test]
    fn single_top_payer_is_paid_by_everyone_else() {
        let input = totals(&[
            (Driver::Anna, 300.0),
            (Driver::Ben, 0.0),
            (Driver::Clara, 0.0),
        ]);
        let snapshot = Snapshot::compute(&input, 100.0);
        let out = suggestions(&snapshot);
        assert_eq!(
            out,
            vec![
                Suggestion {
                    from: Driver::Ben,
                    to: Driver::Anna,
                    amount: 100.0
                },
                Suggestion {
                    from: Driver::Clara,
                    to: Driver::Anna,
                    amount: 100.0
                },
            ]
        );
        assert!(out.iter().all(|s| s.from != Driver::Anna));
    }

    #[test]
    fn balanced_group_has_no_suggestions() {
        let input = totals(&[
            (Driver::Anna, 50.0),
            (Driver::Ben, 50.0),
            (Driver::Clara, 50.0),
        ]);
        let snapshot = Snapshot::from_totals(&input);
        assert!(suggestions(&snapshot).is_empty());
        assert_eq!(Settlement::from_snapshot(&snapshot), Settlement::Balanced);
    }

    #[test]
    fn debtor_splits_across_two_creditors() {
        let input = totals(&[
            (Driver::Anna, 200.0),
            (Driver::Ben, 100.0),
            (Driver::Clara, 0.0),
        ]);
        let snapshot = Snapshot::from_totals(&input);
        assert_eq!(snapshot.fair_share, 100.0);
        assert_eq!(
            suggestions(&snapshot),
            vec![Suggestion {
                from: Driver::Clara,
                to: Driver::Anna,
                amount: 100.0
            }]
        );

        let input = totals(&[
            (Driver::Anna, 150.0),
            (Driver::Ben, 120.0),
            (Driver::Clara, 0.0),
        ]);
        let snapshot = Snapshot::from_totals(&input);
        let out = suggestions(&snapshot);
        assert_eq!(out.len(), 2);
        assert_eq!((out[0].to, out[0].amount), (Driver::Anna, 60.0));
        assert_eq!((out[1].to, out[1].amount), (Driver::Ben, 30.0));
        let paid: f64 = out.iter().map(|s| s.amount).sum();
        let owed: f64 = snapshot
            .drivers
            .iter()
            .filter(|d| d.balance > 0.0)
            .map(|d| d.balance)
            .sum();
        assert_eq!(paid, owed);
    }

    #[test]
    fn uneven_total_leaves_the_cent_remainder_with_the_top_payer() {
        let input = totals(&[
            (Driver::Anna, 100.0),
            (Driver::Ben, 0.0),
            (Driver::Clara, 0.0),
        ]);
        let snapshot = Snapshot::from_totals(&input);
        assert_eq!(snapshot.fair_share, 33.33);
        assert_eq!(
            suggestions(&snapshot),
            vec![
                Suggestion {
                    from: Driver::Ben,
                    to: Driver::Anna,
                    amount: 33.33
                },
                Suggestion {
                    from: Driver::Clara,
                    to: Driver::Anna,
                    amount: 33.33
                },
            ]
        );
        let anna = &snapshot.drivers[0];
        assert_eq!(anna.driver, Driver::Anna);
        assert_eq!(anna.balance, 66.67);
    }

    #[test]
    fn own_entry_never_appears_in_to_map() {
        let input = totals(&[(Driver::Anna, 10.0), (Driver::Ben, 0.0)]);
        let snapshot = Snapshot::from_totals(&input);
        for row in &snapshot.drivers {
            assert!(!row.to.contains_key(&row.driver));
        }
    }

    #[test]
    fn confirmed_suggestion_becomes_reimbursement() {
        let suggestion = Suggestion {
            from: Driver::Ben,
            to: Driver::Anna,
            amount: 42.5,
        };
        let invoice = suggestion.to_invoice(NaiveDate::from_ymd_opt(2024, 7, 1).unwrap());
        assert_eq!(invoice.kind, InvoiceKind::Reimbursement);
        assert_eq!(invoice.driver, Driver::Ben);
        assert_eq!(invoice.counter_party, Some(Driver::Anna));
        assert_eq!(invoice.amount, 42.5);
        assert!(crate::validation::validate_invoice(&invoice).is_ok());
    }

    #[test]
    fn empty_roster_is_balanced() {
        assert_eq!(fair_share(&[]), 0.0);
        let snapshot = Snapshot::from_totals(&[]);
        assert_eq!(Settlement::from_snapshot(&snapshot), Settlement::Balanced);
    }
}
