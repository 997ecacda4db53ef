//! Referral commission distribution.

use crate::domain::{Money, OwnerId};

use super::{Ancestor, CommissionAward};

/// Level-indexed commission percentages, supplied by configuration.
///
/// Index 0 holds the level-1 (direct sponsor) percentage. Levels beyond the
/// table are undefined and pay nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommissionTable {
    percents: Vec<Money>,
}

impl CommissionTable {
    pub fn new(percents: Vec<Money>) -> Self {
        CommissionTable { percents }
    }

    /// Highest level this table pays.
    pub fn max_level(&self) -> u32 {
        self.percents.len() as u32
    }

    /// Percentage for a 1-indexed level, None beyond the table.
    pub fn percent_for_level(&self, level: u32) -> Option<Money> {
        if level == 0 {
            return None;
        }
        self.percents.get((level - 1) as usize).copied()
    }
}

/// Compute the commission credits owed for one accrual.
///
/// Each ancestor with a defined level percentage gets
/// `accrual * percent / 100` rounded half-up to `scale` decimals. Ancestors
/// beyond the table, and awards that round to zero, are skipped.
pub fn commission_plan(
    accrual: Money,
    source_owner: &OwnerId,
    ancestors: &[Ancestor],
    table: &CommissionTable,
    scale: u32,
) -> Vec<CommissionAward> {
    let mut awards = Vec::new();
    for ancestor in ancestors {
        let Some(percent) = table.percent_for_level(ancestor.level) else {
            continue;
        };
        let amount = (accrual * percent / Money::hundred()).round_currency(scale);
        if amount.is_zero() {
            continue;
        }
        awards.push(CommissionAward {
            owner: ancestor.owner.clone(),
            level: ancestor.level,
            amount,
            source_owner: source_owner.clone(),
        });
    }
    awards
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn money(s: &str) -> Money {
        Money::from_str(s).unwrap()
    }

    fn table(percents: &[&str]) -> CommissionTable {
        CommissionTable::new(percents.iter().map(|p| money(p)).collect())
    }

    fn chain(owners: &[&str]) -> Vec<Ancestor> {
        owners
            .iter()
            .enumerate()
            .map(|(i, o)| Ancestor {
                owner: OwnerId::new(*o),
                level: (i + 1) as u32,
            })
            .collect()
    }

    #[test]
    fn test_reference_scenario() {
        // 15.00 accrual through {10%, 5%, 2%} pays 1.50, 0.75, 0.30
        let source = OwnerId::new("payer");
        let awards = commission_plan(
            money("15.00"),
            &source,
            &chain(&["a", "b", "c"]),
            &table(&["10", "5", "2"]),
            2,
        );

        assert_eq!(awards.len(), 3);
        assert_eq!(awards[0].amount, money("1.50"));
        assert_eq!(awards[1].amount, money("0.75"));
        assert_eq!(awards[2].amount, money("0.30"));
        for (i, award) in awards.iter().enumerate() {
            assert_eq!(award.level, (i + 1) as u32);
            assert_eq!(award.source_owner, source);
        }

        let total = awards
            .iter()
            .fold(Money::zero(), |acc, a| acc + a.amount);
        assert_eq!(total, money("2.55"));
    }

    #[test]
    fn test_ancestors_beyond_table_pay_nothing() {
        let source = OwnerId::new("payer");
        let awards = commission_plan(
            money("100"),
            &source,
            &chain(&["a", "b", "c", "d"]),
            &table(&["10", "5"]),
            2,
        );
        assert_eq!(awards.len(), 2);
        assert_eq!(awards.last().unwrap().level, 2);
    }

    #[test]
    fn test_zero_awards_are_skipped() {
        // 0.01 * 5% = 0.0005 rounds to zero and must not post
        let source = OwnerId::new("payer");
        let awards = commission_plan(
            money("0.01"),
            &source,
            &chain(&["a"]),
            &table(&["5"]),
            2,
        );
        assert!(awards.is_empty());
    }

    #[test]
    fn test_empty_chain_yields_no_awards() {
        let source = OwnerId::new("payer");
        let awards = commission_plan(money("100"), &source, &[], &table(&["10"]), 2);
        assert!(awards.is_empty());
    }

    #[test]
    fn test_total_bounded_by_accrual_when_percents_at_most_100() {
        let source = OwnerId::new("payer");
        let accruals = ["15.00", "0.07", "1234.56", "3.33"];
        let t = table(&["100", "50", "25", "10", "5"]);
        for a in accruals {
            let accrual = money(a);
            let awards = commission_plan(
                accrual,
                &source,
                &chain(&["a", "b", "c", "d", "e"]),
                &t,
                2,
            );
            for award in &awards {
                assert!(award.amount <= accrual, "level {} overpaid", award.level);
            }
        }
    }

    #[test]
    fn test_percent_for_level_bounds() {
        let t = table(&["10", "5"]);
        assert_eq!(t.percent_for_level(0), None);
        assert_eq!(t.percent_for_level(1), Some(money("10")));
        assert_eq!(t.percent_for_level(2), Some(money("5")));
        assert_eq!(t.percent_for_level(3), None);
        assert_eq!(t.max_level(), 2);
    }
}
