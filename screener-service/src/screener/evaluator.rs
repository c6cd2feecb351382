//! Criteria evaluation.
//!
//! Every bound must hold (conjunction). The one exception is institutional
//! holding, which passes when either the FII or the DII holding exceeds the
//! same threshold.

use crate::data::QuoteRecord;

use super::criteria::{Bound, CriteriaSet, Metric};

/// Check whether a record satisfies every criterion.
///
/// Pure; stops at the first failing criterion. Empty criteria match everything.
pub fn matches(record: &QuoteRecord, criteria: &CriteriaSet) -> bool {
    criteria
        .iter()
        .all(|(metric, bound)| satisfies(record, metric, bound))
}

/// The metrics a record fails, in criteria order.
pub fn failed_metrics(record: &QuoteRecord, criteria: &CriteriaSet) -> Vec<Metric> {
    criteria
        .iter()
        .filter(|(metric, bound)| !satisfies(record, *metric, bound))
        .map(|(metric, _)| metric)
        .collect()
}

fn satisfies(record: &QuoteRecord, metric: Metric, bound: &Bound) -> bool {
    match metric {
        // Strict comparison; without a min there is nothing to check and max
        // is not applied.
        Metric::InstitutionalHolding => match bound.min {
            Some(threshold) => {
                let f = &record.fundamentals;
                f.fii_holding.unwrap_or(0.0) > threshold || f.dii_holding.unwrap_or(0.0) > threshold
            }
            None => true,
        },
        _ => bound.contains(metric.value(record)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> QuoteRecord {
        let mut r = QuoteRecord::new("TEST.NS", "Test Ltd", 100.0);
        r.roe = 15.0;
        r.debt_to_equity = 0.5;
        r.market_cap = 1200.0;
        r
    }

    #[test]
    fn test_empty_criteria_matches() {
        assert!(matches(&record(), &CriteriaSet::new()));
    }

    #[test]
    fn test_min_fails_only_below() {
        let r = record();
        assert!(matches(&r, &CriteriaSet::new().with(Metric::Roe, Bound::min(15.0))));
        assert!(!matches(&r, &CriteriaSet::new().with(Metric::Roe, Bound::min(15.01))));
    }

    #[test]
    fn test_max_fails_only_above() {
        let r = record();
        assert!(matches(&r, &CriteriaSet::new().with(Metric::DebtToEquity, Bound::max(0.5))));
        assert!(!matches(&r, &CriteriaSet::new().with(Metric::DebtToEquity, Bound::max(0.4))));
    }

    #[test]
    fn test_missing_fundamental_reads_as_zero() {
        let r = record();
        assert!(!matches(&r, &CriteriaSet::new().with(Metric::SalesGrowth, Bound::min(1.0))));
        assert!(matches(&r, &CriteriaSet::new().with(Metric::PledgedPercent, Bound::max(0.0))));
    }

    #[test]
    fn test_institutional_either_side() {
        let criteria = CriteriaSet::new().with(Metric::InstitutionalHolding, Bound::min(10.0));

        let mut r = record();
        r.fundamentals.fii_holding = Some(12.0);
        r.fundamentals.dii_holding = Some(2.0);
        assert!(matches(&r, &criteria));

        r.fundamentals.fii_holding = Some(1.0);
        r.fundamentals.dii_holding = Some(11.0);
        assert!(matches(&r, &criteria));

        // Equal to the threshold is not above it.
        r.fundamentals.fii_holding = Some(10.0);
        r.fundamentals.dii_holding = Some(10.0);
        assert!(!matches(&r, &criteria));
    }

    #[test]
    fn test_institutional_zero_threshold_needs_some_holding() {
        let criteria = CriteriaSet::new().with(Metric::InstitutionalHolding, Bound::min(0.0));
        assert!(!matches(&record(), &criteria));
    }

    #[test]
    fn test_institutional_max_only_is_unconstrained() {
        let criteria = CriteriaSet::new().with(Metric::InstitutionalHolding, Bound::max(1.0));
        let mut r = record();
        r.fundamentals.fii_holding = Some(50.0);
        assert!(matches(&r, &criteria));
    }

    #[test]
    fn test_institutional_ignores_display_value() {
        let bound = Bound::min(5.0);
        let criteria = CriteriaSet::new().with(Metric::InstitutionalHolding, bound);
        let mut r = record();
        r.fundamentals.fii_holding = Some(5.0);
        r.fundamentals.dii_holding = Some(5.0);

        assert!(bound.contains(Metric::InstitutionalHolding.value(&r)));
        assert!(!matches(&r, &criteria));
        assert_eq!(failed_metrics(&r, &criteria), vec![Metric::InstitutionalHolding]);
    }

    #[test]
    fn test_failed_metrics() {
        let criteria = CriteriaSet::new()
            .with(Metric::Roe, Bound::min(20.0))
            .with(Metric::DebtToEquity, Bound::max(1.0))
            .with(Metric::MarketCap, Bound::min(5000.0));
        assert_eq!(
            failed_metrics(&record(), &criteria),
            vec![Metric::MarketCap, Metric::Roe]
        );
    }
}
