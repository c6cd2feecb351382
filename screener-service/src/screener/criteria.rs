//! Screening criteria.
//!
//! A `CriteriaSet` maps a closed set of metrics to inclusive numeric bounds.
//! Request bodies are parsed once into this form; unknown keys are set aside
//! and malformed bounds are rejected before any data is fetched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::data::QuoteRecord;

// ============================================================================
// Metric
// ============================================================================

/// A metric a criterion can constrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Metric {
    MarketCap,
    Roe,
    RoeGrowth,
    OpmGrowth,
    DebtToEquity,
    PledgedPercent,
    PatGrowth,
    SalesGrowth,
    PromoterHoldingChange,
    AvgRoe5y,
    /// FII or DII holding above a threshold
    InstitutionalHolding,
    PeRatio,
    CurrentRatio,
}

impl Metric {
    pub const ALL: [Metric; 13] = [
        Metric::MarketCap,
        Metric::Roe,
        Metric::RoeGrowth,
        Metric::OpmGrowth,
        Metric::DebtToEquity,
        Metric::PledgedPercent,
        Metric::PatGrowth,
        Metric::SalesGrowth,
        Metric::PromoterHoldingChange,
        Metric::AvgRoe5y,
        Metric::InstitutionalHolding,
        Metric::PeRatio,
        Metric::CurrentRatio,
    ];

    /// Canonical request key
    pub const fn key(self) -> &'static str {
        match self {
            Metric::MarketCap => "marketCap",
            Metric::Roe => "roe",
            Metric::RoeGrowth => "roe_growth",
            Metric::OpmGrowth => "opm_growth",
            Metric::DebtToEquity => "debtToEquity",
            Metric::PledgedPercent => "pledged_percent",
            Metric::PatGrowth => "pat_growth",
            Metric::SalesGrowth => "sales_growth",
            Metric::PromoterHoldingChange => "promoter_holding_change",
            Metric::AvgRoe5y => "avg_roe_5y",
            Metric::InstitutionalHolding => "institutional_holding",
            Metric::PeRatio => "peRatio",
            Metric::CurrentRatio => "currentRatio",
        }
    }

    /// Resolve a request key, accepting the camelCase and snake_case spellings
    /// clients send.
    pub fn from_key(key: &str) -> Option<Self> {
        let metric = match key {
            "marketCap" | "market_cap" => Metric::MarketCap,
            "roe" => Metric::Roe,
            "roe_growth" | "roeGrowth" => Metric::RoeGrowth,
            "opm_growth" | "omp_growth" | "opmGrowth" => Metric::OpmGrowth,
            "debtToEquity" | "debt_to_equity" => Metric::DebtToEquity,
            "pledged_percent" | "pledgedPercent" => Metric::PledgedPercent,
            "pat_growth" | "patGrowth" | "profitGrowth" | "profit_growth" => Metric::PatGrowth,
            "sales_growth" | "salesGrowth" => Metric::SalesGrowth,
            "promoter_holding_change" | "promoterHoldingChange" => {
                Metric::PromoterHoldingChange
            }
            "avg_roe_5y" | "avgRoe5y" => Metric::AvgRoe5y,
            "institutional_holding" | "institutionalHolding" => Metric::InstitutionalHolding,
            "peRatio" | "pe_ratio" => Metric::PeRatio,
            "currentRatio" | "current_ratio" => Metric::CurrentRatio,
            _ => return None,
        };
        Some(metric)
    }

    /// Value of this metric on a record; unreported fundamentals read as 0.
    ///
    /// `InstitutionalHolding` has no single value and reads as the larger of
    /// the FII and DII holdings. That reading is for display only: the
    /// evaluator checks each holding strictly against the threshold and never
    /// calls this for that metric.
    pub fn value(self, record: &QuoteRecord) -> f64 {
        let f = &record.fundamentals;
        match self {
            Metric::MarketCap => record.market_cap,
            Metric::Roe => record.roe,
            Metric::DebtToEquity => record.debt_to_equity,
            Metric::PeRatio => record.pe_ratio,
            Metric::CurrentRatio => record.current_ratio,
            Metric::RoeGrowth => f.roe_growth.unwrap_or(0.0),
            Metric::OpmGrowth => f.opm_growth.unwrap_or(0.0),
            Metric::PledgedPercent => f.pledged_percent.unwrap_or(0.0),
            Metric::PatGrowth => f.pat_growth.unwrap_or(0.0),
            Metric::SalesGrowth => f.sales_growth.unwrap_or(0.0),
            Metric::PromoterHoldingChange => f.promoter_holding_change.unwrap_or(0.0),
            Metric::AvgRoe5y => f.avg_roe_5y.unwrap_or(0.0),
            Metric::InstitutionalHolding => f
                .fii_holding
                .unwrap_or(0.0)
                .max(f.dii_holding.unwrap_or(0.0)),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ============================================================================
// Bound
// ============================================================================

/// Inclusive bounds on a metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl Bound {
    pub const fn min(min: f64) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    pub const fn max(max: f64) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    pub const fn range(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Whether a value lies within the bounds.
    pub fn contains(&self, value: f64) -> bool {
        !(self.min.is_some_and(|min| value < min) || self.max.is_some_and(|max| value > max))
    }
}

// ============================================================================
// Criteria Set
// ============================================================================

/// Why a criteria body was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CriteriaError {
    #[error("criteria must be a JSON object")]
    NotAnObject,

    #[error("criterion '{key}' must be an object with min and/or max")]
    BoundNotAnObject { key: String },

    #[error("criterion '{key}': '{field}' must be a number")]
    NotNumeric { key: String, field: &'static str },

    #[error("criterion '{key}': min {min} exceeds max {max}")]
    Inverted { key: String, min: f64, max: f64 },
}

/// Metric bounds, evaluated conjunctively.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CriteriaSet {
    bounds: BTreeMap<Metric, Bound>,
}

/// A parsed criteria body plus the keys that were not recognized.
#[derive(Debug, Clone, Default)]
pub struct ParsedCriteria {
    pub criteria: CriteriaSet,
    pub ignored_keys: Vec<String>,
}

impl CriteriaSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, metric: Metric, bound: Bound) -> Self {
        self.bounds.insert(metric, bound);
        self
    }

    pub fn insert(&mut self, metric: Metric, bound: Bound) {
        self.bounds.insert(metric, bound);
    }

    pub fn get(&self, metric: Metric) -> Option<&Bound> {
        self.bounds.get(&metric)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, &Bound)> {
        self.bounds.iter().map(|(m, b)| (*m, b))
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    /// Parse a request value. Anything but an object is rejected.
    pub fn from_value(value: &Value) -> Result<ParsedCriteria, CriteriaError> {
        match value {
            Value::Object(map) => Self::from_json(map),
            _ => Err(CriteriaError::NotAnObject),
        }
    }

    /// Parse a criteria object such as `{"roe": {"min": 15}}`.
    pub fn from_json(map: &Map<String, Value>) -> Result<ParsedCriteria, CriteriaError> {
        let mut parsed = ParsedCriteria::default();

        for (key, raw) in map {
            let Some(metric) = Metric::from_key(key) else {
                parsed.ignored_keys.push(key.clone());
                continue;
            };

            let Value::Object(fields) = raw else {
                return Err(CriteriaError::BoundNotAnObject { key: key.clone() });
            };

            let bound = Bound {
                min: numeric_field(key, fields, "min")?,
                max: numeric_field(key, fields, "max")?,
            };
            if let (Some(min), Some(max)) = (bound.min, bound.max) {
                if min > max {
                    return Err(CriteriaError::Inverted {
                        key: key.clone(),
                        min,
                        max,
                    });
                }
            }

            parsed.criteria.insert(metric, bound);
        }

        if !parsed.ignored_keys.is_empty() {
            tracing::warn!(keys = ?parsed.ignored_keys, "Ignoring unknown criteria keys");
        }
        Ok(parsed)
    }

    /// Canonical JSON form, keyed by each metric's canonical key.
    pub fn to_json(&self) -> Map<String, Value> {
        self.bounds
            .iter()
            .map(|(metric, bound)| {
                (
                    metric.key().to_string(),
                    serde_json::to_value(bound).unwrap_or(Value::Null),
                )
            })
            .collect()
    }
}

/// `null` and absent both mean "no bound".
fn numeric_field(
    key: &str,
    fields: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<f64>, CriteriaError> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_f64().map(Some).ok_or_else(|| CriteriaError::NotNumeric {
            key: key.to_string(),
            field,
        }),
    }
}

impl Serialize for CriteriaSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Result<ParsedCriteria, CriteriaError> {
        CriteriaSet::from_value(&value)
    }

    #[test]
    fn test_aliases_resolve_to_one_metric() {
        for key in ["marketCap", "market_cap"] {
            assert_eq!(Metric::from_key(key), Some(Metric::MarketCap));
        }
        assert_eq!(Metric::from_key("profitGrowth"), Some(Metric::PatGrowth));
        assert_eq!(Metric::from_key("omp_growth"), Some(Metric::OpmGrowth));
        assert_eq!(Metric::from_key("dividendYield"), None);
    }

    #[test]
    fn test_canonical_keys_round_trip() {
        for metric in Metric::ALL {
            assert_eq!(Metric::from_key(metric.key()), Some(metric));
        }
    }

    #[test]
    fn test_parse_bounds_and_ignored_keys() {
        let parsed = parse(json!({
            "roe": {"min": 14},
            "debtToEquity": {"max": 1},
            "peRatio": {"min": 10, "max": 30},
            "dividendYield": {"min": 2}
        }))
        .unwrap();

        assert_eq!(parsed.criteria.len(), 3);
        assert_eq!(parsed.criteria.get(Metric::Roe), Some(&Bound::min(14.0)));
        assert_eq!(
            parsed.criteria.get(Metric::PeRatio),
            Some(&Bound::range(10.0, 30.0))
        );
        assert_eq!(parsed.ignored_keys, vec!["dividendYield".to_string()]);
    }

    #[test]
    fn test_null_bounds_are_absent() {
        let parsed = parse(json!({"roe": {"min": null, "max": 40}})).unwrap();
        assert_eq!(parsed.criteria.get(Metric::Roe), Some(&Bound::max(40.0)));
    }

    #[test]
    fn test_malformed_criteria() {
        assert_eq!(parse(json!([1, 2])).unwrap_err(), CriteriaError::NotAnObject);
        assert!(matches!(
            parse(json!({"roe": 15})).unwrap_err(),
            CriteriaError::BoundNotAnObject { .. }
        ));
        assert!(matches!(
            parse(json!({"roe": {"min": "15"}})).unwrap_err(),
            CriteriaError::NotNumeric { field: "min", .. }
        ));
        assert!(matches!(
            parse(json!({"roe": {"min": 20, "max": 10}})).unwrap_err(),
            CriteriaError::Inverted { .. }
        ));
    }

    #[test]
    fn test_bound_contains_is_inclusive() {
        let bound = Bound::range(10.0, 30.0);
        assert!(bound.contains(10.0));
        assert!(bound.contains(30.0));
        assert!(!bound.contains(9.99));
        assert!(!bound.contains(30.01));
        assert!(Bound::default().contains(f64::MIN));
    }

    #[test]
    fn test_to_json_uses_canonical_keys() {
        let criteria = CriteriaSet::new()
            .with(Metric::SalesGrowth, Bound::min(15.0))
            .with(Metric::MarketCap, Bound::range(5000.0, 50000.0));
        let json = Value::Object(criteria.to_json());
        assert_eq!(json["sales_growth"], json!({"min": 15.0}));
        assert_eq!(json["marketCap"]["max"], 50000.0);
    }
}
