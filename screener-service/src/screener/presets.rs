//! Named criteria sets.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use screener_common::PresetConfig;

use super::criteria::{Bound, CriteriaError, CriteriaSet, Metric};

/// A named, described criteria set.
#[derive(Debug, Clone, Serialize)]
pub struct Preset {
    #[serde(skip)]
    pub id: String,
    pub name: String,
    pub description: String,
    pub criteria: CriteriaSet,
}

impl Preset {
    fn new(id: &str, name: &str, description: &str, criteria: CriteriaSet) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            criteria,
        }
    }

    /// Build a preset from its configuration form.
    pub fn from_config(id: &str, config: &PresetConfig) -> Result<Self, CriteriaError> {
        let parsed = CriteriaSet::from_json(&config.criteria)?;
        Ok(Self {
            id: id.to_string(),
            name: config.name.clone(),
            description: config.description.clone(),
            criteria: parsed.criteria,
        })
    }
}

/// Presets keyed by id.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct PresetCatalog {
    presets: BTreeMap<String, Preset>,
}

impl PresetCatalog {
    /// The built-in catalog.
    pub fn builtin() -> Self {
        let presets = [
            Preset::new(
                "your_custom_criteria",
                "Your Custom Criteria (All 11 Filters)",
                "ROE, growth, leverage, pledging and holding filters from the watchlist screen",
                CriteriaSet::new()
                    .with(Metric::Roe, Bound::min(14.0))
                    .with(Metric::RoeGrowth, Bound::min(0.0))
                    .with(Metric::OpmGrowth, Bound::min(0.0))
                    .with(Metric::DebtToEquity, Bound::max(1.0))
                    .with(Metric::PledgedPercent, Bound::max(0.0))
                    .with(Metric::PatGrowth, Bound::min(0.0))
                    .with(Metric::SalesGrowth, Bound::min(0.0))
                    .with(Metric::MarketCap, Bound::min(200.0))
                    .with(Metric::PromoterHoldingChange, Bound::min(0.0))
                    .with(Metric::AvgRoe5y, Bound::min(14.0))
                    .with(Metric::InstitutionalHolding, Bound::min(0.0)),
            ),
            Preset::new(
                "quality_stocks",
                "Quality Stocks",
                "High-quality companies with strong financials",
                CriteriaSet::new()
                    .with(Metric::MarketCap, Bound::min(1000.0))
                    .with(Metric::PeRatio, Bound::range(10.0, 30.0))
                    .with(Metric::Roe, Bound::min(15.0))
                    .with(Metric::DebtToEquity, Bound::max(1.0))
                    .with(Metric::CurrentRatio, Bound::min(1.2)),
            ),
            Preset::new(
                "large_cap_stable",
                "Large Cap Stable",
                "Large cap stocks with stable growth",
                CriteriaSet::new()
                    .with(Metric::MarketCap, Bound::min(50000.0))
                    .with(Metric::PeRatio, Bound::range(15.0, 25.0))
                    .with(Metric::Roe, Bound::min(12.0))
                    .with(Metric::DebtToEquity, Bound::max(0.5)),
            ),
            Preset::new(
                "mid_cap_growth",
                "Mid Cap Growth",
                "Mid cap stocks with high growth potential",
                CriteriaSet::new()
                    .with(Metric::MarketCap, Bound::range(5000.0, 50000.0))
                    .with(Metric::Roe, Bound::min(18.0))
                    .with(Metric::SalesGrowth, Bound::min(15.0))
                    .with(Metric::PatGrowth, Bound::min(12.0)),
            ),
            Preset::new(
                "dividend_aristocrats",
                "Dividend Aristocrats",
                "Consistent dividend paying companies",
                CriteriaSet::new()
                    .with(Metric::MarketCap, Bound::min(10000.0))
                    .with(Metric::Roe, Bound::min(12.0))
                    .with(Metric::DebtToEquity, Bound::max(0.8))
                    .with(Metric::CurrentRatio, Bound::min(1.5)),
            ),
        ];

        Self {
            presets: presets.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    /// Built-ins plus configured presets; configured ids replace built-ins.
    pub fn with_overrides(
        overrides: &HashMap<String, PresetConfig>,
    ) -> Result<Self, (String, CriteriaError)> {
        let mut catalog = Self::builtin();
        for (id, config) in overrides {
            let preset = Preset::from_config(id, config).map_err(|e| (id.clone(), e))?;
            catalog.presets.insert(id.clone(), preset);
        }
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Option<&Preset> {
        self.presets.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

impl Default for PresetCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
