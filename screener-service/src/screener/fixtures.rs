//! Offline reference records.
//!
//! Five large caps with a full fundamentals block, screened instead of live
//! data when a request sets `useFallback`.

use chrono::Utc;

use crate::data::{Fundamentals, QuoteRecord};

struct Fixture {
    symbol: &'static str,
    name: &'static str,
    price: f64,
    market_cap: f64,
    pe_ratio: f64,
    roe: f64,
    debt_to_equity: f64,
    current_ratio: f64,
    sales_growth: f64,
    pat_growth: f64,
    sector: &'static str,
    industry: &'static str,
    volume: u64,
    change: f64,
    change_percent: f64,
    roe_growth: f64,
    opm_growth: f64,
    promoter_holding_change: f64,
    avg_roe_5y: f64,
    fii_holding: f64,
    dii_holding: f64,
}

const FIXTURES: [Fixture; 5] = [
    Fixture {
        symbol: "TCS.NS",
        name: "Tata Consultancy Services Limited",
        price: 4125.30,
        market_cap: 1_500_000.0,
        pe_ratio: 32.1,
        roe: 43.8,
        debt_to_equity: 0.05,
        current_ratio: 4.2,
        sales_growth: 15.8,
        pat_growth: 12.4,
        sector: "Technology",
        industry: "IT Services",
        volume: 1_890_000,
        change: 82.15,
        change_percent: 2.03,
        roe_growth: 2.5,
        opm_growth: 1.8,
        promoter_holding_change: 0.1,
        avg_roe_5y: 38.5,
        fii_holding: 15.2,
        dii_holding: 8.7,
    },
    Fixture {
        symbol: "INFY.NS",
        name: "Infosys Limited",
        price: 1789.50,
        market_cap: 745_000.0,
        pe_ratio: 25.6,
        roe: 31.4,
        debt_to_equity: 0.08,
        current_ratio: 3.8,
        sales_growth: 18.2,
        pat_growth: 15.7,
        sector: "Technology",
        industry: "IT Services",
        volume: 2_340_000,
        change: 25.80,
        change_percent: 1.46,
        roe_growth: 3.2,
        opm_growth: 2.1,
        promoter_holding_change: 0.0,
        avg_roe_5y: 28.9,
        fii_holding: 18.5,
        dii_holding: 12.3,
    },
    Fixture {
        symbol: "HDFCBANK.NS",
        name: "HDFC Bank Limited",
        price: 1654.85,
        market_cap: 1_255_000.0,
        pe_ratio: 18.9,
        roe: 18.2,
        debt_to_equity: 0.68,
        current_ratio: 1.1,
        sales_growth: 23.5,
        pat_growth: 19.8,
        sector: "Financial Services",
        industry: "Banks",
        volume: 3_120_000,
        change: -12.45,
        change_percent: -0.75,
        roe_growth: 1.5,
        opm_growth: 1.2,
        promoter_holding_change: 0.0,
        avg_roe_5y: 16.8,
        fii_holding: 22.1,
        dii_holding: 14.7,
    },
    Fixture {
        symbol: "ASIANPAINT.NS",
        name: "Asian Paints Limited",
        price: 2890.75,
        market_cap: 275_000.0,
        pe_ratio: 52.3,
        roe: 25.4,
        debt_to_equity: 0.15,
        current_ratio: 2.8,
        sales_growth: 14.2,
        pat_growth: 16.3,
        sector: "Consumer Discretionary",
        industry: "Paints",
        volume: 890_000,
        change: 35.20,
        change_percent: 1.23,
        roe_growth: 2.8,
        opm_growth: 1.5,
        promoter_holding_change: 0.2,
        avg_roe_5y: 22.1,
        fii_holding: 16.8,
        dii_holding: 9.4,
    },
    Fixture {
        symbol: "HINDUNILVR.NS",
        name: "Hindustan Unilever Limited",
        price: 2456.30,
        market_cap: 575_000.0,
        pe_ratio: 58.2,
        roe: 85.4,
        debt_to_equity: 0.22,
        current_ratio: 1.9,
        sales_growth: 11.8,
        pat_growth: 14.5,
        sector: "Consumer Staples",
        industry: "Personal Products",
        volume: 1_250_000,
        change: 18.90,
        change_percent: 0.78,
        roe_growth: 5.2,
        opm_growth: 0.8,
        promoter_holding_change: 0.0,
        avg_roe_5y: 78.2,
        fii_holding: 14.3,
        dii_holding: 11.8,
    },
];

impl Fixture {
    fn to_record(&self) -> QuoteRecord {
        QuoteRecord {
            symbol: self.symbol.to_string(),
            name: self.name.to_string(),
            price: self.price,
            market_cap: self.market_cap,
            pe_ratio: self.pe_ratio,
            roe: self.roe,
            debt_to_equity: self.debt_to_equity,
            current_ratio: self.current_ratio,
            sector: self.sector.to_string(),
            industry: self.industry.to_string(),
            volume: self.volume,
            change: self.change,
            change_percent: self.change_percent,
            high_52w: 0.0,
            low_52w: 0.0,
            fundamentals: Fundamentals {
                roe_growth: Some(self.roe_growth),
                opm_growth: Some(self.opm_growth),
                pat_growth: Some(self.pat_growth),
                sales_growth: Some(self.sales_growth),
                pledged_percent: Some(0.0),
                promoter_holding_change: Some(self.promoter_holding_change),
                avg_roe_5y: Some(self.avg_roe_5y),
                fii_holding: Some(self.fii_holding),
                dii_holding: Some(self.dii_holding),
            },
            fetched_at: Utc::now(),
        }
    }
}

/// The fixture records, in a fixed order.
pub fn fixture_records() -> Vec<QuoteRecord> {
    FIXTURES.iter().map(Fixture::to_record).collect()
}
