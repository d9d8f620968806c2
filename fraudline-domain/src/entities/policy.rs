// Scoring policy
// Every threshold the rules compare against; loaded from config or a rules file

use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

pub const DEFAULT_FRAUD_THRESHOLD: f64 = 70.0;
pub const MAX_SCORE: u32 = 100;
/// Seven days.
pub const MAX_VELOCITY_WINDOW_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band<T> {
    pub min: T,
    pub points: u32,
}

impl<T> Band<T> {
    pub fn new(min: T, points: u32) -> Self {
        Self { min, points }
    }
}

/// Points for the highest band whose `min` the value reaches.
pub fn band_points<T: PartialOrd>(bands: &[Band<T>], value: &T) -> u32 {
    let mut best: Option<&Band<T>> = None;
    for band in bands.iter().filter(|band| *value >= band.min) {
        match best {
            Some(current) if current.min >= band.min => {}
            _ => best = Some(band),
        }
    }
    best.map(|band| band.points).unwrap_or(0)
}

/// Inclusive hour-of-day range; the first matching band wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourBand {
    pub from: u32,
    pub to: u32,
    pub points: u32,
}

impl HourBand {
    pub fn contains(&self, hour: u32) -> bool {
        hour >= self.from && hour <= self.to
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalBasis {
    /// Wall clock at evaluation time.
    #[default]
    ProcessingTime,
    /// The transaction's own creation timestamp.
    TransactionTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefixRisk {
    pub high_risk: Vec<String>,
    pub high_risk_points: u32,
    pub private: Vec<String>,
    pub private_points: u32,
}

impl Default for PrefixRisk {
    fn default() -> Self {
        Self {
            high_risk: vec!["45.".to_string(), "185.".to_string()],
            high_risk_points: 20,
            private: vec!["10.".to_string(), "172.".to_string(), "192.168.".to_string()],
            private_points: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryRisk {
    pub high_risk: Vec<String>,
    pub high_risk_points: u32,
    pub medium_risk: Vec<String>,
    pub medium_risk_points: u32,
}

impl Default for CategoryRisk {
    fn default() -> Self {
        Self {
            high_risk: vec![
                "Wire Transfer".to_string(),
                "Cryptocurrency".to_string(),
                "Gift Cards".to_string(),
                "Money Services".to_string(),
            ],
            high_risk_points: 15,
            medium_risk: vec![
                "Electronics".to_string(),
                "Jewelry".to_string(),
                "Travel".to_string(),
            ],
            medium_risk_points: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    pub fraud_threshold: f64,
    pub temporal_basis: TemporalBasis,
    /// Clock the hour bands are read in; system local time when unset.
    pub utc_offset_minutes: Option<i32>,
    pub velocity_window_minutes: i64,
    pub amount_bands: Vec<Band<Decimal>>,
    pub count_bands: Vec<Band<u64>>,
    pub volume_bands: Vec<Band<Decimal>>,
    pub history_bands: Vec<Band<u64>>,
    pub hour_bands: Vec<HourBand>,
    pub ip_prefixes: PrefixRisk,
    pub categories: CategoryRisk,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            fraud_threshold: DEFAULT_FRAUD_THRESHOLD,
            temporal_basis: TemporalBasis::ProcessingTime,
            utc_offset_minutes: None,
            velocity_window_minutes: 60,
            amount_bands: vec![
                Band::new(dec!(10000.00), 40),
                Band::new(dec!(5000.00), 25),
                Band::new(dec!(2000.00), 10),
            ],
            count_bands: vec![Band::new(10, 30), Band::new(7, 20), Band::new(5, 10)],
            volume_bands: vec![
                Band::new(dec!(20000.00), 25),
                Band::new(dec!(10000.00), 15),
                Band::new(dec!(5000.00), 8),
            ],
            history_bands: vec![Band::new(5, 25), Band::new(3, 18), Band::new(1, 10)],
            hour_bands: vec![
                HourBand { from: 1, to: 5, points: 15 },
                HourBand { from: 23, to: 23, points: 8 },
                HourBand { from: 5, to: 7, points: 8 },
            ],
            ip_prefixes: PrefixRisk::default(),
            categories: CategoryRisk::default(),
        }
    }
}

impl ScoringPolicy {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=f64::from(MAX_SCORE)).contains(&self.fraud_threshold) {
            return Err(anyhow!(
                "fraud threshold must be within 0..={}, got {}",
                MAX_SCORE,
                self.fraud_threshold
            ));
        }
        if !(1..=MAX_VELOCITY_WINDOW_MINUTES).contains(&self.velocity_window_minutes) {
            return Err(anyhow!(
                "velocity_window_minutes must be within 1..={}, got {}",
                MAX_VELOCITY_WINDOW_MINUTES,
                self.velocity_window_minutes
            ));
        }
        if let Some(offset) = self.utc_offset_minutes {
            if offset.abs() >= 24 * 60 {
                return Err(anyhow!("utc_offset_minutes {} out of range", offset));
            }
        }
        if let Some(band) = self.hour_bands.iter().find(|band| band.from > 23 || band.to > 23) {
            return Err(anyhow!("hour band {}..={} out of range", band.from, band.to));
        }
        Ok(())
    }

    /// Drops blank prefix and category entries so they never match everything.
    pub fn normalize(&mut self) {
        for list in [
            &mut self.ip_prefixes.high_risk,
            &mut self.ip_prefixes.private,
            &mut self.categories.high_risk,
            &mut self.categories.medium_risk,
        ] {
            list.retain(|entry| !entry.trim().is_empty());
        }
    }
}
