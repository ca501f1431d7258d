//! Multi-timeframe fusion records embedded in a snapshot's interpretation

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::snapshot::PeriodType;

/// Business-question framing used to weight and interpret fused signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecisionLens {
    #[default]
    Earnings,
    #[serde(rename = "ma")]
    MergersAcquisitions,
    CorporateStrategy,
    CapitalAllocation,
    ProductLaunch,
    CrisisManagement,
    InvestorRelations,
    CompetitivePositioning,
}

impl DecisionLens {
    pub const ALL: [DecisionLens; 8] = [
        DecisionLens::Earnings,
        DecisionLens::MergersAcquisitions,
        DecisionLens::CorporateStrategy,
        DecisionLens::CapitalAllocation,
        DecisionLens::ProductLaunch,
        DecisionLens::CrisisManagement,
        DecisionLens::InvestorRelations,
        DecisionLens::CompetitivePositioning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionLens::Earnings => "earnings",
            DecisionLens::MergersAcquisitions => "ma",
            DecisionLens::CorporateStrategy => "corporate_strategy",
            DecisionLens::CapitalAllocation => "capital_allocation",
            DecisionLens::ProductLaunch => "product_launch",
            DecisionLens::CrisisManagement => "crisis_management",
            DecisionLens::InvestorRelations => "investor_relations",
            DecisionLens::CompetitivePositioning => "competitive_positioning",
        }
    }

    /// Long-horizon lenses where intraday noise is excluded by default
    pub fn is_strategic(&self) -> bool {
        matches!(
            self,
            DecisionLens::MergersAcquisitions
                | DecisionLens::CorporateStrategy
                | DecisionLens::CapitalAllocation
        )
    }

    /// Base period weights before safety rails; each row sums to 1
    pub fn base_weights(&self) -> PeriodWeights {
        let (hourly, daily, weekly, monthly) = match self {
            DecisionLens::Earnings => (0.30, 0.35, 0.20, 0.15),
            DecisionLens::MergersAcquisitions => (0.05, 0.20, 0.35, 0.40),
            DecisionLens::CorporateStrategy => (0.05, 0.15, 0.35, 0.45),
            DecisionLens::CapitalAllocation => (0.05, 0.20, 0.35, 0.40),
            DecisionLens::ProductLaunch => (0.25, 0.35, 0.25, 0.15),
            DecisionLens::CrisisManagement => (0.40, 0.35, 0.15, 0.10),
            DecisionLens::InvestorRelations => (0.15, 0.30, 0.30, 0.25),
            DecisionLens::CompetitivePositioning => (0.10, 0.25, 0.35, 0.30),
        };
        PeriodWeights { hourly, daily, weekly, monthly }
    }
}

impl fmt::Display for DecisionLens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecisionLens {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        DecisionLens::ALL
            .iter()
            .find(|lens| lens.as_str() == wanted)
            .copied()
            .ok_or_else(|| format!("Unknown decision lens: {}", s))
    }
}

/// One weight per period type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PeriodWeights {
    pub hourly: f64,
    pub daily: f64,
    pub weekly: f64,
    pub monthly: f64,
}

impl PeriodWeights {
    pub fn get(&self, period: PeriodType) -> f64 {
        match period {
            PeriodType::Hourly => self.hourly,
            PeriodType::Daily => self.daily,
            PeriodType::Weekly => self.weekly,
            PeriodType::Monthly => self.monthly,
        }
    }

    pub fn set(&mut self, period: PeriodType, weight: f64) {
        match period {
            PeriodType::Hourly => self.hourly = weight,
            PeriodType::Daily => self.daily = weight,
            PeriodType::Weekly => self.weekly = weight,
            PeriodType::Monthly => self.monthly = weight,
        }
    }

    pub fn sum(&self) -> f64 {
        self.hourly + self.daily + self.weekly + self.monthly
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PersistenceClass {
    Structural,
    EventDriven,
    Emerging,
}

/// How durably a narrative recurs across recent daily snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativePersistence {
    pub narrative_id: String,
    pub weekly_presence_pct: f64,
    pub monthly_presence_pct: f64,
    pub classification: PersistenceClass,
    pub first_seen_date: Option<NaiveDate>,
    pub days_active: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemporalConsistency {
    High,
    #[default]
    Moderate,
    Low,
}

impl TemporalConsistency {
    pub fn stability_score(&self) -> f64 {
        match self {
            TemporalConsistency::High => 0.9,
            TemporalConsistency::Moderate => 0.6,
            TemporalConsistency::Low => 0.3,
        }
    }
}

/// Age of the sibling snapshot used for one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodFreshness {
    pub snapshot_start: DateTime<Utc>,
    pub age_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DataFreshness {
    pub hourly: Option<PeriodFreshness>,
    pub daily: Option<PeriodFreshness>,
    pub weekly: Option<PeriodFreshness>,
    pub monthly: Option<PeriodFreshness>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConfidenceBasis {
    pub timeframe_agreement: TemporalConsistency,
    pub narrative_persistence_ratio: f64,
    pub velocity_alignment: bool,
    pub hourly_override_active: bool,
    pub hourly_override_reason: Option<String>,
}

/// Why the composite weighs the periods the way it does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TemporalAttribution {
    pub weights_applied: PeriodWeights,
    pub effective_weights: PeriodWeights,
    /// Set when every effective weight was zero and uniform weights were used
    #[serde(default)]
    pub fallback_applied: bool,
    pub data_freshness: DataFreshness,
    pub confidence_basis: ConfidenceBasis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeNarrative {
    pub id: String,
    pub label: String,
    pub weighted_score: f64,
    pub periods: Vec<PeriodType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeEmotion {
    pub emotion: String,
    pub weighted_intensity: f64,
    pub periods: Vec<PeriodType>,
}

/// Weighted view across the four horizons
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TemporalComposite {
    pub decision_lens: DecisionLens,
    pub narratives: Vec<CompositeNarrative>,
    pub emotions: Vec<CompositeEmotion>,
    pub temporal_consistency: TemporalConsistency,
    pub stability_score: f64,
    pub attribution: TemporalAttribution,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_base_table_sums_to_one() {
        for lens in DecisionLens::ALL {
            let sum = lens.base_weights().sum();
            assert!((sum - 1.0).abs() < 1e-9, "{} sums to {}", lens, sum);
        }
    }

    #[test]
    fn test_lens_round_trip_names() {
        for lens in DecisionLens::ALL {
            assert_eq!(lens.as_str().parse::<DecisionLens>(), Ok(lens));
            let json = serde_json::to_string(&lens).unwrap();
            assert_eq!(json, format!("\"{}\"", lens.as_str()));
        }
    }

    #[test]
    fn test_strategic_lenses() {
        let strategic: Vec<_> = DecisionLens::ALL.iter().filter(|l| l.is_strategic()).collect();
        assert_eq!(strategic.len(), 3);
        assert!("ma".parse::<DecisionLens>().unwrap().is_strategic());
        assert!(!DecisionLens::Earnings.is_strategic());
    }

    #[test]
    fn test_persistence_class_serializes_kebab() {
        assert_eq!(
            serde_json::to_string(&PersistenceClass::EventDriven).unwrap(),
            "\"event-driven\""
        );
    }
}
