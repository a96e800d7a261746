//! Marketing channel catalog.
//!
//! Channels are static: cost per 1,000 units, a per-round spend cap, the
//! trend class that bends efficiency over successive rounds, and an
//! optional special effect. The catalog is built once and never mutated.
//!
//! ```
//! use growthlab_logic::channels::{ChannelCatalog, TrendClass};
//!
//! let catalog = ChannelCatalog::standard();
//! let tv = catalog.get("tv").unwrap();
//! assert_eq!(tv.trend, TrendClass::Decreasing);
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{LabError, Result};

/// How a channel's efficiency moves from round to round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendClass {
    Stable = 0,
    Decreasing = 1,
    Increasing = 2,
    Volatile = 3,
}

impl TrendClass {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(TrendClass::Stable),
            1 => Some(TrendClass::Decreasing),
            2 => Some(TrendClass::Increasing),
            3 => Some(TrendClass::Volatile),
            _ => None,
        }
    }
}

/// Extra behavior layered on top of the trend curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialEffect {
    None = 0,
    /// Efficiency grows by 10% per round after the first.
    MomentumBonus = 1,
    /// Marker for channels that crowd out quickly. Carries no multiplier.
    SaturationRisk = 2,
}

impl SpecialEffect {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(SpecialEffect::None),
            1 => Some(SpecialEffect::MomentumBonus),
            2 => Some(SpecialEffect::SaturationRisk),
            _ => None,
        }
    }
}

/// One marketing channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    /// Currency units per 1,000 units of reach. Always > 0.
    pub cost_per_thousand: u64,
    /// Per-round spend cap shown to players. Not enforced by the resolver.
    pub max_spend: u64,
    pub trend: TrendClass,
    pub effect: SpecialEffect,
}

impl Channel {
    pub fn new(
        id: &str,
        name: &str,
        cost_per_thousand: u64,
        max_spend: u64,
        trend: TrendClass,
        effect: SpecialEffect,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            cost_per_thousand,
            max_spend,
            trend,
            effect,
        }
    }
}

/// Read-only lookup of channels by id, in display order.
///
/// Deserializes from a plain channel list through [`ChannelCatalog::new`],
/// so a decoded catalog is always valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Channel>", into = "Vec<Channel>")]
pub struct ChannelCatalog {
    channels: Vec<Channel>,
}

impl ChannelCatalog {
    /// Build a catalog, rejecting duplicate ids and zero costs.
    pub fn new(channels: Vec<Channel>) -> Result<Self> {
        let catalog = Self { channels };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Empty catalogs, duplicate ids and zero costs are errors.
    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(LabError::InvalidConfig("channel catalog is empty".into()));
        }
        let mut seen = BTreeSet::new();
        for ch in &self.channels {
            if !seen.insert(ch.id.as_str()) {
                return Err(LabError::InvalidConfig(format!(
                    "duplicate channel id {}",
                    ch.id
                )));
            }
            if ch.cost_per_thousand == 0 {
                return Err(LabError::InvalidConfig(format!(
                    "channel {} has zero cost",
                    ch.id
                )));
            }
        }
        Ok(())
    }

    /// The standard six-channel lab catalog.
    pub fn standard() -> Self {
        use SpecialEffect as E;
        use TrendClass as T;
        Self {
            channels: vec![
                Channel::new("search_ads", "Search Ads", 150_000, 3_000_000, T::Stable, E::None),
                Channel::new("social_ads", "Social Media Ads", 100_000, 4_000_000, T::Decreasing, E::SaturationRisk),
                Channel::new("influencers", "Influencer Campaigns", 120_000, 2_500_000, T::Volatile, E::None),
                Channel::new("content", "Content Marketing", 200_000, 2_000_000, T::Increasing, E::MomentumBonus),
                Channel::new("tv", "TV & Radio", 250_000, 5_000_000, T::Decreasing, E::None),
                Channel::new("referral", "Referral Program", 180_000, 1_500_000, T::Stable, E::MomentumBonus),
            ],
        }
    }

    pub fn get(&self, id: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl TryFrom<Vec<Channel>> for ChannelCatalog {
    type Error = LabError;

    fn try_from(channels: Vec<Channel>) -> Result<Self> {
        Self::new(channels)
    }
}

impl From<ChannelCatalog> for Vec<Channel> {
    fn from(catalog: ChannelCatalog) -> Self {
        catalog.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_catalog_is_valid() {
        let standard = ChannelCatalog::standard();
        let rebuilt = ChannelCatalog::new(standard.iter().cloned().collect()).unwrap();
        assert_eq!(rebuilt, standard);
        assert_eq!(standard.len(), 6);
    }

    #[test]
    fn every_trend_class_is_represented() {
        let catalog = ChannelCatalog::standard();
        for trend in [
            TrendClass::Stable,
            TrendClass::Decreasing,
            TrendClass::Increasing,
            TrendClass::Volatile,
        ] {
            assert!(catalog.iter().any(|c| c.trend == trend), "{:?}", trend);
        }
    }

    #[test]
    fn rejects_duplicate_ids() {
        let ch = Channel::new("a", "A", 1, 1, TrendClass::Stable, SpecialEffect::None);
        let err = ChannelCatalog::new(vec![ch.clone(), ch]).unwrap_err();
        assert!(matches!(err, LabError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_zero_cost() {
        let ch = Channel::new("a", "A", 0, 1, TrendClass::Stable, SpecialEffect::None);
        assert!(ChannelCatalog::new(vec![ch]).is_err());
    }

    #[test]
    fn decoding_goes_through_validation() {
        let json = serde_json::to_string(&ChannelCatalog::standard()).unwrap();
        assert!(json.starts_with('['));
        let back: ChannelCatalog = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ChannelCatalog::standard());

        let ch = Channel::new("a", "A", 0, 1, TrendClass::Stable, SpecialEffect::None);
        let bad = serde_json::to_string(&vec![ch]).unwrap();
        assert!(serde_json::from_str::<ChannelCatalog>(&bad).is_err());
    }

    #[test]
    fn unknown_id_is_absent() {
        assert!(ChannelCatalog::standard().get("carrier_pigeon").is_none());
    }

    #[test]
    fn u8_conversions() {
        for v in 0..4u8 {
            assert_eq!(TrendClass::from_u8(v).unwrap().as_u8(), v);
        }
        assert_eq!(TrendClass::from_u8(9), None);
        assert_eq!(SpecialEffect::from_u8(1), Some(SpecialEffect::MomentumBonus));
        assert_eq!(SpecialEffect::from_u8(7), None);
    }
}
