//! Vehicle count to traffic density tier.

use serde::Serialize;

/// Counts above this are at least Green.
pub const GREEN_THRESHOLD: u32 = 1;
/// Counts above this are at least Orange.
pub const ORANGE_THRESHOLD: u32 = 7;
/// Counts above this are at least DarkRed.
pub const DARK_RED_THRESHOLD: u32 = 14;
/// Counts above this are Black.
pub const BLACK_THRESHOLD: u32 = 25;

/// Traffic severity bucket, ordered from least to most congested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DensityTier {
    None,
    Green,
    Orange,
    DarkRed,
    Black,
}

impl DensityTier {
    pub const ALL: [DensityTier; 5] = [
        DensityTier::None,
        DensityTier::Green,
        DensityTier::Orange,
        DensityTier::DarkRed,
        DensityTier::Black,
    ];

    /// Map color name understood by the renderer.
    pub fn color(self) -> &'static str {
        match self {
            DensityTier::None => "white",
            DensityTier::Green => "green",
            DensityTier::Orange => "orange",
            DensityTier::DarkRed => "darkred",
            DensityTier::Black => "black",
        }
    }
}

/// Classify a vehicle count. Total over every `u32`.
pub fn classify(count: u32) -> DensityTier {
    if count > BLACK_THRESHOLD {
        DensityTier::Black
    } else if count > DARK_RED_THRESHOLD {
        DensityTier::DarkRed
    } else if count > ORANGE_THRESHOLD {
        DensityTier::Orange
    } else if count > GREEN_THRESHOLD {
        DensityTier::Green
    } else {
        DensityTier::None
    }
}

/// Unset counts are excluded from classification rather than treated as zero.
pub fn classify_optional(count: Option<u32>) -> Option<DensityTier> {
    count.map(classify)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_follow_strictly_greater_thresholds() {
        let cases = [
            (0, DensityTier::None),
            (1, DensityTier::None),
            (2, DensityTier::Green),
            (7, DensityTier::Green),
            (8, DensityTier::Orange),
            (14, DensityTier::Orange),
            (15, DensityTier::DarkRed),
            (25, DensityTier::DarkRed),
            (26, DensityTier::Black),
            (u32::MAX, DensityTier::Black),
        ];
        for (count, tier) in cases {
            assert_eq!(classify(count), tier, "count {}", count);
        }
    }

    #[test]
    fn classification_is_monotonic() {
        let mut previous = classify(0);
        for count in 1..=200 {
            let tier = classify(count);
            assert!(tier >= previous, "tier dropped at count {}", count);
            previous = tier;
        }
    }

    #[test]
    fn unset_count_has_no_tier_but_zero_does() {
        assert_eq!(classify_optional(None), None);
        assert_eq!(classify_optional(Some(0)), Some(DensityTier::None));
    }

    #[test]
    fn colors_are_distinct() {
        let mut colors: Vec<_> = DensityTier::ALL.iter().map(|t| t.color()).collect();
        colors.sort_unstable();
        colors.dedup();
        assert_eq!(colors.len(), DensityTier::ALL.len());
    }
}
