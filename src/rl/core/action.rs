//! Action Space
//!
//! Discrete trade decisions and the `[target_position, leverage]` pair the
//! environment consumes.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraderError};

/// Number of discrete actions
pub const NUM_DISCRETE_ACTIONS: usize = 7;

/// Lower bounds of the continuous action space `[position, leverage]`
pub const ACTION_LOW: [f64; 2] = [-1.0, 0.0];

/// Upper bounds of the continuous action space `[position, leverage]`
pub const ACTION_HIGH: [f64; 2] = [1.0, 1.0];

/// Leverage applied by every non-hold discrete action
const TRADE_LEVERAGE: f64 = 0.5;

/// Discrete action space used by the DQN agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TradeAction {
    StrongSell = 0,
    MediumSell = 1,
    LightSell = 2,
    Hold = 3,
    LightBuy = 4,
    MediumBuy = 5,
    StrongBuy = 6,
}

impl TradeAction {
    /// Convert from action index
    pub fn from_index(index: usize) -> Result<Self> {
        match index {
            0 => Ok(Self::StrongSell),
            1 => Ok(Self::MediumSell),
            2 => Ok(Self::LightSell),
            3 => Ok(Self::Hold),
            4 => Ok(Self::LightBuy),
            5 => Ok(Self::MediumBuy),
            6 => Ok(Self::StrongBuy),
            _ => Err(TraderError::InvalidAction {
                index,
                max: NUM_DISCRETE_ACTIONS,
            }),
        }
    }

    /// Convert to action index
    pub fn to_index(self) -> usize {
        self as usize
    }

    /// Get all possible actions, ordered by index
    pub fn all() -> &'static [TradeAction] {
        &[
            Self::StrongSell,
            Self::MediumSell,
            Self::LightSell,
            Self::Hold,
            Self::LightBuy,
            Self::MediumBuy,
            Self::StrongBuy,
        ]
    }

    /// Target position for this action
    pub fn target_position(self) -> f64 {
        match self {
            Self::StrongSell => -1.0,
            Self::MediumSell => -0.5,
            Self::LightSell => -0.25,
            Self::Hold => 0.0,
            Self::LightBuy => 0.25,
            Self::MediumBuy => 0.5,
            Self::StrongBuy => 1.0,
        }
    }

    /// Leverage for this action
    pub fn leverage(self) -> f64 {
        match self {
            Self::Hold => 0.0,
            _ => TRADE_LEVERAGE,
        }
    }

    /// Map to the continuous `[position, leverage]` pair
    pub fn to_continuous(self) -> ContinuousAction {
        ContinuousAction::new(self.target_position(), self.leverage())
    }
}

impl Default for TradeAction {
    fn default() -> Self {
        Self::Hold
    }
}

impl TryFrom<usize> for TradeAction {
    type Error = TraderError;

    fn try_from(index: usize) -> Result<Self> {
        Self::from_index(index)
    }
}

/// Continuous action consumed by the environment
///
/// Values are stored as given; the environment clips them to
/// [`ACTION_LOW`]..[`ACTION_HIGH`] before use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContinuousAction {
    /// Desired directional exposure: -1 (full short) to +1 (full long)
    pub position: f64,
    /// Leverage proportion: 0 (none) to 1 (maximum)
    pub leverage: f64,
}

impl Default for ContinuousAction {
    fn default() -> Self {
        TradeAction::Hold.to_continuous()
    }
}

impl ContinuousAction {
    pub fn new(position: f64, leverage: f64) -> Self {
        Self { position, leverage }
    }

    /// Clip to the declared action-space bounds; non-finite components become 0
    pub fn clipped(self) -> Self {
        let clip = |v: f64, lo: f64, hi: f64| if v.is_finite() { v.clamp(lo, hi) } else { 0.0 };
        Self {
            position: clip(self.position, ACTION_LOW[0], ACTION_HIGH[0]),
            leverage: clip(self.leverage, ACTION_LOW[1], ACTION_HIGH[1]),
        }
    }

    pub fn to_array(self) -> [f64; 2] {
        [self.position, self.leverage]
    }
}

impl From<[f64; 2]> for ContinuousAction {
    fn from(values: [f64; 2]) -> Self {
        Self::new(values[0], values[1])
    }
}

impl From<TradeAction> for ContinuousAction {
    fn from(action: TradeAction) -> Self {
        action.to_continuous()
    }
}

/// Convert a discrete action index into `[position, leverage]`
pub fn convert_discrete_to_continuous_action(action_idx: usize) -> Result<ContinuousAction> {
    TradeAction::from_index(action_idx).map(TradeAction::to_continuous)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_mapping() {
        let expected = [
            (-1.0, 0.5),
            (-0.5, 0.5),
            (-0.25, 0.5),
            (0.0, 0.0),
            (0.25, 0.5),
            (0.5, 0.5),
            (1.0, 0.5),
        ];
        for (idx, (position, leverage)) in expected.into_iter().enumerate() {
            let action = convert_discrete_to_continuous_action(idx).unwrap();
            assert_eq!(action.position, position, "position for index {idx}");
            assert_eq!(action.leverage, leverage, "leverage for index {idx}");
        }
    }

    #[test]
    fn test_out_of_range_index() {
        let err = convert_discrete_to_continuous_action(7).unwrap_err();
        assert!(matches!(err, TraderError::InvalidAction { index: 7, max: 7 }));
        assert!(TradeAction::try_from(usize::MAX).is_err());
    }

    #[test]
    fn test_index_round_trip() {
        for action in TradeAction::all() {
            assert_eq!(TradeAction::from_index(action.to_index()).unwrap(), *action);
        }
        assert_eq!(TradeAction::all().len(), NUM_DISCRETE_ACTIONS);
    }

    #[test]
    fn test_clipping() {
        let action = ContinuousAction::new(3.5, -2.0).clipped();
        assert_eq!(action.to_array(), [1.0, 0.0]);

        let action = ContinuousAction::new(f64::NAN, f64::INFINITY).clipped();
        assert_eq!(action.to_array(), [0.0, 0.0]);
    }
}
