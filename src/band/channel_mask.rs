//! Channel mask generation and parsing
//!
//! Dynamic plans (up to 16 channels) use a single ChMaskCntl 0 pair. Fixed
//! 72-channel plans pick the shortest of several encodings.

use serde::{Deserialize, Serialize};

use crate::error::{Corruption, MacError, Result};

/// 16-bit channel enable mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelMask(pub u16);

impl ChannelMask {
    /// Build a mask from up to 16 enable flags, bit i for flag i
    pub fn from_statuses(statuses: &[bool]) -> Self {
        let bits = statuses
            .iter()
            .take(16)
            .enumerate()
            .fold(0u16, |acc, (i, &on)| acc | ((on as u16) << i));
        ChannelMask(bits)
    }

    pub fn is_enabled(&self, index: usize) -> bool {
        index < 16 && self.0 & (1 << index) != 0
    }

    pub fn statuses(&self) -> [bool; 16] {
        let mut res = [false; 16];
        for (i, c) in res.iter_mut().enumerate() {
            *c = self.is_enabled(i);
        }
        res
    }
}

/// A ChMaskCntl / ChMask pair as carried in one LinkADRReq
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChMaskPair {
    pub control: u8,
    pub mask: ChannelMask,
}

impl ChMaskPair {
    pub fn new(control: u8, mask: u16) -> Self {
        Self {
            control,
            mask: ChannelMask(mask),
        }
    }
}

/// How a band encodes channel masks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskScheme {
    /// Up to 16 channels, ChMaskCntl 0 (and 6 for "all defined channels on")
    Dynamic16,
    /// 64 125 kHz channels plus 8 500 kHz channels, ChMaskCntl 0..=7
    Fixed72,
}

const FIXED_CHANNELS: usize = 72;

pub(crate) fn generate(
    scheme: MaskScheme,
    current: &[bool],
    desired: &[bool],
    bank_masks: bool,
) -> Result<Vec<ChMaskPair>> {
    if current.len() != desired.len() {
        return Err(MacError::UnsupportedChannelMask {
            current: current.len(),
            desired: desired.len(),
        });
    }
    match scheme {
        MaskScheme::Dynamic16 => generate_dynamic(current, desired),
        MaskScheme::Fixed72 => generate_fixed(current, desired, bank_masks),
    }
}

pub(crate) fn parse(scheme: MaskScheme, pair: &ChMaskPair, current: &[bool]) -> Result<Vec<bool>> {
    match scheme {
        MaskScheme::Dynamic16 => parse_dynamic(pair, current),
        MaskScheme::Fixed72 => parse_fixed(pair, current),
    }
}

fn generate_dynamic(current: &[bool], desired: &[bool]) -> Result<Vec<ChMaskPair>> {
    if desired.len() > 16 {
        return Err(MacError::UnsupportedChannelMask {
            current: current.len(),
            desired: desired.len(),
        });
    }
    Ok(vec![ChMaskPair {
        control: 0,
        mask: ChannelMask::from_statuses(desired),
    }])
}

fn parse_dynamic(pair: &ChMaskPair, current: &[bool]) -> Result<Vec<bool>> {
    match pair.control {
        0 => {
            let mut res = current.to_vec();
            for i in 0..16 {
                let on = pair.mask.is_enabled(i);
                match res.get_mut(i) {
                    Some(slot) => *slot = on,
                    None if on => {
                        return Err(Corruption::UndefinedChannel {
                            index: i,
                            channels_len: current.len(),
                        }
                        .into())
                    }
                    None => {}
                }
            }
            Ok(res)
        }
        6 => Ok(vec![true; current.len()]),
        control => Err(Corruption::InvalidChannelMaskControl { control }.into()),
    }
}

fn block_mask(statuses: &[bool], block: usize) -> u16 {
    let start = block * 16;
    let end = (start + 16).min(statuses.len());
    ChannelMask::from_statuses(&statuses[start..end]).0
}

fn generate_fixed(current: &[bool], desired: &[bool], bank_masks: bool) -> Result<Vec<ChMaskPair>> {
    if desired.len() != FIXED_CHANNELS {
        return Err(MacError::UnsupportedChannelMask {
            current: current.len(),
            desired: desired.len(),
        });
    }

    // Only changed blocks
    let changed: Vec<ChMaskPair> = (0..5)
        .filter(|&b| block_mask(current, b) != block_mask(desired, b))
        .map(|b| ChMaskPair::new(b as u8, block_mask(desired, b)))
        .collect();
    if changed.is_empty() {
        return Ok(vec![ChMaskPair::new(0, block_mask(desired, 0))]);
    }

    let wide = block_mask(desired, 4);
    let mut candidates = vec![changed];

    // All 125 kHz channels on, then switch off blocks
    let mut all_on = vec![ChMaskPair::new(6, wide)];
    all_on.extend(
        (0..4)
            .filter(|&b| block_mask(desired, b) != 0xFFFF)
            .map(|b| ChMaskPair::new(b as u8, block_mask(desired, b))),
    );
    candidates.push(all_on);

    // All 125 kHz channels off, then switch on blocks
    let mut all_off = vec![ChMaskPair::new(7, wide)];
    all_off.extend(
        (0..4)
            .filter(|&b| block_mask(desired, b) != 0)
            .map(|b| ChMaskPair::new(b as u8, block_mask(desired, b))),
    );
    candidates.push(all_off);

    if bank_masks {
        if let Some(mask) = bank_mask(desired) {
            candidates.insert(0, vec![ChMaskPair::new(5, mask)]);
        }
    }

    let mut best = Vec::new();
    for candidate in candidates {
        if best.is_empty() || candidate.len() < best.len() {
            best = candidate;
        }
    }
    Ok(best)
}

/// Bit i covers 125 kHz channels 8i..8i+8 and 500 kHz channel 64+i
fn bank_mask(desired: &[bool]) -> Option<u16> {
    let mut mask = 0u16;
    for bank in 0..8 {
        let on = desired[64 + bank];
        if desired[bank * 8..bank * 8 + 8].iter().any(|&c| c != on) {
            return None;
        }
        if on {
            mask |= 1 << bank;
        }
    }
    Some(mask)
}

fn parse_fixed(pair: &ChMaskPair, current: &[bool]) -> Result<Vec<bool>> {
    if current.len() != FIXED_CHANNELS {
        return Err(MacError::UnsupportedChannelMask {
            current: current.len(),
            desired: FIXED_CHANNELS,
        });
    }
    let mut res = current.to_vec();
    let mask = pair.mask;
    match pair.control {
        block @ 0..=3 => {
            let start = block as usize * 16;
            for i in 0..16 {
                res[start + i] = mask.is_enabled(i);
            }
        }
        4 => {
            for i in 0..8 {
                res[64 + i] = mask.is_enabled(i);
            }
        }
        5 => {
            for bank in 0..8 {
                let on = mask.is_enabled(bank);
                for ch in &mut res[bank * 8..bank * 8 + 8] {
                    *ch = on;
                }
                res[64 + bank] = on;
            }
        }
        on_off @ (6 | 7) => {
            let on = on_off == 6;
            for ch in &mut res[..64] {
                *ch = on;
            }
            for i in 0..8 {
                res[64 + i] = mask.is_enabled(i);
            }
        }
        control => return Err(Corruption::InvalidChannelMaskControl { control }.into()),
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(scheme: MaskScheme, pairs: &[ChMaskPair], current: &[bool]) -> Vec<bool> {
        pairs.iter().fold(current.to_vec(), |acc, pair| {
            parse(scheme, pair, &acc).unwrap()
        })
    }

    fn fixed(f: impl Fn(usize) -> bool) -> Vec<bool> {
        (0..72).map(f).collect()
    }

    #[test]
    fn test_channel_mask_statuses() {
        let mask = ChannelMask::from_statuses(&[true, false, true]);
        assert_eq!(mask, ChannelMask(0b101));
        assert!(mask.is_enabled(2));
        assert!(!mask.is_enabled(1));
        assert!(!mask.is_enabled(20));
        assert_eq!(mask.statuses()[..3], [true, false, true]);
    }

    #[test]
    fn test_dynamic_roundtrip() {
        let current = vec![true, true, true, false, false];
        let desired = vec![true, false, true, true, true];
        let pairs = generate(MaskScheme::Dynamic16, &current, &desired, false).unwrap();
        assert_eq!(pairs, vec![ChMaskPair::new(0, 0b11101)]);
        assert_eq!(apply(MaskScheme::Dynamic16, &pairs, &current), desired);
    }

    #[test]
    fn test_dynamic_rejects_unsupported_lengths() {
        let current = vec![true; 17];
        assert!(matches!(
            generate(MaskScheme::Dynamic16, &current, &current, false),
            Err(MacError::UnsupportedChannelMask { .. })
        ));
        assert!(matches!(
            generate(MaskScheme::Dynamic16, &[true; 3], &[true; 4], false),
            Err(MacError::UnsupportedChannelMask { .. })
        ));
    }

    #[test]
    fn test_dynamic_mask_enabling_undefined_channel() {
        let err = parse(MaskScheme::Dynamic16, &ChMaskPair::new(0, 0b1000), &[true; 3]);
        assert!(matches!(
            err,
            Err(MacError::CorruptedMacState(Corruption::UndefinedChannel { index: 3, .. }))
        ));
    }

    #[test]
    fn test_fixed_single_sub_band_uses_two_pairs() {
        let current = fixed(|_| true);
        let desired = fixed(|i| (8..16).contains(&i) || i == 65);
        let pairs = generate(MaskScheme::Fixed72, &current, &desired, false).unwrap();
        assert_eq!(pairs, vec![ChMaskPair::new(7, 0b10), ChMaskPair::new(0, 0xFF00)]);
        assert_eq!(apply(MaskScheme::Fixed72, &pairs, &current), desired);
    }

    #[test]
    fn test_fixed_bank_mask_when_supported() {
        let current = fixed(|_| true);
        let desired = fixed(|i| (8..16).contains(&i) || i == 65);
        let pairs = generate(MaskScheme::Fixed72, &current, &desired, true).unwrap();
        assert_eq!(pairs, vec![ChMaskPair::new(5, 0b10)]);
        assert_eq!(apply(MaskScheme::Fixed72, &pairs, &current), desired);
    }

    #[test]
    fn test_fixed_unchanged_mask_reasserts_first_block() {
        let current = fixed(|i| i < 8);
        let pairs = generate(MaskScheme::Fixed72, &current, &current, true).unwrap();
        assert_eq!(pairs, vec![ChMaskPair::new(0, 0x00FF)]);
    }

    #[test]
    fn test_fixed_roundtrip_table() {
        let patterns: Vec<(Vec<bool>, Vec<bool>)> = vec![
            (fixed(|_| true), fixed(|i| i % 3 == 0)),
            (fixed(|_| false), fixed(|i| i >= 64)),
            (fixed(|i| i < 16), fixed(|i| (16..40).contains(&i) || i == 70)),
            (fixed(|i| i % 2 == 0), fixed(|i| i < 63)),
            (fixed(|i| i < 8 || i == 64), fixed(|i| (56..64).contains(&i) || i == 71)),
        ];
        for (current, desired) in patterns {
            for bank in [false, true] {
                let pairs = generate(MaskScheme::Fixed72, &current, &desired, bank).unwrap();
                assert!(!pairs.is_empty() && pairs.len() <= 5);
                assert_eq!(apply(MaskScheme::Fixed72, &pairs, &current), desired);
            }
        }
    }

    #[test]
    fn test_fixed_rejects_wrong_length() {
        assert!(matches!(
            generate(MaskScheme::Fixed72, &[true; 16], &[true; 16], false),
            Err(MacError::UnsupportedChannelMask { .. })
        ));
    }
}
