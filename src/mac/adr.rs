//! Dynamic ADR
//!
//! Picks the desired data rate, Tx power and NbTrans from the link quality of
//! recent uplinks. Each 3 dB of SNR above the demodulation floor (plus the
//! installation margin) buys one step: first a faster data rate, then a
//! lower Tx power. A negative budget raises the Tx power back up.

use tracing::debug;

use crate::band::Band;
use crate::mac::state::{MacParameters, MacState, UplinkRecord};

/// dB of SNR per ADR step
pub const ADR_STEP_DB: f32 = 3.0;

/// Uplinks received since the last acknowledged ADR change
fn uplinks_since_change(state: &MacState) -> Vec<&UplinkRecord> {
    state
        .recent_uplinks
        .iter()
        .filter(|up| up.f_cnt >= state.last_adr_change_f_cnt_up)
        .filter(|up| up.data_rate_index == state.current_parameters.data_rate_index)
        .collect()
}

/// NbTrans for the observed frame loss
pub fn nb_trans_for_loss(current: u8, loss: f32) -> u8 {
    let current = current.max(1);
    if loss < 0.05 {
        current.saturating_sub(1).max(1)
    } else if loss < 0.10 {
        current
    } else if loss < 0.30 {
        (current + 1).min(3)
    } else {
        3
    }
}

fn frame_loss(uplinks: &[&UplinkRecord]) -> Option<f32> {
    let (first, last) = (uplinks.first()?, uplinks.last()?);
    let expected = last.f_cnt.checked_sub(first.f_cnt)? as f32 + 1.0;
    Some((1.0 - uplinks.len() as f32 / expected).max(0.0))
}

/// Set data rate, Tx power and NbTrans of `desired` from the uplink history
pub fn adapt_data_rate(state: &MacState, desired: &mut MacParameters, phy: &Band, margin: f32) {
    let uplinks = uplinks_since_change(state);
    if uplinks.is_empty() {
        return;
    }
    let current = &state.current_parameters;
    let Some(required_snr) = phy
        .data_rate(current.data_rate_index)
        .and_then(|dr| dr.required_snr())
    else {
        return;
    };
    let Ok((min_dr, max_dr)) = desired.allowed_data_rate_range() else {
        return;
    };
    let max_dr = max_dr.min(phy.max_adr_data_rate_index);

    let max_snr = uplinks
        .iter()
        .map(|up| up.max_snr)
        .fold(f32::MIN, f32::max);
    let mut steps = ((max_snr - required_snr - margin) / ADR_STEP_DB).floor() as i32;

    let mut dr = current.data_rate_index.clamp(min_dr, max_dr.max(min_dr));
    let mut power = current.tx_power_index;
    let max_power = phy.max_tx_power_index();

    while steps > 0 {
        let next = (dr + 1..=max_dr).find(|&i| {
            phy.data_rate(i).is_some() && !state.rejected_adr_data_rate_indexes.contains(&i)
        });
        match next {
            Some(next) => {
                dr = next;
                steps -= 1;
            }
            None => break,
        }
    }
    while steps > 0
        && power < max_power
        && !state.rejected_adr_tx_power_indexes.contains(&(power + 1))
    {
        power += 1;
        steps -= 1;
    }
    while steps < 0 && power > 0 {
        power -= 1;
        steps += 1;
    }

    if let Some(loss) = frame_loss(&uplinks) {
        desired.nb_trans = nb_trans_for_loss(current.nb_trans, loss);
    }
    debug!(
        "ADR: max SNR {:.1} dB at DR{}, desired DR{} power {} NbTrans {}",
        max_snr, current.data_rate_index, dr, power, desired.nb_trans
    );
    desired.data_rate_index = dr;
    desired.tx_power_index = power;
}
