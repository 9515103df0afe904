// PEGASUSQ DVFS STEP ENGINE
// PURE DECISION FUNCTION: NO PLATFORM ACCESS, NO LOCKS.
// RAMP-UP IS ALWAYS TESTED FIRST; IF IT FIRES, RAMP-DOWN IS NOT CONSIDERED.

use crate::platform::Relation;
use crate::tunables::{FREQ_FOR_RESPONSIVENESS, UP_THRESHOLD_AT_MIN_FREQ};

#[derive(Clone, Copy, Debug)]
pub struct DvfsParams {
    pub up_threshold: u32,
    pub down_differential: u32,
    pub freq_step: u32,
    pub sampling_down_factor: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct DvfsInput {
    // max OVER CPUS OF load% * EFFECTIVE FREQ (kHz)
    pub max_load_freq: u64,
    pub cur: u32,
    pub policy_min: u32,
    pub policy_max: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DvfsAction {
    RampUp(u32),
    RampDown(u32),
    Hold,
}

impl DvfsAction {
    pub fn target(self) -> Option<u32> {
        match self {
            Self::RampUp(f) | Self::RampDown(f) => Some(f),
            Self::Hold => None,
        }
    }

    // BOTH DIRECTIONS ASK FOR THE LOWEST SUPPORTED STEP AT OR ABOVE THE TARGET
    pub fn relation(self) -> Relation {
        Relation::AtOrAbove
    }
}

// ONE DVFS DECISION. UPDATES rate_mult IN PLACE.
// RampDown(f) WITH f == cur IS STILL A RAMP-DOWN: rate_mult HAS BEEN RESET,
// THE CALLER ONLY SKIPS THE DRIVER CALL.
pub fn decide(params: &DvfsParams, input: &DvfsInput, rate_mult: &mut u32) -> DvfsAction {
    let cur = input.cur as u64;
    let max = input.policy_max as u64;

    let up_threshold = if input.cur < FREQ_FOR_RESPONSIVENESS {
        UP_THRESHOLD_AT_MIN_FREQ
    } else {
        params.up_threshold
    } as u64;

    // RAMP UP
    if input.max_load_freq > up_threshold * cur {
        let inc = max * params.freq_step as u64 / 100;
        let target = max.min(cur + inc);
        if cur < max && target == max {
            *rate_mult = params.sampling_down_factor.max(1);
        }
        return DvfsAction::RampUp(target as u32);
    }

    // RAMP DOWN
    let down_threshold = params.up_threshold.saturating_sub(params.down_differential) as u64;
    if down_threshold == 0 {
        return DvfsAction::Hold;
    }
    if input.max_load_freq < down_threshold * cur {
        let mut freq_next = (input.max_load_freq / down_threshold).max(input.policy_min as u64);
        *rate_mult = 1;

        let down_thres = UP_THRESHOLD_AT_MIN_FREQ.saturating_sub(params.down_differential) as u64;
        if freq_next < FREQ_FOR_RESPONSIVENESS as u64
            && freq_next != 0
            && input.max_load_freq / freq_next > down_thres
        {
            freq_next = FREQ_FOR_RESPONSIVENESS as u64;
        }
        return DvfsAction::RampDown(freq_next.min(u32::MAX as u64) as u32);
    }

    DvfsAction::Hold
}
