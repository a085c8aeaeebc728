use super::pad::{PadState, Timestamp, TouchKind};
use crate::config::DebounceConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DebounceWindows {
    // A touch must be older than this before its release is accepted
    pub on_ms: u64,
    // A release must be older than this before a new touch is accepted
    pub off_ms: u64,
}

impl From<&DebounceConfig> for DebounceWindows {
    fn from(config: &DebounceConfig) -> Self {
        Self {
            on_ms: config.on_ms,
            off_ms: config.off_ms,
        }
    }
}

/// Classifies one raw sample of one pad taken at `t`.
///
/// Returns the validated transition, if any, and updates `pad` accordingly.
/// A transition whose window has not elapsed yet leaves the pad untouched,
/// so it is simply re-evaluated with the next sample. Both comparisons are
/// strict: a new touch needs `t - last_touch_stop > off_ms`, a release needs
/// `t - last_touch_start > on_ms`.
///
/// Since a fresh pad has `last_touch_stop = 0`, a pad that is already
/// touched when the session starts only reports its Start once `t > off_ms`.
pub fn classify(
    pad: &mut PadState,
    raw_touched: bool,
    t: Timestamp,
    windows: DebounceWindows,
) -> Option<TouchKind> {
    match (raw_touched, pad.is_touching) {
        (true, false) if t.saturating_sub(pad.last_touch_stop) > windows.off_ms => {
            pad.is_touching = true;
            pad.last_touch_start = t;
            Some(TouchKind::Start)
        }
        (false, true) if t.saturating_sub(pad.last_touch_start) > windows.on_ms => {
            pad.is_touching = false;
            pad.last_touch_stop = t;
            Some(TouchKind::Stop)
        }
        _ => None,
    }
}
