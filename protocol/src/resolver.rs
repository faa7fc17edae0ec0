//! The channel resolver: a pure function both sides of the protocol run.
//!
//! Because the result is fully determined by (rules, wall clock, AI signal),
//! the manager and the node never need to exchange it bit-for-bit; the
//! serialized `active.json` is only a cache for the playback supervisor.

use crate::types::{AiSignal, ConfigRules, SAME_AS_NORMAL};
use chrono::NaiveTime;

/// Parse an `HH:MM` wall-clock value. Returns `None` for malformed input;
/// rule entries carrying bad times are skipped, not fatal.
pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

/// Half-open membership `now ∈ [start, end)`. Windows with `start > end`
/// wrap past midnight; `start == end` is empty.
pub fn in_window(now: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start <= end {
        start <= now && now < end
    } else {
        now >= start || now < end
    }
}

/// Resolve the active channel for one node.
///
/// Precedence: disabled -> sleep windows -> timer rules (declaration order,
/// first match wins) -> AI congestion tier -> normal channel. Always returns
/// a channel named in `rules` or `sleep_channel`.
pub fn resolve(rules: &ConfigRules, now: NaiveTime, ai: Option<AiSignal>) -> String {
    if !rules.enabled {
        return rules.sleep_channel.clone();
    }

    for window in &rules.sleep_rules {
        let (Some(start), Some(end)) = (parse_hhmm(&window.start), parse_hhmm(&window.end)) else {
            continue;
        };
        if in_window(now, start, end) {
            return rules.sleep_channel.clone();
        }
    }

    for rule in &rules.timer_rules {
        let (Some(start), Some(end)) = (parse_hhmm(&rule.start), parse_hhmm(&rule.end)) else {
            continue;
        };
        if in_window(now, start, end) {
            return rule.channel.clone();
        }
    }

    if let Some(signal) = ai {
        if signal.congestion_level >= 2 {
            let key = format!("level{}", signal.congestion_level);
            if let Some(channel) = rules.ai_channels.get(&key) {
                if channel == SAME_AS_NORMAL {
                    return rules.normal_channel.clone();
                }
                return channel.clone();
            }
        }
    }

    rules.normal_channel.clone()
}
