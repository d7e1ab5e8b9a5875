//! Works out which on-call shifts are effectively yours.
//!
//! A shift names a nominal assignee plus optional temporary replacements.
//! Only the first member slot and its first replacement are consulted.

use chrono::{DateTime, Utc};

use crate::xmatters::OnCallShift;

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedShift {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Full name of the person being covered, when this is a replacement
    pub replacing_name: Option<String>,
}

/// Resolved shifts together with the paging counts reported upward
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedSchedule {
    pub count: usize,
    pub total: usize,
    pub shifts: Vec<ResolvedShift>,
}

impl From<Vec<ResolvedShift>> for ResolvedSchedule {
    fn from(shifts: Vec<ResolvedShift>) -> Self {
        Self {
            count: shifts.len(),
            total: shifts.len(),
            shifts,
        }
    }
}

/// Shifts that belong to `user_key`, in input order
pub fn resolve_my_shifts(shifts: &[OnCallShift], user_key: &str) -> Vec<ResolvedShift> {
    shifts
        .iter()
        .filter_map(|shift| resolve_shift(shift, user_key))
        .collect()
}

fn resolve_shift(shift: &OnCallShift, user_key: &str) -> Option<ResolvedShift> {
    let slot = shift.members.data.first()?;
    let replacement = slot.replacements.data.first().map(|r| &r.replacement);

    let replacing_name = if same_user(&slot.member.external_key, user_key) {
        match replacement {
            // someone else is covering for us
            Some(other) if !same_user(&other.target_name, user_key) => return None,
            _ => None,
        }
    } else {
        match replacement {
            Some(cover) if same_user(&cover.target_name, user_key) => Some(slot.member.full_name()),
            _ => return None,
        }
    };

    Some(ResolvedShift {
        start: shift.start,
        end: shift.end,
        replacing_name,
    })
}

fn same_user(a: &str, b: &str) -> bool {
    a.to_uppercase() == b.to_uppercase()
}
