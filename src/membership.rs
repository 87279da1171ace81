use chrono::{DateTime, Utc};

use crate::models::{IntervalEnd, Member, MembershipInterval};

/// Decides whether `member` counted as part of `group_id` at `date`.
///
/// A missing `group_id` means an organization-wide query, where everyone
/// counts. Members whose current group matches are counted from the start of
/// their open interval; with no open interval on record they are treated as
/// having always belonged (legacy rosters predate history tracking). Anyone
/// else needs a recorded interval for that group covering `date`.
pub fn is_member_of_group_at_date(
    member: &Member,
    group_id: Option<&str>,
    date: DateTime<Utc>,
) -> bool {
    let Some(group_id) = group_id else {
        return true;
    };

    let history = sorted_history(member);

    if member.current_group_id.as_deref() == Some(group_id) {
        let open = history
            .iter()
            .rev()
            .find(|interval| interval.is_open() && interval.group_id == group_id);

        return match open {
            Some(interval) => interval.start.is_some_and(|start| date >= start),
            None => true,
        };
    }

    history
        .iter()
        .filter(|interval| interval.group_id == group_id)
        .any(|interval| covers(interval, date))
}

/// Returns the history ordered by start, unreadable starts first.
pub fn sorted_history(member: &Member) -> Vec<&MembershipInterval> {
    let mut history: Vec<&MembershipInterval> = member.membership_history.iter().collect();
    history.sort_by_key(|interval| interval.start);
    history
}

fn covers(interval: &MembershipInterval, date: DateTime<Utc>) -> bool {
    let Some(start) = interval.start else {
        return false;
    };
    if date < start {
        return false;
    }

    match interval.end {
        IntervalEnd::Open => true,
        IntervalEnd::At(end) => date <= end,
        IntervalEnd::Unreadable => false,
    }
}
