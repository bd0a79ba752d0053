//! Merging published snapshots into aggregates.

use crate::error::{MergeError, NameError};
use crate::models::{AggregateRecord, GroupKey};

/// Group a published file belongs to: its name minus the last `_` segment.
pub fn group_key_for(file_name: &str) -> Result<GroupKey, NameError> {
    let (group, _suffix) = file_name
        .rsplit_once('_')
        .ok_or_else(|| NameError::MissingSuffix(file_name.to_string()))?;

    if group.is_empty() {
        return Err(NameError::EmptyGroup(file_name.to_string()));
    }

    GroupKey::new(group)
}

/// Merge an incoming snapshot into an existing aggregate.
///
/// Time profiles are summed bucket by bucket and the longer tail is kept
/// as is. Total counts and stdevs are concatenated and sorted ascending.
pub fn merge(
    existing: AggregateRecord,
    incoming: AggregateRecord,
) -> Result<AggregateRecord, MergeError> {
    Ok(AggregateRecord {
        time_profiles: sum_profiles(existing.time_profiles, &incoming.time_profiles)?,
        total_counts: concat_sorted(existing.total_counts, incoming.total_counts),
        time_stdevs: concat_sorted(existing.time_stdevs, incoming.time_stdevs),
    })
}

fn sum_profiles(mut existing: Vec<i64>, incoming: &[i64]) -> Result<Vec<i64>, MergeError> {
    for (index, (current, added)) in existing.iter_mut().zip(incoming).enumerate() {
        *current = current
            .checked_add(*added)
            .ok_or(MergeError::Overflow {
                index,
                existing: *current,
                incoming: *added,
            })?;
    }

    if incoming.len() > existing.len() {
        let tail = &incoming[existing.len()..];
        existing.extend_from_slice(tail);
    }

    Ok(existing)
}

fn concat_sorted(mut values: Vec<f64>, more: Vec<f64>) -> Vec<f64> {
    values.extend(more);
    values.sort_by(f64::total_cmp);
    values
}
