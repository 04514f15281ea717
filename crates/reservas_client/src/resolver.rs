//! Resolves a coarse booking request into a reservation on one concrete
//! time slot.
//!
//! The request names a category and an activity in free text and gives a
//! desired moment; the resolver walks the channel's listings, picks the
//! first slot that covers the moment with room left, and reserves it. A slot
//! the user already holds a reservation on is returned as-is without a
//! remote call, so repeating a request is a no-op.

use crate::{ActivityTimeSlot, Channel, ChannelError, Moment};

/// Match and reserve a slot for `activity_name` within `category_name` at
/// `when`.
///
/// Name matching is case-insensitive and exact. `when` is localized to the
/// channel's timezone first; the listing day is the localized calendar day.
/// Ties between qualifying slots go to the first one in backend listing
/// order.
///
/// Errors: [`ChannelError::CategoryNotFound`] /
/// [`ChannelError::ActivityNotFound`] when a name matches nothing,
/// [`ChannelError::NoAvailableSlot`] when no slot covers the moment with
/// free spots, and whatever the channel surfaces for login or transport
/// failures. None of these are retried here.
pub async fn book<C>(
    channel: &mut C,
    category_name: &str,
    activity_name: &str,
    when: Moment,
) -> Result<ActivityTimeSlot, ChannelError>
where
    C: Channel + ?Sized,
{
    let when = channel.localize(when)?;

    let wanted_category = category_name.to_lowercase();
    let category = channel
        .list_categories()
        .await?
        .into_iter()
        .find(|category| category.name.to_lowercase() == wanted_category)
        .ok_or_else(|| ChannelError::CategoryNotFound(category_name.to_owned()))?;

    let wanted_activity = activity_name.to_lowercase();
    let mut candidates: Vec<ActivityTimeSlot> = channel
        .list_time_slots(when.date_naive(), &category)
        .await?
        .into_iter()
        .filter(|slot| slot.activity.name.to_lowercase() == wanted_activity)
        .collect();
    if candidates.is_empty() {
        return Err(ChannelError::ActivityNotFound {
            category: category_name.to_owned(),
            activity: activity_name.to_owned(),
        });
    }

    // Exclusive upper bound: a slot ending exactly at `when` is passed over
    // in favour of one that has not yet finished.
    let position = candidates
        .iter()
        .position(|slot| slot.covers(&when) && slot.free_spots() > 0)
        .ok_or(ChannelError::NoAvailableSlot(when))?;
    let mut slot = candidates.swap_remove(position);

    if slot.reservation_id.is_some() {
        tracing::info!(
            time_slot_id = slot.time_slot_id,
            "slot already reserved, nothing to do"
        );
        return Ok(slot);
    }

    tracing::info!(time_slot_id = slot.time_slot_id, %when, "reserving slot");
    let reservation_id = channel.reserve(&slot).await?;
    slot.reservation_id = Some(reservation_id);
    Ok(slot)
}
