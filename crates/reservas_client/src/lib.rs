//! Channel abstraction and booking protocol for reservable backends (gyms,
//! clubs) driven over HTTP.
//!
//! A [`Channel`] knows how to log in, list what can be booked and reserve a
//! spot; [`resolver::book`] turns a coarse request ("activity X in category Y
//! around time Z") into one concrete, idempotent reservation.

use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use secrecy::SecretString;
use thiserror::Error;

pub mod bohemios;
pub mod config;
pub mod resolver;
pub mod retry;
pub mod timeutils;

pub use timeutils::{Moment, NonexistentLocalTime};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("login rejected by the channel: {0}")]
    Authentication(String),
    #[error("category {0:?} not found")]
    CategoryNotFound(String),
    #[error("no time slots for activity {activity:?} in category {category:?}")]
    ActivityNotFound { category: String, activity: String },
    #[error("no slot with free spots covers {0}")]
    NoAvailableSlot(DateTime<Tz>),
    #[error("remote service returned status {status}: {body}")]
    Remote { status: u16, body: String },
    #[error("decoding response: {0}")]
    Decode(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Localize(#[from] NonexistentLocalTime),
}

/// Username/password pair used to log in to a channel. Created once at
/// channel construction and never mutated.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

/// Umbrella grouping for activities offered by a channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivityCategory {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// A bookable kind of session within a category.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Activity {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// A concrete scheduled occurrence of an activity, with capacity and timing.
///
/// `reservation_id` is `None` until the current user holds a reservation on
/// the slot; a set id marks the booking as already satisfied.
#[derive(Clone, Debug, PartialEq)]
pub struct ActivityTimeSlot {
    pub activity: Activity,
    pub time_slot_id: i64,
    pub starts_at: DateTime<Tz>,
    /// Exclusive upper bound of occupancy.
    pub ends_at: DateTime<Tz>,
    pub location: String,
    pub max_reservations: u32,
    pub current_reservations: u32,
    pub reservation_id: Option<i64>,
}

impl ActivityTimeSlot {
    pub fn free_spots(&self) -> u32 {
        self.max_reservations.saturating_sub(self.current_reservations)
    }

    /// Whether `moment` falls inside `[starts_at, ends_at)`. The upper bound
    /// is exclusive so a slot ending exactly at `moment` does not cover it.
    pub fn covers(&self, moment: &DateTime<Tz>) -> bool {
        self.starts_at <= *moment && *moment < self.ends_at
    }
}

/// A reservable backend the crate can log into and book activities against.
///
/// Methods take `&mut self`: a channel holds one user session and is driven
/// from a single task; the exclusive borrow rules out racing the
/// check-then-login sequence.
#[async_trait]
pub trait Channel: Send {
    /// IANA timezone the channel schedules against.
    fn timezone(&self) -> Tz;

    fn credentials(&self) -> &Credentials;

    fn is_logged_in(&self) -> bool;

    /// Authenticate with the channel. Safe to call again on a live session;
    /// re-login refreshes the session state. On failure the channel stays
    /// logged out and the error is [`ChannelError::Authentication`].
    async fn login(&mut self) -> Result<(), ChannelError>;

    async fn list_categories(&mut self) -> Result<Vec<ActivityCategory>, ChannelError>;

    async fn list_time_slots(
        &mut self,
        day: chrono::NaiveDate,
        category: &ActivityCategory,
    ) -> Result<Vec<ActivityTimeSlot>, ChannelError>;

    /// Issue the remote reservation call for `slot` and return the new
    /// reservation id. Callers are expected to go through [`resolver::book`],
    /// which skips this when the slot is already reserved.
    async fn reserve(&mut self, slot: &ActivityTimeSlot) -> Result<i64, ChannelError>;

    /// Localize a moment to this channel's timezone: a naive moment gets the
    /// zone attached, an aware one is converted.
    fn localize(&self, moment: Moment) -> Result<DateTime<Tz>, ChannelError> {
        Ok(timeutils::localize(moment, self.timezone())?)
    }

    /// Login-enforcement guard: invoked at the start of every operation that
    /// needs a session. One check, at most one `login()`; a login failure
    /// propagates without running the guarded operation.
    async fn ensure_logged_in(&mut self) -> Result<(), ChannelError> {
        if !self.is_logged_in() {
            self.login().await?;
        }
        Ok(())
    }

    /// Resolve and book the first matching slot for the request. See
    /// [`resolver::book`] for the matching policy and idempotence guarantee.
    async fn book(
        &mut self,
        category_name: &str,
        activity_name: &str,
        when: Moment,
    ) -> Result<ActivityTimeSlot, ChannelError>
    where
        Self: Sized,
    {
        resolver::book(self, category_name, activity_name, when).await
    }
}
