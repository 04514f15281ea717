//! Channel implementation for Club Atlético Bohemios.
//!
//! Drives the club's agenda API (see <https://bohemios.uy/>): bearer-token
//! signin, category and time-slot listings wrapped in a `description`
//! envelope, and a reservation endpoint keyed by time-slot id.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveTime};
use chrono_tz::Tz;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

use crate::retry::RetryPolicy;
use crate::timeutils::{self, Moment};
use crate::{Activity, ActivityCategory, ActivityTimeSlot, Channel, ChannelError, Credentials};

pub const DEFAULT_BASE_URL: &str = "https://api-agenda.bohemios.uy";

const TIMEZONE: Tz = chrono_tz::America::Montevideo;

// The agenda frontend is picky about non-browser clients.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:133.0) Gecko/20100101 Firefox/133.0",
];

/// One user session against the Bohemios agenda.
///
/// Listings are cached for the lifetime of the session: categories once,
/// time slots per `(day, category)`. The datasets are small and effectively
/// static, so the caches are unbounded. A confirmed reservation is written
/// back into the cached slot so a repeated booking request resolved from
/// cache still sees the reservation id.
#[derive(Debug)]
pub struct BohemiosChannel {
    base_url: String,
    credentials: Credentials,
    client: reqwest::Client,
    retry: RetryPolicy,
    logged_in: bool,
    bearer_token: Option<SecretString>,
    user_id: Option<i64>,
    categories: Option<Vec<ActivityCategory>>,
    time_slots: HashMap<(NaiveDate, i64), Vec<ActivityTimeSlot>>,
}

impl BohemiosChannel {
    pub fn new(base_url: &str, credentials: Credentials) -> Self {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let user_agent = USER_AGENTS[rand::rng().random_range(0..USER_AGENTS.len())];
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(user_agent)
            .build()
            .expect("reqwest client build should not fail");
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            client,
            retry: RetryPolicy::default(),
            logged_in: false,
            bearer_token: None,
            user_id: None,
            categories: None,
            time_slots: HashMap::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build a GET request carrying the session bearer token when present.
    fn get_request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.get(url);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token.expose_secret());
        }
        request
    }

    fn post_request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.post(url);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token.expose_secret());
        }
        request
    }

    /// Execute a request and decode a JSON response, mapping non-success
    /// statuses to errors.
    async fn execute_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ChannelError> {
        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }
        let text = resp.text().await?;
        decode_json(&text)
    }

    /// GET with retry on transport errors only; a non-success status is an
    /// answer from the service and is returned as-is.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ChannelError> {
        let mut attempt = 0u32;
        loop {
            match self.execute_json(self.get_request(url).query(query)).await {
                Err(ChannelError::Http(err)) if attempt < self.retry.max_retries => {
                    attempt += 1;
                    tracing::debug!(attempt, error = %err, "transport error on listing, retrying");
                    tokio::time::sleep(self.retry.backoff(attempt)).await;
                }
                other => return other,
            }
        }
    }

    /// Extract error information from a failed response.
    async fn error_from_response(resp: reqwest::Response) -> ChannelError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        let body_snippet: String = body.chars().take(256).collect();
        match status {
            401 | 403 => ChannelError::Authentication(body_snippet),
            _ => ChannelError::Remote {
                status,
                body: body_snippet,
            },
        }
    }

    fn user_id(&self) -> Result<i64, ChannelError> {
        self.user_id
            .ok_or_else(|| ChannelError::Config("no user id in session; login first".into()))
    }
}

#[async_trait]
impl Channel for BohemiosChannel {
    fn timezone(&self) -> Tz {
        TIMEZONE
    }

    fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    async fn login(&mut self) -> Result<(), ChannelError> {
        self.logged_in = false;
        let url = format!("{}/signin", self.base_url);
        let body = serde_json::json!({
            "user": self.credentials.username,
            "password": self.credentials.password.expose_secret(),
        });
        let resp = self.client.put(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            // Whatever the status, a failed signin is a rejected login.
            return Err(match Self::error_from_response(resp).await {
                ChannelError::Remote { status, body } => {
                    ChannelError::Authentication(format!("status {status}: {body}"))
                }
                other => other,
            });
        }
        let text = resp.text().await?;
        let payload: SigninResponse = decode_json(&text)?;

        self.bearer_token = Some(SecretString::new(payload.token.into()));
        self.user_id = Some(payload.description.id);
        self.logged_in = true;
        tracing::debug!(user_id = payload.description.id, "logged in");
        Ok(())
    }

    async fn list_categories(&mut self) -> Result<Vec<ActivityCategory>, ChannelError> {
        self.ensure_logged_in().await?;
        if let Some(cached) = &self.categories {
            return Ok(cached.clone());
        }

        let url = format!("{}/activitycategory/", self.base_url);
        let query = [("from", "FRONTEND".to_string())];
        let envelope: Envelope<Vec<CategoryPayload>> = self.get_json(&url, &query).await?;
        let categories: Vec<ActivityCategory> = envelope
            .description
            .into_iter()
            .map(|payload| ActivityCategory {
                id: payload.id,
                name: payload.name,
                description: payload.description,
            })
            .collect();
        self.categories = Some(categories.clone());
        Ok(categories)
    }

    async fn list_time_slots(
        &mut self,
        day: NaiveDate,
        category: &ActivityCategory,
    ) -> Result<Vec<ActivityTimeSlot>, ChannelError> {
        self.ensure_logged_in().await?;
        if let Some(cached) = self.time_slots.get(&(day, category.id)) {
            return Ok(cached.clone());
        }
        let user_id = self.user_id()?;

        let url = format!("{}/activitytime/", self.base_url);
        let query = [
            ("id", category.id.to_string()),
            ("dow", day.weekday().number_from_monday().to_string()),
            ("userId", user_id.to_string()),
        ];
        let envelope: Envelope<Vec<TimeSlotPayload>> = self.get_json(&url, &query).await?;
        let slots = envelope
            .description
            .into_iter()
            .map(|payload| slot_from_payload(payload, day))
            .collect::<Result<Vec<_>, _>>()?;
        self.time_slots.insert((day, category.id), slots.clone());
        Ok(slots)
    }

    async fn reserve(&mut self, slot: &ActivityTimeSlot) -> Result<i64, ChannelError> {
        self.ensure_logged_in().await?;
        let user_id = self.user_id()?;

        let url = format!("{}/reservation/", self.base_url);
        // "day" must be 0: the time-slot id already pins the calendar day.
        let body = serde_json::json!({
            "usr": user_id,
            "at": slot.time_slot_id,
            "day": 0,
            "description": "",
        });
        let payload: Envelope<ReservationRecord> =
            self.execute_json(self.post_request(&url).json(&body)).await?;
        let reservation_id = payload.description.id;
        tracing::info!(
            time_slot_id = slot.time_slot_id,
            reservation_id,
            "reservation confirmed"
        );

        // Keep cached listings consistent so a repeated request resolved
        // from cache stays a no-op.
        for slots in self.time_slots.values_mut() {
            for cached in slots
                .iter_mut()
                .filter(|cached| cached.time_slot_id == slot.time_slot_id)
            {
                cached.reservation_id = Some(reservation_id);
                cached.current_reservations = cached
                    .current_reservations
                    .saturating_add(1)
                    .min(cached.max_reservations);
            }
        }
        Ok(reservation_id)
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    description: T,
}

#[derive(Deserialize)]
struct SigninResponse {
    token: String,
    description: SigninUser,
}

#[derive(Deserialize)]
struct SigninUser {
    #[serde(deserialize_with = "deserialize_id")]
    id: i64,
}

#[derive(Deserialize)]
struct CategoryPayload {
    id: i64,
    name: String,
    description: Option<String>,
}

#[derive(Deserialize)]
struct TimeSlotPayload {
    id: i64,
    #[serde(rename = "activityId")]
    activity_id: i64,
    name: String,
    #[serde(rename = "activityDesc")]
    activity_desc: Option<String>,
    #[serde(rename = "starttime")]
    start_time: String,
    #[serde(rename = "endtime")]
    end_time: String,
    location: String,
    #[serde(rename = "maxoccupancy")]
    max_occupancy: u32,
    #[serde(rename = "TotalReservations")]
    total_reservations: u32,
    #[serde(rename = "reservationId")]
    reservation_id: Option<i64>,
}

#[derive(Deserialize)]
struct ReservationRecord {
    #[serde(deserialize_with = "deserialize_id")]
    id: i64,
}

/// The agenda API is inconsistent about ids: sometimes a number, sometimes a
/// numeric string.
fn deserialize_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| D::Error::custom("expected an integer id")),
        serde_json::Value::String(s) => s
            .parse()
            .map_err(|_| D::Error::custom(format!("expected a numeric id, got {s:?}"))),
        other => Err(D::Error::custom(format!(
            "expected a number or string id, got {other}"
        ))),
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, ChannelError> {
    serde_json::from_str(text).map_err(|err| {
        let body_snippet: String = text.chars().take(256).collect();
        ChannelError::Decode(format!("{err} - body: {body_snippet}"))
    })
}

fn parse_wall_clock(value: &str) -> Result<NaiveTime, ChannelError> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|err| ChannelError::Decode(format!("time of day {value:?}: {err}")))
}

/// The listing carries wall-clock times on the queried day in the channel
/// timezone; pin them down to aware timestamps.
fn slot_from_payload(payload: TimeSlotPayload, day: NaiveDate) -> Result<ActivityTimeSlot, ChannelError> {
    let starts_at = timeutils::localize(
        Moment::Naive(day.and_time(parse_wall_clock(&payload.start_time)?)),
        TIMEZONE,
    )?;
    let ends_at = timeutils::localize(
        Moment::Naive(day.and_time(parse_wall_clock(&payload.end_time)?)),
        TIMEZONE,
    )?;
    Ok(ActivityTimeSlot {
        activity: Activity {
            id: payload.activity_id,
            name: payload.name,
            description: payload.activity_desc,
        },
        time_slot_id: payload.id,
        starts_at,
        ends_at,
        location: payload.location,
        max_reservations: payload.max_occupancy,
        current_reservations: payload.total_reservations,
        reservation_id: payload.reservation_id,
    })
}
