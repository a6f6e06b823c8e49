//! Content calendar and dashboard settings, kept per client session.
//!
//! Items are labelled state only: nothing here publishes a post. The optional
//! webhook is a one-shot notification sent when an item is scheduled.

use crate::{
    caption::{CaptionTemplate, Tone},
    error::{AppError, Result},
    session::ensure_session,
    store::{load_json, save_json, scoped_key, StateStore},
    AppState,
};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use axum_extra::extract::SignedCookieJar;
use bytes::Bytes;
use chrono::{Days, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const CALENDAR_KEY: &str = "resellio-calendar-items-v2";
pub const SETTINGS_KEY: &str = "resellio-user-settings-v2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Instagram,
    Facebook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Draft,
    Scheduled,
    Posted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayPart {
    Pagi,
    Siang,
    #[default]
    Malam,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarItem {
    pub id: String,
    pub date: String,
    pub time: String,
    pub caption: String,
    pub channel: Channel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_title: Option<String>,
    pub status: ItemStatus,
}

impl CalendarItem {
    fn sort_key(&self) -> String {
        format!("{}{}", self.date, self.time)
    }

    fn matches(&self, channel: Option<Channel>, keyword: &str) -> bool {
        let channel_match = channel.map_or(true, |c| c == self.channel);
        if keyword.is_empty() {
            return channel_match;
        }

        let text = format!(
            "{} {}",
            self.caption,
            self.product_title.as_deref().unwrap_or_default()
        )
        .to_lowercase();
        channel_match && text.contains(keyword)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub markup: f64,
    pub shipping: f64,
    pub platform_fee: f64,
    pub ads: f64,
    pub niche: String,
    pub tone: Tone,
    pub template: CaptionTemplate,
    pub extra_tags_input: String,
    pub webhook_url: String,
    pub target_profit: f64,
    pub psychological_pricing: bool,
    pub day_part: DayPart,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            markup: 25.0,
            shipping: 12_000.0,
            platform_fee: 5_000.0,
            ads: 8_000.0,
            niche: "Fashion Wanita".to_string(),
            tone: Tone::Friendly,
            template: CaptionTemplate::Softsell,
            extra_tags_input: String::new(),
            webhook_url: String::new(),
            target_profit: 2_000_000.0,
            psychological_pricing: true,
            day_part: DayPart::Malam,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub instagram: usize,
    pub facebook: usize,
    pub posted: usize,
}

/// Ordered item list. Every mutation keeps it sorted by date then time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Calendar {
    items: Vec<CalendarItem>,
}

impl Calendar {
    pub fn new(items: Vec<CalendarItem>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[CalendarItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<CalendarItem> {
        self.items
    }

    fn sort(&mut self) {
        // stable, so equal slots keep insertion order
        self.items.sort_by_key(CalendarItem::sort_key);
    }

    pub fn add(&mut self, item: CalendarItem) {
        self.items.push(item);
        self.sort();
    }

    pub fn set_status(&mut self, id: &str, status: ItemStatus) -> Option<&CalendarItem> {
        let item = self.items.iter_mut().find(|item| item.id == id)?;
        item.status = status;
        Some(item)
    }

    pub fn remove(&mut self, id: &str) -> Option<CalendarItem> {
        let index = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(index))
    }

    /// Copies an item to the same time on the following day, as a draft.
    pub fn duplicate_next_day(&mut self, id: &str) -> Result<CalendarItem> {
        let source = self
            .items
            .iter()
            .find(|item| item.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Calendar item {} not found", id)))?;

        let date = NaiveDate::parse_from_str(&source.date, "%Y-%m-%d")
            .map_err(|_| AppError::BadRequest(format!("Invalid date: {}", source.date)))?;
        let time = NaiveTime::parse_from_str(&source.time, "%H:%M")
            .map_err(|_| AppError::BadRequest(format!("Invalid time: {}", source.time)))?;
        let next = date
            .checked_add_days(Days::new(1))
            .ok_or_else(|| AppError::BadRequest(format!("Date out of range: {}", source.date)))?;

        let cloned = CalendarItem {
            id: Uuid::new_v4().to_string(),
            date: next.format("%Y-%m-%d").to_string(),
            time: time.format("%H:%M").to_string(),
            status: ItemStatus::Draft,
            ..source.clone()
        };

        self.add(cloned.clone());
        Ok(cloned)
    }

    pub fn filter(&self, channel: Option<Channel>, keyword: &str) -> Vec<CalendarItem> {
        let keyword = keyword.trim().to_lowercase();
        self.items
            .iter()
            .filter(|item| item.matches(channel, &keyword))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            instagram: self
                .items
                .iter()
                .filter(|i| i.channel == Channel::Instagram)
                .count(),
            facebook: self
                .items
                .iter()
                .filter(|i| i.channel == Channel::Facebook)
                .count(),
            posted: self
                .items
                .iter()
                .filter(|i| i.status == ItemStatus::Posted)
                .count(),
        }
    }

    pub fn export_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(&self.items)?)
    }

    /// Parses an exported list. Unreadable or empty input is refused.
    pub fn import_json(raw: &[u8]) -> Option<Self> {
        let items: Vec<CalendarItem> = serde_json::from_slice(raw).ok()?;
        (!items.is_empty()).then(|| Self::new(items))
    }
}

pub fn posting_tip(channel: Channel, day_part: DayPart) -> &'static str {
    match (channel, day_part) {
        (Channel::Instagram, DayPart::Pagi) => "07:00 - 09:00 (konten edukasi + teaser produk)",
        (Channel::Instagram, DayPart::Siang) => "12:00 - 13:30 (konten promo singkat)",
        (Channel::Instagram, DayPart::Malam) => "19:00 - 21:00 (waktu konversi tertinggi)",
        (Channel::Facebook, DayPart::Pagi) => "08:00 - 10:00 (konten komunitas)",
        (Channel::Facebook, DayPart::Siang) => "13:00 - 14:00 (promo + CTA WhatsApp)",
        (Channel::Facebook, DayPart::Malam) => "19:30 - 21:30 (posting katalog + live reminder)",
    }
}

fn load_calendar(store: &dyn StateStore, session_id: &str) -> Calendar {
    Calendar::new(load_json(store, &scoped_key(session_id, CALENDAR_KEY)).unwrap_or_default())
}

fn save_calendar(store: &dyn StateStore, session_id: &str, calendar: &Calendar) -> Result<()> {
    save_json(
        store,
        &scoped_key(session_id, CALENDAR_KEY),
        &calendar.items,
        None,
    )?;
    Ok(())
}

pub fn load_settings(store: &dyn StateStore, session_id: &str) -> Settings {
    load_json(store, &scoped_key(session_id, SETTINGS_KEY)).unwrap_or_default()
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub channel: Option<String>,
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub caption: String,
    pub channel: Channel,
    pub image: Option<String>,
    pub product_title: Option<String>,
    pub product_url: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload<'a> {
    caption: &'a str,
    channel: Channel,
    schedule_at: String,
    image: Option<&'a str>,
    product_title: Option<&'a str>,
    product_url: Option<&'a str>,
    source: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookOutcome {
    Skipped,
    Sent,
    Failed,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: ItemStatus,
}

#[derive(Debug, Deserialize)]
pub struct TipQuery {
    pub channel: Channel,
    #[serde(default)]
    pub day_part: DayPart,
}

pub async fn list(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(query): Query<CalendarQuery>,
) -> Result<impl IntoResponse> {
    let (jar, session_id) = ensure_session(jar);
    let calendar = load_calendar(state.store.as_ref(), &session_id);

    let channel = match query.channel.as_deref() {
        None | Some("") | Some("all") => None,
        Some("instagram") => Some(Channel::Instagram),
        Some("facebook") => Some(Channel::Facebook),
        Some(other) => {
            return Err(AppError::BadRequest(format!("Unknown channel filter: {}", other)))
        }
    };

    Ok((
        jar,
        Json(json!({
            "items": calendar.filter(channel, &query.q),
            "stats": calendar.stats(),
        })),
    ))
}

pub async fn schedule(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    payload: std::result::Result<Json<ScheduleRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(request) = payload?;
    if request.caption.trim().is_empty()
        || request.date.trim().is_empty()
        || request.time.trim().is_empty()
    {
        return Err(AppError::BadRequest(
            "Caption, date and time are required".into(),
        ));
    }

    let (jar, session_id) = ensure_session(jar);
    let store = state.store.as_ref();

    let item = CalendarItem {
        id: Uuid::new_v4().to_string(),
        date: request.date.clone(),
        time: request.time.clone(),
        caption: request.caption.clone(),
        channel: request.channel,
        image: request.image.clone(),
        product_title: request.product_title.clone(),
        status: ItemStatus::Scheduled,
    };

    let mut calendar = load_calendar(store, &session_id);
    calendar.add(item.clone());
    save_calendar(store, &session_id, &calendar)?;
    info!("Scheduled {:?} post for {} {}", item.channel, item.date, item.time);

    let settings = load_settings(store, &session_id);
    let webhook = send_webhook(&state, &settings.webhook_url, &request).await;

    Ok((
        jar,
        (
            StatusCode::CREATED,
            Json(json!({ "item": item, "webhook": webhook })),
        ),
    ))
}

/// Fire-and-report: a failed webhook never undoes the local save.
async fn send_webhook(
    state: &AppState,
    webhook_url: &str,
    request: &ScheduleRequest,
) -> WebhookOutcome {
    let webhook_url = webhook_url.trim();
    if webhook_url.is_empty() {
        return WebhookOutcome::Skipped;
    }

    let url = match url::Url::parse(webhook_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url,
        _ => {
            warn!("Ignoring invalid webhook URL: {}", webhook_url);
            return WebhookOutcome::Failed;
        }
    };

    let payload = WebhookPayload {
        caption: &request.caption,
        channel: request.channel,
        schedule_at: format!("{}T{}", request.date, request.time),
        image: request.image.as_deref(),
        product_title: request.product_title.as_deref(),
        product_url: request.product_url.as_deref(),
        source: request.source.as_deref(),
    };

    match state.http_client.post(url).json(&payload).send().await {
        Ok(response) if response.status().is_success() => {
            debug!("Webhook accepted schedule ({})", response.status());
            WebhookOutcome::Sent
        }
        Ok(response) => {
            warn!("Webhook rejected schedule: {}", response.status());
            WebhookOutcome::Failed
        }
        Err(e) => {
            warn!("Webhook delivery failed: {}", e);
            WebhookOutcome::Failed
        }
    }
}

pub async fn update_status(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path(id): Path<String>,
    payload: std::result::Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(update) = payload?;
    let (jar, session_id) = ensure_session(jar);
    let store = state.store.as_ref();

    let mut calendar = load_calendar(store, &session_id);
    let item = calendar
        .set_status(&id, update.status)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("Calendar item {} not found", id)))?;
    save_calendar(store, &session_id, &calendar)?;

    Ok((jar, Json(item)))
}

pub async fn delete(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let (jar, session_id) = ensure_session(jar);
    let store = state.store.as_ref();

    let mut calendar = load_calendar(store, &session_id);
    calendar
        .remove(&id)
        .ok_or_else(|| AppError::NotFound(format!("Calendar item {} not found", id)))?;
    save_calendar(store, &session_id, &calendar)?;

    Ok((jar, Json(json!({ "deleted": id }))))
}

pub async fn duplicate(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let (jar, session_id) = ensure_session(jar);
    let store = state.store.as_ref();

    let mut calendar = load_calendar(store, &session_id);
    let cloned = calendar.duplicate_next_day(&id)?;
    save_calendar(store, &session_id, &calendar)?;

    Ok((jar, (StatusCode::CREATED, Json(cloned))))
}

pub async fn export(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<impl IntoResponse> {
    let (jar, session_id) = ensure_session(jar);
    let calendar = load_calendar(state.store.as_ref(), &session_id);
    let body = calendar.export_json()?;

    let filename = format!(
        "attachment; filename=\"resellio-calendar-{}.json\"",
        chrono::Utc::now().format("%Y-%m-%d")
    );

    Ok((
        jar,
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, filename),
        ],
        body,
    ))
}

pub async fn import(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let calendar = Calendar::import_json(&body)
        .ok_or_else(|| AppError::BadRequest("Import file is invalid or empty".into()))?;

    let (jar, session_id) = ensure_session(jar);
    save_calendar(state.store.as_ref(), &session_id, &calendar)?;
    info!("Imported {} calendar items", calendar.items().len());

    Ok((jar, Json(json!({ "imported": calendar.items().len() }))))
}

pub async fn tips(Query(query): Query<TipQuery>) -> impl IntoResponse {
    Json(json!({
        "channel": query.channel,
        "day_part": query.day_part,
        "tip": posting_tip(query.channel, query.day_part),
    }))
}

pub async fn get_settings(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<impl IntoResponse> {
    let (jar, session_id) = ensure_session(jar);
    Ok((jar, Json(load_settings(state.store.as_ref(), &session_id))))
}

pub async fn put_settings(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    payload: std::result::Result<Json<Settings>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(settings) = payload?;
    let (jar, session_id) = ensure_session(jar);
    save_json(
        state.store.as_ref(),
        &scoped_key(&session_id, SETTINGS_KEY),
        &settings,
        None,
    )?;

    Ok((jar, Json(settings)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn item(id: &str, date: &str, time: &str, channel: Channel) -> CalendarItem {
        CalendarItem {
            id: id.to_string(),
            date: date.to_string(),
            time: time.to_string(),
            caption: format!("Caption {}", id),
            channel,
            image: None,
            product_title: None,
            status: ItemStatus::Scheduled,
        }
    }

    #[test]
    fn add_keeps_chronological_order() {
        let mut calendar = Calendar::default();
        calendar.add(item("b", "2026-10-18", "19:00", Channel::Instagram));
        calendar.add(item("a", "2026-10-17", "08:00", Channel::Facebook));
        calendar.add(item("c", "2026-10-18", "07:30", Channel::Instagram));

        let ids: Vec<_> = calendar.items().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }

    #[test]
    fn status_update_and_remove() {
        let mut calendar = Calendar::new(vec![item("x", "2026-10-17", "08:00", Channel::Instagram)]);
        assert!(calendar.set_status("x", ItemStatus::Posted).is_some());
        assert_eq!(calendar.stats().posted, 1);
        assert!(calendar.set_status("missing", ItemStatus::Posted).is_none());

        assert!(calendar.remove("x").is_some());
        assert!(calendar.remove("x").is_none());
        assert!(calendar.items().is_empty());
    }

    #[test]
    fn duplicate_moves_one_day_as_draft() {
        let mut calendar = Calendar::new(vec![item("x", "2026-12-31", "21:15", Channel::Facebook)]);
        let copy = calendar.duplicate_next_day("x").unwrap();

        assert_ne!(copy.id, "x");
        assert_eq!(copy.date, "2027-01-01");
        assert_eq!(copy.time, "21:15");
        assert_eq!(copy.status, ItemStatus::Draft);
        assert_eq!(copy.caption, "Caption x");
        assert_eq!(calendar.items().len(), 2);
        assert_eq!(calendar.items()[1].id, copy.id);
    }

    #[test]
    fn duplicate_unknown_or_malformed() {
        let mut calendar = Calendar::new(vec![item("bad", "tomorrow", "08:00", Channel::Facebook)]);
        assert!(matches!(
            calendar.duplicate_next_day("nope"),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            calendar.duplicate_next_day("bad"),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn filter_by_channel_and_keyword() {
        let mut with_title = item("t", "2026-10-17", "10:00", Channel::Instagram);
        with_title.product_title = Some("Tumbler Stainless".into());
        let calendar = Calendar::new(vec![
            with_title,
            item("f", "2026-10-17", "11:00", Channel::Facebook),
        ]);

        assert_eq!(calendar.filter(None, "").len(), 2);
        assert_eq!(calendar.filter(Some(Channel::Facebook), "").len(), 1);
        assert_eq!(calendar.filter(None, "  TUMBLER ").len(), 1);
        assert_eq!(calendar.filter(Some(Channel::Facebook), "tumbler").len(), 0);

        let stats = calendar.stats();
        assert_eq!((stats.instagram, stats.facebook, stats.posted), (1, 1, 0));
    }

    #[test]
    fn export_import_round_trip() {
        let mut rich = item("1", "2026-10-17", "19:00", Channel::Instagram);
        rich.image = Some("https://cdn.example/a.jpg".into());
        rich.product_title = Some("Hijab \"Voal\"".into());
        rich.status = ItemStatus::Posted;

        let calendar = Calendar::new(vec![
            rich,
            item("2", "2026-10-16", "08:00", Channel::Facebook),
        ]);

        let exported = calendar.export_json().unwrap();
        let imported = Calendar::import_json(exported.as_bytes()).unwrap();
        assert_eq!(imported, calendar);
    }

    #[test]
    fn stored_items_use_camel_case() {
        let mut with_title = item("1", "2026-10-17", "19:00", Channel::Instagram);
        with_title.product_title = Some("Rak".into());
        let value = serde_json::to_value(&with_title).unwrap();
        assert_eq!(value["productTitle"], "Rak");
        assert!(value.get("image").is_none());
    }

    #[test]
    fn import_rejects_empty_or_garbage() {
        assert!(Calendar::import_json(b"[]").is_none());
        assert!(Calendar::import_json(b"{\"items\":[]}").is_none());
        assert!(Calendar::import_json(b"nope").is_none());
    }

    #[test]
    fn corrupt_storage_reads_as_empty() {
        let store = MemoryStore::in_memory();
        store.set(&scoped_key("sid", CALENDAR_KEY), "[{broken".into(), None);
        store.set(&scoped_key("sid", SETTINGS_KEY), "42".into(), None);

        assert!(load_calendar(&store, "sid").items().is_empty());
        assert_eq!(load_settings(&store, "sid"), Settings::default());
    }

    #[test]
    fn partial_settings_take_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"markup": 40, "tone": "premium", "dayPart": "pagi"}"#).unwrap();
        assert_eq!(settings.markup, 40.0);
        assert_eq!(settings.tone, Tone::Premium);
        assert_eq!(settings.day_part, DayPart::Pagi);
        assert_eq!(settings.shipping, 12_000.0);
        assert_eq!(settings.niche, "Fashion Wanita");
    }

    #[test]
    fn tips_cover_every_slot() {
        assert!(posting_tip(Channel::Instagram, DayPart::Malam).starts_with("19:00"));
        assert!(posting_tip(Channel::Facebook, DayPart::Siang).contains("WhatsApp"));
    }
}
