//! Demo event pages: listing, creation, editing and postponing.

use std::sync::Arc;

use anyhow::Context as _;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, get, post};
use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::Routes;
use crate::error::AppResult;
use crate::flash::Flashes;
use crate::form::parsers::{MSG_INVALID_DURATION, parse_duration, parse_integer};
use crate::form::{
    CsrfSigner, DateTimeLocalConfig, FieldDef, Form, FormBuilder, FormSchema, FormValues,
    HiddenConfig, SchemaError, SelectConfig, TextConfig, format_datetime_local,
};
use crate::middleware::{BasicAuth, require_basic_auth, require_csrf};
use crate::models::event::EVENT_PARTITION;
use crate::models::{Event, EventInput, StoreError};
use crate::state::AppState;
use crate::theme::{Page, redirect};

pub const MSG_END_BEFORE_START: &str = "End time must be after the start time.";
pub const MSG_EDIT_CONFLICT: &str = "This event was changed meanwhile. Review it and save again.";

const EVENT_KINDS: [(&str, &str); 3] = [
    ("meetup", "Meetup"),
    ("workshop", "Workshop"),
    ("talk", "Talk"),
];

/// Schema for the create page.
pub fn event_form(csrf: Arc<CsrfSigner>, tz: Tz) -> Result<FormSchema, SchemaError> {
    event_fields(FormBuilder::new().csrf(csrf), tz).done()
}

/// Schema for the edit page: the event fields plus the version being edited.
pub fn event_edit_form(csrf: Arc<CsrfSigner>, tz: Tz) -> Result<FormSchema, SchemaError> {
    event_fields(FormBuilder::new().csrf(csrf), tz)
        .field(
            "version",
            FieldDef::hidden(HiddenConfig::new().parse(parse_integer(Some(1), None))).required(),
        )
        .done()
}

fn event_fields(builder: FormBuilder, tz: Tz) -> FormBuilder {
    builder
        .field(
            "name",
            FieldDef::text(TextConfig::new().max_length(100))
                .label("Name")
                .required(),
        )
        .field(
            "description",
            FieldDef::text(TextConfig::new().multiline().max_length(2000)).label("Description"),
        )
        .field(
            "kind",
            FieldDef::select(SelectConfig::new(EVENT_KINDS).radio())
                .label("Kind")
                .required(),
        )
        .field(
            "start_time",
            FieldDef::datetime_local(DateTimeLocalConfig::new().time_zone(tz))
                .label("Starts")
                .required(),
        )
        .field(
            "end_time",
            FieldDef::datetime_local(DateTimeLocalConfig::new().time_zone(tz)).label("Ends"),
        )
}

/// Event routes. Creating and editing require `auth` when given; the JSON
/// postpone endpoint also requires a CSRF token signed by `csrf`.
pub fn routes(auth: Option<BasicAuth>, csrf: Arc<CsrfSigner>) -> Routes {
    let guard = |handler: MethodRouter<AppState>| match &auth {
        Some(auth) => handler.layer(from_fn_with_state(auth.clone(), require_basic_auth)),
        None => handler,
    };

    Routes::new()
        .route("events.list", "/events", get(list))
        .route(
            "events.create",
            "/events/create",
            guard(get(create_form).post(create)),
        )
        .route(
            "events.edit",
            "/events/{id}/edit",
            guard(get(edit_form).post(update)),
        )
        .route(
            "events.postpone",
            "/events/{id}/postpone",
            guard(post(postpone).layer(from_fn_with_state(csrf, require_csrf))),
        )
}

/// Edit submission: the event plus the version it was loaded at.
#[derive(Debug, Deserialize)]
struct EventEdit {
    version: u64,
    #[serde(flatten)]
    event: EventInput,
}

impl AsRef<EventInput> for EventEdit {
    fn as_ref(&self) -> &EventInput {
        &self.event
    }
}

impl AsRef<EventInput> for EventInput {
    fn as_ref(&self) -> &EventInput {
        self
    }
}

/// Event as shown in the listing.
#[derive(Debug, Serialize)]
struct EventView {
    id: String,
    name: String,
    description: String,
    kind: String,
    starts: String,
    ends: Option<String>,
    edit_url: String,
}

fn display_time(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z").to_string()
}

fn view(state: &AppState, event: &Event) -> AppResult<EventView> {
    let tz = state.time_zone();
    Ok(EventView {
        id: event.id().to_string(),
        name: event.name.clone(),
        description: event.description.clone(),
        kind: event.kind.clone(),
        starts: display_time(event.start_time, tz),
        ends: event.end_time.map(|end| display_time(end, tz)),
        edit_url: state
            .route_names()
            .path_for("events.edit", &[("id", event.id())])?,
    })
}

async fn list(
    State(state): State<AppState>,
    flashes: Flashes,
    headers: HeaderMap,
) -> AppResult<Response> {
    let events = state.events().list(EVENT_PARTITION).await?;
    let views = events
        .iter()
        .map(|event| view(&state, event))
        .collect::<AppResult<Vec<_>>>()?;

    state.theme().render(
        Page::new("events/list.html")
            .insert("title", "Events")
            .insert("events", &views),
        &flashes,
        &headers,
    )
}

fn form_page(
    state: &AppState,
    status: StatusCode,
    title: &str,
    action: &str,
    form: &Form,
) -> Page {
    Page::new("events/form.html")
        .status(status)
        .insert("title", title)
        .insert("action", action)
        .insert("form", form)
        .insert("time_zone", state.time_zone().name())
}

/// Parse a submission into typed input, adding cross-field errors.
fn parse_submission<T>(schema: &FormSchema, values: &FormValues) -> AppResult<(Form, Option<T>)>
where
    T: DeserializeOwned + AsRef<EventInput>,
{
    let (mut form, data) = schema.parse(values);
    if form.has_errors() {
        return Ok((form, None));
    }

    let input: T = data
        .into_typed()
        .context("event form produced values the event input cannot hold")?;

    let event = input.as_ref();
    if let Some(end) = event.end_time
        && end <= event.start_time
    {
        form.errors.push(MSG_END_BEFORE_START.to_string());
        return Ok((form, None));
    }
    Ok((form, Some(input)))
}

async fn create_form(
    State(state): State<AppState>,
    flashes: Flashes,
    headers: HeaderMap,
) -> AppResult<Response> {
    let action = state.route_names().url_for("events.create")?;
    let form = state.event_form().empty();
    state.theme().render(
        form_page(&state, StatusCode::OK, "New event", action, &form),
        &flashes,
        &headers,
    )
}

async fn create(
    State(state): State<AppState>,
    mut flashes: Flashes,
    headers: HeaderMap,
    values: FormValues,
) -> AppResult<Response> {
    let action = state.route_names().url_for("events.create")?;
    let (form, input) = parse_submission::<EventInput>(state.event_form(), &values)?;
    let Some(input) = input else {
        debug!("event form rejected");
        return state.theme().render(
            form_page(&state, StatusCode::BAD_REQUEST, "New event", action, &form),
            &flashes,
            &headers,
        );
    };

    let event = state.events().create(Event::new(input)).await?;
    info!(id = %event.id(), name = %event.name, "event created");

    flashes.success("Event created.");
    Ok(redirect(state.route_names().url_for("events.list")?, &flashes))
}

fn prefill_values(event: &Event, tz: Tz) -> FormValues {
    let mut values = FormValues::from_pairs([
        ("name", event.name.clone()),
        ("description", event.description.clone()),
        ("kind", event.kind.clone()),
        ("start_time", format_datetime_local(event.start_time, Some(tz))),
        ("version", event.base.version.to_string()),
    ]);
    if let Some(end) = event.end_time {
        values.append("end_time", format_datetime_local(end, Some(tz)));
    }
    values
}

async fn edit_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
    flashes: Flashes,
    headers: HeaderMap,
) -> AppResult<Response> {
    let event = state
        .events()
        .get(EVENT_PARTITION, &Event::sort_key(&id))
        .await?;
    let action = state.route_names().path_for("events.edit", &[("id", &id)])?;
    let form = state
        .event_edit_form()
        .prefilled(&prefill_values(&event, state.time_zone()));

    state.theme().render(
        form_page(&state, StatusCode::OK, "Edit event", &action, &form),
        &flashes,
        &headers,
    )
}

async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut flashes: Flashes,
    headers: HeaderMap,
    values: FormValues,
) -> AppResult<Response> {
    let mut event = state
        .events()
        .get(EVENT_PARTITION, &Event::sort_key(&id))
        .await?;
    let action = state.route_names().path_for("events.edit", &[("id", &id)])?;

    let (mut form, edit) = parse_submission::<EventEdit>(state.event_edit_form(), &values)?;
    let Some(EventEdit { version, event: input }) = edit else {
        // a missing or garbled version can only be stale
        let status = if form.field("version").is_some_and(|f| !f.errors.is_empty()) {
            form.set_value("version", event.base.version.to_string());
            form.errors.push(MSG_EDIT_CONFLICT.to_string());
            StatusCode::CONFLICT
        } else {
            StatusCode::BAD_REQUEST
        };
        return state.theme().render(
            form_page(&state, status, "Edit event", &action, &form),
            &flashes,
            &headers,
        );
    };

    event.apply(input);
    match state.events().update(event, version).await {
        Ok(event) => {
            info!(id = %event.id(), version = event.base.version, "event updated");
            flashes.success("Event saved.");
            Ok(redirect(state.route_names().url_for("events.list")?, &flashes))
        }
        Err(StoreError::Conflict { .. }) => {
            let current = state
                .events()
                .get(EVENT_PARTITION, &Event::sort_key(&id))
                .await?;
            form.set_value("version", current.base.version.to_string());
            form.errors.push(MSG_EDIT_CONFLICT.to_string());
            state.theme().render(
                form_page(&state, StatusCode::CONFLICT, "Edit event", &action, &form),
                &flashes,
                &headers,
            )
        }
        Err(e) => Err(e.into()),
    }
}

/// Body of a postpone request, e.g. `{"by": "1h30m", "version": 3}`.
#[derive(Debug, Deserialize)]
struct PostponeRequest {
    by: String,
    version: u64,
}

/// Event times after a postpone.
#[derive(Debug, Serialize)]
struct Postponed {
    id: String,
    version: u64,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
}

fn json_errors(status: StatusCode, errors: Vec<String>) -> Response {
    (status, Json(json!({ "errors": errors }))).into_response()
}

/// Move an event later by a duration like `45m` or `1h30m`.
async fn postpone(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<PostponeRequest>,
) -> AppResult<Response> {
    let by = match parse_duration().call(request.by.trim()) {
        Ok(secs) => secs.as_i64().and_then(TimeDelta::try_seconds),
        Err(errors) => return Ok(json_errors(StatusCode::BAD_REQUEST, errors)),
    };
    let Some(by) = by else {
        return Ok(json_errors(
            StatusCode::BAD_REQUEST,
            vec![MSG_INVALID_DURATION.to_string()],
        ));
    };

    let mut event = state
        .events()
        .get(EVENT_PARTITION, &Event::sort_key(&id))
        .await?;
    event.postpone(by);
    match state.events().update(event, request.version).await {
        Ok(event) => {
            info!(
                id = %event.id(),
                version = event.base.version,
                by = %request.by,
                "event postponed"
            );
            Ok(Json(Postponed {
                id: event.id().to_string(),
                version: event.base.version,
                start_time: event.start_time,
                end_time: event.end_time,
            })
            .into_response())
        }
        Err(StoreError::Conflict { .. }) => Ok(json_errors(
            StatusCode::CONFLICT,
            vec![MSG_EDIT_CONFLICT.to_string()],
        )),
        Err(e) => Err(e.into()),
    }
}
