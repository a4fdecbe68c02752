//! Tools backed by the equipment-booking HTTP service.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use super::executor::CREDENTIAL_KEY;
use super::handler::{ToolDescriptor, ToolHandler};
use super::registry::ToolRegistry;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REASON: &str = "Equipment usage";
const DEFAULT_TIMEZONE: &str = "Europe/Zurich";
const TIME_SUFFIX: &str = ":00.000Z";

/// Shared client for the booking backend. One per process; `reqwest::Client`
/// is safe to use from concurrent tool calls.
pub struct BookingBackend {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

/// Body of `POST /bookings`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingRequest {
    pub tool_ids: Vec<String>,
    pub date: String,
    pub time_start: String,
    pub time_end: String,
    pub timezone: String,
    pub number_of_people: u32,
    pub reason: String,
}

impl BookingBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `GET /tools/by-site/bookable` rendered as a numbered listing.
    pub async fn search_equipment(&self, site_name: &str, token: &str) -> Result<String, String> {
        let resp = self
            .client
            .get(format!("{}/tools/by-site/bookable", self.base_url))
            .query(&[("site_name", site_name)])
            .bearer_auth(token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| format!("Error searching equipment: {e}"))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("Error searching equipment: {e}"))?;

        if status != 200 {
            return Err(format!("Error searching equipment: {status} - {text}"));
        }

        let items: Vec<Value> = serde_json::from_str(&text)
            .map_err(|e| format!("Error searching equipment: invalid response: {e}"))?;

        Ok(format_equipment_list(site_name, &items))
    }

    /// `POST /bookings` rendered as a confirmation.
    pub async fn book_equipment(&self, booking: &BookingRequest, token: &str) -> Result<String, String> {
        debug!(
            tools = booking.tool_ids.len(),
            date = %booking.date,
            "booking payload prepared"
        );

        let resp = self
            .client
            .post(format!("{}/bookings", self.base_url))
            .bearer_auth(token)
            .timeout(self.timeout)
            .json(booking)
            .send()
            .await
            .map_err(|e| format!("Error creating booking: {e}"))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("Error creating booking: {e}"))?;

        if status != 200 && status != 201 {
            return Err(format!("Error creating booking: {status} - {}", error_detail(&text)));
        }

        let booking_id = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("id").map(display_value));

        Ok(format_confirmation(booking, booking_id.as_deref()))
    }
}

/// Register `search_equipment` and `book_equipment` against `backend`.
pub fn register(registry: ToolRegistry, backend: Arc<BookingBackend>) -> ToolRegistry {
    registry
        .add(
            search_descriptor(),
            SearchEquipment {
                backend: backend.clone(),
            },
        )
        .add(book_descriptor(), BookEquipment { backend })
}

fn search_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "search_equipment",
        "Search for available equipment at a specific site.",
        json!({
            "type": "object",
            "properties": {
                "site_name": {
                    "type": "string",
                    "description": "The name of the site to search for equipment (e.g. \"Basel pRED\")"
                }
            },
            "required": ["site_name"]
        }),
    )
}

fn book_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "book_equipment",
        "Create a booking for equipment.",
        json!({
            "type": "object",
            "properties": {
                "equipment_ids": {
                    "type": "string",
                    "description": "Comma-separated equipment IDs (e.g. \"id1\" or \"id1,id2\")"
                },
                "date": {"type": "string", "description": "Date of booking, YYYY-MM-DD"},
                "time_start": {"type": "string", "description": "Start time, HH:MM"},
                "time_end": {"type": "string", "description": "End time, HH:MM"},
                "number_of_people": {"type": "integer", "default": 1},
                "reason": {"type": "string", "default": DEFAULT_REASON},
                "timezone": {"type": "string", "default": DEFAULT_TIMEZONE}
            },
            "required": ["equipment_ids", "date", "time_start", "time_end"]
        }),
    )
}

struct SearchEquipment {
    backend: Arc<BookingBackend>,
}

#[async_trait]
impl ToolHandler for SearchEquipment {
    async fn call(&self, input: &Value) -> Result<String, String> {
        let site_name = required_str(input, "site_name")?;
        let token = required_str(input, CREDENTIAL_KEY)?;
        self.backend.search_equipment(site_name, token).await
    }
}

struct BookEquipment {
    backend: Arc<BookingBackend>,
}

#[async_trait]
impl ToolHandler for BookEquipment {
    async fn call(&self, input: &Value) -> Result<String, String> {
        let token = required_str(input, CREDENTIAL_KEY)?;
        let booking = booking_request(input)?;
        self.backend.book_equipment(&booking, token).await
    }
}

fn required_str<'a>(input: &'a Value, key: &str) -> Result<&'a str, String> {
    input[key]
        .as_str()
        .ok_or_else(|| format!("missing required argument: {key}"))
}

fn optional_str<'a>(input: &'a Value, key: &str, default: &'a str) -> &'a str {
    input[key].as_str().filter(|s| !s.trim().is_empty()).unwrap_or(default)
}

fn booking_request(input: &Value) -> Result<BookingRequest, String> {
    let tool_ids = match &input["equipment_ids"] {
        Value::String(s) => normalize_equipment_ids(s),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .flat_map(normalize_equipment_ids)
            .collect(),
        _ => return Err("missing required argument: equipment_ids".into()),
    };
    if tool_ids.is_empty() {
        return Err("Error creating booking: no equipment IDs given".into());
    }

    let number_of_people = match &input["number_of_people"] {
        Value::Null => 1,
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| format!("invalid number_of_people: {n}"))?,
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| format!("invalid number_of_people: {s}"))?,
        other => return Err(format!("invalid number_of_people: {other}")),
    };

    Ok(BookingRequest {
        tool_ids,
        date: required_str(input, "date")?.to_string(),
        time_start: format!("{}{TIME_SUFFIX}", required_str(input, "time_start")?),
        time_end: format!("{}{TIME_SUFFIX}", required_str(input, "time_end")?),
        timezone: optional_str(input, "timezone", DEFAULT_TIMEZONE).to_string(),
        number_of_people,
        reason: optional_str(input, "reason", DEFAULT_REASON).to_string(),
    })
}

/// Turn `"[\"a\", 'b', c]"`-ish model output into bare identifiers.
pub fn normalize_equipment_ids(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);

    inner
        .split(',')
        .map(|id| id.trim().trim_matches(|c| c == '"' || c == '\''))
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect()
}

fn format_equipment_list(site_name: &str, items: &[Value]) -> String {
    if items.is_empty() {
        return format!("No equipment found at site: {site_name}");
    }

    let mut out = format!("Found {} equipment items at {site_name}:\n\n", items.len());
    for (idx, item) in items.iter().enumerate() {
        let location = &item["location"];
        let contact = &item["responsible_person"];
        let check_in = if item["requires_check_in"].as_bool().unwrap_or(false) {
            "Yes"
        } else {
            "No"
        };

        out.push_str(&format!(
            "{}. {} {}\n",
            idx + 1,
            field(item, "manufacturer", "Unknown"),
            field(item, "equipment_model", "Unknown Model"),
        ));
        out.push_str(&format!("   Category: {}\n", field(item, "category", "Unknown")));
        out.push_str(&format!("   Material #: {}\n", field(item, "material_number", "N/A")));
        out.push_str(&format!(
            "   Location: Room {}, Floor {}, Building {}\n",
            field(location, "room", "N/A"),
            field(location, "floor", "N/A"),
            field(location, "building", "N/A"),
        ));
        out.push_str(&format!(
            "   Contact: {} {} ({})\n",
            field(contact, "first_name", "Unknown"),
            field(contact, "last_name", ""),
            field(contact, "email", "N/A"),
        ));
        out.push_str(&format!("   Check-in required: {check_in}\n"));
        out.push_str(&format!("   ID: {}\n\n", field(item, "id", "N/A")));
    }
    out
}

fn format_confirmation(booking: &BookingRequest, booking_id: Option<&str>) -> String {
    let strip = |t: &str| t.strip_suffix(TIME_SUFFIX).unwrap_or(t).to_string();

    let mut out = String::from("Booking created successfully!\n\nBooking Details:\n");
    out.push_str(&format!("- Equipment IDs: {}\n", booking.tool_ids.join(", ")));
    out.push_str(&format!("- Date: {}\n", booking.date));
    out.push_str(&format!(
        "- Time: {} - {} ({})\n",
        strip(&booking.time_start),
        strip(&booking.time_end),
        booking.timezone
    ));
    out.push_str(&format!("- Number of people: {}\n", booking.number_of_people));
    out.push_str(&format!("- Reason: {}\n", booking.reason));
    if let Some(id) = booking_id {
        out.push_str(&format!("- Booking ID: {id}\n"));
    }
    out
}

/// FastAPI-style `{"detail": ...}` if present, else the raw body.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("detail").map(display_value))
        .unwrap_or_else(|| body.to_string())
}

fn field(obj: &Value, key: &str, default: &str) -> String {
    match obj.get(key) {
        None | Some(Value::Null) => default.to_string(),
        Some(v) => display_value(v),
    }
}

fn display_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
