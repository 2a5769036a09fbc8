//! Calendar CRUD handlers.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::handler::{optional_str, required_str, ServiceClient, ToolHandler};

fn render_events(response: &Value) -> String {
    let events: Vec<String> = response
        .get("events")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|e| {
                    let title = e.get("title").and_then(Value::as_str)?;
                    let start = e.get("start").and_then(Value::as_str).unwrap_or("?");
                    Some(format!("{start} — {title}"))
                })
                .collect()
        })
        .unwrap_or_default();

    if events.is_empty() {
        "No events in that range.".to_string()
    } else {
        events.join("\n")
    }
}

pub struct CalendarListEvents {
    client: ServiceClient,
}

impl CalendarListEvents {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for CalendarListEvents {
    async fn call(&self, arguments: &Value) -> Result<String, ToolError> {
        let mut query = Vec::new();
        if let Some(start) = optional_str(arguments, "start") {
            query.push(("start", start.to_string()));
        }
        if let Some(end) = optional_str(arguments, "end") {
            query.push(("end", end.to_string()));
        }
        let response = self.client.get_json("/events", &query).await?;
        Ok(render_events(&response))
    }
}

pub struct CalendarCreateEvent {
    client: ServiceClient,
}

impl CalendarCreateEvent {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for CalendarCreateEvent {
    async fn call(&self, arguments: &Value) -> Result<String, ToolError> {
        let title = required_str(arguments, "title")?;
        let start = required_str(arguments, "start")?;
        let body = json!({
            "title": title,
            "start": start,
            "end": optional_str(arguments, "end"),
        });
        let created = self.client.post_json("/events", &body).await?;
        let id = created
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("<unknown>");
        Ok(format!("Created event '{title}' at {start} (id {id})."))
    }
}

pub struct CalendarUpdateEvent {
    client: ServiceClient,
}

impl CalendarUpdateEvent {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for CalendarUpdateEvent {
    async fn call(&self, arguments: &Value) -> Result<String, ToolError> {
        let event_id = required_str(arguments, "event_id")?;
        let mut body = serde_json::Map::new();
        for key in ["title", "start", "end"] {
            if let Some(value) = optional_str(arguments, key) {
                body.insert(key.to_string(), Value::String(value.to_string()));
            }
        }
        if body.is_empty() {
            return Err(ToolError::BadArguments(
                "update requires at least one of title, start, end".to_string(),
            ));
        }
        self.client
            .post_json(&format!("/events/{event_id}"), &Value::Object(body))
            .await?;
        Ok(format!("Updated event {event_id}."))
    }
}

pub struct CalendarDeleteEvent {
    client: ServiceClient,
}

impl CalendarDeleteEvent {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for CalendarDeleteEvent {
    async fn call(&self, arguments: &Value) -> Result<String, ToolError> {
        let event_id = required_str(arguments, "event_id")?;
        self.client.delete(&format!("/events/{event_id}")).await?;
        Ok(format!("Deleted event {event_id}."))
    }
}
