use crate::domain::models::{Priority, Task};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use url::Url;

const GOOGLE_CALENDAR_RENDER_ENDPOINT: &str = "https://calendar.google.com/calendar/render";
const DEFAULT_EVENT_MINUTES: i64 = 90;
const DEFAULT_START_TIME: &str = "09:00";

#[derive(Debug, Clone, serde::Serialize, PartialEq, Eq)]
pub struct CalendarLinkResponse {
    pub success: bool,
    pub ical_content: String,
    pub google_calendar_url: String,
    pub message: String,
}

pub fn build_calendar_link(
    task: &Task,
    timezone: &str,
    now: DateTime<Utc>,
) -> Result<CalendarLinkResponse, InfraError> {
    let tz: Tz = timezone
        .trim()
        .parse()
        .map_err(|_| InfraError::InvalidConfig(format!("unknown timezone: {timezone}")))?;
    let (start, end) = resolve_event_window(task, tz, now)?;

    let ical_content = build_ical(task, start, end, now);
    let google_calendar_url = build_google_calendar_url(task, start, end)?;

    Ok(CalendarLinkResponse {
        success: true,
        ical_content,
        google_calendar_url,
        message: format!("calendar event prepared for '{}'", task.title),
    })
}

// Free-text estimates like "30 minutes", "2 hours", "1.5h" or
// "1 hour 20 minutes". Anything unrecognized falls back to 90 minutes.
pub fn parse_estimated_minutes(text: &str) -> Option<i64> {
    let normalized = text.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return None;
    }

    let mut total_minutes = 0f64;
    let mut matched = false;
    let mut pending_number: Option<f64> = None;

    for token in normalized
        .split(|character: char| !(character.is_ascii_alphanumeric() || character == '.'))
        .filter(|token| !token.is_empty())
        .flat_map(split_number_suffix)
    {
        if let Ok(value) = token.parse::<f64>() {
            pending_number = Some(value);
            continue;
        }
        let Some(value) = pending_number.take() else {
            continue;
        };
        match token {
            "h" | "hr" | "hrs" | "hour" | "hours" => {
                total_minutes += value * 60.0;
                matched = true;
            }
            "m" | "min" | "mins" | "minute" | "minutes" => {
                total_minutes += value;
                matched = true;
            }
            _ => {}
        }
    }

    if !matched || total_minutes <= 0.0 {
        return None;
    }
    Some(total_minutes.round() as i64)
}

// "90m" and "2h" arrive as a single token; peel the numeric prefix off so
// the unit can be matched separately.
fn split_number_suffix(token: &str) -> Vec<&str> {
    let split_at = token
        .find(|character: char| character.is_ascii_alphabetic())
        .unwrap_or(token.len());
    if split_at == 0 || split_at == token.len() {
        return vec![token];
    }
    vec![&token[..split_at], &token[split_at..]]
}

fn resolve_event_window(
    task: &Task,
    tz: Tz,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), InfraError> {
    let date = match task.due_date.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
        Some(raw) => chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|error| {
            InfraError::InvalidConfig(format!("task.due_date must be YYYY-MM-DD: {error}"))
        })?,
        None => now.with_timezone(&tz).date_naive() + Duration::days(1),
    };
    let time_raw = task
        .due_time
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_START_TIME);
    let time = NaiveTime::parse_from_str(time_raw, "%H:%M").map_err(|error| {
        InfraError::InvalidConfig(format!("task.due_time must be HH:MM: {error}"))
    })?;

    let local_start = date.and_time(time);
    let start = tz
        .from_local_datetime(&local_start)
        .earliest()
        .map(|value| value.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&local_start));

    let minutes =
        parse_estimated_minutes(&task.estimated_time).unwrap_or(DEFAULT_EVENT_MINUTES);
    Ok((start, start + Duration::minutes(minutes)))
}

pub fn build_event_description(task: &Task) -> String {
    let mut description = String::new();
    if let Some(task_description) = task
        .description
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        description.push_str(task_description);
        description.push('\n');
    }

    if !task.subtasks.is_empty() {
        description.push_str("Subtasks:\n");
        for subtask in &task.subtasks {
            description.push_str("- ");
            description.push_str(subtask);
            description.push('\n');
        }
    }
    if !task.tags.is_empty() {
        description.push_str("Tags: ");
        description.push_str(&task.tags.join(", "));
        description.push('\n');
    }

    description.push_str(&format!(
        "Priority: {} | Category: {} | Estimated: {}",
        priority_label(task.priority),
        task.category,
        task.estimated_time
    ));
    description
}

fn priority_label(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "low",
        Priority::Medium => "medium",
        Priority::High => "high",
        Priority::Urgent => "urgent",
    }
}

pub fn format_basic_utc(value: DateTime<Utc>) -> String {
    value.format("%Y%m%dT%H%M%SZ").to_string()
}

fn build_ical(task: &Task, start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let description = build_event_description(task);
    let lines = [
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "PRODID:-//TaskPilot//Task Calendar//EN".to_string(),
        "BEGIN:VEVENT".to_string(),
        format!("UID:{}@taskpilot", task.id),
        format!("DTSTAMP:{}", format_basic_utc(now)),
        format!("DTSTART:{}", format_basic_utc(start)),
        format!("DTEND:{}", format_basic_utc(end)),
        format!("SUMMARY:{}", escape_ical_text(&task.title)),
        format!("DESCRIPTION:{}", escape_ical_text(&description)),
        "END:VEVENT".to_string(),
        "END:VCALENDAR".to_string(),
    ];
    let mut content = lines.join("\r\n");
    content.push_str("\r\n");
    content
}

fn escape_ical_text(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}

fn build_google_calendar_url(
    task: &Task,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<String, InfraError> {
    let mut url = Url::parse(GOOGLE_CALENDAR_RENDER_ENDPOINT).map_err(|error| {
        InfraError::InvalidConfig(format!("invalid calendar render base url: {error}"))
    })?;
    url.query_pairs_mut()
        .append_pair("action", "TEMPLATE")
        .append_pair("text", &task.title)
        .append_pair(
            "dates",
            &format!("{}/{}", format_basic_utc(start), format_basic_utc(end)),
        )
        .append_pair("details", &build_event_description(task));
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-08-07T12:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_task() -> Task {
        Task {
            id: "tsk-9".to_string(),
            title: "Prepare demo".to_string(),
            description: Some("Walk through the planner".to_string()),
            subtasks: vec!["Record screen".to_string(), "Write notes".to_string()],
            tags: vec!["demo".to_string()],
            priority: Priority::High,
            category: "work".to_string(),
            estimated_time: "1 hour 30 minutes".to_string(),
            due_date: Some("2026-08-10".to_string()),
            due_time: Some("14:00".to_string()),
            completed: false,
            created_at: fixed_now(),
        }
    }

    #[test]
    fn parse_estimated_minutes_handles_common_shapes() {
        assert_eq!(parse_estimated_minutes("30 minutes"), Some(30));
        assert_eq!(parse_estimated_minutes("45 min"), Some(45));
        assert_eq!(parse_estimated_minutes("90m"), Some(90));
        assert_eq!(parse_estimated_minutes("2 hours"), Some(120));
        assert_eq!(parse_estimated_minutes("2h"), Some(120));
        assert_eq!(parse_estimated_minutes("1.5 hours"), Some(90));
        assert_eq!(parse_estimated_minutes("1 hour 20 minutes"), Some(80));
    }

    #[test]
    fn parse_estimated_minutes_rejects_unusable_text() {
        assert_eq!(parse_estimated_minutes(""), None);
        assert_eq!(parse_estimated_minutes("a while"), None);
        assert_eq!(parse_estimated_minutes("soon"), None);
        assert_eq!(parse_estimated_minutes("0 minutes"), None);
    }

    #[test]
    fn event_window_uses_due_date_in_configured_timezone() {
        let task = sample_task();
        let tz: Tz = "America/New_York".parse().expect("valid timezone");
        let (start, end) = resolve_event_window(&task, tz, fixed_now()).expect("window");

        // 14:00 EDT == 18:00 UTC in August.
        assert_eq!(start.to_rfc3339(), "2026-08-10T18:00:00+00:00");
        assert_eq!(end - start, Duration::minutes(90));
    }

    #[test]
    fn event_window_defaults_to_tomorrow_morning_without_due_date() {
        let mut task = sample_task();
        task.due_date = None;
        task.due_time = None;
        task.estimated_time = "unclear".to_string();
        let tz: Tz = "UTC".parse().expect("valid timezone");
        let (start, end) = resolve_event_window(&task, tz, fixed_now()).expect("window");

        assert_eq!(start.to_rfc3339(), "2026-08-08T09:00:00+00:00");
        assert_eq!(end - start, Duration::minutes(90));
    }

    #[test]
    fn ical_payload_uses_basic_utc_timestamps_and_escaping() {
        let mut task = sample_task();
        task.title = "Plan; review, ship".to_string();
        let response =
            build_calendar_link(&task, "UTC", fixed_now()).expect("calendar link");

        assert!(response.ical_content.contains("DTSTART:20260810T140000Z"));
        assert!(response.ical_content.contains("DTEND:20260810T153000Z"));
        assert!(response
            .ical_content
            .contains("SUMMARY:Plan\\; review\\, ship"));
        assert!(response.ical_content.ends_with("END:VCALENDAR\r\n"));
    }

    #[test]
    fn google_url_carries_template_action_and_window() {
        let response =
            build_calendar_link(&sample_task(), "UTC", fixed_now()).expect("calendar link");
        assert!(response
            .google_calendar_url
            .starts_with("https://calendar.google.com/calendar/render?"));
        assert!(response.google_calendar_url.contains("action=TEMPLATE"));
        assert!(response
            .google_calendar_url
            .contains("dates=20260810T140000Z%2F20260810T153000Z"));
    }

    #[test]
    fn description_enumerates_subtasks_and_tags() {
        let description = build_event_description(&sample_task());
        assert!(description.contains("Subtasks:\n- Record screen\n- Write notes"));
        assert!(description.contains("Tags: demo"));
        assert!(description.contains("Priority: high | Category: work | Estimated: 1 hour 30 minutes"));
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        assert!(build_calendar_link(&sample_task(), "Mars/Olympus", fixed_now()).is_err());
    }
}
