use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskFilter {
    All,
    Active,
    Completed,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        match self {
            Self::All => true,
            Self::Active => !task.completed,
            Self::Completed => task.completed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Synced,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub subtasks: Vec<String>,
    pub tags: Vec<String>,
    pub priority: Priority,
    pub category: String,
    pub estimated_time: String,
    pub due_date: Option<String>,
    pub due_time: Option<String>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.title, "task.title")?;
        validate_non_empty(&self.category, "task.category")?;
        if let Some(due_date) = self.due_date.as_deref() {
            validate_date(due_date, "task.due_date")?;
        }
        if let Some(due_time) = self.due_time.as_deref() {
            validate_hhmm(due_time, "task.due_time")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskEnhancement {
    pub title: String,
    pub description: String,
    pub subtasks: Vec<String>,
    pub priority: Priority,
    pub estimated_time: String,
    pub category: String,
    pub deadline: Option<String>,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParsedIntent {
    pub title: String,
    pub priority: Priority,
    pub due_date: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Focus,
    Break,
    Admin,
    Buffer,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EnergyLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeBlock {
    pub id: String,
    pub start_time: String,
    pub end_time: String,
    pub task_id: Option<String>,
    pub task_label: String,
    pub block_type: BlockType,
    pub energy_level: EnergyLevel,
    pub priority: Priority,
}

impl TimeBlock {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "block.id")?;
        validate_non_empty(&self.task_label, "block.task_label")?;
        validate_hhmm(&self.start_time, "block.start_time")?;
        validate_hhmm(&self.end_time, "block.end_time")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyPlan {
    pub time_blocks: Vec<TimeBlock>,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
    pub total_focus_minutes: u32,
    pub productivity_score: u8,
}

impl DailyPlan {
    pub fn validate(&self) -> Result<(), String> {
        for block in &self.time_blocks {
            block.validate()?;
        }
        if self.productivity_score > 100 {
            return Err("plan.productivity_score must be <= 100".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    Productivity,
    Pattern,
    Suggestion,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AiInsight {
    pub insight_type: InsightType,
    pub title: String,
    pub description: String,
    pub actionable: bool,
    pub priority: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriptionInfo {
    pub subscribed: bool,
    pub subscription_tier: Option<String>,
    pub subscription_end: Option<String>,
    pub trial_active: bool,
    pub trial_end: Option<String>,
    pub has_access: bool,
}

impl SubscriptionInfo {
    pub fn derive(
        subscribed: bool,
        subscription_tier: Option<String>,
        subscription_end: Option<String>,
        trial_active: bool,
        trial_end: Option<String>,
    ) -> Self {
        Self {
            subscribed,
            subscription_tier,
            subscription_end,
            trial_active,
            trial_end,
            has_access: subscribed || trial_active,
        }
    }
}

pub fn parse_priority(value: &str) -> Option<Priority> {
    match value.trim().to_ascii_lowercase().as_str() {
        "low" => Some(Priority::Low),
        "medium" => Some(Priority::Medium),
        "high" => Some(Priority::High),
        "urgent" => Some(Priority::Urgent),
        _ => None,
    }
}

pub fn parse_task_filter(value: &str) -> Option<TaskFilter> {
    match value.trim().to_ascii_lowercase().as_str() {
        "all" => Some(TaskFilter::All),
        "active" => Some(TaskFilter::Active),
        "completed" => Some(TaskFilter::Completed),
        _ => None,
    }
}

pub fn parse_block_type(value: &str) -> Option<BlockType> {
    match value.trim().to_ascii_lowercase().as_str() {
        "focus" => Some(BlockType::Focus),
        "break" => Some(BlockType::Break),
        "admin" => Some(BlockType::Admin),
        "buffer" => Some(BlockType::Buffer),
        _ => None,
    }
}

pub fn parse_energy_level(value: &str) -> Option<EnergyLevel> {
    match value.trim().to_ascii_lowercase().as_str() {
        "high" => Some(EnergyLevel::High),
        "medium" => Some(EnergyLevel::Medium),
        "low" => Some(EnergyLevel::Low),
        _ => None,
    }
}

pub fn parse_insight_type(value: &str) -> Option<InsightType> {
    match value.trim().to_ascii_lowercase().as_str() {
        "productivity" => Some(InsightType::Productivity),
        "pattern" => Some(InsightType::Pattern),
        "suggestion" => Some(InsightType::Suggestion),
        "warning" => Some(InsightType::Warning),
        _ => None,
    }
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

pub fn validate_hhmm(value: &str, field_name: &str) -> Result<(), String> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| format!("{field_name} must be HH:MM"))?;
    Ok(())
}

pub fn validate_date(value: &str, field_name: &str) -> Result<(), String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| format!("{field_name} must be YYYY-MM-DD"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_task() -> Task {
        Task {
            id: "tsk-1".to_string(),
            title: "Write quarterly report".to_string(),
            description: Some("Summarize Q3 metrics".to_string()),
            subtasks: vec!["Collect numbers".to_string(), "Draft outline".to_string()],
            tags: vec!["work".to_string(), "writing".to_string()],
            priority: Priority::High,
            category: "work".to_string(),
            estimated_time: "2 hours".to_string(),
            due_date: Some("2026-08-10".to_string()),
            due_time: Some("14:00".to_string()),
            completed: false,
            created_at: fixed_time("2026-08-07T08:00:00Z"),
        }
    }

    fn sample_block() -> TimeBlock {
        TimeBlock {
            id: "blk-1".to_string(),
            start_time: "09:00".to_string(),
            end_time: "10:30".to_string(),
            task_id: Some("tsk-1".to_string()),
            task_label: "Write quarterly report".to_string(),
            block_type: BlockType::Focus,
            energy_level: EnergyLevel::High,
            priority: Priority::High,
        }
    }

    #[test]
    fn task_validate_accepts_valid_task() {
        assert!(sample_task().validate().is_ok());
    }

    #[test]
    fn task_validate_rejects_blank_title() {
        let mut task = sample_task();
        task.title = "   ".to_string();
        assert!(task.validate().is_err());
    }

    #[test]
    fn task_validate_rejects_malformed_due_date() {
        let mut task = sample_task();
        task.due_date = Some("10/08/2026".to_string());
        assert!(task.validate().is_err());
    }

    #[test]
    fn time_block_validate_rejects_bad_times() {
        let mut block = sample_block();
        block.start_time = "9am".to_string();
        assert!(block.validate().is_err());
    }

    #[test]
    fn plan_validate_rejects_score_above_100() {
        let plan = DailyPlan {
            time_blocks: vec![sample_block()],
            insights: vec!["Front-load deep work".to_string()],
            recommendations: Vec::new(),
            total_focus_minutes: 90,
            productivity_score: 101,
        };
        assert!(plan.validate().is_err());
    }

    #[test]
    fn filter_matches_by_completion() {
        let mut task = sample_task();
        assert!(TaskFilter::All.matches(&task));
        assert!(TaskFilter::Active.matches(&task));
        assert!(!TaskFilter::Completed.matches(&task));
        task.completed = true;
        assert!(TaskFilter::Completed.matches(&task));
        assert!(!TaskFilter::Active.matches(&task));
    }

    #[test]
    fn parse_priority_accepts_known_values_only() {
        assert_eq!(parse_priority(" Urgent "), Some(Priority::Urgent));
        assert_eq!(parse_priority("medium"), Some(Priority::Medium));
        assert_eq!(parse_priority("someday"), None);
    }

    proptest! {
        #[test]
        fn has_access_is_subscribed_or_trial(subscribed: bool, trial_active: bool) {
            let info = SubscriptionInfo::derive(subscribed, None, None, trial_active, None);
            prop_assert_eq!(info.has_access, subscribed || trial_active);
        }
    }

    proptest! {
        #[test]
        fn validate_hhmm_accepts_all_clock_times(hour in 0u8..24u8, minute in 0u8..60u8) {
            let value = format!("{hour:02}:{minute:02}");
            prop_assert!(validate_hhmm(&value, "time").is_ok());
        }
    }
}
