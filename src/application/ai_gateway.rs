use crate::domain::models::{
    parse_block_type, parse_energy_level, parse_insight_type, parse_priority, AiInsight,
    BlockType, DailyPlan, EnergyLevel, InsightType, ParsedIntent, Priority, Task,
    TaskEnhancement, TimeBlock,
};
use crate::infrastructure::completion_cache::CompletionCacheRepository;
use crate::infrastructure::completion_client::{CompletionClient, CompletionRequest};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::response_sanitizer::{extract_json_array, extract_json_object};
use chrono::{DateTime, NaiveTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const MAX_COACHING_INSIGHTS: usize = 3;
const FALLBACK_SUBTASK: &str = "Review and complete this task";
const FALLBACK_ESTIMATE: &str = "30 minutes";
const FALLBACK_CATEGORY: &str = "general";

const ENHANCE_SYSTEM_PROMPT: &str = "You are a task planning assistant. Given a raw task \
description, respond with exactly one JSON object and no prose, shaped as: {\"title\": string, \
\"description\": string, \"subtasks\": [string], \"priority\": \"low\"|\"medium\"|\"high\"|\"urgent\", \
\"estimated_time\": string, \"category\": string, \"deadline\": \"YYYY-MM-DD\" or null, \
\"dependencies\": [string]}. Keep the title short and actionable, propose 2-4 concrete subtasks, \
and estimate time realistically.";

const PARSE_SYSTEM_PROMPT: &str = "You extract structured task intent from natural language. \
Respond with exactly one JSON object and no prose, shaped as: {\"title\": string, \"priority\": \
\"low\"|\"medium\"|\"high\"|\"urgent\", \"due_date\": \"YYYY-MM-DD\" or null}. Resolve relative \
dates like 'tomorrow' or 'next friday' against the date given in the message.";

const PLAN_SYSTEM_PROMPT: &str = "You are a scheduling assistant that builds a one-day, \
time-blocked plan. Rules: schedule urgent and high priority tasks first; place the most \
demanding work where the user's energy pattern peaks; keep every block inside the work hours; \
leave the requested buffer between blocks and insert a short break after long focus stretches. \
Respond with exactly one JSON object and no prose, shaped as: {\"time_blocks\": [{\"start_time\": \
\"HH:MM\", \"end_time\": \"HH:MM\", \"task_id\": string or null, \"task_label\": string, \
\"block_type\": \"focus\"|\"break\"|\"admin\"|\"buffer\", \"energy_level\": \
\"high\"|\"medium\"|\"low\", \"priority\": \"low\"|\"medium\"|\"high\"|\"urgent\"}], \"insights\": \
[string], \"recommendations\": [string], \"total_focus_minutes\": number, \"productivity_score\": \
number from 0 to 100}.";

const COACHING_SYSTEM_PROMPT: &str = "You are a productivity coach. Given a summary of the \
user's task list, respond with exactly one JSON array of at most 3 insight objects and no \
prose. Each object is shaped as: {\"type\": \
\"productivity\"|\"pattern\"|\"suggestion\"|\"warning\", \"title\": string, \"description\": \
string, \"actionable\": boolean, \"priority\": number}.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanPreferencesInput {
    pub work_start: String,
    pub work_end: String,
    pub energy_pattern: String,
    pub buffer_minutes: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoachingContext {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub open_urgent_tasks: usize,
    pub categories: Vec<String>,
}

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

// Wraps the completion endpoint as an unreliable oracle: every operation has
// a deterministic fallback, and no failure crosses this boundary as an error.
pub struct AiGateway<C, R>
where
    C: CompletionClient,
    R: CompletionCacheRepository,
{
    completion_client: Arc<C>,
    cache: Arc<R>,
    usage: Mutex<HashMap<String, u64>>,
    now_provider: NowProvider,
}

impl<C, R> AiGateway<C, R>
where
    C: CompletionClient,
    R: CompletionCacheRepository,
{
    pub fn new(completion_client: Arc<C>, cache: Arc<R>) -> Self {
        Self {
            completion_client,
            cache,
            usage: Mutex::new(HashMap::new()),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn usage(&self) -> HashMap<String, u64> {
        self.usage
            .lock()
            .map(|usage| usage.clone())
            .unwrap_or_default()
    }

    pub async fn enhance_task(&self, api_key: &str, input: &str, model: &str) -> TaskEnhancement {
        let request = CompletionRequest {
            model: model.to_string(),
            system_prompt: ENHANCE_SYSTEM_PROMPT.to_string(),
            user_prompt: input.to_string(),
            temperature: 0.3,
        };

        match self.complete_object(api_key, request).await {
            Ok(value) => decode_enhancement(&value, input),
            Err(_) => fallback_enhancement(input),
        }
    }

    pub async fn parse_natural_language(
        &self,
        api_key: &str,
        input: &str,
        model: &str,
    ) -> ParsedIntent {
        let today = (self.now_provider)().date_naive();
        let request = CompletionRequest {
            model: model.to_string(),
            system_prompt: PARSE_SYSTEM_PROMPT.to_string(),
            user_prompt: format!("Today's date is {today}.\nInput: {input}"),
            temperature: 0.3,
        };

        match self.complete_object(api_key, request).await {
            Ok(value) => decode_parsed_intent(&value, input),
            Err(_) => fallback_intent(input),
        }
    }

    pub async fn generate_daily_plan(
        &self,
        api_key: &str,
        tasks: &[Task],
        preferences: &PlanPreferencesInput,
        model: &str,
    ) -> DailyPlan {
        let open_tasks: Vec<&Task> = tasks.iter().filter(|task| !task.completed).collect();
        if open_tasks.is_empty() {
            return degraded_plan("No open tasks to schedule; add a task to generate a plan.");
        }

        let request = CompletionRequest {
            model: model.to_string(),
            system_prompt: PLAN_SYSTEM_PROMPT.to_string(),
            user_prompt: plan_user_prompt(&open_tasks, preferences),
            temperature: 0.7,
        };

        match self.complete_object(api_key, request).await {
            Ok(value) => decode_daily_plan(&value),
            Err(_) => degraded_plan(
                "Plan generation was unavailable; your tasks are unchanged and can be scheduled manually.",
            ),
        }
    }

    pub async fn provide_coaching(
        &self,
        api_key: &str,
        context: &CoachingContext,
        model: &str,
    ) -> Vec<AiInsight> {
        let request = CompletionRequest {
            model: model.to_string(),
            system_prompt: COACHING_SYSTEM_PROMPT.to_string(),
            user_prompt: coaching_user_prompt(context),
            temperature: 0.8,
        };

        let insights = match self.complete_array(api_key, request).await {
            Ok(value) => decode_insights(&value),
            Err(_) => Vec::new(),
        };
        if insights.is_empty() {
            return vec![fallback_insight()];
        }
        insights
            .into_iter()
            .take(MAX_COACHING_INSIGHTS)
            .collect()
    }

    async fn complete_object(
        &self,
        api_key: &str,
        request: CompletionRequest,
    ) -> Result<Value, InfraError> {
        let content = self.cached_completion(api_key, request).await?;
        extract_json_object(&content)
    }

    async fn complete_array(
        &self,
        api_key: &str,
        request: CompletionRequest,
    ) -> Result<Value, InfraError> {
        let content = self.cached_completion(api_key, request).await?;
        extract_json_array(&content)
    }

    async fn cached_completion(
        &self,
        api_key: &str,
        request: CompletionRequest,
    ) -> Result<String, InfraError> {
        let cache_key = format!("{}\n{}", request.system_prompt, request.user_prompt);
        if let Ok(Some(content)) = self.cache.get(&cache_key, &request.model) {
            return Ok(content);
        }

        let model = request.model.clone();
        let content = self.completion_client.complete(api_key, request).await?;
        let _ = self.cache.put(&cache_key, &model, &content);
        if let Ok(mut usage) = self.usage.lock() {
            *usage.entry(model).or_insert(0) += 1;
        }
        Ok(content)
    }
}

fn plan_user_prompt(open_tasks: &[&Task], preferences: &PlanPreferencesInput) -> String {
    let mut prompt = format!(
        "Work hours: {} to {}. Energy pattern: {}. Buffer between blocks: {} minutes.\nOpen tasks:\n",
        preferences.work_start,
        preferences.work_end,
        preferences.energy_pattern,
        preferences.buffer_minutes
    );
    for task in open_tasks {
        prompt.push_str(&format!(
            "- id={} title={} priority={} estimated={} category={}\n",
            task.id,
            task.title,
            priority_keyword(task.priority),
            task.estimated_time,
            task.category
        ));
    }
    prompt
}

fn coaching_user_prompt(context: &CoachingContext) -> String {
    format!(
        "Task list summary: {} tasks total, {} completed, {} open urgent. Categories in use: {}.",
        context.total_tasks,
        context.completed_tasks,
        context.open_urgent_tasks,
        if context.categories.is_empty() {
            "none".to_string()
        } else {
            context.categories.join(", ")
        }
    )
}

fn priority_keyword(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "low",
        Priority::Medium => "medium",
        Priority::High => "high",
        Priority::Urgent => "urgent",
    }
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|candidate| !candidate.is_empty())
        .map(ToOwned::to_owned)
}

fn string_list_field(value: &Value, field: &str) -> Vec<String> {
    value
        .get(field)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

fn decode_enhancement(value: &Value, input: &str) -> TaskEnhancement {
    let mut subtasks = string_list_field(value, "subtasks");
    if subtasks.is_empty() {
        subtasks.push(FALLBACK_SUBTASK.to_string());
    }

    TaskEnhancement {
        title: string_field(value, "title").unwrap_or_else(|| input.trim().to_string()),
        description: string_field(value, "description")
            .unwrap_or_else(|| format!("Task: {}", input.trim())),
        subtasks,
        priority: string_field(value, "priority")
            .as_deref()
            .and_then(parse_priority)
            .unwrap_or(Priority::Medium),
        estimated_time: string_field(value, "estimated_time")
            .unwrap_or_else(|| FALLBACK_ESTIMATE.to_string()),
        category: string_field(value, "category")
            .unwrap_or_else(|| FALLBACK_CATEGORY.to_string()),
        deadline: string_field(value, "deadline")
            .filter(|candidate| chrono::NaiveDate::parse_from_str(candidate, "%Y-%m-%d").is_ok()),
        dependencies: string_list_field(value, "dependencies"),
    }
}

fn fallback_enhancement(input: &str) -> TaskEnhancement {
    TaskEnhancement {
        title: input.trim().to_string(),
        description: format!("Task: {}", input.trim()),
        subtasks: vec![FALLBACK_SUBTASK.to_string()],
        priority: Priority::Medium,
        estimated_time: FALLBACK_ESTIMATE.to_string(),
        category: FALLBACK_CATEGORY.to_string(),
        deadline: None,
        dependencies: Vec::new(),
    }
}

fn decode_parsed_intent(value: &Value, input: &str) -> ParsedIntent {
    ParsedIntent {
        title: string_field(value, "title").unwrap_or_else(|| input.trim().to_string()),
        priority: string_field(value, "priority")
            .as_deref()
            .and_then(parse_priority)
            .unwrap_or(Priority::Medium),
        due_date: string_field(value, "due_date")
            .filter(|candidate| chrono::NaiveDate::parse_from_str(candidate, "%Y-%m-%d").is_ok()),
    }
}

fn fallback_intent(input: &str) -> ParsedIntent {
    ParsedIntent {
        title: input.trim().to_string(),
        priority: Priority::Medium,
        due_date: None,
    }
}

fn decode_daily_plan(value: &Value) -> DailyPlan {
    let time_blocks = value
        .get("time_blocks")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .enumerate()
                .filter_map(|(index, entry)| decode_time_block(entry, index))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let mut insights = string_list_field(value, "insights");
    if insights.is_empty() {
        insights.push("Plan generated; review the blocks before starting your day.".to_string());
    }

    let total_focus_minutes = value
        .get("total_focus_minutes")
        .and_then(Value::as_u64)
        .map(|minutes| minutes as u32)
        .unwrap_or_else(|| focus_minutes(&time_blocks));

    let productivity_score = value
        .get("productivity_score")
        .and_then(Value::as_u64)
        .map(|score| score.min(100) as u8)
        .unwrap_or(0);

    DailyPlan {
        time_blocks,
        insights,
        recommendations: string_list_field(value, "recommendations"),
        total_focus_minutes,
        productivity_score,
    }
}

fn decode_time_block(value: &Value, index: usize) -> Option<TimeBlock> {
    let start_time = string_field(value, "start_time")?;
    let end_time = string_field(value, "end_time")?;
    NaiveTime::parse_from_str(&start_time, "%H:%M").ok()?;
    NaiveTime::parse_from_str(&end_time, "%H:%M").ok()?;

    let task_label = string_field(value, "task_label")
        .or_else(|| string_field(value, "task"))
        .unwrap_or_else(|| "Unlabeled block".to_string());

    Some(TimeBlock {
        id: format!("blk-{}", index + 1),
        start_time,
        end_time,
        task_id: string_field(value, "task_id"),
        task_label,
        block_type: string_field(value, "block_type")
            .as_deref()
            .and_then(parse_block_type)
            .unwrap_or(BlockType::Focus),
        energy_level: string_field(value, "energy_level")
            .as_deref()
            .and_then(parse_energy_level)
            .unwrap_or(EnergyLevel::Medium),
        priority: string_field(value, "priority")
            .as_deref()
            .and_then(parse_priority)
            .unwrap_or(Priority::Medium),
    })
}

fn focus_minutes(blocks: &[TimeBlock]) -> u32 {
    blocks
        .iter()
        .filter(|block| block.block_type == BlockType::Focus)
        .filter_map(|block| {
            let start = NaiveTime::parse_from_str(&block.start_time, "%H:%M").ok()?;
            let end = NaiveTime::parse_from_str(&block.end_time, "%H:%M").ok()?;
            let minutes = (end - start).num_minutes();
            (minutes > 0).then_some(minutes as u32)
        })
        .sum()
}

fn degraded_plan(reason: &str) -> DailyPlan {
    DailyPlan {
        time_blocks: Vec::new(),
        insights: vec![reason.to_string()],
        recommendations: Vec::new(),
        total_focus_minutes: 0,
        productivity_score: 0,
    }
}

fn decode_insights(value: &Value) -> Vec<AiInsight> {
    value
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let title = string_field(entry, "title")?;
                    Some(AiInsight {
                        insight_type: string_field(entry, "type")
                            .as_deref()
                            .and_then(parse_insight_type)
                            .unwrap_or(InsightType::Suggestion),
                        title,
                        description: string_field(entry, "description").unwrap_or_default(),
                        actionable: entry
                            .get("actionable")
                            .and_then(Value::as_bool)
                            .unwrap_or(false),
                        priority: entry
                            .get("priority")
                            .and_then(Value::as_u64)
                            .map(|priority| priority.min(u8::MAX as u64) as u8)
                            .unwrap_or(1),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn fallback_insight() -> AiInsight {
    AiInsight {
        insight_type: InsightType::Suggestion,
        title: "Keep your momentum".to_string(),
        description: "Pick the smallest open task and finish it to build momentum for the day."
            .to_string(),
        actionable: true,
        priority: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::completion_cache::InMemoryCompletionCache;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone)]
    enum FakeCompletion {
        Content(String),
        NetworkError,
    }

    #[derive(Debug, Default)]
    struct FakeCompletionClient {
        responses: Mutex<VecDeque<FakeCompletion>>,
        calls: AtomicUsize,
    }

    impl FakeCompletionClient {
        fn with_responses(responses: Vec<FakeCompletion>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn always_failing() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl CompletionClient for FakeCompletionClient {
        async fn complete(
            &self,
            _api_key: &str,
            _request: CompletionRequest,
        ) -> Result<String, InfraError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let response = self
                .responses
                .lock()
                .expect("responses lock poisoned")
                .pop_front();
            match response {
                Some(FakeCompletion::Content(content)) => Ok(content),
                Some(FakeCompletion::NetworkError) | None => Err(InfraError::Completion(
                    "network error while requesting completion: simulated".to_string(),
                )),
            }
        }
    }

    fn gateway(client: FakeCompletionClient) -> AiGateway<FakeCompletionClient, InMemoryCompletionCache> {
        AiGateway::new(Arc::new(client), Arc::new(InMemoryCompletionCache::default()))
    }

    fn sample_preferences() -> PlanPreferencesInput {
        PlanPreferencesInput {
            work_start: "09:00".to_string(),
            work_end: "17:00".to_string(),
            energy_pattern: "morning".to_string(),
            buffer_minutes: 15,
        }
    }

    fn open_task(id: &str, title: &str) -> Task {
        Task {
            id: id.to_string(),
            title: title.to_string(),
            description: None,
            subtasks: Vec::new(),
            tags: Vec::new(),
            priority: Priority::High,
            category: "work".to_string(),
            estimated_time: "1 hour".to_string(),
            due_date: None,
            due_time: None,
            completed: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn enhance_task_decodes_fenced_response_and_caches() {
        let client = FakeCompletionClient::with_responses(vec![FakeCompletion::Content(
            "```json\n{\"title\": \"Draft launch email\", \"description\": \"Write and review\", \
             \"subtasks\": [\"Outline\", \"Draft\", \"Proofread\"], \"priority\": \"high\", \
             \"estimated_time\": \"45 minutes\", \"category\": \"marketing\", \"deadline\": \
             \"2026-08-12\", \"dependencies\": []}\n```"
                .to_string(),
        )]);
        let gateway = gateway(client);

        let first = gateway
            .enhance_task("key", "write launch email", "model-a")
            .await;
        assert_eq!(first.title, "Draft launch email");
        assert_eq!(first.priority, Priority::High);
        assert_eq!(first.subtasks.len(), 3);
        assert_eq!(first.deadline.as_deref(), Some("2026-08-12"));

        // Second identical request is served from the cache; the fake has no
        // responses left, so a network call would fall back instead.
        let second = gateway
            .enhance_task("key", "write launch email", "model-a")
            .await;
        assert_eq!(second, first);
        assert_eq!(gateway.completion_client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.usage().get("model-a"), Some(&1));
    }

    #[tokio::test]
    async fn enhance_task_falls_back_on_prose_response() {
        let client = FakeCompletionClient::with_responses(vec![FakeCompletion::Content(
            "I could not produce structured output for that.".to_string(),
        )]);
        let gateway = gateway(client);

        let enhancement = gateway.enhance_task("key", "buy groceries", "model-a").await;
        assert_eq!(enhancement.title, "buy groceries");
        assert_eq!(enhancement.priority, Priority::Medium);
        assert_eq!(enhancement.estimated_time, "30 minutes");
        assert_eq!(enhancement.category, "general");
    }

    proptest! {
        // Subtasks are non-empty and priority stays in range even when the
        // completion endpoint is down.
        #[test]
        fn enhance_task_fallback_always_well_formed(input in "[a-zA-Z0-9 .,]{0,80}") {
            let runtime = tokio::runtime::Runtime::new().expect("runtime");
            runtime.block_on(async move {
                let gateway = gateway(FakeCompletionClient::always_failing());
                let enhancement = gateway.enhance_task("key", &input, "model-a").await;
                assert!(!enhancement.subtasks.is_empty());
                assert!(matches!(
                    enhancement.priority,
                    Priority::Low | Priority::Medium | Priority::High | Priority::Urgent
                ));
            });
        }
    }

    #[tokio::test]
    async fn parse_natural_language_decodes_and_validates_due_date() {
        let client = FakeCompletionClient::with_responses(vec![FakeCompletion::Content(
            "{\"title\": \"Call the dentist\", \"priority\": \"urgent\", \"due_date\": \"2026-08-08\"}"
                .to_string(),
        )]);
        let gateway = gateway(client);

        let intent = gateway
            .parse_natural_language("key", "call dentist tomorrow, urgent", "model-a")
            .await;
        assert_eq!(intent.title, "Call the dentist");
        assert_eq!(intent.priority, Priority::Urgent);
        assert_eq!(intent.due_date.as_deref(), Some("2026-08-08"));
    }

    #[tokio::test]
    async fn parse_natural_language_falls_back_on_failure() {
        let gateway = gateway(FakeCompletionClient::always_failing());
        let intent = gateway
            .parse_natural_language("key", "call dentist tomorrow", "model-a")
            .await;
        assert_eq!(intent.title, "call dentist tomorrow");
        assert_eq!(intent.priority, Priority::Medium);
        assert_eq!(intent.due_date, None);
    }

    #[tokio::test]
    async fn generate_daily_plan_survives_malformed_json() {
        let client = FakeCompletionClient::with_responses(vec![FakeCompletion::Content(
            "{\"time_blocks\": [{\"start_time\": \"09:0".to_string(),
        )]);
        let gateway = gateway(client);

        let plan = gateway
            .generate_daily_plan(
                "key",
                &[open_task("tsk-1", "Write report")],
                &sample_preferences(),
                "model-a",
            )
            .await;
        assert!(plan.time_blocks.is_empty());
        assert!(!plan.insights.is_empty());
        assert_eq!(plan.productivity_score, 0);
    }

    #[tokio::test]
    async fn generate_daily_plan_decodes_blocks_and_clamps_score() {
        let client = FakeCompletionClient::with_responses(vec![FakeCompletion::Content(
            "{\"time_blocks\": [\
                {\"start_time\": \"09:00\", \"end_time\": \"10:00\", \"task_id\": \"tsk-1\", \
                 \"task_label\": \"Write report\", \"block_type\": \"focus\", \"energy_level\": \
                 \"high\", \"priority\": \"high\"},\
                {\"start_time\": \"bogus\", \"end_time\": \"10:30\", \"task_label\": \"Dropped\"}\
             ], \"insights\": [\"Deep work first\"], \"recommendations\": [\"Batch email\"], \
             \"productivity_score\": 250}"
                .to_string(),
        )]);
        let gateway = gateway(client);

        let plan = gateway
            .generate_daily_plan(
                "key",
                &[open_task("tsk-1", "Write report")],
                &sample_preferences(),
                "model-a",
            )
            .await;
        assert_eq!(plan.time_blocks.len(), 1);
        assert_eq!(plan.time_blocks[0].id, "blk-1");
        assert_eq!(plan.time_blocks[0].task_id.as_deref(), Some("tsk-1"));
        assert_eq!(plan.productivity_score, 100);
        assert_eq!(plan.total_focus_minutes, 60);
    }

    #[tokio::test]
    async fn generate_daily_plan_skips_network_when_everything_is_done() {
        let gateway = gateway(FakeCompletionClient::always_failing());
        let mut task = open_task("tsk-1", "Done already");
        task.completed = true;

        let plan = gateway
            .generate_daily_plan("key", &[task], &sample_preferences(), "model-a")
            .await;
        assert!(plan.time_blocks.is_empty());
        assert!(!plan.insights.is_empty());
        assert_eq!(gateway.completion_client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn provide_coaching_truncates_to_three_insights() {
        let entries = (0..5)
            .map(|index| {
                format!(
                    "{{\"type\": \"suggestion\", \"title\": \"Insight {index}\", \
                     \"description\": \"d\", \"actionable\": true, \"priority\": {index}}}"
                )
            })
            .collect::<Vec<_>>()
            .join(",");
        let client = FakeCompletionClient::with_responses(vec![FakeCompletion::Content(format!(
            "[{entries}]"
        ))]);
        let gateway = gateway(client);

        let insights = gateway
            .provide_coaching("key", &CoachingContext::default(), "model-a")
            .await;
        assert_eq!(insights.len(), 3);
        assert_eq!(insights[0].title, "Insight 0");
    }

    #[tokio::test]
    async fn provide_coaching_falls_back_to_static_insight() {
        let gateway = gateway(FakeCompletionClient::always_failing());
        let insights = gateway
            .provide_coaching("key", &CoachingContext::default(), "model-a")
            .await;
        assert_eq!(insights.len(), 1);
        assert!(insights[0].actionable);
    }
}
