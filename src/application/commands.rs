use crate::application::ai_gateway::{AiGateway, CoachingContext, PlanPreferencesInput};
use crate::application::bootstrap::bootstrap_workspace;
use crate::application::planner::{match_block_to_task, PlanBoard};
use crate::application::subscription::SubscriptionService;
use crate::domain::models::{
    parse_priority, parse_task_filter, AiInsight, DailyPlan, Priority, SubscriptionInfo, SyncStatus,
    Task, TaskFilter,
};
use crate::infrastructure::billing_client::ReqwestBillingClient;
use crate::infrastructure::calendar_link::{build_calendar_link, CalendarLinkResponse};
use crate::infrastructure::completion_cache::InMemoryCompletionCache;
use crate::infrastructure::completion_client::ReqwestCompletionClient;
use crate::infrastructure::config::{
    ensure_default_configs, read_default_model, read_email_from, read_plan_preferences,
    read_portal_return_url, read_support_inbox, read_timezone, read_webhook_url,
    save_webhook_url,
};
use crate::infrastructure::email_client::{EmailClient, EmailMessage, ReqwestEmailClient};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::secret_store::{KeyringSecretStore, SecretStore};
use crate::infrastructure::trial_repository::SqliteTrialRepository;
use crate::infrastructure::webhook::WebhookDispatcher;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinSet;

const CALENDAR_SYNC_CONCURRENCY: usize = 4;
const SECRET_COMPLETION: &str = "openrouter";
const SECRET_BILLING: &str = "billing";
const SECRET_EMAIL: &str = "email";

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    gateway: AiGateway<ReqwestCompletionClient, InMemoryCompletionCache>,
    webhook: WebhookDispatcher,
    runtime: Mutex<RuntimeState>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let config_dir = workspace_root.join("config");
        let logs_dir = workspace_root.join("logs");

        ensure_default_configs(&config_dir)?;

        Ok(Self {
            config_dir,
            database_path: bootstrap.database_path,
            logs_dir,
            gateway: AiGateway::new(
                Arc::new(ReqwestCompletionClient::new()),
                Arc::new(InMemoryCompletionCache::default()),
            ),
            webhook: WebhookDispatcher::new(),
            runtime: Mutex::new(RuntimeState::default()),
            log_guard: Mutex::new(()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

#[derive(Debug)]
struct RuntimeState {
    tasks: HashMap<String, Task>,
    task_order: Vec<String>,
    filter: TaskFilter,
    sync_status: SyncStatus,
    sync_error: Option<String>,
    insights: Vec<AiInsight>,
    plan_board: PlanBoard,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            tasks: HashMap::new(),
            task_order: Vec::new(),
            filter: TaskFilter::All,
            sync_status: SyncStatus::Idle,
            sync_error: None,
            insights: Vec::new(),
            plan_board: PlanBoard::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatusResponse {
    pub status: SyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyPlanResponse {
    pub phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<DailyPlan>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSyncResponse {
    pub attempted: usize,
    pub synced: usize,
    pub failed: usize,
    pub failed_titles: Vec<String>,
    pub links: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanSyncResponse {
    pub blocks: usize,
    pub matched: usize,
    pub synced: usize,
    pub failed_titles: Vec<String>,
    pub links: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SupportEmailResponse {
    pub support_message_id: String,
    pub confirmation_message_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortalSessionResponse {
    pub url: String,
}

pub fn list_tasks_impl(state: &AppState) -> Result<Vec<Task>, InfraError> {
    let runtime = lock_runtime(state)?;
    Ok(runtime
        .task_order
        .iter()
        .filter_map(|task_id| runtime.tasks.get(task_id))
        .filter(|task| runtime.filter.matches(task))
        .cloned()
        .collect())
}

pub async fn add_task_impl(
    state: &AppState,
    title: String,
    description: Option<String>,
    enhance: bool,
    model: Option<String>,
) -> Result<Task, InfraError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(InfraError::InvalidConfig(
            "title must not be empty".to_string(),
        ));
    }

    let task = if enhance {
        let api_key = completion_api_key().unwrap_or_default();
        let model = resolve_model(state.config_dir(), model)?;
        let enhancement = state.gateway.enhance_task(&api_key, title, &model).await;
        Task {
            id: next_id("tsk"),
            title: enhancement.title,
            description: Some(enhancement.description),
            subtasks: enhancement.subtasks,
            tags: Vec::new(),
            priority: enhancement.priority,
            category: enhancement.category,
            estimated_time: enhancement.estimated_time,
            due_date: enhancement.deadline,
            due_time: None,
            completed: false,
            created_at: Utc::now(),
        }
    } else {
        Task {
            id: next_id("tsk"),
            title: title.to_string(),
            description: description
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToOwned::to_owned),
            subtasks: Vec::new(),
            tags: Vec::new(),
            priority: Priority::Medium,
            category: "general".to_string(),
            estimated_time: "30 minutes".to_string(),
            due_date: None,
            due_time: None,
            completed: false,
            created_at: Utc::now(),
        }
    };

    {
        let mut runtime = lock_runtime(state)?;
        runtime.task_order.push(task.id.clone());
        runtime.tasks.insert(task.id.clone(), task.clone());
    }

    state.log_info("add_task", &format!("created task_id={}", task.id));
    dispatch_task_webhook(state, "task.created", &task).await;
    Ok(task)
}

pub async fn quick_add_task_impl(
    state: &AppState,
    input: String,
    model: Option<String>,
) -> Result<Task, InfraError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(InfraError::InvalidConfig(
            "input must not be empty".to_string(),
        ));
    }

    let api_key = completion_api_key().unwrap_or_default();
    let model = resolve_model(state.config_dir(), model)?;
    let intent = state
        .gateway
        .parse_natural_language(&api_key, input, &model)
        .await;

    let task = Task {
        id: next_id("tsk"),
        title: intent.title,
        description: None,
        subtasks: Vec::new(),
        tags: Vec::new(),
        priority: intent.priority,
        category: "general".to_string(),
        estimated_time: "30 minutes".to_string(),
        due_date: intent.due_date,
        due_time: None,
        completed: false,
        created_at: Utc::now(),
    };

    {
        let mut runtime = lock_runtime(state)?;
        runtime.task_order.push(task.id.clone());
        runtime.tasks.insert(task.id.clone(), task.clone());
    }

    state.log_info("quick_add_task", &format!("created task_id={}", task.id));
    dispatch_task_webhook(state, "task.created", &task).await;
    Ok(task)
}

pub async fn toggle_task_impl(state: &AppState, task_id: String) -> Result<Task, InfraError> {
    let task_id = task_id.trim();
    if task_id.is_empty() {
        return Err(InfraError::InvalidConfig(
            "task_id must not be empty".to_string(),
        ));
    }

    let toggled = {
        let mut runtime = lock_runtime(state)?;
        let Some(task) = runtime.tasks.get_mut(task_id) else {
            return Err(InfraError::InvalidConfig(format!(
                "task not found: {task_id}"
            )));
        };
        task.completed = !task.completed;
        task.clone()
    };

    state.log_info(
        "toggle_task",
        &format!("task_id={task_id} completed={}", toggled.completed),
    );
    let event = if toggled.completed {
        "task.completed"
    } else {
        "task.reopened"
    };
    dispatch_task_webhook(state, event, &toggled).await;
    Ok(toggled)
}

#[allow(clippy::too_many_arguments)]
pub fn update_task_impl(
    state: &AppState,
    task_id: String,
    title: Option<String>,
    description: Option<String>,
    priority: Option<String>,
    category: Option<String>,
    estimated_time: Option<String>,
    due_date: Option<String>,
    due_time: Option<String>,
) -> Result<Task, InfraError> {
    let task_id = task_id.trim();
    if task_id.is_empty() {
        return Err(InfraError::InvalidConfig(
            "task_id must not be empty".to_string(),
        ));
    }

    let mut runtime = lock_runtime(state)?;
    let Some(task) = runtime.tasks.get_mut(task_id) else {
        return Err(InfraError::InvalidConfig(format!(
            "task not found: {task_id}"
        )));
    };

    if let Some(title) = title {
        let title = title.trim();
        if title.is_empty() {
            return Err(InfraError::InvalidConfig(
                "title must not be empty".to_string(),
            ));
        }
        task.title = title.to_string();
    }
    if let Some(description) = description {
        let description = description.trim();
        task.description = if description.is_empty() {
            None
        } else {
            Some(description.to_string())
        };
    }
    if let Some(priority) = priority {
        task.priority = parse_priority(&priority).ok_or_else(|| {
            InfraError::InvalidConfig(format!("unsupported priority: {priority}"))
        })?;
    }
    if let Some(category) = category {
        let category = category.trim();
        if !category.is_empty() {
            task.category = category.to_string();
        }
    }
    if let Some(estimated_time) = estimated_time {
        task.estimated_time = estimated_time.trim().to_string();
    }
    if let Some(due_date) = due_date {
        let due_date = due_date.trim();
        task.due_date = if due_date.is_empty() {
            None
        } else {
            Some(due_date.to_string())
        };
    }
    if let Some(due_time) = due_time {
        let due_time = due_time.trim();
        task.due_time = if due_time.is_empty() {
            None
        } else {
            Some(due_time.to_string())
        };
    }
    task.validate().map_err(InfraError::InvalidConfig)?;

    let updated = task.clone();
    drop(runtime);
    state.log_info("update_task", &format!("updated task_id={task_id}"));
    Ok(updated)
}

pub async fn delete_task_impl(state: &AppState, task_id: String) -> Result<bool, InfraError> {
    let task_id = task_id.trim();
    if task_id.is_empty() {
        return Err(InfraError::InvalidConfig(
            "task_id must not be empty".to_string(),
        ));
    }

    let removed = {
        let mut runtime = lock_runtime(state)?;
        let removed = runtime.tasks.remove(task_id);
        if removed.is_some() {
            runtime.task_order.retain(|candidate| candidate != task_id);
        }
        removed
    };
    let Some(removed) = removed else {
        return Ok(false);
    };

    state.log_info("delete_task", &format!("deleted task_id={task_id}"));
    dispatch_task_webhook(state, "task.deleted", &removed).await;
    Ok(true)
}

pub fn set_filter_impl(state: &AppState, name: String) -> Result<TaskFilter, InfraError> {
    let filter = parse_task_filter(&name)
        .ok_or_else(|| InfraError::InvalidConfig(format!("unsupported filter: {name}")))?;
    let mut runtime = lock_runtime(state)?;
    runtime.filter = filter;
    Ok(filter)
}

pub fn set_webhook_url_impl(state: &AppState, url: Option<String>) -> Result<(), InfraError> {
    save_webhook_url(state.config_dir(), url.as_deref())?;
    state.log_info(
        "set_webhook_url",
        if url.is_some() {
            "webhook destination configured"
        } else {
            "webhook destination cleared"
        },
    );
    Ok(())
}

pub fn set_api_key_impl(name: String, value: String) -> Result<(), InfraError> {
    let name = validate_secret_name(&name)?;
    let value = value.trim();
    if value.is_empty() {
        return Err(InfraError::InvalidConfig(
            "api key must not be empty".to_string(),
        ));
    }
    KeyringSecretStore::default().save_secret(name, value)
}

pub fn delete_api_key_impl(name: String) -> Result<(), InfraError> {
    let name = validate_secret_name(&name)?;
    KeyringSecretStore::default().delete_secret(name)
}

fn validate_secret_name(name: &str) -> Result<&'static str, InfraError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "openrouter" => Ok(SECRET_COMPLETION),
        "billing" => Ok(SECRET_BILLING),
        "email" => Ok(SECRET_EMAIL),
        other => Err(InfraError::InvalidConfig(format!(
            "unknown secret name: {other}"
        ))),
    }
}

pub fn get_sync_status_impl(state: &AppState) -> Result<SyncStatusResponse, InfraError> {
    let runtime = lock_runtime(state)?;
    Ok(SyncStatusResponse {
        status: runtime.sync_status.clone(),
        error: runtime.sync_error.clone(),
    })
}

pub async fn generate_daily_plan_impl(
    state: &AppState,
    model: Option<String>,
) -> Result<DailyPlanResponse, InfraError> {
    let api_key = completion_api_key().unwrap_or_default();
    let model = resolve_model(state.config_dir(), model)?;
    let preferences = read_plan_preferences(state.config_dir());
    let preferences = PlanPreferencesInput {
        work_start: preferences.work_start,
        work_end: preferences.work_end,
        energy_pattern: preferences.energy_pattern,
        buffer_minutes: preferences.buffer_minutes,
    };

    let (ticket, tasks) = {
        let mut runtime = lock_runtime(state)?;
        let ticket = runtime.plan_board.begin_generation()?;
        let tasks = runtime
            .task_order
            .iter()
            .filter_map(|task_id| runtime.tasks.get(task_id))
            .cloned()
            .collect::<Vec<_>>();
        (ticket, tasks)
    };

    let plan = state
        .gateway
        .generate_daily_plan(&api_key, &tasks, &preferences, &model)
        .await;

    let mut runtime = lock_runtime(state)?;
    let committed = runtime.plan_board.complete_generation(ticket, plan);
    drop(runtime);
    if committed {
        state.log_info("generate_daily_plan", &format!("plan committed model={model}"));
    } else {
        state.log_info(
            "generate_daily_plan",
            "stale generation result dropped; a newer generation superseded it",
        );
    }
    get_daily_plan_impl(state)
}

pub fn get_daily_plan_impl(state: &AppState) -> Result<DailyPlanResponse, InfraError> {
    let runtime = lock_runtime(state)?;
    Ok(DailyPlanResponse {
        phase: runtime.plan_board.phase().as_str().to_string(),
        plan: runtime.plan_board.plan().cloned(),
    })
}

pub fn update_daily_plan_impl(
    state: &AppState,
    plan: DailyPlan,
) -> Result<DailyPlanResponse, InfraError> {
    plan.validate().map_err(InfraError::InvalidConfig)?;
    {
        let mut runtime = lock_runtime(state)?;
        runtime.plan_board.replace_plan(plan)?;
    }
    state.log_info("update_daily_plan", "plan replaced from caller");
    get_daily_plan_impl(state)
}

pub fn begin_plan_edit_impl(state: &AppState) -> Result<DailyPlanResponse, InfraError> {
    {
        let mut runtime = lock_runtime(state)?;
        runtime.plan_board.begin_edit()?;
    }
    get_daily_plan_impl(state)
}

pub fn move_plan_block_impl(
    state: &AppState,
    source_id: String,
    target_id: String,
) -> Result<DailyPlanResponse, InfraError> {
    let mut runtime = lock_runtime(state)?;
    runtime
        .plan_board
        .move_block(source_id.trim(), target_id.trim())?;
    Ok(DailyPlanResponse {
        phase: runtime.plan_board.phase().as_str().to_string(),
        plan: Some(DailyPlan {
            time_blocks: runtime.plan_board.scratch_blocks().to_vec(),
            insights: Vec::new(),
            recommendations: Vec::new(),
            total_focus_minutes: 0,
            productivity_score: 0,
        }),
    })
}

pub fn save_plan_edit_impl(state: &AppState) -> Result<DailyPlanResponse, InfraError> {
    {
        let mut runtime = lock_runtime(state)?;
        runtime.plan_board.save_edit()?;
    }
    state.log_info("save_plan_edit", "plan edits committed");
    get_daily_plan_impl(state)
}

pub fn cancel_plan_edit_impl(state: &AppState) -> Result<DailyPlanResponse, InfraError> {
    {
        let mut runtime = lock_runtime(state)?;
        runtime.plan_board.cancel_edit()?;
    }
    get_daily_plan_impl(state)
}

pub async fn get_ai_insights_impl(
    state: &AppState,
    model: Option<String>,
) -> Result<Vec<AiInsight>, InfraError> {
    let api_key = completion_api_key().unwrap_or_default();
    let model = resolve_model(state.config_dir(), model)?;

    let context = {
        let runtime = lock_runtime(state)?;
        let tasks: Vec<&Task> = runtime.tasks.values().collect();
        let mut categories: Vec<String> = tasks
            .iter()
            .map(|task| task.category.clone())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        categories.truncate(8);
        CoachingContext {
            total_tasks: tasks.len(),
            completed_tasks: tasks.iter().filter(|task| task.completed).count(),
            open_urgent_tasks: tasks
                .iter()
                .filter(|task| !task.completed && task.priority == Priority::Urgent)
                .count(),
            categories,
        }
    };

    let insights = state
        .gateway
        .provide_coaching(&api_key, &context, &model)
        .await;

    let mut runtime = lock_runtime(state)?;
    runtime.insights = insights.clone();
    Ok(insights)
}

pub fn list_insights_impl(state: &AppState) -> Result<Vec<AiInsight>, InfraError> {
    let runtime = lock_runtime(state)?;
    Ok(runtime.insights.clone())
}

pub fn get_model_usage_impl(state: &AppState) -> HashMap<String, u64> {
    state.gateway.usage()
}

pub fn sync_task_to_calendar_impl(
    state: &AppState,
    task_id: String,
) -> Result<CalendarLinkResponse, InfraError> {
    let task_id = task_id.trim();
    let task = {
        let runtime = lock_runtime(state)?;
        runtime.tasks.get(task_id).cloned()
    };
    let Some(task) = task else {
        return Err(InfraError::InvalidConfig(format!(
            "task not found: {task_id}"
        )));
    };

    let timezone = read_timezone(state.config_dir())?;
    let response = build_calendar_link(&task, &timezone, Utc::now())?;
    state.log_info(
        "sync_task_to_calendar",
        &format!("calendar link built for task_id={task_id}"),
    );
    Ok(response)
}

pub async fn force_sync_all_tasks_impl(
    state: &AppState,
    include_completed: bool,
) -> Result<BatchSyncResponse, InfraError> {
    let timezone = read_timezone(state.config_dir())?;
    let tasks = {
        let mut runtime = lock_runtime(state)?;
        runtime.sync_status = SyncStatus::Syncing;
        runtime.sync_error = None;
        runtime
            .task_order
            .iter()
            .filter_map(|task_id| runtime.tasks.get(task_id))
            .filter(|task| include_completed || !task.completed)
            .cloned()
            .collect::<Vec<_>>()
    };

    let attempted = tasks.len();
    let mut results: Vec<Option<Result<CalendarLinkResponse, InfraError>>> =
        (0..attempted).map(|_| None).collect();
    let mut sync_tasks: JoinSet<(usize, Result<CalendarLinkResponse, InfraError>)> =
        JoinSet::new();

    for (index, task) in tasks.iter().cloned().enumerate() {
        let timezone = timezone.clone();
        sync_tasks.spawn(async move {
            let result = build_calendar_link(&task, &timezone, Utc::now());
            (index, result)
        });

        if sync_tasks.len() >= CALENDAR_SYNC_CONCURRENCY {
            collect_sync_result(&mut sync_tasks, &mut results).await;
        }
    }
    while !sync_tasks.is_empty() {
        collect_sync_result(&mut sync_tasks, &mut results).await;
    }

    let mut synced = 0usize;
    let mut failed_titles = Vec::new();
    let mut links = Vec::new();
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Some(Ok(response)) => {
                synced += 1;
                links.push(response.google_calendar_url);
            }
            // Individual failures are swallowed here and only summarized.
            _ => failed_titles.push(tasks[index].title.clone()),
        }
    }
    let failed = attempted - synced;

    {
        let mut runtime = lock_runtime(state)?;
        if failed == 0 {
            runtime.sync_status = SyncStatus::Synced;
            runtime.sync_error = None;
        } else {
            runtime.sync_status = SyncStatus::Error;
            runtime.sync_error = Some(format!("{failed} of {attempted} tasks failed to sync"));
        }
    }

    state.log_info(
        "force_sync_all_tasks",
        &format!("synced {synced} of {attempted} tasks"),
    );
    Ok(BatchSyncResponse {
        attempted,
        synced,
        failed,
        failed_titles,
        links,
    })
}

pub fn sync_plan_to_calendar_impl(state: &AppState) -> Result<PlanSyncResponse, InfraError> {
    let (blocks, tasks) = {
        let runtime = lock_runtime(state)?;
        let Some(plan) = runtime.plan_board.plan() else {
            return Err(InfraError::InvalidConfig(
                "no daily plan to sync".to_string(),
            ));
        };
        let tasks = runtime
            .task_order
            .iter()
            .filter_map(|task_id| runtime.tasks.get(task_id))
            .cloned()
            .collect::<Vec<_>>();
        (plan.time_blocks.clone(), tasks)
    };

    let timezone = read_timezone(state.config_dir())?;
    let now = Utc::now();
    let mut matched = 0usize;
    let mut synced = 0usize;
    let mut failed_titles = Vec::new();
    let mut links = Vec::new();

    for block in &blocks {
        let Some(task) = match_block_to_task(block, &tasks) else {
            continue;
        };
        matched += 1;
        match build_calendar_link(task, &timezone, now) {
            Ok(response) => {
                synced += 1;
                links.push(response.google_calendar_url);
            }
            Err(_) => failed_titles.push(task.title.clone()),
        }
    }

    state.log_info(
        "sync_plan_to_calendar",
        &format!(
            "matched {matched} of {} blocks, built {synced} links",
            blocks.len()
        ),
    );
    Ok(PlanSyncResponse {
        blocks: blocks.len(),
        matched,
        synced,
        failed_titles,
        links,
    })
}

pub async fn check_subscription_impl(
    state: &AppState,
    user_id: String,
    email: String,
) -> Result<SubscriptionInfo, InfraError> {
    let service = SubscriptionService::new(
        Arc::new(SqliteTrialRepository::new(state.database_path())),
        Arc::new(ReqwestBillingClient::new()),
    );
    let api_key = billing_api_key();
    let info = service
        .check(api_key.as_deref(), &user_id, &email)
        .await?;
    state.log_info(
        "check_subscription",
        &format!(
            "user_id={} subscribed={} trial_active={}",
            user_id.trim(),
            info.subscribed,
            info.trial_active
        ),
    );
    Ok(info)
}

pub async fn create_billing_portal_session_impl(
    state: &AppState,
    user_id: String,
    email: String,
) -> Result<PortalSessionResponse, InfraError> {
    let api_key = billing_api_key().ok_or_else(|| {
        InfraError::InvalidConfig(
            "missing billing api key (set TASKPILOT_BILLING_API_KEY or store the billing secret)"
                .to_string(),
        )
    })?;
    let return_url = read_portal_return_url(state.config_dir())?;

    let service = SubscriptionService::new(
        Arc::new(SqliteTrialRepository::new(state.database_path())),
        Arc::new(ReqwestBillingClient::new()),
    );
    let url = service
        .create_portal_session(&api_key, &user_id, &email, &return_url)
        .await?;
    state.log_info(
        "create_billing_portal_session",
        &format!("portal session created for user_id={}", user_id.trim()),
    );
    Ok(PortalSessionResponse { url })
}

pub async fn send_support_email_impl(
    state: &AppState,
    name: String,
    email: String,
    subject: String,
    message: String,
) -> Result<SupportEmailResponse, InfraError> {
    for (value, field) in [
        (&name, "name"),
        (&email, "email"),
        (&subject, "subject"),
        (&message, "message"),
    ] {
        if value.trim().is_empty() {
            return Err(InfraError::InvalidConfig(format!(
                "{field} must not be empty"
            )));
        }
    }

    let api_key = email_api_key().ok_or_else(|| {
        InfraError::InvalidConfig(
            "missing email api key (set TASKPILOT_EMAIL_API_KEY or store the email secret)"
                .to_string(),
        )
    })?;
    let from = read_email_from(state.config_dir())?;
    let support_inbox = read_support_inbox(state.config_dir())?;
    let client = ReqwestEmailClient::new();

    let support_message_id = client
        .send(
            &api_key,
            &EmailMessage {
                from: from.clone(),
                to: support_inbox,
                subject: format!("[support] {}", subject.trim()),
                body: format!(
                    "From: {} <{}>\n\n{}",
                    name.trim(),
                    email.trim(),
                    message.trim()
                ),
            },
        )
        .await?;
    let confirmation_message_id = client
        .send(
            &api_key,
            &EmailMessage {
                from,
                to: email.trim().to_string(),
                subject: "We received your message".to_string(),
                body: format!(
                    "Hi {},\n\nThanks for reaching out. Your message \"{}\" reached our support team and we will reply soon.",
                    name.trim(),
                    subject.trim()
                ),
            },
        )
        .await?;

    state.log_info("send_support_email", "support and confirmation emails sent");
    Ok(SupportEmailResponse {
        support_message_id,
        confirmation_message_id,
    })
}

async fn collect_sync_result(
    sync_tasks: &mut JoinSet<(usize, Result<CalendarLinkResponse, InfraError>)>,
    results: &mut [Option<Result<CalendarLinkResponse, InfraError>>],
) {
    let Some(join_result) = sync_tasks.join_next().await else {
        return;
    };
    if let Ok((index, result)) = join_result {
        if let Some(slot) = results.get_mut(index) {
            *slot = Some(result);
        }
    }
}

async fn dispatch_task_webhook(state: &AppState, event: &str, task: &Task) {
    let Ok(Some(url)) = read_webhook_url(state.config_dir()) else {
        return;
    };
    state.webhook.notify(&url, event, task, Utc::now()).await;
}

fn lock_runtime(state: &AppState) -> Result<MutexGuard<'_, RuntimeState>, InfraError> {
    state
        .runtime
        .lock()
        .map_err(|error| InfraError::InvalidConfig(format!("runtime lock poisoned: {error}")))
}

fn resolve_model(config_dir: &Path, model: Option<String>) -> Result<String, InfraError> {
    match model.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
        Some(model) => Ok(model.to_string()),
        None => read_default_model(config_dir),
    }
}

fn completion_api_key() -> Option<String> {
    secret_lookup(
        &["TASKPILOT_OPENROUTER_API_KEY", "OPENROUTER_API_KEY"],
        SECRET_COMPLETION,
    )
}

fn billing_api_key() -> Option<String> {
    secret_lookup(
        &["TASKPILOT_BILLING_API_KEY", "STRIPE_SECRET_KEY"],
        SECRET_BILLING,
    )
}

fn email_api_key() -> Option<String> {
    secret_lookup(&["TASKPILOT_EMAIL_API_KEY", "RESEND_API_KEY"], SECRET_EMAIL)
}

fn secret_lookup(env_keys: &[&str], secret_name: &str) -> Option<String> {
    for key in env_keys {
        if let Ok(value) = std::env::var(key) {
            let normalized = value.trim();
            if !normalized.is_empty() {
                return Some(normalized.to_string());
            }
        }
    }
    KeyringSecretStore::default()
        .load_secret(secret_name)
        .ok()
        .flatten()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
