mod application;
mod domain;
mod infrastructure;

use application::bootstrap::bootstrap_workspace;
use application::commands::{
    add_task_impl, begin_plan_edit_impl, cancel_plan_edit_impl, check_subscription_impl,
    create_billing_portal_session_impl, delete_task_impl, force_sync_all_tasks_impl,
    generate_daily_plan_impl, get_ai_insights_impl, get_daily_plan_impl, get_model_usage_impl,
    delete_api_key_impl, get_sync_status_impl, list_insights_impl, list_tasks_impl,
    move_plan_block_impl, quick_add_task_impl, save_plan_edit_impl, send_support_email_impl,
    set_api_key_impl, set_filter_impl, set_webhook_url_impl, sync_plan_to_calendar_impl,
    sync_task_to_calendar_impl, toggle_task_impl, update_daily_plan_impl, update_task_impl,
    AppState, BatchSyncResponse, DailyPlanResponse, PlanSyncResponse, PortalSessionResponse,
    SupportEmailResponse, SyncStatusResponse,
};
use domain::models::{AiInsight, DailyPlan, SubscriptionInfo, Task};
use infrastructure::calendar_link::CalendarLinkResponse;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
struct BootstrapResponse {
    workspace_root: String,
    database_path: String,
}

#[tauri::command]
fn bootstrap(root: Option<String>) -> Result<BootstrapResponse, String> {
    let workspace_root = match root {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir().map_err(|error| error.to_string())?,
    };

    let result = bootstrap_workspace(&workspace_root).map_err(|error| error.to_string())?;
    Ok(BootstrapResponse {
        workspace_root: result.workspace_root.display().to_string(),
        database_path: result.database_path.display().to_string(),
    })
}

#[tauri::command]
fn ping() -> &'static str {
    "pong"
}

#[tauri::command]
fn list_tasks(state: tauri::State<'_, AppState>) -> Result<Vec<Task>, String> {
    list_tasks_impl(state.inner()).map_err(|error| state.command_error("list_tasks", &error))
}

#[tauri::command]
async fn add_task(
    state: tauri::State<'_, AppState>,
    title: String,
    description: Option<String>,
    enhance: Option<bool>,
    model: Option<String>,
) -> Result<Task, String> {
    add_task_impl(
        state.inner(),
        title,
        description,
        enhance.unwrap_or(false),
        model,
    )
    .await
    .map_err(|error| state.command_error("add_task", &error))
}

#[tauri::command]
async fn quick_add_task(
    state: tauri::State<'_, AppState>,
    input: String,
    model: Option<String>,
) -> Result<Task, String> {
    quick_add_task_impl(state.inner(), input, model)
        .await
        .map_err(|error| state.command_error("quick_add_task", &error))
}

#[tauri::command]
async fn toggle_task(state: tauri::State<'_, AppState>, task_id: String) -> Result<Task, String> {
    toggle_task_impl(state.inner(), task_id)
        .await
        .map_err(|error| state.command_error("toggle_task", &error))
}

#[tauri::command]
#[allow(clippy::too_many_arguments)]
fn update_task(
    state: tauri::State<'_, AppState>,
    task_id: String,
    title: Option<String>,
    description: Option<String>,
    priority: Option<String>,
    category: Option<String>,
    estimated_time: Option<String>,
    due_date: Option<String>,
    due_time: Option<String>,
) -> Result<Task, String> {
    update_task_impl(
        state.inner(),
        task_id,
        title,
        description,
        priority,
        category,
        estimated_time,
        due_date,
        due_time,
    )
    .map_err(|error| state.command_error("update_task", &error))
}

#[tauri::command]
async fn delete_task(state: tauri::State<'_, AppState>, task_id: String) -> Result<bool, String> {
    delete_task_impl(state.inner(), task_id)
        .await
        .map_err(|error| state.command_error("delete_task", &error))
}

#[tauri::command]
fn set_filter(state: tauri::State<'_, AppState>, name: String) -> Result<Vec<Task>, String> {
    set_filter_impl(state.inner(), name)
        .and_then(|_| list_tasks_impl(state.inner()))
        .map_err(|error| state.command_error("set_filter", &error))
}

#[tauri::command]
fn set_webhook_url(
    state: tauri::State<'_, AppState>,
    url: Option<String>,
) -> Result<(), String> {
    set_webhook_url_impl(state.inner(), url)
        .map_err(|error| state.command_error("set_webhook_url", &error))
}

#[tauri::command]
fn set_api_key(
    state: tauri::State<'_, AppState>,
    name: String,
    value: String,
) -> Result<(), String> {
    set_api_key_impl(name, value).map_err(|error| state.command_error("set_api_key", &error))
}

#[tauri::command]
fn delete_api_key(state: tauri::State<'_, AppState>, name: String) -> Result<(), String> {
    delete_api_key_impl(name).map_err(|error| state.command_error("delete_api_key", &error))
}

#[tauri::command]
fn get_sync_status(state: tauri::State<'_, AppState>) -> Result<SyncStatusResponse, String> {
    get_sync_status_impl(state.inner())
        .map_err(|error| state.command_error("get_sync_status", &error))
}

#[tauri::command]
async fn generate_daily_plan(
    state: tauri::State<'_, AppState>,
    model: Option<String>,
) -> Result<DailyPlanResponse, String> {
    generate_daily_plan_impl(state.inner(), model)
        .await
        .map_err(|error| state.command_error("generate_daily_plan", &error))
}

#[tauri::command]
fn get_daily_plan(state: tauri::State<'_, AppState>) -> Result<DailyPlanResponse, String> {
    get_daily_plan_impl(state.inner())
        .map_err(|error| state.command_error("get_daily_plan", &error))
}

#[tauri::command]
fn update_daily_plan(
    state: tauri::State<'_, AppState>,
    plan: DailyPlan,
) -> Result<DailyPlanResponse, String> {
    update_daily_plan_impl(state.inner(), plan)
        .map_err(|error| state.command_error("update_daily_plan", &error))
}

#[tauri::command]
fn begin_plan_edit(state: tauri::State<'_, AppState>) -> Result<DailyPlanResponse, String> {
    begin_plan_edit_impl(state.inner())
        .map_err(|error| state.command_error("begin_plan_edit", &error))
}

#[tauri::command]
fn move_plan_block(
    state: tauri::State<'_, AppState>,
    source_id: String,
    target_id: String,
) -> Result<DailyPlanResponse, String> {
    move_plan_block_impl(state.inner(), source_id, target_id)
        .map_err(|error| state.command_error("move_plan_block", &error))
}

#[tauri::command]
fn save_plan_edit(state: tauri::State<'_, AppState>) -> Result<DailyPlanResponse, String> {
    save_plan_edit_impl(state.inner())
        .map_err(|error| state.command_error("save_plan_edit", &error))
}

#[tauri::command]
fn cancel_plan_edit(state: tauri::State<'_, AppState>) -> Result<DailyPlanResponse, String> {
    cancel_plan_edit_impl(state.inner())
        .map_err(|error| state.command_error("cancel_plan_edit", &error))
}

#[tauri::command]
async fn get_ai_insights(
    state: tauri::State<'_, AppState>,
    model: Option<String>,
) -> Result<Vec<AiInsight>, String> {
    get_ai_insights_impl(state.inner(), model)
        .await
        .map_err(|error| state.command_error("get_ai_insights", &error))
}

#[tauri::command]
fn list_insights(state: tauri::State<'_, AppState>) -> Result<Vec<AiInsight>, String> {
    list_insights_impl(state.inner())
        .map_err(|error| state.command_error("list_insights", &error))
}

#[tauri::command]
fn get_model_usage(state: tauri::State<'_, AppState>) -> HashMap<String, u64> {
    get_model_usage_impl(state.inner())
}

#[tauri::command]
fn sync_task_to_calendar(
    state: tauri::State<'_, AppState>,
    task_id: String,
) -> Result<CalendarLinkResponse, String> {
    sync_task_to_calendar_impl(state.inner(), task_id)
        .map_err(|error| state.command_error("sync_task_to_calendar", &error))
}

#[tauri::command]
fn sync_plan_to_calendar(state: tauri::State<'_, AppState>) -> Result<PlanSyncResponse, String> {
    sync_plan_to_calendar_impl(state.inner())
        .map_err(|error| state.command_error("sync_plan_to_calendar", &error))
}

#[tauri::command]
async fn force_sync_all_tasks(
    state: tauri::State<'_, AppState>,
    include_completed: Option<bool>,
) -> Result<BatchSyncResponse, String> {
    force_sync_all_tasks_impl(state.inner(), include_completed.unwrap_or(false))
        .await
        .map_err(|error| state.command_error("force_sync_all_tasks", &error))
}

#[tauri::command]
async fn check_subscription(
    state: tauri::State<'_, AppState>,
    user_id: String,
    email: Option<String>,
) -> Result<SubscriptionInfo, String> {
    check_subscription_impl(state.inner(), user_id, email.unwrap_or_default())
        .await
        .map_err(|error| state.command_error("check_subscription", &error))
}

#[tauri::command]
async fn create_billing_portal_session(
    state: tauri::State<'_, AppState>,
    user_id: String,
    email: String,
) -> Result<PortalSessionResponse, String> {
    create_billing_portal_session_impl(state.inner(), user_id, email)
        .await
        .map_err(|error| state.command_error("create_billing_portal_session", &error))
}

#[tauri::command]
async fn send_support_email(
    state: tauri::State<'_, AppState>,
    name: String,
    email: String,
    subject: String,
    message: String,
) -> Result<SupportEmailResponse, String> {
    send_support_email_impl(state.inner(), name, email, subject, message)
        .await
        .map_err(|error| state.command_error("send_support_email", &error))
}

pub fn run() {
    let workspace_root = std::env::current_dir().expect("failed to resolve current directory");
    let app_state = AppState::new(workspace_root).expect("failed to initialize app state");

    tauri::Builder::default()
        .manage(app_state)
        .invoke_handler(tauri::generate_handler![
            ping,
            bootstrap,
            list_tasks,
            add_task,
            quick_add_task,
            toggle_task,
            update_task,
            delete_task,
            set_filter,
            set_webhook_url,
            set_api_key,
            delete_api_key,
            get_sync_status,
            generate_daily_plan,
            get_daily_plan,
            update_daily_plan,
            begin_plan_edit,
            move_plan_block,
            save_plan_edit,
            cancel_plan_edit,
            get_ai_insights,
            list_insights,
            get_model_usage,
            sync_task_to_calendar,
            sync_plan_to_calendar,
            force_sync_all_tasks,
            check_subscription,
            create_billing_portal_session,
            send_support_email
        ])
        .run(tauri::generate_context!())
        .expect("failed to run tauri app");
}
