#![cfg(feature = "web")]
//! Dashboard, domain pages, their CRUD form posts and table downloads

use axum::{
    Extension, Form,
    extract::{Path, Query, State, rejection::FormRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Local;
use log::{error, info};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::analytics::{DatasetSummary, IncidentSummary, TicketSummary};
use crate::app::{AppState, SharedState, access_denied, redirect_error, redirect_notice, server_error};
use crate::database::Database;
use crate::downloader::{ExportFormat, ExportTable, to_csv, to_xlsx};
use crate::error::{ArgusError, Result};
use crate::graph::{
    GraphOptions, bar_chart, box_plot, grouped_bar_chart, or_placeholder, pie_chart, scatter_chart,
};
use crate::login::CurrentUser;
use crate::models::{
    CyberIncident, DATASET_UPLOADERS, DatasetMetadata, DatasetUpdate, INCIDENT_CATEGORIES,
    INCIDENT_STATUSES, IncidentUpdate, ItTicket, PRIORITIES, Page, SEVERITIES, TICKET_ASSIGNEES,
    TICKET_STATUSES, Tabular, TicketUpdate, next_id,
};
use crate::records::{load_cyber_incidents, load_datasets_metadata, load_it_tickets};

const FORM_INVALID: &str = "Please fill in all fields correctly";

/// Flash messages and the record picked for the update form
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub notice: Option<String>,
    pub error: Option<String>,
    pub edit: Option<i64>,
}

/// Delete form shared by the three pages
#[derive(Debug, Deserialize)]
pub struct DeleteForm {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct IncidentForm {
    pub incident_id: i64,
    pub timestamp: String,
    pub severity: String,
    pub category: String,
    pub status: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct IncidentUpdateForm {
    pub incident_id: i64,
    pub status: String,
    pub severity: String,
}

#[derive(Debug, Deserialize)]
pub struct TicketForm {
    pub ticket_id: i64,
    pub priority: String,
    pub status: String,
    pub assigned_to: String,
    pub created_at: String,
    pub resolution_time_hours: f64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct TicketUpdateForm {
    pub ticket_id: i64,
    pub status: String,
    pub priority: String,
    pub resolution_time_hours: f64,
}

#[derive(Debug, Deserialize)]
pub struct DatasetForm {
    pub dataset_id: i64,
    pub name: String,
    pub rows: i64,
    pub columns: i64,
    pub uploaded_by: String,
    pub upload_date: String,
}

#[derive(Debug, Deserialize)]
pub struct DatasetUpdateForm {
    pub dataset_id: i64,
    pub name: String,
    pub rows: i64,
    pub columns: i64,
}

// Helpers

/// Format an integer with thousands separators
fn thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if n < 0 { format!("-{}", out) } else { out }
}

fn hours(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |h| format!("{:.1}", h))
}

/// Select box options with the current value marked
fn options(values: &[&str], selected: Option<&str>) -> Vec<Value> {
    values
        .iter()
        .map(|v| json!({ "value": v, "selected": Some(*v) == selected }))
        .collect()
}

fn table<T: Tabular>(records: &[T]) -> Value {
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| r.cells().iter().map(|c| c.to_string()).collect())
        .collect();
    json!({ "headers": T::HEADERS, "rows": rows })
}

fn ids<T: Tabular>(records: &[T], selected: Option<i64>) -> Vec<Value> {
    records
        .iter()
        .map(|r| json!({ "value": r.id(), "selected": Some(r.id()) == selected }))
        .collect()
}

fn check_option(value: &str, allowed: &[&str], field: &str) -> Result<()> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(ArgusError::Validation(format!("Invalid {}", field)))
    }
}

fn check_id(id: i64) -> Result<()> {
    if id >= 1 {
        Ok(())
    } else {
        Err(ArgusError::Validation("ID must be at least 1".into()))
    }
}

fn counts_as_bars(counts: &[crate::analytics::Count]) -> Vec<(String, f64)> {
    counts.iter().map(|c| (c.label.clone(), c.count as f64)).collect()
}

/// Shared frame plus the flash messages of the query string
fn page_data(state: &AppState, user: &CurrentUser, page: Page, query: &PageQuery) -> Value {
    let mut data = state.frame(user, page);
    data["notice"] = json!(query.notice);
    data["error"] = json!(query.error);
    data
}

/// Run a store change for a domain page and redirect back with its outcome
fn apply_change<F>(
    state: &AppState,
    user: &CurrentUser,
    page: Page,
    back: &str,
    success: &str,
    change: F,
) -> Response
where
    F: FnOnce(&Database) -> Result<()>,
{
    if !user.role.can_view(page) {
        return access_denied(state, user, page);
    }

    match state.database().and_then(|db| change(&*db)) {
        Ok(()) => {
            info!("{} on {}: {}", user.username, page.path(), success);
            redirect_notice(back, success)
        }
        Err(
            e @ (ArgusError::Duplicate { .. }
            | ArgusError::NotFound { .. }
            | ArgusError::Validation(_)),
        ) => redirect_error(back, &e.to_string()),
        Err(e) => {
            error!("change on {} by {} failed: {}", page.path(), user.username, e);
            redirect_error(back, "Could not save changes")
        }
    }
}

fn load_or_500<T>(loaded: Result<Vec<T>>, what: &str) -> std::result::Result<Vec<T>, Response> {
    loaded.map_err(|e| {
        error!("loading {} failed: {}", what, e);
        server_error()
    })
}

// Dashboard

pub async fn serve_dashboard(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<PageQuery>,
) -> Response {
    let mut data = page_data(&state, &user, Page::Dashboard, &query);
    data["title"] = json!(format!("WELCOME... {}!", user.username));

    let welcome = match user.role.home_page() {
        None => json!({
            "heading": "AUTHORIZED User Dashboard",
            "info": "You have full access to all domains",
            "cards": [
                { "label": "Cybersecurity", "blurb": "Monitor security incidents and threats", "path": Page::Cybersecurity.path() },
                { "label": "Data Science", "blurb": "Manage and analyze datasets", "path": Page::DataScience.path() },
                { "label": "IT Operations", "blurb": "Track IT tickets and performance", "path": Page::ItOperations.path() },
            ],
        }),
        Some(home) => {
            let (heading, info) = match home {
                Page::Cybersecurity => (
                    "Cybersecurity Analyst",
                    "Access to incident management and threat analysis",
                ),
                Page::DataScience => ("Data Scientist", "Access to dataset management and analytics"),
                _ => (
                    "IT Administrator",
                    "Access to ticket management and performance monitoring",
                ),
            };
            json!({ "heading": heading, "info": info, "home": home.path() })
        }
    };
    data["welcome"] = welcome;

    state.render("dashboard", &data)
}

// Cybersecurity

pub async fn serve_cybersecurity(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<PageQuery>,
) -> Response {
    let page = Page::Cybersecurity;
    if !user.role.can_view(page) {
        return access_denied(&state, &user, page);
    }

    let loaded = state
        .database()
        .and_then(|mut db| load_cyber_incidents(&mut db, &state.seeds));
    let incidents = match load_or_500(loaded, "cyber incidents") {
        Ok(incidents) => incidents,
        Err(response) => return response,
    };

    let summary = IncidentSummary::from_records(&incidents);
    let selected: Option<&CyberIncident> = query
        .edit
        .and_then(|id| incidents.iter().find(|i| i.incident_id == id))
        .or_else(|| incidents.first());

    let grouped_series: Vec<(String, Vec<f64>)> = summary
        .category_status
        .series
        .iter()
        .zip(&summary.category_status.counts)
        .map(|(name, counts)| (name.clone(), counts.iter().map(|c| *c as f64).collect()))
        .collect();

    let charts = json!({
        "phishing_status": or_placeholder(
            pie_chart(&counts_as_bars(&summary.phishing_status), &GraphOptions::new("Phishing Incident Status", "", "")),
            "Phishing Incident Status",
        ),
        "by_category": or_placeholder(
            bar_chart(&counts_as_bars(&summary.by_category), &GraphOptions::new("Incidents by Category", "Category", "Count")),
            "Incidents by Category",
        ),
        "by_severity": or_placeholder(
            pie_chart(&counts_as_bars(&summary.by_severity), &GraphOptions::new("Severity Distribution", "", "")),
            "Severity Distribution",
        ),
        "category_status": or_placeholder(
            grouped_bar_chart(
                &summary.category_status.groups,
                &grouped_series,
                &GraphOptions::new("Incidents by Category and Status", "Category", "Count").sized(960, 420),
            ),
            "Incidents by Category and Status",
        ),
    });

    let mut data = page_data(&state, &user, page, &query);
    data["title"] = json!("Cybersecurity Dashboard");
    data["summary"] = json!(summary);
    data["charts"] = charts;
    data["table"] = table(&incidents);
    data["create"] = json!({
        "next_id": next_id(&incidents),
        "now": Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        "severities": options(&SEVERITIES, None),
        "categories": options(&INCIDENT_CATEGORIES, None),
        "statuses": options(&INCIDENT_STATUSES, None),
    });
    data["update"] = json!({
        "ids": ids(&incidents, selected.map(|i| i.incident_id)),
        "selected": selected.map(|i| i.incident_id),
        "statuses": options(&INCIDENT_STATUSES, selected.map(|i| i.status.as_str())),
        "severities": options(&SEVERITIES, selected.map(|i| i.severity.as_str())),
    });
    data["delete_ids"] = json!(ids(&incidents, None));

    state.render("cybersecurity", &data)
}

pub async fn create_incident(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    form: std::result::Result<Form<IncidentForm>, FormRejection>,
) -> Response {
    let back = Page::Cybersecurity.path();
    let Ok(Form(form)) = form else {
        return redirect_error(back, FORM_INVALID);
    };

    apply_change(&state, &user, Page::Cybersecurity, back, "Incident created successfully", |db| {
        check_id(form.incident_id)?;
        check_option(&form.severity, &SEVERITIES, "severity")?;
        check_option(&form.category, &INCIDENT_CATEGORIES, "category")?;
        check_option(&form.status, &INCIDENT_STATUSES, "status")?;
        let description = form.description.trim();
        db.create_incident(&CyberIncident {
            incident_id: form.incident_id,
            timestamp: form.timestamp.trim().to_string(),
            severity: form.severity.clone(),
            category: form.category.clone(),
            status: form.status.clone(),
            description: (!description.is_empty()).then(|| description.to_string()),
        })
    })
}

pub async fn update_incident(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    form: std::result::Result<Form<IncidentUpdateForm>, FormRejection>,
) -> Response {
    let Ok(Form(form)) = form else {
        return redirect_error(Page::Cybersecurity.path(), FORM_INVALID);
    };
    let back = format!("{}?edit={}", Page::Cybersecurity.path(), form.incident_id);

    apply_change(&state, &user, Page::Cybersecurity, &back, "Incident updated successfully", |db| {
        check_option(&form.status, &INCIDENT_STATUSES, "status")?;
        check_option(&form.severity, &SEVERITIES, "severity")?;
        db.update_incident(
            form.incident_id,
            &IncidentUpdate {
                status: form.status.clone(),
                severity: form.severity.clone(),
            },
        )
    })
}

pub async fn delete_incident(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    form: std::result::Result<Form<DeleteForm>, FormRejection>,
) -> Response {
    let back = Page::Cybersecurity.path();
    let Ok(Form(form)) = form else {
        return redirect_error(back, FORM_INVALID);
    };

    apply_change(&state, &user, Page::Cybersecurity, back, "Incident deleted successfully", |db| {
        db.delete_incident(form.id)
    })
}

// IT operations

pub async fn serve_it_operations(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<PageQuery>,
) -> Response {
    let page = Page::ItOperations;
    if !user.role.can_view(page) {
        return access_denied(&state, &user, page);
    }

    let loaded = state
        .database()
        .and_then(|mut db| load_it_tickets(&mut db, &state.seeds));
    let tickets = match load_or_500(loaded, "IT tickets") {
        Ok(tickets) => tickets,
        Err(response) => return response,
    };

    let summary = TicketSummary::from_records(&tickets);
    let selected: Option<&ItTicket> = query
        .edit
        .and_then(|id| tickets.iter().find(|t| t.ticket_id == id))
        .or_else(|| tickets.first());

    let staff_bars: Vec<(String, f64)> = summary
        .staff
        .iter()
        .filter_map(|s| s.avg_resolution.map(|h| (s.assignee.clone(), h)))
        .collect();
    let status_bars: Vec<(String, f64)> = summary
        .status_resolution
        .iter()
        .map(|a| (a.label.clone(), a.hours))
        .collect();

    let charts = json!({
        "staff": or_placeholder(
            bar_chart(&staff_bars, &GraphOptions::new("Average Resolution Time by Staff", "Staff Member", "Avg Resolution Time (hrs)")),
            "Average Resolution Time by Staff",
        ),
        "status": or_placeholder(
            bar_chart(&status_bars, &GraphOptions::new("Resolution Time by Status", "Status", "Avg Resolution Time (hrs)")),
            "Resolution Time by Status",
        ),
        "priority": or_placeholder(
            bar_chart(&counts_as_bars(&summary.by_priority), &GraphOptions::new("Ticket Priority Distribution", "Priority", "Count")),
            "Ticket Priority Distribution",
        ),
        "resolution": or_placeholder(
            box_plot(&summary.resolution_by_priority, &GraphOptions::new("Resolution Time Distribution by Priority", "Priority", "Resolution Time (hours)")),
            "Resolution Time Distribution by Priority",
        ),
    });

    let staff_rows: Vec<Value> = summary
        .staff
        .iter()
        .map(|s| json!({ "assignee": s.assignee, "total_tickets": s.total_tickets, "avg": hours(s.avg_resolution) }))
        .collect();
    let status_rows: Vec<Value> = summary
        .status_resolution
        .iter()
        .map(|a| json!({ "status": a.label, "avg": hours(Some(a.hours)) }))
        .collect();

    let mut data = page_data(&state, &user, page, &query);
    data["title"] = json!("IT Operations Dashboard");
    data["summary"] = json!({
        "total": summary.total,
        "open": summary.open,
        "critical": summary.critical,
        "avg_resolution": format!("{} hrs", hours(summary.avg_resolution)),
        "staff": staff_rows,
        "status_resolution": status_rows,
        "slowest": summary.slowest.as_ref().map(|s| format!(
            "Performance Anomaly: {} has the highest average resolution time ({:.1} hours)",
            s.label, s.hours
        )),
        "bottleneck": summary.bottleneck.as_ref().map(|b| format!(
            "Bottleneck Identified: Tickets in '{}' status have the longest resolution time ({:.1} hours)",
            b.label, b.hours
        )),
    });
    data["charts"] = charts;
    data["table"] = table(&tickets);
    data["create"] = json!({
        "next_id": next_id(&tickets),
        "now": Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        "priorities": options(&PRIORITIES, None),
        "statuses": options(&TICKET_STATUSES, None),
        "assignees": options(&TICKET_ASSIGNEES, None),
    });
    data["update"] = json!({
        "ids": ids(&tickets, selected.map(|t| t.ticket_id)),
        "selected": selected.map(|t| t.ticket_id),
        "statuses": options(&TICKET_STATUSES, selected.map(|t| t.status.as_str())),
        "priorities": options(&PRIORITIES, selected.map(|t| t.priority.as_str())),
        "resolution": selected.and_then(|t| t.resolution_time_hours).unwrap_or(0.0),
    });
    data["delete_ids"] = json!(ids(&tickets, None));

    state.render("it_operations", &data)
}

/// Longest resolution time a ticket form may record
const MAX_RESOLUTION_HOURS: f64 = 100_000.0;

fn check_hours(hours: f64) -> Result<()> {
    if !hours.is_finite() {
        return Err(ArgusError::Validation("Resolution time must be a number".into()));
    }
    if hours < 0.0 {
        return Err(ArgusError::Validation("Resolution time cannot be negative".into()));
    }
    if hours > MAX_RESOLUTION_HOURS {
        return Err(ArgusError::Validation(format!(
            "Resolution time cannot exceed {} hours",
            MAX_RESOLUTION_HOURS
        )));
    }
    Ok(())
}

pub async fn create_ticket(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    form: std::result::Result<Form<TicketForm>, FormRejection>,
) -> Response {
    let back = Page::ItOperations.path();
    let Ok(Form(form)) = form else {
        return redirect_error(back, FORM_INVALID);
    };

    apply_change(&state, &user, Page::ItOperations, back, "Ticket created successfully", |db| {
        check_id(form.ticket_id)?;
        check_option(&form.priority, &PRIORITIES, "priority")?;
        check_option(&form.status, &TICKET_STATUSES, "status")?;
        check_option(&form.assigned_to, &TICKET_ASSIGNEES, "assignee")?;
        check_hours(form.resolution_time_hours)?;
        db.create_ticket(&ItTicket {
            ticket_id: form.ticket_id,
            priority: form.priority.clone(),
            description: form.description.trim().to_string(),
            status: form.status.clone(),
            assigned_to: form.assigned_to.clone(),
            created_at: form.created_at.trim().to_string(),
            resolution_time_hours: Some(form.resolution_time_hours),
        })
    })
}

pub async fn update_ticket(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    form: std::result::Result<Form<TicketUpdateForm>, FormRejection>,
) -> Response {
    let Ok(Form(form)) = form else {
        return redirect_error(Page::ItOperations.path(), FORM_INVALID);
    };
    let back = format!("{}?edit={}", Page::ItOperations.path(), form.ticket_id);

    apply_change(&state, &user, Page::ItOperations, &back, "Ticket updated successfully", |db| {
        check_option(&form.status, &TICKET_STATUSES, "status")?;
        check_option(&form.priority, &PRIORITIES, "priority")?;
        check_hours(form.resolution_time_hours)?;
        db.update_ticket(
            form.ticket_id,
            &TicketUpdate {
                status: form.status.clone(),
                priority: form.priority.clone(),
                resolution_time_hours: form.resolution_time_hours,
            },
        )
    })
}

pub async fn delete_ticket(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    form: std::result::Result<Form<DeleteForm>, FormRejection>,
) -> Response {
    let back = Page::ItOperations.path();
    let Ok(Form(form)) = form else {
        return redirect_error(back, FORM_INVALID);
    };

    apply_change(&state, &user, Page::ItOperations, back, "Ticket deleted successfully", |db| {
        db.delete_ticket(form.id)
    })
}

// Data science

pub async fn serve_data_science(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<PageQuery>,
) -> Response {
    let page = Page::DataScience;
    if !user.role.can_view(page) {
        return access_denied(&state, &user, page);
    }

    let loaded = state
        .database()
        .and_then(|mut db| load_datasets_metadata(&mut db, &state.seeds));
    let datasets = match load_or_500(loaded, "dataset metadata") {
        Ok(datasets) => datasets,
        Err(response) => return response,
    };

    let summary = DatasetSummary::from_records(&datasets);
    let selected: Option<&DatasetMetadata> = query
        .edit
        .and_then(|id| datasets.iter().find(|d| d.dataset_id == id))
        .or_else(|| datasets.first());

    let source_bars: Vec<(String, f64)> = summary
        .rows_by_source
        .iter()
        .map(|s| (s.source.clone(), s.total_rows as f64))
        .collect();
    let dataset_bars: Vec<(String, f64)> = datasets
        .iter()
        .map(|d| (d.name.clone(), d.rows as f64))
        .collect();
    let points: Vec<(f64, f64, f64)> = datasets
        .iter()
        .map(|d| (d.rows as f64, d.columns as f64, d.rows as f64))
        .collect();

    let charts = json!({
        "sources": or_placeholder(
            bar_chart(&source_bars, &GraphOptions::new("Source Dependency", "Source", "Total Rows")),
            "Source Dependency",
        ),
        "rows": or_placeholder(
            bar_chart(&dataset_bars, &GraphOptions::new("Rows per Dataset", "Dataset", "Number of Rows")),
            "Rows per Dataset",
        ),
        "complexity": or_placeholder(
            scatter_chart(&points, &GraphOptions::new("Dataset Complexity", "Number of Rows", "Number of Columns")),
            "Dataset Complexity",
        ),
    });

    let archiving = summary.large_threshold.map(|threshold| {
        format!(
            "Archiving Policy Recommendation: {} datasets exceed the 75th percentile ({} rows) and should be considered for archiving or compression.",
            summary.large_datasets.len(),
            thousands(threshold.round() as i64)
        )
    });

    let mut data = page_data(&state, &user, page, &query);
    data["title"] = json!("Data Science Dashboard");
    data["summary"] = json!({
        "total": summary.total,
        "total_rows": thousands(summary.total_rows),
        "storage": format!("{:.2} GB", summary.storage_gb),
        "sources": summary.sources,
        "top_by_rows": summary.top_by_rows,
        "archiving": archiving,
        "large_datasets": summary.large_datasets,
        "source_totals": summary.source_totals,
    });
    data["charts"] = charts;
    data["table"] = table(&datasets);
    data["create"] = json!({
        "next_id": next_id(&datasets),
        "today": Local::now().format("%Y-%m-%d").to_string(),
        "uploaders": options(&DATASET_UPLOADERS, None),
    });
    data["update"] = json!({
        "ids": ids(&datasets, selected.map(|d| d.dataset_id)),
        "selected": selected.map(|d| d.dataset_id),
        "name": selected.map(|d| d.name.as_str()),
        "rows": selected.map(|d| d.rows),
        "columns": selected.map(|d| d.columns),
    });
    data["delete_ids"] = json!(ids(&datasets, None));

    state.render("data_science", &data)
}

const MAX_DATASET_ROWS: i64 = 1_000_000_000_000;
const MAX_DATASET_COLUMNS: i64 = 1_000_000;

fn check_dataset_shape(name: &str, rows: i64, columns: i64) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ArgusError::Validation("Dataset name cannot be empty".into()));
    }
    if rows < 0 {
        return Err(ArgusError::Validation("Rows cannot be negative".into()));
    }
    if rows > MAX_DATASET_ROWS {
        return Err(ArgusError::Validation(format!(
            "Rows cannot exceed {}",
            thousands(MAX_DATASET_ROWS)
        )));
    }
    if columns < 1 {
        return Err(ArgusError::Validation("Columns must be at least 1".into()));
    }
    if columns > MAX_DATASET_COLUMNS {
        return Err(ArgusError::Validation(format!(
            "Columns cannot exceed {}",
            thousands(MAX_DATASET_COLUMNS)
        )));
    }
    Ok(())
}

pub async fn create_dataset(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    form: std::result::Result<Form<DatasetForm>, FormRejection>,
) -> Response {
    let back = Page::DataScience.path();
    let Ok(Form(form)) = form else {
        return redirect_error(back, FORM_INVALID);
    };

    apply_change(&state, &user, Page::DataScience, back, "Dataset added successfully", |db| {
        check_id(form.dataset_id)?;
        check_dataset_shape(&form.name, form.rows, form.columns)?;
        check_option(&form.uploaded_by, &DATASET_UPLOADERS, "uploader")?;
        db.create_dataset(&DatasetMetadata {
            dataset_id: form.dataset_id,
            name: form.name.trim().to_string(),
            rows: form.rows,
            columns: form.columns,
            uploaded_by: form.uploaded_by.clone(),
            upload_date: form.upload_date.trim().to_string(),
        })
    })
}

pub async fn update_dataset(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    form: std::result::Result<Form<DatasetUpdateForm>, FormRejection>,
) -> Response {
    let Ok(Form(form)) = form else {
        return redirect_error(Page::DataScience.path(), FORM_INVALID);
    };
    let back = format!("{}?edit={}", Page::DataScience.path(), form.dataset_id);

    apply_change(&state, &user, Page::DataScience, &back, "Dataset updated successfully", |db| {
        check_dataset_shape(&form.name, form.rows, form.columns)?;
        db.update_dataset(
            form.dataset_id,
            &DatasetUpdate {
                name: form.name.trim().to_string(),
                rows: form.rows,
                columns: form.columns,
            },
        )
    })
}

pub async fn delete_dataset(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    form: std::result::Result<Form<DeleteForm>, FormRejection>,
) -> Response {
    let back = Page::DataScience.path();
    let Ok(Form(form)) = form else {
        return redirect_error(back, FORM_INVALID);
    };

    apply_change(&state, &user, Page::DataScience, back, "Dataset deleted successfully", |db| {
        db.delete_dataset(form.id)
    })
}

// Export

fn encode<T: Tabular>(records: &[T], format: ExportFormat, sheet: &str) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Csv => to_csv(records).map(String::into_bytes),
        ExportFormat::Xlsx => to_xlsx(records, sheet),
    }
}

fn export_bytes(state: &AppState, table: ExportTable, format: ExportFormat) -> Result<Vec<u8>> {
    let mut db = state.database()?;
    match table {
        ExportTable::Incidents => {
            encode(&load_cyber_incidents(&mut db, &state.seeds)?, format, "Incidents")
        }
        ExportTable::Tickets => encode(&load_it_tickets(&mut db, &state.seeds)?, format, "Tickets"),
        ExportTable::Datasets => {
            encode(&load_datasets_metadata(&mut db, &state.seeds)?, format, "Datasets")
        }
    }
}

/// Download a domain table as CSV or XLSX
pub async fn export_table(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    Path((table, format)): Path<(String, String)>,
) -> Response {
    let (Ok(table), Ok(format)) = (table.parse::<ExportTable>(), format.parse::<ExportFormat>())
    else {
        return (StatusCode::NOT_FOUND, "Unknown export").into_response();
    };
    if !user.role.can_view(table.page()) {
        return access_denied(&state, &user, table.page());
    }

    match export_bytes(&state, table, format) {
        Ok(bytes) => {
            info!("{} exported {}.{}", user.username, table.file_stem(), format.extension());
            let disposition = format!(
                "attachment; filename=\"{}.{}\"",
                table.file_stem(),
                format.extension()
            );
            (
                [
                    (header::CONTENT_TYPE, format.content_type().to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) => {
            error!("export of {} failed: {}", table.file_stem(), e);
            server_error()
        }
    }
}
