use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::models::{
    ProgressWeights, ProjectSnapshot, ProjectStatus, SupplyLine, WorkOrderSnapshot,
};
use crate::progress::{self, CalculatorConfig, DEFAULT_WEIGHTS};

const BADGE_UPPER: Decimal = Decimal::from_parts(102, 0, 0, false, 2);
const BADGE_LOWER: Decimal = Decimal::from_parts(98, 0, 0, false, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleBadge {
    Ahead,
    OnTrack,
    Behind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CostBadge {
    Under,
    OnBudget,
    Over,
}

#[derive(Debug, Clone, Serialize)]
pub struct Badges {
    pub schedule: ScheduleBadge,
    pub cost: CostBadge,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub project_id: Uuid,
    pub name: String,
    pub status: ProjectStatus,
    pub priority: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub overall_progress: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub work_order_completion: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub schedule_progress: Decimal,
    #[serde(rename = "SPI", with = "rust_decimal::serde::float")]
    pub spi: Decimal,
    #[serde(rename = "CPI", with = "rust_decimal::serde::float")]
    pub cpi: Decimal,
    pub badges: Badges,
    pub total_work_orders: usize,
    pub completed_work_orders: usize,
    pub in_progress_work_orders: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardPage {
    pub count: usize,
    pub page: usize,
    pub page_size: usize,
    pub results: Vec<ProjectSummary>,
}

pub fn schedule_badge(spi: Decimal) -> ScheduleBadge {
    if spi > BADGE_UPPER {
        ScheduleBadge::Ahead
    } else if spi < BADGE_LOWER {
        ScheduleBadge::Behind
    } else {
        ScheduleBadge::OnTrack
    }
}

pub fn cost_badge(cpi: Decimal) -> CostBadge {
    if cpi > BADGE_UPPER {
        CostBadge::Under
    } else if cpi < BADGE_LOWER {
        CostBadge::Over
    } else {
        CostBadge::OnBudget
    }
}

/// Headline figures for one project. Without custom weights the default blend
/// is rounded to four places for display.
pub fn summarize_project(
    project: &ProjectSnapshot,
    work_orders: &[WorkOrderSnapshot],
    supplies: &[SupplyLine],
    weights: Option<&ProgressWeights>,
    as_of: Option<NaiveDate>,
    config: &CalculatorConfig,
) -> ProjectSummary {
    let report = progress::compute_project_progress(
        project,
        work_orders,
        supplies,
        Some(weights.unwrap_or(&DEFAULT_WEIGHTS)),
        as_of,
        config,
    );
    let overall_progress = if weights.is_some() {
        report.overall_progress
    } else {
        report.overall_progress.round_dp(4)
    };

    ProjectSummary {
        project_id: project.id,
        name: project.name.clone(),
        status: project.status,
        priority: project.priority.clone(),
        overall_progress,
        work_order_completion: report.work_order_completion,
        schedule_progress: report.schedule_progress,
        spi: report.spi,
        cpi: report.cpi,
        badges: Badges {
            schedule: schedule_badge(report.spi),
            cost: cost_badge(report.cpi),
        },
        total_work_orders: report.details.counts.total,
        completed_work_orders: report.details.counts.completed,
        in_progress_work_orders: report.details.counts.in_progress,
    }
}

pub fn summarize_projects(
    projects: &[ProjectSnapshot],
    work_orders: &[WorkOrderSnapshot],
    supplies: &[SupplyLine],
    weights: Option<&ProgressWeights>,
    as_of: Option<NaiveDate>,
    config: &CalculatorConfig,
) -> Vec<ProjectSummary> {
    let mut by_project: HashMap<Uuid, Vec<WorkOrderSnapshot>> = HashMap::new();
    let mut project_of_order: HashMap<Uuid, Uuid> = HashMap::new();
    for order in work_orders {
        project_of_order.insert(order.id, order.project_id);
        by_project
            .entry(order.project_id)
            .or_default()
            .push(order.clone());
    }

    // Supplies reach a project only through one of its work orders.
    let mut supplies_by_project: HashMap<Uuid, Vec<SupplyLine>> = HashMap::new();
    for line in supplies {
        if let Some(project_id) = project_of_order.get(&line.work_order_id) {
            supplies_by_project
                .entry(*project_id)
                .or_default()
                .push(line.clone());
        }
    }

    projects
        .iter()
        .map(|project| {
            let orders = by_project
                .get(&project.id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let lines = supplies_by_project
                .get(&project.id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            summarize_project(project, orders, lines, weights, as_of, config)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortField {
    OverallProgress,
    WorkOrderCompletion,
    ScheduleProgress,
    Spi,
    Cpi,
    Priority,
    Name,
}

impl SortField {
    fn parse(key: &str) -> Option<Self> {
        match key {
            "overallProgress" => Some(Self::OverallProgress),
            "workOrderCompletion" => Some(Self::WorkOrderCompletion),
            "scheduleProgress" => Some(Self::ScheduleProgress),
            "SPI" => Some(Self::Spi),
            "CPI" => Some(Self::Cpi),
            "priority" => Some(Self::Priority),
            "name" => Some(Self::Name),
            _ => None,
        }
    }

    fn compare(self, a: &ProjectSummary, b: &ProjectSummary) -> Ordering {
        match self {
            Self::OverallProgress => a.overall_progress.cmp(&b.overall_progress),
            Self::WorkOrderCompletion => a.work_order_completion.cmp(&b.work_order_completion),
            Self::ScheduleProgress => a.schedule_progress.cmp(&b.schedule_progress),
            Self::Spi => a.spi.cmp(&b.spi),
            Self::Cpi => a.cpi.cmp(&b.cpi),
            Self::Priority => priority_rank(&a.priority).cmp(&priority_rank(&b.priority)),
            Self::Name => a.name.cmp(&b.name),
        }
    }
}

fn priority_rank(priority: &str) -> u8 {
    match priority {
        "low" => 1,
        "medium" => 2,
        "high" => 3,
        "critical" => 4,
        _ => 0,
    }
}

/// Sorts by a comma-separated key list; a leading `-` sorts that key descending.
pub fn sort_summaries(summaries: &mut [ProjectSummary], sort: &str) {
    let keys: Vec<(SortField, bool)> = sort
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .filter_map(|key| {
            let (name, descending) = match key.strip_prefix('-') {
                Some(rest) => (rest, true),
                None => (key, false),
            };
            let field = SortField::parse(name);
            if field.is_none() {
                warn!(key = name, "ignoring unknown sort key");
            }
            field.map(|field| (field, descending))
        })
        .collect();

    if keys.is_empty() {
        return;
    }

    summaries.sort_by(|a, b| {
        keys.iter()
            .map(|(field, descending)| {
                let ordering = field.compare(a, b);
                if *descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            })
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

/// One-based pagination; pages below one are treated as the first page.
pub fn paginate(summaries: Vec<ProjectSummary>, page: usize, page_size: usize) -> DashboardPage {
    let count = summaries.len();
    let page = page.max(1);
    let start = (page - 1).saturating_mul(page_size);
    let results = summaries
        .into_iter()
        .skip(start)
        .take(page_size)
        .collect();

    DashboardPage {
        count,
        page,
        page_size,
        results,
    }
}
