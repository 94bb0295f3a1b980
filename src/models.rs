use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} status: {value}")]
pub struct ParseStatusError {
    kind: &'static str,
    value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Planning,
    InProgress,
    OnHold,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::InProgress => "in_progress",
            Self::OnHold => "on_hold",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for ProjectStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "planning" => Ok(Self::Planning),
            "in_progress" => Ok(Self::InProgress),
            "on_hold" => Ok(Self::OnHold),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ParseStatusError {
                kind: "project",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOrderStatus {
    Pending,
    InProgress,
    OnHold,
    Completed,
    Cancelled,
}

impl WorkOrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::OnHold => "on_hold",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Pending or in-progress orders still waiting on a worker.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

impl FromStr for WorkOrderStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "on_hold" => Ok(Self::OnHold),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ParseStatusError {
                kind: "work order",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplyStatus {
    Pending,
    Approved,
    Rejected,
}

impl FromStr for SupplyStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(ParseStatusError {
                kind: "supply",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProjectSnapshot {
    pub id: Uuid,
    pub name: String,
    pub priority: String,
    pub status: ProjectStatus,
    pub planned_start: NaiveDate,
    pub planned_end: NaiveDate,
    pub actual_start: Option<NaiveDate>,
    pub actual_end: Option<NaiveDate>,
    pub actual_cost: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct WorkOrderSnapshot {
    pub id: Uuid,
    pub project_id: Uuid,
    pub status: WorkOrderStatus,
    pub planned_end: NaiveDate,
    pub estimated_budget: Option<Decimal>,
    pub actual_cost: Option<Decimal>,
    pub actual_start: Option<NaiveDate>,
    pub actual_end: Option<NaiveDate>,
}

/// One supply line requested against a work order.
#[derive(Debug, Clone)]
pub struct SupplyLine {
    pub work_order_id: Uuid,
    pub status: SupplyStatus,
    pub cost: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct TeamMember {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressWeights {
    #[serde(with = "rust_decimal::serde::float")]
    pub work_orders: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub schedule: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub earned_value: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub on_hold: usize,
    pub pending: usize,
    pub cancelled: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BudgetTotals {
    /// Estimated budget of every non-cancelled work order (BAC).
    pub estimated_total: Decimal,
    pub estimated_completed: Decimal,
    pub estimated_in_progress: Decimal,
    /// `estimated_in_progress` already multiplied by the in-progress credit.
    pub estimated_in_progress_credit: Decimal,
    pub work_order_actual_cost: Decimal,
    /// Approved supply lines only.
    pub supply_cost_total: Decimal,
    pub actual_cost_total: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollupResult {
    pub counts: StatusCounts,
    pub budget: BudgetTotals,
    pub completion_ratio: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleResult {
    pub planned_pct_time_elapsed: Decimal,
    pub actual_pct_time_elapsed: Decimal,
    pub days_planned: i64,
    pub days_elapsed_planned: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EarnedValueResult {
    pub pv: Decimal,
    pub ev: Decimal,
    pub ac: Decimal,
    pub spi: Decimal,
    pub cpi: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetDetails {
    #[serde(rename = "totalEstimatedWO", with = "rust_decimal::serde::str")]
    pub total_estimated_wo: Decimal,
    #[serde(rename = "earnedValueEV", with = "rust_decimal::serde::str")]
    pub earned_value: Decimal,
    #[serde(rename = "plannedValuePV", with = "rust_decimal::serde::str")]
    pub planned_value: Decimal,
    #[serde(rename = "actualCostAC", with = "rust_decimal::serde::str")]
    pub actual_cost: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub supply_cost_total: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDetails {
    pub planned_days_total: i64,
    pub planned_days_elapsed: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub actual_pct_time_elapsed: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressDetails {
    pub counts: StatusCounts,
    pub budget: BudgetDetails,
    pub schedule: ScheduleDetails,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub project_id: Uuid,
    pub status: ProjectStatus,
    #[serde(with = "rust_decimal::serde::float")]
    pub work_order_completion: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub schedule_progress: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub earned_value_progress: Decimal,
    #[serde(rename = "SPI", with = "rust_decimal::serde::float")]
    pub spi: Decimal,
    #[serde(rename = "CPI", with = "rust_decimal::serde::float")]
    pub cpi: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub overall_progress: Decimal,
    pub weights: ProgressWeights,
    pub details: ProgressDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleVarianceResult {
    pub planned_duration: i64,
    pub actual_duration: Option<i64>,
    /// Positive when the project ran shorter than planned.
    pub schedule_variance: Option<i64>,
    pub forecast_end_date: Option<NaiveDate>,
    #[serde(rename = "SPI", with = "rust_decimal::serde::float")]
    pub spi: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostVarianceResult {
    #[serde(with = "rust_decimal::serde::float")]
    pub cost_variance: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub earned_value: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub actual_cost: Decimal,
    #[serde(rename = "CPI", with = "rust_decimal::serde::float")]
    pub cpi: Decimal,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub estimate_at_completion: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub to_complete_performance_index: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float")]
    pub remaining_budget: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub budget_at_completion: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkforceResult {
    pub team_size: usize,
    #[serde(with = "rust_decimal::serde::float")]
    pub active_work_orders_per_worker: Decimal,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub average_work_order_duration_days: Option<Decimal>,
    pub status_distribution: StatusCounts,
    pub total_work_orders: usize,
    pub active_work_orders: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityResult {
    /// Always zero until status history is tracked per work order.
    #[serde(with = "rust_decimal::serde::float")]
    pub rework_rate: Decimal,
    pub overdue_orders: usize,
    pub cost_overruns: usize,
    #[serde(with = "rust_decimal::serde::float")]
    pub risk_index: Decimal,
    pub total_completed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthComponents {
    #[serde(with = "rust_decimal::serde::float")]
    pub schedule_health: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub cost_health: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub completion_health: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub risk_score: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthMetrics {
    #[serde(rename = "SPI", with = "rust_decimal::serde::float")]
    pub spi: Decimal,
    #[serde(rename = "CPI", with = "rust_decimal::serde::float")]
    pub cpi: Decimal,
    pub schedule_variance: Option<i64>,
    pub forecast_end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResult {
    #[serde(with = "rust_decimal::serde::float")]
    pub health_score: Decimal,
    pub components: HealthComponents,
    pub metrics: HealthMetrics,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetrics {
    pub progress: ProgressReport,
    pub schedule_variance: ScheduleVarianceResult,
    pub cost_variance: CostVarianceResult,
    pub workforce: WorkforceResult,
    pub quality: QualityResult,
    pub health: HealthResult,
}
