use std::collections::HashSet;

use chrono::{Days, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::MetricsError;
use crate::models::{
    CostVarianceResult, HealthComponents, HealthMetrics, HealthResult, ProgressReport,
    ProgressWeights, ProjectMetrics, ProjectSnapshot, QualityResult, ScheduleVarianceResult,
    StatusCounts, SupplyLine, TeamMember, WorkOrderSnapshot, WorkOrderStatus, WorkforceResult,
};
use crate::progress::{
    self, actual_cost_for, amount_or_zero, clamp_unit, safe_div, CalculatorConfig,
};

const SCHEDULE_HEALTH_WEIGHT: Decimal = Decimal::from_parts(35, 0, 0, false, 2);
const COST_HEALTH_WEIGHT: Decimal = Decimal::from_parts(35, 0, 0, false, 2);
const COMPLETION_HEALTH_WEIGHT: Decimal = Decimal::from_parts(20, 0, 0, false, 2);
const RISK_HEALTH_WEIGHT: Decimal = Decimal::from_parts(10, 0, 0, false, 2);

/// Performance indices at or above this count as fully healthy.
const INDEX_CEILING: Decimal = Decimal::TWO;

fn spi_for(
    project: &ProjectSnapshot,
    work_orders: &[WorkOrderSnapshot],
    as_of: Option<NaiveDate>,
    config: &CalculatorConfig,
) -> Decimal {
    let rollup = progress::compute_rollup(work_orders, &[], config);
    let schedule = progress::compute_schedule(project, as_of);
    progress::compute_earned_value(&rollup, project, &schedule, config).spi
}

/// Start date pushed out by `planned_duration / spi` whole days.
fn forecast_end(project: &ProjectSnapshot, planned_duration: i64, spi: Decimal) -> Option<NaiveDate> {
    if spi <= Decimal::ZERO || planned_duration <= 0 {
        return None;
    }
    let days = safe_div(Decimal::from(planned_duration), spi).trunc().to_u64()?;
    project.planned_start.checked_add_days(Days::new(days))
}

pub fn compute_schedule_variance(
    project: &ProjectSnapshot,
    work_orders: &[WorkOrderSnapshot],
    as_of: Option<NaiveDate>,
    spi: Option<Decimal>,
    config: &CalculatorConfig,
) -> ScheduleVarianceResult {
    let today = as_of.unwrap_or_else(progress::today);
    let planned_duration = (project.planned_end - project.planned_start).num_days();

    let actual_duration = project
        .actual_start
        .map(|start| (project.actual_end.unwrap_or(today) - start).num_days());
    let schedule_variance = actual_duration.map(|actual| planned_duration - actual);

    let spi = spi.unwrap_or_else(|| spi_for(project, work_orders, as_of, config));

    ScheduleVarianceResult {
        planned_duration,
        actual_duration,
        schedule_variance,
        forecast_end_date: forecast_end(project, planned_duration, spi),
        spi,
    }
}

pub fn compute_cost_variance(
    project: &ProjectSnapshot,
    work_orders: &[WorkOrderSnapshot],
    supplies: &[SupplyLine],
    config: &CalculatorConfig,
) -> CostVarianceResult {
    let rollup = progress::compute_rollup(work_orders, supplies, config);
    let bac = rollup.budget.estimated_total;
    let ev = rollup.budget.estimated_completed + rollup.budget.estimated_in_progress_credit;
    let ac = actual_cost_for(project, &rollup, config.actual_cost_policy);

    let cpi = if ac > Decimal::ZERO {
        safe_div(ev, ac)
    } else {
        Decimal::ZERO
    };
    let estimate_at_completion = (cpi > Decimal::ZERO).then(|| safe_div(bac, cpi));
    let to_complete_performance_index =
        (bac - ac > Decimal::ZERO).then(|| safe_div(bac - ev, bac - ac));

    CostVarianceResult {
        cost_variance: ev - ac,
        earned_value: ev,
        actual_cost: ac,
        cpi,
        estimate_at_completion,
        to_complete_performance_index,
        remaining_budget: (bac - ac).max(Decimal::ZERO),
        budget_at_completion: bac,
    }
}

pub fn compute_workforce_metrics(
    project_id: Uuid,
    team: &[TeamMember],
    work_orders: &[WorkOrderSnapshot],
) -> WorkforceResult {
    let team_size = team
        .iter()
        .filter(|member| member.project_id == project_id && member.is_active)
        .map(|member| member.user_id)
        .collect::<HashSet<_>>()
        .len();

    let mut distribution = StatusCounts::default();
    let mut active = 0usize;
    let mut durations = Vec::new();

    for order in work_orders.iter().filter(|order| order.project_id == project_id) {
        distribution.total += 1;
        match order.status {
            WorkOrderStatus::Pending => distribution.pending += 1,
            WorkOrderStatus::InProgress => distribution.in_progress += 1,
            WorkOrderStatus::OnHold => distribution.on_hold += 1,
            WorkOrderStatus::Completed => distribution.completed += 1,
            WorkOrderStatus::Cancelled => distribution.cancelled += 1,
        }
        if order.status.is_active() {
            active += 1;
        }
        if order.status == WorkOrderStatus::Completed {
            if let (Some(start), Some(end)) = (order.actual_start, order.actual_end) {
                durations.push((end - start).num_days());
            }
        }
    }

    let active_work_orders_per_worker = if team_size > 0 {
        safe_div(Decimal::from(active), Decimal::from(team_size))
    } else {
        Decimal::ZERO
    };

    let average_work_order_duration_days = if durations.is_empty() {
        None
    } else {
        let total: i64 = durations.iter().sum();
        Some(safe_div(Decimal::from(total), Decimal::from(durations.len())))
    };

    WorkforceResult {
        team_size,
        active_work_orders_per_worker,
        average_work_order_duration_days,
        total_work_orders: distribution.total,
        status_distribution: distribution,
        active_work_orders: active,
    }
}

pub fn compute_quality_metrics(
    work_orders: &[WorkOrderSnapshot],
    as_of: Option<NaiveDate>,
) -> QualityResult {
    let today = as_of.unwrap_or_else(progress::today);

    let overdue_orders = work_orders
        .iter()
        .filter(|order| order.status != WorkOrderStatus::Completed && order.planned_end < today)
        .count();
    let open = work_orders
        .iter()
        .filter(|order| {
            !matches!(
                order.status,
                WorkOrderStatus::Completed | WorkOrderStatus::Cancelled
            )
        })
        .count();

    let cost_overruns = work_orders
        .iter()
        .filter(|order| match (order.actual_cost, order.estimated_budget) {
            (Some(actual), Some(estimated)) if estimated > Decimal::ZERO => {
                amount_or_zero(Some(actual)) > estimated
            }
            _ => false,
        })
        .count();

    // Overdue cancelled orders can push the count past the open denominator.
    let overdue_ratio = clamp_unit(safe_div(Decimal::from(overdue_orders), Decimal::from(open)));
    let overrun_ratio = safe_div(
        Decimal::from(cost_overruns),
        Decimal::from(work_orders.len()),
    );
    let half = Decimal::new(5, 1);
    let risk_index = (overdue_ratio * half + overrun_ratio * half) * Decimal::ONE_HUNDRED;

    QualityResult {
        rework_rate: Decimal::ZERO,
        overdue_orders,
        cost_overruns,
        risk_index,
        total_completed: work_orders
            .iter()
            .filter(|order| order.status == WorkOrderStatus::Completed)
            .count(),
    }
}

fn index_health(index: Decimal) -> Decimal {
    index.max(Decimal::ZERO).min(INDEX_CEILING) / INDEX_CEILING
}

/// Weighted 0-100 score. Every input is clamped, so the result stays in range.
pub fn blend_health(
    spi: Decimal,
    cpi: Decimal,
    completion: Decimal,
    risk_index: Decimal,
) -> (Decimal, HealthComponents) {
    let schedule_health = index_health(spi);
    let cost_health = index_health(cpi);
    let completion_health = clamp_unit(completion);
    let risk = risk_index.max(Decimal::ZERO).min(Decimal::ONE_HUNDRED);
    let risk_penalty = Decimal::ONE - risk / Decimal::ONE_HUNDRED;

    let score = (schedule_health * SCHEDULE_HEALTH_WEIGHT
        + cost_health * COST_HEALTH_WEIGHT
        + completion_health * COMPLETION_HEALTH_WEIGHT
        + risk_penalty * RISK_HEALTH_WEIGHT)
        * Decimal::ONE_HUNDRED;

    let components = HealthComponents {
        schedule_health: schedule_health * Decimal::ONE_HUNDRED,
        cost_health: cost_health * Decimal::ONE_HUNDRED,
        completion_health: completion_health * Decimal::ONE_HUNDRED,
        risk_score: risk,
    };
    (score, components)
}

/// Fails when the combined amounts of the snapshot do not fit in a `Decimal`.
/// Every sum the formulas build is bounded by this total.
pub fn ensure_amounts_fit(
    project: &ProjectSnapshot,
    work_orders: &[WorkOrderSnapshot],
    supplies: &[SupplyLine],
) -> Result<(), MetricsError> {
    let amounts = work_orders
        .iter()
        .flat_map(|order| [order.estimated_budget, order.actual_cost])
        .chain(supplies.iter().map(|line| line.cost))
        .chain(std::iter::once(project.actual_cost))
        .map(amount_or_zero);

    let mut total = Decimal::ZERO;
    for amount in amounts {
        total = total
            .checked_add(amount)
            .ok_or(MetricsError::Overflow { project_id: project.id })?;
    }
    Ok(())
}

pub fn compute_health_score(
    project: &ProjectSnapshot,
    work_orders: &[WorkOrderSnapshot],
    supplies: &[SupplyLine],
    progress: Option<&ProgressReport>,
    as_of: Option<NaiveDate>,
    config: &CalculatorConfig,
) -> Result<HealthResult, MetricsError> {
    if project.planned_end <= project.planned_start {
        return Err(MetricsError::InvalidSchedule {
            project_id: project.id,
            start: project.planned_start,
            end: project.planned_end,
        });
    }
    ensure_amounts_fit(project, work_orders, supplies)?;

    let computed;
    let progress = match progress {
        Some(report) if report.project_id != project.id => {
            return Err(MetricsError::ProgressMismatch {
                expected: project.id,
                found: report.project_id,
            });
        }
        Some(report) => report,
        None => {
            computed = progress::compute_project_progress(
                project,
                work_orders,
                supplies,
                None,
                as_of,
                config,
            );
            &computed
        }
    };

    let variance =
        compute_schedule_variance(project, work_orders, as_of, Some(progress.spi), config);
    let quality = compute_quality_metrics(work_orders, as_of);
    let (health_score, components) = blend_health(
        progress.spi,
        progress.cpi,
        progress.work_order_completion,
        quality.risk_index,
    );

    debug!(project_id = %project.id, health = %health_score, "computed project health");

    Ok(HealthResult {
        health_score,
        components,
        metrics: HealthMetrics {
            spi: progress.spi,
            cpi: progress.cpi,
            schedule_variance: variance.schedule_variance,
            forecast_end_date: variance.forecast_end_date,
        },
    })
}

/// Score used when health cannot be derived: zero health, maximum risk.
pub fn fallback_health() -> HealthResult {
    HealthResult {
        health_score: Decimal::ZERO,
        components: HealthComponents {
            schedule_health: Decimal::ZERO,
            cost_health: Decimal::ZERO,
            completion_health: Decimal::ZERO,
            risk_score: Decimal::ONE_HUNDRED,
        },
        metrics: HealthMetrics {
            spi: Decimal::ZERO,
            cpi: Decimal::ZERO,
            schedule_variance: None,
            forecast_end_date: None,
        },
    }
}

pub fn health_score_or_fallback(
    project: &ProjectSnapshot,
    work_orders: &[WorkOrderSnapshot],
    supplies: &[SupplyLine],
    progress: Option<&ProgressReport>,
    as_of: Option<NaiveDate>,
    config: &CalculatorConfig,
) -> HealthResult {
    compute_health_score(project, work_orders, supplies, progress, as_of, config).unwrap_or_else(
        |err| {
            warn!(project_id = %project.id, error = %err, "health score unavailable, using fallback");
            fallback_health()
        },
    )
}

pub struct MetricsInput<'a> {
    pub project: &'a ProjectSnapshot,
    pub work_orders: &'a [WorkOrderSnapshot],
    pub supplies: &'a [SupplyLine],
    pub team: &'a [TeamMember],
}

pub fn compute_project_metrics(
    input: &MetricsInput<'_>,
    weights: Option<&ProgressWeights>,
    as_of: Option<NaiveDate>,
    config: &CalculatorConfig,
) -> Result<ProjectMetrics, MetricsError> {
    ensure_amounts_fit(input.project, input.work_orders, input.supplies)?;

    let progress = progress::compute_project_progress(
        input.project,
        input.work_orders,
        input.supplies,
        weights,
        as_of,
        config,
    );
    let schedule_variance = compute_schedule_variance(
        input.project,
        input.work_orders,
        as_of,
        Some(progress.spi),
        config,
    );
    let cost_variance =
        compute_cost_variance(input.project, input.work_orders, input.supplies, config);
    let workforce = compute_workforce_metrics(input.project.id, input.team, input.work_orders);
    let quality = compute_quality_metrics(input.work_orders, as_of);
    let health = health_score_or_fallback(
        input.project,
        input.work_orders,
        input.supplies,
        Some(&progress),
        as_of,
        config,
    );

    Ok(ProjectMetrics {
        progress,
        schedule_variance,
        cost_variance,
        workforce,
        quality,
        health,
    })
}
