use std::collections::HashSet;
use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use crate::models::{
    BudgetDetails, BudgetTotals, EarnedValueResult, ProgressDetails, ProgressReport,
    ProgressWeights, ProjectSnapshot, RollupResult, ScheduleDetails, ScheduleResult,
    StatusCounts, SupplyLine, SupplyStatus, WorkOrderSnapshot, WorkOrderStatus,
};

/// Share of an in-progress work order counted as done.
pub const IN_PROGRESS_CREDIT: Decimal = Decimal::from_parts(50, 0, 0, false, 2);

pub const DEFAULT_WEIGHTS: ProgressWeights = ProgressWeights {
    work_orders: Decimal::from_parts(50, 0, 0, false, 2),
    schedule: Decimal::from_parts(20, 0, 0, false, 2),
    earned_value: Decimal::from_parts(30, 0, 0, false, 2),
};

/// Which recorded costs make up AC in the earned value figures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ActualCostPolicy {
    /// The project's own actual cost field.
    #[default]
    ProjectRecorded,
    /// Project actual cost plus approved supply lines.
    ProjectPlusSupplies,
    /// Project actual cost plus every work order's actual cost. Double counts
    /// when the project field is itself summed from work orders.
    ProjectPlusWorkOrders,
}

impl FromStr for ActualCostPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(Self::ProjectRecorded),
            "project-plus-supplies" => Ok(Self::ProjectPlusSupplies),
            "project-plus-work-orders" => Ok(Self::ProjectPlusWorkOrders),
            other => Err(format!(
                "unknown AC policy '{other}' (expected project, project-plus-supplies or project-plus-work-orders)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalculatorConfig {
    pub in_progress_credit: Decimal,
    pub actual_cost_policy: ActualCostPolicy,
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        Self {
            in_progress_credit: IN_PROGRESS_CREDIT,
            actual_cost_policy: ActualCostPolicy::default(),
        }
    }
}

/// Missing and negative amounts count as zero.
pub fn amount_or_zero(value: Option<Decimal>) -> Decimal {
    value.unwrap_or(Decimal::ZERO).max(Decimal::ZERO)
}

pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        return Decimal::ZERO;
    }
    numerator.checked_div(denominator).unwrap_or(Decimal::ZERO)
}

pub fn clamp_unit(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO).min(Decimal::ONE)
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Negative weights count as zero. Weights too large to sum are first scaled
/// by the largest one, which keeps their total at most 3.
pub fn normalize_weights(weights: &ProgressWeights) -> ProgressWeights {
    let mut work_orders = weights.work_orders.max(Decimal::ZERO);
    let mut schedule = weights.schedule.max(Decimal::ZERO);
    let mut earned_value = weights.earned_value.max(Decimal::ZERO);

    let total = match work_orders
        .checked_add(schedule)
        .and_then(|sum| sum.checked_add(earned_value))
    {
        Some(total) => total,
        None => {
            let largest = work_orders.max(schedule).max(earned_value);
            work_orders /= largest;
            schedule /= largest;
            earned_value /= largest;
            work_orders + schedule + earned_value
        }
    };

    if total.is_zero() {
        return DEFAULT_WEIGHTS;
    }

    ProgressWeights {
        work_orders: work_orders / total,
        schedule: schedule / total,
        earned_value: earned_value / total,
    }
}

pub fn compute_rollup(
    work_orders: &[WorkOrderSnapshot],
    supplies: &[SupplyLine],
    config: &CalculatorConfig,
) -> RollupResult {
    let mut counts = StatusCounts::default();
    let mut budget = BudgetTotals::default();

    for order in work_orders {
        counts.total += 1;
        let estimated = amount_or_zero(order.estimated_budget);

        match order.status {
            WorkOrderStatus::Cancelled => {
                counts.cancelled += 1;
                continue;
            }
            WorkOrderStatus::Completed => {
                counts.completed += 1;
                budget.estimated_completed += estimated;
            }
            WorkOrderStatus::InProgress => {
                counts.in_progress += 1;
                budget.estimated_in_progress += estimated;
            }
            WorkOrderStatus::OnHold => counts.on_hold += 1,
            WorkOrderStatus::Pending => counts.pending += 1,
        }

        budget.estimated_total += estimated;
        budget.work_order_actual_cost += amount_or_zero(order.actual_cost);
    }

    let order_ids: HashSet<_> = work_orders.iter().map(|order| order.id).collect();
    budget.supply_cost_total = supplies
        .iter()
        .filter(|line| line.status == SupplyStatus::Approved)
        .filter(|line| order_ids.contains(&line.work_order_id))
        .map(|line| amount_or_zero(line.cost))
        .sum();

    budget.estimated_in_progress_credit = budget.estimated_in_progress * config.in_progress_credit;
    budget.actual_cost_total = budget.work_order_actual_cost + budget.supply_cost_total;

    let counted = counts.total - counts.cancelled;
    let completion_ratio = if counted == 0 {
        Decimal::ZERO
    } else {
        let completed_equivalent = Decimal::from(counts.completed)
            + config.in_progress_credit * Decimal::from(counts.in_progress);
        clamp_unit(safe_div(completed_equivalent, Decimal::from(counted)))
    };

    RollupResult {
        counts,
        budget,
        completion_ratio,
    }
}

/// Fraction of `[start, end]` covered by `as_of`, with the span floored at one day.
fn elapsed_fraction(start: NaiveDate, end: NaiveDate, as_of: NaiveDate) -> (Decimal, i64, i64) {
    let days_total = (end - start).num_days().max(1);
    let capped = as_of.max(start).min(end);
    let days_elapsed = (capped - start).num_days().max(0);
    let pct = clamp_unit(safe_div(
        Decimal::from(days_elapsed),
        Decimal::from(days_total),
    ));
    (pct, days_total, days_elapsed)
}

pub fn compute_schedule(project: &ProjectSnapshot, as_of: Option<NaiveDate>) -> ScheduleResult {
    let as_of = as_of.unwrap_or_else(today);
    let (planned_pct, days_planned, days_elapsed) =
        elapsed_fraction(project.planned_start, project.planned_end, as_of);

    let actual_pct = match project.actual_start {
        Some(actual_start) => {
            let actual_end = project.actual_end.unwrap_or(as_of);
            elapsed_fraction(actual_start, actual_end, as_of).0
        }
        None => Decimal::ZERO,
    };

    ScheduleResult {
        planned_pct_time_elapsed: planned_pct,
        actual_pct_time_elapsed: actual_pct,
        days_planned,
        days_elapsed_planned: days_elapsed,
    }
}

pub fn actual_cost_for(
    project: &ProjectSnapshot,
    rollup: &RollupResult,
    policy: ActualCostPolicy,
) -> Decimal {
    let recorded = amount_or_zero(project.actual_cost);
    match policy {
        ActualCostPolicy::ProjectRecorded => recorded,
        ActualCostPolicy::ProjectPlusSupplies => recorded + rollup.budget.supply_cost_total,
        ActualCostPolicy::ProjectPlusWorkOrders => recorded + rollup.budget.work_order_actual_cost,
    }
}

pub fn compute_earned_value(
    rollup: &RollupResult,
    project: &ProjectSnapshot,
    schedule: &ScheduleResult,
    config: &CalculatorConfig,
) -> EarnedValueResult {
    let ev = rollup.budget.estimated_completed + rollup.budget.estimated_in_progress_credit;
    let pv = schedule.planned_pct_time_elapsed * rollup.budget.estimated_total;
    let ac = actual_cost_for(project, rollup, config.actual_cost_policy);

    let spi = if pv > Decimal::ZERO {
        safe_div(ev, pv)
    } else {
        Decimal::ZERO
    };
    let cpi = if ac > Decimal::ZERO {
        safe_div(ev, ac)
    } else {
        Decimal::ZERO
    };

    EarnedValueResult { pv, ev, ac, spi, cpi }
}

/// EV as a share of the total estimated budget.
pub fn earned_value_progress(rollup: &RollupResult, earned: &EarnedValueResult) -> Decimal {
    if rollup.budget.estimated_total > Decimal::ZERO {
        clamp_unit(safe_div(earned.ev, rollup.budget.estimated_total))
    } else {
        Decimal::ZERO
    }
}

pub fn blend_progress(
    weights: &ProgressWeights,
    work_order_completion: Decimal,
    schedule_progress: Decimal,
    earned_value_progress: Decimal,
) -> Decimal {
    clamp_unit(
        weights.work_orders * work_order_completion
            + weights.schedule * schedule_progress
            + weights.earned_value * earned_value_progress,
    )
}

pub fn compute_project_progress(
    project: &ProjectSnapshot,
    work_orders: &[WorkOrderSnapshot],
    supplies: &[SupplyLine],
    weights: Option<&ProgressWeights>,
    as_of: Option<NaiveDate>,
    config: &CalculatorConfig,
) -> ProgressReport {
    let rollup = compute_rollup(work_orders, supplies, config);
    let schedule = compute_schedule(project, as_of);
    let earned = compute_earned_value(&rollup, project, &schedule, config);

    let ev_progress = earned_value_progress(&rollup, &earned);
    let weights = normalize_weights(weights.unwrap_or(&DEFAULT_WEIGHTS));
    let overall = blend_progress(
        &weights,
        rollup.completion_ratio,
        schedule.planned_pct_time_elapsed,
        ev_progress,
    );

    debug!(
        project_id = %project.id,
        completion = %rollup.completion_ratio,
        spi = %earned.spi,
        cpi = %earned.cpi,
        overall = %overall,
        "computed project progress"
    );

    ProgressReport {
        project_id: project.id,
        status: project.status,
        work_order_completion: rollup.completion_ratio,
        schedule_progress: schedule.planned_pct_time_elapsed,
        earned_value_progress: ev_progress,
        spi: earned.spi,
        cpi: earned.cpi,
        overall_progress: overall,
        weights,
        details: ProgressDetails {
            counts: rollup.counts,
            budget: BudgetDetails {
                total_estimated_wo: rollup.budget.estimated_total,
                earned_value: earned.ev,
                planned_value: earned.pv,
                actual_cost: earned.ac,
                supply_cost_total: rollup.budget.supply_cost_total,
            },
            schedule: ScheduleDetails {
                planned_days_total: schedule.days_planned,
                planned_days_elapsed: schedule.days_elapsed_planned,
                actual_pct_time_elapsed: schedule.actual_pct_time_elapsed,
            },
        },
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::ProjectStatus;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub(crate) fn sample_project() -> ProjectSnapshot {
        ProjectSnapshot {
            id: Uuid::new_v4(),
            name: "Riverside Clinic Renovation".to_string(),
            priority: "high".to_string(),
            status: ProjectStatus::InProgress,
            planned_start: date(2024, 1, 1),
            planned_end: date(2024, 1, 31),
            actual_start: None,
            actual_end: None,
            actual_cost: None,
        }
    }

    pub(crate) fn sample_order(
        project: &ProjectSnapshot,
        status: WorkOrderStatus,
        estimated: Option<i64>,
    ) -> WorkOrderSnapshot {
        WorkOrderSnapshot {
            id: Uuid::new_v4(),
            project_id: project.id,
            status,
            planned_end: project.planned_end,
            estimated_budget: estimated.map(Decimal::from),
            actual_cost: None,
            actual_start: None,
            actual_end: None,
        }
    }

    fn close_to(value: Decimal, expected: &str) -> bool {
        let expected: Decimal = expected.parse().unwrap();
        (value - expected).abs() < Decimal::new(1, 6)
    }

    #[test]
    fn empty_rollup_is_all_zero() {
        let rollup = compute_rollup(&[], &[], &CalculatorConfig::default());
        assert_eq!(rollup, RollupResult::default());
    }

    #[test]
    fn pending_order_has_planned_value_but_no_earned_value() {
        let project = sample_project();
        let orders = vec![sample_order(&project, WorkOrderStatus::Pending, Some(1000))];
        let config = CalculatorConfig::default();

        let rollup = compute_rollup(&orders, &[], &config);
        let schedule = compute_schedule(&project, Some(date(2024, 1, 16)));
        let earned = compute_earned_value(&rollup, &project, &schedule, &config);

        assert!(close_to(schedule.planned_pct_time_elapsed, "0.5"));
        assert_eq!(schedule.days_planned, 30);
        assert_eq!(schedule.days_elapsed_planned, 15);
        assert_eq!(rollup.completion_ratio, Decimal::ZERO);
        assert_eq!(earned.ev, Decimal::ZERO);
        assert!(close_to(earned.pv, "500"));
        assert_eq!(earned.spi, Decimal::ZERO);
    }

    #[test]
    fn in_progress_order_earns_half_credit() {
        let project = sample_project();
        let orders = vec![sample_order(&project, WorkOrderStatus::InProgress, Some(1000))];
        let config = CalculatorConfig::default();

        let rollup = compute_rollup(&orders, &[], &config);
        let schedule = compute_schedule(&project, Some(date(2024, 1, 16)));
        let earned = compute_earned_value(&rollup, &project, &schedule, &config);

        assert_eq!(rollup.completion_ratio, Decimal::new(5, 1));
        assert_eq!(earned.ev, Decimal::from(500));
        assert!(close_to(earned.spi, "1.0"));
    }

    #[test]
    fn cancelled_orders_are_excluded_from_totals() {
        let project = sample_project();
        let orders = vec![
            sample_order(&project, WorkOrderStatus::Completed, Some(600)),
            sample_order(&project, WorkOrderStatus::Cancelled, Some(400)),
        ];
        let rollup = compute_rollup(&orders, &[], &CalculatorConfig::default());

        assert_eq!(rollup.budget.estimated_total, Decimal::from(600));
        assert_eq!(rollup.budget.estimated_completed, Decimal::from(600));
        assert_eq!(rollup.completion_ratio, Decimal::ONE);
        assert_eq!(rollup.counts.total, 2);
        assert_eq!(rollup.counts.cancelled, 1);
    }

    #[test]
    fn only_cancelled_orders_give_zero_ratio() {
        let project = sample_project();
        let orders = vec![sample_order(&project, WorkOrderStatus::Cancelled, Some(400))];
        let rollup = compute_rollup(&orders, &[], &CalculatorConfig::default());
        assert_eq!(rollup.completion_ratio, Decimal::ZERO);
        assert_eq!(rollup.budget.estimated_total, Decimal::ZERO);
    }

    #[test]
    fn negative_and_missing_budgets_count_as_zero() {
        let project = sample_project();
        let orders = vec![
            sample_order(&project, WorkOrderStatus::Completed, Some(-250)),
            sample_order(&project, WorkOrderStatus::Pending, None),
        ];
        let rollup = compute_rollup(&orders, &[], &CalculatorConfig::default());
        assert_eq!(rollup.budget.estimated_total, Decimal::ZERO);
        assert!(rollup.budget.estimated_total >= rollup.budget.estimated_completed);
    }

    #[test]
    fn only_approved_supplies_are_summed() {
        let project = sample_project();
        let mut order = sample_order(&project, WorkOrderStatus::InProgress, Some(1000));
        order.actual_cost = Some(Decimal::from(300));
        let supplies = vec![
            SupplyLine {
                work_order_id: order.id,
                status: SupplyStatus::Approved,
                cost: Some(Decimal::from(120)),
            },
            SupplyLine {
                work_order_id: order.id,
                status: SupplyStatus::Pending,
                cost: Some(Decimal::from(80)),
            },
            SupplyLine {
                work_order_id: order.id,
                status: SupplyStatus::Rejected,
                cost: Some(Decimal::from(45)),
            },
            SupplyLine {
                work_order_id: Uuid::new_v4(),
                status: SupplyStatus::Approved,
                cost: Some(Decimal::from(999)),
            },
        ];

        let rollup = compute_rollup(&[order], &supplies, &CalculatorConfig::default());
        assert_eq!(rollup.budget.supply_cost_total, Decimal::from(120));
        assert_eq!(rollup.budget.actual_cost_total, Decimal::from(420));
    }

    #[test]
    fn actual_cost_policy_controls_ac() {
        let mut project = sample_project();
        project.actual_cost = Some(Decimal::from(200));
        let mut order = sample_order(&project, WorkOrderStatus::Completed, Some(1000));
        order.actual_cost = Some(Decimal::from(150));
        let supplies = vec![SupplyLine {
            work_order_id: order.id,
            status: SupplyStatus::Approved,
            cost: Some(Decimal::from(50)),
        }];
        let rollup = compute_rollup(&[order], &supplies, &CalculatorConfig::default());

        assert_eq!(
            actual_cost_for(&project, &rollup, ActualCostPolicy::ProjectRecorded),
            Decimal::from(200)
        );
        assert_eq!(
            actual_cost_for(&project, &rollup, ActualCostPolicy::ProjectPlusSupplies),
            Decimal::from(250)
        );
        assert_eq!(
            actual_cost_for(&project, &rollup, ActualCostPolicy::ProjectPlusWorkOrders),
            Decimal::from(350)
        );
    }

    #[test]
    fn zero_rollup_earned_value_is_all_zero() {
        let project = sample_project();
        let rollup = compute_rollup(&[], &[], &CalculatorConfig::default());
        let schedule = compute_schedule(&project, Some(date(2024, 1, 20)));
        let earned =
            compute_earned_value(&rollup, &project, &schedule, &CalculatorConfig::default());
        assert_eq!(earned, EarnedValueResult::default());
    }

    #[test]
    fn schedule_clamps_as_of_into_planned_window() {
        let project = sample_project();
        let before = compute_schedule(&project, Some(date(2023, 12, 1)));
        let after = compute_schedule(&project, Some(date(2024, 3, 1)));
        assert_eq!(before.planned_pct_time_elapsed, Decimal::ZERO);
        assert_eq!(before.days_elapsed_planned, 0);
        assert_eq!(after.planned_pct_time_elapsed, Decimal::ONE);
        assert_eq!(after.actual_pct_time_elapsed, Decimal::ZERO);
    }

    #[test]
    fn actual_progress_uses_actual_dates() {
        let mut project = sample_project();
        project.actual_start = Some(date(2024, 1, 5));
        project.actual_end = Some(date(2024, 1, 25));
        let schedule = compute_schedule(&project, Some(date(2024, 1, 15)));
        assert_eq!(schedule.actual_pct_time_elapsed, Decimal::new(5, 1));
    }

    #[test]
    fn zero_length_window_is_floored_to_one_day() {
        let mut project = sample_project();
        project.planned_end = project.planned_start;
        let schedule = compute_schedule(&project, Some(date(2024, 1, 10)));
        assert_eq!(schedule.days_planned, 1);
        assert_eq!(schedule.planned_pct_time_elapsed, Decimal::ZERO);
    }

    #[test]
    fn weights_normalize_to_one() {
        let weights = normalize_weights(&ProgressWeights {
            work_orders: Decimal::from(2),
            schedule: Decimal::from(1),
            earned_value: Decimal::from(1),
        });
        assert_eq!(weights.work_orders, Decimal::new(5, 1));
        assert_eq!(weights.schedule, Decimal::new(25, 2));
        let total = weights.work_orders + weights.schedule + weights.earned_value;
        assert!(close_to(total, "1"));

        let thirds = normalize_weights(&ProgressWeights {
            work_orders: Decimal::ONE,
            schedule: Decimal::ONE,
            earned_value: Decimal::ONE,
        });
        let total = thirds.work_orders + thirds.schedule + thirds.earned_value;
        assert!(close_to(total, "1"));
    }

    #[test]
    fn zero_weights_fall_back_to_defaults() {
        let zero = ProgressWeights {
            work_orders: Decimal::ZERO,
            schedule: Decimal::ZERO,
            earned_value: Decimal::ZERO,
        };
        assert_eq!(normalize_weights(&zero), DEFAULT_WEIGHTS);

        let negative = ProgressWeights {
            work_orders: Decimal::from(-3),
            schedule: Decimal::ZERO,
            earned_value: Decimal::ZERO,
        };
        assert_eq!(normalize_weights(&negative), DEFAULT_WEIGHTS);
    }

    #[test]
    fn huge_weights_normalize_without_overflow() {
        let huge = ProgressWeights {
            work_orders: Decimal::MAX,
            schedule: Decimal::MAX,
            earned_value: Decimal::ZERO,
        };
        let normalized = normalize_weights(&huge);
        assert_eq!(normalized.work_orders, Decimal::new(5, 1));
        assert_eq!(normalized.schedule, Decimal::new(5, 1));
        assert_eq!(normalized.earned_value, Decimal::ZERO);
    }

    #[test]
    fn project_progress_blends_components() {
        let project = sample_project();
        let orders = vec![
            sample_order(&project, WorkOrderStatus::Completed, Some(500)),
            sample_order(&project, WorkOrderStatus::Pending, Some(500)),
        ];
        let report = compute_project_progress(
            &project,
            &orders,
            &[],
            None,
            Some(date(2024, 1, 16)),
            &CalculatorConfig::default(),
        );

        // 0.5 * 0.5 + 0.2 * 0.5 + 0.3 * 0.5
        assert!(close_to(report.overall_progress, "0.5"));
        assert_eq!(report.earned_value_progress, Decimal::new(5, 1));
        assert_eq!(report.details.counts.completed, 1);
        assert_eq!(report.weights, DEFAULT_WEIGHTS);
    }

    #[test]
    fn report_weights_serialize_in_camel_case() {
        let project = sample_project();
        let report = compute_project_progress(
            &project,
            &[],
            &[],
            None,
            Some(date(2024, 1, 16)),
            &CalculatorConfig::default(),
        );

        let json = serde_json::to_value(&report).unwrap();
        let weights = &json["weights"];
        assert_eq!(weights["workOrders"], serde_json::json!(0.5));
        assert_eq!(weights["schedule"], serde_json::json!(0.2));
        assert_eq!(weights["earnedValue"], serde_json::json!(0.3));
        assert!(weights.get("work_orders").is_none());
    }

    #[test]
    fn custom_in_progress_credit_is_applied_once() {
        let project = sample_project();
        let orders = vec![sample_order(&project, WorkOrderStatus::InProgress, Some(1000))];
        let config = CalculatorConfig {
            in_progress_credit: Decimal::new(25, 2),
            ..CalculatorConfig::default()
        };
        let rollup = compute_rollup(&orders, &[], &config);
        let schedule = compute_schedule(&project, Some(date(2024, 1, 16)));
        let earned = compute_earned_value(&rollup, &project, &schedule, &config);
        assert_eq!(earned.ev, Decimal::from(250));
        assert_eq!(rollup.completion_ratio, Decimal::new(25, 2));
    }

    #[test]
    fn parses_actual_cost_policy() {
        assert_eq!(
            "project-plus-supplies".parse::<ActualCostPolicy>(),
            Ok(ActualCostPolicy::ProjectPlusSupplies)
        );
        assert!("everything".parse::<ActualCostPolicy>().is_err());
    }
}
