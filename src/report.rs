use std::fmt::Write;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::models::{ProjectMetrics, ProjectSnapshot};
use crate::progress::ActualCostPolicy;

fn percent(ratio: Decimal) -> Decimal {
    ratio * Decimal::ONE_HUNDRED
}

fn money(amount: Decimal) -> Decimal {
    amount.round_dp(2)
}

fn or_dash<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

pub fn build_report(
    project: &ProjectSnapshot,
    as_of: NaiveDate,
    metrics: &ProjectMetrics,
    policy: ActualCostPolicy,
) -> String {
    let progress = &metrics.progress;
    let counts = &progress.details.counts;
    let budget = &progress.details.budget;

    let mut output = String::new();

    let _ = writeln!(output, "# Project Progress Report: {}", project.name);
    let _ = writeln!(
        output,
        "Status {} (priority {}), planned {} to {}, as of {}",
        project.status, project.priority, project.planned_start, project.planned_end, as_of
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Progress");
    let _ = writeln!(
        output,
        "- Overall: {:.1}%",
        percent(progress.overall_progress)
    );
    let _ = writeln!(
        output,
        "- Work orders: {:.1}% ({} completed, {} in progress of {} total, {} cancelled)",
        percent(progress.work_order_completion),
        counts.completed,
        counts.in_progress,
        counts.total,
        counts.cancelled
    );
    let _ = writeln!(
        output,
        "- Schedule: {:.1}% of planned time elapsed ({} of {} days)",
        percent(progress.schedule_progress),
        progress.details.schedule.planned_days_elapsed,
        progress.details.schedule.planned_days_total
    );
    let _ = writeln!(
        output,
        "- Earned value: {:.1}% of budget earned",
        percent(progress.earned_value_progress)
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Earned Value");
    let _ = writeln!(
        output,
        "- PV {:.2} / EV {:.2} / AC {:.2}",
        money(budget.planned_value),
        money(budget.earned_value),
        money(budget.actual_cost)
    );
    let _ = writeln!(
        output,
        "- SPI {:.2}, CPI {:.2}",
        progress.spi.round_dp(2),
        progress.cpi.round_dp(2)
    );
    if budget.supply_cost_total > Decimal::ZERO {
        let counted = match policy {
            ActualCostPolicy::ProjectPlusSupplies => "included in AC",
            _ => "not included in AC",
        };
        let _ = writeln!(
            output,
            "- Approved supplies {:.2} ({counted})",
            money(budget.supply_cost_total)
        );
    }

    let cost = &metrics.cost_variance;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Cost");
    let _ = writeln!(
        output,
        "- Budget at completion {:.2}, remaining {:.2}",
        money(cost.budget_at_completion),
        money(cost.remaining_budget)
    );
    let _ = writeln!(output, "- Cost variance {:.2}", money(cost.cost_variance));
    let _ = writeln!(
        output,
        "- EAC {}, TCPI {}",
        or_dash(cost.estimate_at_completion.map(money)),
        or_dash(cost.to_complete_performance_index.map(|v| v.round_dp(2)))
    );

    let schedule = &metrics.schedule_variance;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Schedule");
    let _ = writeln!(
        output,
        "- Planned duration {} days, actual {}",
        schedule.planned_duration,
        or_dash(schedule.actual_duration)
    );
    let _ = writeln!(
        output,
        "- Variance {} days, forecast finish {}",
        or_dash(schedule.schedule_variance),
        or_dash(schedule.forecast_end_date)
    );

    let workforce = &metrics.workforce;
    let quality = &metrics.quality;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Team & Quality");
    let _ = writeln!(
        output,
        "- Team of {} with {} active work orders ({:.2} per worker)",
        workforce.team_size,
        workforce.active_work_orders,
        workforce.active_work_orders_per_worker.round_dp(2)
    );
    let _ = writeln!(
        output,
        "- Average completed work order: {} days",
        or_dash(workforce.average_work_order_duration_days.map(|d| d.round_dp(1)))
    );
    let _ = writeln!(
        output,
        "- {} overdue, {} over budget, risk index {:.1}",
        quality.overdue_orders,
        quality.cost_overruns,
        quality.risk_index.round_dp(1)
    );

    let health = &metrics.health;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Health");
    let _ = writeln!(output, "- Score {:.1} / 100", health.health_score.round_dp(1));
    let _ = writeln!(
        output,
        "- Schedule {:.1}, cost {:.1}, completion {:.1}, risk {:.1}",
        health.components.schedule_health.round_dp(1),
        health.components.cost_health.round_dp(1),
        health.components.completion_health.round_dp(1),
        health.components.risk_score.round_dp(1)
    );

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{compute_project_metrics, MetricsInput};
    use crate::models::{SupplyLine, SupplyStatus, WorkOrderStatus};
    use crate::progress::tests::{date, sample_order, sample_project};
    use crate::progress::CalculatorConfig;

    #[test]
    fn report_lists_every_section() {
        let mut project = sample_project();
        project.actual_cost = Some(Decimal::from(450));
        let orders = vec![
            sample_order(&project, WorkOrderStatus::Completed, Some(500)),
            sample_order(&project, WorkOrderStatus::Pending, Some(500)),
        ];
        let as_of = date(2024, 1, 16);
        let metrics = compute_project_metrics(
            &MetricsInput {
                project: &project,
                work_orders: &orders,
                supplies: &[],
                team: &[],
            },
            None,
            Some(as_of),
            &CalculatorConfig::default(),
        )
        .unwrap();

        let report = build_report(&project, as_of, &metrics, ActualCostPolicy::ProjectRecorded);
        assert!(report.starts_with("# Project Progress Report: Riverside Clinic Renovation"));
        for heading in ["## Progress", "## Earned Value", "## Cost", "## Schedule", "## Health"] {
            assert!(report.contains(heading), "missing {heading}");
        }
        assert!(report.contains("- Overall: 50.0%"));
        assert!(report.contains("1 completed, 0 in progress of 2 total"));
        assert!(report.contains("actual -"));
        assert!(!report.contains("Approved supplies"));
    }

    #[test]
    fn supply_note_follows_actual_cost_policy() {
        let project = sample_project();
        let order = sample_order(&project, WorkOrderStatus::Completed, Some(1000));
        let supplies = [SupplyLine {
            work_order_id: order.id,
            status: SupplyStatus::Approved,
            cost: Some(Decimal::from(500)),
        }];
        let orders = [order];
        let as_of = date(2024, 1, 16);
        let render = |policy: ActualCostPolicy| {
            let config = CalculatorConfig {
                actual_cost_policy: policy,
                ..CalculatorConfig::default()
            };
            let metrics = compute_project_metrics(
                &MetricsInput {
                    project: &project,
                    work_orders: &orders,
                    supplies: &supplies,
                    team: &[],
                },
                None,
                Some(as_of),
                &config,
            )
            .unwrap();
            build_report(&project, as_of, &metrics, policy)
        };

        let included = render(ActualCostPolicy::ProjectPlusSupplies);
        assert!(included.contains("- Approved supplies 500.00 (included in AC)"));
        assert!(included.contains("AC 500.00"));

        let excluded = render(ActualCostPolicy::ProjectRecorded);
        assert!(excluded.contains("- Approved supplies 500.00 (not included in AC)"));
        assert!(excluded.contains("AC 0.00"));
    }
}
