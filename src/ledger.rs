//! In-memory mutations of a project's plot collection.
//!
//! Every function here either applies its whole effect to the project or
//! returns an error with the project untouched. Derived counters are
//! recomputed by a full rescan after each plot-changing operation.

use crate::{
    Error, Result,
    models::{Payment, Plot, PlotCounters, PlotStatus, Project},
};
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InsertOutcome {
    pub project_id: Uuid,
    pub plot: Plot,
    pub counters: PlotCounters,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReplaceOutcome {
    pub plot: Plot,
    pub counters: PlotCounters,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BulkInsertOutcome {
    pub added_count: usize,
    pub total_plots: u32,
}

/// Tally plots by status in a single pass.
pub fn recompute_counters(plots: &[Plot]) -> PlotCounters {
    plots
        .iter()
        .fold(PlotCounters::default(), |mut acc, plot| {
            match plot.status {
                PlotStatus::Available => acc.available += 1,
                PlotStatus::Sold => acc.sold += 1,
                PlotStatus::Reserved => acc.reserved += 1,
            }
            acc
        })
}

fn refresh_counters(project: &mut Project) -> PlotCounters {
    let counters = recompute_counters(&project.plots);
    project.set_counters(counters);
    counters
}

fn position(project: &Project, plot_number: &str) -> Result<usize> {
    project
        .plots
        .iter()
        .position(|p| p.plot_number == plot_number)
        .ok_or_else(|| Error::PlotNotFound(plot_number.to_string()))
}

/// Append a plot. `total_plots` is left alone.
pub fn insert(project: &mut Project, plot: Plot) -> Result<InsertOutcome> {
    if project.plot(&plot.plot_number).is_some() {
        return Err(Error::DuplicateKey(plot.plot_number));
    }
    project.plots.push(plot.clone());
    let counters = refresh_counters(project);
    Ok(InsertOutcome {
        project_id: project.id,
        plot,
        counters,
    })
}

/// Overwrite the whole record stored under `plot_number`, buyer and payment
/// history included. Nothing from the old record is merged.
pub fn replace(project: &mut Project, plot_number: &str, plot: Plot) -> Result<ReplaceOutcome> {
    let idx = position(project, plot_number)?;
    project.plots[idx] = plot.clone();
    let counters = refresh_counters(project);
    Ok(ReplaceOutcome { plot, counters })
}

/// Append a batch of plots, all or nothing.
///
/// Duplicates inside the batch are reported before collisions with stored
/// plots. Offending numbers are listed once each, in batch order.
pub fn bulk_insert(project: &mut Project, plots: Vec<Plot>) -> Result<BulkInsertOutcome> {
    let mut seen = HashSet::with_capacity(plots.len());
    let mut repeated = Vec::new();
    for plot in &plots {
        let number = plot.plot_number.as_str();
        if !seen.insert(number) && !repeated.iter().any(|r| r == number) {
            repeated.push(number.to_string());
        }
    }
    if !repeated.is_empty() {
        return Err(Error::DuplicateInBatch(repeated));
    }

    let existing: HashSet<&str> = project
        .plots
        .iter()
        .map(|p| p.plot_number.as_str())
        .collect();
    let colliding: Vec<String> = plots
        .iter()
        .filter(|p| existing.contains(p.plot_number.as_str()))
        .map(|p| p.plot_number.clone())
        .collect();
    if !colliding.is_empty() {
        return Err(Error::DuplicateWithExisting(colliding));
    }

    let added_count = plots.len();
    let total_plots = plot_count(project.plots.len() + added_count)?;
    project.plots.extend(plots);
    project.total_plots = total_plots;
    refresh_counters(project);
    Ok(BulkInsertOutcome {
        added_count,
        total_plots: project.total_plots,
    })
}

fn plot_count(len: usize) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| Error::Validation(format!("plots: {len} plots exceed the per-project limit")))
}

/// Append a payment to a plot. Plot status and project counters are not
/// touched; status moves only through [`replace`].
pub fn append_payment(project: &mut Project, plot_number: &str, payment: Payment) -> Result<Payment> {
    let idx = position(project, plot_number)?;
    project.plots[idx].payments.push(payment.clone());
    Ok(payment)
}

/// Plots in stored order, optionally restricted to one status.
pub fn plots_with_status(project: &Project, status: Option<PlotStatus>) -> Vec<Plot> {
    project
        .plots
        .iter()
        .filter(|p| status.is_none_or(|s| p.status == s))
        .cloned()
        .collect()
}
