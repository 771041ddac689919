use crate::{
    Error, Result,
    context::RequestContext,
    ledger::{self, BulkInsertOutcome, InsertOutcome, ReplaceOutcome},
    metrics,
    models::{NewProject, Payment, Plot, PlotStatus, Project, ProjectFilter},
    projects::ProjectRepository,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct PlotServiceConfig {
    /// Extra load-apply-save rounds after a version conflict before giving up.
    pub max_conflict_retries: u32,
}

impl Default for PlotServiceConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 5,
        }
    }
}

/// Entry points for plot inventory and project lifecycle.
///
/// Each write loads the aggregate, applies one ledger operation, and saves
/// the whole aggregate guarded by the version it was loaded at. A version
/// conflict reloads and re-applies the operation against the fresh state,
/// so duplicate checks and counters always reflect the latest stored plots.
/// Ledger errors are returned as-is and nothing is saved.
pub struct PlotService<R> {
    repo: Arc<R>,
    config: PlotServiceConfig,
}

impl<R> Clone for PlotService<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            config: self.config.clone(),
        }
    }
}

impl<R: ProjectRepository> PlotService<R> {
    pub fn new(repo: R) -> Self {
        Self::from_shared(Arc::new(repo), PlotServiceConfig::default())
    }

    pub fn from_shared(repo: Arc<R>, config: PlotServiceConfig) -> Self {
        Self { repo, config }
    }

    pub fn with_config(mut self, config: PlotServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PlotServiceConfig {
        &self.config
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    async fn write<T, F>(&self, ctx: &RequestContext, project_id: Uuid, mut mutate: F) -> Result<T>
    where
        T: Send,
        F: FnMut(&mut Project) -> Result<T> + Send,
    {
        let mut retries = 0u32;
        loop {
            let (mut project, version) = self.repo.load(project_id, &ctx.owner_id).await?;
            project.updated_at = Utc::now();
            let outcome = match mutate(&mut project) {
                Ok(outcome) => outcome,
                Err(err) => {
                    metrics::record_ledger_rejection();
                    debug!(error = %err, "ledger rejected operation");
                    return Err(err);
                }
            };

            match self.repo.save(&project, version).await {
                Ok(new_version) => {
                    debug!(version = new_version, retries, "project saved");
                    return Ok(outcome);
                }
                Err(Error::VersionConflict) if retries < self.config.max_conflict_retries => {
                    retries += 1;
                    metrics::record_conflict_retry();
                    debug!(expected = version, attempt = retries, "version conflict; reloading project");
                }
                Err(Error::VersionConflict) => {
                    warn!(
                        target: "plotledger::conflict",
                        project_id = %project_id,
                        retries,
                        "giving up after repeated version conflicts"
                    );
                    return Err(Error::VersionConflict);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Add one plot. Fails with `DuplicateKey` when the plot number is taken.
    #[instrument(skip_all, fields(project_id = %project_id, owner = %ctx.owner_id, plot_number = %plot.plot_number))]
    pub async fn insert_plot(
        &self,
        ctx: &RequestContext,
        project_id: Uuid,
        plot: Plot,
    ) -> Result<InsertOutcome> {
        let outcome = self
            .write(ctx, project_id, |project| ledger::insert(project, plot.clone()))
            .await?;
        metrics::record_plots_inserted(1);
        info!(
            available = outcome.counters.available,
            sold = outcome.counters.sold,
            reserved = outcome.counters.reserved,
            "plot inserted"
        );
        Ok(outcome)
    }

    /// Replace the full record stored under `plot_number`.
    ///
    /// This is not a patch: buyer and payments missing from `plot` are
    /// erased. Callers must send back the complete current record, payment
    /// history included, with their changes applied.
    #[instrument(skip_all, fields(project_id = %project_id, owner = %ctx.owner_id, plot_number = %plot_number))]
    pub async fn replace_plot(
        &self,
        ctx: &RequestContext,
        project_id: Uuid,
        plot_number: &str,
        plot: Plot,
    ) -> Result<ReplaceOutcome> {
        let outcome = self
            .write(ctx, project_id, |project| {
                ledger::replace(project, plot_number, plot.clone())
            })
            .await?;
        metrics::record_plot_replaced();
        info!(status = %outcome.plot.status, "plot replaced");
        Ok(outcome)
    }

    /// Add a batch of plots, all or nothing.
    #[instrument(skip_all, fields(project_id = %project_id, owner = %ctx.owner_id, batch = plots.len()))]
    pub async fn bulk_insert(
        &self,
        ctx: &RequestContext,
        project_id: Uuid,
        plots: Vec<Plot>,
    ) -> Result<BulkInsertOutcome> {
        let outcome = self
            .write(ctx, project_id, |project| {
                ledger::bulk_insert(project, plots.clone())
            })
            .await?;
        metrics::record_bulk_batch();
        metrics::record_plots_inserted(outcome.added_count as u64);
        info!(
            added = outcome.added_count,
            total_plots = outcome.total_plots,
            "plots bulk inserted"
        );
        Ok(outcome)
    }

    #[instrument(skip_all, fields(project_id = %project_id, owner = %ctx.owner_id, plot_number = %plot_number))]
    pub async fn append_payment(
        &self,
        ctx: &RequestContext,
        project_id: Uuid,
        plot_number: &str,
        payment: Payment,
    ) -> Result<Payment> {
        let payment = self
            .write(ctx, project_id, |project| {
                ledger::append_payment(project, plot_number, payment.clone())
            })
            .await?;
        metrics::record_payment_appended();
        info!(amount = %payment.amount, kind = %payment.payment_type, "payment appended");
        Ok(payment)
    }

    #[instrument(skip_all, fields(project_id = %project_id, owner = %ctx.owner_id))]
    pub async fn list_plots(
        &self,
        ctx: &RequestContext,
        project_id: Uuid,
        status: Option<PlotStatus>,
    ) -> Result<Vec<Plot>> {
        let (project, _) = self.repo.load(project_id, &ctx.owner_id).await?;
        Ok(ledger::plots_with_status(&project, status))
    }

    #[instrument(skip_all, fields(owner = %ctx.owner_id))]
    pub async fn create_project(&self, ctx: &RequestContext, details: NewProject) -> Result<Project> {
        let project = Project::new(ctx.owner_id.clone(), details, Utc::now());
        self.repo.create(&project).await?;
        info!(project_id = %project.id, total_plots = project.total_plots, "project created");
        Ok(project)
    }

    #[instrument(skip_all, fields(project_id = %project_id, owner = %ctx.owner_id))]
    pub async fn get_project(&self, ctx: &RequestContext, project_id: Uuid) -> Result<Project> {
        let (project, _) = self.repo.load(project_id, &ctx.owner_id).await?;
        Ok(project)
    }

    #[instrument(skip_all, fields(owner = %ctx.owner_id))]
    pub async fn list_projects(
        &self,
        ctx: &RequestContext,
        filter: &ProjectFilter,
    ) -> Result<Vec<Project>> {
        self.repo.list(&ctx.owner_id, filter).await
    }

    /// Overwrite descriptive fields and declared figures, keeping plots.
    #[instrument(skip_all, fields(project_id = %project_id, owner = %ctx.owner_id))]
    pub async fn update_project(
        &self,
        ctx: &RequestContext,
        project_id: Uuid,
        details: NewProject,
    ) -> Result<Project> {
        self.write(ctx, project_id, |project| {
            project.apply_details(details.clone());
            Ok(project.clone())
        })
        .await
    }

    #[instrument(skip_all, fields(project_id = %project_id, owner = %ctx.owner_id))]
    pub async fn delete_project(&self, ctx: &RequestContext, project_id: Uuid) -> Result<()> {
        self.repo.delete(project_id, &ctx.owner_id).await?;
        info!("project deleted");
        Ok(())
    }
}
