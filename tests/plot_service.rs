use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use plotledger::{
    Error, NewProject, Payment, PaymentStatus, Plot, PlotCounters, PlotService,
    PlotServiceConfig, PlotStatus, Project, ProjectFilter, ProjectRepository, RequestContext,
    ledger, models, testing::InMemoryProjects,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

fn details(name: &str, area: &str, total_plots: u32) -> NewProject {
    NewProject {
        name: name.into(),
        area: area.into(),
        total_plots,
        available_plots: None,
        price_range: "25-60L".into(),
        layout_approval: "BMRDA".into(),
        completion_date: Utc.with_ymd_and_hms(2026, 6, 30, 0, 0, 0).unwrap(),
    }
}

fn plot(number: &str, status: PlotStatus) -> Plot {
    models::parse(
        "plot",
        json!({
            "plot_number": number,
            "size": "30x50",
            "price": "4100000",
            "facing": "East",
            "status": status.as_str()
        }),
    )
    .unwrap()
}

fn token_payment(amount: &str) -> Payment {
    models::parse(
        "payment",
        json!({
            "date": "2025-01-15T11:00:00Z",
            "amount": amount,
            "type": "Token",
            "status": "Paid"
        }),
    )
    .unwrap()
}

fn counters(available: u32, sold: u32, reserved: u32) -> PlotCounters {
    PlotCounters {
        available,
        sold,
        reserved,
    }
}

#[tokio::test]
async fn ledger_walkthrough() -> Result<()> {
    let service = PlotService::new(InMemoryProjects::new());
    let ctx = RequestContext::new("builder-7");
    let project = service
        .create_project(&ctx, details("Lake View", "Hebbal", 2))
        .await?;
    let id = project.id;

    // insert keeps declared capacity
    let out = service
        .insert_plot(&ctx, id, plot("P1", PlotStatus::Available))
        .await?;
    assert_eq!(out.counters, counters(1, 0, 0));
    assert_eq!(out.project_id, id);
    assert_eq!(service.get_project(&ctx, id).await?.total_plots, 2);

    // duplicate single insert
    let err = service
        .insert_plot(&ctx, id, plot("P1", PlotStatus::Sold))
        .await
        .expect_err("expected duplicate");
    assert!(matches!(err, Error::DuplicateKey(ref n) if n == "P1"));
    assert_eq!(service.list_plots(&ctx, id, None).await?.len(), 1);

    // bulk insert resets capacity
    let out = service
        .bulk_insert(
            &ctx,
            id,
            vec![plot("P2", PlotStatus::Sold), plot("P3", PlotStatus::Reserved)],
        )
        .await?;
    assert_eq!(out.added_count, 2);
    assert_eq!(out.total_plots, 3);
    let stored = service.get_project(&ctx, id).await?;
    assert_eq!(stored.total_plots, 3);
    assert_eq!(stored.counters(), counters(1, 1, 1));

    // internal duplicate in batch
    let before = service.get_project(&ctx, id).await?;
    let err = service
        .bulk_insert(
            &ctx,
            id,
            vec![plot("P4", PlotStatus::Available), plot("P4", PlotStatus::Sold)],
        )
        .await
        .expect_err("expected batch duplicate");
    assert_eq!(err.duplicate_plot_numbers(), vec!["P4"]);
    assert!(matches!(err, Error::DuplicateInBatch(_)));
    let after = service.get_project(&ctx, id).await?;
    assert_eq!(after.plots, before.plots);
    assert_eq!(after.counters(), before.counters());
    assert_eq!(after.total_plots, before.total_plots);

    // payments on P2, then a replace that omits them
    service
        .append_payment(&ctx, id, "P2", token_payment("100000"))
        .await?;
    let out = service
        .replace_plot(&ctx, id, "P2", plot("P2", PlotStatus::Reserved))
        .await?;
    assert_eq!(out.counters, counters(1, 0, 2));
    let stored = service.get_project(&ctx, id).await?;
    assert!(stored.plot("P2").unwrap().payments.is_empty());
    assert_eq!(stored.total_plots, 3);

    // payment append leaves counters alone
    let before = stored.counters();
    let paid = service
        .append_payment(&ctx, id, "P3", token_payment("50000"))
        .await?;
    assert_eq!(paid.payment_type, "Token");
    assert_eq!(paid.status, PaymentStatus::Paid);
    let stored = service.get_project(&ctx, id).await?;
    assert_eq!(stored.counters(), before);
    let p3 = stored.plot("P3").unwrap();
    assert_eq!(p3.payments.len(), 1);
    assert_eq!(p3.status, PlotStatus::Reserved);

    Ok(())
}

#[tokio::test]
async fn bulk_collision_with_stored_plots_lists_all() -> Result<()> {
    let service = PlotService::new(InMemoryProjects::new());
    let ctx = RequestContext::new("builder-7");
    let id = service
        .create_project(&ctx, details("Lake View", "Hebbal", 0))
        .await?
        .id;
    service
        .bulk_insert(
            &ctx,
            id,
            vec![plot("A1", PlotStatus::Available), plot("A2", PlotStatus::Available)],
        )
        .await?;
    let version = service.repository().version_of(id);

    let err = service
        .bulk_insert(
            &ctx,
            id,
            vec![
                plot("A3", PlotStatus::Available),
                plot("A2", PlotStatus::Sold),
                plot("A1", PlotStatus::Sold),
            ],
        )
        .await
        .expect_err("expected collision");
    match err {
        Error::DuplicateWithExisting(numbers) => assert_eq!(numbers, vec!["A2", "A1"]),
        other => panic!("wrong error: {other:?}"),
    }
    // nothing was saved
    assert_eq!(service.repository().version_of(id), version);
    Ok(())
}

#[tokio::test]
async fn missing_plot_and_foreign_owner_are_not_found() -> Result<()> {
    let service = PlotService::new(InMemoryProjects::new());
    let owner = RequestContext::new("builder-1");
    let stranger = RequestContext::new("builder-2");
    let id = service
        .create_project(&owner, details("Orchid Park", "Yelahanka", 5))
        .await?
        .id;

    let err = service
        .replace_plot(&owner, id, "Z9", plot("Z9", PlotStatus::Sold))
        .await
        .expect_err("expected missing plot");
    assert!(matches!(err, Error::PlotNotFound(_)));
    assert_eq!(err.http_status(), 404);

    let err = service
        .append_payment(&owner, id, "Z9", token_payment("1"))
        .await
        .expect_err("expected missing plot");
    assert!(matches!(err, Error::PlotNotFound(_)));

    let err = service
        .insert_plot(&stranger, id, plot("P1", PlotStatus::Available))
        .await
        .expect_err("expected foreign project");
    assert!(matches!(err, Error::ProjectNotFound(pid) if pid == id));
    assert!(service.list_plots(&stranger, id, None).await.is_err());

    let err = service
        .list_plots(&owner, Uuid::new_v4(), None)
        .await
        .expect_err("expected missing project");
    assert!(err.is_not_found());
    Ok(())
}

#[tokio::test]
async fn list_plots_filters_by_status() -> Result<()> {
    let service = PlotService::new(InMemoryProjects::new());
    let ctx = RequestContext::new("builder-3");
    let id = service
        .create_project(&ctx, details("Sunrise", "Hoskote", 4))
        .await?
        .id;
    service
        .bulk_insert(
            &ctx,
            id,
            vec![
                plot("S-2", PlotStatus::Sold),
                plot("S-1", PlotStatus::Available),
                plot("S-3", PlotStatus::Sold),
            ],
        )
        .await?;
    let sold: Vec<_> = service
        .list_plots(&ctx, id, Some(PlotStatus::Sold))
        .await?
        .into_iter()
        .map(|p| p.plot_number)
        .collect();
    assert_eq!(sold, ["S-2", "S-3"]);
    assert!(matches!(
        "sold".parse::<PlotStatus>(),
        Err(Error::Validation(_))
    ));
    Ok(())
}

#[tokio::test]
async fn project_lifecycle() -> Result<()> {
    let service = PlotService::new(InMemoryProjects::new());
    let ctx = RequestContext::new("builder-4");
    let other = RequestContext::new("builder-5");

    let first = service
        .create_project(&ctx, details("Green Acres", "Whitefield", 10))
        .await?;
    let second = service
        .create_project(&ctx, details("Blue Hills", "Kanakapura", 8))
        .await?;
    service
        .create_project(&other, details("Green Valley", "Whitefield", 3))
        .await?;

    let all = service
        .list_projects(&ctx, &ProjectFilter::default())
        .await?;
    assert_eq!(all.len(), 2);

    let whitefield = service
        .list_projects(
            &ctx,
            &ProjectFilter {
                area: Some("Whitefield".into()),
                search: None,
            },
        )
        .await?;
    assert_eq!(whitefield.len(), 1);
    assert_eq!(whitefield[0].id, first.id);

    let searched = service
        .list_projects(
            &ctx,
            &ProjectFilter {
                area: None,
                search: Some("HILLS".into()),
            },
        )
        .await?;
    assert_eq!(searched.len(), 1);
    assert_eq!(searched[0].id, second.id);

    service
        .insert_plot(&ctx, first.id, plot("G1", PlotStatus::Sold))
        .await?;
    let updated = service
        .update_project(&ctx, first.id, details("Green Acres II", "Whitefield", 12))
        .await?;
    assert_eq!(updated.name, "Green Acres II");
    assert_eq!(updated.total_plots, 12);
    assert_eq!(updated.sold_plots, 1);
    assert_eq!(updated.plots.len(), 1);
    assert!(updated.updated_at >= first.updated_at);
    assert_eq!(updated.created_at, first.created_at);

    service.delete_project(&ctx, second.id).await?;
    assert!(service.get_project(&ctx, second.id).await.is_err());
    let err = service
        .delete_project(&ctx, second.id)
        .await
        .expect_err("already deleted");
    assert!(err.is_not_found());
    Ok(())
}

/// Repository that lets another writer land between a caller's load and save.
struct InterleavedWriter {
    inner: InMemoryProjects,
    fired: AtomicBool,
    intruder: Plot,
}

impl InterleavedWriter {
    fn new(intruder: Plot) -> Self {
        Self {
            inner: InMemoryProjects::new(),
            fired: AtomicBool::new(false),
            intruder,
        }
    }
}

#[async_trait]
impl ProjectRepository for InterleavedWriter {
    async fn create(&self, project: &Project) -> plotledger::Result<i32> {
        self.inner.create(project).await
    }

    async fn load(&self, id: Uuid, owner_id: &str) -> plotledger::Result<(Project, i32)> {
        self.inner.load(id, owner_id).await
    }

    async fn save(&self, project: &Project, expected: i32) -> plotledger::Result<i32> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            let (mut theirs, version) = self.inner.load(project.id, &project.owner_id).await?;
            ledger::insert(&mut theirs, self.intruder.clone())?;
            self.inner.save(&theirs, version).await?;
        }
        self.inner.save(project, expected).await
    }

    async fn list(&self, owner_id: &str, filter: &ProjectFilter) -> plotledger::Result<Vec<Project>> {
        self.inner.list(owner_id, filter).await
    }

    async fn delete(&self, id: Uuid, owner_id: &str) -> plotledger::Result<()> {
        self.inner.delete(id, owner_id).await
    }
}

#[tokio::test]
async fn concurrent_write_is_retried_not_lost() -> Result<()> {
    let service = PlotService::new(InterleavedWriter::new(plot("X1", PlotStatus::Sold)));
    let ctx = RequestContext::new("builder-9");
    let id = service
        .create_project(&ctx, details("Maple", "Devanahalli", 2))
        .await?
        .id;

    let out = service
        .insert_plot(&ctx, id, plot("P1", PlotStatus::Available))
        .await?;
    assert_eq!(out.counters, counters(1, 1, 0));

    let stored = service.get_project(&ctx, id).await?;
    let numbers: Vec<_> = stored.plots.iter().map(|p| p.plot_number.as_str()).collect();
    assert_eq!(numbers, ["X1", "P1"]);
    assert_eq!(stored.counters(), counters(1, 1, 0));
    Ok(())
}

#[tokio::test]
async fn conflict_without_retries_is_surfaced() -> Result<()> {
    let service = PlotService::new(InterleavedWriter::new(plot("X1", PlotStatus::Sold)))
        .with_config(PlotServiceConfig {
            max_conflict_retries: 0,
        });
    let ctx = RequestContext::new("builder-9");
    let id = service
        .create_project(&ctx, details("Maple", "Devanahalli", 2))
        .await?
        .id;

    let err = service
        .insert_plot(&ctx, id, plot("P1", PlotStatus::Available))
        .await
        .expect_err("expected conflict");
    assert!(matches!(err, Error::VersionConflict));
    assert_eq!(err.http_status(), 409);

    let stored = service.get_project(&ctx, id).await?;
    assert_eq!(stored.plots.len(), 1);
    assert_eq!(stored.plots[0].plot_number, "X1");
    Ok(())
}

#[tokio::test]
async fn retry_rechecks_duplicates_against_fresh_state() -> Result<()> {
    let service = PlotService::new(InterleavedWriter::new(plot("P1", PlotStatus::Sold)));
    let ctx = RequestContext::new("builder-9");
    let id = service
        .create_project(&ctx, details("Maple", "Devanahalli", 2))
        .await?
        .id;

    let err = service
        .insert_plot(&ctx, id, plot("P1", PlotStatus::Available))
        .await
        .expect_err("expected duplicate after reload");
    assert!(matches!(err, Error::DuplicateKey(_)));
    let stored = service.get_project(&ctx, id).await?;
    assert_eq!(stored.plots.len(), 1);
    assert_eq!(stored.plots[0].status, PlotStatus::Sold);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_inserts_all_land() -> Result<()> {
    let repo = Arc::new(InMemoryProjects::new());
    let service = PlotService::from_shared(
        repo.clone(),
        PlotServiceConfig {
            max_conflict_retries: 100,
        },
    );
    let ctx = RequestContext::new("builder-10");
    let id = service
        .create_project(&ctx, details("Cedar", "Bidadi", 25))
        .await?
        .id;

    let mut handles = Vec::new();
    for i in 0..25 {
        let service = service.clone();
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            let status = if i % 2 == 0 {
                PlotStatus::Available
            } else {
                PlotStatus::Sold
            };
            service
                .insert_plot(&ctx, id, plot(&format!("C{i}"), status))
                .await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let stored = service.get_project(&ctx, id).await?;
    assert_eq!(stored.plots.len(), 25);
    assert_eq!(stored.counters(), counters(13, 12, 0));
    assert_eq!(stored.total_plots, 25);
    assert_eq!(repo.version_of(id), Some(26));
    Ok(())
}
