//! Plotledger: plot inventory ledger for builder projects, stored as
//! versioned JSONB aggregates in Postgres.

pub mod context;
mod error;
pub mod ledger;
pub mod metrics;
pub mod models;
pub mod projects;
pub mod schema;
pub mod service;
pub mod store;
pub mod testing;

pub use context::RequestContext;
pub use error::{Error, Result, WithContext};
pub use models::{
    Buyer, NewProject, Payment, PaymentStatus, Plot, PlotCounters, PlotStatus, Project,
    ProjectFilter,
};
pub use projects::{ProjectRepository, Projects};
pub use schema::{SchemaConfig, SchemaPlan};
pub use service::{PlotService, PlotServiceConfig};
pub use store::{Store, StoreBuilder};

pub mod prelude {
    pub use crate::{
        Plot, PlotService, PlotStatus, Project, ProjectRepository, RequestContext, Result, Store,
    };
}
