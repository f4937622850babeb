//! InsightDB – an in-memory query engine over course-section and room datasets.
//!
//! Datasets are named collections of flat records of one kind:
//! * sections: `dept`, `id`, `instructor`, `title`, `uuid` (text) and
//!   `avg`, `pass`, `fail`, `audit`, `year` (numeric);
//! * rooms: `fullname`, `shortname`, `number`, `name`, `address`, `type`,
//!   `furniture`, `href` (text) and `lat`, `lon`, `seats` (numeric).
//!
//! Queries are JSON documents with a `WHERE` filter tree, `OPTIONS` choosing
//! columns and ordering, and optional `TRANSFORMATIONS` grouping rows and
//! computing aggregates. Every field in a query is written `<id>_<field>` and
//! all of them must name the same dataset.
//!
//! ## Modules
//! * [`record`] – dataset kinds, field values, records and output rows.
//! * [`construct`] – datasets, the in-memory keeper and the [`construct::Database`].
//! * [`persist`] – SQLite storage so datasets survive a restart.
//! * [`filter`], [`transform`], [`options`] – the query stages.
//! * [`validate`] – turns raw JSON into a checked [`validate::Query`].
//! * [`query`] – binds a query to its dataset and runs it.
//! * [`interface`] – the [`interface::InsightFacade`] used by embedders and the server.
//! * [`server`] – the axum HTTP surface.
//! * [`config`] – settings for the binary.
//!
//! ## Quick Start
//! ```
//! use std::sync::Arc;
//! use insightdb::construct::Database;
//! use insightdb::interface::InsightFacade;
//! use insightdb::persist::PersistenceMode;
//! use insightdb::record::{DatasetKind, Record, Section};
//! use serde_json::json;
//!
//! let db = Database::new(PersistenceMode::InMemory).unwrap();
//! let facade = InsightFacade::new(Arc::new(db));
//! let section = Section {
//!     uuid: "1".into(), id: "310".into(), title: "sw eng".into(),
//!     instructor: "smith".into(), dept: "cpsc".into(),
//!     year: 2015.0, avg: 80.0, pass: 40.0, fail: 2.0, audit: 0.0,
//! };
//! facade.add_dataset("courses", DatasetKind::Sections, vec![Record::from(section)]).unwrap();
//! let rows = facade.perform_query(&json!({
//!     "WHERE": { "GT": { "courses_avg": 70 } },
//!     "OPTIONS": { "COLUMNS": ["courses_dept", "courses_avg"] }
//! })).unwrap();
//! assert_eq!(rows.len(), 1);
//! ```

pub mod config;
pub mod construct;
pub mod error;
pub mod filter;
pub mod interface;
pub mod options;
pub mod persist;
pub mod query;
pub mod record;
pub mod server;
pub mod transform;
pub mod validate;

pub use error::{InsightError, Result};
