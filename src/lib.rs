use anyhow::Context;
use axum::Router;
use deadpool::managed::Pool;
use diesel_async::{pooled_connection::AsyncDieselConnectionManager, AsyncPgConnection};

pub mod api;
pub mod auth;
pub mod backend;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod forms;
pub mod live;
pub mod models;
pub mod queries;
pub mod realtime;
pub mod schema;
pub mod search;
pub mod session;
pub mod views;

pub type DbPool = Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

pub fn connect_to_db(db_url: &str) -> anyhow::Result<DbPool> {
    let db_config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(db_url);
    Pool::builder(db_config)
        .build()
        .context("failed to build database pool")
}

pub fn app() -> Router {
    Router::new().nest("/api", api::app())
}
