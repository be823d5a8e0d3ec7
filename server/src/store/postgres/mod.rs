//! Postgres backend. Queries are checked at run time and filters are
//! assembled with `QueryBuilder` so every list shares one filter function
//! between its page query and its count query.

use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::utils::pagination::PageRequest;

mod accounts;
mod appointments;
mod catalog;
mod notifications;
mod payments;
mod tickets;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_page(qb: &mut QueryBuilder<'_, Postgres>, order_by: &str, page: PageRequest) {
    qb.push(" ORDER BY ")
        .push(order_by)
        .push(" LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
}

fn push_search(qb: &mut QueryBuilder<'_, Postgres>, columns: &[&str], needle: &str) {
    let pattern = format!("%{}%", needle.replace('%', "\\%").replace('_', "\\_"));
    qb.push(" AND (");
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        qb.push(*column).push(" ILIKE ").push_bind(pattern.clone());
    }
    qb.push(")");
}
