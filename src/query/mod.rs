//! Builds and runs the read-side queries external callers need
//! (SPEC_FULL.md §4.7): transactions by id/recipient/tag/time, blocks in
//! either height order, and a standalone tag lookup. Every query is
//! assembled with `sqlx::QueryBuilder` because the predicate set is
//! optional and combinable — a fixed SQL string per combination would
//! multiply out combinatorially.

use crate::db::models::{BlockGqlRow, TransactionRow};
use crate::sync::type_adapter::unix_seconds_from_time_uuid;
use sqlx::{PgPool, Postgres, QueryBuilder};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("database error while running query: {0}")]
    Database(#[from] sqlx::Error),
    #[error("limit must be between 1 and {max}, got {requested}")]
    LimitOutOfRange { requested: i64, max: i64 },
}

const MAX_LIMIT: i64 = 1000;
const DEFAULT_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    HeightAscending,
    HeightDescending,
}

/// Transaction search predicates. Every field is optional and AND-ed
/// together; an empty `ids`/`tags` list means "no filter on this
/// dimension", not "match nothing".
#[derive(Debug, Clone, Default)]
pub struct TransactionQuery {
    /// Exact match on `t.id`.
    pub id: Option<String>,
    /// IN-list match on `t.id`.
    pub ids: Vec<String>,
    /// Scalar equality on the transaction's target/recipient address
    /// (SPEC_FULL.md §9, Open Question 2: `to` is equality only, never a
    /// range bound — `min_height`/`max_height` below are the range bounds).
    pub to: Option<String>,
    pub tags: Vec<(String, String)>,
    pub min_height: Option<i64>,
    pub max_height: Option<i64>,
    /// Time-based UUID cutoff: only transactions whose block predates the
    /// timestamp encoded in `since` are returned (SPEC_FULL.md §4.7,
    /// scenario §8.6).
    pub since: Option<Uuid>,
    /// `status: "confirmed"` constrains to persisted (non-negative) block
    /// heights; `false` leaves height unconstrained.
    pub confirmed_only: bool,
    pub limit: Option<i64>,
}

impl TransactionQuery {
    pub async fn run(&self, pool: &PgPool) -> Result<Vec<TransactionRow>, QueryError> {
        let limit = resolve_limit(self.limit)?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT DISTINCT t.id, t.block_height, t.block_indep_hash, t.block_timestamp,
                    t.owner, t.target, t.quantity, t.reward, t.data_root, t.data_size,
                    t.signature, t.last_tx, t.tx_format, t.tag_count
             FROM transaction t",
        );

        if !self.tags.is_empty() {
            builder.push(" JOIN tx_tag tag ON tag.tx_id = t.id");
        }

        let mut where_clause = builder.separated(" AND ");
        where_clause.push(" WHERE TRUE");

        if let Some(id) = &self.id {
            where_clause.push("t.id = ");
            where_clause.push_bind_unseparated(id.clone());
        }
        if !self.ids.is_empty() {
            where_clause.push("t.id = ANY(");
            where_clause.push_bind_unseparated(self.ids.clone());
            where_clause.push_unseparated(")");
        }
        if let Some(to) = &self.to {
            where_clause.push("t.target = ");
            where_clause.push_bind_unseparated(to.clone());
        }
        if let Some(min_height) = self.min_height {
            where_clause.push("t.block_height >= ");
            where_clause.push_bind_unseparated(min_height);
        }
        if let Some(max_height) = self.max_height {
            where_clause.push("t.block_height <= ");
            where_clause.push_bind_unseparated(max_height);
        }
        if self.confirmed_only {
            where_clause.push("t.block_height >= 0");
        }
        if let Some(since) = self.since {
            if let Some(unix_seconds) = unix_seconds_from_time_uuid(since) {
                where_clause.push("t.block_timestamp < ");
                where_clause.push_bind_unseparated(unix_seconds);
            }
        }
        if !self.tags.is_empty() {
            where_clause.push("(");
            let mut first = true;
            for (name, value) in &self.tags {
                if !first {
                    where_clause.push_unseparated(" OR ");
                }
                where_clause.push_unseparated("(tag.name = ");
                where_clause.push_bind_unseparated(name.clone());
                where_clause.push_unseparated(" AND tag.value = ");
                where_clause.push_bind_unseparated(value.clone());
                where_clause.push_unseparated(")");
                first = false;
            }
            where_clause.push_unseparated(")");
        }

        builder.push(" ORDER BY t.block_height DESC LIMIT ");
        builder.push_bind(limit);

        builder
            .build_query_as::<TransactionRow>()
            .fetch_all(pool)
            .await
            .map_err(QueryError::from)
    }
}

/// One requested tag constraint: a tag `name` plus the set of acceptable
/// `value`s (single-valued lists collapse to an equality check rather than
/// an `IN` list).
#[derive(Debug, Clone)]
pub struct TagFilter {
    pub name: String,
    pub values: Vec<String>,
}

/// Standalone tag lookup (SPEC_FULL.md §4.7, "Tags"; scenario §8.5) —
/// distinct from `TransactionQuery`'s own tag predicate, this returns a
/// bare `tx_id` projection rather than full transaction rows. Every
/// `TagFilter` is AND-ed together via a self-join on `tx_tag`, so a
/// multi-filter query matches transactions carrying all of the requested
/// tags, not just one of them.
#[derive(Debug, Clone, Default)]
pub struct TagQuery {
    pub filters: Vec<TagFilter>,
}

impl TagQuery {
    pub async fn run(&self, pool: &PgPool) -> Result<Vec<String>, QueryError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT DISTINCT t0.tx_id FROM tx_tag t0");

        for i in 1..self.filters.len() {
            builder.push(format!(" JOIN tx_tag t{i} ON t{i}.tx_id = t0.tx_id"));
        }

        let mut where_clause = builder.separated(" AND ");
        where_clause.push(" WHERE TRUE");

        for (i, filter) in self.filters.iter().enumerate() {
            where_clause.push(format!("t{i}.name = "));
            where_clause.push_bind_unseparated(filter.name.clone());
            if filter.values.len() == 1 {
                where_clause.push(format!("t{i}.value = "));
                where_clause.push_bind_unseparated(filter.values[0].clone());
            } else if !filter.values.is_empty() {
                where_clause.push(format!("t{i}.value = ANY("));
                where_clause.push_bind_unseparated(filter.values.clone());
                where_clause.push_unseparated(")");
            }
        }

        builder
            .build_query_scalar::<String>()
            .fetch_all(pool)
            .await
            .map_err(QueryError::from)
    }
}

/// Block range query. Which physical table is read — `block_gql_asc` or
/// `block_gql_desc` — *is* the sort order; no `ORDER BY` is emitted
/// (SPEC_FULL.md §9, Open Question 3).
#[derive(Debug, Clone)]
pub struct BlockQuery {
    pub from_height: Option<i64>,
    pub to_height: Option<i64>,
    pub sort: SortOrder,
    pub limit: Option<i64>,
}

impl Default for BlockQuery {
    fn default() -> Self {
        Self {
            from_height: None,
            to_height: None,
            sort: SortOrder::HeightDescending,
            limit: None,
        }
    }
}

impl BlockQuery {
    pub async fn run(&self, pool: &PgPool) -> Result<Vec<BlockGqlRow>, QueryError> {
        let limit = resolve_limit(self.limit)?;
        let table = match self.sort {
            SortOrder::HeightAscending => "block_gql_asc",
            SortOrder::HeightDescending => "block_gql_desc",
        };

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT height, indep_hash, block_timestamp FROM {table}"));

        let mut where_clause = builder.separated(" AND ");
        where_clause.push(" WHERE TRUE");
        if let Some(from_height) = self.from_height {
            where_clause.push("height >= ");
            where_clause.push_bind_unseparated(from_height);
        }
        if let Some(to_height) = self.to_height {
            where_clause.push("height = ");
            where_clause.push_bind_unseparated(to_height);
        }

        builder.push(" LIMIT ");
        builder.push_bind(limit);

        builder
            .build_query_as::<BlockGqlRow>()
            .fetch_all(pool)
            .await
            .map_err(QueryError::from)
    }
}

fn resolve_limit(requested: Option<i64>) -> Result<i64, QueryError> {
    let limit = requested.unwrap_or(DEFAULT_LIMIT);
    if limit < 1 || limit > MAX_LIMIT {
        return Err(QueryError::LimitOutOfRange {
            requested: limit,
            max: MAX_LIMIT,
        });
    }
    Ok(limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_limit_defaults_when_unset() {
        assert_eq!(resolve_limit(None).unwrap(), DEFAULT_LIMIT);
    }

    #[test]
    fn resolve_limit_rejects_zero() {
        assert!(resolve_limit(Some(0)).is_err());
    }

    #[test]
    fn resolve_limit_rejects_over_max() {
        assert!(resolve_limit(Some(MAX_LIMIT + 1)).is_err());
    }

    #[test]
    fn resolve_limit_accepts_max() {
        assert_eq!(resolve_limit(Some(MAX_LIMIT)).unwrap(), MAX_LIMIT);
    }

    #[test]
    fn block_query_default_sorts_descending() {
        assert_eq!(BlockQuery::default().sort, SortOrder::HeightDescending);
    }
}
