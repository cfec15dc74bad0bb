/*!
The query executor (spec §4.8): ties the planner, filter matcher, sort and
projection together into `find`/`findOne` over a [Table].
*/

use std::sync::Arc;

use crate::error::Result;
use crate::model::entity::Entity;
use crate::table::Table;

use super::filter::{matches, Filter};
use super::planner::{plan, row_group_might_match, PlanRoute};
use super::projection::Projection;
use super::sort::{sort_entities, SortKey};

/// Query parameters accepted by [QueryExecutor::find].
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub filter: Option<Filter>,
    pub sort: Vec<SortKey>,
    pub projection: Projection,
    pub skip: usize,
    pub limit: Option<usize>,
}

/// Executes queries against one table, using its manifest's row-group
/// statistics for pushdown and (optionally) a hash/FTS index for
/// point-lookup and text search routing.
pub struct QueryExecutor {
    table: Arc<Table>,
}

impl QueryExecutor {
    pub fn new(table: Arc<Table>) -> Self {
        QueryExecutor { table }
    }

    /// Stream matching entities, applying pushdown where the plan allows
    /// it, then the remaining predicate, sort, skip/limit and projection.
    pub async fn find(&self, options: QueryOptions) -> Result<Vec<Entity>> {
        let query_plan = plan(options.filter.clone());
        let remaining = query_plan.remaining.clone();

        let mut matched = match &query_plan.route {
            PlanRoute::PointLookup(id) => {
                let manifest = self.table.manifest().await?;
                let mut found = Vec::new();
                for file in manifest.live_files() {
                    for entity in self.table.read_file(&file.path).await? {
                        if super::filter::field_value(&entity, "$id").as_ref() == Some(id) {
                            found.push(entity);
                        }
                    }
                }
                found
            }
            // FTS routing delegates to an external FtsIndex (spec §4.5);
            // the executor still applies any remaining predicate below, so
            // a plain scan stands in until an index is wired in by the caller.
            PlanRoute::Fts | PlanRoute::Scan => {
                let manifest = self.table.manifest().await?;
                let mut found = Vec::new();
                for file in manifest.live_files() {
                    if let Some(f) = &remaining {
                        if !row_group_might_match(f, &file.row_groups) {
                            continue;
                        }
                    }
                    found.extend(self.table.read_file(&file.path).await?);
                }
                found
            }
        };

        if let Some(f) = &remaining {
            matched.retain(|entity| matches(f, entity));
        }

        if !options.sort.is_empty() {
            sort_entities(&mut matched, &options.sort);
        }

        let windowed: Vec<Entity> = matched
            .into_iter()
            .skip(options.skip)
            .take(options.limit.unwrap_or(usize::MAX))
            .collect();

        Ok(windowed.into_iter().map(|e| options.projection.apply(e)).collect())
    }

    /// The first matching entity, per the same ordering `find` would use.
    pub async fn find_one(&self, mut options: QueryOptions) -> Result<Option<Entity>> {
        options.limit = Some(1);
        Ok(self.find(options).await?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Namespace;
    use crate::config::DatabaseConfig;
    use crate::model::entity::FieldValue;
    use crate::storage::memory_store;
    use crate::table::Committer;

    fn sample(id: &str, views: i64) -> Entity {
        Entity {
            id: id.to_string(),
            type_: "post".to_string(),
            name: None,
            created_at: chrono::Utc::now(),
            created_by: None,
            updated_at: chrono::Utc::now(),
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
            version: 1,
            fields: [("views".to_string(), FieldValue::Int(views))].into_iter().collect(),
        }
    }

    async fn table_with(entities: Vec<Entity>) -> Arc<Table> {
        let storage = memory_store();
        let namespace = Namespace::try_new("posts").unwrap();
        let committer = Arc::new(Committer::new(storage.clone(), DatabaseConfig::default()));
        let table = Table::new(namespace, "wh/db/posts", storage, committer, DatabaseConfig::default());
        table.append_entities(entities).await.unwrap();
        Arc::new(table)
    }

    #[tokio::test]
    async fn point_lookup_finds_exact_id() {
        let table = table_with(vec![sample("posts/1", 1), sample("posts/2", 2)]).await;
        let executor = QueryExecutor::new(table);
        let found = executor
            .find(QueryOptions {
                filter: Some(Filter::Id(FieldValue::String("posts/2".to_string()))),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "posts/2");
    }

    #[tokio::test]
    async fn scan_applies_filter_sort_and_limit() {
        let table = table_with(vec![sample("posts/1", 3), sample("posts/2", 1), sample("posts/3", 2)]).await;
        let executor = QueryExecutor::new(table);
        let found = executor
            .find(QueryOptions {
                filter: Some(Filter::Field(
                    "views".to_string(),
                    super::super::filter::Op::Gte(FieldValue::Int(1)),
                )),
                sort: vec![SortKey { field: "views".to_string(), direction: super::super::sort::Direction::Asc }],
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, "posts/2");
        assert_eq!(found[1].id, "posts/3");
    }

    #[tokio::test]
    async fn projection_excludes_named_field() {
        let table = table_with(vec![sample("posts/1", 1)]).await;
        let executor = QueryExecutor::new(table);
        let found = executor
            .find(QueryOptions {
                projection: Projection::Exclude(vec!["views".to_string()]),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!found[0].fields.contains_key("views"));
    }
}
