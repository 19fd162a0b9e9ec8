use anyhow::anyhow;
use deadpool_diesel::postgres::Pool;
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use tracing::log::{info, warn};

/// Result of the one-time startup probe against `information_schema`.
///
/// The `lesson_resources` table gained its `category` and `position` columns
/// late; deployments running the older schema are still supported. Read paths
/// select the narrow column set against such a schema and flag it to the
/// caller, write paths drop the unsupported fields. Probing once here replaces
/// retrying a failed wide select on every request.
#[derive(Clone, Copy, Debug)]
pub struct SchemaCapabilities {
    pub lesson_resource_metadata: bool,
}

#[derive(QueryableByName)]
struct ColumnHits {
    #[diesel(sql_type = BigInt)]
    hits: i64,
}

impl SchemaCapabilities {
    /// Capabilities of a fully migrated schema.
    pub fn assume_current() -> Self {
        SchemaCapabilities {
            lesson_resource_metadata: true,
        }
    }

    pub fn legacy() -> Self {
        SchemaCapabilities {
            lesson_resource_metadata: false,
        }
    }

    pub async fn probe(pool: &Pool) -> anyhow::Result<Self> {
        let conn = pool.get().await?;

        let result = conn
            .interact(|conn_sync| {
                diesel::sql_query(
                    "SELECT COUNT(*) AS hits FROM information_schema.columns \
                     WHERE table_name = 'lesson_resources' \
                     AND column_name IN ('category', 'position')",
                )
                .get_result::<ColumnHits>(conn_sync)
            })
            .await
            .map_err(|interact_err| anyhow!("Capability probe interaction failed: {}", interact_err))??;

        let capabilities = SchemaCapabilities {
            lesson_resource_metadata: result.hits == 2,
        };

        if capabilities.lesson_resource_metadata {
            info!("lesson_resources carries category/position columns");
        } else {
            warn!(
                "lesson_resources is missing category/position columns; serving legacy resource payloads"
            );
        }

        Ok(capabilities)
    }
}
