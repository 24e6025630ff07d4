//! The entity types kept in sync.
//!
//! Registration order is the order a sequential pass runs them in and the
//! order of the per-type entries of every report.

use crate::stores::SqlStores;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tidesync_engine::{CompositeKey, EntityTypeSpec, Record, RecordKey, Registry, RegistryError};

pub const EXERCISES: &str = "exercises";
pub const WORKOUT_SESSIONS: &str = "workout_sessions";
pub const WORKOUT_SETS: &str = "workout_sets";
pub const WORKOUT_EXERCISES: &str = "workout_exercises";
pub const WORKOUT_TEMPLATES: &str = "workout_templates";
pub const TEMPLATE_EXERCISES: &str = "template_exercises";
pub const USER_PROFILES: &str = "user_profiles";
pub const GDPR_CONSENTS: &str = "gdpr_consents";
pub const CHART_TEMPLATES: &str = "chart_templates";
pub const FRIEND_CONFIGS: &str = "friend_configs";
pub const EXERCISE_LINE_CONFIGS: &str = "exercise_line_configs";
pub const SET_CONFIGS: &str = "set_configs";

/// `(template id, exercise id)`
pub type TemplateExerciseKey = CompositeKey<String, String>;

/// An entity type stored under `collection` in both replicas.
pub fn sql_entity<K>(collection: &'static str, stores: &SqlStores) -> EntityTypeSpec<Record<K>>
where
    K: RecordKey + Serialize + DeserializeOwned,
{
    let (fetch_local, fetch_remote) = (stores.clone(), stores.clone());
    let (push_local, push_remote) = (stores.clone(), stores.clone());
    EntityTypeSpec::new(
        collection,
        move |ctx| fetch_local.fetch_local::<K>(ctx, collection),
        move |ctx| fetch_remote.fetch_remote::<K>(ctx, collection),
        move |ctx, record| push_local.push_local(ctx, collection, record),
        move |ctx, record| push_remote.push_remote(ctx, collection, record),
    )
}

/// Every entity type, backed by `stores`.
pub fn build_registry(stores: &SqlStores) -> Result<Registry, RegistryError> {
    let mut registry = Registry::new();

    registry.register(sql_entity::<String>(EXERCISES, stores))?;
    registry.register(sql_entity::<String>(WORKOUT_SESSIONS, stores))?;
    registry.register(sql_entity::<String>(WORKOUT_SETS, stores))?;
    registry.register(sql_entity::<String>(WORKOUT_EXERCISES, stores))?;
    registry.register(sql_entity::<String>(WORKOUT_TEMPLATES, stores))?;
    registry.register(sql_entity::<TemplateExerciseKey>(TEMPLATE_EXERCISES, stores))?;
    registry.register(sql_entity::<String>(USER_PROFILES, stores))?;
    // Keyed by the user id
    registry.register(sql_entity::<String>(GDPR_CONSENTS, stores))?;
    registry.register(sql_entity::<i64>(CHART_TEMPLATES, stores))?;
    registry.register(sql_entity::<i64>(FRIEND_CONFIGS, stores))?;
    registry.register(sql_entity::<i64>(EXERCISE_LINE_CONFIGS, stores))?;
    registry.register(sql_entity::<i64>(SET_CONFIGS, stores))?;

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::Bridge;
    use sqlx::postgres::PgPoolOptions;
    use sqlx::sqlite::SqlitePoolOptions;

    const ENTITY_TYPES: [&str; 12] = [
        EXERCISES,
        WORKOUT_SESSIONS,
        WORKOUT_SETS,
        WORKOUT_EXERCISES,
        WORKOUT_TEMPLATES,
        TEMPLATE_EXERCISES,
        USER_PROFILES,
        GDPR_CONSENTS,
        CHART_TEMPLATES,
        FRIEND_CONFIGS,
        EXERCISE_LINE_CONFIGS,
        SET_CONFIGS,
    ];

    #[tokio::test]
    async fn registry_follows_catalog_order() {
        let local = SqlitePoolOptions::new()
            .connect_lazy("sqlite::memory:")
            .unwrap();
        let remote = PgPoolOptions::new()
            .connect_lazy("postgres://tidesync@127.0.0.1:1/tidesync")
            .unwrap();
        let stores = SqlStores::new(local, remote, Bridge::current());

        let registry = build_registry(&stores).unwrap();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names, ENTITY_TYPES);
    }
}
