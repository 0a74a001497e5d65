//! Schema bootstrap: the contracts table, its base indexes, and the
//! change-notification trigger (spec §4.4 "Change firehose", §6 "Row schema
//! (persistent layout)", "Indexes").

use sqlx::PgPool;

use contracts_types::ContractError;

/// The channel every row-trigger `NOTIFY`s on (spec §4.4).
pub const CHANGE_CHANNEL: &str = "contracts_changes";

fn create_table_sql(table: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id               UUID PRIMARY KEY,
            slug             VARCHAR(255) NOT NULL,
            type             TEXT NOT NULL,
            active           BOOL NOT NULL DEFAULT true,
            version_major    INT NOT NULL CHECK (version_major >= 0),
            version_minor    INT NOT NULL CHECK (version_minor >= 0),
            version_patch    INT NOT NULL CHECK (version_patch >= 0),
            version_prerelease TEXT,
            version_build    TEXT,
            name             TEXT,
            "loop"           TEXT,
            tags             TEXT[] NOT NULL DEFAULT '{{}}',
            markers          TEXT[] NOT NULL DEFAULT '{{}}',
            linked_at        JSONB NOT NULL DEFAULT '{{}}'::jsonb,
            links            JSONB NOT NULL DEFAULT '{{}}'::jsonb,
            requires         JSONB[] NOT NULL DEFAULT '{{}}',
            capabilities     JSONB[] NOT NULL DEFAULT '{{}}',
            data             JSONB NOT NULL DEFAULT '{{}}'::jsonb,
            created_at       TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at       TIMESTAMPTZ NOT NULL DEFAULT now(),
            UNIQUE (slug, version_major, version_minor, version_patch, version_prerelease, version_build)
        )
        "#
    )
}

fn base_index_sql(table: &str) -> Vec<String> {
    vec![
        format!("CREATE INDEX IF NOT EXISTS {table}_slug_idx ON {table} (slug)"),
        format!("CREATE INDEX IF NOT EXISTS {table}_loop_idx ON {table} (\"loop\")"),
        format!("CREATE INDEX IF NOT EXISTS {table}_tags_gin_idx ON {table} USING GIN (tags)"),
        format!("CREATE INDEX IF NOT EXISTS {table}_type_idx ON {table} (type)"),
        format!("CREATE INDEX IF NOT EXISTS {table}_mirrors_gin_idx ON {table} USING GIN ((data->'mirrors'))"),
        format!("CREATE INDEX IF NOT EXISTS {table}_created_at_idx ON {table} (created_at DESC)"),
        format!("CREATE INDEX IF NOT EXISTS {table}_updated_at_idx ON {table} (updated_at)"),
    ]
}

fn trigger_sql(table: &str) -> (String, String, String) {
    let function_name = format!("{table}_notify_change");
    let function_sql = format!(
        r#"
        CREATE OR REPLACE FUNCTION {function_name}() RETURNS trigger AS $$
        DECLARE
            payload json;
            row_data record;
        BEGIN
            row_data := COALESCE(NEW, OLD);
            payload := json_build_object(
                'id', row_data.id,
                'slug', row_data.slug,
                'contractType', row_data.type,
                'type', lower(TG_OP),
                'table', TG_TABLE_NAME
            );
            PERFORM pg_notify('{CHANGE_CHANNEL}', payload::text);
            RETURN row_data;
        END;
        $$ LANGUAGE plpgsql;
        "#
    );
    let trigger_name = format!("{table}_notify_change_trigger");
    let trigger_sql = format!(
        r#"
        DROP TRIGGER IF EXISTS {trigger_name} ON {table};
        CREATE TRIGGER {trigger_name}
            AFTER INSERT OR UPDATE OR DELETE ON {table}
            FOR EACH ROW EXECUTE FUNCTION {function_name}();
        "#
    );
    (function_name, function_sql, trigger_sql)
}

/// Create `table` (if absent), its base indexes, and its change-notification
/// trigger.
pub async fn bootstrap(pool: &PgPool, table: &str) -> Result<(), ContractError> {
    sqlx::query(&create_table_sql(table))
        .execute(pool)
        .await
        .map_err(|e| ContractError::Backend(e.to_string()))?;

    for stmt in base_index_sql(table) {
        sqlx::query(&stmt).execute(pool).await.map_err(|e| ContractError::Backend(e.to_string()))?;
    }

    let (_fn_name, function_sql, trigger_sql) = trigger_sql(table);
    sqlx::query(&function_sql).execute(pool).await.map_err(|e| ContractError::Backend(e.to_string()))?;
    sqlx::query(&trigger_sql).execute(pool).await.map_err(|e| ContractError::Backend(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_table_sql_includes_unique_constraint() {
        let sql = create_table_sql("contracts");
        assert!(sql.contains("UNIQUE (slug, version_major"));
    }

    #[test]
    fn trigger_sql_notifies_on_configured_channel() {
        let (_name, function_sql, _trigger) = trigger_sql("contracts");
        assert!(function_sql.contains(CHANGE_CHANNEL));
    }
}
