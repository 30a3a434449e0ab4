//! SQL rendered from embedded handlebars templates.
//!
//! Each statement is a named template rendered against one shared
//! parameter struct, so schema, table and field names stay configurable
//! without a query-type hierarchy. Everything user-controlled that ends
//! up inside rendered SQL text (index names, filter fields) is
//! validated before rendering; values are always bound, never spliced.

use handlebars::Handlebars;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use registry_core::error::{RegistryError, Result};

const TEMPLATE_SOURCES: &[(&str, &str)] = &[
    ("create", include_str!("../sql/create.sql.hbs")),
    ("drop", include_str!("../sql/drop.sql.hbs")),
    ("get", include_str!("../sql/get.sql.hbs")),
    ("bulk_insert", include_str!("../sql/bulk_insert.sql.hbs")),
    ("meta_save", include_str!("../sql/meta_save.sql.hbs")),
    ("meta_read", include_str!("../sql/meta_read.sql.hbs")),
    ("pre_load", include_str!("../sql/pre_load.sql.hbs")),
    ("post_load", include_str!("../sql/post_load.sql.hbs")),
    ("extra_indexes", include_str!("../sql/extra_indexes.sql.hbs")),
    ("search", include_str!("../sql/search.sql.hbs")),
];

static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("spaces regex"));

// lowercase identifier, optionally dotted once for a nested field
static INDEX_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z][a-z0-9_]*(\.[a-z][a-z0-9_]*)?$").expect("index name regex")
});
static ROOT_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("field regex"));

/// Validates a requested index name before it is ever rendered into
/// DDL. Injection is prevented here, by construction.
pub fn validate_index_name(raw: &str) -> Result<()> {
    if INDEX_NAME.is_match(raw) {
        Ok(())
    } else {
        Err(RegistryError::Validation(format!(
            "invalid index name {raw:?}: expected field or field.nested"
        )))
    }
}

/// Validates a root-level search filter field.
pub fn validate_filter_field(raw: &str) -> Result<()> {
    if ROOT_FIELD.is_match(raw) {
        Ok(())
    } else {
        Err(RegistryError::Validation(format!(
            "invalid search field {raw:?}"
        )))
    }
}

/// A requested secondary index, resolved to the JSON path the DDL
/// template renders. `field` addresses the document root; `field.nested`
/// reaches through every element of the partner array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtraIndex {
    pub is_root: bool,
    pub index_name: String,
    pub path: String,
}

impl ExtraIndex {
    pub fn parse(raw: &str) -> Result<Self> {
        validate_index_name(raw)?;
        let (is_root, path) = match raw.split_once('.') {
            None => (true, format!("$.{raw}")),
            Some((field, nested)) => (false, format!("$.{field}[*].{nested}")),
        };
        Ok(Self {
            is_root,
            index_name: format!("idx_json_{}", raw.replace('.', "_")),
            path,
        })
    }
}

/// The shared render parameters: schema plus every table and field name.
#[derive(Debug, Clone, Serialize)]
pub struct SqlParams {
    pub schema: String,
    pub company_table: String,
    pub meta_table: String,
    pub cursor_field: String,
    pub id_field: String,
    pub json_field: String,
    pub key_field: String,
    pub value_field: String,
}

impl SqlParams {
    pub fn new(schema: &str) -> Self {
        Self {
            schema: schema.to_string(),
            company_table: "cnpj".to_string(),
            meta_table: "meta".to_string(),
            cursor_field: "cursor".to_string(),
            id_field: "id".to_string(),
            json_field: "json".to_string(),
            key_field: "key".to_string(),
            value_field: "value".to_string(),
        }
    }

    /// Schema and company table in dot notation.
    pub fn company_table_full(&self) -> String {
        format!("{}.{}", self.schema, self.company_table)
    }

    pub fn meta_table_full(&self) -> String {
        format!("{}.{}", self.schema, self.meta_table)
    }
}

pub struct SqlTemplates {
    registry: Handlebars<'static>,
    params: SqlParams,
}

impl SqlTemplates {
    pub fn new(params: SqlParams) -> Result<Self> {
        let mut registry = Handlebars::new();
        // rendered output is SQL, not HTML; identifiers are validated
        registry.register_escape_fn(handlebars::no_escape);
        for (key, source) in TEMPLATE_SOURCES {
            registry
                .register_template_string(key, source)
                .map_err(|e| anyhow::anyhow!("template {key}: {e}"))?;
        }
        Ok(Self { registry, params })
    }

    pub fn params(&self) -> &SqlParams {
        &self.params
    }

    /// Renders a template against the shared parameters only.
    pub fn render(&self, key: &str) -> Result<String> {
        self.render_with(key, &self.params)
    }

    /// Renders a template against the shared parameters extended with
    /// statement-specific data.
    pub fn render_with<T: Serialize>(&self, key: &str, extra: &T) -> Result<String> {
        let mut ctx = serde_json::to_value(&self.params)
            .map_err(|e| anyhow::anyhow!("serializing sql params: {e}"))?;
        let extra = serde_json::to_value(extra)
            .map_err(|e| anyhow::anyhow!("serializing template data: {e}"))?;
        if let (Some(ctx_map), Some(extra_map)) = (ctx.as_object_mut(), extra.as_object())
        {
            for (k, v) in extra_map {
                ctx_map.insert(k.clone(), v.clone());
            }
        }
        let rendered = self
            .registry
            .render(key, &ctx)
            .map_err(|e| anyhow::anyhow!("rendering {key} template: {e}"))?;
        Ok(SPACES.replace_all(&rendered, " ").trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn templates() -> SqlTemplates {
        SqlTemplates::new(SqlParams::new("public")).unwrap()
    }

    #[test]
    fn create_renders_both_tables() {
        let sql = templates().render("create").unwrap();
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS public.cnpj"));
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS public.meta"));
        assert!(sql.contains("cursor bigserial"));
        assert!(sql.contains("varchar(16) PRIMARY KEY"));
    }

    #[test]
    fn drop_is_guarded_by_if_exists() {
        let sql = templates().render("drop").unwrap();
        assert!(sql.contains("DROP TABLE IF EXISTS public.cnpj"));
        assert!(sql.contains("DROP TABLE IF EXISTS public.meta"));
    }

    #[test]
    fn bulk_insert_ignores_duplicate_ids() {
        let sql = templates().render("bulk_insert").unwrap();
        assert!(sql.contains("ON CONFLICT (id) DO NOTHING"));
        assert!(sql.contains("UNNEST($1::text[], $2::text[])"));
    }

    #[test]
    fn extra_index_parse_root_and_nested() {
        let root = ExtraIndex::parse("capital_social").unwrap();
        assert!(root.is_root);
        assert_eq!(root.path, "$.capital_social");
        assert_eq!(root.index_name, "idx_json_capital_social");

        let nested = ExtraIndex::parse("qsa.nome_socio").unwrap();
        assert!(!nested.is_root);
        assert_eq!(nested.path, "$.qsa[*].nome_socio");
        assert_eq!(nested.index_name, "idx_json_qsa_nome_socio");
    }

    #[test]
    fn extra_index_rejects_unsafe_names() {
        for bad in [
            "bogus;drop table x",
            "a.b.c",
            "UPPER",
            "1leading",
            "space name",
            "",
            ".dot",
            "trailing.",
        ] {
            let err = ExtraIndex::parse(bad).unwrap_err();
            assert!(
                matches!(err, RegistryError::Validation(_)),
                "expected validation error for {bad:?}"
            );
        }
    }

    #[test]
    fn extra_indexes_render_one_statement_per_index() {
        #[derive(Serialize)]
        struct Batch {
            indexes: Vec<ExtraIndex>,
        }
        let batch = Batch {
            indexes: vec![
                ExtraIndex::parse("capital_social").unwrap(),
                ExtraIndex::parse("qsa.nome_socio").unwrap(),
            ],
        };
        let sql = templates().render_with("extra_indexes", &batch).unwrap();
        assert!(sql.contains("CREATE INDEX IF NOT EXISTS idx_json_capital_social"));
        assert!(sql.contains("'$.capital_social'"));
        assert!(sql.contains("'$.qsa[*].nome_socio'"));
        assert_eq!(sql.matches("CREATE INDEX").count(), 2);
    }

    #[test]
    fn search_renders_numbered_binds_only() {
        #[derive(Serialize)]
        struct Ctx {
            filters: Vec<serde_json::Value>,
            cursor_param: Option<usize>,
            limit_param: usize,
        }
        let ctx = Ctx {
            filters: vec![
                serde_json::json!({"field": "uf", "param": 1}),
                serde_json::json!({"field": "porte", "param": 2}),
            ],
            cursor_param: Some(3),
            limit_param: 4,
        };
        let sql = templates().render_with("search", &ctx).unwrap();
        assert!(sql.contains("json::jsonb ->> 'uf' = $1"));
        assert!(sql.contains("json::jsonb ->> 'porte' = $2"));
        assert!(sql.contains("cursor > $3"));
        assert!(sql.contains("LIMIT $4"));
        assert!(sql.contains("ORDER BY cursor"));
    }

    #[test]
    fn search_without_cursor_omits_the_keyset_clause() {
        #[derive(Serialize)]
        struct Ctx {
            filters: Vec<serde_json::Value>,
            cursor_param: Option<usize>,
            limit_param: usize,
        }
        let ctx = Ctx {
            filters: vec![],
            cursor_param: None,
            limit_param: 1,
        };
        let sql = templates().render_with("search", &ctx).unwrap();
        assert!(!sql.contains('>'), "unexpected keyset clause in {sql}");
        assert!(sql.contains("LIMIT $1"));
    }

    #[test]
    fn filter_field_validation_is_root_only() {
        assert!(validate_filter_field("razao_social").is_ok());
        assert!(validate_filter_field("qsa.nome_socio").is_err());
        assert!(validate_filter_field("x; --").is_err());
    }

    #[test]
    fn unknown_template_key_errors() {
        assert!(templates().render("nope").is_err());
    }
}
