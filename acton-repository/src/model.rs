//! Models, table metadata and relation descriptors
//!
//! A [`Model`] is any serde row type bound to a table. Repositories never look
//! at model fields directly: rows travel as [`Record`]s and are hydrated into
//! the model at the end of a terminal operation.
//!
//! # Example
//!
//! ```rust
//! use acton_repository::model::{Model, Relation};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Post {
//!     id: Option<i64>,
//!     title: String,
//! }
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Comment {
//!     id: Option<i64>,
//!     post_id: i64,
//! }
//!
//! impl Model for Post {
//!     const TABLE: &'static str = "posts";
//!     const SOFT_DELETES: bool = true;
//!
//!     fn relations() -> Vec<Relation> {
//!         vec![Relation::has_many::<Comment>("comments", "post_id")]
//!     }
//! }
//!
//! impl Model for Comment {
//!     const TABLE: &'static str = "comments";
//! }
//! ```

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::query::FilterValue;

/// A stored row: column name to JSON value
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Column values for writes and equality maps, ordered by column name
pub type Attributes = BTreeMap<String, FilterValue>;

/// Column holding the creation timestamp
pub const CREATED_AT: &str = "created_at";

/// Column holding the last update timestamp
pub const UPDATED_AT: &str = "updated_at";

/// Column holding the soft-delete timestamp
pub const DELETED_AT: &str = "deleted_at";

/// Build an [`Attributes`] map from column/value pairs
///
/// ```rust
/// use acton_repository::model::attributes;
/// use acton_repository::query::FilterValue;
///
/// let attrs = attributes([("status", "active"), ("kind", "post")]);
/// assert_eq!(attrs["status"], FilterValue::from("active"));
/// ```
pub fn attributes<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Attributes
where
    K: Into<String>,
    V: Into<FilterValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// A row type bound to a table
///
/// Models must deserialize from partial rows (for `first_or_new`) and from
/// rows carrying extra columns (eager loads, relation counts); serde defaults
/// on optional fields cover both.
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Table name
    const TABLE: &'static str;

    /// Primary key column
    const PRIMARY_KEY: &'static str = "id";

    /// Whether deletes set `deleted_at` instead of removing the row
    const SOFT_DELETES: bool = false;

    /// Whether writes maintain `created_at` / `updated_at`
    const TIMESTAMPS: bool = true;

    /// Default page size for pagination
    const PER_PAGE: u64 = 15;

    /// Relations reachable from this model
    fn relations() -> Vec<Relation> {
        Vec::new()
    }
}

/// Static description of a model's table
#[derive(Debug, Clone, Copy)]
pub struct TableMeta {
    /// Table name
    pub table: &'static str,
    /// Primary key column
    pub primary_key: &'static str,
    /// Whether the table uses soft deletes
    pub soft_deletes: bool,
    /// Whether writes maintain timestamps
    pub timestamps: bool,
    /// Default page size
    pub per_page: u64,
    relations: fn() -> Vec<Relation>,
}

impl TableMeta {
    /// Metadata for a model type
    pub fn of<M: Model>() -> Self {
        Self {
            table: M::TABLE,
            primary_key: M::PRIMARY_KEY,
            soft_deletes: M::SOFT_DELETES,
            timestamps: M::TIMESTAMPS,
            per_page: M::PER_PAGE,
            relations: M::relations,
        }
    }

    /// All relations declared by the model
    pub fn relations(&self) -> Vec<Relation> {
        (self.relations)()
    }

    /// Look a relation up by name
    pub fn relation(&self, name: &str) -> Result<Relation> {
        self.relations()
            .into_iter()
            .find(|r| r.name == name)
            .ok_or_else(|| Error::RelationNotFound {
                table: self.table.to_string(),
                relation: name.to_string(),
            })
    }
}

/// Kind of relation, with the keys that link the two tables
#[derive(Debug, Clone)]
pub enum RelationKind {
    /// `related.foreign_key = parent.local_key`, many rows
    HasMany {
        /// Related table
        related: TableMeta,
        /// Column on the related table
        foreign_key: String,
        /// Column on the parent table
        local_key: String,
    },
    /// `related.foreign_key = parent.local_key`, at most one row
    HasOne {
        /// Related table
        related: TableMeta,
        /// Column on the related table
        foreign_key: String,
        /// Column on the parent table
        local_key: String,
    },
    /// `parent.foreign_key = related.owner_key`
    BelongsTo {
        /// Related table
        related: TableMeta,
        /// Column on the parent table
        foreign_key: String,
        /// Column on the related table
        owner_key: String,
    },
    /// Polymorphic children: `related.{morph}_id = parent.local_key` and
    /// `related.{morph}_type = parent table`
    MorphMany {
        /// Related table
        related: TableMeta,
        /// Type column on the related table
        morph_type: String,
        /// Id column on the related table
        morph_id: String,
        /// Column on the parent table
        local_key: String,
    },
    /// Polymorphic owner: `parent.{morph}_type` names one of `targets`,
    /// `parent.{morph}_id` holds its primary key
    MorphTo {
        /// Type column on the parent table
        morph_type: String,
        /// Id column on the parent table
        morph_id: String,
        /// Candidate owner tables
        targets: Vec<TableMeta>,
    },
}

/// A named relation declared by a model
#[derive(Debug, Clone)]
pub struct Relation {
    /// Relation name used by `with`, `has`, `where_has`, ...
    pub name: String,
    /// How the tables are linked
    pub kind: RelationKind,
}

/// One concrete link between a parent row and a related table
///
/// Plain relations resolve to a single join; `MorphTo` resolves to one join
/// per candidate owner table.
#[derive(Debug, Clone)]
pub struct RelationJoin {
    /// Table holding the related rows
    pub related: TableMeta,
    /// Column on the related table
    pub related_key: String,
    /// Column on the parent table
    pub parent_key: String,
    /// `(column, value)` the related row must carry
    pub related_type: Option<(String, String)>,
    /// `(column, value)` the parent row must carry
    pub parent_type: Option<(String, String)>,
}

impl Relation {
    /// One-to-many relation keyed by `foreign_key` on the related table
    pub fn has_many<R: Model>(name: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RelationKind::HasMany {
                related: TableMeta::of::<R>(),
                foreign_key: foreign_key.into(),
                local_key: "id".to_string(),
            },
        }
    }

    /// One-to-one relation keyed by `foreign_key` on the related table
    pub fn has_one<R: Model>(name: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RelationKind::HasOne {
                related: TableMeta::of::<R>(),
                foreign_key: foreign_key.into(),
                local_key: "id".to_string(),
            },
        }
    }

    /// Inverse relation keyed by `foreign_key` on this table
    pub fn belongs_to<R: Model>(name: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RelationKind::BelongsTo {
                related: TableMeta::of::<R>(),
                foreign_key: foreign_key.into(),
                owner_key: R::PRIMARY_KEY.to_string(),
            },
        }
    }

    /// Polymorphic one-to-many relation using `{morph_name}_type` /
    /// `{morph_name}_id` on the related table
    pub fn morph_many<R: Model>(name: impl Into<String>, morph_name: &str) -> Self {
        Self {
            name: name.into(),
            kind: RelationKind::MorphMany {
                related: TableMeta::of::<R>(),
                morph_type: format!("{}_type", morph_name),
                morph_id: format!("{}_id", morph_name),
                local_key: "id".to_string(),
            },
        }
    }

    /// Polymorphic owner relation using `{name}_type` / `{name}_id` on this
    /// table
    pub fn morph_to(name: impl Into<String>, targets: Vec<TableMeta>) -> Self {
        let name = name.into();
        Self {
            kind: RelationKind::MorphTo {
                morph_type: format!("{}_type", name),
                morph_id: format!("{}_id", name),
                targets,
            },
            name,
        }
    }

    /// Override the parent-side key of a `HasMany`, `HasOne` or `MorphMany`
    #[must_use]
    pub fn local_key(mut self, key: impl Into<String>) -> Self {
        match &mut self.kind {
            RelationKind::HasMany { local_key, .. }
            | RelationKind::HasOne { local_key, .. }
            | RelationKind::MorphMany { local_key, .. } => *local_key = key.into(),
            RelationKind::BelongsTo { .. } | RelationKind::MorphTo { .. } => {}
        }
        self
    }

    /// Whether eager loading yields a list rather than a single row
    pub fn is_many(&self) -> bool {
        matches!(
            self.kind,
            RelationKind::HasMany { .. } | RelationKind::MorphMany { .. }
        )
    }

    /// Resolve the joins this relation needs from `parent`
    ///
    /// `morph_types` restricts `MorphTo` targets to the named tables; `*`
    /// or `None` keeps every target. Other kinds ignore it.
    pub fn joins(&self, parent: &TableMeta, morph_types: Option<&[String]>) -> Vec<RelationJoin> {
        match &self.kind {
            RelationKind::HasMany {
                related,
                foreign_key,
                local_key,
            }
            | RelationKind::HasOne {
                related,
                foreign_key,
                local_key,
            } => vec![RelationJoin {
                related: *related,
                related_key: foreign_key.clone(),
                parent_key: local_key.clone(),
                related_type: None,
                parent_type: None,
            }],
            RelationKind::BelongsTo {
                related,
                foreign_key,
                owner_key,
            } => vec![RelationJoin {
                related: *related,
                related_key: owner_key.clone(),
                parent_key: foreign_key.clone(),
                related_type: None,
                parent_type: None,
            }],
            RelationKind::MorphMany {
                related,
                morph_type,
                morph_id,
                local_key,
            } => vec![RelationJoin {
                related: *related,
                related_key: morph_id.clone(),
                parent_key: local_key.clone(),
                related_type: Some((morph_type.clone(), parent.table.to_string())),
                parent_type: None,
            }],
            RelationKind::MorphTo {
                morph_type,
                morph_id,
                targets,
            } => {
                let wanted = |table: &str| match morph_types {
                    None => true,
                    Some(types) => types.iter().any(|t| t == "*" || t == table),
                };
                targets
                    .iter()
                    .filter(|target| wanted(target.table))
                    .map(|target| RelationJoin {
                        related: *target,
                        related_key: target.primary_key.to_string(),
                        parent_key: morph_id.clone(),
                        related_type: None,
                        parent_type: Some((morph_type.clone(), target.table.to_string())),
                    })
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Post {
        id: Option<i64>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Video {
        id: Option<i64>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Comment {
        id: Option<i64>,
    }

    impl Model for Post {
        const TABLE: &'static str = "posts";
        const SOFT_DELETES: bool = true;

        fn relations() -> Vec<Relation> {
            vec![
                Relation::has_many::<Comment>("comments", "post_id"),
                Relation::morph_many::<Comment>("notes", "commentable"),
            ]
        }
    }

    impl Model for Video {
        const TABLE: &'static str = "videos";
    }

    impl Model for Comment {
        const TABLE: &'static str = "comments";

        fn relations() -> Vec<Relation> {
            vec![
                Relation::belongs_to::<Post>("post", "post_id"),
                Relation::morph_to(
                    "commentable",
                    vec![TableMeta::of::<Post>(), TableMeta::of::<Video>()],
                ),
            ]
        }
    }

    #[test]
    fn test_table_meta_reads_model_constants() {
        let meta = TableMeta::of::<Post>();
        assert_eq!(meta.table, "posts");
        assert_eq!(meta.primary_key, "id");
        assert!(meta.soft_deletes);
        assert!(meta.timestamps);
        assert_eq!(meta.per_page, 15);
        assert_eq!(meta.relations().len(), 2);
    }

    #[test]
    fn test_unknown_relation_is_an_error() {
        let err = TableMeta::of::<Post>().relation("likes").unwrap_err();
        assert!(matches!(err, Error::RelationNotFound { ref relation, .. } if relation == "likes"));
    }

    #[test]
    fn test_has_many_join() {
        let meta = TableMeta::of::<Post>();
        let joins = meta.relation("comments").unwrap().joins(&meta, None);
        assert_eq!(joins.len(), 1);
        assert_eq!(joins[0].related.table, "comments");
        assert_eq!(joins[0].related_key, "post_id");
        assert_eq!(joins[0].parent_key, "id");
    }

    #[test]
    fn test_belongs_to_join_uses_parent_foreign_key() {
        let meta = TableMeta::of::<Comment>();
        let joins = meta.relation("post").unwrap().joins(&meta, None);
        assert_eq!(joins[0].related_key, "id");
        assert_eq!(joins[0].parent_key, "post_id");
    }

    #[test]
    fn test_morph_many_join_carries_parent_table() {
        let meta = TableMeta::of::<Post>();
        let joins = meta.relation("notes").unwrap().joins(&meta, None);
        assert_eq!(joins[0].related_key, "commentable_id");
        assert_eq!(
            joins[0].related_type,
            Some(("commentable_type".to_string(), "posts".to_string()))
        );
    }

    #[test]
    fn test_morph_to_joins_filter_by_type() {
        let meta = TableMeta::of::<Comment>();
        let relation = meta.relation("commentable").unwrap();
        assert_eq!(relation.joins(&meta, None).len(), 2);

        let only_videos = vec!["videos".to_string()];
        let joins = relation.joins(&meta, Some(&only_videos));
        assert_eq!(joins.len(), 1);
        assert_eq!(joins[0].related.table, "videos");
        assert_eq!(
            joins[0].parent_type,
            Some(("commentable_type".to_string(), "videos".to_string()))
        );

        let everything = vec!["*".to_string()];
        assert_eq!(relation.joins(&meta, Some(&everything)).len(), 2);
    }

    #[test]
    fn test_attributes_helper_orders_columns() {
        let attrs = attributes([("b", 2_i64), ("a", 1_i64)]);
        let columns: Vec<_> = attrs.keys().cloned().collect();
        assert_eq!(columns, vec!["a", "b"]);
    }
}
