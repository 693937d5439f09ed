//! Statement templates.
//!
//! Statements are assembled from structured parts (target table, column
//! tokens, placeholder tokens, a filter clause) and rendered to text only
//! here, against a resolved [`ModelDescriptor`] and the active [`Dialect`].

use crate::descriptor::ModelDescriptor;
use crate::dialect::Dialect;

/// Marker name bound to a primary key value.
pub(crate) const ID_MARKER: &str = "id";
/// Marker name bound to the compared value of a single-field lookup.
pub(crate) const VALUE_MARKER: &str = "value";
/// Marker names bound to the paging window.
pub(crate) const LIMIT_MARKER: &str = "limit";
pub(crate) const OFFSET_MARKER: &str = "offset";

#[derive(Debug, Clone, Copy)]
pub(crate) enum Statement<'a> {
    /// Row count of the rows whose `column` equals `marker`.
    Exists { column: &'a str, marker: &'a str },
    Count { filter: &'a str },
    FindFirst,
    Find { filter: &'a str },
    PagedFind { filter: &'a str, order_by: &'a str },
    Insert {
        columns: &'a [String],
        placeholders: &'a [String],
    },
    Update {
        columns: &'a [String],
        placeholders: &'a [String],
    },
    Delete { filter: &'a str },
    DeleteById,
}

impl Statement<'_> {
    pub(crate) fn render(&self, desc: &ModelDescriptor, dialect: &Dialect) -> String {
        let table = desc.table_fully_qualified(dialect);
        let alias = dialect.quote(&desc.table_name);
        let from = format!("FROM {table} AS {alias}");
        let by_id = format!(
            "WHERE {} = {}",
            desc.primary_key_fully_qualified(dialect),
            dialect.marker(ID_MARKER)
        );

        match *self {
            Self::Exists { column, marker } => format!(
                "SELECT COUNT(*) {from} WHERE {} = {}",
                dialect.qualify(&desc.table_name, column),
                dialect.marker(marker)
            ),
            Self::Count { filter } => join(&["SELECT COUNT(*)", &from, filter]),
            Self::FindFirst => format!(
                "SELECT {} {from} {by_id} LIMIT 1",
                desc.columns_fully_qualified(dialect)
            ),
            Self::Find { filter } => join(&[
                "SELECT",
                &desc.columns_fully_qualified(dialect),
                &from,
                filter,
            ]),
            Self::PagedFind { filter, order_by } => join(&[
                "SELECT",
                &desc.columns_fully_qualified(dialect),
                &from,
                filter,
                "ORDER BY",
                order_by,
                &format!(
                    "LIMIT {} OFFSET {}",
                    dialect.marker(LIMIT_MARKER),
                    dialect.marker(OFFSET_MARKER)
                ),
            ]),
            Self::Insert {
                columns,
                placeholders,
            } => {
                let columns: Vec<String> = columns.iter().map(|c| dialect.quote(c)).collect();
                format!(
                    "INSERT INTO {table} ({}) VALUES ({})",
                    columns.join(", "),
                    placeholders.join(", ")
                )
            }
            Self::Update {
                columns,
                placeholders,
            } => {
                let assignments: Vec<String> = columns
                    .iter()
                    .zip(placeholders)
                    .map(|(c, p)| format!("{} = {p}", dialect.quote(c)))
                    .collect();
                format!(
                    "UPDATE {table} SET {} WHERE {} = {}",
                    assignments.join(", "),
                    dialect.quote(&desc.primary_key),
                    dialect.marker(ID_MARKER)
                )
            }
            Self::Delete { filter } => join(&["DELETE FROM", &table, filter]),
            Self::DeleteById => format!(
                "DELETE FROM {table} WHERE {} = {}",
                dialect.quote(&desc.primary_key),
                dialect.marker(ID_MARKER)
            ),
        }
    }
}

/// Joins the non-empty parts with single spaces.
fn join(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use std::any::TypeId;

    use super::*;
    use crate::config::Quoting;

    fn order() -> ModelDescriptor {
        ModelDescriptor {
            entity_type: TypeId::of::<()>(),
            entity_name: "Order",
            table_name: "Order".to_string(),
            schema_name: "main".to_string(),
            primary_key: "OrderID".to_string(),
            columns: vec!["OrderID".to_string(), "Status".to_string()],
        }
    }

    fn dialect() -> Dialect {
        Dialect::new(Quoting::default()).unwrap()
    }

    #[test]
    fn test_exists_by_primary_key() {
        let sql = Statement::Exists {
            column: "OrderID",
            marker: ID_MARKER,
        }
        .render(&order(), &dialect());
        assert_eq!(
            sql,
            r#"SELECT COUNT(*) FROM "main"."Order" AS "Order" WHERE "Order"."OrderID" = @id"#
        );
    }

    #[test]
    fn test_count_without_filter() {
        let sql = Statement::Count { filter: "" }.render(&order(), &dialect());
        assert_eq!(sql, r#"SELECT COUNT(*) FROM "main"."Order" AS "Order""#);
    }

    #[test]
    fn test_find_first_and_find() {
        let d = dialect();
        let first = Statement::FindFirst.render(&order(), &d);
        assert_eq!(
            first,
            r#"SELECT "Order"."OrderID", "Order"."Status" FROM "main"."Order" AS "Order" WHERE "Order"."OrderID" = @id LIMIT 1"#
        );

        let find = Statement::Find {
            filter: "WHERE Status = @p0",
        }
        .render(&order(), &d);
        assert!(find.ends_with(r#"AS "Order" WHERE Status = @p0"#));
    }

    #[test]
    fn test_paged_find_binds_window() {
        let sql = Statement::PagedFind {
            filter: "",
            order_by: "\"OrderID\"",
        }
        .render(&order(), &dialect());
        assert!(sql.ends_with(r#"ORDER BY "OrderID" LIMIT @limit OFFSET @offset"#));
    }

    #[test]
    fn test_insert_and_update() {
        let d = Dialect::new(Quoting::brackets()).unwrap();
        let columns = vec!["Status".to_string(), "Priority".to_string()];
        let placeholders = vec!["@val0".to_string(), "@val1".to_string()];

        let insert = Statement::Insert {
            columns: &columns,
            placeholders: &placeholders,
        }
        .render(&order(), &d);
        assert_eq!(
            insert,
            "INSERT INTO [main].[Order] ([Status], [Priority]) VALUES (@val0, @val1)"
        );

        let update = Statement::Update {
            columns: &columns,
            placeholders: &placeholders,
        }
        .render(&order(), &d);
        assert_eq!(
            update,
            "UPDATE [main].[Order] SET [Status] = @val0, [Priority] = @val1 WHERE [OrderID] = @id"
        );
    }

    #[test]
    fn test_delete_variants() {
        let d = dialect();
        assert_eq!(
            Statement::Delete { filter: "" }.render(&order(), &d),
            r#"DELETE FROM "main"."Order""#
        );
        assert_eq!(
            Statement::DeleteById.render(&order(), &d),
            r#"DELETE FROM "main"."Order" WHERE "OrderID" = @id"#
        );
    }
}
