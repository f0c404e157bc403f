//! Catalog row normalization.
//!
//! Backends decode their catalog queries into the flat `Catalog*` rows below;
//! the functions here assemble them into the normalized schema model.

use std::collections::HashMap;

use crate::traits::{ColumnInfo, ForeignKeyInfo, IndexInfo, TableInfo};

/// One row of a column listing, in ordinal order.
#[derive(Debug, Clone, Default)]
pub struct CatalogColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub is_primary_key: bool,
    pub is_auto_increment: bool,
}

impl From<CatalogColumn> for ColumnInfo {
    fn from(col: CatalogColumn) -> Self {
        ColumnInfo {
            name: col.name,
            data_type: col.data_type,
            nullable: col.nullable,
            default_value: col.default_value,
            is_primary_key: col.is_primary_key,
            is_auto_increment: col.is_auto_increment,
        }
    }
}

/// One (index, column) membership row, ordered by index name then key sequence.
#[derive(Debug, Clone)]
pub struct CatalogIndexColumn {
    pub index_name: String,
    pub column_name: String,
    pub is_unique: bool,
}

/// One foreign key column reference.
#[derive(Debug, Clone)]
pub struct CatalogForeignKey {
    pub constraint_name: String,
    pub column_name: String,
    pub referenced_table: Option<String>,
    pub referenced_column: Option<String>,
}

/// Group index membership rows into one `IndexInfo` per index.
///
/// Indexes appear in the order their name is first seen; columns keep the
/// order of the input rows. Uniqueness is taken from the first row of an
/// index.
pub fn fold_indexes(rows: impl IntoIterator<Item = CatalogIndexColumn>) -> Vec<IndexInfo> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut indexes: Vec<IndexInfo> = Vec::new();

    for row in rows {
        match positions.get(&row.index_name) {
            Some(&pos) => indexes[pos].columns.push(row.column_name),
            None => {
                positions.insert(row.index_name.clone(), indexes.len());
                indexes.push(IndexInfo {
                    name: row.index_name,
                    columns: vec![row.column_name],
                    is_unique: row.is_unique,
                });
            }
        }
    }

    indexes
}

/// Keep foreign key rows that actually reference a table.
pub fn collect_foreign_keys(
    rows: impl IntoIterator<Item = CatalogForeignKey>,
) -> Vec<ForeignKeyInfo> {
    rows.into_iter()
        .filter_map(|row| {
            let referenced_table = row.referenced_table?;
            Some(ForeignKeyInfo {
                name: row.constraint_name,
                column: row.column_name,
                referenced_table,
                referenced_column: row.referenced_column.unwrap_or_default(),
            })
        })
        .collect()
}

/// Compose the three per-table catalog listings into one `TableInfo`.
pub fn build_table_info(
    name: &str,
    columns: Vec<CatalogColumn>,
    indexes: Vec<CatalogIndexColumn>,
    foreign_keys: Vec<CatalogForeignKey>,
) -> TableInfo {
    TableInfo {
        name: name.to_string(),
        columns: columns.into_iter().map(ColumnInfo::from).collect(),
        indexes: fold_indexes(indexes),
        foreign_keys: collect_foreign_keys(foreign_keys),
    }
}
