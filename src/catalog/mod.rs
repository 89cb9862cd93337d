//! Name-to-id resolution, metadata persistence, and the single
//! choke-point through which DML keeps every index on a table in sync
//! with its heap.

pub mod meta;

use crate::btree::{key, BPlusTree};
use crate::buffer::BufferPool;
use crate::disk::PageId;
use crate::error::{DbError, DbResult, ErrorKind};
use crate::heap::{TableHeap, UpdateResult};
use crate::record::{Row, RowId, Schema, TypeId};
use meta::{CatalogMeta, IndexMeta, TableMeta};
use std::collections::HashMap;
use std::io::Cursor;

pub struct TableInfo {
    pub id: u32,
    pub name: String,
    pub schema: Schema,
    pub primary_key_columns: Vec<usize>,
    pub heap: TableHeap,
    meta_page_id: PageId,
}

pub struct IndexInfo {
    pub id: u32,
    pub name: String,
    pub table_id: u32,
    pub key_map: Vec<usize>,
    pub tree: BPlusTree,
    meta_page_id: PageId,
    primary: bool,
}

fn load_page<T: crate::codec::Decodeable>(pool: &BufferPool, page_id: PageId) -> T {
    let guard = pool
        .fetch_page(page_id)
        .expect("i/o error reading a catalog page")
        .expect("catalog page must be fetchable while the catalog is open");
    let bytes = guard.bytes();
    let mut cursor = Cursor::new(&bytes[..]);
    T::decode_from(&mut cursor)
}

fn store_page<T: crate::codec::Encodeable>(pool: &BufferPool, page_id: PageId, value: &T) {
    let mut guard = pool
        .fetch_page(page_id)
        .expect("i/o error writing a catalog page")
        .expect("catalog page must be fetchable while the catalog is open");
    let bytes = value.encode();
    guard.bytes_mut()[..bytes.len()].copy_from_slice(&bytes);
}

pub struct Catalog {
    pool: BufferPool,
    meta_page_id: PageId,
    next_table_id: u32,
    next_index_id: u32,
    tables: HashMap<String, TableInfo>,
    indexes: HashMap<String, IndexInfo>,
}

impl Catalog {
    /// Allocates and initializes a fresh, empty catalog.
    pub fn create(pool: BufferPool) -> DbResult<Self> {
        let guard = pool
            .new_page()?
            .expect("buffer pool must have room to create the catalog");
        let meta_page_id = guard.page_id();
        drop(guard);
        let catalog = Self {
            pool,
            meta_page_id,
            next_table_id: 0,
            next_index_id: 0,
            tables: HashMap::new(),
            indexes: HashMap::new(),
        };
        catalog.persist_catalog_meta();
        Ok(catalog)
    }

    /// Restores a catalog from a previously-persisted meta page,
    /// reopening every table heap and index tree it references.
    pub fn open(pool: BufferPool, meta_page_id: PageId) -> DbResult<Self> {
        let catalog_meta: CatalogMeta = load_page(&pool, meta_page_id);

        let mut tables = HashMap::new();
        for &(id, table_meta_page_id) in &catalog_meta.tables {
            let tm: TableMeta = load_page(&pool, table_meta_page_id);
            let heap = TableHeap::open(pool.clone(), tm.first_page_id);
            tables.insert(
                tm.name.clone(),
                TableInfo {
                    id,
                    name: tm.name,
                    schema: tm.schema,
                    primary_key_columns: tm.primary_key_columns.iter().map(|&c| c as usize).collect(),
                    heap,
                    meta_page_id: table_meta_page_id,
                },
            );
        }

        let mut indexes = HashMap::new();
        for &(id, index_meta_page_id) in &catalog_meta.indexes {
            let im: IndexMeta = load_page(&pool, index_meta_page_id);
            let key_map: Vec<usize> = im.key_map.iter().map(|&c| c as usize).collect();
            let key_types: Vec<TypeId> = {
                let owner = tables
                    .values()
                    .find(|t| t.id == im.table_id)
                    .expect("index references a table missing from the catalog");
                key_map.iter().map(|&c| owner.schema.column(c).type_id).collect()
            };
            let tree = BPlusTree::open(pool.clone(), key_types, im.key_width as usize, im.root_page_id);
            indexes.insert(
                im.name.clone(),
                IndexInfo {
                    id,
                    table_id: im.table_id,
                    name: im.name.clone(),
                    key_map,
                    tree,
                    meta_page_id: index_meta_page_id,
                    primary: im.name.contains("_PK_"),
                },
            );
        }

        Ok(Self {
            pool,
            meta_page_id,
            next_table_id: catalog_meta.next_table_id,
            next_index_id: catalog_meta.next_index_id,
            tables,
            indexes,
        })
    }

    fn persist_catalog_meta(&self) {
        let meta = CatalogMeta {
            tables: self.tables.values().map(|t| (t.id, t.meta_page_id)).collect(),
            indexes: self.indexes.values().map(|i| (i.id, i.meta_page_id)).collect(),
            next_table_id: self.next_table_id,
            next_index_id: self.next_index_id,
        };
        store_page(&self.pool, self.meta_page_id, &meta);
    }

    fn persist_index_meta(&self, idx: &IndexInfo) {
        let meta = IndexMeta {
            index_id: idx.id,
            name: idx.name.clone(),
            table_id: idx.table_id,
            key_map: idx.key_map.iter().map(|&c| c as u32).collect(),
            key_width: idx.tree.key_width() as u32,
            root_page_id: idx.tree.root_page_id(),
        };
        store_page(&self.pool, idx.meta_page_id, &meta);
    }

    fn table_indexes(&self, table_id: u32) -> impl Iterator<Item = &IndexInfo> {
        self.indexes.values().filter(move |i| i.table_id == table_id)
    }

    pub fn get_table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(name)
    }

    pub fn get_tables(&self) -> impl Iterator<Item = &TableInfo> {
        self.tables.values()
    }

    pub fn get_index(&self, name: &str) -> Option<&IndexInfo> {
        self.indexes.get(name)
    }

    pub fn get_all_indexes(&self) -> impl Iterator<Item = &IndexInfo> {
        self.indexes.values()
    }

    pub fn get_table_indexes(&self, table_name: &str) -> Vec<&IndexInfo> {
        match self.tables.get(table_name) {
            Some(t) => self.table_indexes(t.id).collect(),
            None => Vec::new(),
        }
    }

    /// Every index on `table_name` whose key-map equals `key_map`,
    /// order included — the signal the executor uses to recognize an
    /// exact-match index opportunity.
    pub fn get_indexes_for_key_map(&self, table_name: &str, key_map: &[usize]) -> Vec<&IndexInfo> {
        self.get_table_indexes(table_name)
            .into_iter()
            .filter(|i| i.key_map == key_map)
            .collect()
    }

    pub fn create_table(&mut self, name: &str, schema: Schema, primary_key_columns: Vec<usize>) -> DbResult<()> {
        if self.tables.contains_key(name) {
            return Err(DbError::new(ErrorKind::TableAlreadyExists, name));
        }
        let table_id = self.next_table_id;
        self.next_table_id += 1;

        let heap = TableHeap::create(self.pool.clone())?;
        let first_page_id = heap.first_page_id();
        let meta_page_id = self
            .pool
            .new_page()?
            .expect("buffer pool must have room for a table's metadata page")
            .page_id();

        let meta = TableMeta {
            table_id,
            name: name.to_string(),
            first_page_id,
            primary_key_columns: primary_key_columns.iter().map(|&c| c as u32).collect(),
            schema: schema.clone(),
        };
        store_page(&self.pool, meta_page_id, &meta);

        self.tables.insert(
            name.to_string(),
            TableInfo {
                id: table_id,
                name: name.to_string(),
                schema: schema.clone(),
                primary_key_columns: primary_key_columns.clone(),
                heap,
                meta_page_id,
            },
        );
        self.persist_catalog_meta();
        log::info!("created table '{}' (id {})", name, table_id);

        if !primary_key_columns.is_empty() {
            let pk_name = format!("_{}_PK_", name);
            self.create_index_internal(name, &pk_name, &primary_key_columns, true)?;
        }
        let unique_columns: Vec<(usize, String)> = schema
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.unique)
            .map(|(i, c)| (i, c.name.clone()))
            .collect();
        for (col_index, col_name) in unique_columns {
            let idx_name = format!("_{}_UNI_{}_", name, col_name);
            self.create_index_internal(name, &idx_name, &[col_index], true)?;
        }
        Ok(())
    }

    /// Validates and creates a user-requested secondary index. Columns
    /// must already be known unique (primary-key set, a `UNIQUE`
    /// column) or provably unique over the table's current contents,
    /// in which case they're promoted to `UNIQUE` in the schema.
    pub fn create_index(&mut self, table_name: &str, index_name: &str, columns: &[usize]) -> DbResult<()> {
        if self.indexes.contains_key(index_name) {
            return Err(DbError::new(ErrorKind::IndexAlreadyExists, index_name));
        }
        let (schema, pk_columns) = {
            let table = self
                .tables
                .get(table_name)
                .ok_or_else(|| DbError::new(ErrorKind::TableNotExist, table_name))?;
            (table.schema.clone(), table.primary_key_columns.clone())
        };
        for &c in columns {
            if c >= schema.len() {
                return Err(DbError::new(ErrorKind::ColumnNameNotExist, format!("column index {}", c)));
            }
        }

        let mut sorted_given = columns.to_vec();
        sorted_given.sort_unstable();
        let mut sorted_pk = pk_columns.clone();
        sorted_pk.sort_unstable();
        let matches_pk = sorted_given == sorted_pk;
        let has_unique_column = columns.iter().any(|&c| schema.column(c).unique);

        if !matches_pk && !has_unique_column {
            if !self.is_column_set_unique(table_name, columns)? {
                return Err(DbError::new(
                    ErrorKind::ColumnNotUnique,
                    "index columns are not known or provably unique",
                ));
            }
            self.mark_columns_unique(table_name, columns);
        }

        self.create_index_internal(table_name, index_name, columns, true)
    }

    fn is_column_set_unique(&self, table_name: &str, columns: &[usize]) -> DbResult<bool> {
        let table = self
            .tables
            .get(table_name)
            .ok_or_else(|| DbError::new(ErrorKind::TableNotExist, table_name))?;
        let width = key::smallest_width(key::max_key_bytes(
            &columns.iter().map(|&c| table.schema.column(c).type_id).collect::<Vec<_>>(),
        ));
        let mut seen = std::collections::HashSet::new();
        for (_, row) in table.heap.iter(table.schema.clone()) {
            let packed = key::pack(&row.project(columns), width);
            if !seen.insert(packed) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn mark_columns_unique(&mut self, table_name: &str, columns: &[usize]) {
        if let Some(table) = self.tables.get_mut(table_name) {
            let mut schema = table.schema.clone();
            for &c in columns {
                let mut updated = schema.column(c).clone();
                updated.unique = true;
                let mut all = schema.columns().to_vec();
                all[c] = updated;
                schema = Schema::new(all);
            }
            table.schema = schema.clone();
            let meta = TableMeta {
                table_id: table.id,
                name: table.name.clone(),
                first_page_id: table.heap.first_page_id(),
                primary_key_columns: table.primary_key_columns.iter().map(|&c| c as u32).collect(),
                schema,
            };
            store_page(&self.pool, table.meta_page_id, &meta);
        }
    }

    fn create_index_internal(
        &mut self,
        table_name: &str,
        index_name: &str,
        key_map: &[usize],
        populate: bool,
    ) -> DbResult<()> {
        let (table_id, key_types, rows): (u32, Vec<TypeId>, Vec<(RowId, Row)>) = {
            let table = self
                .tables
                .get(table_name)
                .ok_or_else(|| DbError::new(ErrorKind::TableNotExist, table_name))?;
            let key_types = key_map.iter().map(|&c| table.schema.column(c).type_id).collect();
            let rows = if populate {
                table.heap.iter(table.schema.clone()).collect()
            } else {
                Vec::new()
            };
            (table.id, key_types, rows)
        };

        let tree = BPlusTree::create(self.pool.clone(), key_types);
        for (rid, row) in &rows {
            let packed = key::pack(&row.project(key_map), tree.key_width());
            tree.insert(&packed, *rid);
        }

        let index_id = self.next_index_id;
        self.next_index_id += 1;
        let meta_page_id = self
            .pool
            .new_page()?
            .expect("buffer pool must have room for an index's metadata page")
            .page_id();

        let info = IndexInfo {
            id: index_id,
            name: index_name.to_string(),
            table_id,
            key_map: key_map.to_vec(),
            tree,
            meta_page_id,
            primary: index_name.contains("_PK_"),
        };
        self.persist_index_meta(&info);
        self.indexes.insert(index_name.to_string(), info);
        self.persist_catalog_meta();
        log::info!("created index '{}' on table '{}' (columns {:?})", index_name, table_name, key_map);
        Ok(())
    }

    pub fn drop_table(&mut self, name: &str) -> DbResult<()> {
        let table = self
            .tables
            .remove(name)
            .ok_or_else(|| DbError::new(ErrorKind::TableNotExist, name))?;
        let index_names: Vec<String> = self.table_indexes(table.id).map(|i| i.name.clone()).collect();
        for index_name in index_names {
            self.drop_index_by_name(&index_name)?;
        }
        table.heap.free_heap()?;
        self.pool.delete_page(table.meta_page_id)?;
        self.persist_catalog_meta();
        log::info!("dropped table '{}' (id {})", name, table.id);
        Ok(())
    }

    pub fn drop_index(&mut self, table_name: &str, name: &str) -> DbResult<()> {
        match self.indexes.get(name) {
            Some(idx) if self.tables.get(table_name).map(|t| t.id) == Some(idx.table_id) => {
                self.drop_index_by_name(name)
            }
            Some(_) => Err(DbError::new(ErrorKind::IndexNotFound, name)),
            None => Err(DbError::new(ErrorKind::IndexNotFound, name)),
        }
    }

    /// Cascades across every table containing an index of this name —
    /// in this catalog index names are globally unique, so this is
    /// just the one entry.
    pub fn drop_index_by_name(&mut self, name: &str) -> DbResult<()> {
        let idx = self
            .indexes
            .remove(name)
            .ok_or_else(|| DbError::new(ErrorKind::IndexNotFound, name))?;
        idx.tree.free_all();
        self.pool.delete_page(idx.meta_page_id)?;
        self.persist_catalog_meta();
        log::info!("dropped index '{}'", name);
        Ok(())
    }

    pub fn insert(&self, table_name: &str, row: &Row) -> DbResult<RowId> {
        let table = self
            .tables
            .get(table_name)
            .ok_or_else(|| DbError::new(ErrorKind::TableNotExist, table_name))?;

        for idx in self.table_indexes(table.id) {
            let packed = key::pack(&row.project(&idx.key_map), idx.tree.key_width());
            if idx.tree.get_value(&packed).is_some() {
                let kind = if idx.primary { ErrorKind::PkDuplicate } else { ErrorKind::UniKeyDuplicate };
                return Err(DbError::new(kind, &idx.name));
            }
        }

        let rid = table
            .heap
            .insert_tuple(row)?
            .ok_or_else(|| DbError::new(ErrorKind::TupleTooLarge, table_name))?;

        for idx in self.table_indexes(table.id) {
            let packed = key::pack(&row.project(&idx.key_map), idx.tree.key_width());
            idx.tree.insert(&packed, rid);
            self.persist_index_meta(idx);
        }
        Ok(rid)
    }

    pub fn update(&self, table_name: &str, old_rid: RowId, new_row: &Row) -> DbResult<RowId> {
        let table = self
            .tables
            .get(table_name)
            .ok_or_else(|| DbError::new(ErrorKind::TableNotExist, table_name))?;
        let old_row = table
            .heap
            .get_tuple(old_rid, &table.schema)?
            .ok_or_else(|| DbError::failed("row to update no longer exists"))?;

        for idx in self.table_indexes(table.id) {
            let old_key = key::pack(&old_row.project(&idx.key_map), idx.tree.key_width());
            let new_key = key::pack(&new_row.project(&idx.key_map), idx.tree.key_width());
            if old_key != new_key && idx.tree.get_value(&new_key).is_some() {
                let kind = if idx.primary { ErrorKind::PkDuplicate } else { ErrorKind::UniKeyDuplicate };
                return Err(DbError::new(kind, &idx.name));
            }
        }

        let new_rid = match table.heap.update_tuple(new_row, old_rid)? {
            UpdateResult::Ok => old_rid,
            UpdateResult::NoSpace => {
                table.heap.mark_delete(old_rid)?;
                table.heap.apply_delete(old_rid)?;
                table
                    .heap
                    .insert_tuple(new_row)?
                    .ok_or_else(|| DbError::new(ErrorKind::TupleTooLarge, table_name))?
            }
            UpdateResult::SlotInvalid | UpdateResult::AlreadyDeleted => {
                return Err(DbError::failed("row to update no longer exists"));
            }
        };

        for idx in self.table_indexes(table.id) {
            let old_key = key::pack(&old_row.project(&idx.key_map), idx.tree.key_width());
            let new_key = key::pack(&new_row.project(&idx.key_map), idx.tree.key_width());
            if old_key != new_key || new_rid != old_rid {
                idx.tree.remove(&old_key);
                idx.tree.insert(&new_key, new_rid);
                self.persist_index_meta(idx);
            }
        }
        Ok(new_rid)
    }

    pub fn delete(&self, table_name: &str, rid: RowId) -> DbResult<()> {
        let table = self
            .tables
            .get(table_name)
            .ok_or_else(|| DbError::new(ErrorKind::TableNotExist, table_name))?;
        let row = table
            .heap
            .get_tuple(rid, &table.schema)?
            .ok_or_else(|| DbError::failed("row to delete no longer exists"))?;

        table.heap.mark_delete(rid)?;
        table.heap.apply_delete(rid)?;

        for idx in self.table_indexes(table.id) {
            let packed = key::pack(&row.project(&idx.key_map), idx.tree.key_width());
            idx.tree.remove(&packed);
            self.persist_index_meta(idx);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ReplacerPolicy;
    use crate::disk::DiskManager;
    use crate::record::{Column, Field};
    use tempfile::NamedTempFile;

    fn pool() -> BufferPool {
        let file = NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).ok();
        let disk = DiskManager::open(file.path(), 4096).unwrap();
        std::mem::forget(file);
        BufferPool::new(disk, 64, ReplacerPolicy::Lru)
    }

    fn users_schema() -> Schema {
        Schema::new(vec![
            Column::new("id", TypeId::Int, 0, false, false),
            Column::new("name", TypeId::Char(16), 1, false, true),
        ])
    }

    fn row(id: i32, name: &str) -> Row {
        Row::new(vec![Field::int(id), Field::char(16, name)])
    }

    #[test]
    fn create_table_auto_builds_pk_and_unique_indexes() {
        let pool = pool();
        let mut catalog = Catalog::create(pool).unwrap();
        catalog.create_table("users", users_schema(), vec![0]).unwrap();
        assert!(catalog.get_index("_users_PK_").is_some());
        assert!(catalog.get_index("_users_UNI_name_").is_some());
    }

    #[test]
    fn insert_rejects_duplicate_primary_key() {
        let pool = pool();
        let mut catalog = Catalog::create(pool).unwrap();
        catalog.create_table("users", users_schema(), vec![0]).unwrap();
        catalog.insert("users", &row(1, "alice")).unwrap();
        let err = catalog.insert("users", &row(1, "bob")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PkDuplicate);
    }

    #[test]
    fn insert_rejects_duplicate_unique_column() {
        let pool = pool();
        let mut catalog = Catalog::create(pool).unwrap();
        catalog.create_table("users", users_schema(), vec![0]).unwrap();
        catalog.insert("users", &row(1, "alice")).unwrap();
        let err = catalog.insert("users", &row(2, "alice")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UniKeyDuplicate);
    }

    #[test]
    fn create_index_promotes_a_provably_unique_column() {
        let pool = pool();
        let mut catalog = Catalog::create(pool).unwrap();
        let schema = Schema::new(vec![
            Column::new("id", TypeId::Int, 0, false, false),
            Column::new("tag", TypeId::Int, 1, false, false),
        ]);
        catalog.create_table("items", schema, vec![0]).unwrap();
        catalog
            .insert("items", &Row::new(vec![Field::int(1), Field::int(100)]))
            .unwrap();
        catalog
            .insert("items", &Row::new(vec![Field::int(2), Field::int(200)]))
            .unwrap();
        catalog.create_index("items", "tag_idx", &[1]).unwrap();
        assert!(catalog.get_table("items").unwrap().schema.column(1).unique);

        catalog
            .insert("items", &Row::new(vec![Field::int(3), Field::int(100)]))
            .unwrap_err();
    }

    #[test]
    fn create_index_rejects_non_unique_columns() {
        let pool = pool();
        let mut catalog = Catalog::create(pool).unwrap();
        let schema = Schema::new(vec![
            Column::new("id", TypeId::Int, 0, false, false),
            Column::new("tag", TypeId::Int, 1, false, false),
        ]);
        catalog.create_table("items", schema, vec![0]).unwrap();
        catalog
            .insert("items", &Row::new(vec![Field::int(1), Field::int(100)]))
            .unwrap();
        catalog
            .insert("items", &Row::new(vec![Field::int(2), Field::int(100)]))
            .unwrap();
        let err = catalog.create_index("items", "tag_idx", &[1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ColumnNotUnique);
    }

    #[test]
    fn update_moves_the_unique_index_entry() {
        let pool = pool();
        let mut catalog = Catalog::create(pool).unwrap();
        catalog.create_table("users", users_schema(), vec![0]).unwrap();
        let rid = catalog.insert("users", &row(1, "alice")).unwrap();
        let new_rid = catalog.update("users", rid, &row(1, "alicia")).unwrap();

        let idx = catalog.get_index("_users_UNI_name_").unwrap();
        let old_key = key::pack(&[Field::char(16, "alice")], idx.tree.key_width());
        let new_key = key::pack(&[Field::char(16, "alicia")], idx.tree.key_width());
        assert!(idx.tree.get_value(&old_key).is_none());
        assert_eq!(idx.tree.get_value(&new_key), Some(new_rid));
    }

    #[test]
    fn delete_removes_row_and_index_entries() {
        let pool = pool();
        let mut catalog = Catalog::create(pool).unwrap();
        catalog.create_table("users", users_schema(), vec![0]).unwrap();
        let rid = catalog.insert("users", &row(1, "alice")).unwrap();
        catalog.delete("users", rid).unwrap();

        let pk = catalog.get_index("_users_PK_").unwrap();
        let key = key::pack(&[Field::int(1)], pk.tree.key_width());
        assert!(pk.tree.get_value(&key).is_none());
        assert_eq!(catalog.get_table("users").unwrap().heap.iter(users_schema()).count(), 0);
    }

    #[test]
    fn drop_table_frees_its_heap_and_indexes() {
        let pool = pool();
        let mut catalog = Catalog::create(pool).unwrap();
        catalog.create_table("users", users_schema(), vec![0]).unwrap();
        catalog.insert("users", &row(1, "alice")).unwrap();
        catalog.drop_table("users").unwrap();
        assert!(catalog.get_table("users").is_none());
        assert!(catalog.get_index("_users_PK_").is_none());
    }

    #[test]
    fn reopen_restores_tables_and_indexes() {
        let pool = pool();
        {
            let mut catalog = Catalog::create(pool.clone()).unwrap();
            catalog.create_table("users", users_schema(), vec![0]).unwrap();
            catalog.insert("users", &row(1, "alice")).unwrap();
        }
        // the catalog meta page is always the first page this pool ever allocates
        let reopened = Catalog::open(pool, 0).unwrap();
        let table = reopened.get_table("users").unwrap();
        assert_eq!(table.heap.iter(table.schema.clone()).count(), 1);
        assert!(reopened.get_index("_users_PK_").is_some());
    }
}
