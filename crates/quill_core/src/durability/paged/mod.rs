//! Copy-on-write persistence onto a [`PageStore`].
//!
//! # Layout
//!
//! ```text
//! pages 0, 1    meta copies: sequence + location of the root node
//! root node     every table (name, next id, leaf runs) and index
//!               (table, name, field, leaf runs)
//! leaf nodes    table cells (RecordId, Record) or index cells
//!               (IndexKey, RecordId), packed up to the fill ratio
//! ```
//!
//! # Commit protocol
//!
//! 1. Rewrite every dirty table and index into freshly allocated pages.
//! 2. Write a new root node.
//! 3. Write the meta copy this sequence maps to, pointing at the new root.
//! 4. Hand the pages the previous version used back to the free list and
//!    shrink the store if the free pages reach its end.
//!
//! The two meta copies alternate, so step 3 never overwrites the copy that
//! describes the previous version. Opening a store takes the valid copy
//! with the higher sequence. Pages are only reused after a meta copy that
//! stopped referencing them has been written, so a failure at any step
//! leaves the last committed version readable.

mod layout;
mod node;

use self::layout::{effective_fill, pack_leaves, FreeList};
use self::node::{
    decode_cbor, decode_cells, decode_node, encode_cbor, encode_node, Meta, NodeKind, PageRun,
    META_PAGES,
};
use super::Durability;
use crate::catalog::{Catalog, IndexData, IndexName, TableData};
use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::stats::PageStats;
use crate::transaction::ChangeSet;
use crate::types::{RecordId, SequenceNumber};
use crate::value::{IndexKey, Record};
use parking_lot::Mutex;
use quill_storage::{pages_for, PageId, PageStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Root node payload.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RootNode {
    tables: Vec<TableEntry>,
    indexes: Vec<IndexEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TableEntry {
    name: String,
    next_id: u64,
    leaves: Vec<PageRun>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexEntry {
    table: String,
    name: String,
    field: String,
    leaves: Vec<PageRun>,
}

/// Where the persisted version lives on the store.
#[derive(Debug, Clone, Default)]
struct Layout {
    root: Option<PageRun>,
    tables: BTreeMap<String, Vec<PageRun>>,
    indexes: BTreeMap<IndexName, Vec<PageRun>>,
    free: FreeList,
    /// First page past the last allocated one.
    end: u64,
}

impl Layout {
    fn leaf_pages(&self) -> u64 {
        self.tables
            .values()
            .chain(self.indexes.values())
            .flatten()
            .map(|run| run.pages)
            .sum()
    }
}

struct Inner {
    store: Box<dyn PageStore>,
    layout: Layout,
}

/// Durability backend writing to a page store.
///
/// The store is dropped on `close`, releasing any lock it holds even while
/// finished transactions still reference the engine.
pub(crate) struct PagedDurability {
    inner: Mutex<Option<Inner>>,
    default_fill: f64,
    sync_on_commit: bool,
}

impl PagedDurability {
    /// Opens `store`, formatting it if empty, and loads the committed state.
    pub(crate) fn open(
        mut store: Box<dyn PageStore>,
        config: &EngineConfig,
    ) -> CoreResult<(Self, Catalog)> {
        let page_size = store.page_size();

        let (layout, catalog) = if store.page_count() == 0 {
            let meta = Meta {
                page_size: page_size_u32(page_size)?,
                sequence: SequenceNumber::default(),
                root: None,
            };
            for slot in 0..META_PAGES {
                write_run(store.as_mut(), slot, meta.encode())?;
            }
            store.sync()?;
            info!(page_size, "formatted empty page store");
            (
                Layout {
                    end: META_PAGES,
                    ..Layout::default()
                },
                Catalog::default(),
            )
        } else {
            load(store.as_ref())?
        };

        debug!(
            page_size,
            sequence = %catalog.sequence,
            tables = catalog.tables.len(),
            indexes = catalog.indexes.len(),
            free_pages = layout.free.len(),
            "opened paged storage"
        );

        let durability = Self {
            inner: Mutex::new(Some(Inner { store, layout })),
            default_fill: config.default_fill_percent,
            sync_on_commit: config.sync_on_commit,
        };
        Ok((durability, catalog))
    }

    fn write_version(
        &self,
        store: &mut dyn PageStore,
        next: &mut Layout,
        catalog: &Catalog,
        changes: &ChangeSet,
    ) -> CoreResult<Vec<PageRun>> {
        let page_size = store.page_size();
        let mut released = Vec::new();

        let gone_tables: Vec<String> = next
            .tables
            .keys()
            .filter(|name| !catalog.tables.contains_key(*name))
            .cloned()
            .collect();
        for name in gone_tables {
            released.extend(next.tables.remove(&name).unwrap_or_default());
        }
        let gone_indexes: Vec<IndexName> = next
            .indexes
            .keys()
            .filter(|key| !catalog.indexes.contains_key(*key))
            .cloned()
            .collect();
        for key in gone_indexes {
            released.extend(next.indexes.remove(&key).unwrap_or_default());
        }

        for (name, hint) in &changes.tables {
            let Some(table) = catalog.tables.get(name) else {
                continue;
            };
            let fill = effective_fill(*hint, self.default_fill);
            let cells = table
                .records
                .iter()
                .map(|cell| encode_cbor(&cell))
                .collect::<CoreResult<Vec<_>>>()?;
            let runs = write_leaves(store, next, NodeKind::TableLeaf, cells, page_size, fill)?;
            trace!(table = %name, fill, leaves = runs.len(), "wrote table");
            released.extend(next.tables.insert(name.clone(), runs).unwrap_or_default());
        }

        for (key, hint) in &changes.indexes {
            let Some(index) = catalog.indexes.get(key) else {
                continue;
            };
            let fill = effective_fill(*hint, self.default_fill);
            let cells = index
                .entries
                .iter()
                .map(encode_cbor)
                .collect::<CoreResult<Vec<_>>>()?;
            let runs = write_leaves(store, next, NodeKind::IndexLeaf, cells, page_size, fill)?;
            trace!(table = %key.0, index = %key.1, fill, leaves = runs.len(), "wrote index");
            released.extend(next.indexes.insert(key.clone(), runs).unwrap_or_default());
        }

        let root = RootNode {
            tables: catalog
                .tables
                .iter()
                .map(|(name, table)| TableEntry {
                    name: name.clone(),
                    next_id: table.next_id,
                    leaves: next.tables.get(name).cloned().unwrap_or_default(),
                })
                .collect(),
            indexes: catalog
                .indexes
                .iter()
                .map(|(key, index)| IndexEntry {
                    table: key.0.clone(),
                    name: key.1.clone(),
                    field: index.field.clone(),
                    leaves: next.indexes.get(key).cloned().unwrap_or_default(),
                })
                .collect(),
        };
        let root_run = write_node(store, next, NodeKind::Root, &encode_cbor(&root)?)?;
        released.extend(next.root.replace(root_run));

        if self.sync_on_commit {
            store.sync()?;
        }
        let meta = Meta {
            page_size: page_size_u32(page_size)?,
            sequence: catalog.sequence,
            root: Some(root_run),
        };
        write_run(store, meta.slot(), meta.encode())?;
        if self.sync_on_commit {
            store.sync()?;
        }

        Ok(released)
    }
}

/// Gives trailing free pages back to the store. The commit is already
/// durable, so a failure here only costs space.
fn shrink(store: &mut dyn PageStore, layout: &mut Layout) {
    let trailing = layout.free.trailing(layout.end);
    if trailing == 0 {
        return;
    }
    let end = layout.end - trailing;
    match store.truncate(end) {
        Ok(()) => {
            layout.free.truncate(end);
            layout.end = end;
            trace!(pages = trailing, end, "shrank page store");
        }
        Err(err) => warn!(error = %err, "could not shrink page store"),
    }
}

impl Durability for PagedDurability {
    fn persist(&self, catalog: &Catalog, changes: &ChangeSet) -> CoreResult<()> {
        let mut guard = self.inner.lock();
        let Some(Inner { store, layout }) = guard.as_mut() else {
            return Err(CoreError::EngineClosed);
        };
        let mut next = layout.clone();

        match self.write_version(store.as_mut(), &mut next, catalog, changes) {
            Ok(released) => {
                let freed: u64 = released.iter().map(|run| run.pages).sum();
                for run in released {
                    next.free.release(run);
                }
                shrink(store.as_mut(), &mut next);
                debug!(
                    sequence = %catalog.sequence,
                    tables = changes.tables.len(),
                    indexes = changes.indexes.len(),
                    leaf_pages = next.leaf_pages(),
                    freed,
                    free_pages = next.free.len(),
                    "persisted commit"
                );
                *layout = next;
                Ok(())
            }
            Err(err) => {
                warn!(sequence = %catalog.sequence, error = %err, "commit not persisted");
                Err(err)
            }
        }
    }

    fn close(&self) -> CoreResult<()> {
        let Some(mut inner) = self.inner.lock().take() else {
            return Ok(());
        };
        inner.store.sync()?;
        debug!(pages = inner.store.page_count(), "released page store");
        Ok(())
    }

    fn page_stats(&self) -> Option<PageStats> {
        self.inner.lock().as_ref().map(|inner| PageStats {
            page_count: inner.store.page_count(),
            free_pages: inner.layout.free.len(),
            leaf_pages: inner.layout.leaf_pages(),
        })
    }
}

impl std::fmt::Debug for PagedDurability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedDurability")
            .field("default_fill", &self.default_fill)
            .field("sync_on_commit", &self.sync_on_commit)
            .finish_non_exhaustive()
    }
}

fn page_size_u32(page_size: usize) -> CoreResult<u32> {
    u32::try_from(page_size).map_err(|_| CoreError::corrupted(format!("page size {page_size}")))
}

/// Writes `bytes` at `start`, zero-padding to whole pages.
fn write_run(store: &mut dyn PageStore, start: PageId, mut bytes: Vec<u8>) -> CoreResult<()> {
    let page_size = store.page_size();
    let pages = pages_for(bytes.len(), page_size);
    bytes.resize(pages as usize * page_size, 0);
    store.write_pages(start, &bytes)?;
    Ok(())
}

fn write_node(
    store: &mut dyn PageStore,
    layout: &mut Layout,
    kind: NodeKind,
    payload: &[u8],
) -> CoreResult<PageRun> {
    let node = encode_node(kind, payload)?;
    let run = layout
        .free
        .allocate(pages_for(node.len(), store.page_size()), &mut layout.end);
    write_run(store, run.start, node)?;
    Ok(run)
}

fn write_leaves(
    store: &mut dyn PageStore,
    layout: &mut Layout,
    kind: NodeKind,
    cells: Vec<Vec<u8>>,
    page_size: usize,
    fill: f64,
) -> CoreResult<Vec<PageRun>> {
    pack_leaves(cells, page_size, fill)
        .iter()
        .map(|leaf| write_node(store, layout, kind, leaf))
        .collect()
}

fn read_node(store: &dyn PageStore, kind: NodeKind, run: PageRun) -> CoreResult<Vec<u8>> {
    if run.start < META_PAGES || run.start + run.pages > store.page_count() {
        return Err(CoreError::corrupted(format!(
            "{kind:?} node at pages {}..{} is out of range",
            run.start,
            run.start + run.pages
        )));
    }
    let bytes = store.read_pages(run.start, run.pages)?;
    Ok(decode_node(kind, &bytes)?.to_vec())
}

/// Returns the newest meta copy that decodes cleanly.
fn read_meta(store: &dyn PageStore) -> CoreResult<Meta> {
    let mut newest: Option<Meta> = None;
    let mut first_err = None;

    for slot in 0..META_PAGES {
        let decoded = if slot < store.page_count() {
            store
                .read_pages(slot, 1)
                .map_err(CoreError::from)
                .and_then(|page| Meta::decode(&page))
        } else {
            Err(CoreError::corrupted(format!("meta page {slot} is missing")))
        };
        match decoded {
            Ok(meta) if newest.is_some_and(|current| current.sequence >= meta.sequence) => {}
            Ok(meta) => newest = Some(meta),
            Err(err) => {
                warn!(slot, error = %err, "skipping unreadable meta page");
                first_err.get_or_insert(err);
            }
        }
    }

    match (newest, first_err) {
        (Some(meta), _) => Ok(meta),
        (None, Some(err)) => Err(err),
        (None, None) => Err(CoreError::corrupted("no meta page")),
    }
}

fn load(store: &dyn PageStore) -> CoreResult<(Layout, Catalog)> {
    let page_size = store.page_size();
    let meta = read_meta(store)?;
    if meta.page_size as usize != page_size {
        return Err(CoreError::corrupted(format!(
            "store was written with {}-byte pages, opened with {page_size}",
            meta.page_size
        )));
    }

    let mut layout = Layout {
        root: meta.root,
        end: store.page_count(),
        ..Layout::default()
    };
    let mut catalog = Catalog {
        sequence: meta.sequence,
        ..Catalog::default()
    };

    let root: RootNode = match meta.root {
        Some(run) => decode_cbor(&read_node(store, NodeKind::Root, run)?)?,
        None => RootNode::default(),
    };

    for entry in root.tables {
        let mut table = TableData {
            records: BTreeMap::new(),
            next_id: entry.next_id,
        };
        for &run in &entry.leaves {
            let cells: Vec<(RecordId, Record)> =
                decode_cells(&read_node(store, NodeKind::TableLeaf, run)?)?;
            for (id, record) in cells {
                if id.as_u64() >= entry.next_id {
                    return Err(CoreError::corrupted(format!(
                        "table '{}' holds {id} past its next id {}",
                        entry.name, entry.next_id
                    )));
                }
                table.records.insert(id, record);
            }
        }
        layout.tables.insert(entry.name.clone(), entry.leaves);
        catalog.tables.insert(entry.name, Arc::new(table));
    }

    for entry in root.indexes {
        if !catalog.tables.contains_key(&entry.table) {
            return Err(CoreError::corrupted(format!(
                "index '{}' refers to missing table '{}'",
                entry.name, entry.table
            )));
        }
        let mut index = IndexData::new(entry.field);
        for &run in &entry.leaves {
            let cells: Vec<(IndexKey, RecordId)> =
                decode_cells(&read_node(store, NodeKind::IndexLeaf, run)?)?;
            for (key, id) in cells {
                key.decode()
                    .map_err(|e| CoreError::corrupted(format!("index '{}': {e}", entry.name)))?;
                index.entries.insert((key, id));
            }
        }
        let key = (entry.table, entry.name);
        layout.indexes.insert(key.clone(), entry.leaves);
        catalog.indexes.insert(key, Arc::new(index));
    }

    let mut reachable: BTreeSet<PageId> = (0..META_PAGES).collect();
    reachable.extend(layout.root.into_iter().flat_map(PageRun::page_ids));
    reachable.extend(
        layout
            .tables
            .values()
            .chain(layout.indexes.values())
            .flatten()
            .flat_map(|run| run.page_ids()),
    );
    layout.free = FreeList::from_pages((0..layout.end).filter(|page| !reachable.contains(page)));

    Ok((layout, catalog))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use quill_storage::{FilePageStore, InMemoryPageStore};
    use tempfile::TempDir;

    const PAGE: usize = 512;

    fn config() -> EngineConfig {
        EngineConfig::new().page_size(PAGE).sync_on_commit(false)
    }

    fn memory() -> (PagedDurability, Catalog) {
        let store = InMemoryPageStore::new(PAGE).unwrap();
        PagedDurability::open(Box::new(store), &config()).unwrap()
    }

    fn open_file(dir: &TempDir) -> (PagedDurability, Catalog) {
        let store = FilePageStore::open(&dir.path().join("quill.db"), PAGE).unwrap();
        PagedDurability::open(Box::new(store), &config()).unwrap()
    }

    fn commit_rows(
        durability: &PagedDurability,
        catalog: &mut Catalog,
        table: &str,
        rows: i64,
        fill: Option<f64>,
    ) {
        if catalog.table(table).is_err() {
            catalog.create_table(table).unwrap();
        }
        let data = catalog.table_mut(table).unwrap();
        for n in 0..rows {
            data.insert(Record::new().with("n", n).with("pad", "x".repeat(20)));
        }
        catalog.sequence = catalog.sequence.next();

        let mut changes = ChangeSet::default();
        changes.touch_table(table, fill);
        durability.persist(catalog, &changes).unwrap();
    }

    #[test]
    fn empty_store_is_formatted() {
        let (durability, catalog) = memory();
        assert!(catalog.tables.is_empty());
        let stats = durability.page_stats().unwrap();
        assert_eq!(stats.page_count, META_PAGES);
        assert_eq!(stats.leaf_pages, 0);
    }

    #[test]
    fn reopen_restores_tables_and_indexes() {
        let dir = TempDir::new().unwrap();
        {
            let (durability, mut catalog) = open_file(&dir);
            commit_rows(&durability, &mut catalog, "users", 30, None);

            catalog.create_index("users", "n").unwrap();
            let key = IndexKey::encode(&Value::Integer(7));
            catalog
                .index_mut("users", "n")
                .unwrap()
                .entries
                .insert((key, RecordId::new(7)));
            catalog.sequence = catalog.sequence.next();
            let mut changes = ChangeSet::default();
            changes.touch_index("users", "n", None);
            durability.persist(&catalog, &changes).unwrap();
            durability.close().unwrap();
        }

        let (_durability, catalog) = open_file(&dir);
        assert_eq!(catalog.sequence, SequenceNumber::new(2));
        let users = catalog.table("users").unwrap();
        assert_eq!(users.records.len(), 30);
        assert_eq!(users.next_id, 30);
        assert_eq!(
            users.records[&RecordId::new(3)].get("n"),
            Some(&Value::Integer(3))
        );

        let index = catalog.index("users", "n").unwrap();
        assert_eq!(index.field, "n");
        assert_eq!(
            index.lookup(&IndexKey::encode(&Value::Integer(7))),
            vec![RecordId::new(7)]
        );
    }

    #[test]
    fn full_fill_uses_fewer_leaf_pages() {
        let (loose, mut loose_catalog) = memory();
        commit_rows(&loose, &mut loose_catalog, "t", 200, Some(0.5));

        let (tight, mut tight_catalog) = memory();
        commit_rows(&tight, &mut tight_catalog, "t", 200, Some(1.0));

        let loose_pages = loose.page_stats().unwrap().leaf_pages;
        let tight_pages = tight.page_stats().unwrap().leaf_pages;
        assert!(
            tight_pages < loose_pages,
            "fill 1.0 used {tight_pages} pages, fill 0.5 used {loose_pages}"
        );
    }

    #[test]
    fn replaced_pages_are_reused() {
        let (durability, mut catalog) = memory();
        commit_rows(&durability, &mut catalog, "t", 50, None);
        let after_first = durability.page_stats().unwrap();
        assert_eq!(after_first.free_pages, 0);

        commit_rows(&durability, &mut catalog, "t", 0, None);
        let after_second = durability.page_stats().unwrap();
        assert!(after_second.free_pages > 0);

        commit_rows(&durability, &mut catalog, "t", 0, None);
        let after_third = durability.page_stats().unwrap();
        assert!(after_third.page_count <= after_second.page_count);
    }

    #[test]
    fn free_tail_is_truncated() {
        let (durability, mut catalog) = memory();
        commit_rows(&durability, &mut catalog, "t", 50, None);
        commit_rows(&durability, &mut catalog, "t", 0, None);
        let grown = durability.page_stats().unwrap();

        // The third version fits in the pages the first one left behind, so
        // the second version's pages at the end of the store are cut off.
        commit_rows(&durability, &mut catalog, "t", 0, None);
        let shrunk = durability.page_stats().unwrap();
        assert!(
            shrunk.page_count < grown.page_count,
            "store stayed at {} pages",
            shrunk.page_count
        );
        assert_eq!(shrunk.leaf_pages, grown.leaf_pages);

        let inner = durability.inner.lock();
        let layout = &inner.as_ref().unwrap().layout;
        assert_eq!(layout.free.trailing(layout.end), 0);
        assert_eq!(layout.end, shrunk.page_count);
    }

    #[test]
    fn damaged_newest_meta_falls_back_to_previous_version() {
        let dir = TempDir::new().unwrap();
        {
            let (durability, mut catalog) = open_file(&dir);
            commit_rows(&durability, &mut catalog, "a", 5, None);
            commit_rows(&durability, &mut catalog, "b", 5, None);
            durability.close().unwrap();
        }

        // Sequence 2 lives in meta page 0.
        let path = dir.path().join("quill.db");
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[16] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();

        let (_durability, catalog) = open_file(&dir);
        assert_eq!(catalog.sequence, SequenceNumber::new(1));
        assert_eq!(catalog.table("a").unwrap().records.len(), 5);
        assert!(catalog.table("b").is_err());
    }

    #[test]
    fn close_releases_the_store() {
        let dir = TempDir::new().unwrap();
        let (durability, mut catalog) = open_file(&dir);
        commit_rows(&durability, &mut catalog, "t", 3, None);
        durability.close().unwrap();
        durability.close().unwrap();
        assert!(durability.page_stats().is_none());

        let mut changes = ChangeSet::default();
        changes.touch_table("t", None);
        assert!(matches!(
            durability.persist(&catalog, &changes),
            Err(CoreError::EngineClosed)
        ));

        let (_reopened, catalog) = open_file(&dir);
        assert_eq!(catalog.table("t").unwrap().records.len(), 3);
    }

    #[test]
    fn dropped_table_frees_its_pages() {
        let (durability, mut catalog) = memory();
        commit_rows(&durability, &mut catalog, "t", 50, None);

        catalog.drop_table("t").unwrap();
        catalog.sequence = catalog.sequence.next();
        let mut changes = ChangeSet::default();
        changes.forget_table("t", &[]);
        durability.persist(&catalog, &changes).unwrap();

        let stats = durability.page_stats().unwrap();
        assert_eq!(stats.leaf_pages, 0);
        assert!(stats.free_pages > 0);
    }

    #[test]
    fn corrupted_meta_is_reported() {
        let mut page = vec![0u8; PAGE];
        page[..8].copy_from_slice(b"garbage!");
        let store = InMemoryPageStore::with_data(PAGE, page).unwrap();
        let err = PagedDurability::open(Box::new(store), &config()).unwrap_err();
        assert!(matches!(err, CoreError::Corrupted { .. }));
    }

    #[test]
    fn page_size_mismatch_is_reported() {
        let meta = Meta {
            page_size: 512,
            sequence: SequenceNumber::default(),
            root: None,
        };
        let mut page = meta.encode();
        page.resize(1024, 0);
        let store = InMemoryPageStore::with_data(1024, page).unwrap();

        let err = PagedDurability::open(Box::new(store), &config()).unwrap_err();
        assert!(matches!(err, CoreError::Corrupted { .. }));
    }
}
