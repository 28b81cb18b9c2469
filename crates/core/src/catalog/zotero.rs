//! Catalog provider backed by a Zotero `zotero.sqlite` database.
//!
//! Zotero keeps the live database locked while it runs, so every snapshot
//! is read from a private copy in a temporary directory. Both the Zotero 5
//! schema and the older Zotero 4 schema are understood.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags};
use tracing::{debug, info, warn};

use super::{
    AttachmentId, AttachmentRecord, CatalogProvider, CatalogSnapshot, CollectionId,
    CollectionRecord, ItemId, ItemMetadata, ItemRecord, MembershipRecord,
};
use crate::config::make_absolute;
use crate::errors::CatalogError;

/// File name of the Zotero database inside its data directory.
pub const DATABASE_FILE: &str = "zotero.sqlite";

/// `userdata` schema versions from this one on are Zotero 5.
const ZOTERO5_MIN_USERDATA_VERSION: i64 = 90;

/// Item types that are never mirrored: notes and attachments themselves.
const ITEM_TYPE_NOTE: i64 = 1;
const ITEM_TYPE_ATTACHMENT: i64 = 14;

/// Field ids in `itemData`.
const FIELD_DATE: i64 = 14;
const FIELD_TITLE: i64 = 110;
const FIELD_PUBLICATION: i64 = 12;

const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Which generation of the Zotero schema a database uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaFlavor {
    Zotero4,
    Zotero5,
}

impl SchemaFlavor {
    fn creator_joins(self) -> &'static str {
        match self {
            Self::Zotero5 => {
                "LEFT JOIN creators AS cData ON cData.creatorID = itemCreators.creatorID"
            }
            Self::Zotero4 => {
                "LEFT JOIN creators ON creators.creatorID = itemCreators.creatorID \
                 LEFT JOIN creatorData AS cData ON cData.creatorDataID = creators.creatorDataID"
            }
        }
    }

    fn parent_item_column(self) -> &'static str {
        match self {
            Self::Zotero5 => "parentItemID",
            Self::Zotero4 => "sourceItemID",
        }
    }

    fn content_type_column(self) -> &'static str {
        match self {
            Self::Zotero5 => "contentType",
            Self::Zotero4 => "mimeType",
        }
    }
}

/// Reads catalog snapshots out of a Zotero database.
#[derive(Debug, Clone)]
pub struct ZoteroProvider {
    db_path: PathBuf,
    data_dir: PathBuf,
}

impl ZoteroProvider {
    /// `db_path` is the live `zotero.sqlite`; attachments are located below
    /// `data_dir/storage`. Relative paths are anchored at the current
    /// directory, since locators end up as symlink targets.
    pub fn new(db_path: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            db_path: anchored(db_path.into()),
            data_dir: anchored(data_dir.into()),
        }
    }

    /// Provider for a database whose data directory is its parent directory.
    pub fn from_db_path(db_path: impl Into<PathBuf>) -> Self {
        let db_path = db_path.into();
        let data_dir = db_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::new(db_path, data_dir)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Where the attachment with storage key `key` lives.
    pub fn storage_locator(&self, key: &str) -> String {
        self.data_dir
            .join("storage")
            .join(key)
            .to_string_lossy()
            .into_owned()
    }

    /// Read a snapshot from an already-open connection.
    pub fn read_snapshot(&self, conn: &Connection) -> Result<CatalogSnapshot, CatalogError> {
        let flavor = detect_flavor(conn)?;
        debug!(?flavor, "detected Zotero schema");

        let items = read_items(conn, flavor)?;
        let collections = read_collections(conn)?;
        let memberships = read_memberships(conn)?;
        let attachments = self.read_attachments(conn, flavor)?;

        info!(
            collections = collections.len(),
            items = items.len(),
            memberships = memberships.len(),
            attachments = attachments.len(),
            "read Zotero catalog"
        );

        Ok(CatalogSnapshot {
            collections,
            items,
            memberships,
            attachments,
        })
    }

    fn read_attachments(
        &self,
        conn: &Connection,
        flavor: SchemaFlavor,
    ) -> Result<Vec<AttachmentRecord>, CatalogError> {
        let parent = flavor.parent_item_column();
        let content_type = flavor.content_type_column();
        let sql = format!(
            "SELECT itemAttachments.{parent}, itemAttachments.itemID, items.key
             FROM itemAttachments
             INNER JOIN items ON items.itemID = itemAttachments.itemID
             LEFT JOIN deletedItems deleted ON itemAttachments.itemID = deleted.itemID
             LEFT JOIN deletedItems deletedParent ON itemAttachments.{parent} = deletedParent.itemID
             WHERE deleted.itemID IS NULL
               AND deletedParent.itemID IS NULL
               AND itemAttachments.{content_type} = ?1
               AND itemAttachments.path LIKE 'storage:%'
               AND itemAttachments.{parent} IS NOT NULL
             ORDER BY itemAttachments.itemID"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![PDF_CONTENT_TYPE], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .map(|(parent, id, key)| AttachmentRecord {
                id: AttachmentId(id),
                item: ItemId(parent),
                locator: self.storage_locator(&key),
            })
            .collect())
    }
}

fn anchored(path: PathBuf) -> PathBuf {
    match make_absolute(&path) {
        Ok(abs) => abs,
        Err(e) => {
            warn!(error = %e, path = %path.display(), "cannot resolve current directory");
            path
        }
    }
}

impl CatalogProvider for ZoteroProvider {
    fn snapshot(&self) -> Result<CatalogSnapshot, CatalogError> {
        // A relative locator would become a link that resolves against its
        // own folder instead of the data directory.
        if !self.data_dir.is_absolute() {
            return Err(CatalogError::Source(format!(
                "data directory '{}' is not an absolute path",
                self.data_dir.display()
            )));
        }
        fs::metadata(&self.db_path).map_err(|source| CatalogError::SourceUnreachable {
            path: self.db_path.clone(),
            source,
        })?;

        let scratch = tempfile::tempdir()?;
        let copy = scratch.path().join(DATABASE_FILE);
        fs::copy(&self.db_path, &copy)?;
        debug!(from = %self.db_path.display(), to = %copy.display(), "copied Zotero database");

        let conn = Connection::open_with_flags(
            &copy,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        self.read_snapshot(&conn)
    }
}

/// Work out the schema generation from the `userdata` version.
pub fn detect_flavor(conn: &Connection) -> Result<SchemaFlavor, CatalogError> {
    let version: i64 = conn
        .query_row(
            "SELECT version FROM version WHERE schema = 'userdata'",
            [],
            |row| row.get(0),
        )
        .map_err(|e| CatalogError::Source(format!("cannot read userdata schema version: {e}")))?;
    Ok(if version >= ZOTERO5_MIN_USERDATA_VERSION {
        SchemaFlavor::Zotero5
    } else {
        SchemaFlavor::Zotero4
    })
}

fn read_items(conn: &Connection, flavor: SchemaFlavor) -> Result<Vec<ItemRecord>, CatalogError> {
    let creator_joins = flavor.creator_joins();
    let sql = format!(
        "SELECT items.itemID,
                CAST(cData.firstName AS TEXT),
                CAST(cData.lastName AS TEXT),
                SUBSTR(CAST(dateDV.value AS TEXT), 1, 4),
                CAST(titleDV.value AS TEXT),
                CAST(pubDV.value AS TEXT)
         FROM items
         LEFT JOIN (
             SELECT itemID, MIN(orderIndex) AS minOrderIndex FROM itemCreators GROUP BY itemID
         ) AS firstCreator ON firstCreator.itemID = items.itemID
         LEFT JOIN itemCreators ON itemCreators.itemID = items.itemID
             AND itemCreators.orderIndex = firstCreator.minOrderIndex
         {creator_joins}
         LEFT JOIN itemData dateD ON dateD.itemID = items.itemID AND dateD.fieldID = ?1
         LEFT JOIN itemDataValues dateDV ON dateDV.valueID = dateD.valueID
         LEFT JOIN itemData titleD ON titleD.itemID = items.itemID AND titleD.fieldID = ?2
         LEFT JOIN itemDataValues titleDV ON titleDV.valueID = titleD.valueID
         LEFT JOIN itemData pubD ON pubD.itemID = items.itemID AND pubD.fieldID = ?3
         LEFT JOIN itemDataValues pubDV ON pubDV.valueID = pubD.valueID
         LEFT JOIN deletedItems deleted ON items.itemID = deleted.itemID
         WHERE deleted.itemID IS NULL
           AND items.itemTypeID != ?4
           AND items.itemTypeID != ?5
         ORDER BY items.itemID"
    );

    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(
            params![
                FIELD_DATE,
                FIELD_TITLE,
                FIELD_PUBLICATION,
                ITEM_TYPE_NOTE,
                ITEM_TYPE_ATTACHMENT
            ],
            |row| {
                let metadata = ItemMetadata {
                    author_first: row.get(1)?,
                    author_last: row.get(2)?,
                    year: row.get(3)?,
                    title: row.get(4)?,
                    journal: row.get(5)?,
                };
                Ok(ItemRecord {
                    id: ItemId(row.get(0)?),
                    display_name: metadata.display_name(),
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

fn read_collections(conn: &Connection) -> Result<Vec<CollectionRecord>, CatalogError> {
    let mut stmt = conn.prepare(
        "SELECT collectionID, parentCollectionID, CAST(collectionName AS TEXT)
         FROM collections ORDER BY collectionID",
    )?;
    let collections = stmt
        .query_map([], |row| {
            Ok(CollectionRecord {
                id: CollectionId(row.get(0)?),
                parent: row.get::<_, Option<i64>>(1)?.map(CollectionId),
                name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(collections)
}

fn read_memberships(conn: &Connection) -> Result<Vec<MembershipRecord>, CatalogError> {
    let mut stmt = conn.prepare(
        "SELECT collectionItems.collectionID, collectionItems.itemID
         FROM collectionItems
         INNER JOIN items ON collectionItems.itemID = items.itemID
         LEFT JOIN deletedItems deleted ON items.itemID = deleted.itemID
         WHERE deleted.itemID IS NULL
           AND items.itemTypeID != ?1
           AND items.itemTypeID != ?2
         ORDER BY collectionItems.collectionID, collectionItems.itemID",
    )?;
    let memberships = stmt
        .query_map(params![ITEM_TYPE_NOTE, ITEM_TYPE_ATTACHMENT], |row| {
            Ok(MembershipRecord {
                collection: CollectionId(row.get(0)?),
                item: ItemId(row.get(1)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(memberships)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Just enough of the Zotero 5 schema for the provider's queries.
    const ZOTERO5_SCHEMA: &str = r#"
        CREATE TABLE version (schema TEXT PRIMARY KEY, version INT NOT NULL);
        CREATE TABLE items (itemID INTEGER PRIMARY KEY, itemTypeID INT NOT NULL, key TEXT NOT NULL);
        CREATE TABLE creators (creatorID INTEGER PRIMARY KEY, firstName TEXT, lastName TEXT);
        CREATE TABLE itemCreators (itemID INT, creatorID INT, orderIndex INT);
        CREATE TABLE itemData (itemID INT, fieldID INT, valueID INT);
        CREATE TABLE itemDataValues (valueID INTEGER PRIMARY KEY, value);
        CREATE TABLE deletedItems (itemID INTEGER PRIMARY KEY);
        CREATE TABLE collections (collectionID INTEGER PRIMARY KEY, collectionName TEXT, parentCollectionID INT);
        CREATE TABLE collectionItems (collectionID INT, itemID INT);
        CREATE TABLE itemAttachments (itemID INTEGER PRIMARY KEY, parentItemID INT, contentType TEXT, path TEXT);
        INSERT INTO version VALUES ('userdata', 120);
    "#;

    fn seeded() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(ZOTERO5_SCHEMA).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO items VALUES (1, 2, 'ITEMAAAA'), (2, 2, 'ITEMBBBB'), (3, 1, 'NOTECCCC'),
                                     (4, 14, 'ATTDDDDD'), (5, 2, 'TRASHEEE'), (6, 14, 'ATTFFFFF');
            INSERT INTO creators VALUES (1, 'Ada', 'Lovelace'), (2, 'Charles', 'Babbage');
            INSERT INTO itemCreators VALUES (1, 2, 1), (1, 1, 0);
            INSERT INTO itemDataValues VALUES (1, 'Notes on the Engine'), (2, '1843-00-00 1843'), (3, 'Memoirs');
            INSERT INTO itemData VALUES (1, 110, 1), (1, 14, 2), (1, 12, 3);
            INSERT INTO deletedItems VALUES (5);
            INSERT INTO collections VALUES (10, 'Computing', NULL), (11, 'History', 10);
            INSERT INTO collectionItems VALUES (11, 1), (10, 3), (10, 5);
            INSERT INTO itemAttachments VALUES (4, 1, 'application/pdf', 'storage:engine.pdf'),
                                               (6, 1, 'text/html', 'storage:page.html');
            "#,
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_detect_flavor() {
        let conn = seeded();
        assert_eq!(detect_flavor(&conn).unwrap(), SchemaFlavor::Zotero5);
        conn.execute("UPDATE version SET version = 80", []).unwrap();
        assert_eq!(detect_flavor(&conn).unwrap(), SchemaFlavor::Zotero4);
    }

    #[test]
    fn test_read_snapshot() {
        let conn = seeded();
        let provider = ZoteroProvider::new("/zot/zotero.sqlite", "/zot");
        let snapshot = provider.read_snapshot(&conn).unwrap();

        let names: Vec<&str> = snapshot.items.iter().map(|i| i.display_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Lovelace A - Notes on the Engine - Memoirs - 1843", "NOLAST - NOTITLE"]
        );

        assert_eq!(snapshot.collections.len(), 2);
        assert_eq!(snapshot.collections[1].parent, Some(CollectionId(10)));

        // Notes and trashed items are not members.
        assert_eq!(
            snapshot.memberships,
            vec![MembershipRecord {
                collection: CollectionId(11),
                item: ItemId(1)
            }]
        );

        assert_eq!(snapshot.attachments.len(), 1);
        assert_eq!(snapshot.attachments[0].item, ItemId(1));
        assert_eq!(
            PathBuf::from(&snapshot.attachments[0].locator),
            PathBuf::from("/zot/storage/ATTDDDDD")
        );
    }

    #[test]
    fn test_read_snapshot_zotero4() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE version (schema TEXT PRIMARY KEY, version INT NOT NULL);
            CREATE TABLE items (itemID INTEGER PRIMARY KEY, itemTypeID INT NOT NULL, key TEXT NOT NULL);
            CREATE TABLE creators (creatorID INTEGER PRIMARY KEY, creatorDataID INT);
            CREATE TABLE creatorData (creatorDataID INTEGER PRIMARY KEY, firstName TEXT, lastName TEXT);
            CREATE TABLE itemCreators (itemID INT, creatorID INT, orderIndex INT);
            CREATE TABLE itemData (itemID INT, fieldID INT, valueID INT);
            CREATE TABLE itemDataValues (valueID INTEGER PRIMARY KEY, value);
            CREATE TABLE deletedItems (itemID INTEGER PRIMARY KEY);
            CREATE TABLE collections (collectionID INTEGER PRIMARY KEY, collectionName TEXT, parentCollectionID INT);
            CREATE TABLE collectionItems (collectionID INT, itemID INT);
            CREATE TABLE itemAttachments (itemID INTEGER PRIMARY KEY, sourceItemID INT, mimeType TEXT, path TEXT);
            INSERT INTO version VALUES ('userdata', 77);
            INSERT INTO items VALUES (1, 4, 'ITEMAAAA'), (2, 14, 'ATTBBBBB');
            INSERT INTO creatorData VALUES (7, 'Grace Brewster', 'Hopper');
            INSERT INTO creators VALUES (3, 7);
            INSERT INTO itemCreators VALUES (1, 3, 0);
            INSERT INTO itemDataValues VALUES (1, 'Compilers');
            INSERT INTO itemData VALUES (1, 110, 1);
            INSERT INTO itemAttachments VALUES (2, 1, 'application/pdf', 'storage:c.pdf');
            "#,
        )
        .unwrap();

        let provider = ZoteroProvider::new("/ff/zotero/zotero.sqlite", "/ff/zotero");
        let snapshot = provider.read_snapshot(&conn).unwrap();
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].display_name, "Hopper GB - Compilers");
        assert_eq!(snapshot.attachments.len(), 1);
        assert_eq!(
            PathBuf::from(&snapshot.attachments[0].locator),
            PathBuf::from("/ff/zotero/storage/ATTBBBBB")
        );
        assert!(snapshot.memberships.is_empty());
    }

    #[test]
    fn test_missing_database_is_unreachable() {
        let provider = ZoteroProvider::from_db_path("/nonexistent/zotero.sqlite");
        assert_eq!(provider.data_dir(), Path::new("/nonexistent"));
        assert!(matches!(
            provider.snapshot(),
            Err(CatalogError::SourceUnreachable { .. })
        ));
    }

    #[test]
    fn test_relative_database_gives_absolute_locators() {
        let cwd = std::env::current_dir().unwrap();
        let provider = ZoteroProvider::from_db_path("Zotero/zotero.sqlite");
        assert_eq!(provider.db_path(), cwd.join("Zotero/zotero.sqlite"));
        assert_eq!(provider.data_dir(), cwd.join("Zotero"));

        let locator = PathBuf::from(provider.storage_locator("KEYA"));
        assert!(locator.is_absolute());
        assert_eq!(locator, cwd.join("Zotero/storage/KEYA"));

        // A bare file name lives in the current directory.
        let provider = ZoteroProvider::from_db_path(DATABASE_FILE);
        assert_eq!(provider.data_dir(), cwd.as_path());
    }

    #[test]
    fn test_snapshot_reads_a_copy_of_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join(DATABASE_FILE);
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute_batch(ZOTERO5_SCHEMA).unwrap();
            conn.execute("INSERT INTO items VALUES (1, 2, 'K1')", []).unwrap();
        }
        let provider = ZoteroProvider::from_db_path(&db_path);
        let snapshot = provider.snapshot().unwrap();
        assert_eq!(snapshot.items.len(), 1);
        assert!(db_path.exists());
    }
}
