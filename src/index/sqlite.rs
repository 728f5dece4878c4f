// src/index/sqlite.rs

//! repomd `primary.sqlite` reader
//!
//! Reads the same information as the XML reader from the SQLite flavour of
//! repomd primary metadata (as written by createrepo).

use super::{RawDependency, RawProvide, RawTarget, RawVersionRecord};
use crate::cache::DepType;
use crate::error::Result;
use crate::version::CompareOp;
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

pub(super) fn parse_primary_db(path: &Path) -> Result<Vec<RawVersionRecord>> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    read_primary(&conn)
}

/// A row of the provides/requires/conflicts/obsoletes tables
struct CapabilityRow {
    pkg_key: i64,
    name: String,
    flags: Option<String>,
    evr: Option<String>,
    pre: bool,
}

pub(super) fn read_primary(conn: &Connection) -> Result<Vec<RawVersionRecord>> {
    let mut records = Vec::new();
    let mut by_key: HashMap<i64, usize> = HashMap::new();

    let mut stmt = conn.prepare(
        "SELECT pkgKey, name, arch, epoch, version, release, size_package, size_installed,
                location_href
         FROM packages ORDER BY pkgKey",
    )?;
    let rows = stmt.query_map([], |row| {
        let key: i64 = row.get(0)?;
        let name: String = row.get(1)?;
        let arch: Option<String> = row.get(2)?;
        let version = join_evr(row.get(3)?, row.get(4)?, row.get(5)?).unwrap_or_default();
        let mut record = RawVersionRecord::new(&name, &version, arch.as_deref().unwrap_or("noarch"));
        record.size = row.get::<_, Option<i64>>(6)?.unwrap_or(0).max(0) as u64;
        record.installed_size = row.get::<_, Option<i64>>(7)?.unwrap_or(0).max(0) as u64;
        record.location = row.get(8)?;
        Ok((key, record))
    })?;
    for row in rows {
        let (key, record) = row?;
        by_key.insert(key, records.len());
        records.push(record);
    }

    for row in capabilities(conn, "provides", false)? {
        if let Some(&idx) = by_key.get(&row.pkg_key) {
            let record = &mut records[idx];
            if record.name != row.name {
                record.provides.push(RawProvide {
                    name: row.name,
                    version: row.evr,
                });
            }
        }
    }

    for (table, dep_type) in [
        ("requires", DepType::Depends),
        ("conflicts", DepType::Conflicts),
        ("obsoletes", DepType::Obsoletes),
    ] {
        for row in capabilities(conn, table, table == "requires")? {
            let Some(&idx) = by_key.get(&row.pkg_key) else {
                continue;
            };
            if dep_type == DepType::Depends
                && (row.name.starts_with("rpmlib(") || row.name.starts_with('/'))
            {
                continue;
            }
            let op = match row.flags.as_deref() {
                Some(flags) => CompareOp::parse(flags)?,
                None => CompareOp::Any,
            };
            records[idx].depends.push(RawDependency {
                dep_type: if row.pre { DepType::PreDepends } else { dep_type },
                targets: vec![RawTarget {
                    name: row.name,
                    op,
                    version: row.evr.unwrap_or_default(),
                }],
            });
        }
    }

    debug!("Read {} packages from primary database", records.len());
    Ok(records)
}

fn capabilities(conn: &Connection, table: &str, with_pre: bool) -> Result<Vec<CapabilityRow>> {
    let sql = if with_pre {
        format!("SELECT pkgKey, name, flags, epoch, version, release, pre FROM {table} ORDER BY rowid")
    } else {
        format!("SELECT pkgKey, name, flags, epoch, version, release FROM {table} ORDER BY rowid")
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        let pre = if with_pre {
            is_true(&row.get::<_, Value>(6)?)
        } else {
            false
        };
        Ok(CapabilityRow {
            pkg_key: row.get(0)?,
            name: row.get(1)?,
            flags: row.get(2)?,
            evr: join_evr(row.get(3)?, row.get(4)?, row.get(5)?),
            pre,
        })
    })?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// createrepo versions disagree on how booleans are stored
fn is_true(value: &Value) -> bool {
    match value {
        Value::Integer(i) => *i != 0,
        Value::Text(t) => matches!(t.as_str(), "1" | "TRUE" | "true"),
        _ => false,
    }
}

fn join_evr(epoch: Option<String>, ver: Option<String>, rel: Option<String>) -> Option<String> {
    let ver = ver.filter(|v| !v.is_empty())?;
    let mut out = String::new();
    if let Some(epoch) = epoch.filter(|e| !e.is_empty() && e != "0") {
        out.push_str(&epoch);
        out.push(':');
    }
    out.push_str(&ver);
    if let Some(rel) = rel.filter(|r| !r.is_empty()) {
        out.push('-');
        out.push_str(&rel);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_db(path: &Path) -> Connection {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE packages (pkgKey INTEGER PRIMARY KEY, pkgId TEXT, name TEXT, arch TEXT,
                 version TEXT, epoch TEXT, release TEXT, size_package INTEGER,
                 size_installed INTEGER, location_href TEXT);
             CREATE TABLE provides (name TEXT, flags TEXT, epoch TEXT, version TEXT, release TEXT, pkgKey INTEGER);
             CREATE TABLE requires (name TEXT, flags TEXT, epoch TEXT, version TEXT, release TEXT, pkgKey INTEGER, pre BOOLEAN DEFAULT FALSE);
             CREATE TABLE conflicts (name TEXT, flags TEXT, epoch TEXT, version TEXT, release TEXT, pkgKey INTEGER);
             CREATE TABLE obsoletes (name TEXT, flags TEXT, epoch TEXT, version TEXT, release TEXT, pkgKey INTEGER);

             INSERT INTO packages VALUES (1, 'x', 'openssl', 'x86_64', '3.1.1', '1', '4.fc40', 1000, 5000,
                 'Packages/o/openssl-3.1.1-4.fc40.x86_64.rpm');
             INSERT INTO packages VALUES (2, 'y', 'openssl-libs', 'x86_64', '3.1.1', '1', '4.fc40', 2000, 6000, NULL);
             INSERT INTO provides VALUES ('openssl', 'EQ', '1', '3.1.1', '4.fc40', 1);
             INSERT INTO provides VALUES ('libssl.so.3()(64bit)', NULL, NULL, NULL, NULL, 2);
             INSERT INTO requires VALUES ('openssl-libs', 'EQ', '1', '3.1.1', '4.fc40', 1, 1);
             INSERT INTO requires VALUES ('rpmlib(CompressedFileNames)', 'LE', '0', '3.0.4', '1', 1, 0);
             INSERT INTO requires VALUES ('libc.so.6()(64bit)', NULL, NULL, NULL, NULL, 2, 'FALSE');
             INSERT INTO obsoletes VALUES ('openssl11', 'LT', '1', '1.1.1', NULL, 2);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_read_primary_db() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("primary.sqlite");
        drop(create_db(&path));

        let records = parse_primary_db(&path).unwrap();
        assert_eq!(records.len(), 2);

        let openssl = &records[0];
        assert_eq!(openssl.name, "openssl");
        assert_eq!(openssl.version, "1:3.1.1-4.fc40");
        assert_eq!(openssl.size, 1000);
        assert!(openssl.provides.is_empty());
        assert_eq!(openssl.depends.len(), 1);
        assert_eq!(openssl.depends[0].dep_type, DepType::PreDepends);
        assert_eq!(openssl.depends[0].targets[0].op, CompareOp::Equal);

        let libs = &records[1];
        assert_eq!(libs.location, None);
        assert_eq!(libs.provides, vec![RawProvide::new("libssl.so.3()(64bit)", None)]);
        assert_eq!(libs.depends[0].dep_type, DepType::Depends);
        assert_eq!(libs.depends[1].dep_type, DepType::Obsoletes);
        assert_eq!(libs.depends[1].targets[0].version, "1:1.1.1");
    }
}
