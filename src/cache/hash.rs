// src/cache/hash.rs

//! Version hash used to tell identical package builds apart from
//! conflicting ones carrying the same version string

use crate::cache::DepType;
use crate::index::RawVersionRecord;

/// CRC-32 over version, arch and the Requires/Obsoletes/Conflicts names.
///
/// Two records of the same name/version/arch with equal hashes are the same
/// build published in several places.
pub fn version_hash(record: &RawVersionRecord) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(record.version.as_bytes());
    hasher.update(&[0]);
    hasher.update(record.arch.as_bytes());

    for group in [
        &[DepType::Depends, DepType::PreDepends][..],
        &[DepType::Obsoletes][..],
        &[DepType::Conflicts][..],
    ] {
        hasher.update(&[0xff]);
        for dep in record.depends.iter().filter(|d| group.contains(&d.dep_type)) {
            for target in &dep.targets {
                hasher.update(target.name.as_bytes());
                hasher.update(&[0]);
            }
        }
    }
    hasher.finalize()
}
