// tests/resolver_scenarios.rs

//! End-to-end planning scenarios: indexes on disk, a session, the
//! resolver and the orderer.

mod common;

use common::{load_cache, record, setup_system, with_dep, with_provide};
use rapt::cache::DepType;
use rapt::order::OpKind;
use rapt::version::CompareOp;
use rapt::{Error, Mode, PkgId, Policy, Session};

#[test]
fn test_install_pulls_required_version() {
    let (_dir, config) = setup_system(
        &[],
        &[
            with_dep(record("a", "1.0-1"), DepType::Depends, "b", CompareOp::GreaterEq, "2.0"),
            record("b", "1.0-1"),
            record("b", "2.0-1"),
        ],
    );
    let cache = load_cache(&config);
    let policy = Policy::new(&config.policy).unwrap();
    let mut session = Session::new(&cache, &policy, &config).unwrap();

    session.mark_install("a").unwrap();
    session.resolve(true).unwrap();

    let b = cache.find_package("b").unwrap();
    assert_eq!(session.depcache().mode(b), Mode::Install);
    let ver = session.depcache().inst_version(b).unwrap();
    assert_eq!(cache.version(ver).version, "2.0-1");
    assert!(session.depcache().state(b).flags.auto);

    let stats = session.stats();
    assert_eq!(stats.newly_installed, 2);
    assert_eq!(session.broken_count(), 0);
}

#[test]
fn test_protected_conflict_is_unresolvable() {
    let (_dir, config) = setup_system(
        &[record("b", "1.0-1")],
        &[with_dep(record("a", "1.0-1"), DepType::Conflicts, "b", CompareOp::Any, "")],
    );
    let cache = load_cache(&config);
    let policy = Policy::new(&config.policy).unwrap();
    let mut session = Session::new(&cache, &policy, &config).unwrap();

    session.protect("b").unwrap();
    session.mark_install("a").unwrap();
    match session.resolve(true) {
        Err(Error::UnresolvableConflict(pkg, other)) => {
            assert_eq!(pkg, "a");
            assert_eq!(other, "b");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_conflicting_package_is_removed() {
    let (_dir, config) = setup_system(
        &[with_provide(record("sendmail", "8.17-1"), "mta")],
        &[with_dep(
            with_provide(record("postfix", "3.8-1"), "mta"),
            DepType::Conflicts,
            "mta",
            CompareOp::Any,
            "",
        )],
    );
    let cache = load_cache(&config);
    let policy = Policy::new(&config.policy).unwrap();
    let mut session = Session::new(&cache, &policy, &config).unwrap();

    session.mark_install("postfix").unwrap();
    session.resolve(true).unwrap();

    let sendmail = cache.find_package("sendmail").unwrap();
    assert_eq!(session.depcache().mode(sendmail), Mode::Delete);

    let (ops, _) = session.ordered_transaction().unwrap();
    let remove = ops.iter().position(|op| op.kind == OpKind::Remove).unwrap();
    let install = ops.iter().position(|op| op.kind == OpKind::Install).unwrap();
    assert!(remove < install);
}

#[test]
fn test_obsoleted_package_counts_as_replaced() {
    let (_dir, config) = setup_system(
        &[record("b", "1.0-1")],
        &[with_dep(record("a", "1.0-1"), DepType::Obsoletes, "b", CompareOp::Less, "2.0")],
    );
    let cache = load_cache(&config);
    let policy = Policy::new(&config.policy).unwrap();
    let mut session = Session::new(&cache, &policy, &config).unwrap();

    session.mark_install("a").unwrap();
    session.resolve(true).unwrap();

    let stats = session.stats();
    assert_eq!(stats.newly_installed, 1);
    assert_eq!(stats.replaced, 1);
    assert_eq!(stats.removed, 0);
    assert_eq!(stats.replaced_by, vec![("b".to_string(), "a".to_string())]);
}

#[test]
fn test_consistent_system_resolves_without_changes() {
    let system = vec![
        with_dep(record("bash", "5.2-1"), DepType::Depends, "glibc", CompareOp::Any, ""),
        record("glibc", "2.39-1"),
    ];
    let (_dir, config) = setup_system(&system, &system);
    let cache = load_cache(&config);
    let policy = Policy::new(&config.policy).unwrap();
    let mut session = Session::new(&cache, &policy, &config).unwrap();

    let report = session.resolve(true).unwrap();
    assert!(report.changes.is_empty());
    assert!(!session.stats().has_changes());
}

#[test]
fn test_removal_cascades_to_dependents() {
    let (_dir, config) = setup_system(
        &[
            with_dep(record("app", "1.0-1"), DepType::Depends, "libfoo", CompareOp::Any, ""),
            record("libfoo", "1.0-1"),
            record("unrelated", "1.0-1"),
        ],
        &[],
    );
    let cache = load_cache(&config);
    let policy = Policy::new(&config.policy).unwrap();
    let mut session = Session::new(&cache, &policy, &config).unwrap();

    session.mark_delete("libfoo", false).unwrap();
    session.resolve(true).unwrap();

    let app = cache.find_package("app").unwrap();
    let unrelated = cache.find_package("unrelated").unwrap();
    assert_eq!(session.depcache().mode(app), Mode::Delete);
    assert_eq!(session.depcache().mode(unrelated), Mode::Keep);
    assert_eq!(session.stats().removed, 2);

    let (ops, _) = session.ordered_transaction().unwrap();
    let names: Vec<&str> = ops.iter().map(|op| cache.name(op.package)).collect();
    assert_eq!(names, vec!["app", "libfoo"]);
}

#[test]
fn test_predepends_order() {
    let (_dir, config) = setup_system(
        &[],
        &[
            with_dep(record("app", "1.0-1"), DepType::PreDepends, "shadow-utils", CompareOp::Any, ""),
            record("shadow-utils", "4.15-1"),
        ],
    );
    let cache = load_cache(&config);
    let policy = Policy::new(&config.policy).unwrap();
    let mut session = Session::new(&cache, &policy, &config).unwrap();

    session.mark_install("app").unwrap();
    session.resolve(true).unwrap();
    let (ops, _) = session.ordered_transaction().unwrap();

    let app = cache.find_package("app").unwrap();
    let shadow = cache.find_package("shadow-utils").unwrap();
    let position = |kind: OpKind, pkg: PkgId| {
        ops.iter()
            .position(|op| op.kind == kind && op.package == pkg)
            .unwrap()
    };
    assert!(position(OpKind::Configure, shadow) < position(OpKind::Install, app));
}

#[test]
fn test_dist_upgrade_installs_new_dependency() {
    let (_dir, config) = setup_system(
        &[record("bash", "5.1-1"), record("readline", "8.1-1")],
        &[
            with_dep(record("bash", "5.2-1"), DepType::Depends, "readline", CompareOp::GreaterEq, "8.2"),
            record("readline", "8.2-1"),
        ],
    );
    let cache = load_cache(&config);
    let policy = Policy::new(&config.policy).unwrap();
    let mut session = Session::new(&cache, &policy, &config).unwrap();

    session.upgrade(true).unwrap();
    let stats = session.stats();
    assert_eq!(stats.upgraded, 2);
    assert_eq!(stats.not_upgraded, 0);
}

#[test]
fn test_pinned_version_is_preferred() {
    let (_dir, mut config) = setup_system(
        &[],
        &[record("openssl", "1:3.0.13-1"), record("openssl", "1:3.2.1-1")],
    );
    config
        .policy
        .pins
        .insert("openssl".to_string(), "3.0.*".to_string());
    let cache = load_cache(&config);
    let policy = Policy::new(&config.policy).unwrap();
    let mut session = Session::new(&cache, &policy, &config).unwrap();

    let pkg = session.mark_install("openssl").unwrap();
    let ver = session.depcache().inst_version(pkg).unwrap();
    assert_eq!(cache.version(ver).version, "1:3.0.13-1");
}

#[test]
fn test_missing_source_is_a_warning() {
    let (dir, mut config) = setup_system(&[], &[record("a", "1.0-1")]);
    let mut extra = config.sources[0].clone();
    extra.label = "updates".to_string();
    extra.path = dir.path().join("updates-primary.json");
    config.sources.push(extra);

    let mut diag = rapt::Diagnostics::new();
    let cache = rapt::cache::build_cache(&config, &rapt::index::IndexRegistry::with_defaults(), &mut diag)
        .unwrap();
    assert!(cache.find_package("a").is_some());
    assert_eq!(diag.len(), 1);
    assert!(!diag.pending_error());
}
