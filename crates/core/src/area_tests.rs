// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::PathBuf;
use yare::parameterized;

#[parameterized(
    component = { "src/components/Button.tsx", Some(Area::Frontend) },
    page = { "src/pages/index.tsx", Some(Area::Frontend) },
    api = { "src/api/users.rs", Some(Area::Backend) },
    service = { "src/services/auth.ts", Some(Area::Backend) },
    hook = { "hooks/pre_edit.sh", Some(Area::Hooks) },
    env = { ".env.local", Some(Area::Config) },
    test_file = { "tests/claims.rs", Some(Area::Tests) },
    doc = { "docs/architecture.md", Some(Area::Docs) },
    readme = { "README.md", Some(Area::Docs) },
    unmatched = { "Makefile", None },
)]
fn default_map_classifies(path: &str, expected: Option<Area>) {
    let map = AreaMap::default();
    assert_eq!(map.area_for(&PathBuf::from(path)), expected);
}

#[test]
fn first_match_wins() {
    // `src/components/**` outranks the generic `**/*.tsx` rule; both agree
    // here, so pin the ordering with a custom table where they disagree.
    let map = AreaMap::from_rules(&[
        ("src/special/**", Area::Config),
        ("**/*.md", Area::Docs),
    ]);
    assert_eq!(
        map.area_for(&PathBuf::from("src/special/notes.md")),
        Some(Area::Config)
    );
}

#[test]
fn invalid_globs_are_skipped() {
    let map = AreaMap::from_rules(&[("[", Area::Docs), ("docs/**", Area::Docs)]);
    assert_eq!(map.area_for(&PathBuf::from("docs/a.md")), Some(Area::Docs));
}

#[test]
fn paths_in_area_filters() {
    let map = AreaMap::default();
    let a = PathBuf::from("src/components/App.tsx");
    let b = PathBuf::from("src/api/users.rs");
    let c = PathBuf::from("docs/x.md");
    let paths: Vec<&Path> = vec![&a, &b, &c];
    let frontend = map.paths_in_area(&paths, Area::Frontend);
    assert_eq!(frontend, vec![a.as_path()]);
}

#[test]
fn area_parse_roundtrip() {
    for area in [
        Area::Frontend,
        Area::Backend,
        Area::Hooks,
        Area::Config,
        Area::Tests,
        Area::Docs,
    ] {
        assert_eq!(Area::parse(area.as_str()), Some(area));
    }
    assert_eq!(Area::parse("kitchen"), None);
}
