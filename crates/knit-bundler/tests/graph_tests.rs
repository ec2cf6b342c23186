//! Integration tests for graph construction over on-disk projects

mod common;

use std::cell::Cell;

use common::fixtures_dir;
use knit_bundler::{
    find_config_dir, Bundler, Dialect, FileSystem, GraphBuilder, ModuleId, ModuleLowering,
    ProjectConfig, Transformer, CONFIG_FILE,
};

fn ids(table: &knit_bundler::ModuleTable) -> Vec<String> {
    table.ids().map(|id| id.to_string()).collect()
}

#[test]
fn test_basic_project_graph() {
    let source = FileSystem::new(fixtures_dir().join("basic"));
    let builder = GraphBuilder::new(&source, &ModuleLowering);

    let entry = builder.resolve_entry("index.js", Dialect::Default).unwrap();
    let table = builder.build(&entry, Dialect::Default).unwrap();

    assert_eq!(ids(&table), vec!["add.js", "index.js"]);
    let index = table.get(&entry).unwrap();
    assert_eq!(index.dependency("./add"), Some(&ModuleId::new("add.js")));
    assert!(index.code().contains("require(\"./add\")"));
    assert!(!index.code().contains("import "));
}

#[test]
fn test_typed_project_graph() {
    let source = FileSystem::new(fixtures_dir().join("typed"));
    let builder = GraphBuilder::new(&source, &ModuleLowering);

    let entry = builder.resolve_entry("src/index", Dialect::TypedSuperset).unwrap();
    let table = builder.build(&entry, Dialect::TypedSuperset).unwrap();

    assert_eq!(ids(&table), vec!["src/util.ts", "src/geometry.ts", "src/index.ts"]);

    // `./util` and `./util.ts` name the same module; the type-only import is
    // never resolved
    let index = table.get(&entry).unwrap();
    assert_eq!(index.dependency("./util"), Some(&ModuleId::new("src/util.ts")));
    assert_eq!(index.dependency("./shapes"), None);
    let geometry = table.get(&ModuleId::new("src/geometry.ts")).unwrap();
    assert_eq!(geometry.dependency("./util.ts"), Some(&ModuleId::new("src/util.ts")));
    assert!(table.check_closure().is_ok());
}

#[test]
fn test_typed_project_config() {
    let dir = find_config_dir(&fixtures_dir().join("typed").join("src")).unwrap();
    let config = ProjectConfig::from_file(&dir.join(CONFIG_FILE)).unwrap();
    let source = FileSystem::new(config.bundle.root_dir(&dir));

    let bundle = Bundler::new(&source, &ModuleLowering)
        .with_options(config.bundle.options)
        .build(&config.bundle.entry)
        .unwrap();
    assert_eq!(bundle.entry().as_str(), "src/index.ts");
    assert_eq!(bundle.table().len(), 3);
}

#[test]
fn test_each_module_transformed_once() {
    let source = FileSystem::new(fixtures_dir().join("counter"));
    let calls = Cell::new(0usize);
    let counting = |text: &str, dialect: Dialect| {
        calls.set(calls.get() + 1);
        ModuleLowering.transform(text, dialect)
    };

    let builder = GraphBuilder::new(&source, &counting);
    let table = builder.build(&ModuleId::new("index.js"), Dialect::Default).unwrap();

    assert_eq!(table.len(), 4);
    assert_eq!(calls.get(), 4);
}

#[test]
fn test_serialization_is_byte_identical() {
    let build = || {
        let source = FileSystem::new(fixtures_dir().join("counter"));
        Bundler::new(&source, &ModuleLowering).build("index.js").unwrap()
    };

    let first = build();
    let second = build();
    assert_eq!(first.table().to_json().unwrap(), second.table().to_json().unwrap());
    assert_eq!(first.text(), second.text());
    assert_eq!(ids(first.table()), vec!["counter.js", "a.js", "b.js", "index.js"]);
}

#[test]
fn test_cycle_fixture_maps_both_ways() {
    let source = FileSystem::new(fixtures_dir().join("cycle"));
    let (entry, table) = Bundler::new(&source, &ModuleLowering).graph("a.js").unwrap();

    assert_eq!(entry.as_str(), "a.js");
    assert_eq!(table.len(), 2);
    let a = table.get(&ModuleId::new("a.js")).unwrap();
    let b = table.get(&ModuleId::new("b.js")).unwrap();
    assert_eq!(a.dependency("./b"), Some(b.id()));
    assert_eq!(b.dependency("./a"), Some(a.id()));
}
