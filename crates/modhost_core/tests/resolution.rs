use modhost_core::{
    DependencyInfo, DependencyResolver, Module, ModuleId, ModuleMetadata, ModuleRegistry,
    Requirer, ResolutionError, Version,
};
use std::collections::BTreeSet;

fn v(value: &str) -> Version {
    Version::parse(value).expect("test version")
}

fn module(name: &str, version: &str, deps: Vec<DependencyInfo>) -> Module {
    let metadata = deps
        .into_iter()
        .fold(ModuleMetadata::new(name, v(version)), |metadata, dep| {
            metadata.with_dependency(dep)
        });
    Module::builder(metadata).build().expect("module build")
}

fn ids(pairs: &[(&str, &str)]) -> BTreeSet<ModuleId> {
    pairs
        .iter()
        .map(|(name, version)| ModuleId::new(*name, v(version)))
        .collect()
}

/// Every non-optional dependency of every resolved module is satisfied by
/// some module in the set.
fn assert_closed(registry: &ModuleRegistry, resolved: &BTreeSet<ModuleId>) {
    for id in resolved {
        let module = registry.get(&id.name, &id.version).expect("resolved module");
        for dependency in module.dependencies() {
            let satisfied = resolved.iter().any(|candidate| {
                candidate.name == dependency.name
                    && dependency.version_range().contains(&candidate.version)
            });
            assert!(
                satisfied || dependency.optional,
                "{id} dependency {} unsatisfied",
                dependency.name
            );
        }
    }
}

#[test]
fn resolves_single_dependency_chain() {
    let mut registry = ModuleRegistry::new();
    registry.add(module("A", "1.0.0", vec![]));
    registry.add(module(
        "B",
        "1.0.0",
        vec![DependencyInfo::between("A", v("1.0.0"), v("2.0.0"))],
    ));

    let resolved = DependencyResolver::new(&registry)
        .resolve(["B"])
        .expect("resolution");
    assert_eq!(resolved.ids(), ids(&[("A", "1.0.0"), ("B", "1.0.0")]));
}

#[test]
fn incompatible_constraints_report_version_conflict() {
    let mut registry = ModuleRegistry::new();
    registry.add(module("A", "1.0.0", vec![]));
    registry.add(module("A", "2.0.0", vec![]));
    registry.add(module(
        "B",
        "1.0.0",
        vec![DependencyInfo::between("A", v("1.0.0"), v("2.0.0"))],
    ));
    registry.add(module(
        "C",
        "1.0.0",
        vec![DependencyInfo::at_least("A", v("2.0.0"))],
    ));

    let err = DependencyResolver::new(&registry)
        .resolve(["B", "C"])
        .expect_err("constraints admit no version of A");
    match err {
        ResolutionError::VersionConflict { name, requirements } => {
            assert_eq!(name, "A");
            let requirers: BTreeSet<Requirer> = requirements
                .into_iter()
                .map(|requirement| requirement.requirer)
                .collect();
            assert!(requirers.contains(&Requirer::Module(ModuleId::new("B", v("1.0.0")))));
            assert!(requirers.contains(&Requirer::Module(ModuleId::new("C", v("1.0.0")))));
        }
        other => panic!("expected version conflict, got {other:?}"),
    }
}

#[test]
fn result_is_closed_and_minimal() {
    let mut registry = ModuleRegistry::new();
    registry.add(module("Base", "1.0.0", vec![]));
    registry.add(module("Unrelated", "1.0.0", vec![]));
    registry.add(module("Lib", "1.2.0", vec![DependencyInfo::any("Base")]));
    registry.add(module("Lib", "1.3.0", vec![DependencyInfo::any("Base")]));
    registry.add(module(
        "App",
        "0.4.0",
        vec![DependencyInfo::at_least("Lib", v("1.0.0"))],
    ));

    let resolved = DependencyResolver::new(&registry)
        .resolve(["App"])
        .expect("resolution");
    let resolved_ids = resolved.ids();

    assert_closed(&registry, &resolved_ids);
    assert_eq!(
        resolved_ids,
        ids(&[("App", "0.4.0"), ("Base", "1.0.0"), ("Lib", "1.3.0")])
    );
    assert!(!resolved.contains("Unrelated"));
}

#[test]
fn resolution_is_deterministic_and_order_insensitive() {
    let mut registry = ModuleRegistry::new();
    registry.add(module("A", "1.0.0", vec![]));
    registry.add(module("A", "1.1.0", vec![]));
    registry.add(module("B", "1.0.0", vec![DependencyInfo::any("A")]));
    registry.add(module(
        "C",
        "1.0.0",
        vec![DependencyInfo::between("A", v("1.0.0"), v("1.1.0"))],
    ));

    let resolver = DependencyResolver::new(&registry);
    let first = resolver.resolve(["B", "C"]).expect("first");
    let second = resolver.resolve(["B", "C"]).expect("second");
    let reversed = resolver.resolve(["C", "B", "C"]).expect("reversed");

    assert_eq!(first, second);
    assert_eq!(first.ids(), reversed.ids());
    assert_eq!(first.get("A").expect("A").version(), &v("1.0.0"));
}

#[test]
fn rejected_version_does_not_leave_its_dependencies_behind() {
    let mut registry = ModuleRegistry::new();
    registry.add(module("X", "1.0.0", vec![]));
    registry.add(module("A", "1.0.0", vec![]));
    registry.add(module("A", "2.0.0", vec![DependencyInfo::any("X")]));
    registry.add(module("B", "1.0.0", vec![DependencyInfo::any("A")]));
    registry.add(module(
        "C",
        "1.0.0",
        vec![DependencyInfo::between("A", v("1.0.0"), v("2.0.0"))],
    ));

    let resolved = DependencyResolver::new(&registry)
        .resolve(["B", "C"])
        .expect("resolution after backtracking");

    assert_eq!(
        resolved.ids(),
        ids(&[("A", "1.0.0"), ("B", "1.0.0"), ("C", "1.0.0")])
    );
    assert!(!resolved.contains("X"));
}

#[test]
fn optional_dependencies_constrain_but_never_expand() {
    let mut registry = ModuleRegistry::new();
    registry.add(module("A", "1.0.0", vec![]));
    registry.add(module("A", "2.0.0", vec![]));
    registry.add(module(
        "D",
        "1.0.0",
        vec![DependencyInfo::between("A", v("1.0.0"), v("2.0.0")).optional()],
    ));
    registry.add(module("E", "1.0.0", vec![DependencyInfo::any("A")]));

    let resolver = DependencyResolver::new(&registry);
    let alone = resolver.resolve(["D"]).expect("optional only");
    assert_eq!(alone.ids(), ids(&[("D", "1.0.0")]));

    let together = resolver.resolve(["D", "E"]).expect("optional constrains");
    assert_eq!(together.get("A").expect("A").version(), &v("1.0.0"));
}

#[test]
fn implicit_upper_bound_follows_compatibility_line() {
    let mut registry = ModuleRegistry::new();
    registry.add(module("Stable", "1.4.0", vec![]));
    registry.add(module("Stable", "2.0.0", vec![]));
    registry.add(module("Early", "0.2.5", vec![]));
    registry.add(module("Early", "0.3.0", vec![]));
    registry.add(module(
        "Consumer",
        "1.0.0",
        vec![
            DependencyInfo::at_least("Stable", v("1.0.0")),
            DependencyInfo::at_least("Early", v("0.2.0")),
        ],
    ));

    let resolved = DependencyResolver::new(&registry)
        .resolve(["Consumer"])
        .expect("resolution");
    assert_eq!(resolved.get("Stable").expect("Stable").version(), &v("1.4.0"));
    assert_eq!(resolved.get("Early").expect("Early").version(), &v("0.2.5"));
}

#[test]
fn unknown_transitive_dependency_fails_whole_request() {
    let mut registry = ModuleRegistry::new();
    registry.add(module("A", "1.0.0", vec![]));
    registry.add(module("B", "1.0.0", vec![DependencyInfo::any("Nowhere")]));

    let err = DependencyResolver::new(&registry)
        .resolve(["A", "B"])
        .expect_err("missing dependency");
    assert_eq!(err.module_name(), "Nowhere");
    assert!(matches!(
        err,
        ResolutionError::UnknownModule {
            required_by: Requirer::Module(_),
            ..
        }
    ));
}

#[test]
fn dependency_cycles_resolve_to_one_version_each() {
    let mut registry = ModuleRegistry::new();
    registry.add(module("Ping", "1.0.0", vec![DependencyInfo::any("Pong")]));
    registry.add(module("Pong", "1.0.0", vec![DependencyInfo::any("Ping")]));

    let resolved = DependencyResolver::new(&registry)
        .resolve(["Ping"])
        .expect("cycle resolves");
    assert_eq!(resolved.ids(), ids(&[("Ping", "1.0.0"), ("Pong", "1.0.0")]));
}

#[test]
fn backtracking_restores_versions_rejected_under_an_abandoned_choice() {
    let mut registry = ModuleRegistry::new();
    registry.add(module("A", "1.0.0", vec![]));
    registry.add(module("A", "2.0.0", vec![]));
    registry.add(module(
        "M",
        "2.0.0",
        vec![
            DependencyInfo::between("A", v("1.0.0"), v("2.0.0")),
            DependencyInfo::any("N"),
        ],
    ));
    registry.add(module(
        "M",
        "1.0.0",
        vec![DependencyInfo::at_least("A", v("2.0.0"))],
    ));
    registry.add(module(
        "N",
        "1.0.0",
        vec![DependencyInfo::between("M", v("1.0.0"), v("2.0.0"))],
    ));

    let resolved = DependencyResolver::new(&registry)
        .resolve(["A", "M"])
        .expect("A@2 with M@1 satisfies every constraint");

    assert_eq!(resolved.ids(), ids(&[("A", "2.0.0"), ("M", "1.0.0")]));
    assert_closed(&registry, &resolved.ids());
    assert!(!resolved.contains("N"));
}
