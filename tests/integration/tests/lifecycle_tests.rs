//! End-to-end lifecycle: feed refresh, install, upgrade, remove.

use brokkr_core::{Error, Version};
use brokkr_install::ModInstaller;
use brokkr_integration_tests::*;
use brokkr_registry::{feed, GameGate, Registry, ResolveOptions, Resolver};

fn gate() -> GameGate {
    GameGate::new(Version::new(0, 14, 22), Version::new(0, 12, 0))
}

#[test]
fn feed_refresh_then_install_with_dependencies() {
    let (tmp, instance, cache) = temp_instance();

    let feed_path = build_feed(
        tmp.path(),
        &[
            with_dependency(package("5dim_ores", "1.0.0"), "boblibrary >= 0.14.0"),
            package("boblibrary", "0.14.2"),
            package("boblibrary", "0.13.0"),
        ],
    );

    let mut registry = Registry::load(instance.registry_path()).unwrap();
    let summary = feed::refresh_from_path(&mut registry, &feed_path).unwrap();
    assert_eq!(summary.modules, 3);

    let mut installer = ModInstaller::new(&instance, &mut registry, &cache, gate());
    let (plan, reasons) = installer
        .plan_install(&["5dim_ores".parse().unwrap()], &ResolveOptions::default())
        .unwrap();

    let names: Vec<&str> = plan.iter().map(|p| p.identifier()).collect();
    assert_eq!(names, vec!["5dim_ores", "boblibrary"]);
    // The dependency resolves to the newest satisfying release.
    let bob = plan.iter().find(|p| p.identifier() == "boblibrary").unwrap();
    assert_eq!(bob.version(), Version::new(0, 14, 2));
    let reason = reasons.iter().find(|(id, _)| id == "boblibrary").unwrap();
    assert!(reason.1.contains("dependency from 5dim_ores"));

    for module in &plan {
        seed_cache(&cache, module);
    }
    installer.install_plan(&plan).unwrap();

    assert!(instance.mods_dir().join("5dim_ores_1.0.0.zip").is_file());
    assert!(instance.mods_dir().join("boblibrary_0.14.2.zip").is_file());
    registry.check_sanity().unwrap();

    // State survives a reload.
    let reloaded = Registry::load(instance.registry_path()).unwrap();
    assert!(reloaded.is_installed("5dim_ores"));
    assert!(reloaded.is_installed("boblibrary"));
}

#[test]
fn install_remove_cycle_leaves_clean_state() {
    let (_tmp, instance, cache) = temp_instance();
    let mut registry = Registry::load(instance.registry_path()).unwrap();

    let a = package("a", "1.0.0");
    let z = with_dependency(package("z", "1.0.0"), "a");
    registry.add_available(a.clone());
    registry.add_available(z.clone());
    seed_cache(&cache, &a);
    seed_cache(&cache, &z);

    let mut installer = ModInstaller::new(&instance, &mut registry, &cache, gate());
    installer.install_plan(&[a.clone(), z.clone()]).unwrap();

    // Removing the dependency takes the dependent with it.
    let removed = installer.uninstall_list(&["a".to_string()]).unwrap();
    assert_eq!(removed, vec!["a".to_string(), "z".to_string()]);

    assert!(!instance.mods_dir().join("a_1.0.0.zip").exists());
    assert!(!instance.mods_dir().join("z_1.0.0.zip").exists());
    // Protected roots survive the sweep.
    assert!(instance.mods_dir().is_dir());
    assert!(instance.scenarios_dir().is_dir());

    let reloaded = Registry::load(instance.registry_path()).unwrap();
    assert!(!reloaded.is_installed("a"));
    assert!(!reloaded.is_installed("z"));
    assert_eq!(reloaded.file_owner("mods/a_1.0.0.zip").unwrap(), None);
}

#[test]
fn upgrade_swaps_artifacts_and_registration() {
    let (_tmp, instance, cache) = temp_instance();
    let mut registry = Registry::load(instance.registry_path()).unwrap();

    let old = package("foo", "1.0.0");
    let new = package("foo", "1.1.0");
    registry.add_available(old.clone());
    registry.add_available(new.clone());
    seed_cache(&cache, &old);
    seed_cache(&cache, &new);

    let mut installer = ModInstaller::new(&instance, &mut registry, &cache, gate());
    installer.install_plan(&[old]).unwrap();

    let plan = installer.plan_upgrade(&["foo".parse().unwrap()]).unwrap();
    assert!(plan.notes[0].contains("upgrading foo from 1.0.0 to 1.1.0"));
    installer.apply_upgrade(&plan).unwrap();

    assert_eq!(
        registry.installed_version("foo", false),
        Some(Version::new(1, 1, 0))
    );
    assert!(!instance.mods_dir().join("foo_1.0.0.zip").exists());
    assert!(instance.mods_dir().join("foo_1.1.0.zip").is_file());
}

#[test]
fn failed_batch_rolls_back_registry_and_files() {
    let (_tmp, instance, cache) = temp_instance();
    let mut registry = Registry::load(instance.registry_path()).unwrap();

    let good = package("good", "1.0.0");
    let bad = package("bad", "1.0.0");
    registry.add_available(good.clone());
    registry.add_available(bad.clone());
    seed_cache(&cache, &good);
    // `bad` is deliberately not cached.

    let mut installer = ModInstaller::new(&instance, &mut registry, &cache, gate());
    let err = installer.install_plan(&[good, bad]).unwrap_err();
    assert!(matches!(err, Error::FileNotFound { .. }));

    assert!(!registry.is_installed("good"));
    assert!(!instance.mods_dir().join("good_1.0.0.zip").exists());
    let reloaded = Registry::load(instance.registry_path()).unwrap();
    assert!(!reloaded.is_installed("good"));
}

#[test]
fn game_version_gate_constrains_resolution() {
    let (_tmp, instance, cache) = temp_instance();
    let mut registry = Registry::load(instance.registry_path()).unwrap();

    registry.add_available(with_dependency(package("era", "2.0.0"), "base >= 0.15.0"));
    registry.add_available(with_dependency(package("era", "1.0.0"), "base >= 0.14.0"));

    // Instance runs 0.14.x, so only the 1.0.0 release is eligible.
    let installer = ModInstaller::new(&instance, &mut registry, &cache, gate());
    let (plan, _) = installer
        .plan_install(&["era".parse().unwrap()], &ResolveOptions::default())
        .unwrap();
    assert_eq!(plan[0].version(), Version::new(1, 0, 0));
}

#[test]
fn metapackage_bundle_installs_members_only() {
    let (_tmp, instance, cache) = temp_instance();
    let mut registry = Registry::load(instance.registry_path()).unwrap();

    let member_a = package("member-a", "1.0.0");
    let member_b = package("member-b", "1.0.0");
    let bundle = metapackage(with_dependency(
        with_dependency(package("bundle", "1.0.0"), "member-a"),
        "member-b",
    ));
    for p in [&member_a, &member_b, &bundle] {
        registry.add_available(p.clone());
    }
    seed_cache(&cache, &member_a);
    seed_cache(&cache, &member_b);

    let mut installer = ModInstaller::new(&instance, &mut registry, &cache, gate());
    let (plan, _) = installer
        .plan_install(&["bundle".parse().unwrap()], &ResolveOptions::default())
        .unwrap();
    assert_eq!(plan.len(), 3);
    installer.install_plan(&plan).unwrap();

    // The bundle is recorded but owns nothing on disk.
    assert!(registry.is_installed("bundle"));
    assert_eq!(
        registry.installed_module("bundle").unwrap().files().count(),
        0
    );
    assert!(instance.mods_dir().join("member-a_1.0.0.zip").is_file());
    assert!(!instance.mods_dir().join("bundle_1.0.0.zip").exists());
}

#[test]
fn resolver_sees_installed_state_from_earlier_batches() {
    let (_tmp, instance, cache) = temp_instance();
    let mut registry = Registry::load(instance.registry_path()).unwrap();

    let lib = package("lib", "1.0.0");
    registry.add_available(lib.clone());
    seed_cache(&cache, &lib);
    let mut installer = ModInstaller::new(&instance, &mut registry, &cache, gate());
    installer.install_plan(&[lib]).unwrap();

    // A later request that depends on lib must not re-plan it.
    let consumer = with_dependency(package("consumer", "1.0.0"), "lib >= 1.0.0");
    registry.add_available(consumer.clone());
    seed_cache(&cache, &consumer);

    let mut resolver = Resolver::new(&registry, gate(), ResolveOptions::default());
    resolver.resolve_specs(&["consumer".parse().unwrap()]).unwrap();
    let names: Vec<String> = resolver
        .mod_list()
        .iter()
        .map(|m| m.identifier().to_string())
        .collect();
    assert_eq!(names, vec!["consumer"]);
}
