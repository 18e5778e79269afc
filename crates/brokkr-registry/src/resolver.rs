//! Relationship resolution
//!
//! The resolver expands a requested module list into a full, consistent
//! install plan: mandatory dependencies are satisfied or the resolution
//! fails, recommendations and suggestions are pulled in on request, and
//! virtual-package providers are arbitrated. Conflicts abort resolution in
//! strict mode; permissive mode records them as data so a front end can
//! show the user what is wrong instead of refusing outright.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use tracing::{debug, info};

use brokkr_core::{Error, ModDependency, ModPackage, PackageSpec, Result};

use crate::registry::{GameGate, Registry};
use crate::sanity;

/// Knobs for one resolution run.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Add recommended mods, and their recommendations.
    pub with_recommends: bool,

    /// Add suggested mods one level deep.
    pub with_suggests: bool,

    /// Add suggested mods, and *their* suggestions, all the way down.
    pub with_all_suggests: bool,

    /// Skip ambiguous virtual-package stanzas instead of failing on them.
    pub allow_ambiguous_provides: bool,

    /// Record conflicts in the conflict list and keep resolving instead of
    /// failing on the first one. Unmet mandatory dependencies stay fatal.
    pub tolerate_conflicts: bool,

    /// Skip the final consistency pass. Non-sane plans cannot actually be
    /// installed; this exists to give feedback on failed resolutions.
    pub skip_sanity: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            with_recommends: true,
            with_suggests: false,
            with_all_suggests: false,
            allow_ambiguous_provides: false,
            tolerate_conflicts: false,
            skip_sanity: false,
        }
    }
}

impl ResolveOptions {
    /// Options for dependency-only expansion (upgrades, reinstalls).
    pub fn depends_only() -> Self {
        Self {
            with_recommends: false,
            ..Self::default()
        }
    }
}

/// Why a module ended up in the plan. Parents are identifiers of other
/// plan (or installed) modules, so chains can be walked for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionReason {
    UserRequested,
    Installed,
    Depends { parent: String },
    Recommended { parent: String },
    Suggested { parent: String },
}

impl SelectionReason {
    pub fn parent(&self) -> Option<&str> {
        match self {
            SelectionReason::UserRequested | SelectionReason::Installed => None,
            SelectionReason::Depends { parent }
            | SelectionReason::Recommended { parent }
            | SelectionReason::Suggested { parent } => Some(parent),
        }
    }
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionReason::UserRequested => write!(f, "requested by user"),
            SelectionReason::Installed => write!(f, "currently installed"),
            SelectionReason::Depends { parent } => {
                write!(f, "to satisfy dependency from {parent}")
            }
            SelectionReason::Recommended { parent } => write!(f, "recommended by {parent}"),
            SelectionReason::Suggested { parent } => write!(f, "suggested by {parent}"),
        }
    }
}

/// Which stanza of the parent pulled a module in.
#[derive(Debug, Clone, Copy)]
enum Relation {
    Depends,
    Recommended,
    Suggested,
}

impl Relation {
    fn reason_for(self, parent: &ModPackage) -> SelectionReason {
        let parent = parent.identifier().to_string();
        match self {
            Relation::Depends => SelectionReason::Depends { parent },
            Relation::Recommended => SelectionReason::Recommended { parent },
            Relation::Suggested => SelectionReason::Suggested { parent },
        }
    }
}

/// One resolution run against a registry snapshot.
pub struct Resolver<'r> {
    registry: &'r Registry,
    gate: GameGate,
    options: ResolveOptions,

    /// identifier (or provided alias) → chosen module.
    plan: BTreeMap<String, ModPackage>,
    user_requested: Vec<ModPackage>,
    installed: Vec<ModPackage>,
    conflicts: Vec<(ModPackage, ModPackage)>,
    reasons: HashMap<String, SelectionReason>,
}

impl<'r> Resolver<'r> {
    pub fn new(registry: &'r Registry, gate: GameGate, options: ResolveOptions) -> Self {
        let installed: Vec<ModPackage> = registry.installed_packages().cloned().collect();
        let mut reasons = HashMap::new();
        for module in &installed {
            reasons.insert(module.identifier().to_string(), SelectionReason::Installed);
        }
        Self {
            registry,
            gate,
            options,
            plan: BTreeMap::new(),
            user_requested: Vec::new(),
            installed,
            conflicts: Vec::new(),
            reasons,
        }
    }

    /// Resolve `name[=version]` requests: pinned versions must exist
    /// exactly, unpinned ones take the latest compatible release.
    pub fn resolve_specs(&mut self, specs: &[PackageSpec]) -> Result<()> {
        let mut packages = Vec::new();
        for spec in specs {
            let package = match spec.version {
                Some(version) => self
                    .registry
                    .get_by_version(&spec.identifier, version)
                    .cloned()
                    .ok_or_else(|| Error::module_not_found_at(spec.identifier.clone(), version))?,
                None => self
                    .registry
                    .latest_available(&spec.identifier, &self.gate, None)?
                    .cloned()
                    .ok_or_else(|| Error::module_not_found(spec.identifier.clone()))?,
            };
            packages.push(package);
        }
        self.add_packages(packages)
    }

    /// Add modules to the plan and resolve everything they pull in.
    pub fn add_packages(&mut self, packages: Vec<ModPackage>) -> Result<()> {
        debug!("Processing relationships for {} modules", packages.len());

        // Seed the plan with every user request first: they may be the
        // providers of virtual packages later stanzas ask for.
        for package in packages {
            let clashing: Vec<ModPackage> = self
                .fixed_modules()
                .filter(|fixed| fixed.conflicts_with(&package))
                .cloned()
                .collect();
            for fixed in clashing {
                if self.options.tolerate_conflicts {
                    self.conflicts.push((fixed.clone(), package.clone()));
                    self.conflicts.push((package.clone(), fixed));
                } else {
                    return Err(Error::inconsistent(format!(
                        "{} conflicts with {}, can't install both",
                        package, fixed
                    )));
                }
            }

            self.user_requested.push(package.clone());
            self.add_to_plan(package, SelectionReason::UserRequested)?;
        }

        let options = self.options.clone();
        for package in self.user_requested.clone() {
            info!("Resolving relationships for {}", package.identifier());
            self.expand(&package, &options, None)?;
        }

        if !self.options.skip_sanity {
            let mut final_modules = self.mod_list();
            final_modules.extend(self.installed.iter().cloned());
            sanity::enforce_consistency(&final_modules, &self.registry.preexisting_names())?;
        }
        Ok(())
    }

    /// Resolve all stanzas of one module. Suggestions do not cascade:
    /// nested passes run with `with_suggests` off unless
    /// `with_all_suggests` keeps them flowing.
    fn expand(
        &mut self,
        module: &ModPackage,
        options: &ResolveOptions,
        parent_stanza: Option<&[ModDependency]>,
    ) -> Result<()> {
        let mut sub_options = options.clone();
        sub_options.with_suggests = false;

        debug!("Resolving dependencies for {}", module.identifier());
        let depends: Vec<ModDependency> = module.depends().cloned().collect();
        self.resolve_stanza(&depends, module, Relation::Depends, &sub_options, false, parent_stanza)?;

        if options.with_recommends {
            let recommends: Vec<ModDependency> = module.recommends().cloned().collect();
            self.resolve_stanza(
                &recommends,
                module,
                Relation::Recommended,
                &sub_options,
                true,
                parent_stanza,
            )?;
        }

        if options.with_suggests || options.with_all_suggests {
            let suggests: Vec<ModDependency> = module.suggests().cloned().collect();
            self.resolve_stanza(
                &suggests,
                module,
                Relation::Suggested,
                &sub_options,
                true,
                parent_stanza,
            )?;
        }

        Ok(())
    }

    /// Resolve one stanza list for `parent`. Soft stanzas (recommends,
    /// suggests) log and skip what they cannot satisfy; hard ones fail.
    fn resolve_stanza(
        &mut self,
        stanza: &[ModDependency],
        parent: &ModPackage,
        relation: Relation,
        options: &ResolveOptions,
        soft: bool,
        parent_stanza: Option<&[ModDependency]>,
    ) -> Result<()> {
        for descriptor in stanza {
            let dep_name = &descriptor.name;
            debug!("Considering {}", dep_name);

            // Already fixed in the plan (possibly via a provided alias)?
            if let Some(existing) = self.plan.get(dep_name) {
                if existing.satisfies(descriptor) {
                    continue;
                }
                let existing = existing.clone();
                if options.tolerate_conflicts {
                    self.conflicts.push((existing.clone(), parent.clone()));
                    self.conflicts.push((parent.clone(), existing));
                    continue;
                }
                return Err(Error::inconsistent(format!(
                    "{} requires {}, but the incompatible {} {} is already in the resolution",
                    parent.identifier(),
                    descriptor,
                    existing.identifier(),
                    existing.version()
                )));
            }

            // Already installed (true install, drop-in or provided)?
            if let Some(version) = self.registry.installed_version(dep_name, true) {
                if descriptor.is_satisfied_by(dep_name, version) {
                    continue;
                }
                if options.tolerate_conflicts {
                    if let Some(installed) = self.registry.installed_module(dep_name) {
                        self.conflicts.push((installed.package.clone(), parent.clone()));
                        self.conflicts.push((parent.clone(), installed.package.clone()));
                    }
                    continue;
                }
                return Err(Error::inconsistent(format!(
                    "{} requires {}, but the incompatible version {} is already installed",
                    parent.identifier(),
                    descriptor,
                    version
                )));
            }

            // Query the registry, virtual packages included, and keep only
            // candidates that satisfy the constraint and could actually be
            // installed themselves.
            let mut candidates: Vec<ModPackage> = self
                .registry
                .latest_available_with_provides(dep_name, &self.gate, Some(descriptor))
                .into_iter()
                .filter(|candidate| candidate.satisfies(descriptor))
                .filter(|candidate| {
                    let mut assume = HashSet::new();
                    self.registry.might_be_installable(candidate, &self.gate, &mut assume)
                })
                .cloned()
                .collect();

            if candidates.is_empty() {
                if !soft {
                    return Err(Error::module_not_found(dep_name.clone()));
                }
                debug!("{} is recommended/suggested, but nothing provides it", dep_name);
                continue;
            }

            if candidates.len() > 1 {
                if options.allow_ambiguous_provides {
                    continue;
                }
                // A parent stanza that names one of the providers directly
                // settles the ambiguity.
                let directly_named: Vec<ModPackage> = parent_stanza
                    .map(|stanza| {
                        candidates
                            .iter()
                            .filter(|c| stanza.iter().any(|rel| rel.name == c.identifier()))
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                if directly_named.len() == 1 {
                    candidates = directly_named;
                } else {
                    return Err(Error::TooManyProviders {
                        identifier: dep_name.clone(),
                        candidates: candidates
                            .iter()
                            .map(|c| c.standard_file_name())
                            .collect(),
                    });
                }
            }

            let candidate = candidates.swap_remove(0);

            // Check the chosen candidate against everything fixed so far.
            let clash = self
                .fixed_modules()
                .find(|fixed| fixed.conflicts_with(&candidate))
                .cloned();
            match clash {
                None => {
                    self.add_to_plan(candidate.clone(), relation.reason_for(parent))?;
                    self.expand(&candidate, options, Some(stanza))?;
                }
                Some(_) if soft => {
                    debug!("{} would cause conflicts, excluding it", candidate);
                }
                Some(clashing) => {
                    if options.tolerate_conflicts {
                        self.add_to_plan(candidate.clone(), relation.reason_for(parent))?;
                        self.conflicts.push((clashing.clone(), candidate.clone()));
                        self.conflicts.push((candidate, clashing));
                    } else {
                        return Err(Error::inconsistent(format!(
                            "{} conflicts with {}, can't install both",
                            clashing, candidate
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Add a module to the plan, registering each name it provides as an
    /// alias. Aliases never overwrite an entry that is already claimed.
    fn add_to_plan(&mut self, module: ModPackage, reason: SelectionReason) -> Result<()> {
        let identifier = module.identifier().to_string();
        if let Some(existing) = self.plan.get(&identifier) {
            if existing == &module {
                return Ok(());
            }
            return Err(Error::inconsistent(format!(
                "resolution already contains {} {}",
                existing.identifier(),
                existing.version()
            )));
        }

        debug!("Adding {} {} to the plan", identifier, module.version());
        self.reasons.entry(identifier.clone()).or_insert(reason);
        for alias in module.provides.clone() {
            if !self.plan.contains_key(&alias) {
                debug!("Adding {} providing {}", identifier, alias);
                self.plan.insert(alias, module.clone());
            }
        }
        self.plan.insert(identifier, module);
        Ok(())
    }

    /// Everything the chosen candidate could clash with: the plan so far
    /// plus everything installed.
    fn fixed_modules(&self) -> impl Iterator<Item = &ModPackage> {
        let mut seen = HashSet::new();
        self.plan
            .values()
            .chain(self.installed.iter())
            .filter(move |m| seen.insert((m.identifier().to_string(), m.version())))
    }

    /// The flattened install list: each chosen module once, in identifier
    /// order so identical inputs always produce identical output.
    pub fn mod_list(&self) -> Vec<ModPackage> {
        let mut seen = HashSet::new();
        self.plan
            .values()
            .filter(|m| seen.insert((m.identifier().to_string(), m.version())))
            .cloned()
            .collect()
    }

    /// Why `identifier` is part of the plan.
    pub fn reason_for(&self, identifier: &str) -> Option<&SelectionReason> {
        self.reasons.get(identifier)
    }

    /// Human-readable reason chain, walking parents back to a root cause.
    pub fn reason_chain(&self, identifier: &str) -> String {
        let mut parts = Vec::new();
        let mut current = identifier;
        let mut guard = 0;
        while let Some(reason) = self.reasons.get(current) {
            parts.push(reason.to_string());
            match reason.parent() {
                Some(parent) if guard < 32 => {
                    guard += 1;
                    current = parent;
                }
                _ => break,
            }
        }
        parts.join(", ")
    }

    /// Conflicting pairs recorded in permissive mode. If (a, b) is in the
    /// list then so is (b, a).
    pub fn conflict_list(&self) -> &[(ModPackage, ModPackage)] {
        &self.conflicts
    }

    pub fn is_consistent(&self) -> bool {
        self.conflicts.is_empty()
    }
}
