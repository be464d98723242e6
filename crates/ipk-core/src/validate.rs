//! Whole-graph checks run once every pack (including ref-packs) is assembled.

use std::collections::{BTreeMap, HashMap, HashSet};

use ipk_schema::Pack;

use crate::error::{CompileError, Diagnostics, Location};

fn index_by_key(packs: &[Pack]) -> HashMap<&str, usize> {
    let mut index = HashMap::new();
    for (i, pack) in packs.iter().enumerate() {
        index.entry(pack.name.as_str()).or_insert(i);
        index.entry(pack.id.as_str()).or_insert(i);
    }
    index
}

/// Every dependency must name (or id) an assembled pack.
///
/// # Errors
///
/// Returns [`CompileError::DependencyUnresolved`] for the first dangling
/// reference, located at the dependent pack's declaration.
pub fn check_dependencies(packs: &[Pack], locations: &[Location]) -> Result<(), CompileError> {
    let index = index_by_key(packs);
    for (i, pack) in packs.iter().enumerate() {
        if let Some(missing) = pack.dependencies.iter().find(|d| !index.contains_key(d.as_str())) {
            return Err(CompileError::DependencyUnresolved {
                at: locations.get(i).cloned().unwrap_or_default(),
                pack: pack.name.clone(),
                missing: missing.clone(),
            });
        }
    }
    Ok(())
}

/// Reject circular dependencies.
///
/// Depth-first walk from every pack; dependencies that do not resolve are
/// left to [`check_dependencies`].
pub fn check_cycles(packs: &[Pack], locations: &[Location]) -> Result<(), CompileError> {
    let index = index_by_key(packs);
    let mut visited = HashSet::new();
    let mut visiting = Vec::new();
    for i in 0..packs.len() {
        visit(i, packs, locations, &index, &mut visited, &mut visiting)?;
    }
    Ok(())
}

fn visit(
    i: usize,
    packs: &[Pack],
    locations: &[Location],
    index: &HashMap<&str, usize>,
    visited: &mut HashSet<usize>,
    visiting: &mut Vec<usize>,
) -> Result<(), CompileError> {
    if visited.contains(&i) {
        return Ok(());
    }
    if let Some(start) = visiting.iter().position(|&v| v == i) {
        let mut cycle: Vec<String> = visiting[start..]
            .iter()
            .map(|&v| packs[v].name.clone())
            .collect();
        cycle.push(packs[i].name.clone());
        // The pack on top of the stack holds the edge back to `i`.
        let closing = visiting.last().copied().unwrap_or(i);
        return Err(CompileError::DependencyCycle {
            at: locations.get(closing).cloned().unwrap_or_default(),
            cycle,
        });
    }

    visiting.push(i);
    for dep in &packs[i].dependencies {
        if let Some(&d) = index.get(dep.as_str()) {
            visit(d, packs, locations, index, visited, visiting)?;
        }
    }
    visiting.pop();
    visited.insert(i);
    Ok(())
}

/// Exclude groups: no member may be required and at most one may be preselected.
///
/// `locations[i]` is where `packs[i]` was declared.
pub fn check_excludes(packs: &[Pack], locations: &[Location]) -> Result<(), CompileError> {
    let mut preselected: BTreeMap<&str, &Pack> = BTreeMap::new();
    for (i, pack) in packs.iter().enumerate() {
        let Some(group) = pack.exclude_group.as_deref() else {
            continue;
        };
        let at = locations.get(i).cloned().unwrap_or_default();
        pack.validate_structure()
            .map_err(|e| CompileError::StructuralConflict {
                at: at.clone(),
                message: e.to_string(),
            })?;
        if !pack.preselected {
            continue;
        }
        if let Some(first) = preselected.insert(group, pack) {
            return Err(CompileError::StructuralConflict {
                at,
                message: format!(
                    "packs '{}' and '{}' are both preselected in excludeGroup '{group}'",
                    first.name, pack.name
                ),
            });
        }
    }
    Ok(())
}

/// Warn about `parent` references naming no assembled pack.
pub fn check_parents(packs: &[Pack], locations: &[Location], diag: &mut Diagnostics) {
    let index = index_by_key(packs);
    for (i, pack) in packs.iter().enumerate() {
        if let Some(parent) = pack.parent.as_deref().filter(|p| !index.contains_key(p)) {
            diag.warn(
                locations.get(i).cloned().unwrap_or_default(),
                format!("pack '{}' has unknown parent '{parent}'", pack.name),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack(name: &str, deps: &[&str]) -> Pack {
        let mut p = Pack::new(name, None, "", false, None);
        p.dependencies = deps.iter().map(|d| d.to_string()).collect();
        p
    }

    fn grouped(name: &str, group: &str, preselected: bool) -> Pack {
        let mut p = Pack::new(name, None, "", false, Some(group.to_string()));
        p.preselected = preselected;
        p
    }

    #[test]
    fn test_dependency_on_existing_pack() {
        let packs = vec![pack("A", &[]), pack("B", &["A"])];
        assert!(check_dependencies(&packs, &[]).is_ok());
        assert!(check_cycles(&packs, &[]).is_ok());
    }

    #[test]
    fn test_dependency_matches_id() {
        let mut a = pack("Core Files", &[]);
        a.id = "core".into();
        let packs = vec![a, pack("B", &["core"])];
        assert!(check_dependencies(&packs, &[]).is_ok());
    }

    #[test]
    fn test_missing_dependency_names_both_packs() {
        let packs = vec![pack("A", &[]), pack("B", &["C"])];
        let locations = vec![Location::new(None, 2), Location::new(None, 5)];
        let err = check_dependencies(&packs, &locations).unwrap_err();
        assert!(matches!(
            err,
            CompileError::DependencyUnresolved { ref at, ref pack, ref missing }
                if pack == "B" && missing == "C" && at.line == Some(5)
        ));
    }

    #[test]
    fn test_cycle_detection() {
        let packs = vec![pack("a", &["b"]), pack("b", &["c"]), pack("c", &["a"]), pack("d", &["a"])];
        let locations: Vec<_> = (1..=4).map(|line| Location::new(None, line)).collect();
        let err = check_cycles(&packs, &locations).unwrap_err();
        let CompileError::DependencyCycle { at, cycle } = err else {
            panic!("expected cycle");
        };
        assert_eq!(cycle, ["a", "b", "c", "a"]);
        assert_eq!(at.line, Some(3));
    }

    #[test]
    fn test_exclude_groups() {
        let ok = vec![grouped("x", "g", true), grouped("y", "g", false), grouped("z", "h", true)];
        assert!(check_excludes(&ok, &[]).is_ok());

        let both = vec![grouped("x", "g", true), grouped("y", "g", true)];
        let locations = vec![Location::new(None, 3), Location::new(None, 7)];
        let err = check_excludes(&both, &locations).unwrap_err();
        assert!(matches!(err, CompileError::StructuralConflict { ref at, .. } if at.line == Some(7)));

        let mut required = grouped("r", "g", false);
        required.required = true;
        assert!(matches!(
            check_excludes(&[required], &[]),
            Err(CompileError::StructuralConflict { .. })
        ));
    }

    #[test]
    fn test_unknown_parent_warns() {
        let mut child = pack("child", &[]);
        child.parent = Some("ghost".into());
        let mut diag = Diagnostics::default();
        check_parents(&[pack("root", &[]), child], &[], &mut diag);
        assert_eq!(diag.warnings().len(), 1);
    }
}
