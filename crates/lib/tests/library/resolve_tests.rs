//! Resolution over formula files shaped like real toolchain recipes.

use keg_lib::formula::{FormulaSource, FormulaStore, load};
use keg_lib::platform::Os;
use keg_lib::resolve::{ResolveError, Resolver, plan};

const CHECKSUM: &str = "b47cf2818691f5b1e21df2bb38c795fac2cfbd640ede2d0a5e1c89e338a3ac39";

fn toml(name: &str, version: &str, deps: &str) -> FormulaSource {
  FormulaSource::toml(
    &format!("{name}.toml"),
    &format!(
      r#"
name = "{name}"
version = "{version}"
source_url = "https://example.com/{name}-{version}.tar.gz"
checksum = "{CHECKSUM}"
dependencies = [{deps}]
"#
    ),
  )
}

fn toolchain() -> FormulaStore {
  let sources = [
    toml("gmp", "6.2.1", ""),
    toml("mpfr", "3.1.6", r#""gmp""#),
    toml("mpfr", "4.1.0", r#""gmp""#),
    toml("libmpc", "1.2.1", r#""gmp", "mpfr >=4""#),
    toml("isl", "0.25", r#""gmp""#),
    toml("zstd", "1.5.2", ""),
    toml("binutils", "2.38", r#""zstd""#),
    toml(
      "gcc@11",
      "11.3.0",
      r#""gmp", "isl", "libmpc", "mpfr >=4", "zstd", { name = "binutils", platforms = ["linux"] }"#,
    ),
  ];
  FormulaStore::from_formulas(sources.iter().map(|s| load(s).unwrap())).unwrap()
}

fn position(order: &[String], name: &str) -> usize {
  order.iter().position(|n| n == name).unwrap()
}

#[test]
fn toolchain_order_respects_every_edge() {
  let store = toolchain();
  let resolved = Resolver::new(&store).for_os(Some(Os::Linux)).resolve(&["gcc@11"]).unwrap();
  let order: Vec<String> = resolved.iter().map(|f| f.name.clone()).collect();

  for formula in &resolved {
    for dep in formula.dependencies_for(Some(Os::Linux)) {
      assert!(
        position(&order, &dep.name) < position(&order, &formula.name),
        "{} must precede {}",
        dep.name,
        formula.name
      );
    }
  }
  assert_eq!(order.last().map(String::as_str), Some("gcc@11"));
  assert!(order.contains(&"binutils".to_string()));

  let mpfr = resolved.iter().find(|f| f.name == "mpfr").unwrap();
  assert_eq!(mpfr.version, "4.1.0");
}

#[test]
fn resolution_is_deterministic() {
  let store = toolchain();
  let resolver = Resolver::new(&store).for_os(Some(Os::Linux));
  let first = resolver.resolve(&["gcc@11", "zstd"]).unwrap();
  for _ in 0..10 {
    assert_eq!(resolver.resolve(&["gcc@11", "zstd"]).unwrap(), first);
  }
}

#[test]
fn linux_only_dependency_is_dropped_on_macos() {
  let store = toolchain();
  let resolved = Resolver::new(&store).for_os(Some(Os::MacOs)).resolve(&["gcc@11"]).unwrap();
  assert!(resolved.iter().all(|f| f.name != "binutils"));
}

#[test]
fn waves_group_independent_formulas() {
  let store = toolchain();
  let resolved = Resolver::new(&store).for_os(Some(Os::Linux)).resolve(&["gcc@11"]).unwrap();
  let waves = plan(&resolved, Some(Os::Linux)).unwrap();

  let names: Vec<Vec<&str>> = waves
    .iter()
    .map(|wave| wave.iter().map(|f| f.name.as_str()).collect())
    .collect();
  assert_eq!(names[0], vec!["gmp", "zstd"]);
  assert_eq!(names.last().unwrap(), &vec!["gcc@11"]);
  assert_eq!(waves.iter().map(Vec::len).sum::<usize>(), resolved.len());
}

#[test]
fn unsatisfiable_constraint_names_requirers() {
  let store = FormulaStore::from_formulas(
    [toml("mpfr", "3.1.6", ""), toml("libmpc", "1.2.1", r#""mpfr >=4""#)]
      .iter()
      .map(|s| load(s).unwrap()),
  )
  .unwrap();

  let err = Resolver::new(&store).resolve(&["libmpc"]).unwrap_err();

  assert_eq!(
    err,
    ResolveError::VersionConflict {
      formula: "mpfr".to_string(),
      requirements: vec![("libmpc".to_string(), ">=4".to_string())],
      available: vec!["3.1.6".to_string()],
    }
  );
}

#[test]
fn missing_dependency_names_requirer() {
  let store = FormulaStore::from_formulas([load(&toml("cdk8s", "2.1.10", r#""node""#)).unwrap()]).unwrap();

  let err = Resolver::new(&store).resolve(&["cdk8s"]).unwrap_err();

  assert_eq!(
    err,
    ResolveError::UnresolvedDependency {
      required_by: Some("cdk8s".to_string()),
      missing: "node".to_string(),
    }
  );
}
